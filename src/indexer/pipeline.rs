//! End-to-end indexing run: discover, parse, bind, traverse, export.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;
use crate::index::sqlite::SqliteIndex;
use crate::index::WriteQueueHandle;
use crate::indexer::identity::{strategy_for, StrategyKind};
use crate::indexer::modules::ModuleResolver;
use crate::indexer::parser::{ParsedFile, Parser};
use crate::indexer::progress::IndexingProgress;
use crate::indexer::symbols::ProjectSymbols;
use crate::indexer::traversal::Orchestrator;
use crate::indexer::walker::FileWalker;
use crate::languages::LanguageRegistry;
use crate::workspace::IndexerConfig;

struct SourceFile {
    rel_path: String,
    parsed: ParsedFile,
    /// Declaration files are bound for lookups but never traversed.
    declaration_only: bool,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub output: PathBuf,
    pub strategy: StrategyKind,
    pub files_discovered: usize,
    pub files_indexed: usize,
    pub defs: usize,
    pub usages: usize,
    pub refs: usize,
    pub merges: usize,
    pub unresolved: usize,
    pub unsupported_kinds: Vec<String>,
    pub elapsed_ms: u64,
}

/// Runs one full batch pass and writes the snapshot to `config.output`.
///
/// A fatal error aborts the run before anything is exported.
pub async fn run(config: &IndexerConfig, progress: &IndexingProgress) -> Result<RunSummary> {
    let project = &config.project;
    let walker = FileWalker::new(LanguageRegistry::new());
    let paths = walker.walk(project)?;
    tracing::info!(
        "Found {} source files under {}",
        paths.len(),
        project.root.display()
    );

    let parser = Parser::new(LanguageRegistry::new());
    let mut sources = Vec::with_capacity(paths.len());
    for path in &paths {
        sources.push(SourceFile {
            rel_path: project.relative(path),
            parsed: parser.parse_file(path)?,
            declaration_only: LanguageRegistry::is_declaration_file(path),
        });
    }

    let resolver = ModuleResolver::new(project, sources.iter().map(|s| s.rel_path.clone()));
    let bound: Vec<(&str, &ParsedFile)> = sources
        .iter()
        .map(|s| (s.rel_path.as_str(), &s.parsed))
        .collect();
    let symbols = ProjectSymbols::build(&resolver, &bound);

    let store = Arc::new(SqliteIndex::in_memory()?);
    let queue = WriteQueueHandle::new(store);

    let mut orchestrator = Orchestrator::new(
        &symbols,
        strategy_for(config.strategy),
        config.max_unsupported_kinds,
    );
    for source in &sources {
        let content = config
            .snapshot_content
            .then(|| source.parsed.source.clone());
        orchestrator.register_file(&source.rel_path, content);
    }

    let traversable: Vec<&SourceFile> = sources.iter().filter(|s| !s.declaration_only).collect();
    progress.start(traversable.len());
    tracing::info!(
        "Indexing {} files with the {} strategy",
        traversable.len(),
        config.strategy.as_str()
    );

    for source in &traversable {
        tracing::info!("Analyzing {}", source.rel_path);
        let outcome = orchestrator.index_file(&source.rel_path, &source.parsed)?;

        queue.apply_batch(outcome.ops).await?;
        progress.inc(outcome.counts);
    }

    // VACUUM INTO refuses to overwrite.
    if config.output.exists() {
        std::fs::remove_file(&config.output)?;
    }
    if let Some(parent) = config.output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    queue.export_snapshot(config.output.clone()).await?;
    queue.shutdown().await?;
    progress.finish();

    let snapshot = progress.snapshot();
    let summary = RunSummary {
        output: config.output.clone(),
        strategy: config.strategy,
        files_discovered: sources.len(),
        files_indexed: snapshot.files_processed,
        defs: snapshot.defs,
        usages: snapshot.usages,
        refs: snapshot.refs,
        merges: snapshot.merges,
        unresolved: snapshot.unresolved,
        unsupported_kinds: orchestrator.breaker().kinds().map(str::to_string).collect(),
        elapsed_ms: snapshot.elapsed_ms,
    };
    tracing::info!(
        "Wrote {} ({} defs, {} usages, {} refs, {} merges)",
        summary.output.display(),
        summary.defs,
        summary.usages,
        summary.refs,
        summary.merges
    );
    Ok(summary)
}
