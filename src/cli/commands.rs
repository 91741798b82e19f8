use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use ref_indexer::error::Result;
use ref_indexer::index::sqlite::SqliteIndex;
use ref_indexer::index::RefStore;
use ref_indexer::indexer::{IndexingProgress, StrategyKind};
use ref_indexer::workspace::{IndexerConfig, ProjectDescriptor};

#[derive(Parser)]
#[command(name = "ref-indexer")]
#[command(about = "Cross-file reference index for TypeScript/TSX projects")]
#[command(version)]
#[command(after_long_help = r#"
EXAMPLES:
    # Index the project described by tsconfig.json
    ref-indexer index --project tsconfig.json --out refs.db

    # Index a directory with symbol-based identities
    ref-indexer index --project ./app --out app.db --strategy semantic

    # Show row counts of a snapshot
    ref-indexer stats refs.db
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Index a project and write a reference snapshot
    Index {
        /// tsconfig-style JSON file, or a project directory
        #[arg(long, default_value = ".")]
        project: PathBuf,

        /// Snapshot output path (replaced if it exists)
        #[arg(long, default_value = "refs.db")]
        out: PathBuf,

        /// Identity strategy used for the whole run
        #[arg(long, value_enum, default_value_t = StrategyKind::Structural)]
        strategy: StrategyKind,

        /// Distinct unsupported node kinds tolerated before aborting
        #[arg(long, default_value_t = IndexerConfig::DEFAULT_MAX_UNSUPPORTED_KINDS)]
        max_unsupported_kinds: usize,

        /// Store file contents in the snapshot
        #[arg(long)]
        snapshot_content: bool,
    },

    /// Show snapshot statistics
    Stats {
        /// Path to a snapshot written by `index`
        db: PathBuf,
    },
}

pub async fn index_project(
    project: &Path,
    out: &Path,
    strategy: StrategyKind,
    max_unsupported_kinds: usize,
    snapshot_content: bool,
) -> Result<()> {
    let descriptor = ProjectDescriptor::load(project)?;
    let config = IndexerConfig::new(descriptor, out)
        .with_strategy(strategy)
        .with_max_unsupported_kinds(max_unsupported_kinds)
        .with_snapshot_content(snapshot_content);

    let progress = IndexingProgress::new();
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} files {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let ticker = {
        let progress = progress.clone();
        let bar = bar.clone();
        tokio::spawn(async move {
            loop {
                let snapshot = progress.snapshot();
                bar.set_length(snapshot.files_total as u64);
                bar.set_position(snapshot.files_processed as u64);
                bar.set_message(format!(
                    "({} defs, {} usages)",
                    snapshot.defs, snapshot.usages
                ));
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
    };

    let result = ref_indexer::indexer::run(&config, &progress).await;
    ticker.abort();
    bar.finish_and_clear();
    let summary = result?;

    println!(
        "Indexed {} files ({} discovered) with the {} strategy",
        summary.files_indexed,
        summary.files_discovered,
        summary.strategy.as_str()
    );
    println!("  Defs: {}", summary.defs);
    println!("  Usages: {} ({} unresolved)", summary.usages, summary.unresolved);
    println!("  Refs: {}", summary.refs);
    println!("  Merges: {}", summary.merges);
    if !summary.unsupported_kinds.is_empty() {
        println!(
            "  Unsupported node kinds: {}",
            summary.unsupported_kinds.join(", ")
        );
    }
    println!(
        "Snapshot written to {} in {} ms",
        summary.output.display(),
        summary.elapsed_ms
    );

    Ok(())
}

pub fn show_stats(db_path: &PathBuf) -> Result<()> {
    let index = SqliteIndex::open(db_path)?;
    let counts = index.counts()?;
    let dump = index.dump()?;

    println!("Snapshot Statistics:");
    println!("  Files: {}", counts.files);
    println!("  Refs: {} ({} referenced)", counts.refs, counts.live_refs);
    println!(
        "  Defs: {} ({} without location)",
        counts.defs, counts.placeholder_defs
    );
    println!("  Usages: {}", counts.usages);

    let live: HashSet<&str> = dump
        .defs
        .iter()
        .map(|d| d.ref_id.as_str())
        .chain(dump.usages.iter().map(|u| u.ref_id.as_str()))
        .collect();
    let mut by_kind: BTreeMap<&str, usize> = BTreeMap::new();
    for row in dump.refs.iter().filter(|r| live.contains(r.id.as_str())) {
        let kind = row.kind.map(|k| k.as_str()).unwrap_or("unset");
        *by_kind.entry(kind).or_default() += 1;
    }

    if !by_kind.is_empty() {
        println!("\n  Refs by kind:");
        for (kind, count) in &by_kind {
            println!("    {}: {}", kind, count);
        }
    }

    Ok(())
}
