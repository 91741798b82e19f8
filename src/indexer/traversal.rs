//! Traversal orchestrator.
//!
//! One pre-order walk per file. The enclosing Ref id travels down the walk as
//! an explicit [`Scope`] argument; every write the walk produces is collected
//! for the caller to schedule.

use std::collections::BTreeSet;

use tree_sitter::Node;

use crate::error::{IndexerError, Result};
use crate::index::models::{RefKind, Span, StoreOp};
use crate::indexer::classifier::{classify, declaration_name, is_declaration_kind, Classification};
use crate::indexer::identity::{DefKey, DefinitionOccurrence, IdentityStrategy, RefId};
use crate::indexer::merge::{DefLocation, MergeEngine};
use crate::indexer::parser::ParsedFile;
use crate::indexer::progress::FileCounts;
use crate::indexer::symbols::{Occurrence, SourceProvider};
use crate::indexer::syntax::{is_pass_through, is_skipped};
use crate::indexer::usage::{detect_usage, is_usage_kind, UsageEvent, UsageKind};

/// Enclosing tracked declaration.
#[derive(Debug)]
struct Scope<'s> {
    ref_id: &'s str,
}

/// Counts distinct unfamiliar node kinds and trips once the budget is exceeded.
#[derive(Debug)]
pub struct UnsupportedSyntaxBreaker {
    budget: usize,
    seen: BTreeSet<String>,
}

impl UnsupportedSyntaxBreaker {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            seen: BTreeSet::new(),
        }
    }

    pub fn record(&mut self, kind: &str, file: &str, line: u32, column: u32) -> Result<()> {
        if !self.seen.insert(kind.to_string()) {
            return Ok(());
        }

        tracing::warn!(
            "Unsupported syntax `{}` at {}:{}:{} ({}/{})",
            kind,
            file,
            line,
            column,
            self.seen.len(),
            self.budget
        );

        if self.seen.len() > self.budget {
            return Err(IndexerError::UnsupportedSyntax {
                kinds: self.seen.iter().cloned().collect(),
                file: file.to_string(),
                line,
                column,
            });
        }
        Ok(())
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.seen.iter().map(String::as_str)
    }
}

/// Result of indexing one file.
#[derive(Debug, Default)]
pub struct FileOutcome {
    pub ops: Vec<StoreOp>,
    pub counts: FileCounts,
}

struct FileContext<'f> {
    path: &'f str,
    parsed: &'f ParsedFile,
}

impl FileContext<'_> {
    fn text(&self, node: &Node) -> String {
        self.parsed.node_text(node).to_string()
    }
}

pub struct Orchestrator<'p> {
    provider: &'p dyn SourceProvider,
    strategy: Box<dyn IdentityStrategy>,
    engine: MergeEngine,
    breaker: UnsupportedSyntaxBreaker,
}

impl<'p> Orchestrator<'p> {
    pub fn new(
        provider: &'p dyn SourceProvider,
        strategy: Box<dyn IdentityStrategy>,
        max_unsupported_kinds: usize,
    ) -> Self {
        Self {
            provider,
            strategy,
            engine: MergeEngine::new(),
            breaker: UnsupportedSyntaxBreaker::new(max_unsupported_kinds),
        }
    }

    pub fn register_file(&mut self, path: &str, content: Option<String>) {
        self.engine.register_file(path, content);
    }

    pub fn breaker(&self) -> &UnsupportedSyntaxBreaker {
        &self.breaker
    }

    /// Walks one file. `path` is the root-relative path used in ids.
    pub fn index_file(&mut self, path: &str, parsed: &ParsedFile) -> Result<FileOutcome> {
        let ctx = FileContext { path, parsed };
        let mut ops = Vec::new();
        self.walk(&ctx, parsed.root_node(), None, &mut ops)?;

        Ok(FileOutcome {
            ops,
            counts: self.engine.take_counts(),
        })
    }

    fn walk(
        &mut self,
        ctx: &FileContext,
        node: Node,
        scope: Option<&Scope>,
        ops: &mut Vec<StoreOp>,
    ) -> Result<()> {
        let kind = node.kind();
        if is_skipped(kind) {
            return Ok(());
        }

        if is_declaration_kind(kind) {
            let tracked = declaration_name(&node)
                .and_then(|name| classify(&node, ctx.parsed.source_bytes()).map(|k| (name, k)));
            if let Some((name, class)) = tracked {
                let ref_id = self.visit_definition(ctx, &node, &name, class, scope, ops)?;
                let inner = Scope { ref_id: &ref_id };
                return self.walk_children(ctx, node, Some(&name), Some(&inner), ops);
            }
            return self.walk_children(ctx, node, None, scope, ops);
        }

        if is_usage_kind(kind) {
            if let Some(event) = detect_usage(&node, ctx.parsed.source_bytes()) {
                self.visit_usage(ctx, &event, scope, ops);
            }
            return self.walk_children(ctx, node, None, scope, ops);
        }

        if !is_pass_through(kind) {
            let (line, column) = ctx.parsed.line_column(&node);
            self.breaker.record(kind, ctx.path, line, column)?;
        }
        self.walk_children(ctx, node, None, scope, ops)
    }

    fn walk_children(
        &mut self,
        ctx: &FileContext,
        node: Node,
        exclude: Option<&Node>,
        scope: Option<&Scope>,
        ops: &mut Vec<StoreOp>,
    ) -> Result<()> {
        let mut cursor = node.walk();
        let children: Vec<_> = node.named_children(&mut cursor).collect();
        for child in children {
            if exclude.is_some_and(|name| name.id() == child.id()) {
                continue;
            }
            self.walk(ctx, child, scope, ops)?;
        }
        Ok(())
    }

    fn visit_definition(
        &mut self,
        ctx: &FileContext,
        node: &Node,
        name: &Node,
        class: Classification,
        scope: Option<&Scope>,
        ops: &mut Vec<StoreOp>,
    ) -> Result<RefId> {
        let local = ctx.text(name);
        let (line, column) = ctx.parsed.line_column(name);
        let occurrence = Occurrence::plain(ctx.path, name.start_byte(), &local);

        // The binder owns qualified names, so sibling scopes stay distinct.
        let qualified = self
            .provider
            .definitions_at(&occurrence)
            .into_iter()
            .find(|site| site.file == ctx.path && site.span.start == name.start_byte())
            .map(|site| site.name)
            .ok_or_else(|| IndexerError::UnresolvableIdentifier {
                name: local.clone(),
                reason: "no definition found".to_string(),
                file: ctx.path.to_string(),
                line,
                column,
            })?;
        let def = DefinitionOccurrence {
            occurrence,
            key: DefKey::new(ctx.path, qualified.as_str()),
            enclosing: scope.map(|s| s.ref_id),
            line,
            column,
        };

        let resolution = self.strategy.resolve_definition(&def, self.provider)?;
        let location = DefLocation {
            parent_ref_id: scope.map(|s| s.ref_id.to_string()),
            span: Span::of(node),
        };
        let (ref_id, new_ops) =
            self.engine
                .reconcile_definition(&resolution, class.kind(), &def.key, &location);

        tracing::debug!(
            "Found {} `{}` in {}:{}:{}",
            class.as_str(),
            qualified,
            ctx.path,
            line,
            column
        );
        ops.extend(new_ops);
        Ok(ref_id)
    }

    fn visit_usage(
        &mut self,
        ctx: &FileContext,
        event: &UsageEvent,
        scope: Option<&Scope>,
        ops: &mut Vec<StoreOp>,
    ) {
        let occurrence = Occurrence {
            file: ctx.path,
            offset: event.span.start,
            name: &event.text,
            qualifier: event.qualifier.as_deref(),
            member_access: event.member_access,
        };
        let incoming = match event.kind {
            UsageKind::Tag => Some(RefKind::Component),
            UsageKind::Call => None,
        };
        let parent = scope.map(|s| s.ref_id);

        let (_, new_ops) = match self.strategy.resolve_usage(&occurrence, self.provider) {
            Some(resolution) => self.engine.reconcile_usage(
                &resolution,
                incoming,
                ctx.path,
                &event.text,
                event.span,
                parent,
            ),
            None => {
                let (line, column) = ctx.parsed.line_column(&event.node);
                tracing::debug!(
                    "Unresolved {} usage `{}` at {}:{}:{}",
                    event.kind.as_str(),
                    event.text,
                    ctx.path,
                    line,
                    column
                );
                self.engine
                    .record_unresolved(incoming, ctx.path, &event.text, event.span, parent)
            }
        };
        ops.extend(new_ops);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::sqlite::SqliteIndex;
    use crate::index::{RefStore, TableDump};
    use crate::indexer::identity::{hash_parts, strategy_for, StrategyKind};
    use crate::indexer::modules::ModuleResolver;
    use crate::indexer::parser::Parser;
    use crate::indexer::symbols::ProjectSymbols;
    use crate::languages::LanguageRegistry;

    fn parse(path: &str, source: &str) -> ParsedFile {
        let registry = LanguageRegistry::new();
        let grammar = registry.get_for_file(std::path::Path::new(path)).unwrap();
        Parser::new(LanguageRegistry::new())
            .parse_source(path, source, grammar)
            .unwrap()
    }

    fn index(files: &[(&str, &str)], strategy: StrategyKind, budget: usize) -> Result<TableDump> {
        let parsed: Vec<_> = files.iter().map(|(p, s)| (*p, parse(p, s))).collect();
        let refs: Vec<(&str, &ParsedFile)> = parsed.iter().map(|(p, f)| (*p, f)).collect();
        let resolver = ModuleResolver::for_files(files.iter().map(|(p, _)| p.to_string()));
        let symbols = ProjectSymbols::build(&resolver, &refs);

        let store = SqliteIndex::in_memory().unwrap();
        let mut orchestrator = Orchestrator::new(&symbols, strategy_for(strategy), budget);
        for (path, _) in files {
            orchestrator.register_file(path, None);
        }
        for (path, file) in &refs {
            let outcome = orchestrator.index_file(path, file)?;
            store.apply_batch(&outcome.ops)?;
        }
        Ok(store.dump().unwrap())
    }

    fn kind_of(dump: &TableDump, def_name: &str) -> Option<RefKind> {
        let def = dump.defs.iter().find(|d| d.name == def_name).unwrap();
        dump.refs.iter().find(|r| r.id == def.ref_id).unwrap().kind
    }

    #[test]
    fn test_nested_definitions_thread_parent_scope() {
        let src = "function Outer() {\n  function inner() { return 1; }\n  inner();\n  return <div/>;\n}";
        let dump = index(&[("a.tsx", src)], StrategyKind::Structural, 10).unwrap();

        let outer = dump.defs.iter().find(|d| d.name == "Outer").unwrap();
        let inner = dump.defs.iter().find(|d| d.name == "Outer.inner").unwrap();
        assert_eq!(outer.parent_ref_id, None);
        assert_eq!(inner.parent_ref_id.as_deref(), Some(outer.ref_id.as_str()));
        assert_eq!(kind_of(&dump, "Outer"), Some(RefKind::Component));
        assert_eq!(kind_of(&dump, "Outer.inner"), Some(RefKind::Function));

        let call = dump.usages.iter().find(|u| u.used_as == "inner").unwrap();
        assert_eq!(call.ref_id, inner.ref_id);
        assert_eq!(call.parent_ref_id.as_deref(), Some(outer.ref_id.as_str()));
    }

    #[test]
    fn test_hoisted_call_uses_enclosing_ref() {
        let src = "function outer() { inner(); function inner() {} }";
        let dump = index(&[("a.ts", src)], StrategyKind::Structural, 10).unwrap();

        let outer = dump.defs.iter().find(|d| d.name == "outer").unwrap();
        let inner = dump.defs.iter().find(|d| d.name == "outer.inner").unwrap();
        assert_eq!(inner.ref_id, hash_parts(&[outer.ref_id.as_str(), "inner"]));

        let call = dump.usages.iter().find(|u| u.used_as == "inner").unwrap();
        assert_eq!(call.ref_id, inner.ref_id);
        assert_eq!(dump.refs.len(), 2);
    }

    #[test]
    fn test_sibling_method_locals_stay_distinct() {
        let src = "class C {\n  a() { const run = () => 1; return run(); }\n  b() { const run = () => 'x'; return run(); }\n}";
        for strategy in [StrategyKind::Structural, StrategyKind::Semantic] {
            let dump = index(&[("a.ts", src)], strategy, 10).unwrap();

            let mut names: Vec<_> = dump.defs.iter().map(|d| d.name.as_str()).collect();
            names.sort();
            assert_eq!(names, vec!["C.a.run", "C.b.run"], "{:?}", strategy);

            let usages: BTreeSet<_> = dump.usages.iter().map(|u| u.ref_id.as_str()).collect();
            assert_eq!(usages.len(), 2, "{:?}", strategy);
            for def in &dump.defs {
                assert!(usages.contains(def.ref_id.as_str()), "{:?}", strategy);
            }
        }
    }

    #[test]
    fn test_sibling_blocks_stay_distinct() {
        let src = "function f() {\n  if (a) { const run = () => 1; run(); }\n  if (b) { const run = () => 2; run(); }\n}";
        for strategy in [StrategyKind::Structural, StrategyKind::Semantic] {
            let dump = index(&[("a.ts", src)], strategy, 10).unwrap();
            let first = dump.defs.iter().find(|d| d.name == "f.run").unwrap();
            let second = dump.defs.iter().find(|d| d.name == "f.run#2").unwrap();
            assert_ne!(first.ref_id, second.ref_id, "{:?}", strategy);
            assert_eq!(first.parent_ref_id, second.parent_ref_id);
        }
    }

    #[test]
    fn test_component_candidate_waits_for_markup() {
        let a = "export const Fancy = forwardRef(render);\nexport const API_URL = process.env.URL;\nexport const ThemeContext = createContext(null);";
        let b = "import { Fancy } from './a';\nexport const App = () => <Fancy/>;";

        let alone = index(&[("a.tsx", a)], StrategyKind::Structural, 10).unwrap();
        assert_eq!(kind_of(&alone, "Fancy"), None);

        let dump = index(&[("a.tsx", a), ("b.tsx", b)], StrategyKind::Structural, 10).unwrap();
        assert_eq!(kind_of(&dump, "Fancy"), Some(RefKind::Component));
        assert_eq!(kind_of(&dump, "API_URL"), None);
        assert_eq!(kind_of(&dump, "ThemeContext"), None);
    }

    #[test]
    fn test_declaration_name_is_not_a_usage() {
        let src = "const Card = () => <div/>;";
        let dump = index(&[("a.tsx", src)], StrategyKind::Structural, 10).unwrap();
        assert_eq!(dump.defs.len(), 1);
        assert!(dump.usages.is_empty());
    }

    #[test]
    fn test_type_level_syntax_is_skipped() {
        let src = "interface Props { run(): void }\ntype F = () => void;\nfunction f(p: Props): F { return () => {}; }";
        let dump = index(&[("a.ts", src)], StrategyKind::Structural, 0).unwrap();
        assert_eq!(dump.defs.len(), 1);
    }

    #[test]
    fn test_unknown_kinds_trip_breaker() {
        let err = index(&[("a.ts", "function f() {}\n}}} ??? @@")], StrategyKind::Structural, 0)
            .unwrap_err();
        match err {
            IndexerError::UnsupportedSyntax { kinds, file, .. } => {
                assert!(kinds.contains(&"ERROR".to_string()));
                assert_eq!(file, "a.ts");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_breaker_tolerates_budget() {
        let mut breaker = UnsupportedSyntaxBreaker::new(2);
        breaker.record("a", "f.ts", 1, 1).unwrap();
        breaker.record("a", "f.ts", 2, 1).unwrap();
        breaker.record("b", "f.ts", 3, 1).unwrap();
        let err = breaker.record("c", "f.ts", 4, 1).unwrap_err();
        assert!(matches!(err, IndexerError::UnsupportedSyntax { ref kinds, .. } if kinds.len() == 3));
        assert_eq!(breaker.kinds().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unresolved_call_is_recorded() {
        let src = "function f() { console.log(1); fetch(); }";
        let dump = index(&[("a.ts", src)], StrategyKind::Structural, 10).unwrap();
        assert_eq!(dump.usages.len(), 2);
        for usage in &dump.usages {
            assert!(dump.defs.iter().all(|d| d.ref_id != usage.ref_id));
        }
    }

    #[test]
    fn test_semantic_strategy_indexes_cross_file_usage() {
        let a = "export function Btn() { return <span/>; }";
        let b = "import { Btn } from './a';\nexport const App = () => <Btn/>;";
        let dump = index(&[("a.tsx", a), ("b.tsx", b)], StrategyKind::Semantic, 10).unwrap();

        let btn = dump.defs.iter().find(|d| d.name == "Btn").unwrap();
        let usage = dump.usages.iter().find(|u| u.used_as == "Btn").unwrap();
        assert_eq!(usage.ref_id, btn.ref_id);
        assert_eq!(kind_of(&dump, "Btn"), Some(RefKind::Component));
    }
}
