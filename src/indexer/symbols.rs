//! Project-wide binder.
//!
//! Builds a per-file table of lexical containers, declarations, imports and
//! exports, then answers two questions for any identifier occurrence: which
//! declarations does go-to-definition land on, and which symbol does the
//! occurrence bind to. Both answers follow imports and re-exports across
//! files. The tables hold no tree references, so the parsed trees can be
//! dropped after [`ProjectSymbols::build`] returns.

use std::collections::{BTreeSet, HashMap, HashSet};

use tree_sitter::Node;

use crate::index::models::Span;
use crate::indexer::classifier::{classify, declaration_name, is_declaration_kind};
use crate::indexer::modules::ModuleResolver;
use crate::indexer::parser::{first_named_child, ParsedFile};
use crate::indexer::syntax::{is_skipped, CONTAINER_KINDS};

/// An identifier occurrence handed to a [`SourceProvider`].
#[derive(Debug, Clone, Copy)]
pub struct Occurrence<'a> {
    pub file: &'a str,
    /// Start byte of the identifier.
    pub offset: usize,
    pub name: &'a str,
    /// Plain-identifier object of a member access, as `UI` in `UI.Button`.
    pub qualifier: Option<&'a str>,
    pub member_access: bool,
}

impl<'a> Occurrence<'a> {
    pub fn plain(file: &'a str, offset: usize, name: &'a str) -> Self {
        Self {
            file,
            offset,
            name,
            qualifier: None,
            member_access: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolOrigin {
    Declared,
    /// A module-level import binding.
    Import,
}

/// Identity of one binding: all overloads of a name in one container share it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId {
    pub file: String,
    pub container: (usize, usize),
    pub name: String,
    pub origin: SymbolOrigin,
}

impl SymbolId {
    pub fn key_parts(&self) -> Vec<String> {
        let origin = match self.origin {
            SymbolOrigin::Declared => "declared",
            SymbolOrigin::Import => "import",
        };
        vec![
            origin.to_string(),
            self.file.clone(),
            self.container.0.to_string(),
            self.container.1.to_string(),
            self.name.clone(),
        ]
    }
}

/// A declaration name that go-to-definition may land on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DefSite {
    pub file: String,
    /// Names of enclosing tracked declarations and named scopes plus the
    /// local name, joined with `.`. A name already taken by a sibling scope
    /// gets a `#2`, `#3`, ... suffix.
    pub name: String,
    pub local: String,
    /// Qualified name of the nearest enclosing tracked declaration.
    pub parent: Option<String>,
    /// Span of the name identifier.
    pub span: Span,
    pub symbol: SymbolId,
}

impl DefSite {
    /// Qualified name relative to `parent`, or the whole name at top level.
    pub fn scoped_name(&self) -> &str {
        self.parent
            .as_deref()
            .and_then(|parent| self.name.strip_prefix(parent))
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(&self.name)
    }
}

/// Symbol an occurrence binds to, and for import bindings the aliased declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolInfo {
    pub direct: Option<SymbolId>,
    pub alias_target: Option<SymbolId>,
}

impl SymbolInfo {
    /// The declaration behind an alias when known, else the direct symbol.
    pub fn resolved(&self) -> Option<&SymbolId> {
        self.alias_target.as_ref().or(self.direct.as_ref())
    }
}

/// Read-only code-intelligence queries used by the identity strategies.
pub trait SourceProvider: Send + Sync {
    /// Declaration sites of the occurrence, sorted by file then qualified name.
    fn definitions_at(&self, occurrence: &Occurrence) -> Vec<DefSite>;
    fn symbol_info(&self, occurrence: &Occurrence) -> SymbolInfo;
}

// ============================================================================
// Module tables
// ============================================================================

#[derive(Debug, Default)]
struct Container {
    span: (usize, usize),
    decls: HashMap<String, Vec<usize>>,
    /// Bindings that are not tracked declarations, such as parameters.
    shadows: HashSet<String>,
}

#[derive(Debug, Clone)]
enum ImportBinding {
    /// `module` is `None` for packages outside the project.
    Named {
        module: Option<String>,
        imported: String,
    },
    Namespace {
        module: Option<String>,
    },
}

#[derive(Debug, Clone)]
enum ExportTarget {
    Local(String),
    ReExport {
        module: Option<String>,
        imported: String,
    },
    Namespace {
        module: Option<String>,
    },
}

#[derive(Debug, Default)]
struct ModuleTable {
    /// Index 0 is the whole file.
    containers: Vec<Container>,
    imports: HashMap<String, ImportBinding>,
    exports: HashMap<String, ExportTarget>,
    stars: Vec<String>,
    sites: Vec<DefSite>,
    site_by_start: HashMap<usize, usize>,
    /// Files without imports or exports are scripts; their top level is global.
    is_module: bool,
}

impl ModuleTable {
    /// Containers enclosing `offset`, innermost first.
    fn enclosing(&self, offset: usize) -> Vec<&Container> {
        let mut found: Vec<&Container> = self
            .containers
            .iter()
            .filter(|c| c.span.0 <= offset && offset < c.span.1.max(c.span.0 + 1))
            .collect();
        found.sort_by_key(|c| c.span.1 - c.span.0);
        found
    }

    fn group_of(&self, site: &DefSite) -> Vec<usize> {
        self.containers
            .iter()
            .find(|c| c.span == site.symbol.container)
            .and_then(|c| c.decls.get(&site.local))
            .cloned()
            .unwrap_or_default()
    }
}

enum Lookup<'t> {
    Declared(Vec<usize>),
    Import(&'t ImportBinding),
    Shadowed,
    Missing,
}

enum Resolved {
    Sites(Vec<DefSite>),
    Namespace(String),
    Nothing,
}

// ============================================================================
// Project symbols
// ============================================================================

pub struct ProjectSymbols {
    modules: HashMap<String, ModuleTable>,
}

impl ProjectSymbols {
    /// Binds every file. Paths are root-relative with forward slashes.
    pub fn build(resolver: &ModuleResolver, files: &[(&str, &ParsedFile)]) -> Self {
        let mut modules = HashMap::new();

        for (path, parsed) in files {
            let mut binder = Binder {
                file: path,
                source: parsed.source_bytes(),
                resolver,
                table: ModuleTable::default(),
                claimed: HashMap::new(),
            };
            let root = parsed.root_node();
            binder.table.containers.push(Container {
                span: (root.start_byte(), root.end_byte()),
                ..Container::default()
            });
            let mut segments = Vec::new();
            binder.visit(root, BindScope::default(), &mut segments);
            modules.insert(path.to_string(), binder.table);
        }

        tracing::debug!("Bound {} modules", modules.len());
        Self { modules }
    }

    /// Every declaration site recorded for a file, in source order.
    pub fn sites(&self, file: &str) -> &[DefSite] {
        self.modules
            .get(file)
            .map(|t| t.sites.as_slice())
            .unwrap_or(&[])
    }

    fn site_at(&self, file: &str, offset: usize, name: &str) -> Option<(&ModuleTable, &DefSite)> {
        let table = self.modules.get(file)?;
        let site = &table.sites[*table.site_by_start.get(&offset)?];
        (site.local == name).then_some((table, site))
    }

    fn lookup<'t>(&'t self, file: &str, offset: usize, name: &str) -> Lookup<'t> {
        let Some(table) = self.modules.get(file) else {
            return Lookup::Missing;
        };
        for container in table.enclosing(offset) {
            if let Some(indices) = container.decls.get(name) {
                return Lookup::Declared(indices.clone());
            }
            if container.shadows.contains(name) {
                return Lookup::Shadowed;
            }
        }
        match table.imports.get(name) {
            Some(binding) => Lookup::Import(binding),
            None => Lookup::Missing,
        }
    }

    fn collect(&self, file: &str, indices: &[usize]) -> Vec<DefSite> {
        self.modules
            .get(file)
            .map(|t| indices.iter().map(|&i| t.sites[i].clone()).collect())
            .unwrap_or_default()
    }

    fn resolve_name(&self, file: &str, offset: usize, name: &str) -> Resolved {
        match self.lookup(file, offset, name) {
            Lookup::Declared(indices) => Resolved::Sites(self.collect(file, &indices)),
            Lookup::Import(binding) => self.resolve_import(binding, &mut HashSet::new()),
            Lookup::Missing => match self.global_sites(name) {
                sites if sites.is_empty() => Resolved::Nothing,
                sites => Resolved::Sites(sites),
            },
            Lookup::Shadowed => Resolved::Nothing,
        }
    }

    /// Top-level declarations of script files, such as ambient `.d.ts` globals.
    fn global_sites(&self, name: &str) -> Vec<DefSite> {
        let mut sites = Vec::new();
        for (file, table) in &self.modules {
            if table.is_module {
                continue;
            }
            if let Some(indices) = table.containers.first().and_then(|c| c.decls.get(name)) {
                sites.extend(self.collect(file, indices));
            }
        }
        sites
    }

    fn resolve_import(
        &self,
        binding: &ImportBinding,
        visited: &mut HashSet<(String, String)>,
    ) -> Resolved {
        match binding {
            ImportBinding::Named {
                module: Some(module),
                imported,
            } => self.resolve_export(module, imported, visited),
            ImportBinding::Namespace {
                module: Some(module),
            } => Resolved::Namespace(module.clone()),
            _ => Resolved::Nothing,
        }
    }

    /// Follows an exported name through re-exports and star exports.
    fn resolve_export(
        &self,
        module: &str,
        name: &str,
        visited: &mut HashSet<(String, String)>,
    ) -> Resolved {
        if !visited.insert((module.to_string(), name.to_string())) {
            return Resolved::Nothing;
        }
        let Some(table) = self.modules.get(module) else {
            return Resolved::Nothing;
        };

        match table.exports.get(name) {
            Some(ExportTarget::Local(local)) => self.resolve_module_scope(module, local, visited),
            Some(ExportTarget::ReExport {
                module: Some(target),
                imported,
            }) => self.resolve_export(target, imported, visited),
            Some(ExportTarget::Namespace {
                module: Some(target),
            }) => Resolved::Namespace(target.clone()),
            Some(_) => Resolved::Nothing,
            None if name == "default" => Resolved::Nothing,
            None => {
                let mut sites = Vec::new();
                for star in &table.stars {
                    if let Resolved::Sites(found) = self.resolve_export(star, name, visited) {
                        sites.extend(found);
                    }
                }
                if sites.is_empty() {
                    Resolved::Nothing
                } else {
                    Resolved::Sites(sites)
                }
            }
        }
    }

    fn resolve_module_scope(
        &self,
        module: &str,
        local: &str,
        visited: &mut HashSet<(String, String)>,
    ) -> Resolved {
        let Some(table) = self.modules.get(module) else {
            return Resolved::Nothing;
        };
        if let Some(indices) = table.containers.first().and_then(|c| c.decls.get(local)) {
            return Resolved::Sites(self.collect(module, indices));
        }
        match table.imports.get(local) {
            Some(binding) => self.resolve_import(binding, visited),
            None => Resolved::Nothing,
        }
    }

    fn resolve_occurrence(&self, occurrence: &Occurrence) -> Resolved {
        if let Some(qualifier) = occurrence.qualifier {
            return match self.resolve_name(occurrence.file, occurrence.offset, qualifier) {
                Resolved::Namespace(module) => {
                    self.resolve_export(&module, occurrence.name, &mut HashSet::new())
                }
                _ => Resolved::Nothing,
            };
        }
        if occurrence.member_access {
            return Resolved::Nothing;
        }
        self.resolve_name(occurrence.file, occurrence.offset, occurrence.name)
    }
}

fn sorted_sites(mut sites: Vec<DefSite>) -> Vec<DefSite> {
    sites.sort_by(|a, b| {
        (&a.file, &a.name, a.span.start).cmp(&(&b.file, &b.name, b.span.start))
    });
    sites.dedup();
    sites
}

fn unique_symbol(sites: &[DefSite]) -> Option<SymbolId> {
    let symbols: BTreeSet<&SymbolId> = sites.iter().map(|s| &s.symbol).collect();
    if symbols.len() == 1 {
        symbols.into_iter().next().cloned()
    } else {
        None
    }
}

impl SourceProvider for ProjectSymbols {
    fn definitions_at(&self, occurrence: &Occurrence) -> Vec<DefSite> {
        if let Some((table, site)) = self.site_at(occurrence.file, occurrence.offset, occurrence.name)
        {
            let group = table.group_of(site);
            return sorted_sites(self.collect(occurrence.file, &group));
        }

        match self.resolve_occurrence(occurrence) {
            Resolved::Sites(sites) => sorted_sites(sites),
            Resolved::Namespace(_) | Resolved::Nothing => Vec::new(),
        }
    }

    fn symbol_info(&self, occurrence: &Occurrence) -> SymbolInfo {
        if let Some((_, site)) = self.site_at(occurrence.file, occurrence.offset, occurrence.name) {
            return SymbolInfo {
                direct: Some(site.symbol.clone()),
                alias_target: None,
            };
        }

        if occurrence.qualifier.is_some() || occurrence.member_access {
            return SymbolInfo {
                direct: None,
                alias_target: unique_symbol(&self.definitions_at(occurrence)),
            };
        }

        match self.lookup(occurrence.file, occurrence.offset, occurrence.name) {
            Lookup::Declared(indices) => SymbolInfo {
                direct: unique_symbol(&self.collect(occurrence.file, &indices)),
                alias_target: None,
            },
            Lookup::Import(binding) => {
                let program = self
                    .modules
                    .get(occurrence.file)
                    .and_then(|t| t.containers.first())
                    .map(|c| c.span)
                    .unwrap_or((0, 0));
                let target = match self.resolve_import(binding, &mut HashSet::new()) {
                    Resolved::Sites(sites) => unique_symbol(&sites),
                    _ => None,
                };
                SymbolInfo {
                    direct: Some(SymbolId {
                        file: occurrence.file.to_string(),
                        container: program,
                        name: occurrence.name.to_string(),
                        origin: SymbolOrigin::Import,
                    }),
                    alias_target: target,
                }
            }
            Lookup::Missing => SymbolInfo {
                direct: unique_symbol(&self.global_sites(occurrence.name)),
                alias_target: None,
            },
            Lookup::Shadowed => SymbolInfo::default(),
        }
    }
}

// ============================================================================
// Binding pass
// ============================================================================

struct Binder<'a> {
    file: &'a str,
    source: &'a [u8],
    resolver: &'a ModuleResolver,
    table: ModuleTable,
    /// Qualified name to the container that declared it first.
    claimed: HashMap<String, usize>,
}

/// Containers receiving declarations at the current node.
#[derive(Debug, Clone, Copy, Default)]
struct BindScope {
    /// Innermost block or function, for `let`, `const`, functions and classes.
    block: usize,
    /// Innermost function, for `var`.
    function: usize,
}

/// One name on the qualification path.
#[derive(Debug)]
struct Segment {
    name: String,
    tracked: bool,
}

fn qualify(path: &[Segment], local: &str) -> String {
    let mut qualified = String::new();
    for segment in path {
        qualified.push_str(&segment.name);
        qualified.push('.');
    }
    qualified.push_str(local);
    qualified
}

fn tracked_parent(path: &[Segment]) -> Option<String> {
    let end = path.iter().rposition(|s| s.tracked)?;
    let (last, outer) = path[..=end].split_last()?;
    Some(qualify(outer, &last.name))
}

fn is_var_declarator(node: &Node) -> bool {
    node.parent()
        .is_some_and(|parent| parent.kind() == "variable_declaration")
}

impl<'a> Binder<'a> {
    fn text(&self, node: &Node) -> String {
        node.utf8_text(self.source).unwrap_or("").to_string()
    }

    fn visit(&mut self, node: Node, scope: BindScope, path: &mut Vec<Segment>) {
        let kind = node.kind();
        if is_skipped(kind) {
            return;
        }

        match kind {
            "import_statement" => {
                self.table.is_module = true;
                self.bind_import(&node);
                return;
            }
            // Namespace members are exported from the namespace, not the file.
            "export_statement" if scope.block == 0 => {
                self.table.is_module = true;
                self.bind_export(&node);
            }
            "catch_clause" => {
                if let Some(param) = node.child_by_field_name("parameter") {
                    self.shadow_pattern(scope.block, &param);
                }
            }
            "for_in_statement" => {
                if node.child_by_field_name("kind").is_some() {
                    if let Some(left) = node.child_by_field_name("left") {
                        self.shadow_pattern(scope.block, &left);
                    }
                }
            }
            _ => {}
        }

        let segment = match kind {
            "function_declaration"
            | "generator_function_declaration"
            | "function_signature"
            | "class_declaration"
            | "abstract_class_declaration" => node
                .child_by_field_name("name")
                .and_then(|name| self.declare(scope.block, &name, path)),
            "variable_declarator" => {
                let target = if is_var_declarator(&node) {
                    scope.function
                } else {
                    scope.block
                };
                match node.child_by_field_name("name") {
                    Some(name) if name.kind() == "identifier" => self.declare(target, &name, path),
                    Some(pattern) => {
                        self.shadow_pattern(target, &pattern);
                        None
                    }
                    None => None,
                }
            }
            "method_definition" | "internal_module" | "module" => {
                node.child_by_field_name("name").map(|name| self.text(&name))
            }
            _ => None,
        };

        let tracked =
            declaration_name(&node).is_some() && classify(&node, self.source).is_some();
        let pushed = match segment {
            Some(name) if tracked || !is_declaration_kind(kind) => {
                path.push(Segment { name, tracked });
                true
            }
            _ => false,
        };

        let inner = if kind == "statement_block" {
            BindScope {
                block: self.open_container(&node),
                function: scope.function,
            }
        } else if CONTAINER_KINDS.contains(kind) && kind != "program" {
            let idx = self.open_container(&node);
            BindScope {
                block: idx,
                function: idx,
            }
        } else {
            scope
        };

        let mut cursor = node.walk();
        let children: Vec<_> = node.named_children(&mut cursor).collect();
        for child in children {
            self.visit(child, inner, path);
        }

        if pushed {
            path.pop();
        }
    }

    fn open_container(&mut self, node: &Node) -> usize {
        self.table.containers.push(Container {
            span: (node.start_byte(), node.end_byte()),
            ..Container::default()
        });
        let idx = self.table.containers.len() - 1;

        if let Some(params) = node.child_by_field_name("parameters") {
            self.shadow_pattern(idx, &params);
        }
        if let Some(param) = node.child_by_field_name("parameter") {
            self.shadow_pattern(idx, &param);
        }
        // A named function expression binds its own name inside itself.
        if matches!(node.kind(), "function_expression" | "function" | "generator_function") {
            if let Some(name) = node.child_by_field_name("name") {
                let name = self.text(&name);
                self.table.containers[idx].shadows.insert(name);
            }
        }
        idx
    }

    /// Records a declaration site and returns its final path segment.
    fn declare(&mut self, container: usize, name: &Node, path: &[Segment]) -> Option<String> {
        let local = self.text(name);
        if local.is_empty() {
            return None;
        }
        let (qualified, segment) = self.claim(path, &local, container);
        let span = Span::of(name);
        let site = DefSite {
            file: self.file.to_string(),
            name: qualified,
            local: local.clone(),
            parent: tracked_parent(path),
            span,
            symbol: SymbolId {
                file: self.file.to_string(),
                container: self.table.containers[container].span,
                name: local.clone(),
                origin: SymbolOrigin::Declared,
            },
        };

        let idx = self.table.sites.len();
        self.table.sites.push(site);
        self.table.site_by_start.insert(span.start, idx);
        self.table.containers[container]
            .decls
            .entry(local)
            .or_default()
            .push(idx);
        Some(segment)
    }

    /// Qualified name for `local` in `container`. Overloads and redeclarations
    /// in one container share a name; a sibling container reusing it gets the
    /// next free `#n` suffix.
    fn claim(&mut self, path: &[Segment], local: &str, container: usize) -> (String, String) {
        let mut segment = local.to_string();
        let mut n = 1;
        loop {
            let qualified = qualify(path, &segment);
            match self.claimed.get(&qualified) {
                Some(&owner) if owner != container => {
                    n += 1;
                    segment = format!("{}#{}", local, n);
                }
                Some(_) => return (qualified, segment),
                None => {
                    self.claimed.insert(qualified.clone(), container);
                    return (qualified, segment);
                }
            }
        }
    }

    fn shadow_pattern(&mut self, container: usize, pattern: &Node) {
        let mut names = Vec::new();
        collect_pattern_names(pattern, self.source, &mut names);
        self.table.containers[container].shadows.extend(names);
    }

    fn module_of(&self, statement: &Node) -> Option<Option<String>> {
        let source = statement.child_by_field_name("source")?;
        let specifier = string_value(&source, self.source);
        Some(self.resolver.resolve(self.file, &specifier))
    }

    fn bind_import(&mut self, node: &Node) {
        let Some(module) = self.module_of(node) else {
            return;
        };

        let mut cursor = node.walk();
        let clauses: Vec<_> = node
            .named_children(&mut cursor)
            .filter(|c| c.kind() == "import_clause")
            .collect();

        for clause in clauses {
            let mut cursor = clause.walk();
            let parts: Vec<_> = clause.named_children(&mut cursor).collect();
            for part in parts {
                match part.kind() {
                    "identifier" => {
                        self.table.imports.insert(
                            self.text(&part),
                            ImportBinding::Named {
                                module: module.clone(),
                                imported: "default".to_string(),
                            },
                        );
                    }
                    "namespace_import" => {
                        if let Some(ident) = first_named_child(&part) {
                            self.table.imports.insert(
                                self.text(&ident),
                                ImportBinding::Namespace {
                                    module: module.clone(),
                                },
                            );
                        }
                    }
                    "named_imports" => {
                        for (imported, local) in self.specifiers(&part, "import_specifier") {
                            self.table.imports.insert(
                                local,
                                ImportBinding::Named {
                                    module: module.clone(),
                                    imported,
                                },
                            );
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    fn bind_export(&mut self, node: &Node) {
        let module = self.module_of(node);
        let mut cursor = node.walk();
        let is_default = node.children(&mut cursor).any(|c| c.kind() == "default");

        if let Some(decl) = node.child_by_field_name("declaration") {
            let names = self.declared_names(&decl);
            if is_default {
                if let Some(first) = names.into_iter().next() {
                    self.table
                        .exports
                        .insert("default".to_string(), ExportTarget::Local(first));
                }
            } else {
                for name in names {
                    self.table
                        .exports
                        .insert(name.clone(), ExportTarget::Local(name));
                }
            }
            return;
        }

        if let Some(value) = node.child_by_field_name("value") {
            if value.kind() == "identifier" {
                let local = self.text(&value);
                self.table
                    .exports
                    .insert("default".to_string(), ExportTarget::Local(local));
            }
            return;
        }

        let mut has_clause = false;
        let mut cursor = node.walk();
        let children: Vec<_> = node.named_children(&mut cursor).collect();
        for child in children {
            match child.kind() {
                "export_clause" => {
                    has_clause = true;
                    for (name, alias) in self.specifiers(&child, "export_specifier") {
                        let target = match &module {
                            Some(module) => ExportTarget::ReExport {
                                module: module.clone(),
                                imported: name,
                            },
                            None => ExportTarget::Local(name),
                        };
                        self.table.exports.insert(alias, target);
                    }
                }
                "namespace_export" => {
                    has_clause = true;
                    if let Some(ident) = first_named_child(&child) {
                        let alias = string_value(&ident, self.source);
                        self.table.exports.insert(
                            alias,
                            ExportTarget::Namespace {
                                module: module.clone().flatten(),
                            },
                        );
                    }
                }
                _ => {}
            }
        }

        if !has_clause {
            if let Some(Some(target)) = module {
                self.table.stars.push(target);
            }
        }
    }

    /// `(name, alias)` pairs of import or export specifiers.
    fn specifiers(&self, list: &Node, kind: &str) -> Vec<(String, String)> {
        let mut cursor = list.walk();
        list.named_children(&mut cursor)
            .filter(|s| s.kind() == kind)
            .filter_map(|s| {
                let name = string_value(&s.child_by_field_name("name")?, self.source);
                let alias = s
                    .child_by_field_name("alias")
                    .map(|a| string_value(&a, self.source))
                    .unwrap_or_else(|| name.clone());
                Some((name, alias))
            })
            .collect()
    }

    /// Names a declaration statement binds at module level.
    fn declared_names(&self, decl: &Node) -> Vec<String> {
        match decl.kind() {
            "lexical_declaration" | "variable_declaration" => {
                let mut cursor = decl.walk();
                decl.named_children(&mut cursor)
                    .filter(|d| d.kind() == "variable_declarator")
                    .filter_map(|d| d.child_by_field_name("name"))
                    .filter(|n| n.kind() == "identifier")
                    .map(|n| self.text(&n))
                    .collect()
            }
            _ => decl
                .child_by_field_name("name")
                .map(|n| vec![self.text(&n)])
                .unwrap_or_default(),
        }
    }
}

/// Identifier text, or the contents of a string literal used as a name.
fn string_value(node: &Node, source: &[u8]) -> String {
    let text = node.utf8_text(source).unwrap_or("");
    if node.kind() == "string" {
        text.trim_matches(|c| c == '"' || c == '\'').to_string()
    } else {
        text.to_string()
    }
}

/// Collects every identifier a binding pattern introduces.
fn collect_pattern_names(node: &Node, source: &[u8], out: &mut Vec<String>) {
    match node.kind() {
        "identifier" | "shorthand_property_identifier_pattern" => {
            if let Ok(text) = node.utf8_text(source) {
                out.push(text.to_string());
            }
        }
        "required_parameter" | "optional_parameter" => {
            if let Some(pattern) = node.child_by_field_name("pattern") {
                collect_pattern_names(&pattern, source, out);
            }
        }
        "pair_pattern" => {
            if let Some(value) = node.child_by_field_name("value") {
                collect_pattern_names(&value, source, out);
            }
        }
        "assignment_pattern" | "object_assignment_pattern" => {
            if let Some(left) = node.child_by_field_name("left") {
                collect_pattern_names(&left, source, out);
            }
        }
        kind if is_skipped(kind) => {}
        _ => {
            let mut cursor = node.walk();
            let children: Vec<_> = node.named_children(&mut cursor).collect();
            for child in children {
                collect_pattern_names(&child, source, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::parser::Parser;
    use crate::languages::LanguageRegistry;

    fn parse(path: &str, source: &str) -> ParsedFile {
        let registry = LanguageRegistry::new();
        let grammar = registry.get_for_file(std::path::Path::new(path)).unwrap();
        Parser::new(LanguageRegistry::new())
            .parse_source(path, source, grammar)
            .unwrap()
    }

    fn build(files: &[(&str, &str)]) -> (ProjectSymbols, Vec<(String, String)>) {
        let parsed: Vec<_> = files.iter().map(|(p, s)| (*p, parse(p, s))).collect();
        let refs: Vec<(&str, &ParsedFile)> = parsed.iter().map(|(p, f)| (*p, f)).collect();
        let resolver = ModuleResolver::for_files(files.iter().map(|(p, _)| p.to_string()));
        let sources = files
            .iter()
            .map(|(p, s)| (p.to_string(), s.to_string()))
            .collect();
        (ProjectSymbols::build(&resolver, &refs), sources)
    }

    fn offset(source: &str, needle: &str) -> usize {
        source.find(needle).unwrap()
    }

    fn names(sites: &[DefSite]) -> Vec<(String, String)> {
        sites
            .iter()
            .map(|s| (s.file.clone(), s.name.clone()))
            .collect()
    }

    #[test]
    fn test_local_declaration_and_call() {
        let src = "function helper() {}\nfunction main() { helper(); }";
        let (symbols, _) = build(&[("a.ts", src)]);

        let call = src.rfind("helper").unwrap();
        let sites = symbols.definitions_at(&Occurrence::plain("a.ts", call, "helper"));
        assert_eq!(names(&sites), vec![("a.ts".into(), "helper".into())]);
        assert_eq!(sites[0].span.start, offset(src, "helper"));
    }

    #[test]
    fn test_qualified_names_follow_tracked_declarations() {
        let src = "function Outer() { function inner() {} const k = 1; return <div/>; }";
        let (symbols, _) = build(&[("a.tsx", src)]);
        let qualified: Vec<_> = symbols.sites("a.tsx").iter().map(|s| s.name.clone()).collect();
        assert_eq!(qualified, vec!["Outer", "Outer.inner", "Outer.k"]);
    }

    #[test]
    fn test_untracked_declaration_does_not_qualify() {
        let src = "const value = compute(() => { function helper() {} });";
        let (symbols, _) = build(&[("a.ts", src)]);
        let qualified: Vec<_> = symbols.sites("a.ts").iter().map(|s| s.name.clone()).collect();
        assert_eq!(qualified, vec!["value", "helper"]);
    }

    #[test]
    fn test_untracked_named_scopes_qualify() {
        let src = "class C {\n  a() { const run = () => 1; return run(); }\n  b() { const run = () => 'x'; return run(); }\n}\nnamespace N { export function run() {} }";
        let (symbols, _) = build(&[("a.ts", src)]);
        let qualified: Vec<_> = symbols.sites("a.ts").iter().map(|s| s.name.clone()).collect();
        assert_eq!(qualified, vec!["C", "C.a.run", "C.b.run", "N.run"]);

        let second_call = src.rfind("return run()").unwrap() + "return ".len();
        let sites = symbols.definitions_at(&Occurrence::plain("a.ts", second_call, "run"));
        assert_eq!(names(&sites), vec![("a.ts".into(), "C.b.run".into())]);
    }

    #[test]
    fn test_sibling_blocks_get_distinct_names() {
        let src = "{ const run = () => 1; run(); }\n{ const run = () => 2; run(); }";
        let (symbols, _) = build(&[("a.ts", src)]);
        let sites = symbols.sites("a.ts");
        assert_eq!(sites[0].name, "run");
        assert_eq!(sites[1].name, "run#2");
        assert_ne!(sites[0].symbol, sites[1].symbol);

        let second_call = src.rfind("run()").unwrap();
        let found = symbols.definitions_at(&Occurrence::plain("a.ts", second_call, "run"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "run#2");
    }

    #[test]
    fn test_var_is_function_scoped() {
        let src = "function f() { if (ok) { var limit = 1; } return limit; }";
        let (symbols, _) = build(&[("a.ts", src)]);
        let at = src.rfind("limit").unwrap();
        let sites = symbols.definitions_at(&Occurrence::plain("a.ts", at, "limit"));
        assert_eq!(names(&sites), vec![("a.ts".into(), "f.limit".into())]);
    }

    #[test]
    fn test_nested_site_records_tracked_parent() {
        let src = "function outer() {\n  class K { m() { const run = () => 1; } }\n  function inner() {}\n}";
        let (symbols, _) = build(&[("a.ts", src)]);
        let sites = symbols.sites("a.ts");

        let outer = sites.iter().find(|s| s.name == "outer").unwrap();
        assert_eq!(outer.parent, None);
        assert_eq!(outer.scoped_name(), "outer");

        let run = sites.iter().find(|s| s.local == "run").unwrap();
        assert_eq!(run.name, "outer.K.m.run");
        assert_eq!(run.parent.as_deref(), Some("outer"));
        assert_eq!(run.scoped_name(), "K.m.run");

        let inner = sites.iter().find(|s| s.local == "inner").unwrap();
        assert_eq!(inner.scoped_name(), "inner");
    }

    #[test]
    fn test_named_import_and_alias() {
        let lib = "export function Button() { return <b/>; }";
        let app = "import { Button as B } from './lib';\nconst x = <B/>;";
        let (symbols, _) = build(&[("lib.tsx", lib), ("app.tsx", app)]);

        let at = app.rfind('B').unwrap();
        let occurrence = Occurrence::plain("app.tsx", at, "B");
        let sites = symbols.definitions_at(&occurrence);
        assert_eq!(names(&sites), vec![("lib.tsx".into(), "Button".into())]);

        let info = symbols.symbol_info(&occurrence);
        assert_eq!(info.direct.as_ref().unwrap().origin, SymbolOrigin::Import);
        assert_eq!(info.alias_target.as_ref().unwrap().file, "lib.tsx");
        assert_eq!(info.resolved().unwrap().name, "Button");
    }

    #[test]
    fn test_default_export_and_reexport_chain() {
        let a = "function Card() { return <i/>; }\nexport default Card;";
        let b = "export { default as Card } from './a';";
        let c = "export * from './b';";
        let app = "import { Card } from './c';\nCard();";
        let (symbols, _) = build(&[("a.tsx", a), ("b.ts", b), ("c.ts", c), ("app.ts", app)]);

        let at = app.rfind("Card").unwrap();
        let sites = symbols.definitions_at(&Occurrence::plain("app.ts", at, "Card"));
        assert_eq!(names(&sites), vec![("a.tsx".into(), "Card".into())]);
    }

    #[test]
    fn test_star_cycle_terminates() {
        let a = "export * from './b';";
        let b = "export * from './a';";
        let app = "import { nothing } from './a';\nnothing();";
        let (symbols, _) = build(&[("a.ts", a), ("b.ts", b), ("app.ts", app)]);

        let at = app.rfind("nothing").unwrap();
        assert!(symbols
            .definitions_at(&Occurrence::plain("app.ts", at, "nothing"))
            .is_empty());
    }

    #[test]
    fn test_ambiguous_star_exports_return_both() {
        let x = "export function Btn() { return <a/>; }";
        let y = "export function Btn() { return <b/>; }";
        let idx = "export * from './x';\nexport * from './y';";
        let app = "import { Btn } from './idx';\nconst v = <Btn/>;";
        let (symbols, _) = build(&[("x.tsx", x), ("y.tsx", y), ("idx.ts", idx), ("app.tsx", app)]);

        let at = app.rfind("Btn").unwrap();
        let occurrence = Occurrence::plain("app.tsx", at, "Btn");
        let sites = symbols.definitions_at(&occurrence);
        assert_eq!(
            names(&sites),
            vec![("x.tsx".into(), "Btn".into()), ("y.tsx".into(), "Btn".into())]
        );
        assert!(symbols.symbol_info(&occurrence).alias_target.is_none());
    }

    #[test]
    fn test_namespace_import_member_access() {
        let ui = "export function Button() { return <b/>; }";
        let app = "import * as UI from './ui';\nconst v = <UI.Button/>;\nobj.Button();";
        let (symbols, _) = build(&[("ui.tsx", ui), ("app.tsx", app)]);

        let tag = app.find("Button").unwrap();
        let qualified = Occurrence {
            file: "app.tsx",
            offset: tag,
            name: "Button",
            qualifier: Some("UI"),
            member_access: true,
        };
        assert_eq!(
            names(&symbols.definitions_at(&qualified)),
            vec![("ui.tsx".into(), "Button".into())]
        );

        let method = app.rfind("Button").unwrap();
        let member = Occurrence {
            file: "app.tsx",
            offset: method,
            name: "Button",
            qualifier: Some("obj"),
            member_access: true,
        };
        assert!(symbols.definitions_at(&member).is_empty());
    }

    #[test]
    fn test_parameters_shadow_outer_declarations() {
        let src = "function run() {}\nfunction call(run: () => void) { run(); }";
        let (symbols, _) = build(&[("a.ts", src)]);
        let at = src.rfind("run").unwrap();
        let occurrence = Occurrence::plain("a.ts", at, "run");
        assert!(symbols.definitions_at(&occurrence).is_empty());
        assert_eq!(symbols.symbol_info(&occurrence), SymbolInfo::default());
    }

    #[test]
    fn test_overloads_share_one_symbol() {
        let src = "function f(a: string): void;\nfunction f(a: number): void;\nfunction f(a: any) {}\nf(1);";
        let (symbols, _) = build(&[("a.ts", src)]);

        let at = src.rfind("f(1)").unwrap();
        let occurrence = Occurrence::plain("a.ts", at, "f");
        let sites = symbols.definitions_at(&occurrence);
        assert_eq!(sites.len(), 3);
        assert!(symbols.symbol_info(&occurrence).direct.is_some());
    }

    #[test]
    fn test_definition_site_maps_to_itself() {
        let src = "export const LIMIT = 10;";
        let (symbols, _) = build(&[("a.ts", src)]);
        let at = offset(src, "LIMIT");
        let occurrence = Occurrence::plain("a.ts", at, "LIMIT");

        let sites = symbols.definitions_at(&occurrence);
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].span.start, at);
        let info = symbols.symbol_info(&occurrence);
        assert_eq!(info.direct, Some(sites[0].symbol.clone()));
    }

    #[test]
    fn test_script_declarations_are_global() {
        let globals = "declare function track(event: string): void;";
        let app = "export function boot() { track('start'); }";
        let lib = "export function track() {}";
        let (symbols, _) = build(&[("globals.d.ts", globals), ("app.ts", app), ("lib.ts", lib)]);

        let at = app.find("track").unwrap();
        let occurrence = Occurrence::plain("app.ts", at, "track");
        assert_eq!(
            names(&symbols.definitions_at(&occurrence)),
            vec![("globals.d.ts".into(), "track".into())]
        );
        let info = symbols.symbol_info(&occurrence);
        assert_eq!(info.direct.unwrap().file, "globals.d.ts");
    }

    #[test]
    fn test_external_import_has_no_sites() {
        let app = "import React from 'react';\nReact();";
        let (symbols, _) = build(&[("app.ts", app)]);
        let at = app.rfind("React").unwrap();
        let occurrence = Occurrence::plain("app.ts", at, "React");

        assert!(symbols.definitions_at(&occurrence).is_empty());
        let info = symbols.symbol_info(&occurrence);
        assert!(info.direct.is_some());
        assert!(info.alias_target.is_none());
    }
}
