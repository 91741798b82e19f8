//! Identity resolution.
//!
//! Two interchangeable strategies map a definition or usage occurrence to a
//! candidate Ref id plus the definition keys that denote the same entity. The
//! strategy is picked once per run through [`strategy_for`].

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{IndexerError, Result};
use crate::indexer::symbols::{DefSite, Occurrence, SourceProvider, SymbolId, SymbolOrigin};

pub type RefId = String;

/// SHA-256 over the parts joined with NUL, hex-encoded.
pub fn hash_parts(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0u8]);
        }
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

pub fn file_id(path: &str) -> String {
    hash_parts(&[path])
}

pub fn usage_id(file: &str, start: usize, used_as: &str) -> String {
    hash_parts(&[file, &start.to_string(), used_as])
}

/// Id minted for a usage whose target is unknown; never unified with anything.
pub fn unresolved_ref_id(file: &str, start: usize, text: &str) -> RefId {
    hash_parts(&["unresolved", file, &start.to_string(), text])
}

/// Canonical id for a set of unified Refs; independent of member order.
pub fn canonical_ref_id(members: &[RefId]) -> RefId {
    let sorted: BTreeSet<&str> = members.iter().map(String::as_str).collect();
    let mut parts = vec!["merge"];
    parts.extend(sorted);
    hash_parts(&parts)
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Hash of defining file and qualified name.
    #[default]
    Structural,
    /// Binder symbol identity.
    Semantic,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Structural => "structural",
            StrategyKind::Semantic => "semantic",
        }
    }
}

/// A definition location: defining file and qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefKey {
    pub file: String,
    pub name: String,
}

impl DefKey {
    pub fn new(file: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            name: name.into(),
        }
    }

    pub fn def_id(&self) -> String {
        hash_parts(&[&self.file, &self.name])
    }

    pub fn file_id(&self) -> String {
        file_id(&self.file)
    }
}

impl From<&DefSite> for DefKey {
    fn from(site: &DefSite) -> Self {
        DefKey::new(site.file.clone(), site.name.clone())
    }
}

/// Candidate id and the keys known to denote the same entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub candidate: RefId,
    pub keys: Vec<DefKey>,
    /// Set when the target is nested in a tracked declaration whose Ref the
    /// candidate must derive from once it is known.
    pub nested: Option<Nesting>,
}

impl Resolution {
    pub fn new(candidate: RefId, keys: Vec<DefKey>) -> Self {
        Self {
            candidate,
            keys,
            nested: None,
        }
    }
}

/// Enclosing tracked declaration of a nested target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nesting {
    pub parent: DefKey,
    /// Name relative to the parent.
    pub scoped: String,
}

impl Nesting {
    /// Candidate for the nested target given the parent's Ref id.
    pub fn candidate(&self, parent_ref: &str) -> RefId {
        hash_parts(&[parent_ref, &self.scoped])
    }
}

/// A tracked declaration being visited.
#[derive(Debug, Clone)]
pub struct DefinitionOccurrence<'a> {
    pub occurrence: Occurrence<'a>,
    /// File and qualified name of this declaration.
    pub key: DefKey,
    /// Ref id of the enclosing tracked declaration, if any.
    pub enclosing: Option<&'a str>,
    pub line: u32,
    pub column: u32,
}

impl DefinitionOccurrence<'_> {
    fn unresolvable(&self, reason: &str) -> IndexerError {
        IndexerError::UnresolvableIdentifier {
            name: self.occurrence.name.to_string(),
            reason: reason.to_string(),
            file: self.occurrence.file.to_string(),
            line: self.line,
            column: self.column,
        }
    }
}

pub trait IdentityStrategy: Send {
    fn kind(&self) -> StrategyKind;

    /// Fails with `UnresolvableIdentifier` when the declaration has no
    /// definition or several distinct identities.
    fn resolve_definition(
        &mut self,
        def: &DefinitionOccurrence,
        provider: &dyn SourceProvider,
    ) -> Result<Resolution>;

    /// `None` when the target cannot be resolved inside the project.
    fn resolve_usage(
        &mut self,
        occurrence: &Occurrence,
        provider: &dyn SourceProvider,
    ) -> Option<Resolution>;
}

pub fn strategy_for(kind: StrategyKind) -> Box<dyn IdentityStrategy> {
    match kind {
        StrategyKind::Structural => Box::new(StructuralStrategy),
        StrategyKind::Semantic => Box::new(SemanticStrategy::default()),
    }
}

// ============================================================================
// Structural
// ============================================================================

/// Identity from stable text: file-qualified names at top level, enclosing
/// Ref id plus local name below it.
#[derive(Debug, Default)]
pub struct StructuralStrategy;

impl IdentityStrategy for StructuralStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Structural
    }

    fn resolve_definition(
        &mut self,
        def: &DefinitionOccurrence,
        provider: &dyn SourceProvider,
    ) -> Result<Resolution> {
        let sites = provider.definitions_at(&def.occurrence);
        let site = sites
            .iter()
            .find(|s| s.file == def.occurrence.file && s.span.start == def.occurrence.offset)
            .or(sites.first())
            .ok_or_else(|| def.unresolvable("no definition found"))?;

        let candidate = match def.enclosing {
            Some(parent) => hash_parts(&[parent, site.scoped_name()]),
            None => def.key.def_id(),
        };
        Ok(Resolution::new(candidate, vec![def.key.clone()]))
    }

    fn resolve_usage(
        &mut self,
        occurrence: &Occurrence,
        provider: &dyn SourceProvider,
    ) -> Option<Resolution> {
        let sites = provider.definitions_at(occurrence);
        let first = sites.first()?;
        let nested = first.parent.as_ref().map(|parent| Nesting {
            parent: DefKey::new(first.file.clone(), parent.clone()),
            scoped: first.scoped_name().to_string(),
        });
        Some(Resolution {
            candidate: hash_parts(&[&first.file, &first.name]),
            keys: sites.iter().map(DefKey::from).collect(),
            nested,
        })
    }
}

// ============================================================================
// Semantic
// ============================================================================

/// Identity from binder symbols, memoized per symbol.
#[derive(Debug, Default)]
pub struct SemanticStrategy {
    memo: HashMap<SymbolId, RefId>,
}

impl SemanticStrategy {
    fn ref_for(&mut self, symbol: SymbolId) -> RefId {
        self.memo
            .entry(symbol)
            .or_insert_with_key(|symbol| {
                let parts = symbol.key_parts();
                let mut refs: Vec<&str> = vec!["symbol"];
                refs.extend(parts.iter().map(String::as_str));
                hash_parts(&refs)
            })
            .clone()
    }

    pub fn memo_len(&self) -> usize {
        self.memo.len()
    }
}

/// The single symbol a set of sites collapses to.
fn collapse(sites: &[DefSite]) -> std::result::Result<SymbolId, usize> {
    let symbols: BTreeSet<&SymbolId> = sites.iter().map(|s| &s.symbol).collect();
    match symbols.len() {
        1 => symbols.into_iter().next().cloned().ok_or(0),
        n => Err(n),
    }
}

impl IdentityStrategy for SemanticStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Semantic
    }

    fn resolve_definition(
        &mut self,
        def: &DefinitionOccurrence,
        provider: &dyn SourceProvider,
    ) -> Result<Resolution> {
        let info = provider.symbol_info(&def.occurrence);
        let symbol = match info.resolved() {
            Some(symbol) => symbol.clone(),
            None => match collapse(&provider.definitions_at(&def.occurrence)) {
                Ok(symbol) => symbol,
                Err(0) => return Err(def.unresolvable("no definition found")),
                Err(n) => {
                    return Err(def.unresolvable(&format!("{} distinct symbols", n)));
                }
            },
        };

        Ok(Resolution::new(self.ref_for(symbol), vec![def.key.clone()]))
    }

    fn resolve_usage(
        &mut self,
        occurrence: &Occurrence,
        provider: &dyn SourceProvider,
    ) -> Option<Resolution> {
        let info = provider.symbol_info(occurrence);
        let sites = provider.definitions_at(occurrence);

        // An import binding without a project target names something external.
        let symbol = info
            .alias_target
            .or(info.direct.filter(|s| s.origin == SymbolOrigin::Declared))
            .or_else(|| collapse(&sites).ok())?;

        Some(Resolution::new(
            self.ref_for(symbol),
            sites.iter().map(DefKey::from).collect(),
        ))
    }
}
