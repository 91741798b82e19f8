//! Merge engine.
//!
//! Keeps the in-memory identity state for a run: a union-find over Ref ids,
//! the kind of every Ref, and the Defs already written. Each reconciliation
//! returns the store operations that bring the persisted tables in line with
//! that state, in foreign-key order.

use std::collections::{BTreeSet, HashMap};

use crate::index::models::{DefRow, FileRow, RefKind, RefRow, Span, StoreOp, UsageRow};
use crate::indexer::identity::{
    canonical_ref_id, file_id, unresolved_ref_id, usage_id, DefKey, RefId, Resolution,
};
use crate::indexer::progress::FileCounts;

/// Kind promotion. A component never turns back into a function.
pub fn apply_kind_policy(existing: Option<RefKind>, incoming: Option<RefKind>) -> Option<RefKind> {
    match (existing, incoming) {
        (_, None) => existing,
        (None, Some(kind)) => Some(kind),
        (Some(current), Some(kind)) if current == kind => Some(current),
        (Some(RefKind::Component), Some(RefKind::Function)) => Some(RefKind::Component),
        (_, Some(kind)) => Some(kind),
    }
}

/// Location data of the declaration being visited.
#[derive(Debug, Clone)]
pub struct DefLocation {
    pub parent_ref_id: Option<RefId>,
    pub span: Span,
}

#[derive(Debug)]
struct DefState {
    ref_id: RefId,
    located: bool,
}

#[derive(Debug)]
struct FileState {
    content: Option<String>,
    emitted: bool,
}

#[derive(Debug, Default)]
pub struct MergeEngine {
    parent: HashMap<RefId, RefId>,
    kinds: HashMap<RefId, Option<RefKind>>,
    defs: HashMap<String, DefState>,
    files: HashMap<String, FileState>,
    counts: FileCounts,
}

impl MergeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a file known; its row is written the first time a Def or Usage needs it.
    pub fn register_file(&mut self, path: &str, content: Option<String>) {
        self.files.entry(path.to_string()).or_insert(FileState {
            content,
            emitted: false,
        });
    }

    /// Canonical id of a Ref, compressing the path on the way.
    pub fn find(&mut self, id: &str) -> RefId {
        let mut root = id.to_string();
        while let Some(next) = self.parent.get(&root) {
            root = next.clone();
        }

        let mut current = id.to_string();
        while current != root {
            match self.parent.insert(current.clone(), root.clone()) {
                Some(next) => current = next,
                None => break,
            }
        }
        root
    }

    pub fn kind_of(&mut self, id: &str) -> Option<RefKind> {
        let root = self.find(id);
        self.kinds.get(&root).copied().flatten()
    }

    /// Current Ref of a Def id, if the Def exists.
    pub fn ref_of_def(&mut self, def_id: &str) -> Option<RefId> {
        let ref_id = self.defs.get(def_id)?.ref_id.clone();
        Some(self.find(&ref_id))
    }

    /// Counters accumulated since the last call.
    pub fn take_counts(&mut self) -> FileCounts {
        std::mem::take(&mut self.counts)
    }

    /// Reconciles a visited declaration and writes its Def.
    pub fn reconcile_definition(
        &mut self,
        resolution: &Resolution,
        kind: Option<RefKind>,
        visited: &DefKey,
        location: &DefLocation,
    ) -> (RefId, Vec<StoreOp>) {
        let mut ops = Vec::new();
        let target = self.reconcile(resolution, kind, &mut ops);

        for key in &resolution.keys {
            if key != visited {
                self.ensure_def(key, &target, None, &mut ops);
            }
        }
        self.ensure_def(visited, &target, Some(location), &mut ops);
        self.counts.defs += 1;

        (target, ops)
    }

    /// Reconciles the target of a resolved usage and writes the Usage row.
    pub fn reconcile_usage(
        &mut self,
        resolution: &Resolution,
        incoming: Option<RefKind>,
        file: &str,
        used_as: &str,
        span: Span,
        parent_ref_id: Option<&str>,
    ) -> (RefId, Vec<StoreOp>) {
        let mut ops = Vec::new();
        let target = self.reconcile(resolution, incoming, &mut ops);
        for key in &resolution.keys {
            self.ensure_def(key, &target, None, &mut ops);
        }
        self.push_usage(file, &target, used_as, span, parent_ref_id, &mut ops);
        (target, ops)
    }

    /// Records a usage whose target is unknown against a fresh, isolated Ref.
    pub fn record_unresolved(
        &mut self,
        incoming: Option<RefKind>,
        file: &str,
        used_as: &str,
        span: Span,
        parent_ref_id: Option<&str>,
    ) -> (RefId, Vec<StoreOp>) {
        let mut ops = Vec::new();
        let ref_id = unresolved_ref_id(file, span.start, used_as);
        if !self.kinds.contains_key(&ref_id) {
            self.kinds.insert(ref_id.clone(), incoming);
            ops.push(StoreOp::InsertRef(RefRow {
                id: ref_id.clone(),
                kind: incoming,
            }));
        }
        self.push_usage(file, &ref_id, used_as, span, parent_ref_id, &mut ops);
        self.counts.unresolved += 1;
        (ref_id, ops)
    }

    /// Candidate of a resolution. A nested target derives it from the
    /// enclosing declaration's Ref once that Def has been seen.
    fn candidate_of(&mut self, resolution: &Resolution) -> RefId {
        resolution
            .nested
            .as_ref()
            .and_then(|nesting| {
                let parent = self.ref_of_def(&nesting.parent.def_id())?;
                Some(nesting.candidate(&parent))
            })
            .unwrap_or_else(|| resolution.candidate.clone())
    }

    /// Resolves the unique target Ref and applies the kind policy to it.
    fn reconcile(
        &mut self,
        resolution: &Resolution,
        incoming: Option<RefKind>,
        ops: &mut Vec<StoreOp>,
    ) -> RefId {
        let candidate = self.candidate_of(resolution);
        let mut members = BTreeSet::new();
        for key in &resolution.keys {
            if let Some(ref_id) = self.ref_of_def(&key.def_id()) {
                members.insert(ref_id);
            }
        }
        if self.kinds.contains_key(&candidate) {
            members.insert(self.find(&candidate));
        }

        let members: Vec<RefId> = members.into_iter().collect();
        let target = match members.len() {
            0 => {
                let id = candidate;
                tracing::debug!("New ref {} ({:?})", short(&id), incoming);
                self.kinds.insert(id.clone(), incoming);
                ops.push(StoreOp::InsertRef(RefRow {
                    id: id.clone(),
                    kind: incoming,
                }));
                self.counts.refs += 1;
                return id;
            }
            1 => members[0].clone(),
            _ => self.merge(&members, ops),
        };

        let existing = self.kinds.get(&target).copied().flatten();
        let updated = apply_kind_policy(existing, incoming);
        if updated != existing {
            self.kinds.insert(target.clone(), updated);
            if let Some(kind) = updated {
                ops.push(StoreOp::UpdateKind {
                    ref_id: target.clone(),
                    kind,
                });
            }
        }
        target
    }

    /// Unifies several canonical Refs under a fresh id.
    fn merge(&mut self, members: &[RefId], ops: &mut Vec<StoreOp>) -> RefId {
        let canonical = canonical_ref_id(members);
        let kind = members.iter().fold(None, |acc, member| {
            apply_kind_policy(acc, self.kinds.get(member).copied().flatten())
        });

        tracing::debug!(
            "Merging {} refs into {} ({:?})",
            members.len(),
            short(&canonical),
            kind
        );

        if !self.kinds.contains_key(&canonical) {
            self.kinds.insert(canonical.clone(), kind);
            ops.push(StoreOp::InsertRef(RefRow {
                id: canonical.clone(),
                kind,
            }));
            self.counts.refs += 1;
        }
        for member in members {
            if member != &canonical {
                self.parent.insert(member.clone(), canonical.clone());
            }
        }
        ops.push(StoreOp::RewriteRefs {
            from: members.to_vec(),
            to: canonical.clone(),
        });
        self.counts.merges += 1;
        canonical
    }

    fn ensure_file(&mut self, path: &str, ops: &mut Vec<StoreOp>) -> String {
        let id = file_id(path);
        let state = self.files.entry(path.to_string()).or_insert(FileState {
            content: None,
            emitted: false,
        });
        if !state.emitted {
            state.emitted = true;
            ops.push(StoreOp::UpsertFile(FileRow {
                id: id.clone(),
                path: path.to_string(),
                content: state.content.take(),
            }));
        }
        id
    }

    fn ensure_def(
        &mut self,
        key: &DefKey,
        target: &str,
        location: Option<&DefLocation>,
        ops: &mut Vec<StoreOp>,
    ) {
        let def_id = key.def_id();
        match self.defs.get_mut(&def_id) {
            Some(state) => {
                if let (Some(location), false) = (location, state.located) {
                    state.located = true;
                    ops.push(StoreOp::FillDefLocation {
                        def_id,
                        parent_ref_id: location.parent_ref_id.clone(),
                        start_pos: location.span.start as i64,
                        end_pos: location.span.end as i64,
                    });
                }
            }
            None => {
                let file_id = self.ensure_file(&key.file, ops);
                self.defs.insert(
                    def_id.clone(),
                    DefState {
                        ref_id: target.to_string(),
                        located: location.is_some(),
                    },
                );
                ops.push(StoreOp::InsertDef(DefRow {
                    id: def_id,
                    file_id,
                    name: key.name.clone(),
                    ref_id: target.to_string(),
                    parent_ref_id: location.and_then(|l| l.parent_ref_id.clone()),
                    start_pos: location.map(|l| l.span.start as i64),
                    end_pos: location.map(|l| l.span.end as i64),
                }));
            }
        }
    }

    fn push_usage(
        &mut self,
        file: &str,
        ref_id: &str,
        used_as: &str,
        span: Span,
        parent_ref_id: Option<&str>,
        ops: &mut Vec<StoreOp>,
    ) {
        let file_id = self.ensure_file(file, ops);
        ops.push(StoreOp::InsertUsage(UsageRow {
            id: usage_id(file, span.start, used_as),
            file_id,
            ref_id: ref_id.to_string(),
            parent_ref_id: parent_ref_id.map(str::to_string),
            used_as: used_as.to_string(),
            start_pos: Some(span.start as i64),
            end_pos: Some(span.end as i64),
        }));
        self.counts.usages += 1;
    }
}

fn short(id: &str) -> &str {
    &id[..id.len().min(12)]
}
