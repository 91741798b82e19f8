use serde::{Deserialize, Serialize};

/// Kind of a canonical entity. A Ref row with no kind is "unset".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    Function,
    Component,
    Constant,
}

impl RefKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefKind::Function => "function",
            RefKind::Component => "component",
            RefKind::Constant => "constant",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "function" => Some(RefKind::Function),
            "component" => Some(RefKind::Component),
            "constant" => Some(RefKind::Constant),
            _ => None,
        }
    }
}

/// Byte range of a node in its source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn of(node: &tree_sitter::Node) -> Self {
        Self {
            start: node.start_byte(),
            end: node.end_byte(),
        }
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRow {
    pub id: String,
    pub path: String,
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefRow {
    pub id: String,
    pub kind: Option<RefKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefRow {
    pub id: String,
    pub file_id: String,
    pub name: String,
    pub ref_id: String,
    pub parent_ref_id: Option<String>,
    pub start_pos: Option<i64>,
    pub end_pos: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRow {
    pub id: String,
    pub file_id: String,
    pub ref_id: String,
    pub parent_ref_id: Option<String>,
    pub used_as: String,
    pub start_pos: Option<i64>,
    pub end_pos: Option<i64>,
}

/// One write against the store. Every op is either idempotent or
/// order-independent, so a batch may be replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// Insert keyed by the unique path; an existing row is left alone.
    UpsertFile(FileRow),
    InsertRef(RefRow),
    UpdateKind {
        ref_id: String,
        kind: RefKind,
    },
    InsertDef(DefRow),
    /// Fills location columns of a placeholder Def; set columns are kept.
    FillDefLocation {
        def_id: String,
        parent_ref_id: Option<String>,
        start_pos: i64,
        end_pos: i64,
    },
    InsertUsage(UsageRow),
    /// Points every Def and Usage owned by one of `from` at `to`.
    RewriteRefs {
        from: Vec<String>,
        to: String,
    },
}

impl StoreOp {
    pub fn name(&self) -> &'static str {
        match self {
            StoreOp::UpsertFile(_) => "upsert_file",
            StoreOp::InsertRef(_) => "insert_ref",
            StoreOp::UpdateKind { .. } => "update_kind",
            StoreOp::InsertDef(_) => "insert_def",
            StoreOp::FillDefLocation { .. } => "fill_def_location",
            StoreOp::InsertUsage(_) => "insert_usage",
            StoreOp::RewriteRefs { .. } => "rewrite_refs",
        }
    }
}

/// Full contents of the four tables, each sorted by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDump {
    pub files: Vec<FileRow>,
    pub refs: Vec<RefRow>,
    pub defs: Vec<DefRow>,
    pub usages: Vec<UsageRow>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexCounts {
    pub files: usize,
    pub refs: usize,
    /// Refs still owning at least one Def or Usage.
    pub live_refs: usize,
    pub defs: usize,
    pub usages: usize,
    pub placeholder_defs: usize,
}
