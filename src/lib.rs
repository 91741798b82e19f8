pub mod error;
pub mod index;
pub mod indexer;
pub mod languages;
pub mod workspace;

pub use error::{IndexerError, Result};
pub use index::sqlite::SqliteIndex;
pub use index::{
    DefRow, FileRow, IndexCounts, RefKind, RefRow, RefStore, Span, StoreOp, TableDump, UsageRow,
};
pub use indexer::{run, FileWalker, IndexingProgress, Parser, RunSummary, StrategyKind};
pub use languages::LanguageRegistry;
pub use workspace::{IndexerConfig, ProjectDescriptor};
