pub mod migrations;
pub mod models;
pub mod sqlite;
pub mod write_queue;

use std::path::Path;

use crate::error::Result;
pub use models::*;
pub use write_queue::WriteQueueHandle;

/// Persistence collaborator for the reference graph.
pub trait RefStore: Send + Sync {
    /// Applies a batch atomically. Constraint violations surface as
    /// `StoreIntegrity` and roll the whole batch back.
    fn apply_batch(&self, ops: &[StoreOp]) -> Result<()>;
    fn dump(&self) -> Result<TableDump>;
    fn counts(&self) -> Result<IndexCounts>;
    fn export_snapshot(&self, path: &Path) -> Result<()>;
}
