//! Write queue for single-writer store ownership.
//!
//! The traversal never touches the store directly. The writes of one file go
//! through a tokio mpsc channel to one worker task as a single batch, and the
//! caller awaits the batch's oneshot reply before moving to the next file.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::error::{IndexerError, Result};
use crate::index::{RefStore, StoreOp};

/// Commands that can be sent to the write queue worker.
#[derive(Debug)]
pub enum WriteCommand {
    /// Apply several operations in one transaction
    ApplyBatch {
        ops: Vec<StoreOp>,
        respond: oneshot::Sender<Result<()>>,
    },
    /// Write the store to a snapshot file
    Export {
        path: PathBuf,
        respond: oneshot::Sender<Result<()>>,
    },
    /// Shutdown the write queue worker
    Shutdown,
}

/// Handle for sending write commands to the queue.
#[derive(Clone)]
pub struct WriteQueueHandle {
    sender: mpsc::Sender<WriteCommand>,
}

impl WriteQueueHandle {
    const DEFAULT_BUFFER_SIZE: usize = 256;

    /// Creates a new write queue handle and spawns the worker task.
    pub fn new(store: Arc<dyn RefStore>) -> Self {
        Self::with_buffer_size(store, Self::DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(store: Arc<dyn RefStore>, buffer_size: usize) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let worker = WriteQueueWorker::new(receiver, store);

        tokio::spawn(async move {
            worker.run().await;
        });

        Self { sender }
    }

    /// Applies a batch atomically and waits for it.
    pub async fn apply_batch(&self, ops: Vec<StoreOp>) -> Result<()> {
        let (respond, rx) = oneshot::channel();
        self.sender
            .send(WriteCommand::ApplyBatch { ops, respond })
            .await
            .map_err(|_| IndexerError::Index("Write queue closed".into()))?;
        rx.await
            .map_err(|_| IndexerError::Index("Write response channel closed".into()))?
    }

    /// Exports the store once all earlier writes have been applied.
    pub async fn export_snapshot(&self, path: PathBuf) -> Result<()> {
        let (respond, rx) = oneshot::channel();
        self.sender
            .send(WriteCommand::Export { path, respond })
            .await
            .map_err(|_| IndexerError::Index("Write queue closed".into()))?;
        rx.await
            .map_err(|_| IndexerError::Index("Write response channel closed".into()))?
    }

    /// Shuts down the write queue worker.
    /// After shutdown, all subsequent write operations will fail.
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(WriteCommand::Shutdown)
            .await
            .map_err(|_| IndexerError::Index("Write queue already closed".into()))?;
        Ok(())
    }
}

/// Worker that processes write commands sequentially.
struct WriteQueueWorker {
    receiver: mpsc::Receiver<WriteCommand>,
    store: Arc<dyn RefStore>,
}

impl WriteQueueWorker {
    fn new(receiver: mpsc::Receiver<WriteCommand>, store: Arc<dyn RefStore>) -> Self {
        Self { receiver, store }
    }

    async fn run(mut self) {
        tracing::debug!("WriteQueue worker started");

        while let Some(command) = self.receiver.recv().await {
            match command {
                WriteCommand::ApplyBatch { ops, respond } => {
                    let result = self.store.apply_batch(&ops);
                    if let Err(e) = &result {
                        tracing::debug!("Batch of {} store ops failed: {}", ops.len(), e);
                    }
                    let _ = respond.send(result);
                }
                WriteCommand::Export { path, respond } => {
                    let result = self.store.export_snapshot(&path);
                    let _ = respond.send(result);
                }
                WriteCommand::Shutdown => {
                    tracing::debug!("WriteQueue worker shutting down");
                    break;
                }
            }
        }

        tracing::debug!("WriteQueue worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::sqlite::SqliteIndex;
    use crate::index::{FileRow, RefKind, RefRow};
    use tempfile::tempdir;

    fn file_op(path: &str) -> StoreOp {
        StoreOp::UpsertFile(FileRow {
            id: format!("id-{}", path),
            path: path.into(),
            content: None,
        })
    }

    #[tokio::test]
    async fn test_apply_batch() {
        let index = Arc::new(SqliteIndex::in_memory().unwrap());
        let queue = WriteQueueHandle::new(index.clone());

        let mut ops: Vec<_> = ["a.ts", "b.ts", "c.ts"].into_iter().map(file_op).collect();
        ops.push(StoreOp::InsertRef(RefRow {
            id: "r1".into(),
            kind: Some(RefKind::Function),
        }));
        queue.apply_batch(ops).await.unwrap();

        let counts = index.counts().unwrap();
        assert_eq!(counts.files, 3);
        assert_eq!(counts.refs, 1);

        queue.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_batch_is_reported_and_rolled_back() {
        let index = Arc::new(SqliteIndex::in_memory().unwrap());
        let queue = WriteQueueHandle::new(index.clone());

        queue
            .apply_batch(vec![StoreOp::RewriteRefs {
                from: vec!["a".into()],
                to: "b".into(),
            }])
            .await
            .unwrap();

        let err = queue
            .apply_batch(vec![
                file_op("a.ts"),
                StoreOp::InsertDef(crate::index::DefRow {
                    id: "d".into(),
                    file_id: "nope".into(),
                    name: "x".into(),
                    ref_id: "nope".into(),
                    parent_ref_id: None,
                    start_pos: None,
                    end_pos: None,
                }),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::StoreIntegrity(_)));
        assert_eq!(index.counts().unwrap().files, 0);
    }

    #[tokio::test]
    async fn test_export_after_writes() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("snapshot.db");
        let index = Arc::new(SqliteIndex::in_memory().unwrap());
        let queue = WriteQueueHandle::new(index);

        queue.apply_batch(vec![file_op("a.ts")]).await.unwrap();
        queue.export_snapshot(out.clone()).await.unwrap();

        let reopened = SqliteIndex::open(&out).unwrap();
        assert!(reopened.get_file_by_path("a.ts").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_write_queue_shutdown() {
        let index = Arc::new(SqliteIndex::in_memory().unwrap());
        let queue = WriteQueueHandle::new(index);

        queue.shutdown().await.unwrap();

        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;

        let result = queue.apply_batch(vec![file_op("late.ts")]).await;
        assert!(result.is_err());
    }
}
