//! Vector-index sync worker pool.
//!
//! Writes to the vector index happen off the ingest path: the worker
//! enqueues a sync request onto a bounded channel consumed by a fixed pool.
//! If the channel is full the request spills into a transient task instead
//! of blocking ingestion. Upsert failures are logged, never propagated; a
//! later index rebuild repairs any drift.

use crate::vector::{DocType, VectorClient, VectorMetadata};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Number of pool workers.
pub const MAX_VECTOR_SYNC_WORKERS: usize = 8;

/// Channel buffer: twice the worker count.
const CHANNEL_BUFFER: usize = MAX_VECTOR_SYNC_WORKERS * 2;

/// One pending vector-index write.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    /// Document kind.
    pub doc_type: DocType,
    /// SQL row id.
    pub sqlite_id: i64,
    /// Project the row belongs to.
    pub project: String,
    /// Row creation time (epoch ms), carried into vector metadata.
    pub created_at: i64,
    /// Text to embed.
    pub text: String,
}

async fn sync_one(vector: &dyn VectorClient, request: SyncRequest) {
    let doc_id = request.doc_type.doc_id(request.sqlite_id);
    let metadata = VectorMetadata {
        sqlite_id: request.sqlite_id,
        doc_type: request.doc_type,
        project: request.project.clone(),
        created_at: request.created_at,
    };
    if let Err(e) = vector
        .upsert(&doc_id, request.doc_type, &request.text, &metadata)
        .await
    {
        warn!(doc_id, "vector sync failed: {e}");
    }
}

/// Cloneable enqueue side of the pool.
#[derive(Clone)]
pub struct VectorSyncHandle {
    tx: mpsc::Sender<SyncRequest>,
    vector: Arc<dyn VectorClient>,
}

impl VectorSyncHandle {
    /// Enqueues a sync without ever blocking the caller.
    ///
    /// A full channel spills into a transient task; a closed channel (pool
    /// shut down) drops the request with a warning.
    pub fn enqueue(&self, request: SyncRequest) {
        match self.tx.try_send(request) {
            Ok(()) => {},
            Err(mpsc::error::TrySendError::Full(request)) => {
                debug!("vector sync channel full, spilling to transient task");
                let vector = Arc::clone(&self.vector);
                tokio::spawn(async move {
                    sync_one(vector.as_ref(), request).await;
                });
            },
            Err(mpsc::error::TrySendError::Closed(request)) => {
                warn!(
                    doc_id = request.doc_type.doc_id(request.sqlite_id),
                    "vector sync pool is shut down, dropping request"
                );
            },
        }
    }
}

/// Fixed-size worker pool consuming the sync channel.
pub struct VectorSyncPool {
    handle: VectorSyncHandle,
    workers: JoinSet<()>,
}

impl VectorSyncPool {
    /// Spawns the pool with [`MAX_VECTOR_SYNC_WORKERS`] workers.
    #[must_use]
    pub fn spawn(vector: Arc<dyn VectorClient>) -> Self {
        Self::spawn_sized(vector, MAX_VECTOR_SYNC_WORKERS, CHANNEL_BUFFER)
    }

    /// Spawns the pool with explicit worker and buffer sizes.
    #[must_use]
    pub fn spawn_sized(vector: Arc<dyn VectorClient>, workers: usize, buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel::<SyncRequest>(buffer.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let mut join_set = JoinSet::new();
        for _ in 0..workers.max(1) {
            let rx = Arc::clone(&rx);
            let vector = Arc::clone(&vector);
            join_set.spawn(async move {
                loop {
                    let request = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    // None: every sender is gone; drain complete, exit.
                    let Some(request) = request else { break };
                    sync_one(vector.as_ref(), request).await;
                }
            });
        }
        Self {
            handle: VectorSyncHandle { tx, vector },
            workers: join_set,
        }
    }

    /// Returns an enqueue handle.
    #[must_use]
    pub fn handle(&self) -> VectorSyncHandle {
        self.handle.clone()
    }

    /// Drains and joins the pool.
    ///
    /// Workers exit once every [`VectorSyncHandle`] clone has been dropped
    /// and the channel is empty; drop the ingestion worker before calling
    /// this.
    pub async fn shutdown(self) {
        let Self { handle, mut workers } = self;
        drop(handle);
        while workers.join_next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::InMemoryVectorClient;
    use std::time::Duration;

    #[tokio::test]
    async fn test_pool_syncs_and_drains_on_shutdown() {
        let vector = Arc::new(InMemoryVectorClient::new());
        let pool = VectorSyncPool::spawn_sized(vector.clone(), 2, 4);
        let handle = pool.handle();
        for id in 0..10 {
            handle.enqueue(SyncRequest {
                doc_type: DocType::Observation,
                sqlite_id: id,
                project: "demo".into(),
                created_at: 0,
                text: format!("observation {id}"),
            });
        }
        drop(handle);
        tokio::time::timeout(Duration::from_secs(5), pool.shutdown())
            .await
            .expect("drains promptly");
        assert_eq!(vector.count().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_overflow_spills_without_blocking() {
        let vector = Arc::new(InMemoryVectorClient::new());
        // Tiny buffer forces the spill path immediately.
        let pool = VectorSyncPool::spawn_sized(vector.clone(), 1, 1);
        let handle = pool.handle();
        for id in 0..50 {
            handle.enqueue(SyncRequest {
                doc_type: DocType::Observation,
                sqlite_id: id,
                project: "demo".into(),
                created_at: 0,
                text: "text".into(),
            });
        }
        drop(handle);
        pool.shutdown().await;
        // Spilled tasks may still be landing; give them a beat.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(vector.count().await.unwrap(), 50);
    }
}
