//! Shared fixtures for the integration tests.
#![allow(dead_code)] // not every test binary uses every fixture

use async_trait::async_trait;
use engram::llm::Distiller;
use engram::models::EventBus;
use engram::storage::SqliteStore;
use engram::vector::{
    DocType, InMemoryVectorClient, VectorCacheStats, VectorClient, VectorFilter, VectorHealth,
    VectorHit, VectorMetadata,
};
use engram::worker::{DistillationWorker, VectorSyncPool, WorkerConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Distiller double that returns canned responses and counts invocations.
pub struct ScriptedDistiller {
    response: std::sync::Mutex<String>,
    pub calls: AtomicU64,
    fail: bool,
}

impl ScriptedDistiller {
    pub fn returning(response: &str) -> Arc<Self> {
        Arc::new(Self {
            response: std::sync::Mutex::new(response.to_string()),
            calls: AtomicU64::new(0),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            response: std::sync::Mutex::new(String::new()),
            calls: AtomicU64::new(0),
            fail: true,
        })
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Distiller for ScriptedDistiller {
    async fn distill(&self, _prompt: &str) -> engram::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(engram::Error::transient("distill", "scripted failure"));
        }
        Ok(self.response.lock().unwrap().clone())
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Vector client that reports itself disconnected, forcing filter-only
/// search.
pub struct DisconnectedVector;

#[async_trait]
impl VectorClient for DisconnectedVector {
    async fn upsert(
        &self,
        _doc_id: &str,
        _doc_type: DocType,
        _text: &str,
        _metadata: &VectorMetadata,
    ) -> engram::Result<()> {
        Err(engram::Error::transient("vector_upsert", "disconnected"))
    }

    async fn delete_by_observation_id(&self, _id: i64) -> engram::Result<()> {
        Ok(())
    }

    async fn query(
        &self,
        _text: &str,
        _k: usize,
        _filter: &VectorFilter,
    ) -> engram::Result<Vec<VectorHit>> {
        Err(engram::Error::transient("vector_query", "disconnected"))
    }

    async fn count(&self) -> engram::Result<u64> {
        Ok(0)
    }

    async fn health_stats(&self) -> engram::Result<VectorHealth> {
        Ok(VectorHealth::default())
    }

    async fn cache_stats(&self) -> engram::Result<VectorCacheStats> {
        Ok(VectorCacheStats::default())
    }

    fn model_version(&self) -> String {
        "none".to_string()
    }

    fn is_connected(&self) -> bool {
        false
    }
}

/// A wired worker plus the collaborators tests inspect.
pub struct WorkerFixture {
    pub store: Arc<SqliteStore>,
    pub vector: Arc<InMemoryVectorClient>,
    pub events: EventBus,
    pub pool: VectorSyncPool,
    pub worker: DistillationWorker,
}

pub fn worker_fixture(distiller: Arc<dyn Distiller>, config: WorkerConfig) -> WorkerFixture {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let vector = Arc::new(InMemoryVectorClient::new());
    let events = EventBus::default();
    let pool = VectorSyncPool::spawn_sized(vector.clone(), 2, 4);
    let worker = DistillationWorker::new(
        store.clone(),
        store.clone(),
        store.clone(),
        distiller,
        pool.handle(),
        events.clone(),
        config,
    );
    WorkerFixture {
        store,
        vector,
        events,
        pool,
        worker,
    }
}
