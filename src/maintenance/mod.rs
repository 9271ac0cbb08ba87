//! Scheduled cleanup.
//!
//! One cooperative loop with a settle delay, then a tick every
//! `max(configured_hours, 1h)`. Each tick runs four steps: age-based
//! deletion, supersession deletion, a database optimize pass, and prompt
//! pruning. A failing step is logged and the tick moves on.

use crate::models::EventBus;
use crate::storage::{BatchDeleteOutcome, DatabaseAdmin, ObservationStore, PromptStore};
use crate::vector::VectorClient;
use crate::{DAY_MS, epoch_ms};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Delay before the first tick, letting startup I/O settle.
const SETTLE_DELAY: Duration = Duration::from_secs(5 * 60);

/// Deletions proceed in batches of this size, with a vector fan-out per
/// batch.
const DELETE_BATCH: usize = 100;

/// User prompts older than this are pruned.
const PROMPT_RETENTION_DAYS: i64 = 30;

/// Configuration for the maintenance service.
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Hours between ticks; clamped to at least one.
    pub interval_hours: u64,
    /// Observation retention in days; 0 disables age-based deletion.
    pub retention_days: i64,
    /// Whether superseded observations are deleted.
    pub cleanup_superseded: bool,
    /// Override for the settle delay (tests shrink it).
    pub settle_delay: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval_hours: 24,
            retention_days: 0,
            cleanup_superseded: true,
            settle_delay: SETTLE_DELAY,
        }
    }
}

impl MaintenanceConfig {
    /// Effective tick interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        let hours = if self.interval_hours == 0 { 1 } else { self.interval_hours };
        Duration::from_secs(hours * 60 * 60)
    }
}

/// Counters from maintenance runs.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct MaintenanceStats {
    /// Completed ticks since start.
    pub runs: u64,
    /// Last tick time (epoch ms).
    pub last_run_at: Option<i64>,
    /// Observations deleted by age, total.
    pub aged_deleted: u64,
    /// Observations deleted by supersession, total.
    pub superseded_deleted: u64,
    /// User prompts pruned, total.
    pub prompts_deleted: u64,
    /// Step errors observed, total.
    pub step_errors: u64,
}

/// The maintenance service.
pub struct MaintenanceService {
    observations: Arc<dyn ObservationStore>,
    prompts: Arc<dyn PromptStore>,
    admin: Arc<dyn DatabaseAdmin>,
    vector: Arc<dyn VectorClient>,
    events: EventBus,
    stats: Mutex<MaintenanceStats>,
    config: MaintenanceConfig,
}

impl MaintenanceService {
    /// Wires the service from its collaborators.
    #[must_use]
    pub fn new(
        observations: Arc<dyn ObservationStore>,
        prompts: Arc<dyn PromptStore>,
        admin: Arc<dyn DatabaseAdmin>,
        vector: Arc<dyn VectorClient>,
        events: EventBus,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            observations,
            prompts,
            admin,
            vector,
            events,
            stats: Mutex::new(MaintenanceStats::default()),
            config,
        }
    }

    /// Counter snapshot.
    pub fn stats(&self) -> MaintenanceStats {
        match self.stats.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Runs until cancelled: settle delay, then one tick per interval.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        tokio::select! {
            () = shutdown.cancelled() => return,
            () = tokio::time::sleep(self.config.settle_delay) => {},
        }
        let mut ticker = tokio::time::interval(self.config.interval());
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("maintenance stopping");
                    break;
                },
                _ = ticker.tick() => self.tick().await,
            }
        }
    }

    /// Kicks off a tick in the background without waiting for it.
    pub fn trigger_now(self: &Arc<Self>) {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            service.tick().await;
        });
    }

    /// One full cleanup pass.
    pub async fn tick(&self) {
        let mut aged = 0_u64;
        let mut superseded = 0_u64;
        let mut pruned = 0_u64;
        let mut errors = 0_u64;

        if self.config.retention_days > 0 {
            let cutoff = epoch_ms() - self.config.retention_days * DAY_MS;
            match self.observations.ids_created_before(cutoff) {
                Ok(ids) => aged += self.delete_with_fanout(&ids).await,
                Err(e) => {
                    warn!("age-based cleanup enumeration failed: {e}");
                    errors += 1;
                },
            }
        }

        if self.config.cleanup_superseded {
            match self.observations.superseded_ids() {
                Ok(ids) => superseded += self.delete_with_fanout(&ids).await,
                Err(e) => {
                    warn!("supersession cleanup enumeration failed: {e}");
                    errors += 1;
                },
            }
        }

        if let Err(e) = self.admin.optimize() {
            warn!("db optimize failed: {e}");
            errors += 1;
        }

        let prompt_cutoff = epoch_ms() - PROMPT_RETENTION_DAYS * DAY_MS;
        match self.prompts.delete_older_than(prompt_cutoff) {
            Ok(removed) => pruned += removed as u64,
            Err(e) => {
                warn!("prompt pruning failed: {e}");
                errors += 1;
            },
        }

        if let Ok(mut stats) = self.stats.lock() {
            stats.runs += 1;
            stats.last_run_at = Some(epoch_ms());
            stats.aged_deleted += aged;
            stats.superseded_deleted += superseded;
            stats.prompts_deleted += pruned;
            stats.step_errors += errors;
        }
        info!(aged, superseded, pruned, "maintenance tick complete");
    }

    /// Deletes observations in batches of [`DELETE_BATCH`], fanning out
    /// best-effort vector deletes per batch.
    async fn delete_with_fanout(&self, ids: &[i64]) -> u64 {
        let mut deleted = 0_u64;
        for chunk in ids.chunks(DELETE_BATCH) {
            let BatchDeleteOutcome { deleted: ok, errors } =
                self.observations.delete_batch(chunk);
            deleted += ok as u64;
            for error in &errors {
                warn!("batch delete: {error}");
            }
            for id in chunk {
                if let Err(e) = self.vector.delete_by_observation_id(*id).await {
                    debug!(id, "vector delete failed (rebuild will reconcile): {e}");
                }
                self.events.publish(crate::models::MemoryEvent {
                    doc_type: crate::vector::DocType::Observation,
                    action: crate::models::EventAction::Deleted,
                    id: *id,
                    project: String::new(),
                });
            }
        }
        deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewObservation, NewUserPrompt, ObservationType};
    use crate::storage::SqliteStore;
    use crate::vector::InMemoryVectorClient;

    fn service(
        store: Arc<SqliteStore>,
        vector: Arc<InMemoryVectorClient>,
        config: MaintenanceConfig,
    ) -> Arc<MaintenanceService> {
        Arc::new(MaintenanceService::new(
            store.clone(),
            store.clone(),
            store,
            vector,
            EventBus::default(),
            config,
        ))
    }

    #[tokio::test]
    async fn test_superseded_rows_are_removed() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let vector = Arc::new(InMemoryVectorClient::new());
        let keep = ObservationStore::insert(
            store.as_ref(),
            &NewObservation {
                project: "demo".into(),
                obs_type: ObservationType::Change,
                title: "keep".into(),
                ..NewObservation::default()
            },
        )
        .unwrap();
        let doomed = ObservationStore::insert(
            store.as_ref(),
            &NewObservation {
                project: "demo".into(),
                obs_type: ObservationType::Change,
                title: "doomed".into(),
                ..NewObservation::default()
            },
        )
        .unwrap();
        store.mark_superseded(doomed.id).unwrap();

        let service = service(store.clone(), vector, MaintenanceConfig::default());
        service.tick().await;

        assert!(store.get_by_id(keep.id).unwrap().is_some());
        assert!(store.get_by_id(doomed.id).unwrap().is_none());
        let stats = service.stats();
        assert_eq!(stats.superseded_deleted, 1);
        assert_eq!(stats.runs, 1);
    }

    #[tokio::test]
    async fn test_prompt_pruning_and_disabled_retention() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let vector = Arc::new(InMemoryVectorClient::new());
        PromptStore::insert(
            store.as_ref(),
            &NewUserPrompt {
                project: "demo".into(),
                text: "fresh prompt".into(),
                ..NewUserPrompt::default()
            },
        )
        .unwrap();
        ObservationStore::insert(
            store.as_ref(),
            &NewObservation {
                project: "demo".into(),
                obs_type: ObservationType::Change,
                title: "recent".into(),
                ..NewObservation::default()
            },
        )
        .unwrap();

        // retention_days = 0: age-based deletion is off.
        let service = service(
            store.clone(),
            vector,
            MaintenanceConfig {
                cleanup_superseded: false,
                ..MaintenanceConfig::default()
            },
        );
        service.tick().await;

        assert_eq!(ObservationStore::count(store.as_ref(), None).unwrap(), 1);
        // The fresh prompt survives the 30-day cutoff.
        assert_eq!(PromptStore::count(store.as_ref(), None).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_run_exits_on_cancellation_during_settle() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let vector = Arc::new(InMemoryVectorClient::new());
        let service = service(store, vector, MaintenanceConfig::default());
        let token = CancellationToken::new();
        let handle = tokio::spawn(service.run(token.clone()));
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("exits promptly")
            .expect("no panic");
    }
}
