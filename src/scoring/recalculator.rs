//! Background score recalculation.

use super::Scorer;
use crate::storage::ObservationStore;
use crate::epoch_ms;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default tick interval (1 hour).
const DEFAULT_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default rows recalculated per tick.
const DEFAULT_BATCH_SIZE: usize = 500;

/// Singleton cooperative task that keeps stored importance scores fresh.
///
/// Runs once at start, then every `interval`. Each tick reloads concept
/// weights from the store, pulls up to `batch_size` stale rows, and applies
/// the recomputed scores in a single batch statement. Tick errors are
/// logged and the loop continues; there are no retries within a tick.
pub struct ScoreRecalculator {
    store: Arc<dyn ObservationStore>,
    scorer: Arc<Scorer>,
    interval: Duration,
    batch_size: usize,
}

impl ScoreRecalculator {
    /// Creates a recalculator with the default interval and batch size.
    #[must_use]
    pub fn new(store: Arc<dyn ObservationStore>, scorer: Arc<Scorer>) -> Self {
        Self {
            store,
            scorer,
            interval: DEFAULT_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Overrides the tick interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Overrides the per-tick batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Runs until the token is cancelled. Exits within one tick.
    pub async fn run(self, shutdown: CancellationToken) {
        self.tick();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.reset();
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("score recalculator stopping");
                    break;
                },
                _ = ticker.tick() => self.tick(),
            }
        }
    }

    /// One recalculation pass. Public so tools and tests can force it.
    pub fn tick(&self) {
        if let Err(e) = self.scorer.refresh_concept_weights(self.store.as_ref()) {
            warn!("concept weight refresh failed: {e}");
        }

        let threshold_ms = i64::try_from(self.interval.as_millis()).unwrap_or(i64::MAX);
        let stale = match self.store.needing_score_update(threshold_ms, self.batch_size) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("stale score query failed: {e}");
                return;
            },
        };
        if stale.is_empty() {
            return;
        }

        let now = epoch_ms();
        let scores: BTreeMap<i64, f64> = stale
            .iter()
            .map(|obs| (obs.id, self.scorer.score(obs, now)))
            .collect();
        match self.store.update_importance_scores(&scores) {
            Ok(affected) => debug!(affected, "recalculated importance scores"),
            Err(e) => warn!("batch score update failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewObservation, ObservationType};
    use crate::storage::SqliteStore;

    #[test]
    fn test_tick_scores_stale_rows() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let obs = store
            .insert(&NewObservation {
                project: "demo".into(),
                obs_type: ObservationType::Decision,
                title: "pick sqlite".into(),
                ..NewObservation::default()
            })
            .unwrap();
        assert!(obs.score_updated_at.is_none());

        let recalc = ScoreRecalculator::new(store.clone(), Arc::new(Scorer::default()));
        recalc.tick();

        let refreshed = store.get_by_id(obs.id).unwrap().unwrap();
        assert!(refreshed.score_updated_at.is_some());
        // A fresh decision scores at the type-weight ceiling.
        assert!(refreshed.importance_score > 0.9);
    }

    #[tokio::test]
    async fn test_run_exits_on_cancellation() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let recalc = ScoreRecalculator::new(store, Arc::new(Scorer::default()))
            .with_interval(Duration::from_millis(50));
        let token = CancellationToken::new();
        let handle = tokio::spawn(recalc.run(token.clone()));
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop exits promptly")
            .expect("no panic");
    }
}
