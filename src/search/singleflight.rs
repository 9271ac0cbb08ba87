//! Request coalescing for identical concurrent searches.
//!
//! The first caller for a key becomes the leader and executes; everyone
//! else waits on a watch channel and receives the leader's result. Built
//! on `tokio::sync::watch` so late followers still observe the value after
//! the leader finished.

use super::SearchResponse;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Result shared between leader and followers. The error side is a plain
/// string because [`crate::Error`] is not `Clone`.
type FlightResult = Result<Arc<SearchResponse>, String>;

/// Per-key coalescing group.
#[derive(Default)]
pub struct SingleFlight {
    inflight: Mutex<HashMap<String, watch::Receiver<Option<FlightResult>>>>,
}

/// What a call observed.
pub enum FlightOutcome {
    /// This call executed the search.
    Led(FlightResult),
    /// This call waited on another execution's result.
    Followed(FlightResult),
}

/// Outcome of checking (and possibly registering into) the inflight map.
/// Kept as a synchronous, non-async-held-guard step so the `MutexGuard`
/// never needs to be proven droppable across an `.await` point.
enum LockOutcome {
    /// Poisoned map: degrade to uncoalesced execution.
    Poisoned,
    /// Another call is already in flight; wait on its result.
    Follow(watch::Receiver<Option<FlightResult>>),
    /// No call in flight; this call leads and must publish to `tx`.
    Lead(watch::Sender<Option<FlightResult>>),
}

impl SingleFlight {
    fn check_or_register(&self, key: &str) -> LockOutcome {
        let Ok(mut inflight) = self.inflight.lock() else {
            return LockOutcome::Poisoned;
        };
        if let Some(rx) = inflight.get(key) {
            return LockOutcome::Follow(rx.clone());
        }
        let (tx, rx) = watch::channel(None);
        inflight.insert(key.to_string(), rx);
        LockOutcome::Lead(tx)
    }

    /// Runs `execute` for the key unless an identical call is already in
    /// flight, in which case the caller waits for that result.
    pub async fn run<F, Fut>(&self, key: &str, execute: F) -> FlightOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FlightResult>,
    {
        let tx = match self.check_or_register(key) {
            LockOutcome::Poisoned => return FlightOutcome::Led(execute().await),
            LockOutcome::Follow(mut rx) => {
                let result = match rx.wait_for(Option::is_some).await {
                    Ok(value) => value.clone().unwrap_or_else(|| {
                        Err("coalesced execution vanished".to_string())
                    }),
                    Err(_) => Err("coalesced execution dropped".to_string()),
                };
                return FlightOutcome::Followed(result);
            },
            LockOutcome::Lead(tx) => tx,
        };

        let result = execute().await;

        if let Ok(mut inflight) = self.inflight.lock() {
            inflight.remove(key);
        }
        let _ = tx.send(Some(result.clone()));
        FlightOutcome::Led(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchMode;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    fn response(query: &str) -> Arc<SearchResponse> {
        Arc::new(SearchResponse {
            results: Vec::new(),
            total: 0,
            mode: SearchMode::FilterOnly,
            query: query.to_string(),
        })
    }

    #[tokio::test]
    async fn test_concurrent_identical_calls_execute_once() {
        let flight = Arc::new(SingleFlight::default());
        let executions = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flight = Arc::clone(&flight);
            let executions = Arc::clone(&executions);
            handles.push(tokio::spawn(async move {
                flight
                    .run("same-key", || async {
                        executions.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(response("q"))
                    })
                    .await
            }));
        }

        let mut led = 0;
        let mut followed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                FlightOutcome::Led(result) => {
                    led += 1;
                    assert!(result.is_ok());
                },
                FlightOutcome::Followed(result) => {
                    followed += 1;
                    assert!(result.is_ok());
                },
            }
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(led, 1);
        assert_eq!(followed, 7);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_coalesce() {
        let flight = SingleFlight::default();
        let FlightOutcome::Led(first) = flight.run("a", || async { Ok(response("a")) }).await
        else {
            panic!("expected leader");
        };
        let FlightOutcome::Led(second) = flight.run("b", || async { Ok(response("b")) }).await
        else {
            panic!("expected leader");
        };
        assert_eq!(first.unwrap().query, "a");
        assert_eq!(second.unwrap().query, "b");
    }

    #[tokio::test]
    async fn test_errors_propagate_to_followers() {
        let flight = Arc::new(SingleFlight::default());
        let f1 = Arc::clone(&flight);
        let leader = tokio::spawn(async move {
            f1.run("k", || async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Err("backend exploded".to_string())
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        let follower = flight.run("k", || async { Ok(response("never runs")) }).await;
        let FlightOutcome::Followed(result) = follower else {
            panic!("expected follower");
        };
        assert_eq!(result.unwrap_err(), "backend exploded");
        leader.await.unwrap();
    }
}
