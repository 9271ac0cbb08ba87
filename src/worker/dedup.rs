//! Duplicate suppression for the ingest path.
//!
//! Two layers, both cheap enough to run before the LLM call or right
//! after parsing:
//!
//! 1. [`RequestDedup`] — an exact-match window over request hashes, so the
//!    same tool execution replayed within the TTL never reaches the
//!    distiller twice.
//! 2. [`jaccard_similarity`] — token-set overlap between a freshly parsed
//!    observation and the project's recent rows, catching the distiller
//!    rephrasing the same finding.

use crate::models::Observation;
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::parser::ParsedObservation;

/// Only the head of the output feeds the hash; tails of long outputs are
/// frequently cursor spam that differs between identical operations.
const OUTPUT_HASH_PREFIX: usize = 1000;

/// Hex chars of the digest kept as the dedup key.
const HASH_PREFIX_LEN: usize = 16;

/// Computes the request-dedup hash for a tool execution.
#[must_use]
pub fn request_hash(tool_name: &str, input: &serde_json::Value, output: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tool_name.as_bytes());
    hasher.update(input.to_string().as_bytes());
    let head = &output.as_bytes()[..output.len().min(OUTPUT_HASH_PREFIX)];
    hasher.update(head);
    let digest = hex::encode(hasher.finalize());
    digest[..HASH_PREFIX_LEN].to_string()
}

/// TTL'd window of recently seen request hashes.
pub struct RequestDedup {
    window: Mutex<LruCache<String, Instant>>,
    ttl: Duration,
}

impl RequestDedup {
    /// Creates a window with the given capacity and TTL.
    ///
    /// # Panics
    ///
    /// Panics if capacity is 0.
    #[must_use]
    #[allow(clippy::expect_used)] // Documented panic for invalid input
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(capacity).expect("capacity must be > 0");
        Self {
            window: Mutex::new(LruCache::new(cap)),
            ttl,
        }
    }

    /// Returns true if the hash was seen within the TTL; otherwise records
    /// it.
    ///
    /// Failing open on a poisoned lock is deliberate: a missed dedup means
    /// one extra distillation, which is safe.
    pub fn check_and_record(&self, hash: &str) -> bool {
        let Ok(mut window) = self.window.lock() else {
            return false;
        };
        let now = Instant::now();
        if let Some(recorded) = window.get(hash) {
            if now.duration_since(*recorded) < self.ttl {
                return true;
            }
        }
        // When full, shed expired entries before the LRU eviction kicks in.
        if window.len() == usize::from(window.cap()) {
            let expired: Vec<String> = window
                .iter()
                .filter(|(_, recorded)| now.duration_since(**recorded) >= self.ttl)
                .map(|(key, _)| key.clone())
                .collect();
            for key in expired {
                window.pop(&key);
            }
        }
        window.put(hash.to_string(), now);
        false
    }
}

impl Default for RequestDedup {
    /// 1000 entries, 300-second TTL.
    fn default() -> Self {
        Self::new(1000, Duration::from_secs(300))
    }
}

fn tokens(text: &str, set: &mut HashSet<String>) {
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
    {
        set.insert(token.to_lowercase());
    }
}

fn parsed_token_set(obs: &ParsedObservation) -> HashSet<String> {
    let mut set = HashSet::new();
    tokens(&obs.title, &mut set);
    tokens(&obs.narrative, &mut set);
    for concept in &obs.concepts {
        set.insert(concept.clone());
    }
    for file in obs.files_read.iter().chain(&obs.files_modified) {
        tokens(file, &mut set);
    }
    set
}

fn stored_token_set(obs: &Observation) -> HashSet<String> {
    let mut set = HashSet::new();
    tokens(&obs.title, &mut set);
    tokens(&obs.narrative, &mut set);
    for concept in &obs.concepts {
        set.insert(concept.clone());
    }
    for file in obs.files_read.iter().chain(&obs.files_modified) {
        tokens(file, &mut set);
    }
    set
}

#[allow(clippy::cast_precision_loss)]
fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

/// Jaccard similarity of the token sets of a parsed observation and a
/// stored one, over title ∪ narrative ∪ concepts ∪ files.
#[must_use]
pub fn jaccard_similarity(parsed: &ParsedObservation, stored: &Observation) -> f64 {
    jaccard(&parsed_token_set(parsed), &stored_token_set(stored))
}

/// Jaccard similarity between two stored observations, over the same
/// token fields. Used by the consolidation-suggestion report.
#[must_use]
pub fn stored_similarity(a: &Observation, b: &Observation) -> f64 {
    jaccard(&stored_token_set(a), &stored_token_set(b))
}

/// Returns true if the parsed observation duplicates any of the recent
/// rows at or above the threshold.
#[must_use]
pub fn is_semantic_duplicate(
    parsed: &ParsedObservation,
    recent: &[Observation],
    threshold: f64,
) -> bool {
    recent
        .iter()
        .any(|stored| jaccard_similarity(parsed, stored) >= threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ObservationType;

    #[test]
    fn test_request_hash_shape_and_stability() {
        let input = serde_json::json!({"command": "cargo test"});
        let h1 = request_hash("Bash", &input, "all green");
        let h2 = request_hash("Bash", &input, "all green");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), HASH_PREFIX_LEN);
        assert_ne!(h1, request_hash("Bash", &input, "one red"));
    }

    #[test]
    fn test_hash_ignores_output_tail_past_prefix() {
        let input = serde_json::json!({});
        let base = "x".repeat(OUTPUT_HASH_PREFIX);
        let h1 = request_hash("Read", &input, &format!("{base}AAAA"));
        let h2 = request_hash("Read", &input, &format!("{base}BBBB"));
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_window_drops_repeat_within_ttl() {
        let dedup = RequestDedup::new(10, Duration::from_secs(300));
        assert!(!dedup.check_and_record("abc"));
        assert!(dedup.check_and_record("abc"));
        assert!(!dedup.check_and_record("def"));
    }

    #[test]
    fn test_window_expires_after_ttl() {
        let dedup = RequestDedup::new(10, Duration::from_millis(1));
        assert!(!dedup.check_and_record("abc"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(!dedup.check_and_record("abc"));
    }

    fn parsed(title: &str, narrative: &str) -> ParsedObservation {
        ParsedObservation {
            obs_type: ObservationType::Bugfix,
            title: title.to_string(),
            subtitle: String::new(),
            narrative: narrative.to_string(),
            facts: vec![],
            concepts: vec![],
            files_read: vec![],
            files_modified: vec![],
        }
    }

    fn stored(title: &str, narrative: &str) -> Observation {
        Observation {
            id: 1,
            project: "p".into(),
            scope: crate::models::Scope::Project,
            obs_type: ObservationType::Bugfix,
            title: title.to_string(),
            subtitle: String::new(),
            narrative: narrative.to_string(),
            facts: vec![],
            concepts: vec![],
            files_read: vec![],
            files_modified: vec![],
            file_mtimes: std::collections::BTreeMap::new(),
            sdk_session_id: "s".into(),
            prompt_number: 1,
            created_at: 0,
            importance_score: 0.5,
            user_feedback: 0,
            retrieval_count: 0,
            is_superseded: false,
            score_updated_at: None,
        }
    }

    #[test]
    fn test_near_identical_observations_flagged() {
        let a = parsed("Fix JWT validation bypass", "Unsigned tokens were accepted by auth");
        let b = stored("Fix JWT validation bypass", "Unsigned tokens were accepted by auth");
        assert!(jaccard_similarity(&a, &b) > 0.9);
        assert!(is_semantic_duplicate(&a, &[b], 0.4));
    }

    #[test]
    fn test_unrelated_observations_pass() {
        let a = parsed("Tune cache eviction", "Random eviction replaced with LRU sampling");
        let b = stored("Fix JWT validation bypass", "Unsigned tokens were accepted by auth");
        assert!(jaccard_similarity(&a, &b) < 0.4);
        assert!(!is_semantic_duplicate(&a, &[b], 0.4));
    }
}
