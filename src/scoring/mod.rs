//! Importance scoring.
//!
//! The score function is pure and deterministic for a given config and
//! `now`; the [`ScoreRecalculator`] applies it in the background to rows
//! whose stored score has gone stale.

mod recalculator;

pub use recalculator::ScoreRecalculator;

use crate::models::{CRITICAL_CONCEPTS, Observation, ObservationType};
use crate::{DAY_MS, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Configuration for the importance-score function.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Half-life of the recency term, in days.
    pub recency_half_life_days: f64,
    /// Multiplier applied to `user_feedback`.
    pub feedback_weight: f64,
    /// Multiplier applied to the summed concept weights.
    pub concept_weight: f64,
    /// Multiplier applied to the retrieval term.
    pub retrieval_weight: f64,
    /// Floor of the returned score.
    pub min_score: f64,
    /// Per-type base weights.
    pub type_weights: HashMap<ObservationType, f64>,
    /// Per-tag weights summed over an observation's concepts.
    pub concept_weights: BTreeMap<String, f64>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let type_weights = HashMap::from([
            (ObservationType::Decision, 1.0),
            (ObservationType::Bugfix, 0.9),
            (ObservationType::Discovery, 0.85),
            (ObservationType::Feature, 0.8),
            (ObservationType::Refactor, 0.7),
            (ObservationType::Change, 0.6),
        ]);
        let mut concept_weights = BTreeMap::new();
        for tag in crate::models::CONCEPT_VOCABULARY {
            let weight = if CRITICAL_CONCEPTS.contains(tag) { 0.2 } else { 0.05 };
            concept_weights.insert((*tag).to_string(), weight);
        }
        Self {
            recency_half_life_days: 7.0,
            feedback_weight: 0.1,
            concept_weight: 1.0,
            retrieval_weight: 1.0,
            min_score: 0.01,
            type_weights,
            concept_weights,
        }
    }
}

impl ScoringConfig {
    /// Base weight for an observation type.
    #[must_use]
    pub fn type_weight(&self, obs_type: ObservationType) -> f64 {
        self.type_weights.get(&obs_type).copied().unwrap_or(0.6)
    }
}

/// Individual components of one score, for explain/debug tools.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ScoreBreakdown {
    /// Age of the observation, in days, floored at zero.
    pub age_days: f64,
    /// Exponential-decay recency factor in `(0, 1]`.
    pub recency: f64,
    /// `type_weight × recency`.
    pub core: f64,
    /// `user_feedback × feedback_weight`.
    pub feedback: f64,
    /// Summed concept weights × `concept_weight`.
    pub concepts: f64,
    /// `log2(retrieval_count + 1) × 0.1 × retrieval_weight`.
    pub retrieval: f64,
    /// `max(min_score, core + feedback + concepts + retrieval)`.
    pub final_score: f64,
}

/// Computes the full score breakdown for an observation at time `now_ms`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn breakdown(obs: &Observation, now_ms: i64, config: &ScoringConfig) -> ScoreBreakdown {
    let age_days = ((now_ms - obs.created_at) as f64 / DAY_MS as f64).max(0.0);
    let recency = 0.5_f64.powf(age_days / config.recency_half_life_days.max(f64::EPSILON));
    let core = config.type_weight(obs.obs_type) * recency;
    let feedback = obs.user_feedback as f64 * config.feedback_weight;
    let concepts = obs
        .concepts
        .iter()
        .filter_map(|c| config.concept_weights.get(c))
        .sum::<f64>()
        * config.concept_weight;
    let retrieval =
        ((obs.retrieval_count.max(0) as f64) + 1.0).log2() * 0.1 * config.retrieval_weight;
    let final_score = (core + feedback + concepts + retrieval).max(config.min_score);
    ScoreBreakdown {
        age_days,
        recency,
        core,
        feedback,
        concepts,
        retrieval,
        final_score,
    }
}

/// Computes the final score only.
#[must_use]
pub fn score(obs: &Observation, now_ms: i64, config: &ScoringConfig) -> f64 {
    breakdown(obs, now_ms, config).final_score
}

/// Shared scoring handle.
///
/// The config sits behind a mutex so the recalculator can atomically swap
/// in refreshed concept weights while searches keep scoring.
pub struct Scorer {
    config: Mutex<ScoringConfig>,
}

impl Scorer {
    /// Creates a scorer with the given configuration.
    #[must_use]
    pub fn new(config: ScoringConfig) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }

    /// Scores one observation at `now_ms`.
    pub fn score(&self, obs: &Observation, now_ms: i64) -> f64 {
        score(obs, now_ms, &self.snapshot())
    }

    /// Full component breakdown for one observation at `now_ms`.
    pub fn breakdown(&self, obs: &Observation, now_ms: i64) -> ScoreBreakdown {
        breakdown(obs, now_ms, &self.snapshot())
    }

    /// Clones the current configuration.
    pub fn snapshot(&self) -> ScoringConfig {
        match self.config.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Atomically replaces the concept-weight map.
    ///
    /// An empty map is ignored: the built-in defaults stay in force until
    /// the store actually carries overrides.
    pub fn replace_concept_weights(&self, weights: BTreeMap<String, f64>) {
        if weights.is_empty() {
            return;
        }
        let mut guard = match self.config.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.concept_weights = weights;
    }

    /// Reloads concept weights from the store and swaps them in.
    pub fn refresh_concept_weights(
        &self,
        store: &dyn crate::storage::ObservationStore,
    ) -> Result<()> {
        let weights = store.concept_weights()?;
        self.replace_concept_weights(weights);
        Ok(())
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}
