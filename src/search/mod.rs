//! Hybrid retrieval.
//!
//! [`SearchManager`] serves every read query in the system. Execution is
//! hybrid (FTS ⊕ vector fused with RRF) when a query string is present and
//! the vector backend is reachable, filter-only otherwise. Results sit
//! behind a TTL cache with single-flight coalescing; a frequency tracker
//! drives a background warming loop.

mod cache;
mod frequency;
mod metrics;
mod params;
mod rrf;
mod singleflight;

pub use cache::{DEFAULT_CAPACITY, DEFAULT_TTL, SWEEP_INTERVAL, SearchCache};
pub use frequency::{QueryFrequencyTracker, TRACKER_CAPACITY, WarmCandidate};
pub use metrics::{MetricsSnapshot, SearchMetrics};
pub use params::{
    DEFAULT_LIMIT, MAX_LIMIT, OrderBy, ResultFormat, SearchKind, SearchParams, normalize_query,
};
pub use rrf::{FusedDoc, RRF_K, RankedDoc, bm25_normalize, fuse};
pub use singleflight::{FlightOutcome, SingleFlight};

use crate::models::{Observation, Scope, SessionSummary, UserPrompt};
use crate::storage::{ObservationStore, PromptStore, SummaryStore};
use crate::vector::{DocType, VectorClient, VectorFilter};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Which execution path served a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// FTS ⊕ vector fused with RRF.
    Hybrid,
    /// Pure SQL recency filter.
    FilterOnly,
}

/// One result row.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchItem {
    /// Document kind.
    #[serde(rename = "type")]
    pub doc_type: DocType,
    /// Row id.
    pub id: i64,
    /// Headline.
    pub title: String,
    /// Short secondary line.
    pub snippet: String,
    /// Relevance or importance score for the row.
    pub score: f64,
    /// Creation timestamp (epoch ms).
    pub created_at: i64,
    /// Full document body when `format = full`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// A complete search response.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchResponse {
    /// Ranked results.
    pub results: Vec<SearchItem>,
    /// Result count (after offset/limit).
    pub total: usize,
    /// Execution path taken.
    pub mode: SearchMode,
    /// Normalized query string.
    pub query: String,
}

/// Tuning for the search manager.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Cache entry TTL.
    pub cache_ttl: Duration,
    /// Cache capacity.
    pub cache_capacity: usize,
    /// Each retrieval arm fetches `factor × (limit + offset)` candidates.
    pub candidate_factor: usize,
    /// RRF dampening constant.
    pub rrf_k: f64,
    /// Delay before the warming loop starts.
    pub warm_initial_delay: Duration,
    /// Warming loop tick.
    pub warm_interval: Duration,
    /// Deadline for one warming execution.
    pub warm_deadline: Duration,
    /// Frequency-tracker prune tick.
    pub prune_interval: Duration,
    /// Latency above which a search logs at warning level.
    pub slow_query_warn: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cache_ttl: cache::DEFAULT_TTL,
            cache_capacity: cache::DEFAULT_CAPACITY,
            candidate_factor: 2,
            rrf_k: RRF_K,
            warm_initial_delay: Duration::from_secs(30),
            warm_interval: Duration::from_secs(20),
            warm_deadline: Duration::from_secs(5),
            prune_interval: Duration::from_secs(5 * 60),
            slow_query_warn: Duration::from_millis(100),
        }
    }
}

/// Query suffix appended by the `decisions` shortcut.
const DECISIONS_BOOST: &str = "decision chose architecture";
/// Query suffix appended by the `changes` shortcut.
const CHANGES_BOOST: &str = "changed modified refactored";
/// Query suffix appended by the `how_it_works` shortcut.
const HOW_IT_WORKS_BOOST: &str = "architecture design pattern implements";

/// The search manager.
pub struct SearchManager {
    observations: Arc<dyn ObservationStore>,
    summaries: Arc<dyn SummaryStore>,
    prompts: Arc<dyn PromptStore>,
    vector: Arc<dyn VectorClient>,
    cache: SearchCache,
    flights: SingleFlight,
    frequency: QueryFrequencyTracker,
    metrics: SearchMetrics,
    config: SearchConfig,
}

impl SearchManager {
    /// Wires a manager from its collaborators.
    #[must_use]
    pub fn new(
        observations: Arc<dyn ObservationStore>,
        summaries: Arc<dyn SummaryStore>,
        prompts: Arc<dyn PromptStore>,
        vector: Arc<dyn VectorClient>,
        config: SearchConfig,
    ) -> Self {
        Self {
            cache: SearchCache::new(config.cache_ttl, config.cache_capacity),
            flights: SingleFlight::default(),
            frequency: QueryFrequencyTracker::default(),
            metrics: SearchMetrics::default(),
            observations,
            summaries,
            prompts,
            vector,
            config,
        }
    }

    /// Metrics counters.
    #[must_use]
    pub const fn metrics(&self) -> &SearchMetrics {
        &self.metrics
    }

    /// Frequency tracker (read-only reporting).
    #[must_use]
    pub const fn frequency(&self) -> &QueryFrequencyTracker {
        &self.frequency
    }

    /// Live cache entry count.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Vector backend reachability.
    pub fn vector_connected(&self) -> bool {
        self.vector.is_connected()
    }

    /// The unified entry point for every search tool.
    pub async fn unified_search(&self, params: &SearchParams) -> Result<Arc<SearchResponse>> {
        let params = params.normalized();
        self.metrics.total_searches.fetch_add(1, Ordering::Relaxed);

        let key = params.cache_key();
        if let Some(hit) = self.cache.get(&key) {
            self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit);
        }

        let outcome = self
            .flights
            .run(&key, || async {
                let started = Instant::now();
                match self.execute(&params).await {
                    Ok(response) => {
                        let elapsed = started.elapsed();
                        self.metrics
                            .record_latency(u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX));
                        if elapsed > self.config.slow_query_warn {
                            warn!(
                                query = params.query,
                                elapsed_ms = elapsed.as_millis() as u64,
                                "slow search"
                            );
                        }
                        let response = Arc::new(response);
                        self.cache.put(key.clone(), Arc::clone(&response));
                        self.frequency.record(&key, &params);
                        Ok(response)
                    },
                    Err(e) => {
                        self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                        Err(e.to_string())
                    },
                }
            })
            .await;

        match outcome {
            FlightOutcome::Led(result) => result.map_err(|e| Error::transient("search", e)),
            FlightOutcome::Followed(result) => {
                self.metrics.coalesced_requests.fetch_add(1, Ordering::Relaxed);
                result.map_err(|e| Error::transient("search", e))
            },
        }
    }

    /// `decisions` shortcut: keyword boost plus an observation-only scope.
    pub async fn decisions(&self, params: &SearchParams) -> Result<Arc<SearchResponse>> {
        self.shortcut(params, DECISIONS_BOOST).await
    }

    /// `changes` shortcut.
    pub async fn changes(&self, params: &SearchParams) -> Result<Arc<SearchResponse>> {
        self.shortcut(params, CHANGES_BOOST).await
    }

    /// `how_it_works` shortcut.
    pub async fn how_it_works(&self, params: &SearchParams) -> Result<Arc<SearchResponse>> {
        self.shortcut(params, HOW_IT_WORKS_BOOST).await
    }

    async fn shortcut(&self, params: &SearchParams, boost: &str) -> Result<Arc<SearchResponse>> {
        let mut boosted = params.clone();
        boosted.query = format!("{} {boost}", params.query).trim().to_string();
        boosted.kind = SearchKind::Observations;
        self.unified_search(&boosted).await
    }

    /// Dispatches to hybrid or filter-only execution. Uncached.
    async fn execute(&self, params: &SearchParams) -> Result<SearchResponse> {
        if !params.query.is_empty() && self.vector.is_connected() {
            self.metrics.vector_searches.fetch_add(1, Ordering::Relaxed);
            self.hybrid(params).await
        } else {
            self.metrics.filter_searches.fetch_add(1, Ordering::Relaxed);
            self.filter_only(params)
        }
    }

    async fn hybrid(&self, params: &SearchParams) -> Result<SearchResponse> {
        let candidates = (params.limit + params.offset) * self.config.candidate_factor.max(1);

        let lexical: Vec<RankedDoc> = match self
            .observations
            .fts_scored(&params.query, &params.project, candidates)
        {
            Ok(hits) => hits
                .iter()
                .map(|(obs, raw)| RankedDoc {
                    doc_type: DocType::Observation,
                    id: obs.id,
                    score: bm25_normalize(*raw),
                    created_at: obs.created_at,
                })
                .collect(),
            Err(e) => {
                warn!("fts arm failed: {e}");
                Vec::new()
            },
        };

        let filter = VectorFilter {
            doc_type: match params.kind {
                SearchKind::All => None,
                SearchKind::Observations => Some(DocType::Observation),
                SearchKind::Sessions => Some(DocType::SessionSummary),
                SearchKind::Prompts => Some(DocType::UserPrompt),
            },
            project: Some(params.project.clone()),
        };
        let dense: Vec<RankedDoc> = match self.vector.query(&params.query, candidates, &filter).await
        {
            Ok(hits) => hits
                .iter()
                .map(|hit| RankedDoc {
                    doc_type: hit.metadata.doc_type,
                    id: hit.metadata.sqlite_id,
                    score: hit.similarity,
                    created_at: hit.metadata.created_at,
                })
                .collect(),
            Err(e) => {
                // One working arm is enough; with neither, degrade to the
                // recency filter.
                warn!("vector arm failed: {e}");
                if lexical.is_empty() {
                    return self.filter_only(params);
                }
                Vec::new()
            },
        };

        let fused = fuse(
            &lexical,
            &dense,
            self.config.rrf_k,
            params.offset + params.limit,
        );
        let window: Vec<&FusedDoc> = fused.iter().skip(params.offset).collect();

        // Group ids per type, hydrate preserving order, then re-interleave.
        let mut obs_ids = Vec::new();
        let mut summary_ids = Vec::new();
        let mut prompt_ids = Vec::new();
        for doc in &window {
            match doc.doc_type {
                DocType::Observation => obs_ids.push(doc.id),
                DocType::SessionSummary => summary_ids.push(doc.id),
                DocType::UserPrompt => prompt_ids.push(doc.id),
            }
        }
        let observations: HashMap<i64, Observation> = self
            .observations
            .get_by_ids_preserve_order(&obs_ids)?
            .into_iter()
            .map(|o| (o.id, o))
            .collect();
        let summaries: HashMap<i64, SessionSummary> = self
            .summaries
            .get_by_ids_preserve_order(&summary_ids)?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();
        let prompts: HashMap<i64, UserPrompt> = self
            .prompts
            .get_by_ids_preserve_order(&prompt_ids)?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut results = Vec::with_capacity(window.len());
        for doc in window {
            let item = match doc.doc_type {
                DocType::Observation => observations.get(&doc.id).and_then(|obs| {
                    if params.exclude_superseded && obs.is_superseded {
                        return None;
                    }
                    if !matches_filters(obs, params) {
                        return None;
                    }
                    Some(observation_item(obs, doc.rrf_score, params.format))
                }),
                DocType::SessionSummary => summaries
                    .get(&doc.id)
                    .map(|summary| summary_item(summary, doc.rrf_score, params.format)),
                DocType::UserPrompt => prompts
                    .get(&doc.id)
                    .map(|prompt| prompt_item(prompt, doc.rrf_score)),
            };
            if let Some(item) = item {
                results.push(item);
            }
        }

        order_results(&mut results, params.order_by);
        results.truncate(params.limit);
        self.touch_retrieved(&results);

        Ok(SearchResponse {
            total: results.len(),
            results,
            mode: SearchMode::Hybrid,
            query: params.query.clone(),
        })
    }

    fn filter_only(&self, params: &SearchParams) -> Result<SearchResponse> {
        // Filters may drop rows, so fetch with slack.
        let fetch = (params.offset + params.limit) * 2 + 10;
        let mut results: Vec<SearchItem> = Vec::new();

        if matches!(params.kind, SearchKind::All | SearchKind::Observations) {
            let rows = if params.exclude_superseded {
                self.observations.get_active(&params.project, fetch)?
            } else {
                self.observations.get_recent(&params.project, fetch)?
            };
            results.extend(
                rows.iter()
                    .filter(|obs| matches_filters(obs, params))
                    .map(|obs| observation_item(obs, obs.importance_score, params.format)),
            );
        }
        if matches!(params.kind, SearchKind::All | SearchKind::Sessions) {
            let rows = self.summaries.get_recent(&params.project, fetch)?;
            results.extend(
                rows.iter()
                    .filter(|s| in_date_range(s.created_at, params))
                    .map(|s| summary_item(s, 0.0, params.format)),
            );
        }
        if matches!(params.kind, SearchKind::Prompts) {
            let rows = self.prompts.get_recent(&params.project, fetch)?;
            results.extend(
                rows.iter()
                    .filter(|p| in_date_range(p.created_at, params))
                    .map(|p| prompt_item(p, 0.0)),
            );
        }

        // Relevance has no meaning without a query; fall back to recency.
        let order = if params.order_by == OrderBy::Relevance {
            OrderBy::DateDesc
        } else {
            params.order_by
        };
        order_results(&mut results, order);
        let results: Vec<SearchItem> = results
            .into_iter()
            .skip(params.offset)
            .take(params.limit)
            .collect();
        self.touch_retrieved(&results);

        Ok(SearchResponse {
            total: results.len(),
            results,
            mode: SearchMode::FilterOnly,
            query: params.query.clone(),
        })
    }

    fn touch_retrieved(&self, results: &[SearchItem]) {
        let ids: Vec<i64> = results
            .iter()
            .filter(|item| item.doc_type == DocType::Observation)
            .map(|item| item.id)
            .collect();
        if ids.is_empty() {
            return;
        }
        if let Err(e) = self.observations.increment_retrieval_counts(&ids) {
            debug!("retrieval-count bump failed: {e}");
        }
    }

    /// Spawns the cache sweeper, warming loop, and frequency pruner.
    ///
    /// All three select on the token and exit within one tick.
    pub fn spawn_background(
        self: &Arc<Self>,
        shutdown: &CancellationToken,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        let manager = Arc::clone(self);
        let token = shutdown.clone();
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.reset();
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => manager.cache.sweep_expired(),
                }
            }
        }));

        let manager = Arc::clone(self);
        let token = shutdown.clone();
        handles.push(tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => return,
                () = tokio::time::sleep(manager.config.warm_initial_delay) => {},
            }
            let mut ticker = tokio::time::interval(manager.config.warm_interval);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => manager.warm_tick().await,
                }
            }
        }));

        let manager = Arc::clone(self);
        let token = shutdown.clone();
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.config.prune_interval);
            ticker.reset();
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => manager.frequency.prune_stale(),
                }
            }
        }));

        handles
    }

    /// One warming pass: re-execute the hottest stale queries.
    async fn warm_tick(&self) {
        for candidate in self.frequency.warm_candidates(self.cache.ttl()) {
            let execution = tokio::time::timeout(
                self.config.warm_deadline,
                self.execute(&candidate.params),
            )
            .await;
            match execution {
                Ok(Ok(response)) => {
                    self.cache.put(candidate.key.clone(), Arc::new(response));
                    self.frequency.mark_cached(&candidate.key);
                },
                Ok(Err(e)) => debug!(key = candidate.key, "cache warm failed: {e}"),
                Err(_) => debug!(key = candidate.key, "cache warm timed out"),
            }
        }
    }
}

fn in_date_range(created_at: i64, params: &SearchParams) -> bool {
    if let Some(start) = params.date_start {
        if created_at < start {
            return false;
        }
    }
    if let Some(end) = params.date_end {
        if created_at > end {
            return false;
        }
    }
    true
}

/// Post-hydration filters shared by both execution modes.
fn matches_filters(obs: &Observation, params: &SearchParams) -> bool {
    if !in_date_range(obs.created_at, params) {
        return false;
    }
    if let Some(obs_type) = params.obs_type {
        if obs.obs_type != obs_type {
            return false;
        }
    }
    if let Some(scope) = params.scope {
        if obs.scope != scope {
            return false;
        }
    }
    // Rows from other projects only ride along when they are
    // global-scoped and the caller opted in.
    if obs.project != params.project
        && !(obs.scope == Scope::Global && params.include_global)
    {
        return false;
    }
    if !params.concepts.is_empty() {
        let wanted: Vec<String> = params.concepts.iter().map(|c| c.to_lowercase()).collect();
        if !wanted.iter().all(|c| obs.concepts.contains(c)) {
            return false;
        }
    }
    if !params.files.is_empty() {
        let touched = |file: &String| {
            obs.files_read.contains(file) || obs.files_modified.contains(file)
        };
        if !params.files.iter().any(touched) {
            return false;
        }
    }
    true
}

fn order_results(results: &mut [SearchItem], order_by: OrderBy) {
    match order_by {
        OrderBy::Relevance => {},
        OrderBy::DateDesc => results.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        OrderBy::DateAsc => results.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let head: String = text.chars().take(max).collect();
        format!("{head}…")
    }
}

fn observation_item(obs: &Observation, score: f64, format: ResultFormat) -> SearchItem {
    let snippet = if obs.subtitle.is_empty() {
        truncate_chars(&obs.narrative, 120)
    } else {
        obs.subtitle.clone()
    };
    SearchItem {
        doc_type: DocType::Observation,
        id: obs.id,
        title: obs.title.clone(),
        snippet,
        score,
        created_at: obs.created_at,
        body: match format {
            ResultFormat::Index => None,
            ResultFormat::Full => serde_json::to_value(obs).ok(),
        },
    }
}

fn summary_item(summary: &SessionSummary, score: f64, format: ResultFormat) -> SearchItem {
    SearchItem {
        doc_type: DocType::SessionSummary,
        id: summary.id,
        title: truncate_chars(&summary.request, 120),
        snippet: truncate_chars(
            if summary.completed.is_empty() {
                &summary.learned
            } else {
                &summary.completed
            },
            120,
        ),
        score,
        created_at: summary.created_at,
        body: match format {
            ResultFormat::Index => None,
            ResultFormat::Full => serde_json::to_value(summary).ok(),
        },
    }
}

fn prompt_item(prompt: &UserPrompt, score: f64) -> SearchItem {
    SearchItem {
        doc_type: DocType::UserPrompt,
        id: prompt.id,
        title: truncate_chars(&prompt.text, 80),
        snippet: String::new(),
        score,
        created_at: prompt.created_at,
        body: None,
    }
}
