//! Distillation worker.
//!
//! Turns tool-execution traces and session turns into stored observations
//! and summaries. The pipeline per tool execution:
//!
//! 1. deny-list and trivial-operation filters (no LLM cost)
//! 2. request-hash dedup window
//! 3. circuit breaker gate
//! 4. bounded-concurrency distiller call (semaphore, default 4 permits)
//! 5. grammar parse, then Jaccard dedup against the project's recent rows
//! 6. file-mtime capture, store write, vector-sync enqueue, event broadcast
//!
//! Failure semantics: a distiller error feeds the breaker and surfaces to
//! the caller; a store error on one parsed observation is logged and the
//! rest proceed; vector upserts are never fatal.

mod breaker;
mod dedup;
pub mod filters;
pub mod parser;
mod paths;
mod vector_sync;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use dedup::{
    RequestDedup, is_semantic_duplicate, jaccard_similarity, request_hash, stored_similarity,
};
pub use paths::{capture_file_mtimes, safe_resolve_path};
pub use vector_sync::{
    MAX_VECTOR_SYNC_WORKERS, SyncRequest, VectorSyncHandle, VectorSyncPool,
};

use crate::llm::{Distiller, prompts};
use crate::models::{
    EventAction, EventBus, MemoryEvent, NewObservation, NewSessionSummary, NewUserPrompt,
};
use crate::storage::{ObservationStore, PromptStore, SummaryStore};
use crate::vector::DocType;
use crate::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Configuration for the distillation worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum distiller subprocesses in flight.
    pub max_concurrent_cli_calls: usize,
    /// Request-dedup window capacity.
    pub dedup_capacity: usize,
    /// Request-dedup TTL.
    pub dedup_ttl: Duration,
    /// Circuit breaker tuning.
    pub breaker: BreakerConfig,
    /// Jaccard similarity at or above which a parsed observation is a
    /// duplicate.
    pub similarity_threshold: f64,
    /// How many recent rows the similarity dedup compares against.
    pub similarity_window: usize,
    /// Importance score assigned at insert; the recalculator refines it.
    pub initial_score: f64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_cli_calls: 4,
            dedup_capacity: 1000,
            dedup_ttl: Duration::from_secs(300),
            breaker: BreakerConfig::default(),
            similarity_threshold: 0.4,
            similarity_window: 50,
            initial_score: 0.5,
        }
    }
}

/// Why an ingest call produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Tool is on the deny-list.
    UninterestingTool,
    /// Output too trivial to distill.
    TrivialOperation,
    /// Identical request seen within the dedup TTL.
    DuplicateRequest,
    /// Distiller returned no observation blocks (or `<skip/>`).
    NoObservations,
    /// Every parsed observation duplicated a recent row.
    SemanticDuplicate,
    /// Distiller emitted `<skip_summary/>` or no summary block.
    SummarySkipped,
    /// Summary text was about the memory system itself.
    MetaSummary,
    /// Assistant response failed the meaningful-content check.
    NotMeaningful,
}

/// Result of one ingest call.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// Rows were written.
    Stored {
        /// Ids of the stored rows.
        ids: Vec<i64>,
    },
    /// Nothing was written.
    Skipped(SkipReason),
}

/// One tool execution handed to the worker.
#[derive(Debug, Clone)]
pub struct ToolExecution {
    /// Name of the executed tool.
    pub tool_name: String,
    /// Tool input as JSON.
    pub input: serde_json::Value,
    /// Tool output text.
    pub output: String,
    /// Project the execution belongs to.
    pub project: String,
    /// SDK session id.
    pub sdk_session_id: String,
    /// 1-based prompt index within the session.
    pub prompt_number: i64,
    /// Working directory of the execution, for path resolution.
    pub cwd: PathBuf,
}

/// One completed session turn handed to the worker.
#[derive(Debug, Clone)]
pub struct SessionTurn {
    /// Project the turn belongs to.
    pub project: String,
    /// SDK session id.
    pub sdk_session_id: String,
    /// 1-based prompt index within the session.
    pub prompt_number: i64,
    /// Verbatim user message.
    pub user_prompt: String,
    /// Full assistant response for the turn.
    pub assistant_response: String,
}

/// The distillation worker.
pub struct DistillationWorker {
    observations: Arc<dyn ObservationStore>,
    summaries: Arc<dyn SummaryStore>,
    prompts: Arc<dyn PromptStore>,
    distiller: Arc<dyn Distiller>,
    sync: VectorSyncHandle,
    events: EventBus,
    breaker: CircuitBreaker,
    dedup: RequestDedup,
    semaphore: Arc<Semaphore>,
    config: WorkerConfig,
}

impl DistillationWorker {
    /// Wires a worker from its collaborators.
    #[must_use]
    pub fn new(
        observations: Arc<dyn ObservationStore>,
        summaries: Arc<dyn SummaryStore>,
        prompts: Arc<dyn PromptStore>,
        distiller: Arc<dyn Distiller>,
        sync: VectorSyncHandle,
        events: EventBus,
        config: WorkerConfig,
    ) -> Self {
        Self {
            breaker: CircuitBreaker::new(&config.breaker),
            dedup: RequestDedup::new(config.dedup_capacity, config.dedup_ttl),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_cli_calls.max(1))),
            observations,
            summaries,
            prompts,
            distiller,
            sync,
            events,
            config,
        }
    }

    /// Current breaker state, for health tools.
    #[must_use]
    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// Runs the distiller behind the breaker and the concurrency cap.
    async fn distill_guarded(&self, prompt: &str) -> Result<String> {
        if !self.breaker.allow() {
            return Err(Error::transient("distill", "circuit breaker open"));
        }
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| Error::transient("distill", "worker shutting down"))?;
        match self.distiller.distill(prompt).await {
            Ok(text) => {
                self.breaker.on_success();
                Ok(text)
            },
            Err(e) => {
                if self.breaker.on_failure() {
                    warn!("distiller circuit breaker opened");
                }
                Err(e)
            },
        }
    }

    /// Ingests one tool execution.
    pub async fn process_tool_execution(&self, exec: &ToolExecution) -> Result<IngestOutcome> {
        if filters::is_uninteresting_tool(&exec.tool_name) {
            return Ok(IngestOutcome::Skipped(SkipReason::UninterestingTool));
        }
        if filters::is_trivial_operation(&exec.tool_name, &exec.input, &exec.output) {
            debug!(tool = exec.tool_name, "trivial operation skipped");
            return Ok(IngestOutcome::Skipped(SkipReason::TrivialOperation));
        }
        let hash = request_hash(&exec.tool_name, &exec.input, &exec.output);
        if self.dedup.check_and_record(&hash) {
            debug!(hash, "duplicate request skipped");
            return Ok(IngestOutcome::Skipped(SkipReason::DuplicateRequest));
        }

        let prompt = prompts::observation_prompt(&exec.tool_name, &exec.input, &exec.output);
        let response = self.distill_guarded(&prompt).await?;

        let parsed = parser::parse_observations(&response);
        if parsed.is_empty() {
            return Ok(IngestOutcome::Skipped(SkipReason::NoObservations));
        }

        let recent = self
            .observations
            .get_recent(&exec.project, self.config.similarity_window)
            .unwrap_or_else(|e| {
                warn!("recent-row fetch for dedup failed: {e}");
                Vec::new()
            });

        let mut ids = Vec::new();
        for observation in parsed {
            if is_semantic_duplicate(&observation, &recent, self.config.similarity_threshold) {
                debug!(title = observation.title, "semantic duplicate skipped");
                continue;
            }
            let all_files: Vec<String> = observation
                .files_read
                .iter()
                .chain(&observation.files_modified)
                .cloned()
                .collect();
            let file_mtimes = capture_file_mtimes(all_files.iter(), &exec.cwd).await;

            let new = NewObservation {
                project: exec.project.clone(),
                scope: None,
                obs_type: observation.obs_type,
                title: observation.title,
                subtitle: observation.subtitle,
                narrative: observation.narrative,
                facts: observation.facts,
                concepts: observation.concepts,
                files_read: observation.files_read,
                files_modified: observation.files_modified,
                file_mtimes,
                sdk_session_id: exec.sdk_session_id.clone(),
                prompt_number: exec.prompt_number,
                importance_score: self.config.initial_score,
            };
            match self.observations.insert(&new) {
                Ok(stored) => {
                    self.sync.enqueue(SyncRequest {
                        doc_type: DocType::Observation,
                        sqlite_id: stored.id,
                        project: stored.project.clone(),
                        created_at: stored.created_at,
                        text: stored.embedding_text(),
                    });
                    self.events.publish(MemoryEvent {
                        doc_type: DocType::Observation,
                        action: EventAction::Created,
                        id: stored.id,
                        project: stored.project.clone(),
                    });
                    ids.push(stored.id);
                },
                Err(e) => {
                    // One bad row must not sink its siblings.
                    warn!("observation insert failed: {e}");
                },
            }
        }

        if ids.is_empty() {
            Ok(IngestOutcome::Skipped(SkipReason::SemanticDuplicate))
        } else {
            Ok(IngestOutcome::Stored { ids })
        }
    }

    /// Ingests one session turn as a summary (plus the raw user prompt).
    pub async fn process_summary(&self, turn: &SessionTurn) -> Result<IngestOutcome> {
        if !filters::has_meaningful_content(&turn.assistant_response) {
            return Ok(IngestOutcome::Skipped(SkipReason::NotMeaningful));
        }
        let hash = request_hash(
            "session_summary",
            &serde_json::json!({
                "session": turn.sdk_session_id,
                "prompt": turn.prompt_number,
            }),
            &turn.assistant_response,
        );
        if self.dedup.check_and_record(&hash) {
            return Ok(IngestOutcome::Skipped(SkipReason::DuplicateRequest));
        }

        let prompt = prompts::summary_prompt(&turn.user_prompt, &turn.assistant_response);
        let response = self.distill_guarded(&prompt).await?;

        let Some(parsed) = parser::parse_summary(&response) else {
            return Ok(IngestOutcome::Skipped(SkipReason::SummarySkipped));
        };
        if filters::is_meta_summary(&parsed.combined_text()) {
            debug!("self-referential summary suppressed");
            return Ok(IngestOutcome::Skipped(SkipReason::MetaSummary));
        }

        if let Err(e) = self.prompts.insert(&NewUserPrompt {
            project: turn.project.clone(),
            sdk_session_id: turn.sdk_session_id.clone(),
            prompt_number: turn.prompt_number,
            text: turn.user_prompt.clone(),
        }) {
            warn!("user prompt insert failed: {e}");
        }

        let stored = self.summaries.insert(&NewSessionSummary {
            project: turn.project.clone(),
            sdk_session_id: turn.sdk_session_id.clone(),
            prompt_number: turn.prompt_number,
            request: parsed.request,
            investigated: parsed.investigated,
            learned: parsed.learned,
            completed: parsed.completed,
            next_steps: parsed.next_steps,
            notes: parsed.notes,
        })?;

        self.sync.enqueue(SyncRequest {
            doc_type: DocType::SessionSummary,
            sqlite_id: stored.id,
            project: stored.project.clone(),
            created_at: stored.created_at,
            text: stored.embedding_text(),
        });
        self.events.publish(MemoryEvent {
            doc_type: DocType::SessionSummary,
            action: EventAction::Created,
            id: stored.id,
            project: stored.project.clone(),
        });

        Ok(IngestOutcome::Stored { ids: vec![stored.id] })
    }
}
