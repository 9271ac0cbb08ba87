//! End-to-end ingestion pipeline scenarios.

mod common;

use common::{ScriptedDistiller, worker_fixture};
use engram::models::EventAction;
use engram::storage::{ObservationStore, SummaryStore};
use engram::vector::VectorClient;
use engram::worker::{
    BreakerConfig, IngestOutcome, SessionTurn, SkipReason, ToolExecution, WorkerConfig,
};
use std::path::PathBuf;
use std::time::Duration;

fn exec(tool: &str, input: serde_json::Value, output: &str) -> ToolExecution {
    ToolExecution {
        tool_name: tool.to_string(),
        input,
        output: output.to_string(),
        project: "demo".to_string(),
        sdk_session_id: "sess-1".to_string(),
        prompt_number: 1,
        cwd: PathBuf::from("/tmp"),
    }
}

const BUGFIX_RESPONSE: &str = r"<observation>
  <type>bugfix</type>
  <title>Fix JWT alg:none</title>
  <narrative>Tokens signed with alg:none were accepted by the validator.</narrative>
  <facts><fact>alg:none now rejected</fact></facts>
  <concepts><concept>Security</concept><concept>gotcha</concept><concept>bogus-tag</concept></concepts>
  <files_modified><file>src/auth.rs</file></files_modified>
</observation>";

#[tokio::test]
async fn trivial_bash_is_skipped_without_llm() {
    let distiller = ScriptedDistiller::returning(BUGFIX_RESPONSE);
    let fixture = worker_fixture(distiller.clone(), WorkerConfig::default());
    let mut events = fixture.events.subscribe();

    let execution = exec(
        "Bash",
        serde_json::json!({ "command": "git status" }),
        "On branch main\nnothing to commit, working tree clean",
    );
    let outcome = fixture.worker.process_tool_execution(&execution).await.unwrap();

    assert!(matches!(
        outcome,
        IngestOutcome::Skipped(SkipReason::TrivialOperation)
    ));
    assert_eq!(distiller.call_count(), 0);
    assert_eq!(ObservationStore::count(fixture.store.as_ref(), None).unwrap(), 0);
    assert!(events.try_recv().is_err(), "no broadcast for skipped work");
}

#[tokio::test]
async fn deny_listed_tool_is_dropped_silently() {
    let distiller = ScriptedDistiller::returning(BUGFIX_RESPONSE);
    let fixture = worker_fixture(distiller.clone(), WorkerConfig::default());

    let execution = exec(
        "TodoWrite",
        serde_json::json!({}),
        &"long enough output that the trivial filter alone would pass it".repeat(3),
    );
    let outcome = fixture.worker.process_tool_execution(&execution).await.unwrap();
    assert!(matches!(
        outcome,
        IngestOutcome::Skipped(SkipReason::UninterestingTool)
    ));
    assert_eq!(distiller.call_count(), 0);
}

#[tokio::test]
async fn happy_path_observation_is_stored_synced_and_broadcast() {
    let distiller = ScriptedDistiller::returning(BUGFIX_RESPONSE);
    let fixture = worker_fixture(distiller.clone(), WorkerConfig::default());
    let mut events = fixture.events.subscribe();

    let execution = exec(
        "Edit",
        serde_json::json!({ "file_path": "src/auth.rs" }),
        "Replaced the signature check; unsigned algorithms are now rejected outright.",
    );
    let outcome = fixture.worker.process_tool_execution(&execution).await.unwrap();

    let IngestOutcome::Stored { ids } = outcome else {
        panic!("expected a stored observation");
    };
    assert_eq!(ids.len(), 1);
    assert_eq!(distiller.call_count(), 1);

    let stored = ObservationStore::get_by_id(fixture.store.as_ref(), ids[0])
        .unwrap()
        .unwrap();
    assert_eq!(stored.title, "Fix JWT alg:none");
    // Concepts normalized: lowercased, unknown tags dropped.
    assert_eq!(stored.concepts, vec!["security", "gotcha"]);
    assert_eq!(stored.files_modified, vec!["src/auth.rs"]);
    assert_eq!(stored.project, "demo");

    let event = events.recv().await.unwrap();
    assert_eq!(event.action, EventAction::Created);
    assert_eq!(event.id, ids[0]);
    assert_eq!(event.project, "demo");

    // The vector upsert drains through the pool.
    let common::WorkerFixture { pool, worker, vector, .. } = fixture;
    drop(worker);
    pool.shutdown().await;
    assert_eq!(vector.count().await.unwrap(), 1);
}

#[tokio::test]
async fn duplicate_request_within_ttl_never_reaches_the_llm() {
    let distiller = ScriptedDistiller::returning(BUGFIX_RESPONSE);
    let fixture = worker_fixture(distiller.clone(), WorkerConfig::default());

    let execution = exec(
        "Edit",
        serde_json::json!({ "file_path": "src/auth.rs" }),
        "Replaced the signature check; unsigned algorithms are now rejected outright.",
    );
    let first = fixture.worker.process_tool_execution(&execution).await.unwrap();
    assert!(matches!(first, IngestOutcome::Stored { .. }));

    let second = fixture.worker.process_tool_execution(&execution).await.unwrap();
    assert!(matches!(
        second,
        IngestOutcome::Skipped(SkipReason::DuplicateRequest)
    ));
    assert_eq!(distiller.call_count(), 1, "one distillation for two identical calls");
}

#[tokio::test]
async fn semantic_duplicate_is_dropped_after_parse() {
    let distiller = ScriptedDistiller::returning(BUGFIX_RESPONSE);
    let fixture = worker_fixture(distiller.clone(), WorkerConfig::default());

    let first = exec(
        "Edit",
        serde_json::json!({ "file_path": "src/auth.rs" }),
        "Replaced the signature check; unsigned algorithms are now rejected outright.",
    );
    fixture.worker.process_tool_execution(&first).await.unwrap();

    // Different request hash, same distilled content.
    let second = exec(
        "Edit",
        serde_json::json!({ "file_path": "src/auth.rs", "attempt": 2 }),
        "Adjusted the same validator branch again with an equivalent change applied.",
    );
    let outcome = fixture.worker.process_tool_execution(&second).await.unwrap();
    assert!(matches!(
        outcome,
        IngestOutcome::Skipped(SkipReason::SemanticDuplicate)
    ));
    assert_eq!(ObservationStore::count(fixture.store.as_ref(), None).unwrap(), 1);
}

#[tokio::test]
async fn breaker_opens_and_sheds_work() {
    let distiller = ScriptedDistiller::failing();
    let config = WorkerConfig {
        breaker: BreakerConfig {
            failure_threshold: 2,
            reset_timeout: Duration::from_secs(60),
            failure_window: Duration::from_secs(60),
        },
        ..WorkerConfig::default()
    };
    let fixture = worker_fixture(distiller.clone(), config);

    for attempt in 0..2 {
        let execution = exec(
            "Edit",
            serde_json::json!({ "attempt": attempt }),
            "A substantive output line that clears the trivial-operation threshold easily.",
        );
        let err = fixture.worker.process_tool_execution(&execution).await.unwrap_err();
        assert!(err.is_transient());
    }
    assert_eq!(distiller.call_count(), 2);

    // Breaker is now open: the call is rejected before the distiller.
    let execution = exec(
        "Edit",
        serde_json::json!({ "attempt": 99 }),
        "A substantive output line that clears the trivial-operation threshold easily.",
    );
    let err = fixture.worker.process_tool_execution(&execution).await.unwrap_err();
    assert!(err.to_string().contains("circuit breaker open"));
    assert_eq!(distiller.call_count(), 2);
}

#[tokio::test]
async fn self_referential_summary_is_suppressed() {
    let meta_summary = r"<summary>
        <request>memory extraction agent setup</request>
        <investigated></investigated>
        <learned></learned>
        <completed>awaiting actual work from the session</completed>
        <next_steps></next_steps>
        <notes></notes>
    </summary>";
    let distiller = ScriptedDistiller::returning(meta_summary);
    let fixture = worker_fixture(distiller.clone(), WorkerConfig::default());

    let turn = SessionTurn {
        project: "demo".to_string(),
        sdk_session_id: "sess-1".to_string(),
        prompt_number: 1,
        user_prompt: "fix the login bug".to_string(),
        assistant_response: format!(
            "{} I edited src/auth.ts and fixed the token validation branch, then added \
             a regression test for the alg:none case.",
            "Session context follows. ".repeat(10)
        ),
    };
    let outcome = fixture.worker.process_summary(&turn).await.unwrap();
    assert!(matches!(
        outcome,
        IngestOutcome::Skipped(SkipReason::MetaSummary)
    ));
    assert_eq!(SummaryStore::count(fixture.store.as_ref(), None).unwrap(), 0);
}

#[tokio::test]
async fn vague_turn_skips_summary_before_the_llm() {
    let distiller = ScriptedDistiller::returning("<summary><request>x</request></summary>");
    let fixture = worker_fixture(distiller.clone(), WorkerConfig::default());

    let turn = SessionTurn {
        project: "demo".to_string(),
        sdk_session_id: "sess-1".to_string(),
        prompt_number: 1,
        user_prompt: "hello".to_string(),
        assistant_response: "Hi! What should we work on?".to_string(),
    };
    let outcome = fixture.worker.process_summary(&turn).await.unwrap();
    assert!(matches!(
        outcome,
        IngestOutcome::Skipped(SkipReason::NotMeaningful)
    ));
    assert_eq!(distiller.call_count(), 0);
}

#[tokio::test]
async fn meaningful_summary_is_stored() {
    let summary = r"<summary>
        <request>fix the login bug</request>
        <investigated>token validation paths</investigated>
        <learned>alg:none tokens were accepted</learned>
        <completed>patched validator and added tests</completed>
        <next_steps>audit the refresh flow</next_steps>
        <notes></notes>
    </summary>";
    let distiller = ScriptedDistiller::returning(summary);
    let fixture = worker_fixture(distiller, WorkerConfig::default());

    let turn = SessionTurn {
        project: "demo".to_string(),
        sdk_session_id: "sess-1".to_string(),
        prompt_number: 2,
        user_prompt: "fix the login bug".to_string(),
        assistant_response: format!(
            "{} I edited src/auth.ts to reject unsigned tokens and updated the refresh \
             handler, then implemented regression tests in auth_test.ts.",
            "Detailed narration of the work done in this session. ".repeat(5)
        ),
    };
    let outcome = fixture.worker.process_summary(&turn).await.unwrap();
    let IngestOutcome::Stored { ids } = outcome else {
        panic!("expected a stored summary");
    };
    let stored = SummaryStore::get_by_id(fixture.store.as_ref(), ids[0])
        .unwrap()
        .unwrap();
    assert_eq!(stored.request, "fix the login bug");
    assert_eq!(stored.next_steps, "audit the refresh flow");
    // The raw user prompt is retained alongside the summary.
    assert_eq!(
        engram::storage::PromptStore::count(fixture.store.as_ref(), None).unwrap(),
        1
    );
}
