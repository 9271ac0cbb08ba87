//! Session summaries and raw user prompts.

use serde::{Deserialize, Serialize};

/// One-per-prompt digest of a session turn.
///
/// Created by the distillation worker; read-only thereafter except for
/// deletion by maintenance or bulk tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Monotonic 64-bit row id.
    pub id: i64,
    /// Project the summary belongs to.
    pub project: String,
    /// SDK session the summary came from.
    pub sdk_session_id: String,
    /// 1-based prompt index within the session.
    pub prompt_number: i64,
    /// What the user asked for.
    pub request: String,
    /// What was investigated.
    pub investigated: String,
    /// What was learned.
    pub learned: String,
    /// What was completed.
    pub completed: String,
    /// Suggested next steps.
    pub next_steps: String,
    /// Free-form notes.
    pub notes: String,
    /// Creation timestamp (epoch ms).
    pub created_at: i64,
}

impl SessionSummary {
    /// Text used for vector-index sync.
    #[must_use]
    pub fn embedding_text(&self) -> String {
        [
            self.request.as_str(),
            self.investigated.as_str(),
            self.learned.as_str(),
            self.completed.as_str(),
            self.next_steps.as_str(),
            self.notes.as_str(),
        ]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
    }
}

/// Fields of a session summary supplied at insert time.
#[derive(Debug, Clone, Default)]
pub struct NewSessionSummary {
    /// Project the summary belongs to.
    pub project: String,
    /// SDK session the summary came from.
    pub sdk_session_id: String,
    /// 1-based prompt index within the session.
    pub prompt_number: i64,
    /// What the user asked for.
    pub request: String,
    /// What was investigated.
    pub investigated: String,
    /// What was learned.
    pub learned: String,
    /// What was completed.
    pub completed: String,
    /// Suggested next steps.
    pub next_steps: String,
    /// Free-form notes.
    pub notes: String,
}

/// A raw user message attached to a session.
///
/// Pruned by the maintenance pass after 30 days.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPrompt {
    /// Monotonic 64-bit row id.
    pub id: i64,
    /// Project the prompt belongs to.
    pub project: String,
    /// SDK session the prompt came from.
    pub sdk_session_id: String,
    /// 1-based prompt index within the session.
    pub prompt_number: i64,
    /// The verbatim user message.
    pub text: String,
    /// Creation timestamp (epoch ms).
    pub created_at: i64,
}

/// Fields of a user prompt supplied at insert time.
#[derive(Debug, Clone, Default)]
pub struct NewUserPrompt {
    /// Project the prompt belongs to.
    pub project: String,
    /// SDK session the prompt came from.
    pub sdk_session_id: String,
    /// 1-based prompt index within the session.
    pub prompt_number: i64,
    /// The verbatim user message.
    pub text: String,
}
