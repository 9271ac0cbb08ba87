//! Distillation LLM invocation.
//!
//! The distiller is an external CLI subprocess: the worker hands it a
//! prompt on stdin and parses the XML-ish blocks it prints to stdout. Only
//! the invocation contract lives here; parsing is in
//! [`crate::worker::parser`].
//!
//! # Invocation contract
//!
//! - Hard 60-second deadline; the subprocess is killed on expiry.
//! - Prompts are sanitized (control characters stripped except `\n \t \r`)
//!   and rejected above 100 KiB.
//! - The subprocess runs in a neutral working directory with
//!   `ENGRAM_DISABLE_HOOKS=1` set so its own hook handlers cannot re-enter
//!   this system.
//! - The model string is opaque and passed through untouched.

pub mod prompts;

use crate::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Hard deadline for one distillation call.
pub const SUBPROCESS_DEADLINE: Duration = Duration::from_secs(60);

/// Maximum prompt size in bytes (100 KiB).
pub const MAX_PROMPT_BYTES: usize = 100 * 1024;

/// Environment flag that tells a nested assistant process to skip its own
/// hook handlers.
pub const DISABLE_HOOKS_ENV: &str = "ENGRAM_DISABLE_HOOKS";

/// Interface to the distillation model.
#[async_trait]
pub trait Distiller: Send + Sync {
    /// Runs one distillation call and returns raw stdout.
    async fn distill(&self, prompt: &str) -> Result<String>;

    /// Model identifier handed to the subprocess. Opaque.
    fn model(&self) -> &str;
}

/// Strips control characters from a prompt, keeping `\n`, `\t`, and `\r`.
#[must_use]
pub fn sanitize_prompt(prompt: &str) -> String {
    prompt
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t' | '\r'))
        .collect()
}

/// Distiller that shells out to an assistant CLI binary.
pub struct SubprocessDistiller {
    binary: PathBuf,
    model: String,
    deadline: Duration,
    workdir: PathBuf,
}

impl SubprocessDistiller {
    /// Creates a distiller for the given binary and model alias.
    ///
    /// The subprocess working directory defaults to the system temp dir, a
    /// neutral location with no project hooks attached.
    #[must_use]
    pub fn new(binary: PathBuf, model: impl Into<String>) -> Self {
        Self {
            binary,
            model: model.into(),
            deadline: SUBPROCESS_DEADLINE,
            workdir: std::env::temp_dir(),
        }
    }

    /// Overrides the call deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

#[async_trait]
impl Distiller for SubprocessDistiller {
    async fn distill(&self, prompt: &str) -> Result<String> {
        let sanitized = sanitize_prompt(prompt);
        if sanitized.len() > MAX_PROMPT_BYTES {
            return Err(Error::BadRequest(format!(
                "prompt is {} bytes, limit is {MAX_PROMPT_BYTES}",
                sanitized.len()
            )));
        }

        let mut child = tokio::process::Command::new(&self.binary)
            .arg("--print")
            .arg("--model")
            .arg(&self.model)
            .current_dir(&self.workdir)
            .env(DISABLE_HOOKS_ENV, "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::transient("distill_spawn", e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(sanitized.as_bytes())
                .await
                .map_err(|e| Error::transient("distill_stdin", e))?;
            drop(stdin);
        }

        let output = tokio::time::timeout(self.deadline, child.wait_with_output())
            .await
            .map_err(|_| Error::transient("distill", "deadline exceeded"))?
            .map_err(|e| Error::transient("distill", e))?;

        if !output.status.success() {
            return Err(Error::transient(
                "distill",
                format!("subprocess exited with {}", output.status),
            ));
        }
        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(bytes = text.len(), "distiller returned");
        Ok(text)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
