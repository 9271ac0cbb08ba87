//! Tolerant extraction of the distiller's XML-ish output.
//!
//! The grammar is brittle by nature, so extraction is per-field regex with
//! whitespace trimming; unknown fields and any text outside the known
//! blocks are ignored. A real XML parser would reject half of what models
//! actually emit.

use crate::models::{ObservationType, normalize_concepts};
use once_cell::sync::Lazy;
use regex::Regex;

static OBSERVATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<observation>(.*?)</observation>").expect("static regex"));
static SUMMARY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<summary>(.*?)</summary>").expect("static regex"));
static SKIP_SUMMARY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<skip_summary\b[^>]*/?>"#).expect("static regex"));
static FACT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<fact>(.*?)</fact>").expect("static regex"));
static CONCEPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<concept>(.*?)</concept>").expect("static regex"));
static FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<file>(.*?)</file>").expect("static regex"));
static FILES_READ_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<files_read>(.*?)</files_read>").expect("static regex"));
static FILES_MODIFIED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<files_modified>(.*?)</files_modified>").expect("static regex"));
static FACTS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<facts>(.*?)</facts>").expect("static regex"));
static CONCEPTS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<concepts>(.*?)</concepts>").expect("static regex"));

/// Extracts the trimmed text of `<tag>…</tag>` from a block.
fn field(block: &str, tag: &str) -> String {
    // Per-call compile is fine here: tags are short and blocks are small,
    // and it keeps the tag list in one place at the call sites.
    Regex::new(&format!("(?s)<{tag}>(.*?)</{tag}>"))
        .ok()
        .and_then(|re| re.captures(block))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

fn list(block: &str, outer: &Lazy<Regex>, inner: &Lazy<Regex>) -> Vec<String> {
    let Some(captures) = outer.captures(block) else {
        return Vec::new();
    };
    let Some(body) = captures.get(1) else {
        return Vec::new();
    };
    inner
        .captures_iter(body.as_str())
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// One observation extracted from distiller output.
#[derive(Debug, Clone)]
pub struct ParsedObservation {
    /// Normalized observation type; unknown strings become `Change`.
    pub obs_type: ObservationType,
    /// Headline. Never empty: blocks without a title are dropped.
    pub title: String,
    /// Optional elaboration.
    pub subtitle: String,
    /// Prose account.
    pub narrative: String,
    /// Discrete facts, in document order.
    pub facts: Vec<String>,
    /// Concept tags, normalized against the closed vocabulary.
    pub concepts: Vec<String>,
    /// Paths the execution read.
    pub files_read: Vec<String>,
    /// Paths the execution modified.
    pub files_modified: Vec<String>,
}

/// Extracts all `<observation>` blocks from distiller output.
///
/// A top-level `<skip …/>` element (or simply no blocks) yields an empty
/// vector. Blocks missing a title are dropped.
#[must_use]
pub fn parse_observations(text: &str) -> Vec<ParsedObservation> {
    OBSERVATION_RE
        .captures_iter(text)
        .filter_map(|captures| {
            let block = captures.get(1)?.as_str();
            let title = field(block, "title");
            if title.is_empty() {
                return None;
            }
            Some(ParsedObservation {
                obs_type: ObservationType::parse(&field(block, "type")),
                title,
                subtitle: field(block, "subtitle"),
                narrative: field(block, "narrative"),
                facts: list(block, &FACTS_RE, &FACT_RE),
                concepts: normalize_concepts(list(block, &CONCEPTS_RE, &CONCEPT_RE)),
                files_read: list(block, &FILES_READ_RE, &FILE_RE),
                files_modified: list(block, &FILES_MODIFIED_RE, &FILE_RE),
            })
        })
        .collect()
}

/// One session summary extracted from distiller output.
#[derive(Debug, Clone, Default)]
pub struct ParsedSummary {
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

impl ParsedSummary {
    /// All fields joined, for the self-reference filter.
    #[must_use]
    pub fn combined_text(&self) -> String {
        [
            self.request.as_str(),
            self.investigated.as_str(),
            self.learned.as_str(),
            self.completed.as_str(),
            self.next_steps.as_str(),
            self.notes.as_str(),
        ]
        .join("\n")
    }
}

/// Extracts the `<summary>` block, if any.
///
/// `<skip_summary …/>` suppresses generation and returns `None`.
#[must_use]
pub fn parse_summary(text: &str) -> Option<ParsedSummary> {
    if SKIP_SUMMARY_RE.is_match(text) {
        return None;
    }
    let captures = SUMMARY_RE.captures(text)?;
    let block = captures.get(1)?.as_str();
    Some(ParsedSummary {
        request: field(block, "request"),
        investigated: field(block, "investigated"),
        learned: field(block, "learned"),
        completed: field(block, "completed"),
        next_steps: field(block, "next_steps"),
        notes: field(block, "notes"),
    })
}
