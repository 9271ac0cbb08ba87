//! Pre-distillation filters.
//!
//! Cheap checks that run before any LLM call: the deny-list of
//! uninteresting tools, the trivial-operation filter, the self-referential
//! summary filter, and the meaningful-content check for session turns.

/// Tools whose executions are never distilled.
pub const UNINTERESTING_TOOLS: &[&str] = &[
    "TodoWrite",
    "Task",
    "TaskOutput",
    "Glob",
    "ListDir",
    "LS",
    "KillShell",
    "AskUserQuestion",
    "EnterPlanMode",
    "ExitPlanMode",
    "Skill",
    "SlashCommand",
];

/// Minimum output length worth distilling.
const MIN_OUTPUT_LEN: usize = 50;

/// Grep output with more newlines than this is noise, not signal.
const MAX_GREP_NEWLINES: usize = 50;

/// Substrings marking an uninformative result.
const TRIVIAL_MARKERS: &[&str] = &["no matches", "not found", "permission denied"];

/// Read targets that never produce memorable content.
const BORING_READ_FILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
    ".gitignore",
    ".npmignore",
    ".dockerignore",
];

/// Read-only status commands: running them teaches nothing durable.
const READONLY_BASH_PREFIXES: &[&str] = &[
    "git status",
    "ls",
    "pwd",
    "echo",
    "cat",
    "which",
    "type",
    "npm list",
    "npm outdated",
    "npm audit",
];

/// Returns true if the tool is on the deny-list.
#[must_use]
pub fn is_uninteresting_tool(tool_name: &str) -> bool {
    UNINTERESTING_TOOLS.contains(&tool_name)
}

/// Returns true if the execution is too trivial to distill.
#[must_use]
pub fn is_trivial_operation(tool_name: &str, input: &serde_json::Value, output: &str) -> bool {
    if output.len() < MIN_OUTPUT_LEN {
        return true;
    }
    let lowered = output.to_lowercase();
    if TRIVIAL_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return true;
    }
    let trimmed = output.trim();
    if trimmed == "[]" || trimmed == "{}" {
        return true;
    }

    match tool_name {
        "Read" => {
            let path = input
                .get("file_path")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            let basename = path.rsplit('/').next().unwrap_or(path);
            BORING_READ_FILES.contains(&basename)
                || (basename.starts_with("tsconfig") && basename.ends_with(".json"))
        },
        "Grep" => output.matches('\n').count() > MAX_GREP_NEWLINES,
        "Bash" => {
            let command = input
                .get("command")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .trim();
            READONLY_BASH_PREFIXES.iter().any(|prefix| {
                command == *prefix
                    || command
                        .strip_prefix(prefix)
                        .is_some_and(|rest| rest.starts_with([' ', '\t']))
            })
        },
        _ => false,
    }
}

/// Phrases a summary about the memory system itself tends to contain.
///
/// Non-exhaustive by design; two or more hits reject the summary.
pub const META_PHRASES: &[&str] = &[
    "memory extraction",
    "memory agent",
    "session initialization",
    "waiting for the user",
    "progress checkpoint",
    "no work has been completed",
    "awaiting tool",
    "awaiting actual",
    "extract meaningful observations",
    "empty session",
    "just beginning",
];

/// Returns true if the summary text talks about the memory system rather
/// than the session it should describe.
#[must_use]
pub fn is_meta_summary(combined: &str) -> bool {
    let lowered = combined.to_lowercase();
    META_PHRASES
        .iter()
        .filter(|phrase| lowered.contains(*phrase))
        .count()
        >= 2
}

const WORK_EXTENSIONS: &[&str] = &[".go", ".ts", ".js", ".py", ".md", ".json", ".yaml", ".yml"];

const WORK_VERBS: &[&str] = &[
    "edited",
    "modified",
    "created",
    "deleted",
    "updated",
    "changed",
    "added",
    "removed",
    "fixed",
    "implemented",
    "refactored",
];

const CODE_MARKERS: &[&str] = &[
    "```", "lines ", "function ", "const ", "var ", "let ", "type ", "struct ", "class ", "def ",
    "func ",
];

/// Minimum response length for a turn to be summarizable.
const MIN_MEANINGFUL_LEN: usize = 200;

/// Returns true if an assistant response describes real work.
///
/// Three gates: length after trim, at most one skip indicator, and at
/// least two distinct work indicators (file extensions, action verbs, or
/// code markers).
#[must_use]
pub fn has_meaningful_content(response: &str) -> bool {
    let trimmed = response.trim();
    if trimmed.len() < MIN_MEANINGFUL_LEN {
        return false;
    }
    let lowered = trimmed.to_lowercase();

    let skip_hits = META_PHRASES
        .iter()
        .filter(|phrase| lowered.contains(*phrase))
        .count();
    if skip_hits >= 2 {
        return false;
    }

    let work_hits = WORK_EXTENSIONS
        .iter()
        .chain(WORK_VERBS)
        .chain(CODE_MARKERS)
        .filter(|indicator| lowered.contains(*indicator))
        .count();
    work_hits >= 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("TodoWrite", true; "todo write denied")]
    #[test_case("Glob", true; "glob denied")]
    #[test_case("SlashCommand", true; "slash command denied")]
    #[test_case("Edit", false; "edit allowed")]
    #[test_case("Bash", false; "bash allowed")]
    fn test_deny_list(tool: &str, expected: bool) {
        assert_eq!(is_uninteresting_tool(tool), expected);
    }

    #[test]
    fn test_short_output_is_trivial() {
        assert!(is_trivial_operation("Edit", &serde_json::json!({}), "ok"));
    }

    #[test]
    fn test_marker_output_is_trivial() {
        let output = "Search completed across the repository tree: no matches were located.";
        assert!(is_trivial_operation("Grep", &serde_json::json!({}), output));
    }

    #[test]
    fn test_git_status_is_trivial() {
        let input = serde_json::json!({"command": "git status"});
        let output = "On branch main\nnothing to commit, working tree clean. Everything is fine.";
        assert!(is_trivial_operation("Bash", &input, output));
    }

    #[test]
    fn test_git_stash_is_not_a_status_prefix_match() {
        // "git status" must match as a word prefix, not a substring of
        // another subcommand.
        let input = serde_json::json!({"command": "git statusx --weird"});
        let output = "x".repeat(60);
        assert!(!is_trivial_operation("Bash", &input, &output));
    }

    #[test]
    fn test_lockfile_read_is_trivial() {
        let input = serde_json::json!({"file_path": "/repo/package-lock.json"});
        let output = "{\n  \"name\": \"demo\",\n  \"lockfileVersion\": 3, ...plenty of bytes here...\n}";
        assert!(is_trivial_operation("Read", &input, output));

        let tsconfig = serde_json::json!({"file_path": "/repo/tsconfig.build.json"});
        assert!(is_trivial_operation("Read", &tsconfig, output));
    }

    #[test]
    fn test_noisy_grep_is_trivial() {
        let output = "hit\n".repeat(60);
        assert!(is_trivial_operation("Grep", &serde_json::json!({}), &output));
    }

    #[test]
    fn test_substantive_edit_passes() {
        let output = "Replaced the token validation branch; unsigned algorithms now rejected.";
        assert!(!is_trivial_operation("Edit", &serde_json::json!({}), output));
    }

    #[test]
    fn test_meta_summary_needs_two_phrases() {
        assert!(is_meta_summary(
            "This is the memory extraction agent, awaiting actual work."
        ));
        assert!(!is_meta_summary("We fixed the memory leak in the agent pool."));
    }

    #[test]
    fn test_meaningful_content_gates() {
        // Too short.
        assert!(!has_meaningful_content("Fixed auth.js"));

        // Long but no work indicators.
        let vague = "The situation was considered at length and the outlook remains \
                     broadly positive for everyone involved in this effort overall. "
            .repeat(4);
        assert!(!has_meaningful_content(&vague));

        // Long with file extension + verb.
        let real = format!(
            "{} I edited src/auth.ts to reject unsigned tokens and added a regression \
             test covering the alg:none case in the token validation module.",
            "Context on the session follows. ".repeat(6)
        );
        assert!(has_meaningful_content(&real));
    }
}
