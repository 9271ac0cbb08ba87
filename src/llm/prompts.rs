//! Prompt assembly for the distiller.

/// System prompt prepended to every distillation call.
pub const SYSTEM_PROMPT: &str = "\
You distill coding-session activity into durable memories for a coding \
assistant. Be concrete and terse. Only record things worth remembering \
weeks later: decisions, fixes, discoveries, gotchas. Never record routine \
file reads, directory listings, or status checks.";

const OBSERVATION_INSTRUCTIONS: &str = "\
Respond with zero or more <observation> blocks, or a single \
<skip reason=\"...\"/> if nothing is worth keeping:

<observation>
  <type>bugfix|feature|refactor|change|discovery|decision</type>
  <title>one line</title>
  <subtitle>optional elaboration</subtitle>
  <narrative>what happened and why it matters</narrative>
  <facts><fact>discrete fact</fact></facts>
  <concepts><concept>tag</concept></concepts>
  <files_read><file>path</file></files_read>
  <files_modified><file>path</file></files_modified>
</observation>";

const SUMMARY_INSTRUCTIONS: &str = "\
Respond with a single <summary> block, or <skip_summary reason=\"...\"/> \
if the turn contains no real work:

<summary>
  <request>what the user asked</request>
  <investigated>what was examined</investigated>
  <learned>what was learned</learned>
  <completed>what was finished</completed>
  <next_steps>what remains</next_steps>
  <notes>anything else</notes>
</summary>";

/// Builds the distillation prompt for one tool execution.
#[must_use]
pub fn observation_prompt(tool_name: &str, input: &serde_json::Value, output: &str) -> String {
    format!(
        "{SYSTEM_PROMPT}\n\n{OBSERVATION_INSTRUCTIONS}\n\n\
         Tool: {tool_name}\nInput:\n{input}\nOutput:\n{output}\n"
    )
}

/// Builds the distillation prompt for one session turn.
#[must_use]
pub fn summary_prompt(user_prompt: &str, assistant_response: &str) -> String {
    format!(
        "{SYSTEM_PROMPT}\n\n{SUMMARY_INSTRUCTIONS}\n\n\
         User request:\n{user_prompt}\n\nAssistant response:\n{assistant_response}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_prompt_carries_tool_context() {
        let prompt = observation_prompt(
            "Edit",
            &serde_json::json!({"file_path": "src/auth.rs"}),
            "patched token check",
        );
        assert!(prompt.contains("Tool: Edit"));
        assert!(prompt.contains("src/auth.rs"));
        assert!(prompt.contains("<observation>"));
    }
}
