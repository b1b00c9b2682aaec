// Cross-cutting prompt fragments. Each caller keeps its own prompts.rs alongside it.

/// Appended to system prompts whose answer is parsed as JSON.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Joins a task-specific system prompt with the JSON-only rule.
pub fn json_system(task: &str) -> String {
    format!("{task} {JSON_ONLY_SYSTEM}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_system_appends_rule() {
        let system = json_system("You extract resumes.");
        assert!(system.starts_with("You extract resumes."));
        assert!(system.ends_with(JSON_ONLY_SYSTEM));
    }
}
