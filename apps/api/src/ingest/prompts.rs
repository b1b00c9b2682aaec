// Resume structuring prompt templates.

pub const STRUCTURE_SYSTEM: &str = "\
You are a precise resume data extractor. \
Convert the text of a resume into structured JSON that matches the given schema. \
Only use facts present in the text. Never invent employers, dates, degrees or links.";

pub const STRUCTURE_PROMPT: &str = r#"Structure the following resume text.

TARGET SCHEMA (JSON Schema):
{schema}

RESUME TEXT:
{raw_text}

RULES:
1. "summary" is 2-4 sentences in the third person, drawn from the text.
2. "skills" lists at most 10 of the most prominent skills, most relevant first.
3. "work_history" is ordered most recent first; use null for unknown dates.
4. Dates are "YYYY-MM" when the month is known, otherwise "YYYY".
5. "links" only contains absolute http(s) urls that appear in the text.
6. Return ONLY the JSON object, nothing else and no code fences."#;

pub fn build_structure_prompt(raw_text: &str, schema: &serde_json::Value) -> String {
    let schema = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    STRUCTURE_PROMPT
        .replace("{schema}", &schema)
        .replace("{raw_text}", raw_text)
}
