//! Target schema for AI-structured resumes and the validation every candidate
//! passes before it is persisted.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub const MAX_SKILLS: usize = 10;
pub const MAX_SUMMARY_CHARS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkExperience {
    pub company: String,
    pub title: String,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Education {
    pub institution: String,
    #[serde(default)]
    pub degree: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileLink {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredResume {
    pub summary: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub work_history: Vec<WorkExperience>,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub links: Vec<ProfileLink>,
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("candidate does not match the resume shape: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("candidate failed validation: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

impl StructuredResume {
    /// Parses and validates a generated candidate. Nothing partial survives: the
    /// candidate is either a complete valid resume or an error.
    pub fn from_candidate(candidate: Value) -> Result<Self, SchemaError> {
        let resume: StructuredResume = serde_json::from_value(candidate)?;
        resume.validate()?;
        Ok(resume)
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut problems = Vec::new();

        if self.summary.trim().is_empty() {
            problems.push("summary is empty".to_string());
        }
        if self.summary.chars().count() > MAX_SUMMARY_CHARS {
            problems.push(format!("summary exceeds {MAX_SUMMARY_CHARS} characters"));
        }

        if self.skills.len() > MAX_SKILLS {
            problems.push(format!(
                "{} skills listed, at most {MAX_SKILLS} allowed",
                self.skills.len()
            ));
        }
        if self.skills.iter().any(|s| s.trim().is_empty()) {
            problems.push("skills contain an empty entry".to_string());
        }

        for (i, job) in self.work_history.iter().enumerate() {
            if job.company.trim().is_empty() {
                problems.push(format!("work_history[{i}].company is empty"));
            }
            if job.title.trim().is_empty() {
                problems.push(format!("work_history[{i}].title is empty"));
            }
        }

        for (i, school) in self.education.iter().enumerate() {
            if school.institution.trim().is_empty() {
                problems.push(format!("education[{i}].institution is empty"));
            }
        }

        for (i, link) in self.links.iter().enumerate() {
            if link.label.trim().is_empty() {
                problems.push(format!("links[{i}].label is empty"));
            }
            if !(link.url.starts_with("https://") || link.url.starts_with("http://")) {
                problems.push(format!("links[{i}].url is not an http(s) url"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::Invalid(problems))
        }
    }

    /// The shape handed to the generator alongside the extracted text.
    pub fn target_schema() -> Value {
        json!({
            "type": "object",
            "required": ["summary", "skills", "work_history", "education", "links"],
            "properties": {
                "summary": { "type": "string", "maxLength": MAX_SUMMARY_CHARS },
                "skills": {
                    "type": "array",
                    "maxItems": MAX_SKILLS,
                    "items": { "type": "string" }
                },
                "work_history": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["company", "title"],
                        "properties": {
                            "company": { "type": "string" },
                            "title": { "type": "string" },
                            "start": { "type": ["string", "null"] },
                            "end": { "type": ["string", "null"] },
                            "location": { "type": ["string", "null"] },
                            "highlights": { "type": "array", "items": { "type": "string" } }
                        }
                    }
                },
                "education": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["institution"],
                        "properties": {
                            "institution": { "type": "string" },
                            "degree": { "type": ["string", "null"] },
                            "field": { "type": ["string", "null"] },
                            "start": { "type": ["string", "null"] },
                            "end": { "type": ["string", "null"] }
                        }
                    }
                },
                "links": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["label", "url"],
                        "properties": {
                            "label": { "type": "string" },
                            "url": { "type": "string" }
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
pub(crate) fn sample_candidate() -> Value {
    json!({
        "summary": "Backend engineer focused on distributed storage.",
        "skills": ["Rust", "Go", "PostgreSQL"],
        "work_history": [{
            "company": "Acme",
            "title": "Senior Engineer",
            "start": "2019-03",
            "end": null,
            "location": "Remote",
            "highlights": ["Cut p99 latency by 40%"]
        }],
        "education": [{
            "institution": "State University",
            "degree": "BSc",
            "field": "Computer Science",
            "start": "2011",
            "end": "2015"
        }],
        "links": [{ "label": "GitHub", "url": "https://github.com/janedoe" }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_candidate_parses() {
        let resume = StructuredResume::from_candidate(sample_candidate()).unwrap();
        assert_eq!(resume.skills.len(), 3);
        assert_eq!(resume.work_history[0].company, "Acme");
    }

    #[test]
    fn test_missing_summary_is_malformed() {
        let mut candidate = sample_candidate();
        candidate.as_object_mut().unwrap().remove("summary");
        let err = StructuredResume::from_candidate(candidate).unwrap_err();
        assert!(matches!(err, SchemaError::Malformed(_)));
    }

    #[test]
    fn test_more_than_ten_skills_rejected() {
        let mut candidate = sample_candidate();
        candidate["skills"] = json!((0..11).map(|i| format!("skill-{i}")).collect::<Vec<_>>());
        let err = StructuredResume::from_candidate(candidate).unwrap_err();
        assert!(err.to_string().contains("at most 10"));
    }

    #[test]
    fn test_exactly_ten_skills_allowed() {
        let mut candidate = sample_candidate();
        candidate["skills"] = json!((0..10).map(|i| format!("skill-{i}")).collect::<Vec<_>>());
        assert!(StructuredResume::from_candidate(candidate).is_ok());
    }

    #[test]
    fn test_blank_summary_rejected() {
        let mut candidate = sample_candidate();
        candidate["summary"] = json!("   ");
        assert!(matches!(
            StructuredResume::from_candidate(candidate),
            Err(SchemaError::Invalid(_))
        ));
    }

    #[test]
    fn test_non_http_link_rejected() {
        let mut candidate = sample_candidate();
        candidate["links"] = json!([{ "label": "Site", "url": "javascript:alert(1)" }]);
        let err = StructuredResume::from_candidate(candidate).unwrap_err();
        assert!(err.to_string().contains("links[0].url"));
    }

    #[test]
    fn test_all_problems_reported_together() {
        let mut candidate = sample_candidate();
        candidate["summary"] = json!("");
        candidate["work_history"] = json!([{ "company": "", "title": "" }]);
        match StructuredResume::from_candidate(candidate) {
            Err(SchemaError::Invalid(problems)) => assert_eq!(problems.len(), 3),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_optional_sections_default_to_empty() {
        let resume =
            StructuredResume::from_candidate(json!({ "summary": "Designer." })).unwrap();
        assert!(resume.skills.is_empty());
        assert!(resume.links.is_empty());
    }

    #[test]
    fn test_target_schema_caps_skills() {
        let schema = StructuredResume::target_schema();
        assert_eq!(schema["properties"]["skills"]["maxItems"], json!(MAX_SKILLS));
    }
}
