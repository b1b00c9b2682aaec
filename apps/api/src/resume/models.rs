use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::resume::schema::StructuredResume;

/// Ingestion stage of a resume document.
///
/// ```text
/// EMPTY --upload--> UPLOADED --extract--> EXTRACTED --structure--> STRUCTURED
///                   any --content rejected--> REJECTED --re-upload--> UPLOADED
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    #[default]
    Empty,
    Uploaded,
    Extracted,
    Structured,
    Rejected,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Empty => "EMPTY",
            Stage::Uploaded => "UPLOADED",
            Stage::Extracted => "EXTRACTED",
            Stage::Structured => "STRUCTURED",
            Stage::Rejected => "REJECTED",
        }
    }
}

/// One per uid, latest wins. The portfolio view renders from this document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeDocument {
    pub uid: String,
    pub source_file_url: Option<String>,
    pub extracted_text: Option<String>,
    pub structured_data: Option<StructuredResume>,
    pub stage: Stage,
    pub updated_at: DateTime<Utc>,
}

impl ResumeDocument {
    pub fn empty(uid: &str) -> Self {
        Self {
            uid: uid.to_string(),
            source_file_url: None,
            extracted_text: None,
            structured_data: None,
            stage: Stage::Empty,
            updated_at: Utc::now(),
        }
    }

    pub fn is_published(&self) -> bool {
        self.stage == Stage::Structured && self.structured_data.is_some()
    }
}

/// Partial update merged into a document. `None` leaves a field untouched;
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResumePatch {
    pub source_file_url: Option<Option<String>>,
    pub extracted_text: Option<Option<String>>,
    pub structured_data: Option<Option<StructuredResume>>,
    pub stage: Option<Stage>,
}

impl ResumePatch {
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn source_file_url(mut self, url: Option<String>) -> Self {
        self.source_file_url = Some(url);
        self
    }

    pub fn extracted_text(mut self, text: Option<String>) -> Self {
        self.extracted_text = Some(text);
        self
    }

    pub fn structured_data(mut self, data: Option<StructuredResume>) -> Self {
        self.structured_data = Some(data);
        self
    }

    pub fn apply(self, doc: &mut ResumeDocument) {
        if let Some(url) = self.source_file_url {
            doc.source_file_url = url;
        }
        if let Some(text) = self.extracted_text {
            doc.extracted_text = text;
        }
        if let Some(data) = self.structured_data {
            doc.structured_data = data;
        }
        if let Some(stage) = self.stage {
            doc.stage = stage;
        }
    }
}
