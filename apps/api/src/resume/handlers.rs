use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::CallerUid;
use crate::errors::AppError;
use crate::ingest::StepOutcome;
use crate::resume::models::{ResumeDocument, Stage};
use crate::resume::schema::StructuredResume;
use crate::state::AppState;

/// What the owner sees of their resume. Extracted text stays server-side.
#[derive(Debug, Serialize)]
pub struct ResumeView {
    pub stage: Stage,
    pub source_file_url: Option<String>,
    pub structured_data: Option<StructuredResume>,
    pub updated_at: DateTime<Utc>,
    /// The last upload was discarded; the client should ask for a new file.
    pub needs_reupload: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl ResumeView {
    fn new(doc: ResumeDocument, needs_reupload: bool, notice: Option<String>) -> Self {
        Self {
            needs_reupload,
            stage: doc.stage,
            source_file_url: doc.source_file_url,
            structured_data: doc.structured_data,
            updated_at: doc.updated_at,
            notice,
        }
    }
}

#[derive(Deserialize)]
pub struct UploadRequest {
    pub source_file_url: String,
}

/// POST /api/v1/resume/upload
///
/// The file itself goes straight to object storage; this records its location.
pub async fn handle_upload(
    State(state): State<AppState>,
    CallerUid(uid): CallerUid,
    Json(req): Json<UploadRequest>,
) -> Result<(StatusCode, Json<ResumeView>), AppError> {
    let doc = state.pipeline.upload(&uid, &req.source_file_url).await?;
    Ok((StatusCode::ACCEPTED, Json(ResumeView::new(doc, false, None))))
}

/// GET /api/v1/resume
///
/// Every view moves ingestion forward by at most one step.
pub async fn handle_get_resume(
    State(state): State<AppState>,
    CallerUid(uid): CallerUid,
) -> Result<Json<ResumeView>, AppError> {
    let advance = state.pipeline.advance(&uid).await?;
    let needs_reupload = advance.needs_reupload();
    let notice = match advance.outcome {
        StepOutcome::Rejected { reason } => Some(reason),
        StepOutcome::Deferred { .. } => Some("Still processing, check back shortly".to_string()),
        StepOutcome::Idle | StepOutcome::Extracted | StepOutcome::Structured => None,
    };
    Ok(Json(ResumeView::new(advance.document, needs_reupload, notice)))
}

/// PUT /api/v1/resume/structured
pub async fn handle_edit_structured(
    State(state): State<AppState>,
    CallerUid(uid): CallerUid,
    Json(data): Json<StructuredResume>,
) -> Result<Json<ResumeView>, AppError> {
    let doc = state.resumes.edit_structured(&uid, data).await?;
    Ok(Json(ResumeView::new(doc, false, None)))
}
