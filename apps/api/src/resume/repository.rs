use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::errors::AppError;
use crate::resume::models::{ResumeDocument, ResumePatch, Stage};
use crate::resume::schema::StructuredResume;
use crate::store::{get_json, keys, set_json, KeyStore, StoreError};

/// Owns `resume:{uid}`. One document per uid, last write wins.
///
/// There is no optimistic concurrency control: a manual edit racing a pipeline
/// write for the same uid can be clobbered by whichever write lands last.
#[derive(Clone)]
pub struct ResumeRepository {
    store: Arc<dyn KeyStore>,
}

impl ResumeRepository {
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, uid: &str) -> Result<Option<ResumeDocument>, StoreError> {
        get_json(self.store.as_ref(), &keys::resume(uid)).await
    }

    /// Merges `patch` into the current document (creating it if absent) and
    /// stamps `updated_at`. Content and stage land in the same single-key write.
    pub async fn put(&self, uid: &str, patch: ResumePatch) -> Result<ResumeDocument, StoreError> {
        let mut doc = self
            .get(uid)
            .await?
            .unwrap_or_else(|| ResumeDocument::empty(uid));
        patch.apply(&mut doc);
        doc.updated_at = Utc::now();
        set_json(self.store.as_ref(), &keys::resume(uid), &doc).await?;
        Ok(doc)
    }

    /// Owner edit of the published structured data. Only a STRUCTURED document
    /// can be edited; the edit is validated like a generated candidate.
    pub async fn edit_structured(
        &self,
        uid: &str,
        data: StructuredResume,
    ) -> Result<ResumeDocument, AppError> {
        data.validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let doc = self
            .get(uid)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No resume for {uid}")))?;

        if doc.stage != Stage::Structured {
            return Err(AppError::Validation(format!(
                "Resume is {} and cannot be edited until it is structured",
                doc.stage.as_str()
            )));
        }

        let doc = self
            .put(uid, ResumePatch::default().structured_data(Some(data)))
            .await?;
        info!("Resume for {uid} edited by owner");
        Ok(doc)
    }

    /// Writes the document under `to_uid`, re-owned. Pure overwrite; returns
    /// whether a source document existed.
    pub async fn copy_to(&self, from_uid: &str, to_uid: &str) -> Result<bool, StoreError> {
        match self.get(from_uid).await? {
            Some(mut doc) => {
                doc.uid = to_uid.to_string();
                set_json(self.store.as_ref(), &keys::resume(to_uid), &doc).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn remove(&self, uid: &str) -> Result<bool, StoreError> {
        self.store.delete(&keys::resume(uid)).await
    }
}
