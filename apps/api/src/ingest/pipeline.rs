//! Drives a resume through `UPLOADED -> EXTRACTED -> STRUCTURED`, one step per call.
//!
//! There is no background worker. Every read path that needs the resume calls
//! [`IngestionPipeline::advance`], and a step that fails transiently leaves the
//! document where it was so the next call retries it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::errors::AppError;
use crate::ingest::extractor::TextExtractor;
use crate::ingest::generator::ResumeGenerator;
use crate::ingest::object_store::{ObjectStore, ObjectStoreError};
use crate::ingest::quality::{ContentGate, GateVerdict};
use crate::resume::models::{ResumeDocument, ResumePatch, Stage};
use crate::resume::repository::ResumeRepository;
use crate::resume::schema::StructuredResume;

#[derive(Debug, Clone, Copy)]
pub struct GenerationPolicy {
    /// Generator calls per `advance`, first try included. Capped at 2.
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for GenerationPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// What a single `advance` call did.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Nothing to do: empty, structured or rejected.
    Idle,
    Extracted,
    Structured,
    /// The upload was judged unusable and discarded.
    Rejected { reason: String },
    /// A collaborator failed; the stage is unchanged and the next call retries.
    Deferred { reason: String },
}

#[derive(Debug, Clone)]
pub struct Advance {
    pub document: ResumeDocument,
    pub outcome: StepOutcome,
}

impl Advance {
    /// The caller should send the user back to upload a new file.
    pub fn needs_reupload(&self) -> bool {
        self.document.stage == Stage::Rejected
    }
}

#[derive(Clone)]
pub struct IngestionPipeline {
    resumes: ResumeRepository,
    objects: Arc<dyn ObjectStore>,
    extractor: Arc<dyn TextExtractor>,
    generator: Arc<dyn ResumeGenerator>,
    gate: Arc<dyn ContentGate>,
    policy: GenerationPolicy,
    upload_bucket: String,
}

impl IngestionPipeline {
    pub fn new(
        resumes: ResumeRepository,
        objects: Arc<dyn ObjectStore>,
        extractor: Arc<dyn TextExtractor>,
        generator: Arc<dyn ResumeGenerator>,
        gate: Arc<dyn ContentGate>,
        policy: GenerationPolicy,
        upload_bucket: String,
    ) -> Self {
        Self {
            resumes,
            objects,
            extractor,
            generator,
            gate,
            policy: GenerationPolicy {
                max_attempts: policy.max_attempts.clamp(1, 2),
                ..policy
            },
            upload_bucket,
        }
    }

    /// Where `uid` may place source files: `s3://{bucket}/uploads/{uid}/`.
    pub fn upload_prefix(&self, uid: &str) -> String {
        format!("s3://{}/uploads/{uid}/", self.upload_bucket)
    }

    /// Records a new upload. Downstream fields are cleared and the stage reset to
    /// UPLOADED, whatever the document was before. A superseded source object is
    /// deleted after the new state is written.
    ///
    /// Only objects under the caller's own [`upload_prefix`](Self::upload_prefix)
    /// are accepted, since recorded urls are later deleted on the caller's behalf.
    pub async fn upload(
        &self,
        uid: &str,
        source_file_url: &str,
    ) -> Result<ResumeDocument, AppError> {
        let url = source_file_url.trim();
        if url.is_empty() {
            return Err(AppError::Validation("source_file_url is required".to_string()));
        }
        let prefix = self.upload_prefix(uid);
        let owned = url
            .strip_prefix(&prefix)
            .is_some_and(|key| !key.is_empty() && !key.split('/').any(|seg| seg == ".."));
        if !owned {
            return Err(AppError::Validation(format!(
                "source_file_url must be an object under {prefix}"
            )));
        }

        let previous = self
            .resumes
            .get(uid)
            .await?
            .and_then(|doc| doc.source_file_url);

        let doc = self
            .resumes
            .put(
                uid,
                ResumePatch::default()
                    .source_file_url(Some(url.to_string()))
                    .extracted_text(None)
                    .structured_data(None)
                    .stage(Stage::Uploaded),
            )
            .await?;
        info!("Resume upload recorded for {uid}");

        if let Some(old) = previous.filter(|old| old != url) {
            self.delete_source(uid, &old).await;
        }

        Ok(doc)
    }

    /// Performs at most one forward step for `uid` and returns the resulting document.
    ///
    /// Transient collaborator failures are not errors here: they come back as
    /// [`StepOutcome::Deferred`] with the stage unchanged. Only store failures
    /// propagate.
    pub async fn advance(&self, uid: &str) -> Result<Advance, AppError> {
        let Some(doc) = self.resumes.get(uid).await? else {
            return Ok(Advance {
                document: ResumeDocument::empty(uid),
                outcome: StepOutcome::Idle,
            });
        };

        match doc.stage {
            Stage::Uploaded => self.extract_step(doc).await,
            Stage::Extracted => self.structure_step(doc).await,
            Stage::Empty | Stage::Structured | Stage::Rejected => Ok(Advance {
                document: doc,
                outcome: StepOutcome::Idle,
            }),
        }
    }

    // ── UPLOADED -> EXTRACTED ────────────────────────────────────────────────

    async fn extract_step(&self, doc: ResumeDocument) -> Result<Advance, AppError> {
        let uid = doc.uid.clone();

        let Some(url) = doc.source_file_url.clone() else {
            return self
                .reject(&uid, None, "no source file recorded for upload".to_string())
                .await;
        };

        let bytes = match self.objects.fetch_bytes(&url).await {
            Ok(bytes) => bytes,
            Err(ObjectStoreError::NotFound(_)) => {
                return self
                    .reject(&uid, Some(&url), "uploaded file no longer exists".to_string())
                    .await;
            }
            Err(e) => return Ok(deferred(doc, format!("fetch failed: {e}"))),
        };

        let text = match self.extractor.extract_text(&bytes).await {
            Ok(text) => text,
            Err(e) => return Ok(deferred(doc, format!("extraction failed: {e}"))),
        };

        if let GateVerdict::Reject(reason) = self.gate.inspect(&text) {
            return self.reject(&uid, Some(&url), reason).await;
        }

        let document = self
            .resumes
            .put(
                &uid,
                ResumePatch::default()
                    .extracted_text(Some(text))
                    .stage(Stage::Extracted),
            )
            .await?;
        info!("Extracted resume text for {uid}");

        Ok(Advance {
            document,
            outcome: StepOutcome::Extracted,
        })
    }

    // ── EXTRACTED -> STRUCTURED ──────────────────────────────────────────────

    async fn structure_step(&self, doc: ResumeDocument) -> Result<Advance, AppError> {
        let uid = doc.uid.clone();

        let Some(text) = doc.extracted_text.clone().filter(|t| !t.trim().is_empty()) else {
            // Nothing to structure; go back and extract again.
            let document = self
                .resumes
                .put(&uid, ResumePatch::default().stage(Stage::Uploaded))
                .await?;
            warn!("Resume for {uid} was EXTRACTED without text, re-queued for extraction");
            return Ok(Advance {
                document,
                outcome: StepOutcome::Deferred {
                    reason: "extracted text missing".to_string(),
                },
            });
        };

        let schema = StructuredResume::target_schema();
        let mut last_failure = String::new();

        for attempt in 1..=self.policy.max_attempts {
            if attempt > 1 && !self.policy.retry_delay.is_zero() {
                tokio::time::sleep(self.policy.retry_delay).await;
            }

            let candidate = match self.generator.generate(&text, &schema).await {
                Ok(candidate) => candidate,
                Err(e) => {
                    warn!("Resume generation attempt {attempt} for {uid} failed: {e}");
                    last_failure = format!("generation failed: {e}");
                    continue;
                }
            };

            match StructuredResume::from_candidate(candidate) {
                Ok(data) => {
                    let document = self
                        .resumes
                        .put(
                            &uid,
                            ResumePatch::default()
                                .structured_data(Some(data))
                                .stage(Stage::Structured),
                        )
                        .await?;
                    info!("Structured resume stored for {uid}");
                    return Ok(Advance {
                        document,
                        outcome: StepOutcome::Structured,
                    });
                }
                Err(e) => {
                    warn!("Resume candidate {attempt} for {uid} rejected: {e}");
                    last_failure = e.to_string();
                }
            }
        }

        Ok(deferred(doc, last_failure))
    }

    // ── Rejection ────────────────────────────────────────────────────────────

    /// The external object goes first: a crash between the delete and the write
    /// only repeats a harmless delete on the next call.
    async fn reject(
        &self,
        uid: &str,
        source_file_url: Option<&str>,
        reason: String,
    ) -> Result<Advance, AppError> {
        if let Some(url) = source_file_url {
            self.delete_source(uid, url).await;
        }

        let document = self
            .resumes
            .put(
                uid,
                ResumePatch::default()
                    .source_file_url(None)
                    .extracted_text(None)
                    .structured_data(None)
                    .stage(Stage::Rejected),
            )
            .await?;
        warn!("Resume upload for {uid} rejected: {reason}");

        Ok(Advance {
            document,
            outcome: StepOutcome::Rejected { reason },
        })
    }

    async fn delete_source(&self, uid: &str, url: &str) {
        if let Err(e) = self.objects.delete_object(url).await {
            warn!("Failed to delete source object {url} for {uid}: {e}");
        }
    }
}

fn deferred(document: ResumeDocument, reason: String) -> Advance {
    warn!("Resume step for {} deferred: {reason}", document.uid);
    Advance {
        document,
        outcome: StepOutcome::Deferred { reason },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::quality::TextQualityGate;
    use crate::resume::schema::sample_candidate;
    use crate::store::{keys, KeyStore, MemoryStore};
    use crate::testing::{FakeObjectStore, ScriptedExtractor, ScriptedGenerator};
    use serde_json::json;

    const RESUME_TEXT: &str = "Jane Doe, Engineer...";

    struct Fixture {
        store: Arc<MemoryStore>,
        resumes: ResumeRepository,
        objects: Arc<FakeObjectStore>,
        extractor: Arc<ScriptedExtractor>,
        generator: Arc<ScriptedGenerator>,
        pipeline: IngestionPipeline,
    }

    fn fixture(extractor: ScriptedExtractor, generator: ScriptedGenerator) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let resumes = ResumeRepository::new(store.clone());
        let objects = Arc::new(FakeObjectStore::default());
        let extractor = Arc::new(extractor);
        let generator = Arc::new(generator);
        let pipeline = IngestionPipeline::new(
            resumes.clone(),
            objects.clone(),
            extractor.clone(),
            generator.clone(),
            Arc::new(TextQualityGate { min_chars: 20 }),
            GenerationPolicy {
                max_attempts: 2,
                retry_delay: Duration::ZERO,
            },
            "bucket".to_string(),
        );
        Fixture {
            store,
            resumes,
            objects,
            extractor,
            generator,
            pipeline,
        }
    }

    fn happy() -> Fixture {
        fixture(
            ScriptedExtractor::returning(RESUME_TEXT),
            ScriptedGenerator::new(vec![Ok(sample_candidate())]),
        )
    }

    #[tokio::test]
    async fn test_end_to_end_upload_to_structured() {
        let f = happy();
        f.pipeline.upload("u1", "s3://bucket/uploads/u1/key.pdf").await.unwrap();

        let first = f.pipeline.advance("u1").await.unwrap();
        assert_eq!(first.outcome, StepOutcome::Extracted);
        assert_eq!(first.document.stage, Stage::Extracted);
        assert_eq!(first.document.extracted_text.as_deref(), Some(RESUME_TEXT));

        let second = f.pipeline.advance("u1").await.unwrap();
        assert_eq!(second.outcome, StepOutcome::Structured);
        assert_eq!(second.document.stage, Stage::Structured);
        assert_eq!(
            serde_json::to_value(second.document.structured_data.unwrap()).unwrap(),
            sample_candidate()
        );
        assert_eq!(f.generator.calls(), 1);
        assert!(f.objects.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_each_advance_takes_one_step() {
        let f = happy();
        f.pipeline.upload("u1", "s3://bucket/uploads/u1/key.pdf").await.unwrap();

        let mut stages = Vec::new();
        for _ in 0..4 {
            stages.push(f.pipeline.advance("u1").await.unwrap().document.stage);
        }
        assert_eq!(
            stages,
            vec![
                Stage::Extracted,
                Stage::Structured,
                Stage::Structured,
                Stage::Structured
            ]
        );
        assert_eq!(f.extractor.calls(), 1);
        assert_eq!(f.generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_advance_on_structured_is_byte_for_byte_noop() {
        let f = happy();
        f.pipeline.upload("u1", "s3://bucket/uploads/u1/key.pdf").await.unwrap();
        f.pipeline.advance("u1").await.unwrap();
        f.pipeline.advance("u1").await.unwrap();

        let before = f.store.get(&keys::resume("u1")).await.unwrap();
        let advance = f.pipeline.advance("u1").await.unwrap();
        let after = f.store.get(&keys::resume("u1")).await.unwrap();

        assert_eq!(advance.outcome, StepOutcome::Idle);
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_advance_without_document_is_idle() {
        let f = happy();
        let advance = f.pipeline.advance("nobody").await.unwrap();
        assert_eq!(advance.outcome, StepOutcome::Idle);
        assert_eq!(advance.document.stage, Stage::Empty);
        assert!(!f.store.exists(&keys::resume("nobody")).await.unwrap());
    }

    #[tokio::test]
    async fn test_generator_failing_twice_stays_extracted() {
        let f = fixture(
            ScriptedExtractor::returning(RESUME_TEXT),
            ScriptedGenerator::new(vec![Err("timeout".into()), Err("timeout".into())]),
        );
        f.pipeline.upload("u1", "s3://bucket/uploads/u1/key.pdf").await.unwrap();
        f.pipeline.advance("u1").await.unwrap();

        let advance = f.pipeline.advance("u1").await.unwrap();
        assert!(matches!(advance.outcome, StepOutcome::Deferred { .. }));
        assert_eq!(advance.document.stage, Stage::Extracted);
        assert_eq!(advance.document.extracted_text.as_deref(), Some(RESUME_TEXT));
        assert_eq!(f.generator.calls(), 2);
        assert!(f.objects.deleted().is_empty());

        let stored = f.resumes.get("u1").await.unwrap().unwrap();
        assert_eq!(stored.stage, Stage::Extracted);
        assert_eq!(stored.extracted_text.as_deref(), Some(RESUME_TEXT));
    }

    #[tokio::test]
    async fn test_single_retry_recovers() {
        let f = fixture(
            ScriptedExtractor::returning(RESUME_TEXT),
            ScriptedGenerator::new(vec![Err("overloaded".into()), Ok(sample_candidate())]),
        );
        f.pipeline.upload("u1", "s3://bucket/uploads/u1/key.pdf").await.unwrap();
        f.pipeline.advance("u1").await.unwrap();

        let advance = f.pipeline.advance("u1").await.unwrap();
        assert_eq!(advance.outcome, StepOutcome::Structured);
        assert_eq!(f.generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_invalid_candidate_is_never_persisted() {
        let mut bad = sample_candidate();
        bad["skills"] = json!((0..12).map(|i| format!("s{i}")).collect::<Vec<_>>());
        let f = fixture(
            ScriptedExtractor::returning(RESUME_TEXT),
            ScriptedGenerator::new(vec![Ok(bad.clone()), Ok(bad)]),
        );
        f.pipeline.upload("u1", "s3://bucket/uploads/u1/key.pdf").await.unwrap();
        f.pipeline.advance("u1").await.unwrap();

        let advance = f.pipeline.advance("u1").await.unwrap();
        assert!(matches!(advance.outcome, StepOutcome::Deferred { .. }));
        let stored = f.resumes.get("u1").await.unwrap().unwrap();
        assert_eq!(stored.stage, Stage::Extracted);
        assert_eq!(stored.structured_data, None);
    }

    #[tokio::test]
    async fn test_deferred_generation_retries_on_next_advance() {
        let f = fixture(
            ScriptedExtractor::returning(RESUME_TEXT),
            ScriptedGenerator::new(vec![
                Err("down".into()),
                Err("down".into()),
                Ok(sample_candidate()),
            ]),
        );
        f.pipeline.upload("u1", "s3://bucket/uploads/u1/key.pdf").await.unwrap();
        f.pipeline.advance("u1").await.unwrap();
        f.pipeline.advance("u1").await.unwrap();

        let advance = f.pipeline.advance("u1").await.unwrap();
        assert_eq!(advance.document.stage, Stage::Structured);
    }

    #[tokio::test]
    async fn test_extractor_failure_stays_uploaded() {
        let f = fixture(ScriptedExtractor::failing(), ScriptedGenerator::new(vec![]));
        f.pipeline.upload("u1", "s3://bucket/uploads/u1/key.pdf").await.unwrap();

        let advance = f.pipeline.advance("u1").await.unwrap();
        assert!(matches!(advance.outcome, StepOutcome::Deferred { .. }));
        assert_eq!(advance.document.stage, Stage::Uploaded);
        assert_eq!(
            advance.document.source_file_url.as_deref(),
            Some("s3://bucket/uploads/u1/key.pdf")
        );
        assert!(f.objects.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_stays_uploaded() {
        let f = happy();
        f.objects.fail_fetches();
        f.pipeline.upload("u1", "s3://bucket/uploads/u1/key.pdf").await.unwrap();

        let advance = f.pipeline.advance("u1").await.unwrap();
        assert!(matches!(advance.outcome, StepOutcome::Deferred { .. }));
        assert_eq!(advance.document.stage, Stage::Uploaded);
        assert_eq!(f.extractor.calls(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_content_is_rejected_and_deleted_once() {
        let f = fixture(
            ScriptedExtractor::returning("\u{FFFD}\u{FFFD} 01 02 \u{FFFD}"),
            ScriptedGenerator::new(vec![]),
        );
        f.pipeline.upload("u1", "s3://bucket/uploads/u1/key.pdf").await.unwrap();

        let advance = f.pipeline.advance("u1").await.unwrap();
        assert!(matches!(advance.outcome, StepOutcome::Rejected { .. }));
        assert!(advance.needs_reupload());

        let stored = f.resumes.get("u1").await.unwrap().unwrap();
        assert_eq!(stored.stage, Stage::Rejected);
        assert_eq!(stored.source_file_url, None);
        assert_eq!(stored.extracted_text, None);
        assert_eq!(stored.structured_data, None);
        assert_eq!(f.objects.deleted(), vec!["s3://bucket/uploads/u1/key.pdf".to_string()]);

        // Terminal until re-upload.
        let again = f.pipeline.advance("u1").await.unwrap();
        assert_eq!(again.outcome, StepOutcome::Idle);
        assert_eq!(f.objects.deleted().len(), 1);
        assert_eq!(f.generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_source_object_is_rejected() {
        let f = happy();
        f.objects.mark_missing("s3://bucket/uploads/u1/key.pdf");
        f.pipeline.upload("u1", "s3://bucket/uploads/u1/key.pdf").await.unwrap();

        let advance = f.pipeline.advance("u1").await.unwrap();
        assert!(advance.needs_reupload());
        assert_eq!(f.objects.deleted().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_delete_does_not_block_rejection() {
        let f = fixture(ScriptedExtractor::returning("   "), ScriptedGenerator::new(vec![]));
        f.objects.fail_deletes();
        f.pipeline.upload("u1", "s3://bucket/uploads/u1/key.pdf").await.unwrap();

        let advance = f.pipeline.advance("u1").await.unwrap();
        assert_eq!(advance.document.stage, Stage::Rejected);
        assert_eq!(f.objects.deleted().len(), 1);
    }

    #[tokio::test]
    async fn test_reupload_resets_and_deletes_superseded_object() {
        let f = happy();
        f.pipeline.upload("u1", "s3://bucket/uploads/u1/old.pdf").await.unwrap();
        f.pipeline.advance("u1").await.unwrap();
        f.pipeline.advance("u1").await.unwrap();

        let doc = f.pipeline.upload("u1", "s3://bucket/uploads/u1/new.pdf").await.unwrap();
        assert_eq!(doc.stage, Stage::Uploaded);
        assert_eq!(doc.source_file_url.as_deref(), Some("s3://bucket/uploads/u1/new.pdf"));
        assert_eq!(doc.extracted_text, None);
        assert_eq!(doc.structured_data, None);
        assert_eq!(f.objects.deleted(), vec!["s3://bucket/uploads/u1/old.pdf".to_string()]);
    }

    #[tokio::test]
    async fn test_reupload_after_rejection() {
        let f = fixture(
            ScriptedExtractor::returning("tiny"),
            ScriptedGenerator::new(vec![]),
        );
        f.pipeline.upload("u1", "s3://bucket/uploads/u1/scan.pdf").await.unwrap();
        f.pipeline.advance("u1").await.unwrap();

        let doc = f.pipeline.upload("u1", "s3://bucket/uploads/u1/cv.pdf").await.unwrap();
        assert_eq!(doc.stage, Stage::Uploaded);
        // The rejected object was already deleted during rejection.
        assert_eq!(f.objects.deleted(), vec!["s3://bucket/uploads/u1/scan.pdf".to_string()]);
    }

    #[tokio::test]
    async fn test_upload_requires_url() {
        let f = happy();
        assert!(matches!(
            f.pipeline.upload("u1", "  ").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_outside_caller_prefix_is_rejected() {
        let f = happy();
        f.pipeline
            .upload("u2", "s3://bucket/uploads/u2/cv.pdf")
            .await
            .unwrap();

        for foreign in [
            "s3://bucket/uploads/u2/cv.pdf",
            "s3://bucket/key.pdf",
            "s3://other/uploads/u1/cv.pdf",
            "s3://bucket/uploads/u1/",
            "s3://bucket/uploads/u1/../u2/cv.pdf",
            "s3://bucket/uploads/u10/cv.pdf",
        ] {
            assert!(
                matches!(
                    f.pipeline.upload("u1", foreign).await,
                    Err(AppError::Validation(_))
                ),
                "{foreign} should be refused"
            );
        }

        assert!(f.resumes.get("u1").await.unwrap().is_none());
        assert!(f.objects.deleted().is_empty());
        assert_eq!(f.pipeline.upload_prefix("u1"), "s3://bucket/uploads/u1/");
    }

    #[tokio::test]
    async fn test_extracted_without_text_goes_back_to_uploaded() {
        let f = happy();
        f.resumes
            .put("u1", ResumePatch::default().stage(Stage::Extracted))
            .await
            .unwrap();

        let advance = f.pipeline.advance("u1").await.unwrap();
        assert_eq!(advance.document.stage, Stage::Uploaded);
        assert_eq!(f.generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_policy_attempts_are_capped() {
        let store = Arc::new(MemoryStore::new());
        let generator = Arc::new(ScriptedGenerator::new(vec![]));
        let pipeline = IngestionPipeline::new(
            ResumeRepository::new(store.clone()),
            Arc::new(FakeObjectStore::default()),
            Arc::new(ScriptedExtractor::returning(RESUME_TEXT)),
            generator.clone(),
            Arc::new(TextQualityGate { min_chars: 20 }),
            GenerationPolicy {
                max_attempts: 9,
                retry_delay: Duration::ZERO,
            },
            "bucket".to_string(),
        );
        pipeline.upload("u1", "s3://bucket/uploads/u1/key.pdf").await.unwrap();
        pipeline.advance("u1").await.unwrap();
        pipeline.advance("u1").await.unwrap();
        assert_eq!(generator.calls(), 2);
    }
}
