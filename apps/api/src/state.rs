use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::directory::PortfolioDirectory;
use crate::identity::registry::IdentityRegistry;
use crate::identity::reset::PasswordResets;
use crate::ingest::extractor::TextExtractor;
use crate::ingest::generator::ResumeGenerator;
use crate::ingest::object_store::ObjectStore;
use crate::ingest::quality::TextQualityGate;
use crate::ingest::{GenerationPolicy, IngestionPipeline};
use crate::mailer::Mailer;
use crate::resume::repository::ResumeRepository;
use crate::store::KeyStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub registry: IdentityRegistry,
    pub resumes: ResumeRepository,
    pub pipeline: IngestionPipeline,
    pub directory: PortfolioDirectory,
    pub resets: PasswordResets,
}

/// External collaborators, chosen at startup.
pub struct Collaborators {
    pub store: Arc<dyn KeyStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub extractor: Arc<dyn TextExtractor>,
    pub generator: Arc<dyn ResumeGenerator>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// Wires every component over one shared keyspace.
    pub fn build(config: Config, deps: Collaborators) -> Self {
        let resumes = ResumeRepository::new(deps.store.clone());
        let registry = IdentityRegistry::new(deps.store.clone(), resumes.clone());

        let pipeline = IngestionPipeline::new(
            resumes.clone(),
            deps.objects,
            deps.extractor,
            deps.generator,
            Arc::new(TextQualityGate {
                min_chars: config.ingest_min_text_chars,
            }),
            GenerationPolicy {
                max_attempts: config.generation_max_attempts,
                retry_delay: Duration::from_millis(config.generation_retry_delay_ms),
            },
            config.s3_upload_bucket.clone(),
        );

        let directory = PortfolioDirectory::new(
            deps.store.clone(),
            registry.clone(),
            resumes.clone(),
            config.directory_page_size,
        );

        let resets = PasswordResets::new(
            deps.store,
            registry.clone(),
            deps.mailer,
            config.password_reset_ttl_secs,
            config.public_base_url.clone(),
        );

        Self {
            config,
            registry,
            resumes,
            pipeline,
            directory,
            resets,
        }
    }
}
