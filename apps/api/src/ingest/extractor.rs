use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("unsupported document format")]
    Unsupported,

    #[error("extraction task failed: {0}")]
    Task(String),
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractError>;
}

/// PDFs go through `pdf-extract`; anything else must already be UTF-8 text.
pub struct DocumentTextExtractor;

#[async_trait]
impl TextExtractor for DocumentTextExtractor {
    async fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        if bytes.starts_with(b"%PDF") {
            let owned = bytes.to_vec();
            // pdf-extract is synchronous and CPU-bound
            return tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&owned))
                .await
                .map_err(|e| ExtractError::Task(e.to_string()))?
                .map_err(|e| ExtractError::Pdf(e.to_string()));
        }

        std::str::from_utf8(bytes)
            .map(|s| s.to_string())
            .map_err(|_| ExtractError::Unsupported)
    }
}
