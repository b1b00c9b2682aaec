use std::str::FromStr;

use anyhow::{bail, Context, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    /// In-process store. Data is lost on restart; for local runs only.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => bail!("STORE_BACKEND must be 'redis' or 'memory', got '{other}'"),
        }
    }
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub store_backend: StoreBackend,
    pub redis_url: Option<String>,
    pub s3_endpoint: String,
    pub s3_region: String,
    /// Bucket that clients upload resumes into, under `uploads/{uid}/`.
    pub s3_upload_bucket: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub anthropic_api_key: String,
    pub llm_timeout_secs: u64,
    pub generation_max_attempts: u32,
    pub generation_retry_delay_ms: u64,
    pub ingest_min_text_chars: usize,
    pub directory_page_size: usize,
    pub password_reset_ttl_secs: u64,
    pub auth_uid_header: String,
    pub public_base_url: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let store_backend: StoreBackend = optional_env("STORE_BACKEND", "redis").parse()?;
        let redis_url = match store_backend {
            StoreBackend::Redis => Some(require_env("REDIS_URL")?),
            StoreBackend::Memory => std::env::var("REDIS_URL").ok(),
        };

        let port = optional_env("PORT", "8080");

        Ok(Config {
            store_backend,
            redis_url,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            s3_region: optional_env("S3_REGION", "us-east-1"),
            s3_upload_bucket: require_env("S3_UPLOAD_BUCKET")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            llm_timeout_secs: parse_env("LLM_TIMEOUT_SECS", 45)?,
            generation_max_attempts: parse_env::<u32>("GENERATION_MAX_ATTEMPTS", 2)?.clamp(1, 2),
            generation_retry_delay_ms: parse_env("GENERATION_RETRY_DELAY_MS", 500)?,
            ingest_min_text_chars: parse_env("INGEST_MIN_TEXT_CHARS", 20)?,
            directory_page_size: parse_env::<usize>("DIRECTORY_PAGE_SIZE", 50)?.clamp(1, 500),
            password_reset_ttl_secs: parse_env("PASSWORD_RESET_TTL_SECS", 3600)?,
            auth_uid_header: optional_env("AUTH_UID_HEADER", "x-authenticated-uid")
                .to_ascii_lowercase(),
            public_base_url: optional_env("PUBLIC_BASE_URL", &format!("http://localhost:{port}")),
            port: port
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: optional_env("RUST_LOG", "info"),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
impl Config {
    /// Configuration for in-process tests: memory store, no external endpoints.
    pub fn for_tests() -> Self {
        Config {
            store_backend: StoreBackend::Memory,
            redis_url: None,
            s3_endpoint: "http://localhost:9000".to_string(),
            s3_region: "us-east-1".to_string(),
            s3_upload_bucket: "bucket".to_string(),
            aws_access_key_id: "test".to_string(),
            aws_secret_access_key: "test".to_string(),
            anthropic_api_key: "test".to_string(),
            llm_timeout_secs: 45,
            generation_max_attempts: 2,
            generation_retry_delay_ms: 0,
            ingest_min_text_chars: 20,
            directory_page_size: 50,
            password_reset_ttl_secs: 3600,
            auth_uid_header: "x-authenticated-uid".to_string(),
            public_base_url: "https://folio.example".to_string(),
            port: 8080,
            rust_log: "info".to_string(),
        }
    }
}
