//! In-process fakes for the external collaborators, shared by unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use crate::ingest::extractor::{ExtractError, TextExtractor};
use crate::ingest::generator::{GenerateError, ResumeGenerator};
use crate::ingest::object_store::{ObjectStore, ObjectStoreError};
use crate::mailer::Mailer;

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingMailer {
    /// `(recipient, reset_url)` pairs in send order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_password_reset(&self, to: &str, reset_url: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), reset_url.to_string()));
        Ok(())
    }
}

/// Serves a fixed PDF-looking payload for every url unless told otherwise.
/// Delete attempts are recorded even when configured to fail.
#[derive(Default)]
pub struct FakeObjectStore {
    missing: Mutex<HashSet<String>>,
    fail_fetch: AtomicBool,
    fail_delete: AtomicBool,
    deleted: Mutex<Vec<String>>,
}

impl FakeObjectStore {
    pub fn mark_missing(&self, url: &str) {
        self.missing.lock().unwrap().insert(url.to_string());
    }

    pub fn fail_fetches(&self) {
        self.fail_fetch.store(true, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self) {
        self.fail_delete.store(true, Ordering::SeqCst);
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn fetch_bytes(&self, url: &str) -> Result<Bytes, ObjectStoreError> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Backend("connection reset".to_string()));
        }
        if self.missing.lock().unwrap().contains(url) {
            return Err(ObjectStoreError::NotFound(url.to_string()));
        }
        Ok(Bytes::from_static(b"%PDF-1.7 fake"))
    }

    async fn delete_object(&self, url: &str) -> Result<(), ObjectStoreError> {
        self.deleted.lock().unwrap().push(url.to_string());
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Backend("access denied".to_string()));
        }
        Ok(())
    }
}

pub struct ScriptedExtractor {
    text: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedExtractor {
    pub fn returning(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            text: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextExtractor for ScriptedExtractor {
    async fn extract_text(&self, _bytes: &[u8]) -> Result<String, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.text
            .clone()
            .ok_or_else(|| ExtractError::Pdf("corrupt xref table".to_string()))
    }
}

/// Replays a queue of results, one per call. An exhausted script fails.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<Value, String>>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Result<Value, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResumeGenerator for ScriptedGenerator {
    async fn generate(&self, _text: &str, _schema: &Value) -> Result<Value, GenerateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(GenerateError::Unusable(message)),
            None => Err(GenerateError::Unusable("script exhausted".to_string())),
        }
    }
}
