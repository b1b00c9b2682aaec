//! Read side: which portfolios are published, and what a public portfolio shows.
//!
//! Listing walks the `user:name:*` mapping space in bounded cursor batches. It is
//! restartable from any returned cursor but not a snapshot: names claimed or
//! released mid-scan may be missed or seen twice.

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use futures::stream::{self, Stream, TryStreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::identity::registry::IdentityRegistry;
use crate::resume::repository::ResumeRepository;
use crate::resume::schema::StructuredResume;
use crate::store::{keys, KeyStore, StoreError};

pub mod handlers;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioEntry {
    pub username: String,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DirectoryPage {
    pub entries: Vec<PortfolioEntry>,
    /// Pass back to continue. `None` once the scan is complete.
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicPortfolio {
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub resume: StructuredResume,
    pub last_modified: DateTime<Utc>,
}

#[derive(Clone)]
pub struct PortfolioDirectory {
    store: Arc<dyn KeyStore>,
    registry: IdentityRegistry,
    resumes: ResumeRepository,
    default_page_size: usize,
}

impl PortfolioDirectory {
    pub fn new(
        store: Arc<dyn KeyStore>,
        registry: IdentityRegistry,
        resumes: ResumeRepository,
        default_page_size: usize,
    ) -> Self {
        Self {
            store,
            registry,
            resumes,
            default_page_size: default_page_size.max(1),
        }
    }

    pub fn default_page_size(&self) -> usize {
        self.default_page_size
    }

    /// One scan batch, filtered to published portfolios. A page can be empty while
    /// `next_cursor` is still set.
    pub async fn page(
        &self,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<DirectoryPage, StoreError> {
        let batch = self
            .store
            .scan(keys::USERNAME_PATTERN, cursor, page_size.max(1))
            .await?;

        let lookups = batch
            .keys
            .iter()
            .filter_map(|key| keys::username_from_key(key))
            .map(|name| self.published_entry(name));
        let entries: Vec<PortfolioEntry> = try_join_all(lookups)
            .await?
            .into_iter()
            .flatten()
            .collect();

        debug!(
            "Directory batch: {} keys scanned, {} published",
            batch.keys.len(),
            entries.len()
        );

        Ok(DirectoryPage {
            entries,
            next_cursor: batch.next_cursor,
        })
    }

    /// Lazily yields every published portfolio, fetching one batch at a time.
    /// `start` resumes from a cursor returned by [`PortfolioDirectory::page`].
    pub fn list_published(
        &self,
        page_size: usize,
        start: Option<String>,
    ) -> impl Stream<Item = Result<PortfolioEntry, StoreError>> + Send + 'static {
        let directory = self.clone();
        // `None` state: scan finished.
        stream::try_unfold(Some(start), move |state| {
            let directory = directory.clone();
            async move {
                let Some(cursor) = state else {
                    return Ok::<_, StoreError>(None);
                };
                let page = directory.page(cursor.as_deref(), page_size).await?;
                let next = page.next_cursor.map(Some);
                let entries = stream::iter(page.entries.into_iter().map(Ok::<_, StoreError>));
                Ok(Some((entries, next)))
            }
        })
        .try_flatten()
    }

    /// The public view of `username`, if it resolves and its resume is published.
    pub async fn portfolio(&self, username: &str) -> Result<Option<PublicPortfolio>, StoreError> {
        let Some(uid) = self.registry.resolve_username(username).await? else {
            return Ok(None);
        };
        let Some(doc) = self.resumes.get(&uid).await? else {
            return Ok(None);
        };
        let Some(resume) = doc.structured_data.clone().filter(|_| doc.is_published()) else {
            return Ok(None);
        };
        let user = self.registry.get_user(&uid).await?;

        Ok(Some(PublicPortfolio {
            username: username.trim().to_lowercase(),
            display_name: user.as_ref().and_then(|u| u.display_name.clone()),
            avatar_url: user.and_then(|u| u.avatar_url),
            resume,
            last_modified: doc.updated_at,
        }))
    }

    async fn published_entry(&self, username: &str) -> Result<Option<PortfolioEntry>, StoreError> {
        let Some(uid) = self.registry.resolve_username(username).await? else {
            return Ok(None);
        };
        Ok(self
            .resumes
            .get(&uid)
            .await?
            .filter(|doc| doc.is_published())
            .map(|doc| PortfolioEntry {
                username: username.to_string(),
                last_modified: doc.updated_at,
            }))
    }
}
