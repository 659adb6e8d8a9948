//! Download queue items and collaborator interfaces

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One pending download with its retry count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadQueueItem {
    pub url: String,
    pub filename: String,
    /// Failed attempts so far; drives the linear backoff
    #[serde(default)]
    pub retries: u32,
}

impl DownloadQueueItem {
    #[must_use]
    pub fn new(url: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            filename: filename.into(),
            retries: 0,
        }
    }
}

/// Performs the actual transfer (browser download API, HTTP client, ...)
#[async_trait]
pub trait DownloadFetcher: Send + Sync {
    async fn fetch(&self, url: &str, filename: &str) -> Result<()>;
}

/// Asked between batches whether to keep going
#[async_trait]
pub trait Confirmer: Send + Sync {
    /// `completed` counts finishes in the current batch, `queued` what
    /// remains. Returning `false` halts dispatch until a restart.
    async fn confirm_continue(&self, completed: usize, queued: usize) -> bool;
}

/// Default confirmer: never interrupts
pub struct AlwaysContinue;

#[async_trait]
impl Confirmer for AlwaysContinue {
    async fn confirm_continue(&self, _completed: usize, _queued: usize) -> bool {
        true
    }
}
