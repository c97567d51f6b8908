//! The network side of the editor.
//!
//! [`SyncClient`] is the seam between the [`ListStore`](crate::store::ListStore)
//! and the mirror server. [`http::HttpSyncClient`] talks to the real server,
//! tests substitute a scripted client.

use reqwest::StatusCode;
use url::Url;

use crate::types::record::{Field, RepositoryRecord};

pub mod http;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server answered {status} for {url}")]
    Status { status: StatusCode, url: Url },

    #[error("could not decode the response from {url}: {reason}")]
    Decode { url: Url, reason: String },

    #[error("server rejected the change to `{field}` of repository #{index}")]
    Rejected { index: usize, field: Field },
}

impl SyncError {
    /// Infrastructure failures, as opposed to the server saying no.
    pub fn is_transport(&self) -> bool {
        !self.is_rejection()
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, SyncError::Rejected { .. })
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[async_trait::async_trait]
pub trait SyncClient: Send + Sync {
    async fn fetch_list(&self) -> Result<Vec<RepositoryRecord>>;

    /// `Ok(false)` means the server refused the change, usually because
    /// `old` no longer matches what it has stored.
    async fn update_field(&self, index: usize, field: Field, value: &str, old: &str)
    -> Result<bool>;

    async fn delete_record(&self, index: usize) -> Result<()>;

    async fn create_record(&self) -> Result<()>;
}
