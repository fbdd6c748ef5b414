// src/ingest/types.rs
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One entry of the rotation list. `position` is fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Source {
    pub id: String, // e.g., "depression", "anxiety"
    pub position: usize,
}

impl Source {
    /// Build the rotation list in the given order.
    pub fn rotation<I, S>(ids: I) -> Vec<Source>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ids.into_iter()
            .enumerate()
            .map(|(position, id)| Source {
                id: id.into(),
                position,
            })
            .collect()
    }
}

/// Raw item as returned by a [`SourceClient`]. Transient: lives for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateItem {
    pub id: String,
    pub created_utc: f64, // unix seconds, as the source reports it
    pub title: String,
    pub body: String,
    pub score: i64,
    pub num_crossposts: i64,
    pub num_comments: i64,
}

/// Row persisted by the sink. Column names follow the output file schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestedRecord {
    pub id: String,
    pub timestamp: f64,
    pub content: String,
    pub likes: i64,
    pub shares: i64,
    pub comments: i64,
    pub comments_text: Vec<String>,
}

impl IngestedRecord {
    pub fn new(item: CandidateItem, content: String, comments_text: Vec<String>) -> Self {
        Self {
            id: item.id,
            timestamp: item.created_utc,
            content,
            likes: item.score,
            shares: item.num_crossposts,
            comments: item.num_comments,
            comments_text,
        }
    }
}

/// Failure kinds surfaced by source and thread clients.
///
/// `AccessDenied` is the one the crawler treats specially: it is expected for
/// private or quarantined sources and must never remove a source from rotation.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("access denied to {0}")]
    AccessDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited")]
    RateLimited,

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl SourceError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::AccessDenied(_) => "access_denied",
            SourceError::NotFound(_) => "not_found",
            SourceError::RateLimited => "rate_limited",
            SourceError::Auth(_) => "auth",
            SourceError::Status { .. } => "status",
            SourceError::Network(_) => "network",
            SourceError::Decode(_) => "decode",
            SourceError::Timeout(_) => "timeout",
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::Decode(err.to_string())
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Decode(err.to_string())
    }
}

/// Lists candidate items for one source. A single call per cycle; the error
/// kind tells the caller whether the source was merely inaccessible.
#[async_trait::async_trait]
pub trait SourceClient: Send + Sync {
    async fn list_items(
        &self,
        source: &Source,
        limit: usize,
    ) -> Result<Vec<CandidateItem>, SourceError>;
    fn name(&self) -> &'static str;
}

/// Retrieves the raw (un-normalized) text of every sub-resource attached to an
/// item, e.g. the bodies of a post's full comment tree.
#[async_trait::async_trait]
pub trait ThreadClient: Send + Sync {
    async fn fetch_thread(&self, item_id: &str) -> Result<Vec<String>, SourceError>;
}
