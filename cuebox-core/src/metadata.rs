use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::ExternalId;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Video was not found")]
    NotFound,

    #[error("Metadata is unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to parse metadata: {0}")]
    Parse(String),
}

/// A thumbnail candidate as reported by a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Thumbnail {
    pub url: String,
    pub width: u32,
}

/// Metadata of a video, already converted from the provider's own format.
#[derive(Debug, Clone)]
pub struct VideoMetadata {
    pub title: String,
    pub thumbnails: Vec<Thumbnail>,
}

/// The two images stored with a queue item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artwork {
    pub small: String,
    pub big: String,
}

/// Resolves a video id to its metadata.
#[async_trait]
pub trait MetadataProvider
where
    Self: Send + Sync + 'static,
{
    async fn lookup(&self, external_id: &ExternalId) -> Result<VideoMetadata, MetadataError>;
}

impl Artwork {
    /// Picks the stored images from a set of candidates.
    ///
    /// Sorted by width, "big" is the widest and "small" the runner-up. A single candidate is
    /// used for both, and no candidates at all falls back to the placeholder.
    pub fn from_candidates(mut candidates: Vec<Thumbnail>, placeholder: &str) -> Self {
        candidates.sort_by(|a, b| a.width.cmp(&b.width));

        let big = candidates.pop();
        let small = candidates.pop().or_else(|| big.clone());

        Self {
            small: small
                .map(|t| t.url)
                .unwrap_or_else(|| placeholder.to_string()),
            big: big.map(|t| t.url).unwrap_or_else(|| placeholder.to_string()),
        }
    }

    pub fn placeholder(placeholder: &str) -> Self {
        Self::from_candidates(vec![], placeholder)
    }
}
