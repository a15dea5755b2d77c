use cuebox_core::MetadataError;
use serde::Serialize;
use thiserror::Error;

mod youtube;
pub use youtube::*;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("Input is invalid: {0}")]
    Invalid(String),

    #[error("Resource was not found")]
    NotFound,

    #[error("Resource was found but is unavailable")]
    Unavailable,

    #[error("Failed to fetch resource: {0}")]
    FetchError(String),

    #[error("Failed to parse resource: {0}")]
    ParseError(String),
}

/// A video found by a keyword search
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    /// The largest thumbnail of the video, if it has any
    pub thumbnail: Option<String>,
    /// The watch page of the video, ready to be submitted
    pub url: String,
}

impl From<InputError> for MetadataError {
    fn from(value: InputError) -> Self {
        match value {
            InputError::NotFound => MetadataError::NotFound,
            InputError::Unavailable => MetadataError::Unavailable("video is unavailable".into()),
            InputError::ParseError(e) => MetadataError::Parse(e),
            InputError::Invalid(e) | InputError::FetchError(e) => MetadataError::Unavailable(e),
        }
    }
}
