use std::fmt::Display;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use url::Url;

lazy_static! {
    /// Matches a missing or non-https scheme, so bare links like "www.youtube.com/..." parse.
    static ref URL_SCHEME_REGEX: Regex = Regex::new(r"^(https?://)?").unwrap();
    static ref VIDEO_ID_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap();
}

/// The canonical identifier of a video, used as the dedup key within a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ExternalId(String);

/// Why a submitted url was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// Not a url at all
    #[error("not a valid url")]
    Malformed,
    /// A url, but not a video watch page
    #[error("only youtube watch urls are supported")]
    UnsupportedUrl,
    /// A watch page url with a missing or broken video id
    #[error("\"{0}\" is not a valid video id")]
    InvalidVideoId(String),
}

impl ExternalId {
    /// Wraps an id that is already known to be canonical, such as one read back from a store.
    pub fn from_canonical(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the watch page for this video.
    pub fn canonical_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

impl Display for ExternalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extracts the video id from a youtube watch url.
///
/// Accepts `youtube.com` and its subdomains, with or without a scheme, as long as the path is
/// `/watch` and the `v` parameter holds a well-formed id. Everything else is rejected.
pub fn extract_external_id(raw: &str) -> Result<ExternalId, FormatError> {
    let trimmed = raw.trim();
    let normalized = URL_SCHEME_REGEX.replace(trimmed, "https://");
    let url = Url::parse(&normalized).map_err(|_| FormatError::Malformed)?;

    let is_youtube = url
        .host_str()
        .map(|host| host == "youtube.com" || host.ends_with(".youtube.com"))
        .unwrap_or(false);

    if !is_youtube || url.path().trim_end_matches('/') != "/watch" {
        return Err(FormatError::UnsupportedUrl);
    }

    let id = url
        .query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.into_owned())
        .ok_or(FormatError::UnsupportedUrl)?;

    if !VIDEO_ID_REGEX.is_match(&id) {
        return Err(FormatError::InvalidVideoId(id));
    }

    Ok(ExternalId(id))
}
