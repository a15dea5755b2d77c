use std::process::Stdio;

use async_trait::async_trait;
use cuebox_core::{ExternalId, MetadataError, MetadataProvider, Thumbnail, VideoMetadata};
use log::debug;
use serde::Deserialize;
use tokio::process::Command;

use super::{InputError, SearchResult};

const YT_UNAVAILABLE: &str = "Video unavailable. This video is not available";
const YT_PRIVATE: &str = "Private video";
const YT_NOT_FOUND: &str = "Video unavailable";
const YT_ID_ERROR: &str = "Incomplete YouTube ID";

pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Fetches video metadata and search results by running yt-dlp.
#[derive(Debug, Clone)]
pub struct YouTubeMetadata {
    binary: String,
}

#[derive(Debug, Deserialize)]
struct YouTubeThumbnail {
    url: String,
    width: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct YouTubeVideo {
    title: String,
    #[serde(default)]
    thumbnails: Vec<YouTubeThumbnail>,
}

#[derive(Debug, Deserialize)]
struct FlatSearchEntry {
    id: String,
    title: Option<String>,
    #[serde(default)]
    thumbnails: Vec<YouTubeThumbnail>,
}

#[derive(Debug, Deserialize)]
struct YouTubeSearch {
    entries: Vec<FlatSearchEntry>,
}

impl YouTubeMetadata {
    pub fn new() -> Self {
        Self::with_binary("yt-dlp")
    }

    /// Uses a yt-dlp executable other than the one on the path.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Searches YouTube for videos matching the query, returning at most `limit` results.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, InputError> {
        let query = query.trim();

        if query.is_empty() {
            return Err(InputError::Invalid("Search query is required".to_string()));
        }

        let target = format!("ytsearch{}:{}", limit, query);
        // Don't resolve every result, the listing has all we need
        let output = self.run(&["--flat-playlist"], &target).await?;

        parse_search(&output)
    }

    /// Runs yt-dlp on a url or search, returning its JSON output.
    async fn run(&self, options: &[&str], target: &str) -> Result<String, InputError> {
        let output = Command::new(&self.binary)
            // Only the metadata is needed
            .arg("--skip-download")
            // Get a JSON output, in a single line.
            .arg("-J")
            .args(options)
            .args(["--", target])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| InputError::FetchError(e.to_string()))?;

        if !output.status.success() {
            let error_output = String::from_utf8_lossy(&output.stderr);
            debug!("yt-dlp exited with {}: {}", output.status, error_output.trim());

            return Err(classify_error(&error_output));
        }

        String::from_utf8(output.stdout).map_err(|e| InputError::ParseError(e.to_string()))
    }
}

impl Default for YouTubeMetadata {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataProvider for YouTubeMetadata {
    async fn lookup(&self, external_id: &ExternalId) -> Result<VideoMetadata, MetadataError> {
        let url = external_id.canonical_url();
        let output = self.run(&[], &url).await?;
        Ok(parse_video(&output)?)
    }
}

fn parse_video(json: &str) -> Result<VideoMetadata, InputError> {
    let video: YouTubeVideo =
        serde_json::from_str(json).map_err(|e| InputError::ParseError(e.to_string()))?;

    Ok(VideoMetadata {
        title: video.title,
        thumbnails: video.thumbnails.into_iter().map(Into::into).collect(),
    })
}

fn parse_search(json: &str) -> Result<Vec<SearchResult>, InputError> {
    let search: YouTubeSearch =
        serde_json::from_str(json).map_err(|e| InputError::ParseError(e.to_string()))?;

    let results = search
        .entries
        .into_iter()
        // Channels and playlists can show up too, they have no usable video id
        .filter(|e| e.id.len() == 11)
        .map(|mut entry| {
            entry.thumbnails.sort_by_key(|t| t.width);

            SearchResult {
                url: ExternalId::from_canonical(entry.id.as_str()).canonical_url(),
                title: entry.title.unwrap_or_default(),
                thumbnail: entry.thumbnails.pop().map(|t| t.url),
                id: entry.id,
            }
        })
        .collect();

    Ok(results)
}

fn classify_error(error_output: &str) -> InputError {
    if error_output.contains(YT_UNAVAILABLE) || error_output.contains(YT_PRIVATE) {
        return InputError::Unavailable;
    }

    if error_output.contains(YT_NOT_FOUND) {
        return InputError::NotFound;
    }

    if error_output.contains(YT_ID_ERROR) {
        return InputError::Invalid("Invalid Video ID".to_string());
    }

    InputError::FetchError(error_output.trim().to_string())
}

impl From<YouTubeThumbnail> for Thumbnail {
    fn from(value: YouTubeThumbnail) -> Self {
        Thumbnail {
            url: value.url,
            width: value.width.unwrap_or_default(),
        }
    }
}
