use std::{env, str::FromStr};

use thiserror::Error;

/// The configuration of the queue engine
#[derive(Debug, Clone)]
pub struct Config {
    /// How many open or playing items a room can hold
    pub max_queue_len: usize,
    /// How many times an operation is retried when it conflicts with a concurrent one
    pub conflict_retries: u32,
    /// Image used when a video has no thumbnails
    pub placeholder_image: String,
    /// Title used when a video's metadata could not be fetched
    pub placeholder_title: String,
    /// Reject submissions whose metadata can't be fetched, instead of using placeholders
    pub require_metadata: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

impl Config {
    pub const MAX_QUEUE_LEN_KEY: &'static str = "CUEBOX_MAX_QUEUE_LEN";
    pub const CONFLICT_RETRIES_KEY: &'static str = "CUEBOX_CONFLICT_RETRIES";
    pub const PLACEHOLDER_IMAGE_KEY: &'static str = "CUEBOX_PLACEHOLDER_IMAGE";
    pub const REQUIRE_METADATA_KEY: &'static str = "CUEBOX_REQUIRE_METADATA";

    /// Reads the configuration from the environment, using defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a configuration from any key-value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Ok(Self {
            max_queue_len: parse_or(&lookup, Self::MAX_QUEUE_LEN_KEY, defaults.max_queue_len)?,
            conflict_retries: parse_or(
                &lookup,
                Self::CONFLICT_RETRIES_KEY,
                defaults.conflict_retries,
            )?,
            placeholder_image: lookup(Self::PLACEHOLDER_IMAGE_KEY)
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.placeholder_image),
            placeholder_title: defaults.placeholder_title,
            require_metadata: parse_or(
                &lookup,
                Self::REQUIRE_METADATA_KEY,
                defaults.require_metadata,
            )?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_queue_len: 20,
            conflict_retries: 3,
            placeholder_image:
                "https://cdn.pixabay.com/photo/2024/02/28/07/42/european-shorthair-8601492_640.jpg"
                    .to_string(),
            placeholder_title: "Can't find video".to_string(),
            require_metadata: false,
        }
    }
}
