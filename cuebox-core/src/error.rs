use serde::Serialize;
use thiserror::Error;

use crate::{ExternalId, FormatError, GuardRejection, ItemId, MetadataError, RoomId, StoreError};

pub type Result<T> = std::result::Result<T, EngineError>;

/// A stable, machine-readable classification of an [EngineError].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    InvalidFormat,
    DuplicateItem,
    QueueFull,
    ItemNotFound,
    RoomNotFound,
    MetadataUnavailable,
    ConcurrencyConflict,
    DeadlineExceeded,
    Internal,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Wrong URL format: {0}")]
    InvalidFormat(FormatError),
    #[error("Video {0} is already in the queue")]
    DuplicateItem(ExternalId),
    #[error("Queue is already at its limit of {limit} items")]
    QueueFull { limit: usize },
    #[error("Item {0} doesn't exist or was already played")]
    ItemNotFound(ItemId),
    #[error("Room {0} doesn't exist")]
    RoomNotFound(RoomId),
    #[error("Could not fetch video metadata: {0}")]
    MetadataUnavailable(MetadataError),
    #[error("Gave up after {attempts} conflicting attempts")]
    ConcurrencyConflict { attempts: u32 },
    #[error("Operation did not complete before its deadline")]
    DeadlineExceeded,
    /// Something went wrong in the store. The request itself may have been fine.
    #[error("Store failure: {0}")]
    Store(StoreError),
}

impl ErrorKind {
    /// Returns true if the caller's request was refused, as opposed to the system failing.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidFormat
                | Self::DuplicateItem
                | Self::QueueFull
                | Self::ItemNotFound
                | Self::RoomNotFound
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "InvalidFormat",
            Self::DuplicateItem => "DuplicateItem",
            Self::QueueFull => "QueueFull",
            Self::ItemNotFound => "ItemNotFound",
            Self::RoomNotFound => "RoomNotFound",
            Self::MetadataUnavailable => "MetadataUnavailable",
            Self::ConcurrencyConflict => "ConcurrencyConflict",
            Self::DeadlineExceeded => "DeadlineExceeded",
            Self::Internal => "Internal",
        }
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidFormat(_) => ErrorKind::InvalidFormat,
            Self::DuplicateItem(_) => ErrorKind::DuplicateItem,
            Self::QueueFull { .. } => ErrorKind::QueueFull,
            Self::ItemNotFound(_) => ErrorKind::ItemNotFound,
            Self::RoomNotFound(_) => ErrorKind::RoomNotFound,
            Self::MetadataUnavailable(_) => ErrorKind::MetadataUnavailable,
            Self::ConcurrencyConflict { .. } => ErrorKind::ConcurrencyConflict,
            Self::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            Self::Store(_) => ErrorKind::Internal,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<GuardRejection> for EngineError {
    fn from(value: GuardRejection) -> Self {
        match value {
            GuardRejection::Duplicate(external_id) => Self::DuplicateItem(external_id),
            GuardRejection::Full { limit } => Self::QueueFull { limit },
        }
    }
}
