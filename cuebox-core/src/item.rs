use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{guard::CapacityToken, metadata::Artwork, ExternalId, Id};

pub type ItemId = Id<QueueItem>;

/// Identifies a room. Rooms are keyed by their creator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RoomId(String);

/// An opaque user identifier, as resolved by an identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct UserId(String);

/// The lifecycle of a queue item.
/// An item only ever moves forward: `Open` -> `Active` -> `Played`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    /// Waiting in the queue
    Open,
    /// Currently playing
    Active,
    /// Done, never returns to the queue
    Played,
}

/// A piece of media submitted to a room.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: ItemId,
    pub room_id: RoomId,
    pub external_id: ExternalId,
    pub title: String,
    pub artwork: Artwork,
    pub submitted_at: DateTime<Utc>,
    pub state: ItemState,
    /// Derived from the vote ledger whenever the item is read. Never persisted.
    pub votes: u32,
}

/// An item that passed the capacity guard and can be inserted.
///
/// It can only be built from a [CapacityToken], so every insert went through the guard.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub room_id: RoomId,
    pub external_id: ExternalId,
    pub title: String,
    pub artwork: Artwork,
    pub submitted_at: DateTime<Utc>,
}

impl RoomId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl ItemState {
    /// Open and active items count towards capacity and can be voted on.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Open | Self::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Active => "active",
            Self::Played => "played",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(Self::Open),
            "active" => Some(Self::Active),
            "played" => Some(Self::Played),
            _ => None,
        }
    }
}

impl NewItem {
    pub fn new(token: CapacityToken, title: String, artwork: Artwork) -> Self {
        let (room_id, external_id) = token.into_parts();

        Self {
            room_id,
            external_id,
            title,
            artwork,
            submitted_at: Utc::now(),
        }
    }

    /// Turns the new item into a stored one, once the store has assigned an id.
    pub fn into_item(self, id: ItemId) -> QueueItem {
        QueueItem {
            id,
            room_id: self.room_id,
            external_id: self.external_id,
            title: self.title,
            artwork: self.artwork,
            submitted_at: self.submitted_at,
            state: ItemState::Open,
            votes: 0,
        }
    }
}
