use chrono::{DateTime, Utc};
use cuebox_core::{
    ActiveStream, Artwork, ExternalId, ItemId, ItemState, QueueItem, RoomId, StoreError,
    StoreResult, UserId, Vote,
};
use sqlx::FromRow;

/// The type used for primary keys in the database.
pub type PrimaryKey = i64;

/// A row of the `rooms` table
#[derive(Debug, FromRow)]
pub struct RoomRow {
    pub id: String,
    /// The item the room is playing, if any
    pub active_item_id: Option<PrimaryKey>,
    pub generation: i64,
}

/// A row of the `queue_items` table
#[derive(Debug, FromRow)]
pub struct ItemRow {
    pub id: PrimaryKey,
    pub room_id: String,
    pub external_id: String,
    pub title: String,
    pub artwork_small: String,
    pub artwork_big: String,
    pub submitted_at: DateTime<Utc>,
    /// One of `open`, `active` or `played`
    pub state: String,
}

#[derive(Debug, FromRow)]
pub struct VoteRow {
    pub user_id: String,
    pub item_id: PrimaryKey,
}

/// Login session data used to resolve callers
#[derive(Debug)]
pub struct NewSession {
    /// The session token, or key if you will
    pub token: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

impl RoomRow {
    pub fn into_stream(self) -> ActiveStream {
        ActiveStream {
            room_id: RoomId::new(self.id),
            item_id: self.active_item_id.map(ItemId::from_value),
            generation: self.generation as u64,
        }
    }
}

impl TryFrom<ItemRow> for QueueItem {
    type Error = StoreError;

    fn try_from(row: ItemRow) -> StoreResult<Self> {
        let state = ItemState::parse(&row.state).ok_or_else(|| {
            StoreError::Internal(format!("item {} has unknown state {}", row.id, row.state).into())
        })?;

        Ok(QueueItem {
            id: ItemId::from_value(row.id),
            room_id: RoomId::new(row.room_id),
            external_id: ExternalId::from_canonical(row.external_id),
            title: row.title,
            artwork: Artwork {
                small: row.artwork_small,
                big: row.artwork_big,
            },
            submitted_at: row.submitted_at,
            state,
            votes: 0,
        })
    }
}

impl From<VoteRow> for Vote {
    fn from(row: VoteRow) -> Self {
        Vote {
            user_id: UserId::new(row.user_id),
            item_id: ItemId::from_value(row.item_id),
        }
    }
}
