use async_trait::async_trait;
use thiserror::Error;

use crate::{
    ActiveStream, ItemId, ItemState, NewItem, QueueItem, RoomId, UserId, Vote, VoteLedger,
};

pub type StoreResult<T> = std::result::Result<T, StoreError>;
pub type BoxedTransaction = Box<dyn RoomTransaction>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// An unknown or internal error happened with the store
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource in the store doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: String,
    },
    /// The write collided with a concurrent one and can be retried
    #[error("Transaction conflicted with a concurrent transaction")]
    Conflict,
    /// The write would break a data model rule
    #[error("Rejected write: {0}")]
    Rejected(String),
}

/// How a transaction should treat a room that doesn't exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomAccess {
    /// Fail with [StoreError::NotFound]
    Existing,
    /// Create the room as part of the transaction
    CreateIfMissing,
}

/// The state of a room at one point in time: its live items, their votes, and the active pointer.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    /// Items that are open or active. Vote counts are not filled in.
    pub items: Vec<QueueItem>,
    /// Votes on the live items.
    pub votes: VoteLedger,
    pub active: ActiveStream,
}

/// Represents a type that can persist rooms, queue items, votes and active streams.
///
/// Mutations go through a [RoomTransaction], which holds the room exclusively until it is
/// committed or dropped. Different rooms never block each other.
#[async_trait]
pub trait Store
where
    Self: Send + Sync + 'static,
{
    /// Reads the committed state of a room without taking its lock.
    async fn snapshot(&self, room_id: &RoomId) -> StoreResult<RoomSnapshot>;

    /// Locks the room and starts a transaction on it.
    async fn begin(&self, room_id: &RoomId, access: RoomAccess) -> StoreResult<BoxedTransaction>;

    /// Returns the room an item belongs to. Items never move between rooms.
    async fn room_of_item(&self, item_id: ItemId) -> StoreResult<RoomId>;
}

/// A transaction scoped to a single room.
///
/// Dropping it without calling [RoomTransaction::commit] discards every change.
#[async_trait]
pub trait RoomTransaction
where
    Self: Send + 'static,
{
    fn room_id(&self) -> &RoomId;

    /// Reads the room, including changes made earlier in this transaction.
    async fn snapshot(&mut self) -> StoreResult<RoomSnapshot>;

    async fn insert_item(&mut self, new_item: NewItem) -> StoreResult<QueueItem>;

    /// Inserts a vote. Fails with [StoreError::Conflict] if the pair already voted.
    async fn insert_vote(&mut self, vote: &Vote) -> StoreResult<()>;

    async fn delete_vote(&mut self, vote: &Vote) -> StoreResult<()>;

    /// Moves an item forward in its lifecycle.
    async fn set_item_state(&mut self, item_id: ItemId, state: ItemState) -> StoreResult<()>;

    /// Deletes an item along with its votes.
    async fn delete_item(&mut self, item_id: ItemId) -> StoreResult<()>;

    async fn set_active(&mut self, stream: &ActiveStream) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

impl RoomSnapshot {
    pub fn empty(room_id: RoomId) -> Self {
        Self {
            active: ActiveStream::idle(room_id.clone()),
            room_id,
            items: vec![],
            votes: VoteLedger::new(),
        }
    }

    /// Returns a live item with its vote count filled in.
    pub fn item(&self, item_id: ItemId) -> Option<QueueItem> {
        self.items
            .iter()
            .find(|i| i.id == item_id)
            .map(|i| self.counted(i.clone()))
    }

    /// Returns the item the active stream points at, if any.
    pub fn active_item(&self) -> Option<QueueItem> {
        self.active.item_id.and_then(|id| self.item(id))
    }

    /// The number of items counting towards the room's capacity.
    pub fn live_count(&self) -> usize {
        self.items.iter().filter(|i| i.state.is_live()).count()
    }

    pub fn counted(&self, mut item: QueueItem) -> QueueItem {
        item.votes = self.votes.count(item.id);
        item
    }

    pub fn has_voted(&self, user_id: &UserId, item_id: ItemId) -> bool {
        self.votes.has_voted(user_id, item_id)
    }
}

impl ItemState {
    /// Returns true if an item may move from this state to `next`.
    pub fn can_become(&self, next: ItemState) -> bool {
        matches!(
            (self, next),
            (Self::Open, Self::Active) | (Self::Open, Self::Played) | (Self::Active, Self::Played)
        )
    }
}
