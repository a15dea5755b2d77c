use log::{debug, info};
use serde::Serialize;

use crate::{
    ItemId, ItemState, QueueItem, Ranking, RoomId, RoomSnapshot, RoomTransaction, StoreResult,
};

/// Points at the item currently playing in a room.
///
/// The generation increases with every committed advance, so a caller can tell whether the
/// room moved on since it last looked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveStream {
    pub room_id: RoomId,
    pub item_id: Option<ItemId>,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorState {
    Idle,
    Playing(ItemId),
}

/// What an advance did.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    /// The room moved to this item, or to nothing if the queue was empty.
    Advanced(Option<QueueItem>),
    /// Another advance committed first. Contains the item that one selected.
    Superseded(Option<QueueItem>),
}

/// The writes an advance will make, worked out from a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub retire: Option<ItemId>,
    pub activate: Option<QueueItem>,
    pub next: ActiveStream,
}

/// Owns the active slot of a room.
pub struct ActiveSelector;

impl ActiveStream {
    pub fn idle(room_id: RoomId) -> Self {
        Self {
            room_id,
            item_id: None,
            generation: 0,
        }
    }

    pub fn state(&self) -> SelectorState {
        match self.item_id {
            Some(id) => SelectorState::Playing(id),
            None => SelectorState::Idle,
        }
    }

    /// Returns the stream that follows this one.
    pub fn followed_by(&self, item_id: Option<ItemId>) -> Self {
        Self {
            room_id: self.room_id.clone(),
            item_id,
            generation: self.generation + 1,
        }
    }
}

impl AdvanceOutcome {
    pub fn item(&self) -> Option<&QueueItem> {
        match self {
            Self::Advanced(item) | Self::Superseded(item) => item.as_ref(),
        }
    }

    pub fn into_item(self) -> Option<QueueItem> {
        match self {
            Self::Advanced(item) | Self::Superseded(item) => item,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded(_))
    }
}

impl ActiveSelector {
    /// Works out what advancing the room would do.
    /// Returns `None` if the room is idle and there's nothing to play.
    pub fn plan(snapshot: &RoomSnapshot) -> Option<Transition> {
        let retire = snapshot.active.item_id;
        let activate = Ranking::rank(snapshot).into_iter().next().map(|mut item| {
            item.state = ItemState::Active;
            item
        });

        if retire.is_none() && activate.is_none() {
            return None;
        }

        Some(Transition {
            next: snapshot.active.followed_by(activate.as_ref().map(|i| i.id)),
            retire,
            activate,
        })
    }

    /// Retires the playing item and activates the best open one, inside the given transaction.
    ///
    /// If `expected_generation` is set and the room has advanced past it, nothing is written
    /// and the current item is returned as [AdvanceOutcome::Superseded].
    pub async fn advance(
        tx: &mut dyn RoomTransaction,
        expected_generation: Option<u64>,
    ) -> StoreResult<AdvanceOutcome> {
        let snapshot = tx.snapshot().await?;

        if let Some(expected) = expected_generation {
            if snapshot.active.generation != expected {
                debug!(
                    "Advance of room {} superseded (expected generation {}, found {})",
                    snapshot.room_id, expected, snapshot.active.generation
                );

                return Ok(AdvanceOutcome::Superseded(snapshot.active_item()));
            }
        }

        let Some(transition) = Self::plan(&snapshot) else {
            return Ok(AdvanceOutcome::Advanced(None));
        };

        if let Some(retired) = transition.retire {
            tx.set_item_state(retired, ItemState::Played).await?;
        }

        if let Some(item) = &transition.activate {
            tx.set_item_state(item.id, ItemState::Active).await?;
        }

        tx.set_active(&transition.next).await?;

        info!(
            "Room {} advanced to {} (generation {})",
            snapshot.room_id,
            transition
                .activate
                .as_ref()
                .map(|i| i.title.as_str())
                .unwrap_or("nothing"),
            transition.next.generation
        );

        Ok(AdvanceOutcome::Advanced(transition.activate))
    }
}
