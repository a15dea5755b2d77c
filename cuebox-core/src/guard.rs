use crate::{ExternalId, RoomId, RoomSnapshot};

/// Proof that a room had room for an item when the guard checked it.
/// Consumed by [crate::NewItem::new], and only the guard can create one.
#[derive(Debug)]
pub struct CapacityToken {
    room_id: RoomId,
    external_id: ExternalId,
}

/// Why the guard refused a new item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardRejection {
    /// The item is already open or playing in the room
    Duplicate(ExternalId),
    /// The room already holds the maximum number of live items
    Full { limit: usize },
}

/// Enforces dedup and capacity on a room's live items.
#[derive(Debug, Clone, Copy)]
pub struct CapacityGuard {
    max_queue_len: usize,
}

impl CapacityGuard {
    pub fn new(max_queue_len: usize) -> Self {
        Self { max_queue_len }
    }

    /// Checks whether an item may be added to the room the snapshot was taken of.
    ///
    /// Must be called on a snapshot read inside the same transaction that inserts the item,
    /// otherwise two submissions can both pass the check.
    pub fn check(
        &self,
        snapshot: &RoomSnapshot,
        external_id: ExternalId,
    ) -> Result<CapacityToken, GuardRejection> {
        let is_duplicate = snapshot
            .items
            .iter()
            .any(|i| i.state.is_live() && i.external_id == external_id);

        if is_duplicate {
            return Err(GuardRejection::Duplicate(external_id));
        }

        if snapshot.live_count() >= self.max_queue_len {
            return Err(GuardRejection::Full {
                limit: self.max_queue_len,
            });
        }

        Ok(CapacityToken {
            room_id: snapshot.room_id.clone(),
            external_id,
        })
    }
}

impl CapacityToken {
    pub(crate) fn into_parts(self) -> (RoomId, ExternalId) {
        (self.room_id, self.external_id)
    }
}
