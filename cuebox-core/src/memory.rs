use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    ActiveStream, BoxedTransaction, IdCounter, ItemId, ItemState, NewItem, QueueItem, RoomAccess,
    RoomId, RoomSnapshot, RoomTransaction, Store, StoreError, StoreResult, Vote, VoteLedger,
};

// Reduces verbosity
type Rooms = Arc<DashMap<RoomId, Arc<Mutex<RoomRecord>>>>;

/// A store that keeps everything in memory.
///
/// Each room sits behind its own lock, so transactions on different rooms never wait on
/// each other. Useful for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rooms: Rooms,
    item_rooms: Arc<DashMap<ItemId, RoomId>>,
    ids: Arc<IdCounter>,
}

#[derive(Debug, Clone)]
struct RoomRecord {
    items: BTreeMap<ItemId, QueueItem>,
    votes: VoteLedger,
    active: ActiveStream,
    /// False until the transaction that created the room commits
    committed: bool,
}

/// A transaction on a [MemoryStore] room.
///
/// Changes are made to a copy of the room, which is published on commit.
pub struct MemoryTransaction {
    room_id: RoomId,
    guard: OwnedMutexGuard<RoomRecord>,
    working: RoomRecord,
    item_rooms: Arc<DashMap<ItemId, RoomId>>,
    ids: Arc<IdCounter>,
    inserted: Vec<ItemId>,
    retired: Vec<ItemId>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every item of a room, including played ones, ordered by id.
    pub async fn history(&self, room_id: &RoomId) -> StoreResult<Vec<QueueItem>> {
        let record = self.room(room_id)?;
        let record = record.lock().await;

        if !record.committed {
            return Err(room_not_found(room_id));
        }

        Ok(record.items.values().cloned().collect())
    }

    fn room(&self, room_id: &RoomId) -> StoreResult<Arc<Mutex<RoomRecord>>> {
        self.rooms
            .get(room_id)
            .map(|r| r.clone())
            .ok_or_else(|| room_not_found(room_id))
    }

    /// Returns the room's record, adding an uncommitted one if there is none.
    /// Uncommitted records act as missing until a transaction on them commits.
    fn room_or_create(&self, room_id: &RoomId) -> Arc<Mutex<RoomRecord>> {
        self.rooms
            .entry(room_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(RoomRecord::new(room_id.clone()))))
            .clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn snapshot(&self, room_id: &RoomId) -> StoreResult<RoomSnapshot> {
        let record = self.room(room_id)?;
        let record = record.lock().await;

        if !record.committed {
            return Err(room_not_found(room_id));
        }

        Ok(record.snapshot(room_id))
    }

    async fn begin(&self, room_id: &RoomId, access: RoomAccess) -> StoreResult<BoxedTransaction> {
        let record = match access {
            RoomAccess::Existing => self.room(room_id)?,
            RoomAccess::CreateIfMissing => self.room_or_create(room_id),
        };

        let guard = record.lock_owned().await;
        let mut working = guard.clone();

        match access {
            RoomAccess::Existing if !working.committed => return Err(room_not_found(room_id)),
            RoomAccess::Existing => {}
            RoomAccess::CreateIfMissing => working.committed = true,
        }

        Ok(Box::new(MemoryTransaction {
            room_id: room_id.clone(),
            guard,
            working,
            item_rooms: self.item_rooms.clone(),
            ids: self.ids.clone(),
            inserted: vec![],
            retired: vec![],
        }))
    }

    async fn room_of_item(&self, item_id: ItemId) -> StoreResult<RoomId> {
        self.item_rooms
            .get(&item_id)
            .map(|r| r.clone())
            .ok_or_else(|| item_not_found(item_id))
    }
}

#[async_trait]
impl RoomTransaction for MemoryTransaction {
    fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    async fn snapshot(&mut self) -> StoreResult<RoomSnapshot> {
        Ok(self.working.snapshot(&self.room_id))
    }

    async fn insert_item(&mut self, new_item: NewItem) -> StoreResult<QueueItem> {
        if new_item.room_id != self.room_id {
            return Err(StoreError::Rejected(format!(
                "item for room {} inserted into room {}",
                new_item.room_id, self.room_id
            )));
        }

        let id = self.ids.next();
        let item = new_item.into_item(id);

        self.working.items.insert(id, item.clone());
        self.inserted.push(id);

        Ok(item)
    }

    async fn insert_vote(&mut self, vote: &Vote) -> StoreResult<()> {
        self.live_item(vote.item_id)?;

        if !self.working.votes.insert(vote.clone()) {
            return Err(StoreError::Conflict);
        }

        Ok(())
    }

    async fn delete_vote(&mut self, vote: &Vote) -> StoreResult<()> {
        if !self.working.votes.remove(vote) {
            return Err(StoreError::NotFound {
                resource: "vote",
                identifier: format!("{}:{}", vote.user_id, vote.item_id),
            });
        }

        Ok(())
    }

    async fn set_item_state(&mut self, item_id: ItemId, state: ItemState) -> StoreResult<()> {
        let item = self
            .working
            .items
            .get_mut(&item_id)
            .ok_or_else(|| item_not_found(item_id))?;

        if !item.state.can_become(state) {
            return Err(StoreError::Rejected(format!(
                "item {} can't go from {} to {}",
                item_id,
                item.state.as_str(),
                state.as_str()
            )));
        }

        item.state = state;

        // Played items can't be voted on or looked up again
        if state == ItemState::Played {
            self.working.votes.remove_item(item_id);
            self.retired.push(item_id);
        }

        Ok(())
    }

    async fn delete_item(&mut self, item_id: ItemId) -> StoreResult<()> {
        self.working
            .items
            .remove(&item_id)
            .ok_or_else(|| item_not_found(item_id))?;

        self.working.votes.remove_item(item_id);
        self.retired.push(item_id);

        Ok(())
    }

    async fn set_active(&mut self, stream: &ActiveStream) -> StoreResult<()> {
        if let Some(item_id) = stream.item_id {
            let item = self.live_item(item_id)?;

            if item.state != ItemState::Active {
                return Err(StoreError::Rejected(format!(
                    "item {} must be active before it can be streamed",
                    item_id
                )));
            }
        }

        self.working.active = stream.clone();
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction {
            room_id,
            mut guard,
            working,
            item_rooms,
            inserted,
            retired,
            ..
        } = *self;

        *guard = working;

        for id in inserted {
            item_rooms.insert(id, room_id.clone());
        }

        for id in retired {
            item_rooms.remove(&id);
        }

        Ok(())
    }
}

impl MemoryTransaction {
    fn live_item(&self, item_id: ItemId) -> StoreResult<&QueueItem> {
        self.working
            .items
            .get(&item_id)
            .filter(|i| i.state.is_live())
            .ok_or_else(|| item_not_found(item_id))
    }
}

impl RoomRecord {
    fn new(room_id: RoomId) -> Self {
        Self {
            items: Default::default(),
            votes: Default::default(),
            active: ActiveStream::idle(room_id),
            committed: false,
        }
    }

    fn snapshot(&self, room_id: &RoomId) -> RoomSnapshot {
        let items: Vec<_> = self
            .items
            .values()
            .filter(|i| i.state.is_live())
            .cloned()
            .collect();

        let votes = VoteLedger::from_votes(
            self.votes
                .iter()
                .filter(|v| items.iter().any(|i| i.id == v.item_id)),
        );

        RoomSnapshot {
            room_id: room_id.clone(),
            items,
            votes,
            active: self.active.clone(),
        }
    }
}

fn room_not_found(room_id: &RoomId) -> StoreError {
    StoreError::NotFound {
        resource: "room",
        identifier: room_id.to_string(),
    }
}

fn item_not_found(item_id: ItemId) -> StoreError {
    StoreError::NotFound {
        resource: "item",
        identifier: item_id.to_string(),
    }
}
