#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use cuebox_core::{
    ActiveStream, BoxedTransaction, Config, Engine, ExternalId, ItemId, ItemState, MemoryStore,
    MetadataError, MetadataProvider, NewItem, QueueItem, RoomAccess, RoomId, RoomSnapshot,
    RoomTransaction, Store, StoreError, StoreResult, Thumbnail, VideoMetadata, Vote,
};
use parking_lot::Mutex;

pub const PLACEHOLDER: &str = "https://example.com/placeholder.jpg";

/// Returns a watch url for a made up, well formed video id.
pub fn url(n: usize) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id(n))
}

pub fn video_id(n: usize) -> String {
    format!("video{:06}", n)
}

pub fn config() -> Config {
    Config {
        placeholder_image: PLACEHOLDER.to_string(),
        ..Default::default()
    }
}

pub fn engine() -> Engine<MemoryStore, StubMetadata> {
    Engine::new(config(), MemoryStore::new(), StubMetadata::default())
}

pub fn shared_engine() -> Arc<Engine<MemoryStore, StubMetadata>> {
    Arc::new(engine())
}

/// A metadata provider that answers from memory and remembers what it was asked.
#[derive(Default)]
pub struct StubMetadata {
    failing: bool,
    lookups: Mutex<Vec<ExternalId>>,
}

impl StubMetadata {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.lock().len()
    }
}

#[async_trait]
impl MetadataProvider for StubMetadata {
    async fn lookup(&self, external_id: &ExternalId) -> Result<VideoMetadata, MetadataError> {
        self.lookups.lock().push(external_id.clone());

        if self.failing {
            return Err(MetadataError::Unavailable("provider is down".to_string()));
        }

        Ok(VideoMetadata {
            title: format!("Video {}", external_id),
            thumbnails: vec![
                Thumbnail {
                    url: format!("https://i.ytimg.com/vi/{}/hq720.jpg", external_id),
                    width: 1280,
                },
                Thumbnail {
                    url: format!("https://i.ytimg.com/vi/{}/default.jpg", external_id),
                    width: 120,
                },
                Thumbnail {
                    url: format!("https://i.ytimg.com/vi/{}/mqdefault.jpg", external_id),
                    width: 320,
                },
            ],
        })
    }
}

/// Wraps a [MemoryStore], making commits fail with a conflict or wait before they land,
/// and reads fail outright.
#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    conflicts: Arc<Mutex<u32>>,
    commit_delay: Arc<Mutex<Duration>>,
    offline: Mutex<bool>,
}

struct FaultyTransaction {
    inner: BoxedTransaction,
    conflicts: Arc<Mutex<u32>>,
    commit_delay: Duration,
}

impl FaultyStore {
    /// The next `count` commits fail with [StoreError::Conflict].
    pub fn fail_commits(&self, count: u32) {
        *self.conflicts.lock() = count;
    }

    pub fn delay_commits(&self, delay: Duration) {
        *self.commit_delay.lock() = delay;
    }

    /// Makes snapshots and item lookups fail with [StoreError::Internal].
    pub fn fail_reads(&self, offline: bool) {
        *self.offline.lock() = offline;
    }

    fn check_online(&self) -> StoreResult<()> {
        if *self.offline.lock() {
            return Err(StoreError::Internal("store is offline".into()));
        }

        Ok(())
    }
}

#[async_trait]
impl Store for FaultyStore {
    async fn snapshot(&self, room_id: &RoomId) -> StoreResult<RoomSnapshot> {
        self.check_online()?;
        self.inner.snapshot(room_id).await
    }

    async fn begin(&self, room_id: &RoomId, access: RoomAccess) -> StoreResult<BoxedTransaction> {
        let inner = self.inner.begin(room_id, access).await?;
        let commit_delay = *self.commit_delay.lock();

        Ok(Box::new(FaultyTransaction {
            inner,
            conflicts: self.conflicts.clone(),
            commit_delay,
        }))
    }

    async fn room_of_item(&self, item_id: ItemId) -> StoreResult<RoomId> {
        self.check_online()?;
        self.inner.room_of_item(item_id).await
    }
}

#[async_trait]
impl RoomTransaction for FaultyTransaction {
    fn room_id(&self) -> &RoomId {
        self.inner.room_id()
    }

    async fn snapshot(&mut self) -> StoreResult<RoomSnapshot> {
        self.inner.snapshot().await
    }

    async fn insert_item(&mut self, new_item: NewItem) -> StoreResult<QueueItem> {
        self.inner.insert_item(new_item).await
    }

    async fn insert_vote(&mut self, vote: &Vote) -> StoreResult<()> {
        self.inner.insert_vote(vote).await
    }

    async fn delete_vote(&mut self, vote: &Vote) -> StoreResult<()> {
        self.inner.delete_vote(vote).await
    }

    async fn set_item_state(&mut self, item_id: ItemId, state: ItemState) -> StoreResult<()> {
        self.inner.set_item_state(item_id, state).await
    }

    async fn delete_item(&mut self, item_id: ItemId) -> StoreResult<()> {
        self.inner.delete_item(item_id).await
    }

    async fn set_active(&mut self, stream: &ActiveStream) -> StoreResult<()> {
        self.inner.set_active(stream).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        if !self.commit_delay.is_zero() {
            tokio::time::sleep(self.commit_delay).await;
        }

        {
            let mut conflicts = self.conflicts.lock();

            if *conflicts > 0 {
                *conflicts -= 1;
                return Err(StoreError::Conflict);
            }
        }

        self.inner.commit().await
    }
}
