use std::{future::Future, sync::Arc, time::Duration};

use log::{debug, error, info, warn};

use crate::{
    extract_external_id, ActiveSelector, ActiveStream, AdvanceOutcome, Artwork, CapacityGuard,
    Config, EngineError, ExternalId, ItemId, MetadataProvider, NewItem, QueueItem, Ranking,
    Result, RoomAccess, RoomId, RoomSnapshot, Store, StoreError, UserId, ViewerItem, Vote,
    VoteResult,
};

/// The room queue engine, tying validation, capacity, votes, ranking and selection to a store.
///
/// Holds no state of its own besides configuration. Every operation reads from and writes to
/// the store, so any number of engines can share one.
pub struct Engine<S, M> {
    config: Config,
    guard: CapacityGuard,
    store: Arc<S>,
    metadata: Arc<M>,
}

impl<S, M> Engine<S, M>
where
    S: Store,
    M: MetadataProvider,
{
    pub fn new(config: Config, store: S, metadata: M) -> Self {
        Self::with_shared(config, Arc::new(store), Arc::new(metadata))
    }

    pub fn with_shared(config: Config, store: Arc<S>, metadata: Arc<M>) -> Self {
        Self {
            guard: CapacityGuard::new(config.max_queue_len),
            config,
            store,
            metadata,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Submits a video url to a room, creating the room if this is its first submission.
    pub async fn submit(&self, room_id: &RoomId, url: &str) -> Result<QueueItem> {
        let external_id = extract_external_id(url).map_err(EngineError::InvalidFormat)?;

        // Looked up before the room is locked, so a slow provider doesn't hold up the room.
        let (title, artwork) = self.resolve_metadata(&external_id).await?;

        let (external_id, title, artwork) = (&external_id, title.as_str(), &artwork);

        let item = self
            .with_retries("submit", move || {
                self.try_submit(room_id, external_id, title, artwork)
            })
            .await?;

        info!(
            "Item {} ({}) submitted to room {}",
            item.id, item.title, room_id
        );

        Ok(item)
    }

    /// Votes for an item, or takes the vote back if the user already voted.
    pub async fn toggle_vote(&self, user_id: &UserId, item_id: ItemId) -> Result<VoteResult> {
        let room_id = self
            .store
            .room_of_item(item_id)
            .await
            .map_err(|e| not_found_as(e, EngineError::ItemNotFound(item_id)))?;

        let room_id = &room_id;

        let result = self
            .with_retries("vote", move || {
                self.try_toggle_vote(room_id, user_id, item_id)
            })
            .await?;

        debug!("User {} toggled vote on item {}: {:?}", user_id, item_id, result);

        Ok(result)
    }

    /// Returns how many users voted on a live item.
    pub async fn vote_count(&self, item_id: ItemId) -> Result<u32> {
        let room_id = self
            .store
            .room_of_item(item_id)
            .await
            .map_err(|e| not_found_as(e, EngineError::ItemNotFound(item_id)))?;

        self.snapshot(&room_id)
            .await?
            .item(item_id)
            .map(|i| i.votes)
            .ok_or(EngineError::ItemNotFound(item_id))
    }

    /// Returns the open items of a room, best first.
    pub async fn list_open(&self, room_id: &RoomId) -> Result<Ranking> {
        let snapshot = self.snapshot(room_id).await?;
        Ok(Ranking::rank(&snapshot))
    }

    /// Same as [Engine::list_open], with each item marked if `viewer` voted on it.
    pub async fn list_open_for(
        &self,
        room_id: &RoomId,
        viewer: &UserId,
    ) -> Result<Vec<ViewerItem>> {
        let snapshot = self.snapshot(room_id).await?;
        Ok(Ranking::for_viewer(&snapshot, viewer))
    }

    /// Returns the item currently playing in a room, if any.
    pub async fn get_active(&self, room_id: &RoomId) -> Result<Option<QueueItem>> {
        let snapshot = self.snapshot(room_id).await?;
        Ok(snapshot.active_item())
    }

    pub async fn active_stream(&self, room_id: &RoomId) -> Result<ActiveStream> {
        let snapshot = self.snapshot(room_id).await?;
        Ok(snapshot.active)
    }

    /// Marks the playing item as played and starts the best open one.
    ///
    /// Calls that race each other collapse into one: the room is observed first, and if
    /// another advance commits before this one gets the room, this one changes nothing and
    /// returns what the other selected.
    pub async fn advance(&self, room_id: &RoomId) -> Result<Option<QueueItem>> {
        let observed = self.active_stream(room_id).await?;
        let outcome = self.advance_from(room_id, observed.generation).await?;

        Ok(outcome.into_item())
    }

    /// Advances the room only if it is still at the given generation.
    pub async fn advance_from(
        &self,
        room_id: &RoomId,
        generation: u64,
    ) -> Result<AdvanceOutcome> {
        self.with_retries("advance", move || self.try_advance(room_id, generation))
            .await
    }

    /// Deletes a live item and its votes. If it was playing, the room becomes idle.
    pub async fn remove(&self, item_id: ItemId) -> Result<()> {
        let room_id = self
            .store
            .room_of_item(item_id)
            .await
            .map_err(|e| not_found_as(e, EngineError::ItemNotFound(item_id)))?;

        let room = &room_id;

        self.with_retries("remove", move || self.try_remove(room, item_id))
            .await?;

        info!("Item {} removed from room {}", item_id, room_id);

        Ok(())
    }

    async fn try_submit(
        &self,
        room_id: &RoomId,
        external_id: &ExternalId,
        title: &str,
        artwork: &Artwork,
    ) -> Result<QueueItem> {
        let mut tx = self
            .store
            .begin(room_id, RoomAccess::CreateIfMissing)
            .await?;

        let snapshot = tx.snapshot().await?;
        let token = self.guard.check(&snapshot, external_id.clone())?;

        let item = tx
            .insert_item(NewItem::new(token, title.to_string(), artwork.clone()))
            .await?;

        tx.commit().await?;
        Ok(item)
    }

    async fn try_toggle_vote(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        item_id: ItemId,
    ) -> Result<VoteResult> {
        let mut tx = self
            .store
            .begin(room_id, RoomAccess::Existing)
            .await
            .map_err(|e| not_found_as(e, EngineError::ItemNotFound(item_id)))?;

        let mut snapshot = tx.snapshot().await?;

        if snapshot.item(item_id).is_none() {
            return Err(EngineError::ItemNotFound(item_id));
        }

        let vote = Vote {
            user_id: user_id.clone(),
            item_id,
        };

        let result = snapshot.votes.toggle(vote.clone());

        match result {
            VoteResult::Voted => tx.insert_vote(&vote).await?,
            VoteResult::Unvoted => tx.delete_vote(&vote).await?,
        }

        tx.commit().await?;
        Ok(result)
    }

    async fn try_advance(&self, room_id: &RoomId, generation: u64) -> Result<AdvanceOutcome> {
        let mut tx = self
            .store
            .begin(room_id, RoomAccess::Existing)
            .await
            .map_err(|e| not_found_as(e, EngineError::RoomNotFound(room_id.clone())))?;

        let outcome = ActiveSelector::advance(tx.as_mut(), Some(generation)).await?;

        tx.commit().await?;
        Ok(outcome)
    }

    async fn try_remove(&self, room_id: &RoomId, item_id: ItemId) -> Result<()> {
        let mut tx = self
            .store
            .begin(room_id, RoomAccess::Existing)
            .await
            .map_err(|e| not_found_as(e, EngineError::ItemNotFound(item_id)))?;

        let snapshot = tx.snapshot().await?;

        if snapshot.item(item_id).is_none() {
            return Err(EngineError::ItemNotFound(item_id));
        }

        if snapshot.active.item_id == Some(item_id) {
            tx.set_active(&snapshot.active.followed_by(None)).await?;
        }

        tx.delete_item(item_id).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn snapshot(&self, room_id: &RoomId) -> Result<RoomSnapshot> {
        self.store
            .snapshot(room_id)
            .await
            .map_err(|e| not_found_as(e, EngineError::RoomNotFound(room_id.clone())))
    }

    async fn resolve_metadata(&self, external_id: &ExternalId) -> Result<(String, Artwork)> {
        let placeholder = &self.config.placeholder_image;

        match self.metadata.lookup(external_id).await {
            Ok(metadata) => {
                let title = Some(metadata.title)
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| self.config.placeholder_title.clone());

                Ok((title, Artwork::from_candidates(metadata.thumbnails, placeholder)))
            }
            Err(e) if self.config.require_metadata => Err(EngineError::MetadataUnavailable(e)),
            Err(e) => {
                warn!(
                    "Metadata for {} is unavailable, using placeholders: {}",
                    external_id, e
                );

                Ok((
                    self.config.placeholder_title.clone(),
                    Artwork::placeholder(placeholder),
                ))
            }
        }
    }

    /// Runs an attempt, running it again if it conflicted with a concurrent write.
    async fn with_retries<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.config.conflict_retries + 1;

        for n in 1..=attempts {
            match attempt().await {
                Err(EngineError::Store(StoreError::Conflict)) => {
                    warn!("{} conflicted (attempt {}/{})", operation, n, attempts);
                }
                Err(EngineError::Store(e)) => {
                    error!("{} failed: {}", operation, e);
                    return Err(EngineError::Store(e));
                }
                result => return result,
            }
        }

        Err(EngineError::ConcurrencyConflict { attempts })
    }
}

/// Runs an engine operation, giving up once the deadline passes.
///
/// The operation is dropped on timeout, and with it any open transaction, so nothing it did
/// is kept.
pub async fn with_deadline<T, F>(deadline: Duration, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(deadline, operation)
        .await
        .map_err(|_| EngineError::DeadlineExceeded)?
}

/// Maps a store's not found error to the engine error that fits the operation.
/// Anything else is a store fault and gets logged.
fn not_found_as(error: StoreError, not_found: EngineError) -> EngineError {
    match error {
        StoreError::NotFound { .. } => not_found,
        e => {
            error!("Store lookup failed: {}", e);
            EngineError::Store(e)
        }
    }
}
