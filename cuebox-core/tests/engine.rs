mod common;

use std::{sync::Arc, time::Duration};

use common::*;
use cuebox_core::{
    with_deadline, Config, Engine, EngineError, ErrorKind, FormatError, ItemId, ItemState,
    MemoryStore, RoomId, SelectorState, StoreError, UserId, VoteResult,
};

fn room() -> RoomId {
    RoomId::new("creator")
}

#[tokio::test]
async fn test_submit_creates_room() {
    let engine = engine();

    assert!(matches!(
        engine.list_open(&room()).await,
        Err(EngineError::RoomNotFound(_))
    ));

    let item = engine.submit(&room(), &url(1)).await.unwrap();

    assert_eq!(item.state, ItemState::Open);
    assert_eq!(item.votes, 0);
    assert_eq!(item.external_id.as_str(), video_id(1));
    assert_eq!(item.title, format!("Video {}", video_id(1)));
    assert!(item.artwork.big.ends_with("hq720.jpg"));
    assert!(item.artwork.small.ends_with("mqdefault.jpg"));

    let open = engine.list_open(&room()).await.unwrap();

    assert_eq!(open.len(), 1);
    assert_eq!(open.head(), Some(&item));
}

#[tokio::test]
async fn test_invalid_url_is_rejected_before_lookup() {
    let metadata = Arc::new(StubMetadata::default());
    let engine = Engine::with_shared(config(), Arc::new(MemoryStore::new()), metadata.clone());

    let error = engine
        .submit(&room(), "https://www.youtube.com/@Ayrun")
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        EngineError::InvalidFormat(FormatError::UnsupportedUrl)
    ));
    assert_eq!(error.kind(), ErrorKind::InvalidFormat);
    assert!(error.kind().is_rejection());
    assert_eq!(metadata.lookups(), 0);
    assert!(engine.list_open(&room()).await.is_err());
}

#[tokio::test]
async fn test_duplicate_submission() {
    let engine = engine();

    engine.submit(&room(), &url(1)).await.unwrap();

    // Same video, different url form
    let error = engine
        .submit(&room(), &format!("youtube.com/watch?v={}&t=30", video_id(1)))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::DuplicateItem);

    // Still a duplicate while it plays
    engine.advance(&room()).await.unwrap();
    assert_eq!(
        engine.submit(&room(), &url(1)).await.unwrap_err().kind(),
        ErrorKind::DuplicateItem
    );

    // Rooms don't share queues
    engine
        .submit(&RoomId::new("someone-else"), &url(1))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_capacity_boundary() {
    let engine = engine();

    for n in 0..20 {
        engine.submit(&room(), &url(n)).await.unwrap();
    }

    let error = engine.submit(&room(), &url(20)).await.unwrap_err();
    assert!(matches!(error, EngineError::QueueFull { limit: 20 }));

    // The playing item still takes up a slot
    engine.advance(&room()).await.unwrap();
    assert_eq!(
        engine.submit(&room(), &url(20)).await.unwrap_err().kind(),
        ErrorKind::QueueFull
    );

    // Once played, it doesn't
    engine.advance(&room()).await.unwrap();
    engine.submit(&room(), &url(20)).await.unwrap();
}

#[tokio::test]
async fn test_vote_toggles() {
    let engine = engine();
    let user = UserId::new("john");
    let item = engine.submit(&room(), &url(1)).await.unwrap();

    assert_eq!(
        engine.toggle_vote(&user, item.id).await.unwrap(),
        VoteResult::Voted
    );
    assert_eq!(engine.list_open(&room()).await.unwrap().iter().next().unwrap().votes, 1);

    assert_eq!(
        engine.toggle_vote(&user, item.id).await.unwrap(),
        VoteResult::Unvoted
    );
    assert_eq!(engine.list_open(&room()).await.unwrap().iter().next().unwrap().votes, 0);
    assert_eq!(engine.vote_count(item.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_vote_on_unknown_item() {
    let engine = engine();
    let unknown = ItemId::from_value(404);

    let error = engine
        .toggle_vote(&UserId::new("john"), unknown)
        .await
        .unwrap_err();

    assert!(matches!(error, EngineError::ItemNotFound(id) if id == unknown));
    assert_eq!(
        engine.vote_count(unknown).await.unwrap_err().kind(),
        ErrorKind::ItemNotFound
    );
}

#[tokio::test]
async fn test_ranking_by_votes_then_age() {
    let engine = engine();

    let a = engine.submit(&room(), &url(1)).await.unwrap();
    let b = engine.submit(&room(), &url(2)).await.unwrap();
    let c = engine.submit(&room(), &url(3)).await.unwrap();

    for (item, voters) in [(&a, 3), (&b, 3), (&c, 5)] {
        for n in 0..voters {
            let user = UserId::new(format!("user{}", n));
            engine.toggle_vote(&user, item.id).await.unwrap();
        }
    }

    let ranking = engine.list_open(&room()).await.unwrap();
    let order: Vec<_> = ranking.iter().map(|i| (i.id, i.votes)).collect();

    assert_eq!(order, vec![(c.id, 5), (a.id, 3), (b.id, 3)]);
}

#[tokio::test]
async fn test_listing_for_viewer() {
    let engine = engine();
    let john = UserId::new("john");

    let first = engine.submit(&room(), &url(1)).await.unwrap();
    let second = engine.submit(&room(), &url(2)).await.unwrap();

    engine.toggle_vote(&john, second.id).await.unwrap();

    let listing = engine.list_open_for(&room(), &john).await.unwrap();

    assert_eq!(listing[0].item.id, second.id);
    assert!(listing[0].has_voted);
    assert_eq!(listing[1].item.id, first.id);
    assert!(!listing[1].has_voted);

    let listing = engine
        .list_open_for(&room(), &UserId::new("mary"))
        .await
        .unwrap();

    assert!(listing.iter().all(|i| !i.has_voted));
}

#[tokio::test]
async fn test_advance_walks_the_queue() {
    let engine = engine();

    let first = engine.submit(&room(), &url(1)).await.unwrap();
    let second = engine.submit(&room(), &url(2)).await.unwrap();

    assert_eq!(engine.get_active(&room()).await.unwrap(), None);

    let active = engine.advance(&room()).await.unwrap().unwrap();
    assert_eq!(active.id, first.id);
    assert_eq!(active.state, ItemState::Active);
    assert_eq!(engine.get_active(&room()).await.unwrap().map(|i| i.id), Some(first.id));

    // The active item is not part of the open listing
    let open = engine.list_open(&room()).await.unwrap();
    assert_eq!(open.iter().map(|i| i.id).collect::<Vec<_>>(), vec![second.id]);

    let active = engine.advance(&room()).await.unwrap().unwrap();
    assert_eq!(active.id, second.id);

    let stream = engine.active_stream(&room()).await.unwrap();
    assert_eq!(stream.state(), SelectorState::Playing(second.id));
    assert_eq!(stream.generation, 2);
}

#[tokio::test]
async fn test_advance_drains_to_idle() {
    let engine = engine();

    engine.submit(&room(), &url(1)).await.unwrap();
    engine.advance(&room()).await.unwrap();

    assert_eq!(engine.advance(&room()).await.unwrap(), None);

    let stream = engine.active_stream(&room()).await.unwrap();
    assert_eq!(stream.state(), SelectorState::Idle);
    assert_eq!(stream.generation, 2);

    // Nothing to retire and nothing to play, so nothing changes
    assert_eq!(engine.advance(&room()).await.unwrap(), None);
    assert_eq!(engine.active_stream(&room()).await.unwrap().generation, 2);
}

#[tokio::test]
async fn test_unknown_room() {
    let engine = engine();
    let nobody = RoomId::new("nobody");

    assert_eq!(
        engine.advance(&nobody).await.unwrap_err().kind(),
        ErrorKind::RoomNotFound
    );
    assert_eq!(
        engine.get_active(&nobody).await.unwrap_err().kind(),
        ErrorKind::RoomNotFound
    );
    assert_eq!(
        engine.list_open(&nobody).await.unwrap_err().kind(),
        ErrorKind::RoomNotFound
    );
}

#[tokio::test]
async fn test_played_items_are_final() {
    let engine = engine();
    let user = UserId::new("john");

    let item = engine.submit(&room(), &url(1)).await.unwrap();
    engine.toggle_vote(&user, item.id).await.unwrap();

    engine.advance(&room()).await.unwrap();
    engine.advance(&room()).await.unwrap();

    assert!(engine.list_open(&room()).await.unwrap().is_empty());
    assert_eq!(
        engine.toggle_vote(&user, item.id).await.unwrap_err().kind(),
        ErrorKind::ItemNotFound
    );

    let history = engine.store().history(&room()).await.unwrap();
    assert_eq!(history[0].state, ItemState::Played);

    // A played video can be queued again, as a new item
    let again = engine.submit(&room(), &url(1)).await.unwrap();
    assert_ne!(again.id, item.id);
    assert_eq!(again.votes, 0);
}

#[tokio::test]
async fn test_remove_cascades_votes() {
    let engine = engine();
    let user = UserId::new("john");

    let item = engine.submit(&room(), &url(1)).await.unwrap();
    engine.toggle_vote(&user, item.id).await.unwrap();

    engine.remove(item.id).await.unwrap();

    assert!(engine.list_open(&room()).await.unwrap().is_empty());
    assert!(engine.store().history(&room()).await.unwrap().is_empty());
    assert_eq!(
        engine.toggle_vote(&user, item.id).await.unwrap_err().kind(),
        ErrorKind::ItemNotFound
    );
    assert_eq!(
        engine.remove(item.id).await.unwrap_err().kind(),
        ErrorKind::ItemNotFound
    );
}

#[tokio::test]
async fn test_removing_the_active_item_idles_the_room() {
    let engine = engine();

    engine.submit(&room(), &url(1)).await.unwrap();
    let active = engine.advance(&room()).await.unwrap().unwrap();

    engine.remove(active.id).await.unwrap();

    let stream = engine.active_stream(&room()).await.unwrap();
    assert_eq!(stream.state(), SelectorState::Idle);
    assert_eq!(stream.generation, 2);
    assert_eq!(engine.get_active(&room()).await.unwrap(), None);
}

#[tokio::test]
async fn test_metadata_falls_back_to_placeholders() {
    let engine = Engine::new(config(), MemoryStore::new(), StubMetadata::failing());

    let item = engine.submit(&room(), &url(1)).await.unwrap();

    assert_eq!(item.title, Config::default().placeholder_title);
    assert_eq!(item.artwork.big, PLACEHOLDER);
    assert_eq!(item.artwork.small, PLACEHOLDER);
}

#[tokio::test]
async fn test_required_metadata() {
    let config = Config {
        require_metadata: true,
        ..config()
    };
    let engine = Engine::new(config, MemoryStore::new(), StubMetadata::failing());

    let error = engine.submit(&room(), &url(1)).await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::MetadataUnavailable);
    assert!(!error.kind().is_rejection());
    assert!(engine.list_open(&room()).await.is_err());
}

#[tokio::test]
async fn test_conflicts_are_retried() {
    let engine = Engine::new(config(), FaultyStore::default(), StubMetadata::default());

    engine.store().fail_commits(3);
    engine.submit(&room(), &url(1)).await.unwrap();

    let history = engine.store().inner.history(&room()).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let config = Config {
        conflict_retries: 2,
        ..config()
    };
    let engine = Engine::new(config, FaultyStore::default(), StubMetadata::default());

    engine.store().fail_commits(10);

    let error = engine.submit(&room(), &url(1)).await.unwrap_err();

    assert!(matches!(
        error,
        EngineError::ConcurrencyConflict { attempts: 3 }
    ));

    // None of the failed attempts left anything behind, not even the room
    engine.store().fail_commits(0);
    assert_eq!(
        engine.list_open(&room()).await.unwrap_err().kind(),
        ErrorKind::RoomNotFound
    );
}

#[tokio::test]
async fn test_rejected_first_submission_leaves_no_room() {
    let config = Config {
        max_queue_len: 0,
        ..config()
    };
    let engine = Engine::new(config, MemoryStore::new(), StubMetadata::default());

    assert_eq!(
        engine.submit(&room(), &url(1)).await.unwrap_err().kind(),
        ErrorKind::QueueFull
    );
    assert_eq!(
        engine.get_active(&room()).await.unwrap_err().kind(),
        ErrorKind::RoomNotFound
    );
    assert_eq!(
        engine.advance(&room()).await.unwrap_err().kind(),
        ErrorKind::RoomNotFound
    );
}

#[tokio::test]
async fn test_conflicted_first_submission_leaves_no_room() {
    let config = Config {
        conflict_retries: 0,
        ..config()
    };
    let engine = Engine::new(config, FaultyStore::default(), StubMetadata::default());

    engine.store().fail_commits(1);

    assert!(matches!(
        engine.submit(&room(), &url(1)).await.unwrap_err(),
        EngineError::ConcurrencyConflict { attempts: 1 }
    ));
    assert_eq!(
        engine.list_open(&room()).await.unwrap_err().kind(),
        ErrorKind::RoomNotFound
    );

    // The next submission creates it for real
    engine.submit(&room(), &url(1)).await.unwrap();
    assert_eq!(engine.list_open(&room()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_deadline_rolls_back() {
    let engine = Engine::new(config(), FaultyStore::default(), StubMetadata::default());

    engine.store().delay_commits(Duration::from_millis(500));

    let error = with_deadline(
        Duration::from_millis(50),
        engine.submit(&room(), &url(1)),
    )
    .await
    .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::DeadlineExceeded);
    assert_eq!(
        engine.list_open(&room()).await.unwrap_err().kind(),
        ErrorKind::RoomNotFound
    );

    // The room isn't left locked
    engine.store().delay_commits(Duration::ZERO);
    let item = with_deadline(Duration::from_secs(5), engine.submit(&room(), &url(1)))
        .await
        .unwrap();

    assert_eq!(item.external_id.as_str(), video_id(1));
}

#[tokio::test]
async fn test_store_faults_on_reads() {
    let engine = Engine::new(config(), FaultyStore::default(), StubMetadata::default());
    let item = engine.submit(&room(), &url(1)).await.unwrap();

    engine.store().fail_reads(true);

    // A broken store is not the same as a missing room or item
    assert_eq!(
        engine.list_open(&room()).await.unwrap_err().kind(),
        ErrorKind::Internal
    );
    assert_eq!(
        engine.vote_count(item.id).await.unwrap_err().kind(),
        ErrorKind::Internal
    );
    assert!(matches!(
        engine.toggle_vote(&UserId::new("john"), item.id).await,
        Err(EngineError::Store(StoreError::Internal(_)))
    ));

    engine.store().fail_reads(false);
    assert_eq!(engine.vote_count(item.id).await.unwrap(), 0);
}
