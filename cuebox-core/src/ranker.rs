use std::cmp::Ordering;

use serde::Serialize;

use crate::{ItemState, QueueItem, RoomSnapshot, UserId};

/// The open items of a room, best first.
///
/// Ranked by votes, then by submission time, then by id, so the order never depends on how
/// the store happened to return the rows. A ranking is computed from a snapshot and never
/// updated, ask for a new one to see newer votes.
#[derive(Debug, Clone, Default)]
pub struct Ranking {
    items: Vec<QueueItem>,
}

/// A ranked item as seen by a specific user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerItem {
    #[serde(flatten)]
    pub item: QueueItem,
    pub has_voted: bool,
}

impl Ranking {
    pub fn rank(snapshot: &RoomSnapshot) -> Self {
        let mut items: Vec<_> = snapshot
            .items
            .iter()
            .filter(|i| i.state == ItemState::Open)
            .map(|i| snapshot.counted(i.clone()))
            .collect();

        items.sort_by(compare_items);

        Self { items }
    }

    /// Ranks the snapshot and marks the items the given user voted on.
    pub fn for_viewer(snapshot: &RoomSnapshot, viewer: &UserId) -> Vec<ViewerItem> {
        Self::rank(snapshot)
            .into_iter()
            .map(|item| ViewerItem {
                has_voted: snapshot.has_voted(viewer, item.id),
                item,
            })
            .collect()
    }

    /// Returns the item that would be played next.
    pub fn head(&self) -> Option<&QueueItem> {
        self.items.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, QueueItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<QueueItem> {
        self.items
    }
}

impl IntoIterator for Ranking {
    type Item = QueueItem;
    type IntoIter = std::vec::IntoIter<QueueItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Ranking {
    type Item = &'a QueueItem;
    type IntoIter = std::slice::Iter<'a, QueueItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

fn compare_items(a: &QueueItem, b: &QueueItem) -> Ordering {
    b.votes
        .cmp(&a.votes)
        .then_with(|| a.submitted_at.cmp(&b.submitted_at))
        .then_with(|| a.id.cmp(&b.id))
}
