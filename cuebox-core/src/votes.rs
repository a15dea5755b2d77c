use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::{ItemId, UserId};

/// A user's vote on a queue item. There's at most one per pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Vote {
    pub user_id: UserId,
    pub item_id: ItemId,
}

/// The outcome of toggling a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteResult {
    Voted,
    Unvoted,
}

/// The votes cast on a room's live items.
///
/// Counts are always derived from the set itself, there is no separate counter to drift.
#[derive(Debug, Clone, Default)]
pub struct VoteLedger {
    votes: HashMap<ItemId, HashSet<UserId>>,
}

impl VoteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_votes<I>(votes: I) -> Self
    where
        I: IntoIterator<Item = Vote>,
    {
        let mut ledger = Self::new();

        for vote in votes {
            ledger.insert(vote);
        }

        ledger
    }

    /// Adds the vote if absent and removes it if present, returning which happened.
    /// The caller is responsible for persisting the same change.
    pub fn toggle(&mut self, vote: Vote) -> VoteResult {
        if self.remove(&vote) {
            VoteResult::Unvoted
        } else {
            self.insert(vote);
            VoteResult::Voted
        }
    }

    pub fn count(&self, item_id: ItemId) -> u32 {
        self.votes
            .get(&item_id)
            .map(|voters| voters.len() as u32)
            .unwrap_or_default()
    }

    pub fn has_voted(&self, user_id: &UserId, item_id: ItemId) -> bool {
        self.votes
            .get(&item_id)
            .map(|voters| voters.contains(user_id))
            .unwrap_or(false)
    }

    /// Returns the users that voted on an item, in no particular order.
    pub fn votes_for(&self, item_id: ItemId) -> impl Iterator<Item = &UserId> + '_ {
        self.votes.get(&item_id).into_iter().flatten()
    }

    /// Drops every vote on an item, used when the item itself is deleted.
    pub fn remove_item(&mut self, item_id: ItemId) -> usize {
        self.votes
            .remove(&item_id)
            .map(|voters| voters.len())
            .unwrap_or_default()
    }

    /// Returns the total number of votes in the ledger.
    pub fn len(&self) -> usize {
        self.votes.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Vote> + '_ {
        self.votes.iter().flat_map(|(item_id, voters)| {
            voters.iter().map(|user_id| Vote {
                user_id: user_id.clone(),
                item_id: *item_id,
            })
        })
    }

    /// Adds a vote, returning false if the pair already voted.
    pub fn insert(&mut self, vote: Vote) -> bool {
        self.votes
            .entry(vote.item_id)
            .or_default()
            .insert(vote.user_id)
    }

    /// Removes a vote, returning false if there was none.
    pub fn remove(&mut self, vote: &Vote) -> bool {
        let Some(voters) = self.votes.get_mut(&vote.item_id) else {
            return false;
        };

        let removed = voters.remove(&vote.user_id);

        if voters.is_empty() {
            self.votes.remove(&vote.item_id);
        }

        removed
    }
}
