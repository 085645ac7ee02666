//! Deterministic poll merge rules.
//!
//! Two replicas holding the same poll id converge by merging field-wise:
//! the copy with the earlier `created_at` is authoritative for the
//! immutable fields, and the vote map merges entry-by-entry with
//! last-writer-wins per voter. Per-voter resolution bounds the blast
//! radius of a stale snapshot to exactly the voters whose entry is
//! actually older.
//!
//! The merge is commutative, associative and idempotent, so replicas may
//! apply snapshots in any order, any number of times.

use std::collections::HashMap;

use votemesh_types::{Poll, VoteEntry, VoterId};

/// True if `incoming` should replace `current` for one voter's entry.
///
/// Higher timestamp wins. On an exact timestamp tie the lexically greater
/// selection wins (arbitrary but deterministic, so both sides agree).
pub(crate) fn entry_wins(incoming: &VoteEntry, current: &VoteEntry) -> bool {
    match incoming.timestamp.cmp(&current.timestamp) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => incoming.selected > current.selected,
    }
}

/// True if `incoming`'s immutable fields win over `current`'s.
///
/// Earlier creation wins; a `created_at` tie falls back to the smaller
/// creator id so the rule stays symmetric.
fn fields_win(incoming: &Poll, current: &Poll) -> bool {
    match incoming.created_at.cmp(&current.created_at) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Greater => false,
        std::cmp::Ordering::Equal => incoming.creator_id.as_uuid() < current.creator_id.as_uuid(),
    }
}

/// Merges the vote maps of two copies of one poll, last-writer-wins per
/// voter key.
pub(crate) fn merge_votes(
    current: &HashMap<VoterId, VoteEntry>,
    incoming: &HashMap<VoterId, VoteEntry>,
) -> HashMap<VoterId, VoteEntry> {
    let mut merged = current.clone();
    for (voter, entry) in incoming {
        match merged.get(voter) {
            Some(existing) if !entry_wins(entry, existing) => {}
            _ => {
                merged.insert(*voter, entry.clone());
            }
        }
    }
    merged
}

/// Produces the merged form of two copies of one poll.
///
/// The result re-normalizes every vote entry and drops entries that
/// reference an option index outside the authoritative option list, so a
/// malformed copy can never poison the replica.
pub(crate) fn merged_poll(current: &Poll, incoming: &Poll) -> Poll {
    let base = if fields_win(incoming, current) {
        incoming
    } else {
        current
    };

    let mut merged = Poll {
        id: base.id,
        question: base.question.clone(),
        options: base.options.clone(),
        created_at: base.created_at,
        creator_id: base.creator_id,
        settings: base.settings,
        votes: merge_votes(&current.votes, &incoming.votes),
    };
    merged.votes = sanitize_votes(merged.votes, merged.options.len());
    merged
}

/// Re-normalizes entries and drops any referencing an out-of-range index.
pub(crate) fn sanitize_votes(
    votes: HashMap<VoterId, VoteEntry>,
    option_count: usize,
) -> HashMap<VoterId, VoteEntry> {
    votes
        .into_iter()
        .filter(|(_, entry)| entry.selected.iter().all(|&index| index < option_count))
        .map(|(voter, entry)| (voter, VoteEntry::new(entry.selected, entry.timestamp)))
        .collect()
}
