//! Benchmarks for replica hot paths.
//!
//! The sync loop reapplies full snapshots every interval, so the no-op
//! resync path and the per-vote apply path dominate steady-state cost.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use votemesh_replica::{vote_trends, PollReplicaStore, VoteRecord};
use votemesh_types::{HybridTimestamp, NodeId, Poll, VoteEntry, VoterId};

const OPTIONS: usize = 4;

fn node(n: u128) -> NodeId {
    NodeId::from_uuid(uuid::Uuid::from_u128(n))
}

/// A poll with one vote per voter, timestamps spread over a few minutes.
fn poll_with_votes(voter_count: usize) -> Poll {
    let mut poll = Poll::new(
        "Which option?",
        (0..OPTIONS).map(|i| format!("Option {i}")).collect(),
        node(1),
    )
    .unwrap();
    for i in 0..voter_count {
        poll.votes.insert(
            VoterId::from(node(100 + i as u128)),
            VoteEntry::single(i % OPTIONS, HybridTimestamp::new(1_000 + i as u64 * 1_500, 0)),
        );
    }
    poll
}

// ============================================================================
// Snapshot apply benchmarks
// ============================================================================

fn bench_apply_snapshot_resync(c: &mut Criterion) {
    // Steady state: the store already holds everything the snapshot has.
    let snapshot = poll_with_votes(100);
    let mut store = PollReplicaStore::new(node(2));
    store.apply_remote_poll(snapshot.clone()).unwrap();

    c.bench_function("apply_snapshot_resync_100_voters", |b| {
        b.iter(|| {
            let _ = store.apply_remote_poll(black_box(snapshot.clone())).unwrap();
        });
    });
}

fn bench_adopt_snapshot(c: &mut Criterion) {
    let snapshot = poll_with_votes(100);

    c.bench_function("adopt_snapshot_100_voters", |b| {
        b.iter(|| {
            let mut store = PollReplicaStore::new(node(2));
            store.apply_remote_poll(black_box(snapshot.clone())).unwrap();
        });
    });
}

// ============================================================================
// Vote apply benchmarks
// ============================================================================

fn bench_apply_remote_vote(c: &mut Criterion) {
    let snapshot = poll_with_votes(100);
    let mut store = PollReplicaStore::new(node(2));
    store.apply_remote_poll(snapshot.clone()).unwrap();
    let voter = VoterId::from(node(100));

    c.bench_function("apply_remote_vote_100_voter_poll", |b| {
        // Each vote carries a newer timestamp so every apply takes the
        // replace path.
        let mut ts = 10_000_000_000u64;
        b.iter(|| {
            ts += 1;
            let vote = VoteRecord {
                poll_id: snapshot.id,
                voter_id: voter,
                option_index: (ts % OPTIONS as u64) as usize,
                selected: vec![(ts % OPTIONS as u64) as usize],
                timestamp: HybridTimestamp::new(ts, 0),
            };
            let _ = store.apply_remote_vote(black_box(vote)).unwrap();
        });
    });
}

fn bench_record_local_vote(c: &mut Criterion) {
    let snapshot = poll_with_votes(100);
    let mut store = PollReplicaStore::new(node(2));
    store.apply_remote_poll(snapshot.clone()).unwrap();
    let voter = store.voter_id();

    c.bench_function("record_local_vote_100_voter_poll", |b| {
        let mut option = 0usize;
        b.iter(|| {
            option = (option + 1) % OPTIONS;
            let _ = store
                .record_local_vote(black_box(snapshot.id), voter, black_box(option))
                .unwrap();
        });
    });
}

// ============================================================================
// Derived view benchmarks
// ============================================================================

fn bench_tally(c: &mut Criterion) {
    let snapshot = poll_with_votes(100);
    let mut store = PollReplicaStore::new(node(2));
    store.apply_remote_poll(snapshot.clone()).unwrap();

    c.bench_function("tally_100_voters", |b| {
        b.iter(|| {
            let _ = store.tally(black_box(&snapshot.id)).unwrap();
        });
    });
}

fn bench_vote_trends(c: &mut Criterion) {
    let poll = poll_with_votes(100);

    c.bench_function("vote_trends_100_voters", |b| {
        b.iter(|| {
            let _ = vote_trends(black_box(&poll));
        });
    });
}

// ============================================================================
// Criterion groups
// ============================================================================

criterion_group!(
    snapshot_benches,
    bench_apply_snapshot_resync,
    bench_adopt_snapshot,
);

criterion_group!(vote_benches, bench_apply_remote_vote, bench_record_local_vote,);

criterion_group!(derived_benches, bench_tally, bench_vote_trends,);

criterion_main!(snapshot_benches, vote_benches, derived_benches);
