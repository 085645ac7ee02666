//! Wire format tests for the mesh protocol.
//!
//! Envelopes use a `{type, payload}` JSON shape with SCREAMING_SNAKE
//! type tags and camelCase payload fields. These shapes are what remote
//! peers parse, so they are pinned down literally here.

use pretty_assertions::assert_eq;
use serde_json::json;
use uuid::Uuid;
use votemesh_replica::VoteRecord;
use votemesh_sync::{
    Envelope, ErrorMessage, RequestPollMessage, SyncRequestMessage, SyncResponseMessage,
    VoteMessage,
};
use votemesh_types::{HybridTimestamp, NodeId, Poll, PollId, VoterId};

fn node(n: u128) -> NodeId {
    NodeId::from_uuid(Uuid::from_u128(n))
}

fn poll_id(n: u128) -> PollId {
    PollId::from_uuid(Uuid::from_u128(n))
}

fn voter(n: u128) -> VoterId {
    VoterId::from_uuid(Uuid::from_u128(n))
}

fn sample_poll() -> Poll {
    Poll::new(
        "Lunch spot?",
        vec!["Ramen".into(), "Tacos".into()],
        node(1),
    )
    .unwrap()
}

// ── Type tags ────────────────────────────────────────────────────────

#[test]
fn kind_matches_the_wire_tag() {
    let cases = [
        (
            Envelope::RequestPoll(RequestPollMessage { poll_id: poll_id(1) }),
            "REQUEST_POLL",
        ),
        (Envelope::PollSnapshot(sample_poll()), "POLL_SNAPSHOT"),
        (
            Envelope::Vote(VoteMessage {
                poll_id: poll_id(1),
                voter_id: voter(2),
                option_index: 0,
                selected: Some(vec![0]),
                timestamp: HybridTimestamp::new(1, 0),
            }),
            "VOTE",
        ),
        (
            Envelope::SyncRequest(SyncRequestMessage {
                known_poll_ids: vec![],
            }),
            "SYNC_REQUEST",
        ),
        (
            Envelope::SyncResponse(SyncResponseMessage { polls: vec![] }),
            "SYNC_RESPONSE",
        ),
        (
            Envelope::Error(ErrorMessage::new("OOPS", "something broke")),
            "ERROR",
        ),
    ];
    for (envelope, expected) in cases {
        assert_eq!(envelope.kind(), expected);
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["type"], expected);
    }
}

// ── Payload shapes ───────────────────────────────────────────────────

#[test]
fn request_poll_wire_shape() {
    let envelope = Envelope::RequestPoll(RequestPollMessage { poll_id: poll_id(7) });
    assert_eq!(
        serde_json::to_value(&envelope).unwrap(),
        json!({
            "type": "REQUEST_POLL",
            "payload": { "pollId": "00000000-0000-0000-0000-000000000007" },
        })
    );
}

#[test]
fn vote_wire_shape() {
    let envelope = Envelope::Vote(VoteMessage {
        poll_id: poll_id(7),
        voter_id: voter(9),
        option_index: 1,
        selected: Some(vec![0, 1]),
        timestamp: HybridTimestamp::new(1_700_000_000_000, 3),
    });
    assert_eq!(
        serde_json::to_value(&envelope).unwrap(),
        json!({
            "type": "VOTE",
            "payload": {
                "pollId": "00000000-0000-0000-0000-000000000007",
                "voterId": "00000000-0000-0000-0000-000000000009",
                "optionIndex": 1,
                "selected": [0, 1],
                "timestamp": { "wallTime": 1_700_000_000_000u64, "logical": 3 },
            },
        })
    );
}

#[test]
fn sync_request_wire_shape() {
    let envelope = Envelope::SyncRequest(SyncRequestMessage {
        known_poll_ids: vec![poll_id(7), poll_id(8)],
    });
    assert_eq!(
        serde_json::to_value(&envelope).unwrap(),
        json!({
            "type": "SYNC_REQUEST",
            "payload": {
                "knownPollIds": [
                    "00000000-0000-0000-0000-000000000007",
                    "00000000-0000-0000-0000-000000000008",
                ],
            },
        })
    );
}

#[test]
fn error_wire_shape() {
    let envelope = Envelope::Error(ErrorMessage::poll_not_found(&poll_id(5)));
    assert_eq!(
        serde_json::to_value(&envelope).unwrap(),
        json!({
            "type": "ERROR",
            "payload": {
                "code": "POLL_NOT_FOUND",
                "message": "poll not found: 00000000-0000-0000-0000-000000000005",
            },
        })
    );
}

#[test]
fn poll_snapshot_payload_is_the_poll_itself() {
    let poll = sample_poll();
    let value = serde_json::to_value(&Envelope::PollSnapshot(poll.clone())).unwrap();
    assert_eq!(value["type"], "POLL_SNAPSHOT");
    assert_eq!(value["payload"], serde_json::to_value(&poll).unwrap());
    assert_eq!(value["payload"]["question"], "Lunch spot?");
    assert_eq!(value["payload"]["options"], json!(["Ramen", "Tacos"]));
    assert_eq!(value["payload"]["settings"]["multipleChoice"], false);

    let decoded: Envelope = serde_json::from_value(value).unwrap();
    assert_eq!(decoded, Envelope::PollSnapshot(poll));
}

#[test]
fn sync_response_carries_full_snapshots() {
    let poll = sample_poll();
    let envelope = Envelope::SyncResponse(SyncResponseMessage {
        polls: vec![poll.clone()],
    });
    let value = serde_json::to_value(&envelope).unwrap();
    assert_eq!(value["payload"]["polls"][0], serde_json::to_value(&poll).unwrap());

    let decoded: Envelope = serde_json::from_value(value).unwrap();
    assert_eq!(decoded, envelope);
}

// ── Vote selection semantics ─────────────────────────────────────────

#[test]
fn vote_without_selection_defaults_to_the_acted_option() {
    let value = json!({
        "type": "VOTE",
        "payload": {
            "pollId": "00000000-0000-0000-0000-000000000001",
            "voterId": "00000000-0000-0000-0000-000000000002",
            "optionIndex": 2,
            "timestamp": { "wallTime": 5, "logical": 0 },
        },
    });
    let envelope: Envelope = serde_json::from_value(value).unwrap();
    let Envelope::Vote(message) = envelope else {
        panic!("expected a vote");
    };
    assert_eq!(message.selected, None);

    let record = message.into_record();
    assert_eq!(record.option_index, 2);
    assert_eq!(record.selected, vec![2]);
}

#[test]
fn empty_selection_is_a_retraction_not_a_fallback() {
    let message = VoteMessage {
        poll_id: poll_id(1),
        voter_id: voter(2),
        option_index: 0,
        selected: Some(vec![]),
        timestamp: HybridTimestamp::new(5, 0),
    };
    assert!(message.into_record().selected.is_empty());
}

#[test]
fn from_record_round_trips_the_full_selection() {
    let record = VoteRecord {
        poll_id: poll_id(1),
        voter_id: voter(2),
        option_index: 1,
        selected: vec![0, 1],
        timestamp: HybridTimestamp::new(9, 1),
    };
    let message = VoteMessage::from_record(&record);
    assert_eq!(message.selected.as_deref(), Some(&[0, 1][..]));
    assert_eq!(message.into_record(), record);
}

#[test]
fn absent_selection_is_omitted_from_the_wire() {
    let message = VoteMessage {
        poll_id: poll_id(1),
        voter_id: voter(2),
        option_index: 0,
        selected: None,
        timestamp: HybridTimestamp::new(5, 0),
    };
    let value = serde_json::to_value(&message).unwrap();
    assert!(value.get("selected").is_none());
}

// ── Malformed input ──────────────────────────────────────────────────

#[test]
fn unknown_type_tags_are_rejected() {
    let value = json!({ "type": "GOSSIP", "payload": {} });
    assert!(serde_json::from_value::<Envelope>(value).is_err());
}

#[test]
fn missing_payload_is_rejected() {
    let value = json!({ "type": "VOTE" });
    assert!(serde_json::from_value::<Envelope>(value).is_err());
}

#[test]
fn garbage_bytes_are_rejected() {
    assert!(serde_json::from_slice::<Envelope>(b"not json").is_err());
    assert!(serde_json::from_slice::<Envelope>(b"[1, 2, 3]").is_err());
}

#[test]
fn unknown_payload_fields_are_tolerated() {
    // Older peers must keep parsing envelopes from newer ones.
    let value = json!({
        "type": "REQUEST_POLL",
        "payload": {
            "pollId": "00000000-0000-0000-0000-000000000007",
            "origin": "relay",
        },
    });
    assert!(serde_json::from_value::<Envelope>(value).is_ok());
}
