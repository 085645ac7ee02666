use std::collections::HashSet;
use std::str::FromStr;
use votemesh_types::{NodeId, PollId, VoterId};

// ── NodeId ───────────────────────────────────────────────────────

#[test]
fn node_id_new_is_unique() {
    let a = NodeId::new();
    let b = NodeId::new();
    assert_ne!(a, b);
}

#[test]
fn node_id_from_uuid_roundtrip() {
    let uuid = uuid::Uuid::new_v4();
    let id = NodeId::from_uuid(uuid);
    assert_eq!(id.as_uuid(), uuid);
}

#[test]
fn node_id_display_and_parse() {
    let id = NodeId::new();
    let s = id.to_string();
    let parsed = NodeId::parse(&s).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn node_id_from_str() {
    let id = NodeId::new();
    let parsed = NodeId::from_str(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn node_id_parse_invalid() {
    assert!(NodeId::parse("not-a-uuid").is_err());
}

#[test]
fn node_id_raw_matches_uuid() {
    let uuid = uuid::Uuid::new_v4();
    let id = NodeId::from_uuid(uuid);
    assert_eq!(id.raw(), uuid.as_u128());
}

#[test]
fn node_id_raw_xor_self_is_zero() {
    let id = NodeId::new();
    assert_eq!(id.raw() ^ id.raw(), 0);
}

#[test]
fn node_id_serializes_as_plain_string() {
    let id = NodeId::new();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{id}\""));
}

// ── PollId ───────────────────────────────────────────────────────

#[test]
fn poll_id_new_is_unique() {
    let mut seen = HashSet::new();
    for _ in 0..100 {
        assert!(seen.insert(PollId::new()));
    }
}

#[test]
fn poll_id_display_and_parse() {
    let id = PollId::new();
    let parsed = PollId::parse(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn poll_id_from_str_invalid() {
    assert!(PollId::from_str("garbage").is_err());
}

#[test]
fn poll_id_serde_roundtrip() {
    let id = PollId::new();
    let json = serde_json::to_string(&id).unwrap();
    let back: PollId = serde_json::from_str(&json).unwrap();
    assert_eq!(id, back);
}

// ── VoterId ──────────────────────────────────────────────────────

#[test]
fn voter_id_new_is_unique() {
    assert_ne!(VoterId::new(), VoterId::new());
}

#[test]
fn voter_id_from_node_id_preserves_uuid() {
    let node = NodeId::new();
    let voter = VoterId::from(node);
    assert_eq!(voter.as_uuid(), node.as_uuid());
}

#[test]
fn voter_id_display_and_parse() {
    let id = VoterId::new();
    let parsed = VoterId::parse(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn voter_id_usable_as_map_key() {
    let mut map = std::collections::HashMap::new();
    let id = VoterId::new();
    map.insert(id, 1);
    map.insert(id, 2);
    assert_eq!(map.len(), 1);
    assert_eq!(map[&id], 2);
}
