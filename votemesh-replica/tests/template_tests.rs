use pretty_assertions::assert_eq;
use votemesh_replica::{PollTemplate, TemplateCatalog, CUSTOM_TEMPLATE_PREFIX};
use votemesh_types::PollSettings;

fn custom(name: &str) -> PollTemplate {
    PollTemplate {
        id: String::new(),
        name: name.into(),
        question: "Where should we go?".into(),
        options: vec!["North".into(), "South".into()],
        settings: PollSettings::default(),
    }
}

// ── Built-ins ────────────────────────────────────────────────────

#[test]
fn catalog_is_seeded_with_builtins() {
    let catalog = TemplateCatalog::new();
    assert_eq!(catalog.len(), 3);
    for id in ["event-planning", "team-decision", "meeting-time"] {
        let template = catalog.get(id).expect("missing built-in");
        assert!(template.is_builtin());
        assert_eq!(template.id, id);
    }
}

#[test]
fn event_planning_builtin_has_expected_content() {
    let catalog = TemplateCatalog::new();
    let template = catalog.get("event-planning").unwrap();
    assert_eq!(template.name, "Event Planning");
    assert_eq!(template.question, "When should we schedule our next event?");
    assert_eq!(
        template.options,
        vec![
            "Next Monday afternoon",
            "Next Tuesday evening",
            "Next Saturday morning",
            "Next Sunday afternoon",
        ]
    );
}

#[test]
fn list_returns_templates_in_stable_id_order() {
    let catalog = TemplateCatalog::new();
    let ids: Vec<&str> = catalog.list().iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["event-planning", "meeting-time", "team-decision"]);
}

// ── Saving ───────────────────────────────────────────────────────

#[test]
fn save_assigns_a_custom_id_when_none_given() {
    let mut catalog = TemplateCatalog::new();
    let id = catalog.save(custom("Trip"));

    assert!(id.starts_with(CUSTOM_TEMPLATE_PREFIX));
    assert_eq!(catalog.len(), 4);

    let saved = catalog.get(&id).unwrap();
    assert_eq!(saved.name, "Trip");
    assert!(!saved.is_builtin());
}

#[test]
fn save_with_existing_id_replaces() {
    let mut catalog = TemplateCatalog::new();
    let id = catalog.save(custom("Trip"));

    let mut revised = custom("Trip, revised");
    revised.id = id.clone();
    let second_id = catalog.save(revised);

    assert_eq!(second_id, id);
    assert_eq!(catalog.len(), 4);
    assert_eq!(catalog.get(&id).unwrap().name, "Trip, revised");
}

#[test]
fn each_save_mints_a_distinct_id() {
    let mut catalog = TemplateCatalog::new();
    let first = catalog.save(custom("One"));
    let second = catalog.save(custom("Two"));
    assert_ne!(first, second);
    assert_eq!(catalog.len(), 5);
}

// ── Removal ──────────────────────────────────────────────────────

#[test]
fn builtins_cannot_be_removed() {
    let mut catalog = TemplateCatalog::new();
    assert!(!catalog.remove("event-planning"));
    assert!(catalog.get("event-planning").is_some());
    assert_eq!(catalog.len(), 3);
}

#[test]
fn custom_template_removal_is_once_only() {
    let mut catalog = TemplateCatalog::new();
    let id = catalog.save(custom("Trip"));

    assert!(catalog.remove(&id));
    assert!(catalog.get(&id).is_none());
    assert!(!catalog.remove(&id));
}

#[test]
fn removing_an_unknown_id_returns_false() {
    let mut catalog = TemplateCatalog::new();
    assert!(!catalog.remove("custom-nonexistent"));
}

// ── Serde ────────────────────────────────────────────────────────

#[test]
fn template_deserializes_without_settings() {
    let json = r#"{
        "id": "custom-abc",
        "name": "Bare",
        "question": "Which one?",
        "options": ["A", "B"]
    }"#;
    let template: PollTemplate = serde_json::from_str(json).unwrap();
    assert_eq!(template.settings, PollSettings::default());
}

#[test]
fn default_catalog_matches_new() {
    let ids: Vec<String> = TemplateCatalog::default()
        .list()
        .iter()
        .map(|t| t.id.clone())
        .collect();
    let expected: Vec<String> = TemplateCatalog::new()
        .list()
        .iter()
        .map(|t| t.id.clone())
        .collect();
    assert_eq!(ids, expected);
}
