//! Reusable poll blueprints.
//!
//! Three built-ins ship with every node; users add their own under
//! `custom-` prefixed ids. Templates are local convenience data and never
//! replicate; instantiating one goes through the normal poll creation
//! path with a fresh id.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use votemesh_types::PollSettings;

/// Prefix for user-created template ids.
pub const CUSTOM_TEMPLATE_PREFIX: &str = "custom-";

const BUILTIN_IDS: [&str; 3] = ["event-planning", "team-decision", "meeting-time"];

/// A named poll blueprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollTemplate {
    pub id: String,
    pub name: String,
    pub question: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub settings: PollSettings,
}

impl PollTemplate {
    /// True if this is one of the built-in templates.
    #[must_use]
    pub fn is_builtin(&self) -> bool {
        BUILTIN_IDS.contains(&self.id.as_str())
    }
}

/// The templates every node starts with.
#[must_use]
pub fn builtin_templates() -> Vec<PollTemplate> {
    vec![
        PollTemplate {
            id: "event-planning".into(),
            name: "Event Planning".into(),
            question: "When should we schedule our next event?".into(),
            options: vec![
                "Next Monday afternoon".into(),
                "Next Tuesday evening".into(),
                "Next Saturday morning".into(),
                "Next Sunday afternoon".into(),
            ],
            settings: PollSettings::default(),
        },
        PollTemplate {
            id: "team-decision".into(),
            name: "Team Decision".into(),
            question: "What should be our next project priority?".into(),
            options: vec![
                "Feature Development".into(),
                "Bug Fixes".into(),
                "Documentation".into(),
                "Testing".into(),
            ],
            settings: PollSettings::default(),
        },
        PollTemplate {
            id: "meeting-time".into(),
            name: "Meeting Time".into(),
            question: "What time works best for our regular meetings?".into(),
            options: vec![
                "9:00 AM".into(),
                "2:00 PM".into(),
                "4:00 PM".into(),
                "5:00 PM".into(),
            ],
            settings: PollSettings::default(),
        },
    ]
}

/// The node's template collection, seeded with the built-ins.
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    templates: BTreeMap<String, PollTemplate>,
}

impl TemplateCatalog {
    /// Creates a catalog holding the built-in templates.
    #[must_use]
    pub fn new() -> Self {
        let templates = builtin_templates()
            .into_iter()
            .map(|template| (template.id.clone(), template))
            .collect();
        Self { templates }
    }

    /// Looks up a template by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&PollTemplate> {
        self.templates.get(id)
    }

    /// Saves a template, assigning a `custom-` id when none is given.
    /// Saving under an existing id replaces it. Returns the stored id.
    pub fn save(&mut self, mut template: PollTemplate) -> String {
        if template.id.is_empty() {
            template.id = format!("{CUSTOM_TEMPLATE_PREFIX}{}", Uuid::now_v7());
        }
        let id = template.id.clone();
        self.templates.insert(id.clone(), template);
        id
    }

    /// Removes a custom template. Built-ins are never removed; returns
    /// false for them and for unknown ids.
    pub fn remove(&mut self, id: &str) -> bool {
        if BUILTIN_IDS.contains(&id) {
            return false;
        }
        self.templates.remove(id).is_some()
    }

    /// All templates in stable id order.
    #[must_use]
    pub fn list(&self) -> Vec<&PollTemplate> {
        self.templates.values().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::new()
    }
}
