use serde::Serialize;

/// Default icon/title metadata for commonly named actions. Immutable and
/// process-wide; ids outside this table fall back to a computed title key.
fn defaults(id: &str) -> Option<(&'static str, &'static str)> {
    match id {
        "approve" => Some(("far-thumbs-up", "reviewables.actions.approve.title")),
        "reject" => Some(("far-thumbs-down", "reviewables.actions.reject.title")),
        _ => None,
    }
}

/// Per-call metadata overrides applied when adding an action.
#[derive(Debug, Clone, Default)]
pub struct ActionOverride {
    pub title: Option<String>,
    pub icon: Option<String>,
}

/// A fully resolved action offered to a reviewer. Ephemeral: rebuilt on
/// every `actions_for` call, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub id: String,
    /// Localizable title key, not resolved text.
    pub title: String,
    pub icon: Option<String>,
}

impl Action {
    /// Resolve metadata for an action on a reviewable of `kind`: the
    /// override wins, then the defaults table, then a title key computed
    /// from the kind.
    pub fn resolve(kind: &str, id: &str, overrides: Option<&ActionOverride>) -> Self {
        let default = defaults(id);

        let title = overrides
            .and_then(|o| o.title.clone())
            .or_else(|| default.map(|(_, title)| title.to_string()))
            .unwrap_or_else(|| format!("reviewables.{kind}.actions.{id}.title"));

        let icon = overrides
            .and_then(|o| o.icon.clone())
            .or_else(|| default.map(|(icon, _)| icon.to_string()));

        Self {
            id: id.to_string(),
            title,
            icon,
        }
    }
}

/// Insertion-ordered collection of the actions available on one reviewable
/// for one reviewer. Adding an id twice is a no-op.
#[derive(Debug, Clone, Default)]
pub struct ActionList {
    kind: String,
    actions: Vec<Action>,
}

impl ActionList {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            actions: Vec::new(),
        }
    }

    /// Append a resolved action with default metadata.
    pub fn add(&mut self, id: &str) {
        self.add_with(id, None);
    }

    /// Append a resolved action, applying overrides when given.
    pub fn add_with(&mut self, id: &str, overrides: Option<&ActionOverride>) {
        if self.has(id) {
            return;
        }
        self.actions.push(Action::resolve(&self.kind, id, overrides));
    }

    pub fn has(&self, id: &str) -> bool {
        self.actions.iter().any(|a| a.id == id)
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }
}
