//! JSON shapes consumed by the HTTP layer.
//!
//! The queue does no routing or rendering of its own; this module is the
//! contract the web layer consumes: the list body with its deduplicated
//! action descriptors, the perform-result body, and the status-code
//! mapping for queue errors.

use serde_json::{json, Map, Value};

use crate::actions::Action;
use crate::errors::Error;
use crate::models::PerformResult;
use crate::queue::ReviewableView;
use crate::types::{ReviewableType, TypeRegistry};

/// Render the list endpoint body.
///
/// Each item carries its action ids; the full descriptors are collected
/// once, deduplicated by id, in the top-level `reviewable_actions` array.
/// The target id is surfaced under a derived `<kind>_id` key, and the
/// item type's declared subject fields are flattened into the item body.
pub fn render_list(views: &[ReviewableView], registry: &TypeRegistry) -> Value {
    let mut reviewables = Vec::with_capacity(views.len());
    let mut descriptors: Vec<Action> = Vec::new();

    for view in views {
        let r = &view.reviewable;
        let mut item = Map::new();

        item.insert("id".to_string(), json!(r.id));
        item.insert("status".to_string(), json!(r.status.as_i16()));
        item.insert("type".to_string(), json!(r.kind));
        item.insert("payload".to_string(), Value::Object(r.payload.clone()));
        item.insert("created_at".to_string(), json!(r.created_at));

        if let Some(target) = &r.target {
            item.insert(format!("{}_id", target.kind), json!(target.id));
        }

        if let (Some(Value::Object(subject)), Some(rtype)) =
            (&view.subject, registry.get(&r.kind))
        {
            for field in rtype.flattened_target_fields() {
                if let Some(value) = subject.get(*field) {
                    item.insert((*field).to_string(), value.clone());
                }
            }
        }

        let action_ids: Vec<&str> = view
            .actions
            .actions()
            .iter()
            .map(|a| a.id.as_str())
            .collect();
        item.insert("reviewable_actions".to_string(), json!(action_ids));

        for action in view.actions.actions() {
            if !descriptors.iter().any(|a| a.id == action.id) {
                descriptors.push(action.clone());
            }
        }

        reviewables.push(Value::Object(item));
    }

    json!({
        "reviewables": reviewables,
        "reviewable_actions": descriptors,
    })
}

/// Render the perform endpoint body.
pub fn render_perform_result(result: &PerformResult) -> Value {
    json!({
        "reviewable_perform_result": {
            "success": result.is_success(),
            "transition_to": result.transition_to.map(|s| s.as_str()),
            "transition_to_id": result.transition_to.map(|s| s.as_i16()),
        }
    })
}

/// Status code contract for the excluded web layer: denials are 403,
/// invisible or missing items 404, backend faults 500.
pub fn http_status(error: &Error) -> u16 {
    match error {
        Error::NotFound => 404,
        Error::NotAuthorized(_) | Error::UnsupportedAction { .. } => 403,
        Error::Store(_) => 500,
    }
}
