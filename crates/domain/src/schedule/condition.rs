//! Condition — a guard that must hold for an event to apply.

use serde::{Deserialize, Serialize};

use crate::time::TimeOfDay;

/// A predicate guarding an event.
///
/// The engine never evaluates conditions itself; they are handed to a
/// condition evaluator port. All conditions of an event must hold
/// (logical AND).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum Condition {
    /// Requires an entity to be in a given state.
    State {
        entity_id: String,
        /// Expected state value, e.g. `"on"`, `"home"`.
        state: String,
    },
    /// Requires the current time to be within a window.
    Time {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        after: Option<TimeOfDay>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        before: Option<TimeOfDay>,
    },
    /// A template that must render to a truthy value.
    Template { value_template: String },
    /// Holds when none of the nested conditions hold.
    Not { conditions: Vec<Condition> },
}

impl Condition {
    /// Entity ids named directly by this condition (templates excluded).
    #[must_use]
    pub fn referenced_entities(&self) -> Vec<&str> {
        match self {
            Self::State { entity_id, .. } => vec![entity_id.as_str()],
            Self::Not { conditions } => conditions
                .iter()
                .flat_map(Self::referenced_entities)
                .collect(),
            Self::Time { .. } | Self::Template { .. } => Vec::new(),
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::State { entity_id, state } => write!(f, "state({entity_id}, {state})"),
            Self::Time { after, before } => {
                let after = after.map_or_else(|| "-".to_string(), |t| t.to_string());
                let before = before.map_or_else(|| "-".to_string(), |t| t.to_string());
                write!(f, "time({after}..{before})")
            }
            Self::Template { value_template } => write!(f, "template({value_template})"),
            Self::Not { conditions } => write!(f, "not({} conditions)", conditions.len()),
        }
    }
}
