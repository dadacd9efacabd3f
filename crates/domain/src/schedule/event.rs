//! Event — one declarative, time-windowed rule of a schedule.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use super::{Condition, RawValue};

/// A configured rule: while its window is active (and its condition holds),
/// the schedule reports `state` and the event's attribute values.
///
/// Every value field is raw: it may be a literal or something the value
/// resolver port knows how to render. Keys that are not one of the named
/// fields are values for the schedule's extra attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<RawValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<RawValue>,
    /// Minutes added to the resolved start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_offset: Option<RawValue>,
    /// Minutes added to the resolved end.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_offset: Option<RawValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<RawValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub condition: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<RawValue>,
    /// Overrides the schedule-wide wraparound setting for this event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_wrap: Option<bool>,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, RawValue>,
}

impl EventDefinition {
    /// Create a builder for constructing an [`EventDefinition`].
    #[must_use]
    pub fn builder() -> EventDefinitionBuilder {
        EventDefinitionBuilder::default()
    }
}

/// Step-by-step builder for [`EventDefinition`].
#[derive(Debug, Default)]
pub struct EventDefinitionBuilder {
    event: EventDefinition,
}

impl EventDefinitionBuilder {
    #[must_use]
    pub fn start(mut self, start: impl Into<RawValue>) -> Self {
        self.event.start = Some(start.into());
        self
    }

    #[must_use]
    pub fn end(mut self, end: impl Into<RawValue>) -> Self {
        self.event.end = Some(end.into());
        self
    }

    #[must_use]
    pub fn start_offset(mut self, minutes: impl Into<RawValue>) -> Self {
        self.event.start_offset = Some(minutes.into());
        self
    }

    #[must_use]
    pub fn end_offset(mut self, minutes: impl Into<RawValue>) -> Self {
        self.event.end_offset = Some(minutes.into());
        self
    }

    #[must_use]
    pub fn state(mut self, state: impl Into<RawValue>) -> Self {
        self.event.state = Some(state.into());
        self
    }

    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.event.comment = Some(comment.into());
        self
    }

    #[must_use]
    pub fn condition(mut self, condition: Condition) -> Self {
        self.event.condition.push(condition);
        self
    }

    #[must_use]
    pub fn icon(mut self, icon: impl Into<RawValue>) -> Self {
        self.event.icon = Some(icon.into());
        self
    }

    #[must_use]
    pub fn allow_wrap(mut self, allow_wrap: bool) -> Self {
        self.event.allow_wrap = Some(allow_wrap);
        self
    }

    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.event.attributes.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn build(self) -> EventDefinition {
        self.event
    }
}

/// Accept either a single condition or a list of them.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<Condition>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(Box<Condition>),
        Many(Vec<Condition>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(condition) => vec![*condition],
        OneOrMany::Many(conditions) => conditions,
    })
}
