//! Overrides — transient, explicitly requested rules.
//!
//! An override is layered after every configured event. It carries an
//! optional id (used to replace or remove it) and an absolute expiry after
//! which it is swept away.
//!
//! - [`OverrideResolver`] turns a `(start?, end?, duration?)` request into a
//!   concrete window relative to "now".
//! - [`OverrideStore`] keeps the ordered list of live overrides.
//! - [`Override`] is also the persisted shape: a flat mapping with `id`,
//!   `state`, `start`, `end`, `expires`, `icon` and any extra attributes.

mod resolver;
mod store;

pub use resolver::{OverrideResolver, ResolvedWindow};
pub use store::OverrideStore;

use std::collections::BTreeMap;

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, de};

use crate::attribute_value::AttributeValue;
use crate::interval::Interval;
use crate::schedule::{EventDefinition, RawValue};
use crate::time::{TimeOfDay, WallClock};

/// One live override. Never wraps: a wrapping request is stored as two
/// records sharing id and expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Override {
    #[serde(default)]
    pub id: Option<String>,
    pub state: String,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    #[serde(deserialize_with = "deserialize_expires")]
    pub expires: WallClock,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(flatten)]
    pub extra_attributes: BTreeMap<String, AttributeValue>,
}

impl Override {
    /// Whether the override has lapsed at `now`.
    #[must_use]
    pub fn is_expired(&self, now: WallClock) -> bool {
        now > self.expires
    }

    /// The window this record covers, `None` when degenerate.
    #[must_use]
    pub fn interval(&self) -> Option<Interval> {
        Interval::new(self.start, self.end)
    }

    /// The override as a literal event, ready to be layered like any other.
    #[must_use]
    pub fn to_event(&self) -> EventDefinition {
        EventDefinition {
            start: Some(RawValue::from(self.start.to_string())),
            end: Some(RawValue::from(self.end.to_string())),
            state: Some(RawValue::from(self.state.clone())),
            icon: self.icon.clone().map(RawValue::from),
            allow_wrap: Some(true),
            attributes: self
                .extra_attributes
                .iter()
                .map(|(k, v)| (k.clone(), RawValue::from(v.clone())))
                .collect(),
            ..EventDefinition::default()
        }
    }

    /// Encode into the persisted mapping.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if an attribute cannot be encoded.
    pub fn to_persisted(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Decode one persisted mapping. Unknown keys become extra attributes.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] when a required field is missing or
    /// malformed.
    pub fn from_persisted(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// Parse an expiry written either as a local naive datetime or with an offset.
fn parse_expires(s: &str) -> Option<WallClock> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

fn deserialize_expires<'de, D>(deserializer: D) -> Result<WallClock, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    parse_expires(&text).ok_or_else(|| de::Error::custom(format!("invalid expiry: {text}")))
}

/// A request to set an override, as received from a service call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub state: String,
    #[serde(default)]
    pub start: Option<TimeOfDay>,
    #[serde(default)]
    pub end: Option<TimeOfDay>,
    /// Minutes.
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub extra_attributes: BTreeMap<String, AttributeValue>,
}

impl OverrideRequest {
    /// A request for `state` with no window yet.
    #[must_use]
    pub fn for_state(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_start(mut self, start: TimeOfDay) -> Self {
        self.start = Some(start);
        self
    }

    #[must_use]
    pub fn with_end(mut self, end: TimeOfDay) -> Self {
        self.end = Some(end);
        self
    }

    #[must_use]
    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration = Some(minutes);
        self
    }

    #[must_use]
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    #[must_use]
    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.extra_attributes.insert(name.into(), value.into());
        self
    }
}
