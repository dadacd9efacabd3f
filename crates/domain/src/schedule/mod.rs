//! Schedule — the configured description of one named schedule.
//!
//! A schedule has a default state covering the whole day, an ordered list
//! of [`EventDefinition`]s layered on top of it, and optional extra
//! attributes, each of which forms its own independent axis with a default
//! value.

mod condition;
mod event;

pub use condition::Condition;
pub use event::{EventDefinition, EventDefinitionBuilder};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::id::ScheduleId;

/// A configured value before resolution: a literal or something the value
/// resolver port can render.
pub type RawValue = serde_json::Value;

pub const DEFAULT_NAME: &str = "Schedule State Sensor";
pub const DEFAULT_STATE: &str = "default";
pub const DEFAULT_ICON: &str = "mdi:calendar-clock";
pub const DEFAULT_ERROR_ICON: &str = "mdi:calendar-alert";

/// Configuration of one named schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleDefinition {
    pub name: String,
    /// State reported wherever no event applies.
    pub default_state: RawValue,
    /// Minutes after which the schedule is recompiled even without changes.
    pub refresh_minutes: u32,
    pub icon: String,
    /// Icon reported while any rule is in error.
    pub error_icon: String,
    /// Delay before a forced recompilation after an evaluation error.
    pub minutes_to_refresh_on_error: u32,
    /// Whether events may wrap past midnight unless they say otherwise.
    pub allow_wrap: bool,
    /// Extra attribute name → default value.
    pub extra_attributes: BTreeMap<String, RawValue>,
    pub events: Vec<EventDefinition>,
}

impl Default for ScheduleDefinition {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            default_state: RawValue::from(DEFAULT_STATE),
            refresh_minutes: 360,
            icon: DEFAULT_ICON.to_string(),
            error_icon: DEFAULT_ERROR_ICON.to_string(),
            minutes_to_refresh_on_error: 5,
            allow_wrap: false,
            extra_attributes: BTreeMap::new(),
            events: Vec::new(),
        }
    }
}

impl ScheduleDefinition {
    /// Create a builder for constructing a [`ScheduleDefinition`].
    #[must_use]
    pub fn builder() -> ScheduleDefinitionBuilder {
        ScheduleDefinitionBuilder::default()
    }

    /// Stable identifier derived from the name.
    #[must_use]
    pub fn id(&self) -> ScheduleId {
        ScheduleId::from_name(&self.name)
    }

    /// Names of the extra attribute axes, in a stable order.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.extra_attributes.keys().map(String::as_str)
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::EmptyName`] when `name` is blank.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.name.trim().is_empty() {
            return Err(ConfigurationError::EmptyName);
        }
        Ok(())
    }
}

/// Step-by-step builder for [`ScheduleDefinition`].
#[derive(Debug, Default)]
pub struct ScheduleDefinitionBuilder {
    definition: ScheduleDefinition,
}

impl ScheduleDefinitionBuilder {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.definition.name = name.into();
        self
    }

    #[must_use]
    pub fn default_state(mut self, state: impl Into<RawValue>) -> Self {
        self.definition.default_state = state.into();
        self
    }

    #[must_use]
    pub fn refresh_minutes(mut self, minutes: u32) -> Self {
        self.definition.refresh_minutes = minutes;
        self
    }

    #[must_use]
    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.definition.icon = icon.into();
        self
    }

    #[must_use]
    pub fn error_icon(mut self, icon: impl Into<String>) -> Self {
        self.definition.error_icon = icon.into();
        self
    }

    #[must_use]
    pub fn minutes_to_refresh_on_error(mut self, minutes: u32) -> Self {
        self.definition.minutes_to_refresh_on_error = minutes;
        self
    }

    #[must_use]
    pub fn allow_wrap(mut self, allow_wrap: bool) -> Self {
        self.definition.allow_wrap = allow_wrap;
        self
    }

    #[must_use]
    pub fn extra_attribute(
        mut self,
        name: impl Into<String>,
        default: impl Into<RawValue>,
    ) -> Self {
        self.definition
            .extra_attributes
            .insert(name.into(), default.into());
        self
    }

    #[must_use]
    pub fn event(mut self, event: EventDefinition) -> Self {
        self.definition.events.push(event);
        self
    }

    /// Consume the builder, validate, and return a [`ScheduleDefinition`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::EmptyName`] if the name is blank.
    pub fn build(self) -> Result<ScheduleDefinition, ConfigurationError> {
        self.definition.validate()?;
        Ok(self.definition)
    }
}
