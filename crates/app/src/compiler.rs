//! Schedule compiler — turns a definition plus live overrides into partitions.
//!
//! One compilation pass seeds every axis with its default, then layers each
//! configured event in declaration order and each override in insertion
//! order. Items whose guard is false are skipped; items that fail to evaluate
//! are skipped too, but their state is recorded as an error-state and a
//! forced refresh is scheduled.

use std::collections::{BTreeMap, BTreeSet};

use chrono::TimeDelta;

use schedule_state_domain::attribute_value::AttributeValue;
use schedule_state_domain::error::EvaluationError;
use schedule_state_domain::interval::Interval;
use schedule_state_domain::overrides::Override;
use schedule_state_domain::partition::Partition;
use schedule_state_domain::schedule::{DEFAULT_STATE, EventDefinition, RawValue, ScheduleDefinition};
use schedule_state_domain::time::{TimeOfDay, WallClock};

use crate::ports::{ConditionEvaluator, Outcome, ValueResolver};

/// Immutable result of one compilation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSchedule {
    /// State axis, covering the whole day.
    pub states: Partition<String>,
    /// One axis per configured extra attribute.
    pub attributes: BTreeMap<String, Partition<AttributeValue>>,
    /// State → icon, last writer wins.
    pub icons: BTreeMap<String, String>,
    pub default_state: String,
    pub icon: String,
    pub error_icon: String,
    /// Every state a processed item resolved to, including skipped ones.
    pub known_states: BTreeSet<String>,
    /// States of the items that failed to evaluate.
    pub error_states: BTreeSet<String>,
    /// External identifiers the resolved values and conditions depend on.
    pub dependencies: BTreeSet<String>,
    pub compiled_at: WallClock,
    /// Deadline after which the schedule must be rebuilt, if any.
    pub force_refresh: Option<WallClock>,
}

/// Compiles schedules using the given condition evaluator and value resolver.
pub struct ScheduleCompiler<C, V> {
    evaluator: C,
    resolver: V,
}

/// Working state of one compilation pass.
struct Pass<'a> {
    definition: &'a ScheduleDefinition,
    now: WallClock,
    states: Partition<String>,
    attributes: BTreeMap<String, Partition<AttributeValue>>,
    icons: BTreeMap<String, String>,
    known_states: BTreeSet<String>,
    error_states: BTreeSet<String>,
    dependencies: BTreeSet<String>,
    force_refresh: Option<WallClock>,
}

impl Pass<'_> {
    fn schedule_refresh(&mut self) {
        let delay = TimeDelta::minutes(i64::from(self.definition.minutes_to_refresh_on_error));
        let Some(candidate) = self.now.checked_add_signed(delay) else {
            return;
        };
        self.force_refresh = Some(match self.force_refresh {
            Some(pending) => pending.min(candidate),
            None => candidate,
        });
    }

    fn fail(&mut self, state: &str, error: &EvaluationError) {
        tracing::error!(
            schedule = %self.definition.name,
            state,
            %error,
            retry_minutes = self.definition.minutes_to_refresh_on_error,
            "skipping rule"
        );
        self.error_states.insert(state.to_string());
        self.schedule_refresh();
    }

    fn layer(&mut self, state: &str, values: &[(String, AttributeValue)], interval: Interval) {
        tracing::debug!(
            schedule = %self.definition.name,
            state,
            %interval,
            "applying layer"
        );
        self.states.apply_layer(state.to_string(), interval);
        for (name, value) in values {
            if let Some(axis) = self.attributes.get_mut(name) {
                axis.apply_layer(value.clone(), interval);
            }
        }
    }
}

impl<C, V> ScheduleCompiler<C, V>
where
    C: ConditionEvaluator,
    V: ValueResolver,
{
    /// Create a compiler backed by the given ports.
    pub fn new(evaluator: C, resolver: V) -> Self {
        Self {
            evaluator,
            resolver,
        }
    }

    /// Build the partitions of `definition` with `overrides` layered last.
    ///
    /// `pending_refresh` is the forced-refresh deadline already in effect;
    /// the result carries the earliest of it and any deadline set by this
    /// pass. Evaluation errors never abort the pass.
    pub fn compile(
        &self,
        definition: &ScheduleDefinition,
        overrides: &[Override],
        pending_refresh: Option<WallClock>,
        now: WallClock,
    ) -> CompiledSchedule {
        let mut pass = Pass {
            definition,
            now,
            states: Partition::new(),
            attributes: BTreeMap::new(),
            icons: BTreeMap::new(),
            known_states: BTreeSet::new(),
            error_states: BTreeSet::new(),
            dependencies: BTreeSet::new(),
            force_refresh: pending_refresh,
        };

        let default_state = match self.resolve(&mut pass, &definition.default_state) {
            Ok(value) => label_of(&value),
            Err(reason) => {
                tracing::error!(
                    schedule = %definition.name,
                    %reason,
                    "failed to resolve default state"
                );
                pass.schedule_refresh();
                DEFAULT_STATE.to_string()
            }
        };
        pass.known_states.insert(default_state.clone());

        for name in definition.attribute_names() {
            pass.attributes.insert(name.to_string(), Partition::new());
        }
        let defaults = self.default_attribute_values(&mut pass);
        pass.layer(&default_state, &defaults, Interval::FULL_DAY);

        for event in &definition.events {
            self.apply_item(&mut pass, event, &default_state);
        }
        for record in overrides {
            self.apply_item(&mut pass, &record.to_event(), &default_state);
        }

        tracing::info!(
            schedule = %definition.name,
            states = %pass.states,
            errors = pass.error_states.len(),
            "schedule compiled"
        );

        CompiledSchedule {
            states: pass.states,
            attributes: pass.attributes,
            icons: pass.icons,
            default_state,
            icon: definition.icon.clone(),
            error_icon: definition.error_icon.clone(),
            known_states: pass.known_states,
            error_states: pass.error_states,
            dependencies: pass.dependencies,
            compiled_at: now,
            force_refresh: pass.force_refresh,
        }
    }

    fn apply_item(&self, pass: &mut Pass<'_>, event: &EventDefinition, default_state: &str) {
        let state = match &event.state {
            None => default_state.to_string(),
            Some(raw) => match self.resolve(pass, raw) {
                Ok(value) => label_of(&value),
                Err(reason) => {
                    tracing::error!(
                        schedule = %pass.definition.name,
                        %reason,
                        "failed to resolve state"
                    );
                    pass.schedule_refresh();
                    return;
                }
            },
        };
        pass.known_states.insert(state.clone());

        if !event.condition.is_empty() {
            let evaluation = self.evaluator.evaluate(&event.condition);
            pass.dependencies.extend(evaluation.dependencies);
            match evaluation.outcome {
                Outcome::True => {}
                Outcome::False => {
                    tracing::debug!(schedule = %pass.definition.name, state, "condition not met");
                    return;
                }
                Outcome::Indeterminate => {
                    let conditions = event
                        .condition
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ");
                    pass.fail(&state, &EvaluationError::ConditionIndeterminate(conditions));
                    return;
                }
            }
        }

        let intervals = match self.window(pass, event) {
            Ok(intervals) => intervals,
            Err(error) => {
                pass.fail(&state, &error);
                return;
            }
        };

        if let Some(raw) = &event.icon
            && let Some(icon) = self.resolve_or_retry(pass, "icon", raw)
        {
            pass.icons.insert(state.clone(), label_of(&icon));
        }

        let values = self.event_attribute_values(pass, event);
        for interval in intervals {
            pass.layer(&state, &values, interval);
        }
    }

    /// Resolve start, end and offsets, then split around midnight if needed.
    fn window(
        &self,
        pass: &mut Pass<'_>,
        event: &EventDefinition,
    ) -> Result<Vec<Interval>, EvaluationError> {
        let start = self.time_field(pass, "start", event.start.as_ref(), TimeOfDay::START_OF_DAY)?;
        let end = self.time_field(pass, "end", event.end.as_ref(), TimeOfDay::END_OF_DAY)?;
        let start_offset = self.offset_field(pass, "start_offset", event.start_offset.as_ref())?;
        let end_offset = self.offset_field(pass, "end_offset", event.end_offset.as_ref())?;

        let start = start.offset_by_minutes(start_offset);
        let end = end.offset_by_minutes(end_offset);
        let allow_wrap = event.allow_wrap.unwrap_or(pass.definition.allow_wrap);
        Interval::split_day(start, end, allow_wrap)
    }

    fn time_field(
        &self,
        pass: &mut Pass<'_>,
        field: &str,
        raw: Option<&RawValue>,
        default: TimeOfDay,
    ) -> Result<TimeOfDay, EvaluationError> {
        let Some(raw) = raw else {
            return Ok(default);
        };
        let value = self
            .resolve(pass, raw)
            .map_err(|reason| EvaluationError::Template {
                field: field.to_string(),
                reason,
            })?;
        if value.is_null() {
            return Ok(default);
        }
        TimeOfDay::from_value(&value).ok_or_else(|| EvaluationError::UnparsableTime {
            field: field.to_string(),
            value: value.to_string(),
        })
    }

    fn offset_field(
        &self,
        pass: &mut Pass<'_>,
        field: &str,
        raw: Option<&RawValue>,
    ) -> Result<f64, EvaluationError> {
        let Some(raw) = raw else {
            return Ok(0.0);
        };
        let value = self
            .resolve(pass, raw)
            .map_err(|reason| EvaluationError::Template {
                field: field.to_string(),
                reason,
            })?;
        let minutes = match &value {
            RawValue::Null => Some(0.0),
            RawValue::Number(n) => n.as_f64(),
            RawValue::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        minutes
            .filter(|m| m.is_finite())
            .ok_or_else(|| EvaluationError::UnparsableOffset {
                field: field.to_string(),
                value: value.to_string(),
            })
    }

    fn default_attribute_values(&self, pass: &mut Pass<'_>) -> Vec<(String, AttributeValue)> {
        let definition = pass.definition;
        definition
            .extra_attributes
            .iter()
            .filter_map(|(name, raw)| {
                self.default_attribute_value(pass, name, raw)
                    .map(|value| (name.clone(), value))
            })
            .collect()
    }

    /// A configured default; when it cannot be resolved the raw value is used.
    fn default_attribute_value(
        &self,
        pass: &mut Pass<'_>,
        name: &str,
        raw: &RawValue,
    ) -> Option<AttributeValue> {
        let value = self
            .resolve_or_retry(pass, name, raw)
            .unwrap_or_else(|| raw.clone());
        (!value.is_null()).then(|| AttributeValue::from(value))
    }

    /// The event's value for every axis, falling back to the axis default.
    fn event_attribute_values(
        &self,
        pass: &mut Pass<'_>,
        event: &EventDefinition,
    ) -> Vec<(String, AttributeValue)> {
        let definition = pass.definition;
        let mut values = Vec::with_capacity(definition.extra_attributes.len());
        for (name, default) in &definition.extra_attributes {
            let own = event
                .attributes
                .get(name)
                .and_then(|raw| self.resolve_or_retry(pass, name, raw))
                .filter(|value| !value.is_null())
                .map(AttributeValue::from);
            let value = match own {
                Some(value) => Some(value),
                None => self.default_attribute_value(pass, name, default),
            };
            if let Some(value) = value {
                values.push((name.clone(), value));
            }
        }
        values
    }

    fn resolve(&self, pass: &mut Pass<'_>, raw: &RawValue) -> Result<RawValue, String> {
        let resolution = self.resolver.resolve(raw);
        pass.dependencies.extend(resolution.dependencies);
        resolution.value
    }

    /// Resolve a value that has a fallback. A failure is soft: it is logged
    /// and a forced refresh is scheduled, and the caller uses its fallback.
    fn resolve_or_retry(
        &self,
        pass: &mut Pass<'_>,
        field: &str,
        raw: &RawValue,
    ) -> Option<RawValue> {
        match self.resolve(pass, raw) {
            Ok(value) => Some(value),
            Err(reason) => {
                tracing::warn!(
                    schedule = %pass.definition.name,
                    field,
                    %reason,
                    "using fallback value"
                );
                pass.schedule_refresh();
                None
            }
        }
    }
}

/// The label used for a resolved state or icon.
fn label_of(value: &RawValue) -> String {
    match value {
        RawValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
