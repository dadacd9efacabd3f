//! Point-in-time queries against a compiled schedule.

use std::collections::BTreeMap;

use schedule_state_domain::attribute_value::AttributeValue;
use schedule_state_domain::error::InvariantViolation;
use schedule_state_domain::interval::Interval;
use schedule_state_domain::partition::Partition;
use schedule_state_domain::time::TimeOfDay;

use crate::compiler::CompiledSchedule;

/// The label owning `t` and the contiguous piece of its region around `t`.
///
/// # Errors
///
/// Returns [`InvariantViolation::Uncovered`] when no label claims `t`. A
/// compiled state axis is seeded over the whole day, so this means the
/// partition is corrupt.
pub fn active_at<L: PartialEq>(
    partition: &Partition<L>,
    t: TimeOfDay,
) -> Result<(&L, Interval), InvariantViolation> {
    partition
        .active_at(t)
        .ok_or(InvariantViolation::Uncovered { at: t })
}

/// What follows the current interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextLabel<'a, L> {
    pub label: &'a L,
    /// End of the current interval, extended into the next day when the
    /// same label continues past midnight.
    pub end: TimeOfDay,
}

/// The label that becomes active when `interval` (owned by `current`) ends.
///
/// Intervals are half-open, so the label owning `interval.upper()` is the
/// next one. When the interval runs to the end of the day, the start of the
/// next day is looked up: a different label there is the answer; the same
/// label means the two pieces are joined and the search continues from the
/// end of the next-day piece.
///
/// # Errors
///
/// Returns [`InvariantViolation::Uncovered`] when a looked-up instant is not
/// claimed by any label.
pub fn next_label_after<'a, L: PartialEq>(
    partition: &'a Partition<L>,
    current: &'a L,
    interval: Interval,
) -> Result<NextLabel<'a, L>, InvariantViolation> {
    let mut end = interval.upper();
    if end == TimeOfDay::END_OF_DAY {
        let (following, next_day) = active_at(partition, TimeOfDay::START_OF_DAY)?;
        if following != current {
            return Ok(NextLabel { label: following, end });
        }
        end = next_day.upper();
        if end == TimeOfDay::END_OF_DAY {
            // the label owns the whole day
            return Ok(NextLabel {
                label: current,
                end,
            });
        }
    }
    let (label, _) = active_at(partition, end)?;
    Ok(NextLabel { label, end })
}

/// Everything reported about a schedule at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub state: String,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    pub next_state: String,
    pub icon: String,
    /// Value of each attribute axis; `None` where nothing claims the instant.
    pub attributes: BTreeMap<String, Option<AttributeValue>>,
    pub errors: Vec<String>,
    pub known_states: Vec<String>,
}

impl Snapshot {
    /// Whether the reported state or any attribute differs from `other`.
    #[must_use]
    pub fn differs_from(&self, other: &Self) -> bool {
        self.state != other.state || self.attributes != other.attributes
    }

    /// Flat JSON view: state, window, next state, icon, errors, known states
    /// and one key per attribute.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("state".into(), self.state.clone().into());
        map.insert("start".into(), self.start.to_string().into());
        map.insert("end".into(), self.end.to_string().into());
        map.insert("next_state".into(), self.next_state.clone().into());
        map.insert("icon".into(), self.icon.clone().into());
        map.insert("errors".into(), self.errors.clone().into());
        map.insert("states".into(), self.known_states.clone().into());
        for (name, value) in &self.attributes {
            let value = value
                .clone()
                .map_or(serde_json::Value::Null, serde_json::Value::from);
            map.insert(name.clone(), value);
        }
        serde_json::Value::Object(map)
    }
}

/// Query `compiled` at `t`.
///
/// # Errors
///
/// Returns [`InvariantViolation`] when the state axis does not cover `t` or
/// the instant that follows the active interval.
pub fn snapshot(compiled: &CompiledSchedule, t: TimeOfDay) -> Result<Snapshot, InvariantViolation> {
    let (state, interval) = active_at(&compiled.states, t)?;
    let next = next_label_after(&compiled.states, state, interval)?;

    let icon = if compiled.error_states.is_empty() {
        compiled
            .icons
            .get(state)
            .unwrap_or(&compiled.icon)
            .clone()
    } else {
        compiled.error_icon.clone()
    };

    let attributes = compiled
        .attributes
        .iter()
        .map(|(name, axis)| {
            let value = axis.active_at(t).map(|(value, _)| value.clone());
            (name.clone(), value)
        })
        .collect();

    Ok(Snapshot {
        state: state.clone(),
        start: interval.lower(),
        end: next.end,
        next_state: next.label.clone(),
        icon,
        attributes,
        errors: compiled.error_states.iter().cloned().collect(),
        known_states: compiled.known_states.iter().cloned().collect(),
    })
}
