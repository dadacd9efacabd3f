//! Ordered store of live overrides.

use std::collections::BTreeMap;

use crate::attribute_value::AttributeValue;
use crate::interval::Interval;
use crate::time::WallClock;

use super::{Override, ResolvedWindow};

/// The live overrides of one schedule, in layering order.
///
/// Records are never wrapping: a window that crosses midnight is stored as
/// two consecutive records sharing the same id and expiry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideStore {
    overrides: Vec<Override>,
}

impl OverrideStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from persisted records, splitting any record whose
    /// end is not after its start and dropping degenerate ones.
    #[must_use]
    pub fn restore(records: Vec<Override>) -> Self {
        let overrides = records
            .into_iter()
            .flat_map(|record| {
                let pieces =
                    Interval::split_day(record.start, record.end, true).unwrap_or_default();
                pieces.into_iter().map(move |piece| Override {
                    start: piece.lower(),
                    end: piece.upper(),
                    ..record.clone()
                })
            })
            .collect();
        Self { overrides }
    }

    /// Add or replace an override.
    ///
    /// With an id that is already present, the new records take the place
    /// of the first existing record with that id and every later record with
    /// that id is removed. Without an id, or with a new one, the records are
    /// appended. Returns `false` (and changes nothing) when the window
    /// covers no time at all.
    pub fn set_override(
        &mut self,
        id: Option<String>,
        state: String,
        window: &ResolvedWindow,
        icon: Option<String>,
        extra_attributes: BTreeMap<String, AttributeValue>,
    ) -> bool {
        let group: Vec<Override> = window
            .intervals()
            .into_iter()
            .map(|piece| Override {
                id: id.clone(),
                state: state.clone(),
                start: piece.lower(),
                end: piece.upper(),
                expires: window.expires,
                icon: icon.clone(),
                extra_attributes: extra_attributes.clone(),
            })
            .collect();
        if group.is_empty() {
            return false;
        }

        let positions: Vec<usize> = match id.as_deref() {
            Some(id) => self
                .overrides
                .iter()
                .enumerate()
                .filter(|(_, o)| o.id.as_deref() == Some(id))
                .map(|(idx, _)| idx)
                .collect(),
            None => Vec::new(),
        };

        match positions.split_first() {
            Some((&first, later)) => {
                for &idx in later.iter().rev() {
                    self.overrides.remove(idx);
                }
                self.overrides.splice(first..=first, group);
            }
            None => self.overrides.extend(group),
        }
        true
    }

    /// Remove every record carrying `id`. Returns whether anything matched.
    pub fn remove_override(&mut self, id: &str) -> bool {
        let before = self.overrides.len();
        self.overrides.retain(|o| o.id.as_deref() != Some(id));
        self.overrides.len() != before
    }

    /// Remove all overrides. Returns `false` when the store was already empty.
    pub fn clear_overrides(&mut self) -> bool {
        if self.overrides.is_empty() {
            return false;
        }
        self.overrides.clear();
        true
    }

    /// Drop every record that has expired at `now`; returns how many went.
    pub fn sweep_expired(&mut self, now: WallClock) -> usize {
        let before = self.overrides.len();
        self.overrides.retain(|o| !o.is_expired(now));
        before - self.overrides.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Override> {
        self.overrides.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Override] {
        &self.overrides
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overrides::OverrideResolver;
    use crate::time::TimeOfDay;
    use chrono::{NaiveDate, TimeDelta};

    fn at(h: u32, m: u32) -> WallClock {
        NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn tod(h: u32, m: u32) -> TimeOfDay {
        TimeOfDay::from_hm(h, m).unwrap()
    }

    fn window(start: (u32, u32), end: (u32, u32)) -> ResolvedWindow {
        OverrideResolver::new(true)
            .resolve(Some(tod(start.0, start.1)), Some(tod(end.0, end.1)), None, at(0, 0))
            .unwrap()
    }

    fn set(store: &mut OverrideStore, id: Option<&str>, state: &str, w: &ResolvedWindow) -> bool {
        store.set_override(
            id.map(str::to_string),
            state.to_string(),
            w,
            None,
            BTreeMap::new(),
        )
    }

    fn states(store: &OverrideStore) -> Vec<&str> {
        store.iter().map(|o| o.state.as_str()).collect()
    }

    #[test]
    fn should_append_overrides_without_id() {
        let mut store = OverrideStore::new();
        assert!(set(&mut store, None, "a", &window((8, 0), (9, 0))));
        assert!(set(&mut store, None, "b", &window((8, 0), (9, 0))));
        assert_eq!(states(&store), vec!["a", "b"]);
    }

    #[test]
    fn should_store_wrapping_window_as_two_records_sharing_expiry() {
        let mut store = OverrideStore::new();
        let w = window((22, 0), (2, 0));
        assert!(set(&mut store, Some("night"), "on", &w));

        assert_eq!(store.len(), 2);
        let first = &store.as_slice()[0];
        let second = &store.as_slice()[1];
        assert_eq!((first.start, first.end), (tod(22, 0), TimeOfDay::END_OF_DAY));
        assert_eq!((second.start, second.end), (TimeOfDay::START_OF_DAY, tod(2, 0)));
        assert_eq!(first.expires, second.expires);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn should_replace_in_place_when_id_exists() {
        let mut store = OverrideStore::new();
        set(&mut store, Some("x"), "first", &window((8, 0), (9, 0)));
        set(&mut store, None, "other", &window((10, 0), (11, 0)));
        set(&mut store, Some("x"), "second", &window((12, 0), (13, 0)));

        assert_eq!(states(&store), vec!["second", "other"]);
        assert_eq!(store.as_slice()[0].start, tod(12, 0));
    }

    #[test]
    fn should_replace_both_halves_of_wrapping_override() {
        let mut store = OverrideStore::new();
        set(&mut store, Some("n"), "night", &window((22, 0), (2, 0)));
        set(&mut store, None, "tail", &window((5, 0), (6, 0)));
        set(&mut store, Some("n"), "short", &window((9, 0), (10, 0)));

        assert_eq!(states(&store), vec!["short", "tail"]);
    }

    #[test]
    fn should_refuse_window_covering_nothing() {
        let mut store = OverrideStore::new();
        let w = window((14, 0), (14, 0));
        assert!(!set(&mut store, Some("x"), "on", &w));
        assert!(store.is_empty());
    }

    #[test]
    fn should_remove_every_record_with_id() {
        let mut store = OverrideStore::new();
        set(&mut store, Some("n"), "night", &window((22, 0), (2, 0)));
        set(&mut store, None, "keep", &window((5, 0), (6, 0)));

        assert!(store.remove_override("n"));
        assert_eq!(states(&store), vec!["keep"]);
    }

    #[test]
    fn should_report_false_when_removing_unknown_id() {
        let mut store = OverrideStore::new();
        set(&mut store, Some("a"), "on", &window((8, 0), (9, 0)));
        let before = store.clone();

        assert!(!store.remove_override("missing"));
        assert_eq!(store, before);
    }

    #[test]
    fn should_clear_only_when_not_empty() {
        let mut store = OverrideStore::new();
        assert!(!store.clear_overrides());
        set(&mut store, None, "on", &window((8, 0), (9, 0)));
        assert!(store.clear_overrides());
        assert!(store.is_empty());
    }

    #[test]
    fn should_sweep_only_strictly_expired_records() {
        let mut store = OverrideStore::new();
        let w = window((8, 0), (9, 0));
        set(&mut store, None, "on", &w);

        assert_eq!(store.sweep_expired(w.expires), 0);
        assert_eq!(store.sweep_expired(w.expires + TimeDelta::seconds(1)), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn should_split_wrapping_record_on_restore() {
        let record = Override {
            id: Some("n".to_string()),
            state: "night".to_string(),
            start: tod(22, 0),
            end: tod(2, 0),
            expires: at(23, 0),
            icon: None,
            extra_attributes: BTreeMap::new(),
        };
        let degenerate = Override {
            start: tod(5, 0),
            end: tod(5, 0),
            ..record.clone()
        };

        let store = OverrideStore::restore(vec![record, degenerate]);
        assert_eq!(store.len(), 2);
        assert!(store.iter().all(|o| o.start < o.end));
    }
}
