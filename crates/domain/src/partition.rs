//! Partition — label → disjoint interval sets, built by layering.
//!
//! A partition is built by applying layers in order. Each layer carves its
//! interval out of every region owned by a *different* label and then joins
//! the region of its own label. Later layers therefore win over earlier ones
//! for the overlapped part; insertion order is the only priority there is.

use std::fmt;

use serde::Serialize;

use crate::interval::{Interval, IntervalSet};
use crate::time::TimeOfDay;

/// Label → union of disjoint intervals, for one axis (state or one attribute).
///
/// Distinct labels never share an instant. Labels are kept in the order in
/// which they first appeared, which makes iteration deterministic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Partition<L> {
    entries: Vec<(L, IntervalSet)>,
}

impl<L> Default for Partition<L> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<L: PartialEq> Partition<L> {
    /// An empty partition (covers nothing).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A partition whose single label owns the whole day.
    #[must_use]
    pub fn seeded(label: L) -> Self {
        let mut partition = Self::new();
        partition.apply_layer(label, Interval::FULL_DAY);
        partition
    }

    /// Apply one layer: `label` takes over `interval`.
    ///
    /// Every other label loses the overlapped region; labels left with
    /// nothing are dropped. `label` then gains `interval`, merged with what
    /// it already owned.
    pub fn apply_layer(&mut self, label: L, interval: Interval) {
        for (existing, region) in &mut self.entries {
            if *existing != label && region.overlaps(&interval) {
                region.subtract(&interval);
            }
        }
        self.entries.retain(|(_, region)| !region.is_empty());

        match self.entries.iter_mut().find(|(existing, _)| *existing == label) {
            Some((_, region)) => region.insert(interval),
            None => self.entries.push((label, IntervalSet::from(interval))),
        }
    }

    /// The label owning `t` and the contiguous piece of its region around `t`.
    #[must_use]
    pub fn active_at(&self, t: TimeOfDay) -> Option<(&L, Interval)> {
        self.entries.iter().find_map(|(label, region)| {
            region
                .interval_containing(t)
                .map(|interval| (label, interval))
        })
    }

    /// The region owned by `label`.
    #[must_use]
    pub fn region(&self, label: &L) -> Option<&IntervalSet> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == label)
            .map(|(_, region)| region)
    }

    pub fn labels(&self) -> impl Iterator<Item = &L> {
        self.entries.iter().map(|(label, _)| label)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&L, &IntervalSet)> {
        self.entries.iter().map(|(label, region)| (label, region))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<L: fmt::Display> fmt::Display for Partition<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (label, region)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{label}: {region}")?;
        }
        Ok(())
    }
}
