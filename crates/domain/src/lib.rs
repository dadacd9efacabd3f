//! # schedule-state-domain
//!
//! Pure domain model for the schedule-state engine.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, wall-clock helpers
//! - Define **time-of-day** values and half-open **intervals** over a single day
//! - Define **partitions**: label → disjoint interval sets, built layer by layer
//! - Define **schedules** (default state, events, extra attributes, conditions)
//! - Define **overrides** (transient rules with id and expiry), how a request is
//!   resolved into a concrete window, and the ordered store that holds them
//! - Define the **events** published when a schedule changes
//! - Contain all invariant enforcement and domain logic
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod attribute_value;
pub mod event;
pub mod interval;
pub mod overrides;
pub mod partition;
pub mod schedule;
