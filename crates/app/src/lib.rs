//! # schedule-state-app
//!
//! Application layer — the schedule compiler, queries, use-cases and
//! **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement:
//!   - `ConditionEvaluator` — decide whether an event applies right now
//!   - `ValueResolver` — turn a configured value into a concrete one
//!   - `OverrideRepository` — load & save the overrides of a schedule
//!   - `EventPublisher` — publish schedule events
//! - **Compile** a schedule definition plus its overrides into partitions
//! - **Query** a compiled schedule at an instant
//! - Provide the use-cases:
//!   - `ScheduleService` — update, recalculate, overrides, on/off/toggle
//!   - `ScheduleRegistry` — address several schedules by name
//! - Provide **in-process infrastructure** (event bus) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `schedule-state-domain` only (plus `tokio::sync` for channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod compiler;
pub mod event_bus;
pub mod ports;
pub mod query;
pub mod services;
