//! # schedule-state-adapter-storage-json
//!
//! Override persistence in plain JSON files.
//!
//! ## Responsibilities
//! - Implement `OverrideRepository` from `schedule-state-app::ports`
//! - Keep one document per schedule, `<directory>/<schedule_id>.json`
//! - Replace documents atomically (write a temp file, then rename)
//!
//! ## Dependency rule
//! Depends on `schedule-state-app` (for port traits) and `schedule-state-domain`
//! (for domain types). The `app` and `domain` crates must never reference this adapter.

pub mod error;
pub mod override_repo;

pub use override_repo::JsonOverrideRepository;
