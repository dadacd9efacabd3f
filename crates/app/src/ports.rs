//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the use-case layer and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod condition;
pub mod event_bus;
pub mod override_repo;
pub mod value_resolver;

pub use condition::{ConditionEvaluator, Evaluation, Outcome};
pub use event_bus::EventPublisher;
pub use override_repo::OverrideRepository;
pub use value_resolver::{Resolution, ValueResolver};
