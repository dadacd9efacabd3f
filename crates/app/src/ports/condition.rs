//! Condition evaluator port — decides whether an event's guard holds.

use std::collections::BTreeSet;
use std::sync::Arc;

use schedule_state_domain::schedule::Condition;

/// Three-valued result of evaluating a guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    True,
    False,
    /// The guard could not be decided (unknown entity, broken template, …).
    Indeterminate,
}

/// An [`Outcome`] plus the external identifiers it was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub outcome: Outcome,
    pub dependencies: BTreeSet<String>,
}

impl Evaluation {
    #[must_use]
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            dependencies: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = String>) -> Self {
        self.dependencies.extend(dependencies);
        self
    }
}

/// Evaluates the guard conditions of an event.
///
/// All conditions must hold (logical AND); an empty list holds. The call is
/// synchronous: the compiler never suspends mid-compilation.
pub trait ConditionEvaluator {
    fn evaluate(&self, conditions: &[Condition]) -> Evaluation;
}

impl<T: ConditionEvaluator> ConditionEvaluator for Arc<T> {
    fn evaluate(&self, conditions: &[Condition]) -> Evaluation {
        (**self).evaluate(conditions)
    }
}
