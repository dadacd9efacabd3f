//! Condition evaluation against the virtual table.

use std::collections::BTreeSet;

use schedule_state_app::ports::{ConditionEvaluator, Evaluation, Outcome};
use schedule_state_domain::schedule::Condition;
use schedule_state_domain::time::TimeOfDay;

use crate::VirtualEntities;
use crate::template::{self, Expression};

/// Rendered template values counted as true.
const TRUTHY: [&str; 5] = ["true", "on", "yes", "1", "enable"];

fn from_bool(holds: bool) -> Outcome {
    if holds { Outcome::True } else { Outcome::False }
}

impl ConditionEvaluator for VirtualEntities {
    fn evaluate(&self, conditions: &[Condition]) -> Evaluation {
        let mut dependencies = BTreeSet::new();
        let outcome = self.all(conditions, &mut dependencies);
        Evaluation::new(outcome).with_dependencies(dependencies)
    }
}

impl VirtualEntities {
    /// AND over `conditions`: the first outcome that is not `True` wins.
    /// Every condition is still visited so all dependencies are reported.
    fn all(&self, conditions: &[Condition], dependencies: &mut BTreeSet<String>) -> Outcome {
        let mut outcome = Outcome::True;
        for condition in conditions {
            let current = self.check(condition, dependencies);
            if outcome == Outcome::True {
                outcome = current;
            }
        }
        outcome
    }

    fn check(&self, condition: &Condition, dependencies: &mut BTreeSet<String>) -> Outcome {
        match condition {
            Condition::State { entity_id, state } => {
                dependencies.insert(entity_id.clone());
                self.state(entity_id)
                    .map_or(Outcome::Indeterminate, |current| from_bool(current == *state))
            }
            Condition::Time { after, before } => {
                let now = TimeOfDay::from(self.now());
                let holds = match (after, before) {
                    (Some(after), Some(before)) if before < after => now >= *after || now < *before,
                    _ => after.is_none_or(|a| now >= a) && before.is_none_or(|b| now < b),
                };
                from_bool(holds)
            }
            Condition::Template { value_template } => {
                self.check_template(value_template, dependencies)
            }
            Condition::Not { conditions } => {
                let mut outcome = Outcome::True;
                for nested in conditions {
                    match self.check(nested, dependencies) {
                        Outcome::True => outcome = Outcome::False,
                        Outcome::Indeterminate if outcome == Outcome::True => {
                            outcome = Outcome::Indeterminate;
                        }
                        _ => {}
                    }
                }
                outcome
            }
        }
    }

    fn check_template(&self, value_template: &str, dependencies: &mut BTreeSet<String>) -> Outcome {
        match template::parse(value_template) {
            Some(Expression::Literal(value)) => from_bool(value),
            Some(Expression::IsState(id, expected)) => {
                let outcome = self
                    .state(&id)
                    .map_or(Outcome::Indeterminate, |current| from_bool(current == expected));
                dependencies.insert(id);
                outcome
            }
            Some(Expression::States(id)) => {
                let outcome = self.state(&id).map_or(Outcome::Indeterminate, |current| {
                    from_bool(TRUTHY.contains(&current.to_lowercase().as_str()))
                });
                dependencies.insert(id);
                outcome
            }
            None => {
                tracing::warn!(template = %value_template, "unsupported template condition");
                Outcome::Indeterminate
            }
        }
    }
}
