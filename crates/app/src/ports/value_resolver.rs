//! Value resolver port — renders configured raw values.

use std::collections::BTreeSet;
use std::sync::Arc;

use schedule_state_domain::schedule::RawValue;

/// Result of resolving one raw value.
///
/// The dependency set is reported even on failure so that a later change of
/// one of those identifiers can trigger a new attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub value: Result<RawValue, String>,
    pub dependencies: BTreeSet<String>,
}

impl Resolution {
    /// A successful resolution with no dependencies.
    #[must_use]
    pub fn literal(value: RawValue) -> Self {
        Self {
            value: Ok(value),
            dependencies: BTreeSet::new(),
        }
    }

    /// A failed resolution with no dependencies.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            value: Err(reason.into()),
            dependencies: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = String>) -> Self {
        self.dependencies.extend(dependencies);
        self
    }
}

/// Turns a raw configured value (a literal or something dynamic) into a
/// concrete value.
pub trait ValueResolver {
    fn resolve(&self, raw: &RawValue) -> Resolution;
}

impl<T: ValueResolver> ValueResolver for Arc<T> {
    fn resolve(&self, raw: &RawValue) -> Resolution {
        (**self).resolve(raw)
    }
}
