//! # schedule-state-adapter-virtual
//!
//! Virtual entity table for running and testing schedules without a home
//! automation host.
//!
//! ## Provided ports
//!
//! | Port | Behaviour |
//! |------|-----------|
//! | `ConditionEvaluator` | `state`, `time`, `template` (`is_state`) and `not` conditions |
//! | `ValueResolver` | literals pass through, `{{ states('id') }}` reads the table |
//!
//! Every change made with [`VirtualEntities::set_state`] is broadcast as an
//! [`EntityChange`], so schedules depending on the entity can be rebuilt.
//!
//! ## Dependency rule
//!
//! Depends on `schedule-state-app` (port traits) and `schedule-state-domain` only.

mod conditions;
mod resolver;
pub mod template;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;

use schedule_state_domain::time::{self, WallClock};

/// Default capacity of the change channel.
const DEFAULT_CAPACITY: usize = 256;

/// Source of "now" for `time` conditions.
pub type Clock = Arc<dyn Fn() -> WallClock + Send + Sync>;

/// A state change of one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityChange {
    pub entity_id: String,
    pub old_state: Option<String>,
    pub new_state: String,
}

/// Shared in-memory `entity_id → state` table.
///
/// Clones share the same table and change channel.
#[derive(Clone)]
pub struct VirtualEntities {
    states: Arc<RwLock<HashMap<String, String>>>,
    clock: Clock,
    changes: broadcast::Sender<EntityChange>,
}

impl Default for VirtualEntities {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self {
            states: Arc::default(),
            clock: Arc::new(time::now),
            changes,
        }
    }
}

impl std::fmt::Debug for VirtualEntities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualEntities")
            .field("entities", &self.len())
            .finish_non_exhaustive()
    }
}

impl VirtualEntities {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed initial states without emitting change notifications.
    #[must_use]
    pub fn with_states<I, K, V>(self, states: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        {
            let mut table = self.states.write().unwrap_or_else(PoisonError::into_inner);
            table.extend(states.into_iter().map(|(k, v)| (k.into(), v.into())));
        }
        self
    }

    /// Replace the clock used by `time` conditions.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> WallClock + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Current state of `entity_id`.
    #[must_use]
    pub fn state(&self, entity_id: &str) -> Option<String> {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity_id)
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.states.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Set the state of `entity_id` and broadcast the change.
    ///
    /// Returns `false` (and broadcasts nothing) when the state is unchanged.
    pub fn set_state(&self, entity_id: impl Into<String>, state: impl Into<String>) -> bool {
        let entity_id = entity_id.into();
        let state = state.into();
        let old_state = {
            let mut table = self.states.write().unwrap_or_else(PoisonError::into_inner);
            if table.get(&entity_id) == Some(&state) {
                return false;
            }
            table.insert(entity_id.clone(), state.clone())
        };
        tracing::debug!(entity_id = %entity_id, state = %state, "entity state changed");
        // no receivers is fine
        let _ = self.changes.send(EntityChange {
            entity_id,
            old_state,
            new_state: state,
        });
        true
    }

    /// Receive every subsequent [`EntityChange`].
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EntityChange> {
        self.changes.subscribe()
    }

    fn now(&self) -> WallClock {
        (self.clock)()
    }
}
