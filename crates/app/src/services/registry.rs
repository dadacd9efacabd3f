//! Schedule registry — several independent schedules addressed by name.

use std::collections::BTreeMap;

use schedule_state_domain::error::{ConfigurationError, NotFoundError, ScheduleError};
use schedule_state_domain::id::ScheduleId;
use schedule_state_domain::overrides::OverrideRequest;
use schedule_state_domain::time::WallClock;

use crate::ports::{ConditionEvaluator, EventPublisher, OverrideRepository, ValueResolver};
use crate::query::Snapshot;
use crate::services::schedule_service::ScheduleService;

/// Outcome of a service call on one schedule.
pub type CallResult<T> = (String, Result<T, ScheduleError>);

/// Holds every configured schedule, keyed by [`ScheduleId`].
///
/// Service calls take a list of schedule names; an empty list targets all
/// schedules. Schedules share nothing with each other.
pub struct ScheduleRegistry<C, V, R, P> {
    schedules: BTreeMap<ScheduleId, ScheduleService<C, V, R, P>>,
}

impl<C, V, R, P> Default for ScheduleRegistry<C, V, R, P> {
    fn default() -> Self {
        Self {
            schedules: BTreeMap::new(),
        }
    }
}

impl<C, V, R, P> ScheduleRegistry<C, V, R, P>
where
    C: ConditionEvaluator,
    V: ValueResolver,
    R: OverrideRepository,
    P: EventPublisher,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schedule.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DuplicateName`] when a schedule with the
    /// same name is already registered.
    pub fn insert(
        &mut self,
        service: ScheduleService<C, V, R, P>,
    ) -> Result<(), ConfigurationError> {
        if self.schedules.contains_key(&service.id()) {
            return Err(ConfigurationError::DuplicateName(service.name().to_string()));
        }
        self.schedules.insert(service.id(), service);
        Ok(())
    }

    /// Look a schedule up by name.
    ///
    /// # Errors
    ///
    /// Returns [`NotFoundError`] when no schedule has that name.
    pub fn get(&self, name: &str) -> Result<&ScheduleService<C, V, R, P>, NotFoundError> {
        self.schedules
            .get(&ScheduleId::from_name(name))
            .ok_or_else(|| NotFoundError {
                entity: "Schedule",
                id: name.to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScheduleService<C, V, R, P>> {
        self.schedules.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.schedules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schedules.is_empty()
    }

    /// Resolve a target list; empty means every schedule.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::NotFound`] for the first unknown name.
    pub fn targets(
        &self,
        names: &[String],
    ) -> Result<Vec<&ScheduleService<C, V, R, P>>, ScheduleError> {
        if names.is_empty() {
            return Ok(self.iter().collect());
        }
        names
            .iter()
            .map(|name| self.get(name).map_err(ScheduleError::from))
            .collect()
    }

    /// Report every schedule at `now`.
    pub async fn update_all(&self, now: WallClock) -> Vec<CallResult<Snapshot>> {
        let mut results = Vec::with_capacity(self.schedules.len());
        for service in self.iter() {
            results.push((service.name().to_string(), service.update(now).await));
        }
        results
    }

    /// Rebuild the targeted schedules.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::NotFound`] when a target is unknown.
    pub async fn recalculate(
        &self,
        names: &[String],
        now: WallClock,
    ) -> Result<usize, ScheduleError> {
        let targets = self.targets(names)?;
        for service in &targets {
            service.recalculate(now).await;
        }
        Ok(targets.len())
    }

    /// Set the same override on every targeted schedule.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::NotFound`] when a target is unknown; errors of
    /// individual schedules are reported per schedule.
    #[tracing::instrument(skip(self, request), fields(state = %request.state))]
    pub async fn set_override(
        &self,
        names: &[String],
        request: &OverrideRequest,
        now: WallClock,
    ) -> Result<Vec<CallResult<bool>>, ScheduleError> {
        let mut results = Vec::new();
        for service in self.targets(names)? {
            let result = service.set_override(request.clone(), now).await;
            results.push((service.name().to_string(), result));
        }
        Ok(results)
    }

    /// Remove override `id` from every targeted schedule.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::NotFound`] when a target is unknown.
    pub async fn remove_override(
        &self,
        names: &[String],
        id: &str,
        now: WallClock,
    ) -> Result<Vec<CallResult<bool>>, ScheduleError> {
        let mut results = Vec::new();
        for service in self.targets(names)? {
            results.push((service.name().to_string(), service.remove_override(id, now).await));
        }
        Ok(results)
    }

    /// Clear the overrides of every targeted schedule.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::NotFound`] when a target is unknown.
    pub async fn clear_overrides(
        &self,
        names: &[String],
        now: WallClock,
    ) -> Result<Vec<CallResult<bool>>, ScheduleError> {
        let mut results = Vec::new();
        for service in self.targets(names)? {
            results.push((service.name().to_string(), service.clear_overrides(now).await));
        }
        Ok(results)
    }

    /// Turn every targeted schedule that knows an `on` state on.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::NotFound`] when a target is unknown.
    pub async fn turn_on(
        &self,
        names: &[String],
        duration: Option<u32>,
        now: WallClock,
    ) -> Result<Vec<CallResult<bool>>, ScheduleError> {
        let mut results = Vec::new();
        for service in self.targets(names)? {
            results.push((service.name().to_string(), service.turn_on(duration, now).await));
        }
        Ok(results)
    }

    /// Turn every targeted schedule that knows an `off` state off.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::NotFound`] when a target is unknown.
    pub async fn turn_off(
        &self,
        names: &[String],
        duration: Option<u32>,
        now: WallClock,
    ) -> Result<Vec<CallResult<bool>>, ScheduleError> {
        let mut results = Vec::new();
        for service in self.targets(names)? {
            results.push((service.name().to_string(), service.turn_off(duration, now).await));
        }
        Ok(results)
    }

    /// Toggle every targeted schedule between `on` and `off`.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::NotFound`] when a target is unknown.
    pub async fn toggle(
        &self,
        names: &[String],
        duration: Option<u32>,
        now: WallClock,
    ) -> Result<Vec<CallResult<bool>>, ScheduleError> {
        let mut results = Vec::new();
        for service in self.targets(names)? {
            results.push((service.name().to_string(), service.toggle(duration, now).await));
        }
        Ok(results)
    }

    /// Tell every schedule that `ids` changed; returns the fresh snapshots of
    /// the schedules that depended on them.
    pub async fn dependency_changed(
        &self,
        ids: &[String],
        now: WallClock,
    ) -> Vec<CallResult<Snapshot>> {
        let mut results = Vec::new();
        for service in self.iter() {
            match service.dependency_changed(ids, now).await {
                Ok(None) => {}
                Ok(Some(snapshot)) => results.push((service.name().to_string(), Ok(snapshot))),
                Err(err) => results.push((service.name().to_string(), Err(err))),
            }
        }
        results
    }

    /// Restore the persisted overrides of every schedule. A schedule whose
    /// overrides cannot be read keeps none.
    pub async fn restore_all(&self, now: WallClock) -> Vec<CallResult<usize>> {
        let mut results = Vec::with_capacity(self.schedules.len());
        for service in self.iter() {
            results.push((service.name().to_string(), service.restore(now).await));
        }
        results
    }

    /// Persist the overrides of every schedule.
    pub async fn persist_all(&self) -> Vec<CallResult<()>> {
        let mut results = Vec::with_capacity(self.schedules.len());
        for service in self.iter() {
            results.push((service.name().to_string(), service.persist().await));
        }
        results
    }
}
