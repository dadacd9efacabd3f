//! Schedule service — the runtime of one named schedule.
//!
//! Owns the definition, the live overrides, the current compiled schedule
//! and the pending forced-refresh deadline. All of them sit behind a single
//! async mutex, so every mutation and the recompilation that follows it
//! happen as one step.

use std::collections::{BTreeMap, BTreeSet};

use chrono::TimeDelta;
use tokio::sync::Mutex;

use schedule_state_domain::attribute_value::AttributeValue;
use schedule_state_domain::error::ScheduleError;
use schedule_state_domain::event::{EventType, ScheduleEvent};
use schedule_state_domain::id::ScheduleId;
use schedule_state_domain::overrides::{Override, OverrideRequest, OverrideResolver, OverrideStore};
use schedule_state_domain::schedule::ScheduleDefinition;
use schedule_state_domain::time::{TimeOfDay, WallClock};

use crate::compiler::{CompiledSchedule, ScheduleCompiler};
use crate::ports::{ConditionEvaluator, EventPublisher, OverrideRepository, ValueResolver};
use crate::query::{Snapshot, snapshot};

/// Override id used by the on/off helpers.
pub const TURN_ON_OFF_ID: &str = "turn_on_off";
/// Minutes an on/off override lasts when no duration is given.
pub const DEFAULT_ON_OFF_MINUTES: u32 = 30;

const STATE_ON: &str = "on";
const STATE_OFF: &str = "off";

struct Runtime {
    overrides: OverrideStore,
    compiled: CompiledSchedule,
    pending_refresh: Option<WallClock>,
    last: Option<Snapshot>,
}

/// Application service for one schedule.
pub struct ScheduleService<C, V, R, P> {
    id: ScheduleId,
    definition: ScheduleDefinition,
    compiler: ScheduleCompiler<C, V>,
    repository: R,
    publisher: P,
    runtime: Mutex<Runtime>,
}

impl<C, V, R, P> ScheduleService<C, V, R, P>
where
    C: ConditionEvaluator,
    V: ValueResolver,
    R: OverrideRepository,
    P: EventPublisher,
{
    /// Create the service and compile the definition once, without overrides.
    pub fn new(
        definition: ScheduleDefinition,
        compiler: ScheduleCompiler<C, V>,
        repository: R,
        publisher: P,
        now: WallClock,
    ) -> Self {
        let compiled = compiler.compile(&definition, &[], None, now);
        Self {
            id: definition.id(),
            runtime: Mutex::new(Runtime {
                overrides: OverrideStore::new(),
                pending_refresh: compiled.force_refresh,
                compiled,
                last: None,
            }),
            definition,
            compiler,
            repository,
            publisher,
        }
    }

    #[must_use]
    pub fn id(&self) -> ScheduleId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    #[must_use]
    pub fn definition(&self) -> &ScheduleDefinition {
        &self.definition
    }

    /// The live overrides, in layering order.
    pub async fn overrides(&self) -> Vec<Override> {
        self.runtime.lock().await.overrides.as_slice().to_vec()
    }

    /// The states seen by the last compilation.
    pub async fn known_states(&self) -> BTreeSet<String> {
        self.runtime.lock().await.compiled.known_states.clone()
    }

    /// The external identifiers the last compilation depended on.
    pub async fn dependencies(&self) -> BTreeSet<String> {
        self.runtime.lock().await.compiled.dependencies.clone()
    }

    /// The pending forced-refresh deadline, if any.
    pub async fn force_refresh(&self) -> Option<WallClock> {
        self.runtime.lock().await.pending_refresh
    }

    /// Report the schedule at `now`, recompiling first when needed.
    ///
    /// The schedule is rebuilt when an override has expired, when the
    /// refresh period has elapsed or when the forced-refresh deadline has
    /// passed. The deadline is cleared before a refresh rebuild. A
    /// [`EventType::StateChanged`] event is published when the state or an
    /// attribute differs from the previous report.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::Invariant`] when the compiled state axis does
    /// not cover `now`.
    #[tracing::instrument(skip(self), fields(schedule = %self.definition.name))]
    pub async fn update(&self, now: WallClock) -> Result<Snapshot, ScheduleError> {
        let mut runtime = self.runtime.lock().await;
        let period = TimeDelta::minutes(i64::from(self.definition.refresh_minutes));
        let stale = now - runtime.compiled.compiled_at >= period;
        let forced = runtime.pending_refresh.is_some_and(|deadline| now > deadline);
        let expired = runtime.overrides.iter().any(|o| o.is_expired(now));
        let mut swept = 0;
        if stale || forced || expired {
            tracing::debug!(stale, forced, expired, "refreshing schedule");
            if stale || forced {
                runtime.pending_refresh = None;
            }
            swept = self.rebuild(&mut runtime, now);
        }

        let (current, changed) = self.observe(&mut runtime, now)?;
        drop(runtime);

        if swept > 0 {
            self.publish(EventType::OverridesChanged, serde_json::json!({ "swept": swept }))
                .await;
        }
        if changed {
            self.publish(EventType::StateChanged, current.to_json()).await;
        }
        Ok(current)
    }

    /// Rebuild the schedule unconditionally.
    #[tracing::instrument(skip(self), fields(schedule = %self.definition.name))]
    pub async fn recalculate(&self, now: WallClock) {
        let mut runtime = self.runtime.lock().await;
        self.rebuild(&mut runtime, now);
        drop(runtime);
        self.publish(EventType::Recompiled, serde_json::json!({})).await;
    }

    /// Rebuild and report if any of `ids` is a dependency of the schedule.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::Invariant`] when the rebuilt state axis does
    /// not cover `now`.
    pub async fn dependency_changed(
        &self,
        ids: &[String],
        now: WallClock,
    ) -> Result<Option<Snapshot>, ScheduleError> {
        let mut runtime = self.runtime.lock().await;
        if !ids
            .iter()
            .any(|id| runtime.compiled.dependencies.contains(id))
        {
            return Ok(None);
        }
        tracing::debug!(schedule = %self.definition.name, ?ids, "dependency changed");
        self.rebuild(&mut runtime, now);
        let (current, changed) = self.observe(&mut runtime, now)?;
        drop(runtime);

        if changed {
            self.publish(EventType::StateChanged, current.to_json()).await;
        }
        Ok(Some(current))
    }

    /// Add or replace an override.
    ///
    /// Extra attributes that are not configured for this schedule are
    /// ignored. Returns `Ok(false)` when the resolved window covers no time.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::Configuration`] when the request is not a
    /// supported combination of start, end and duration, or wraps when it
    /// may not; the store is left untouched. Storage errors from persisting
    /// the new overrides are propagated after the change is applied.
    #[tracing::instrument(
        skip(self, request),
        fields(schedule = %self.definition.name, state = %request.state)
    )]
    pub async fn set_override(
        &self,
        request: OverrideRequest,
        now: WallClock,
    ) -> Result<bool, ScheduleError> {
        let mut runtime = self.runtime.lock().await;
        self.apply_override(&mut runtime, request, now).await
    }

    async fn apply_override(
        &self,
        runtime: &mut Runtime,
        request: OverrideRequest,
        now: WallClock,
    ) -> Result<bool, ScheduleError> {
        let window = OverrideResolver::new(self.definition.allow_wrap).resolve(
            request.start,
            request.end,
            request.duration,
            now,
        )?;
        let extra_attributes = self.filter_attributes(request.extra_attributes);

        let stored = runtime.overrides.set_override(
            request.id,
            request.state,
            &window,
            request.icon,
            extra_attributes,
        );
        if !stored {
            tracing::warn!(start = %window.start, end = %window.end, "override covers no time");
            return Ok(false);
        }
        tracing::info!(
            start = %window.start,
            end = %window.end,
            expires = %window.expires,
            "override set"
        );
        self.commit(runtime, now).await?;
        Ok(true)
    }

    /// Remove every override record carrying `id`. Expired overrides are
    /// swept by the rebuild that follows.
    ///
    /// # Errors
    ///
    /// Returns a storage error when persisting the change fails.
    #[tracing::instrument(skip(self), fields(schedule = %self.definition.name))]
    pub async fn remove_override(&self, id: &str, now: WallClock) -> Result<bool, ScheduleError> {
        let mut runtime = self.runtime.lock().await;
        if !runtime.overrides.remove_override(id) {
            tracing::warn!("override not found");
            return Ok(false);
        }
        self.commit(&mut runtime, now).await?;
        Ok(true)
    }

    /// Remove all overrides. Returns `Ok(false)` when there were none.
    ///
    /// # Errors
    ///
    /// Returns a storage error when persisting the change fails.
    #[tracing::instrument(skip(self), fields(schedule = %self.definition.name))]
    pub async fn clear_overrides(&self, now: WallClock) -> Result<bool, ScheduleError> {
        let mut runtime = self.runtime.lock().await;
        if !runtime.overrides.clear_overrides() {
            return Ok(false);
        }
        self.commit(&mut runtime, now).await?;
        Ok(true)
    }

    /// Force the schedule `on` for `duration` minutes (default 30).
    ///
    /// Does nothing and returns `Ok(false)` unless `on` is a known state.
    ///
    /// # Errors
    ///
    /// See [`set_override`](Self::set_override).
    pub async fn turn_on(
        &self,
        duration: Option<u32>,
        now: WallClock,
    ) -> Result<bool, ScheduleError> {
        self.force_state(STATE_ON, duration, now).await
    }

    /// Force the schedule `off` for `duration` minutes (default 30).
    ///
    /// # Errors
    ///
    /// See [`set_override`](Self::set_override).
    pub async fn turn_off(
        &self,
        duration: Option<u32>,
        now: WallClock,
    ) -> Result<bool, ScheduleError> {
        self.force_state(STATE_OFF, duration, now).await
    }

    /// Flip between `on` and `off` for `duration` minutes (default 30).
    ///
    /// Only applies when both states are known and the current state is one
    /// of them.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::Invariant`] when the current state cannot be
    /// determined, or any error of [`set_override`](Self::set_override).
    pub async fn toggle(
        &self,
        duration: Option<u32>,
        now: WallClock,
    ) -> Result<bool, ScheduleError> {
        let mut runtime = self.runtime.lock().await;
        let known = &runtime.compiled.known_states;
        if !(known.contains(STATE_ON) && known.contains(STATE_OFF)) {
            return Ok(false);
        }
        let current = snapshot(&runtime.compiled, TimeOfDay::from(now).truncate_to_minute())?;
        let target = match current.state.as_str() {
            STATE_ON => STATE_OFF,
            STATE_OFF => STATE_ON,
            _ => return Ok(false),
        };
        self.apply_override(&mut runtime, on_off_request(target, duration), now)
            .await
    }

    /// Load persisted overrides and rebuild. Malformed records are dropped
    /// one by one; returns how many records were kept.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the repository cannot be read.
    #[tracing::instrument(skip(self), fields(schedule = %self.definition.name))]
    pub async fn restore(&self, now: WallClock) -> Result<usize, ScheduleError> {
        let records = self.repository.load(self.id).await?;
        let total = records.len();
        let overrides: Vec<Override> = records
            .into_iter()
            .filter_map(|record| match Override::from_persisted(record) {
                Ok(o) => Some(o),
                Err(err) => {
                    tracing::warn!(%err, "dropping malformed persisted override");
                    None
                }
            })
            .collect();
        tracing::info!(restored = overrides.len(), total, "overrides restored");

        let mut runtime = self.runtime.lock().await;
        runtime.overrides = OverrideStore::restore(overrides);
        self.rebuild(&mut runtime, now);
        Ok(runtime.overrides.len())
    }

    /// Write the live overrides through the repository.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the repository cannot be written.
    pub async fn persist(&self) -> Result<(), ScheduleError> {
        let runtime = self.runtime.lock().await;
        self.save(&runtime.overrides).await
    }

    async fn force_state(
        &self,
        state: &str,
        duration: Option<u32>,
        now: WallClock,
    ) -> Result<bool, ScheduleError> {
        let mut runtime = self.runtime.lock().await;
        if !runtime.compiled.known_states.contains(state) {
            tracing::debug!(
                schedule = %self.definition.name,
                state,
                "state is not known, ignoring"
            );
            return Ok(false);
        }
        self.apply_override(&mut runtime, on_off_request(state, duration), now)
            .await
    }

    fn filter_attributes(
        &self,
        attributes: BTreeMap<String, AttributeValue>,
    ) -> BTreeMap<String, AttributeValue> {
        attributes
            .into_iter()
            .filter(|(name, value)| {
                if !self.definition.extra_attributes.contains_key(name) {
                    tracing::warn!(
                        schedule = %self.definition.name,
                        attribute = %name,
                        "ignoring unknown attribute"
                    );
                    return false;
                }
                !matches!(value, AttributeValue::Json(serde_json::Value::Null))
            })
            .collect()
    }

    /// Rebuild, persist and announce after an override change.
    async fn commit(&self, runtime: &mut Runtime, now: WallClock) -> Result<(), ScheduleError> {
        self.rebuild(runtime, now);
        let count = runtime.overrides.len();
        let saved = self.save(&runtime.overrides).await;
        self.publish(EventType::OverridesChanged, serde_json::json!({ "count": count }))
            .await;
        saved
    }

    /// Sweep expired overrides and recompile. Returns how many were swept.
    fn rebuild(&self, runtime: &mut Runtime, now: WallClock) -> usize {
        let swept = runtime.overrides.sweep_expired(now);
        if swept > 0 {
            tracing::info!(schedule = %self.definition.name, swept, "expired overrides removed");
        }
        runtime.compiled = self.compiler.compile(
            &self.definition,
            runtime.overrides.as_slice(),
            runtime.pending_refresh,
            now,
        );
        runtime.pending_refresh = runtime.compiled.force_refresh;
        swept
    }

    fn observe(
        &self,
        runtime: &mut Runtime,
        now: WallClock,
    ) -> Result<(Snapshot, bool), ScheduleError> {
        let current = snapshot(&runtime.compiled, TimeOfDay::from(now).truncate_to_minute())?;
        let changed = runtime
            .last
            .as_ref()
            .is_none_or(|previous| current.differs_from(previous));
        if changed {
            tracing::info!(
                schedule = %self.definition.name,
                state = %current.state,
                start = %current.start,
                end = %current.end,
                next_state = %current.next_state,
                "state changed"
            );
        }
        runtime.last = Some(current.clone());
        Ok((current, changed))
    }

    async fn save(&self, overrides: &OverrideStore) -> Result<(), ScheduleError> {
        let records = overrides
            .iter()
            .filter_map(|o| match o.to_persisted() {
                Ok(record) => Some(record),
                Err(err) => {
                    tracing::warn!(%err, "skipping override that cannot be encoded");
                    None
                }
            })
            .collect();
        self.repository.save(self.id, records).await
    }

    async fn publish(&self, event_type: EventType, data: serde_json::Value) {
        let event = ScheduleEvent::new(event_type, Some(self.id), data);
        if let Err(err) = self.publisher.publish(event).await {
            tracing::warn!(%err, "failed to publish schedule event");
        }
    }
}

fn on_off_request(state: &str, duration: Option<u32>) -> OverrideRequest {
    OverrideRequest::for_state(state)
        .with_id(TURN_ON_OFF_ID)
        .with_duration(duration.unwrap_or(DEFAULT_ON_OFF_MINUTES))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{Evaluation, Outcome, Resolution};
    use chrono::NaiveDate;
    use schedule_state_domain::error::ConfigurationError;
    use schedule_state_domain::schedule::{Condition, EventDefinition, RawValue};
    use std::collections::HashMap;
    use std::future::Future;
    use std::sync::{Arc, Mutex as StdMutex};

    /// `state` conditions looked up in a shared table; unknown → indeterminate.
    #[derive(Default)]
    struct Table {
        states: StdMutex<HashMap<String, String>>,
    }

    impl Table {
        fn set(&self, id: &str, state: &str) {
            self.states
                .lock()
                .unwrap()
                .insert(id.to_string(), state.to_string());
        }
    }

    impl ConditionEvaluator for Table {
        fn evaluate(&self, conditions: &[Condition]) -> Evaluation {
            let states = self.states.lock().unwrap();
            let mut outcome = Outcome::True;
            let mut deps = Vec::new();
            for condition in conditions {
                if let Condition::State { entity_id, state } = condition {
                    deps.push(entity_id.clone());
                    match states.get(entity_id) {
                        None => outcome = Outcome::Indeterminate,
                        Some(actual) if actual != state && outcome == Outcome::True => {
                            outcome = Outcome::False;
                        }
                        Some(_) => {}
                    }
                }
            }
            Evaluation::new(outcome).with_dependencies(deps)
        }
    }

    impl ValueResolver for Table {
        fn resolve(&self, raw: &RawValue) -> Resolution {
            Resolution::literal(raw.clone())
        }
    }

    #[derive(Default)]
    struct InMemoryRepo {
        records: StdMutex<HashMap<ScheduleId, Vec<serde_json::Value>>>,
    }

    impl OverrideRepository for InMemoryRepo {
        fn load(
            &self,
            schedule: ScheduleId,
        ) -> impl Future<Output = Result<Vec<serde_json::Value>, ScheduleError>> + Send {
            let result = self
                .records
                .lock()
                .unwrap()
                .get(&schedule)
                .cloned()
                .unwrap_or_default();
            async { Ok(result) }
        }

        fn save(
            &self,
            schedule: ScheduleId,
            records: Vec<serde_json::Value>,
        ) -> impl Future<Output = Result<(), ScheduleError>> + Send {
            self.records.lock().unwrap().insert(schedule, records);
            async { Ok(()) }
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        events: StdMutex<Vec<ScheduleEvent>>,
    }

    impl RecordingPublisher {
        fn count(&self, event_type: EventType) -> usize {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.event_type == event_type)
                .count()
        }
    }

    impl EventPublisher for RecordingPublisher {
        fn publish(
            &self,
            event: ScheduleEvent,
        ) -> impl Future<Output = Result<(), ScheduleError>> + Send {
            self.events.lock().unwrap().push(event);
            async { Ok(()) }
        }
    }

    type Service =
        ScheduleService<Arc<Table>, Arc<Table>, Arc<InMemoryRepo>, Arc<RecordingPublisher>>;

    struct Harness {
        table: Arc<Table>,
        repo: Arc<InMemoryRepo>,
        publisher: Arc<RecordingPublisher>,
        service: Service,
    }

    fn at(h: u32, m: u32) -> WallClock {
        NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn tod(h: u32, m: u32) -> TimeOfDay {
        TimeOfDay::from_hm(h, m).unwrap()
    }

    fn lights() -> ScheduleDefinition {
        ScheduleDefinition::builder()
            .name("lights")
            .default_state("off")
            .extra_attribute("brightness", 0)
            .event(
                EventDefinition::builder()
                    .start("18:00")
                    .end("23:00")
                    .state("on")
                    .attribute("brightness", 80)
                    .build(),
            )
            .build()
            .unwrap()
    }

    fn harness(definition: ScheduleDefinition, now: WallClock) -> Harness {
        harness_with(definition, now, &[])
    }

    fn harness_with(
        definition: ScheduleDefinition,
        now: WallClock,
        states: &[(&str, &str)],
    ) -> Harness {
        let table = Arc::new(Table::default());
        for (id, state) in states {
            table.set(id, state);
        }
        let repo = Arc::new(InMemoryRepo::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let compiler = ScheduleCompiler::new(Arc::clone(&table), Arc::clone(&table));
        let service = ScheduleService::new(
            definition,
            compiler,
            Arc::clone(&repo),
            Arc::clone(&publisher),
            now,
        );
        Harness {
            table,
            repo,
            publisher,
            service,
        }
    }

    #[tokio::test]
    async fn should_report_state_window_and_next_state() {
        let h = harness(lights(), at(10, 0));
        let s = h.service.update(at(19, 30)).await.unwrap();

        assert_eq!(s.state, "on");
        assert_eq!((s.start, s.end), (tod(18, 0), tod(23, 0)));
        assert_eq!(s.next_state, "off");
        assert_eq!(s.attributes["brightness"], Some(AttributeValue::Int(80)));
    }

    #[tokio::test]
    async fn should_publish_state_changed_only_on_change() {
        let h = harness(lights(), at(10, 0));
        h.service.update(at(10, 0)).await.unwrap();
        h.service.update(at(10, 1)).await.unwrap();
        h.service.update(at(18, 0)).await.unwrap();

        assert_eq!(h.publisher.count(EventType::StateChanged), 2);
    }

    #[tokio::test]
    async fn should_apply_override_and_persist_it() {
        let h = harness(lights(), at(10, 0));
        let request = OverrideRequest::for_state("on")
            .with_id("movie")
            .with_duration(30)
            .with_attribute("brightness", AttributeValue::Int(20));

        assert!(h.service.set_override(request, at(10, 0)).await.unwrap());

        let s = h.service.update(at(10, 15)).await.unwrap();
        assert_eq!(s.state, "on");
        assert_eq!(s.end, tod(10, 30));
        assert_eq!(s.attributes["brightness"], Some(AttributeValue::Int(20)));

        let saved = h.repo.records.lock().unwrap()[&h.service.id()].clone();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0]["id"], "movie");
        assert_eq!(h.publisher.count(EventType::OverridesChanged), 1);
    }

    #[tokio::test]
    async fn should_reject_invalid_request_without_changes() {
        let h = harness(lights(), at(10, 0));
        let result = h
            .service
            .set_override(OverrideRequest::for_state("on"), at(10, 0))
            .await;

        assert!(matches!(
            result,
            Err(ScheduleError::Configuration(ConfigurationError::MissingWindow))
        ));
        assert!(h.service.overrides().await.is_empty());
        assert!(h.repo.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_ignore_unknown_override_attributes() {
        let h = harness(lights(), at(10, 0));
        let request = OverrideRequest::for_state("on")
            .with_duration(30)
            .with_attribute("colour", "red");
        h.service.set_override(request, at(10, 0)).await.unwrap();

        let overrides = h.service.overrides().await;
        assert!(overrides[0].extra_attributes.is_empty());
    }

    #[tokio::test]
    async fn should_sweep_expired_override_on_update() {
        let h = harness(lights(), at(10, 0));
        let request = OverrideRequest::for_state("on").with_duration(30);
        h.service.set_override(request, at(10, 0)).await.unwrap();

        let s = h.service.update(at(10, 31)).await.unwrap();
        assert_eq!(s.state, "off");
        assert!(h.service.overrides().await.is_empty());
    }

    #[tokio::test]
    async fn should_drop_expired_overrides_when_another_is_removed() {
        let h = harness(lights(), at(10, 0));
        let boost = OverrideRequest::for_state("boost").with_duration(30);
        h.service.set_override(boost, at(10, 0)).await.unwrap();
        let movie = OverrideRequest::for_state("on").with_id("b").with_duration(120);
        h.service.set_override(movie, at(10, 0)).await.unwrap();

        assert!(h.service.remove_override("b", at(11, 0)).await.unwrap());

        assert!(h.service.overrides().await.is_empty());
        assert!(!h.service.known_states().await.contains("boost"));
        let saved = h.repo.records.lock().unwrap()[&h.service.id()].clone();
        assert!(saved.is_empty());
    }

    #[tokio::test]
    async fn should_drop_expired_overrides_on_recalculate() {
        let h = harness(lights(), at(10, 0));
        let boost = OverrideRequest::for_state("boost").with_duration(30);
        h.service.set_override(boost, at(10, 0)).await.unwrap();
        assert!(h.service.known_states().await.contains("boost"));

        h.service.recalculate(at(10, 45)).await;
        assert!(h.service.overrides().await.is_empty());
        assert!(!h.service.known_states().await.contains("boost"));
    }

    #[tokio::test]
    async fn should_remove_override_by_id_and_report_unknown_id() {
        let h = harness(lights(), at(10, 0));
        let request = OverrideRequest::for_state("on").with_id("x").with_duration(30);
        h.service.set_override(request, at(10, 0)).await.unwrap();

        assert!(!h.service.remove_override("y", at(10, 1)).await.unwrap());
        assert_eq!(h.service.overrides().await.len(), 1);
        assert!(h.service.remove_override("x", at(10, 1)).await.unwrap());
        assert_eq!(h.service.update(at(10, 5)).await.unwrap().state, "off");
    }

    #[tokio::test]
    async fn should_clear_overrides_only_when_present() {
        let h = harness(lights(), at(10, 0));
        assert!(!h.service.clear_overrides(at(10, 0)).await.unwrap());
        let request = OverrideRequest::for_state("on").with_duration(30);
        h.service.set_override(request, at(10, 0)).await.unwrap();
        assert!(h.service.clear_overrides(at(10, 0)).await.unwrap());
    }

    #[tokio::test]
    async fn should_turn_on_only_when_state_is_known() {
        let h = harness(lights(), at(10, 0));
        assert!(h.service.turn_on(None, at(10, 0)).await.unwrap());
        let overrides = h.service.overrides().await;
        assert_eq!(overrides[0].id.as_deref(), Some(TURN_ON_OFF_ID));
        assert_eq!(overrides[0].end, tod(10, 30));

        let plain = harness(
            ScheduleDefinition::builder().name("plain").build().unwrap(),
            at(10, 0),
        );
        assert!(!plain.service.turn_on(None, at(10, 0)).await.unwrap());
    }

    #[tokio::test]
    async fn should_toggle_between_on_and_off() {
        let h = harness(lights(), at(10, 0));
        assert!(h.service.toggle(Some(15), at(10, 0)).await.unwrap());
        assert_eq!(h.service.update(at(10, 5)).await.unwrap().state, "on");

        assert!(h.service.toggle(Some(15), at(10, 5)).await.unwrap());
        assert_eq!(h.service.update(at(10, 6)).await.unwrap().state, "off");
        assert_eq!(h.service.overrides().await.len(), 1);
    }

    #[tokio::test]
    async fn should_settle_concurrent_toggles_one_after_the_other() {
        let h = harness(lights(), at(10, 0));
        let (first, second) = tokio::join!(
            h.service.toggle(Some(15), at(10, 0)),
            h.service.toggle(Some(15), at(10, 0)),
        );
        assert!(first.unwrap());
        assert!(second.unwrap());

        let overrides = h.service.overrides().await;
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].state, "off");
        assert_eq!(h.publisher.count(EventType::OverridesChanged), 2);
    }

    #[tokio::test]
    async fn should_restore_persisted_overrides_dropping_malformed_ones() {
        let h = harness(lights(), at(10, 0));
        h.repo.records.lock().unwrap().insert(
            h.service.id(),
            vec![
                serde_json::json!({
                    "id": "keep",
                    "state": "on",
                    "start": "10:00:00",
                    "end": "11:00:00",
                    "expires": "2024-03-10T11:00:30",
                    "icon": null
                }),
                serde_json::json!({ "state": "on", "start": "bogus" }),
            ],
        );

        assert_eq!(h.service.restore(at(10, 0)).await.unwrap(), 1);
        assert_eq!(h.service.update(at(10, 30)).await.unwrap().state, "on");
    }

    #[tokio::test]
    async fn should_recompile_when_dependency_changes() {
        let definition = ScheduleDefinition::builder()
            .name("heating")
            .default_state("eco")
            .event(
                EventDefinition::builder()
                    .state("comfort")
                    .condition(Condition::State {
                        entity_id: "person.alice".into(),
                        state: "home".into(),
                    })
                    .build(),
            )
            .build()
            .unwrap();
        let h = harness_with(definition, at(10, 0), &[("person.alice", "away")]);
        assert_eq!(h.service.update(at(10, 0)).await.unwrap().state, "eco");

        h.table.set("person.alice", "home");
        assert!(
            h.service
                .dependency_changed(&["light.kitchen".to_string()], at(10, 1))
                .await
                .unwrap()
                .is_none()
        );
        let s = h
            .service
            .dependency_changed(&["person.alice".to_string()], at(10, 1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(s.state, "comfort");
    }

    #[tokio::test]
    async fn should_schedule_forced_refresh_and_clear_it_when_it_fires() {
        let definition = ScheduleDefinition::builder()
            .name("heating")
            .default_state("eco")
            .minutes_to_refresh_on_error(5)
            .event(
                EventDefinition::builder()
                    .state("comfort")
                    .condition(Condition::State {
                        entity_id: "person.bob".into(),
                        state: "home".into(),
                    })
                    .build(),
            )
            .build()
            .unwrap();
        let h = harness(definition, at(10, 0));

        let s = h.service.update(at(10, 0)).await.unwrap();
        assert_eq!(s.errors, vec!["comfort"]);
        assert_eq!(h.service.force_refresh().await, Some(at(10, 5)));

        h.table.set("person.bob", "home");
        h.service.update(at(10, 5)).await.unwrap();
        assert_eq!(h.service.force_refresh().await, Some(at(10, 5)));

        let s = h.service.update(at(10, 6)).await.unwrap();
        assert_eq!(s.state, "comfort");
        assert!(s.errors.is_empty());
        assert_eq!(h.service.force_refresh().await, None);
    }

    #[tokio::test]
    async fn should_refresh_when_period_elapses() {
        let definition = ScheduleDefinition::builder()
            .name("heating")
            .default_state("eco")
            .refresh_minutes(60)
            .event(
                EventDefinition::builder()
                    .state("comfort")
                    .condition(Condition::State {
                        entity_id: "person.carol".into(),
                        state: "home".into(),
                    })
                    .build(),
            )
            .build()
            .unwrap();
        let h = harness_with(definition, at(10, 0), &[("person.carol", "away")]);
        assert!(h.service.force_refresh().await.is_none());

        h.table.set("person.carol", "home");
        assert_eq!(h.service.update(at(10, 59)).await.unwrap().state, "eco");
        assert_eq!(h.service.update(at(11, 0)).await.unwrap().state, "comfort");
    }
}
