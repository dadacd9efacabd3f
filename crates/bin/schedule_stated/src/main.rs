//! # schedule-stated — schedule state daemon
//!
//! Composition root that wires all adapters together and runs the update loop.
//!
//! ## Responsibilities
//! - Parse configuration (env vars, config file)
//! - Install the tracing subscriber
//! - Construct the virtual entity table and the JSON override repository
//! - Construct one `ScheduleService` per configured schedule, restoring its
//!   persisted overrides
//! - Update every schedule on each tick and rebuild schedules whose
//!   dependencies changed
//! - Persist overrides on graceful shutdown (Ctrl-C)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use schedule_state_adapter_storage_json::JsonOverrideRepository;
use schedule_state_adapter_virtual::VirtualEntities;
use schedule_state_app::compiler::ScheduleCompiler;
use schedule_state_app::event_bus::InProcessEventBus;
use schedule_state_app::services::registry::ScheduleRegistry;
use schedule_state_app::services::schedule_service::ScheduleService;
use schedule_state_domain::event::{EventType, ScheduleEvent};
use schedule_state_domain::time::now;

use crate::config::Config;

type Registry = ScheduleRegistry<
    VirtualEntities,
    VirtualEntities,
    JsonOverrideRepository,
    Arc<InProcessEventBus>,
>;

fn build_registry(
    config: &Config,
    entities: &VirtualEntities,
    repository: &JsonOverrideRepository,
    bus: &Arc<InProcessEventBus>,
) -> anyhow::Result<Registry> {
    let mut registry = Registry::new();
    for definition in &config.schedules {
        let service = ScheduleService::new(
            definition.clone(),
            ScheduleCompiler::new(entities.clone(), entities.clone()),
            repository.clone(),
            Arc::clone(bus),
            now(),
        );
        registry
            .insert(service)
            .with_context(|| format!("unable to register schedule {:?}", definition.name))?;
    }
    Ok(registry)
}

fn log_event(event: &ScheduleEvent) {
    if event.event_type == EventType::StateChanged {
        tracing::info!(
            schedule = %event.schedule_id.map(|id| id.to_string()).unwrap_or_default(),
            state = %event.data["state"],
            next_state = %event.data["next_state"],
            end = %event.data["end"],
            "state changed"
        );
    }
}

async fn update(registry: &Registry) {
    for (name, result) in registry.update_all(now()).await {
        if let Err(err) = result {
            tracing::error!(schedule = %name, %err, "update failed");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("unable to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    let entities = VirtualEntities::new().with_states(config.entities.clone());
    let repository = JsonOverrideRepository::new(&config.storage.directory);
    let bus = Arc::new(InProcessEventBus::new(256));
    let registry = build_registry(&config, &entities, &repository, &bus)?;

    for (name, result) in registry.restore_all(now()).await {
        match result {
            Ok(count) => tracing::info!(schedule = %name, count, "overrides restored"),
            Err(err) => tracing::warn!(schedule = %name, %err, "unable to restore overrides"),
        }
    }
    tracing::info!(
        schedules = registry.len(),
        entities = entities.len(),
        storage = %repository.directory().display(),
        "schedule-stated started"
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(config.runtime.tick_seconds));
    let mut changes = entities.subscribe();
    let mut events = bus.subscribe();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => update(&registry).await,
            change = changes.recv() => match change {
                Ok(change) => {
                    let ids = [change.entity_id];
                    for (name, result) in registry.dependency_changed(&ids, now()).await {
                        if let Err(err) = result {
                            tracing::error!(schedule = %name, %err, "rebuild failed");
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "entity changes lagged, rebuilding every schedule");
                    registry.recalculate(&[], now()).await?;
                    update(&registry).await;
                }
                Err(RecvError::Closed) => break,
            },
            event = events.recv() => match event {
                Some(event) => log_event(&event),
                None => break,
            },
            result = &mut shutdown => {
                result.context("unable to listen for shutdown signal")?;
                tracing::info!("shutting down");
                break;
            }
        }
    }

    for (name, result) in registry.persist_all().await {
        if let Err(err) = result {
            tracing::error!(schedule = %name, %err, "unable to persist overrides");
        }
    }
    Ok(())
}
