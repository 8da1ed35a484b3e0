use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::adapters::api::{ApiState, configure_routes};
use crate::adapters::paj_http::{PajApi, PajHttpClient};
use crate::adapters::paj_replay::PajReplayClient;
use crate::app::config::AppConfig;
use crate::app::entities::Entity;
use crate::app::entry::{ConfigEntry, SetupError, setup_entry};
use crate::app::error::AppError;
use crate::app::registry::EntityRegistry;
use crate::app::sample_store::SampleStore;
use crate::domain::models::DeviceId;
use crate::domain::session_state::{Clock, TimestampMs};

#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimestampMs {
        TimestampMs(Utc::now().timestamp_millis())
    }
}

#[derive(Debug)]
pub enum HostCommand {
    /// Options changed: tear the entry down and set it up again.
    Reload,
    /// The host deleted a device record.
    RemoveDevice {
        device_id: DeviceId,
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

struct ActiveEntry {
    store: SampleStore,
    tasks: HashMap<DeviceId, Vec<JoinHandle<()>>>,
}

/// Owns one config entry's entities and their poll tasks.
pub struct EntryRuntime<A, Cl> {
    api: Arc<A>,
    clock: Cl,
    entry: ConfigEntry,
    registry: EntityRegistry,
    poll_interval: Duration,
    active: Option<ActiveEntry>,
}

impl<A, Cl> EntryRuntime<A, Cl>
where
    A: PajApi,
    Cl: Clock + Clone + 'static,
{
    pub fn new(
        api: Arc<A>,
        clock: Cl,
        entry: ConfigEntry,
        registry: EntityRegistry,
        poll_interval: Duration,
    ) -> Self {
        Self {
            api,
            clock,
            entry,
            registry,
            poll_interval,
            active: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.active.is_some()
    }

    pub async fn setup(&mut self) -> Result<(), SetupError> {
        let mut set = setup_entry(Arc::clone(&self.api), self.clock.clone(), &self.entry).await?;
        set.update_before_add().await;

        for info in set.devices.values() {
            self.registry.register_device(info.clone());
        }

        let mut tasks: HashMap<DeviceId, Vec<JoinHandle<()>>> = HashMap::new();
        for entity in set.entities {
            self.registry.upsert(entity.snapshot());
            let device_id = entity.device_id();
            let handle = actix_web::rt::spawn(poll_entity(
                entity,
                self.poll_interval,
                self.registry.clone(),
            ));
            tasks.entry(device_id).or_default().push(handle);
        }

        self.active = Some(ActiveEntry {
            store: set.store,
            tasks,
        });
        Ok(())
    }

    pub fn unload(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        for handle in active.tasks.values().flatten() {
            handle.abort();
        }
        self.registry.clear();
        tracing::info!(entry_id = %self.entry.entry_id, "config entry unloaded");
    }

    pub async fn reload(&mut self) -> Result<(), SetupError> {
        tracing::info!(entry_id = %self.entry.entry_id, "reloading config entry");
        self.unload();
        self.setup().await
    }

    pub fn remove_device(&mut self, device_id: DeviceId) -> bool {
        let Some(active) = self.active.as_mut() else {
            tracing::warn!(%device_id, "device not found");
            return false;
        };
        let Some(handles) = active.tasks.remove(&device_id) else {
            tracing::warn!(%device_id, "device not found");
            return false;
        };

        for handle in handles {
            handle.abort();
        }
        active.store.remove(device_id);
        self.registry.remove_device(device_id);
        tracing::info!(%device_id, "device removed");
        true
    }

    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<HostCommand>) {
        if let Err(error) = self.setup().await {
            tracing::error!(error = %error, "config entry setup failed, no entities added");
        }

        while let Some(command) = commands.recv().await {
            match command {
                HostCommand::Reload => {
                    if let Err(error) = self.reload().await {
                        tracing::error!(error = %error, "config entry reload failed");
                    }
                }
                HostCommand::RemoveDevice { device_id, reply } => {
                    let removed = self.remove_device(device_id);
                    let _ = reply.send(removed);
                }
                HostCommand::Shutdown => break,
            }
        }

        self.unload();
    }
}

async fn poll_entity<A, Cl>(mut entity: Entity<A, Cl>, period: Duration, registry: EntityRegistry)
where
    A: PajApi,
    Cl: Clock,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the immediate first tick is covered by the update before add
    ticker.tick().await;

    loop {
        ticker.tick().await;
        entity.update().await;
        registry.upsert(entity.snapshot());
    }
}

pub fn run(config: AppConfig) -> Result<(), AppError> {
    actix_web::rt::System::new().block_on(async move {
        match config.replay_file.clone() {
            Some(path) => {
                let api = PajReplayClient::from_file(&path).map_err(AppError::runtime)?;
                tracing::info!(path = %path, "using scripted replay client");
                serve(Arc::new(api), config).await
            }
            None => {
                let api = PajHttpClient::new(&config.api_url, config.http_timeout)
                    .map_err(AppError::runtime)?;
                serve(Arc::new(api), config).await
            }
        }
    })
}

async fn serve<A: PajApi>(api: Arc<A>, config: AppConfig) -> Result<(), AppError> {
    let registry = EntityRegistry::new();
    let (commands, receiver) = mpsc::unbounded_channel();

    let entry = ConfigEntry::new(config.credentials(), config.entry_options());
    tracing::info!(entry_id = %entry.entry_id, "config entry created");

    let api_state = ApiState {
        registry: registry.clone(),
        commands: commands.clone(),
    };

    tracing::info!(bind = %config.http_bind, "http server starting");

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(web::Data::new(api_state.clone()))
            .configure(configure_routes)
    })
    .bind(&config.http_bind)
    .map_err(AppError::runtime)?;

    // polling starts only once the host surface is bound
    let runtime = EntryRuntime::new(
        api,
        SystemClock,
        entry,
        registry,
        config.poll_interval(),
    );
    let supervisor = actix_web::rt::spawn(runtime.run(receiver));

    let server_result = server.run().await;

    let _ = commands.send(HostCommand::Shutdown);
    if supervisor.await.is_err() {
        return Err(AppError::runtime("entry supervisor panicked"));
    }

    server_result.map_err(AppError::runtime)
}
