use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::adapters::paj_http::{PajApi, PajApiError};
use crate::app::entities::{Entity, entities_for_device};
use crate::app::sample_store::SampleStore;
use crate::app::session::TokenManager;
use crate::domain::models::{Credentials, DeviceId, DeviceInfo};
use crate::domain::paj_payload::DeviceListPolicy;
use crate::domain::session_state::{Clock, RefreshPolicy};

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("email or password not set")]
    MissingCredentials,
    #[error("could not get login token")]
    Login,
    #[error("could not get devices: {0}")]
    ListDevices(#[source] PajApiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryOptions {
    pub refresh_policy: RefreshPolicy,
    pub device_list_policy: DeviceListPolicy,
}

/// One configured account.
#[derive(Debug, Clone)]
pub struct ConfigEntry {
    pub entry_id: Uuid,
    pub credentials: Credentials,
    pub options: EntryOptions,
}

impl ConfigEntry {
    pub fn new(credentials: Credentials, options: EntryOptions) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            credentials,
            options,
        }
    }
}

/// Everything a set-up entry contributes to the host.
pub struct EntitySet<A, Cl> {
    pub entry_id: Uuid,
    pub tokens: Arc<TokenManager<A, Cl>>,
    pub store: SampleStore,
    pub devices: BTreeMap<DeviceId, DeviceInfo>,
    pub entities: Vec<Entity<A, Cl>>,
}

impl<A, Cl> EntitySet<A, Cl>
where
    A: PajApi,
    Cl: Clock,
{
    /// Runs one update on every entity, tracker first, before the set is handed to the host.
    pub async fn update_before_add(&mut self) {
        for entity in &mut self.entities {
            entity.update().await;
        }
    }
}

pub async fn setup_entry<A, Cl>(
    api: Arc<A>,
    clock: Cl,
    entry: &ConfigEntry,
) -> Result<EntitySet<A, Cl>, SetupError>
where
    A: PajApi,
    Cl: Clock + Clone,
{
    if !entry.credentials.is_complete() {
        tracing::error!(entry_id = %entry.entry_id, "email or password not set");
        return Err(SetupError::MissingCredentials);
    }

    let tokens = Arc::new(TokenManager::new(
        Arc::clone(&api),
        clock.clone(),
        entry.credentials.clone(),
        entry.options.refresh_policy,
    ));

    let Some(token) = tokens.ensure_token().await else {
        tracing::error!(entry_id = %entry.entry_id, "could not get login token");
        return Err(SetupError::Login);
    };

    let descriptors = api
        .list_devices(&token, entry.options.device_list_policy)
        .await
        .map_err(|error| {
            tracing::error!(entry_id = %entry.entry_id, error = %error, "could not get devices");
            SetupError::ListDevices(error)
        })?;

    let store = SampleStore::new();
    let mut devices = BTreeMap::new();
    let mut entities = Vec::new();

    for descriptor in descriptors.values() {
        devices.insert(descriptor.id, DeviceInfo::for_descriptor(descriptor));
        entities.extend(entities_for_device(
            descriptor,
            &api,
            &tokens,
            &store,
            clock.clone(),
        ));
    }

    tracing::info!(
        entry_id = %entry.entry_id,
        devices = devices.len(),
        entities = entities.len(),
        "config entry set up"
    );

    Ok(EntitySet {
        entry_id: entry.entry_id,
        tokens,
        store,
        devices,
        entities,
    })
}
