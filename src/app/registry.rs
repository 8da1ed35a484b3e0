use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::app::entities::EntitySnapshot;
use crate::domain::models::{DeviceId, DeviceInfo};

#[derive(Debug, Default)]
struct RegistryState {
    entities: BTreeMap<String, EntitySnapshot>,
    devices: BTreeMap<DeviceId, DeviceInfo>,
}

/// Host-side view of registered devices and the latest snapshot of each entity.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    inner: Arc<RwLock<RegistryState>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_device(&self, info: DeviceInfo) {
        self.write().devices.insert(info.identifiers.1, info);
    }

    pub fn upsert(&self, snapshot: EntitySnapshot) {
        let mut state = self.write();
        // a poll finishing after its device was removed must not resurrect it
        if state.devices.contains_key(&snapshot.device_id) {
            state.entities.insert(snapshot.unique_id.clone(), snapshot);
        }
    }

    pub fn entities(&self) -> Vec<EntitySnapshot> {
        self.read().entities.values().cloned().collect()
    }

    pub fn entity(&self, unique_id: &str) -> Option<EntitySnapshot> {
        self.read().entities.get(unique_id).cloned()
    }

    pub fn devices(&self) -> Vec<DeviceInfo> {
        self.read().devices.values().cloned().collect()
    }

    /// Unregisters the device and every entity grouped under it.
    pub fn remove_device(&self, device_id: DeviceId) -> bool {
        let mut state = self.write();
        state
            .entities
            .retain(|_, snapshot| snapshot.device_id != device_id);
        state.devices.remove(&device_id).is_some()
    }

    pub fn clear(&self) {
        let mut state = self.write();
        state.entities.clear();
        state.devices.clear();
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
