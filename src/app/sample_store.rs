use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::domain::models::{DeviceId, PositionSample};
use crate::domain::session_state::TimestampMs;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoredSample {
    pub sample: PositionSample,
    pub received_at: TimestampMs,
    /// False once a later poll for the same device failed.
    pub fresh: bool,
}

/// Latest position per device. Written by tracker entities, read by derived sensors.
///
/// A reader polling in the same tick as the writer may observe the previous
/// tick's sample; readers never wait for the writer.
#[derive(Debug, Clone, Default)]
pub struct SampleStore {
    inner: Arc<RwLock<HashMap<DeviceId, StoredSample>>>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, device_id: DeviceId, sample: PositionSample, received_at: TimestampMs) {
        self.write().insert(
            device_id,
            StoredSample {
                sample,
                received_at,
                fresh: true,
            },
        );
    }

    pub fn mark_stale(&self, device_id: DeviceId) {
        if let Some(stored) = self.write().get_mut(&device_id) {
            stored.fresh = false;
        }
    }

    pub fn latest(&self, device_id: DeviceId) -> Option<StoredSample> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&device_id)
            .copied()
    }

    pub fn remove(&self, device_id: DeviceId) -> Option<StoredSample> {
        self.write().remove(&device_id)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<DeviceId, StoredSample>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
