use std::sync::Arc;

use serde::Serialize;

use crate::adapters::paj_http::{PajApi, PajApiError};
use crate::app::sample_store::SampleStore;
use crate::app::session::TokenManager;
use crate::domain::models::{DeviceDescriptor, DeviceId, PositionSample};
use crate::domain::sensor_values::{PollState, battery_icon, clamp_battery, clamp_speed};
use crate::domain::session_state::{Clock, TimestampMs};

pub const TRACKER_ICON: &str = "mdi:map-marker";
pub const SPEED_ICON: &str = "mdi:speedometer";
const MEASUREMENT: &str = "measurement";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reading {
    Location {
        latitude: Option<f64>,
        longitude: Option<f64>,
        heading: Option<f64>,
        accuracy: Option<f64>,
        battery_level: Option<i64>,
        speed: Option<i64>,
        source_type: &'static str,
    },
    Battery {
        level: Option<i64>,
        unit: &'static str,
    },
    Speed {
        speed: Option<i64>,
        unit: &'static str,
    },
}

/// What the host sees of an entity after its latest update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySnapshot {
    pub unique_id: String,
    pub name: String,
    pub device_id: DeviceId,
    pub icon: &'static str,
    pub state: PollState,
    pub reading: Reading,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<String>,
    pub updated_at_ms: Option<i64>,
}

/// Primary entity of a tracker: the only one that talks to the network.
pub struct TrackerEntity<A, Cl> {
    descriptor: DeviceDescriptor,
    api: Arc<A>,
    tokens: Arc<TokenManager<A, Cl>>,
    store: SampleStore,
    clock: Cl,
    state: PollState,
    last_sample: Option<PositionSample>,
    updated_at: Option<TimestampMs>,
}

impl<A, Cl> TrackerEntity<A, Cl>
where
    A: PajApi,
    Cl: Clock,
{
    pub fn new(
        descriptor: DeviceDescriptor,
        api: Arc<A>,
        tokens: Arc<TokenManager<A, Cl>>,
        store: SampleStore,
        clock: Cl,
    ) -> Self {
        Self {
            descriptor,
            api,
            tokens,
            store,
            clock,
            state: PollState::Uninitialized,
            last_sample: None,
            updated_at: None,
        }
    }

    pub fn device_id(&self) -> DeviceId {
        self.descriptor.id
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn last_sample(&self) -> Option<&PositionSample> {
        self.last_sample.as_ref()
    }

    pub async fn update(&mut self) {
        let device_id = self.device_id();

        let Some(token) = self.tokens.ensure_token().await else {
            tracing::error!(%device_id, "no bearer token available, position not fetched");
            self.record_failure();
            return;
        };

        match self.api.latest_position(&token, device_id).await {
            Ok(sample) => {
                let now = self.clock.now();
                self.store.publish(device_id, sample, now);
                self.last_sample = Some(sample);
                self.updated_at = Some(now);
                self.state = PollState::Fresh;
                tracing::debug!(%device_id, %sample, "position updated");
            }
            Err(PajApiError::NoData) => {
                tracing::error!(%device_id, "no data for PAJ GPS device");
                self.record_failure();
            }
            Err(error) => {
                if error.is_auth() {
                    self.tokens.invalidate();
                }
                tracing::error!(%device_id, error = %error, "position fetch failed");
                self.record_failure();
            }
        }
    }

    fn record_failure(&mut self) {
        self.state = PollState::after_failure(self.last_sample.is_some());
        self.store.mark_stale(self.device_id());
    }

    pub fn snapshot(&self) -> EntitySnapshot {
        let current = match self.state {
            PollState::Fresh => self.last_sample,
            PollState::Stale | PollState::Uninitialized => None,
        };

        EntitySnapshot {
            unique_id: tracker_unique_id(self.device_id()),
            name: format!("PAJ GPS {}", self.device_id()),
            device_id: self.device_id(),
            icon: TRACKER_ICON,
            state: self.state,
            reading: Reading::Location {
                latitude: current.map(|sample| sample.latitude),
                longitude: current.map(|sample| sample.longitude),
                heading: current.map(|sample| sample.heading),
                accuracy: current.map(|sample| sample.accuracy),
                battery_level: current.map(|sample| clamp_battery(sample.battery)),
                speed: current.map(|sample| clamp_speed(sample.speed)),
                source_type: "gps",
            },
            device_class: None,
            state_class: None,
            raw_data: self.last_sample.map(|sample| sample.to_string()),
            updated_at_ms: self.updated_at.map(|at| at.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Facet {
    Battery,
    Speed,
}

impl Facet {
    fn extract(self, sample: &PositionSample) -> i64 {
        match self {
            Self::Battery => clamp_battery(sample.battery),
            Self::Speed => clamp_speed(sample.speed),
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Self::Battery => "battery",
            Self::Speed => "speed",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Battery => "Battery Level",
            Self::Speed => "Speed",
        }
    }

    fn device_class(self) -> Option<&'static str> {
        match self {
            Self::Battery => Some("battery"),
            Self::Speed => None,
        }
    }
}

/// Battery or speed view of the latest sample stored for a device. Never polls.
#[derive(Debug, Clone)]
pub struct DerivedSensor {
    facet: Facet,
    device_id: DeviceId,
    store: SampleStore,
    state: PollState,
    value: Option<i64>,
    updated_at: Option<TimestampMs>,
}

impl DerivedSensor {
    pub fn new(facet: Facet, device_id: DeviceId, store: SampleStore) -> Self {
        Self {
            facet,
            device_id,
            store,
            state: PollState::Uninitialized,
            value: None,
            updated_at: None,
        }
    }

    pub fn facet(&self) -> Facet {
        self.facet
    }

    pub fn value(&self) -> Option<i64> {
        self.value
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn refresh(&mut self) {
        match self.store.latest(self.device_id) {
            Some(stored) => {
                self.value = Some(self.facet.extract(&stored.sample));
                self.updated_at = Some(stored.received_at);
                self.state = if stored.fresh {
                    PollState::Fresh
                } else {
                    PollState::Stale
                };
            }
            None => self.state = PollState::after_failure(self.value.is_some()),
        }
    }

    pub fn snapshot(&self) -> EntitySnapshot {
        let (icon, reading) = match self.facet {
            Facet::Battery => (
                battery_icon(self.value),
                Reading::Battery {
                    level: self.value,
                    unit: "%",
                },
            ),
            Facet::Speed => (
                SPEED_ICON,
                Reading::Speed {
                    speed: self.value,
                    unit: "km/h",
                },
            ),
        };

        EntitySnapshot {
            unique_id: format!("pajgps_{}_{}", self.device_id, self.facet.suffix()),
            name: format!("PAJ GPS {} {}", self.device_id, self.facet.label()),
            device_id: self.device_id,
            icon,
            state: self.state,
            reading,
            device_class: self.facet.device_class(),
            state_class: Some(MEASUREMENT),
            raw_data: None,
            updated_at_ms: self.updated_at.map(|at| at.0),
        }
    }
}

pub enum Entity<A, Cl> {
    Tracker(TrackerEntity<A, Cl>),
    Derived(DerivedSensor),
}

impl<A, Cl> Entity<A, Cl>
where
    A: PajApi,
    Cl: Clock,
{
    pub fn device_id(&self) -> DeviceId {
        match self {
            Self::Tracker(tracker) => tracker.device_id(),
            Self::Derived(sensor) => sensor.device_id,
        }
    }

    pub fn unique_id(&self) -> String {
        self.snapshot().unique_id
    }

    pub async fn update(&mut self) {
        match self {
            Self::Tracker(tracker) => tracker.update().await,
            Self::Derived(sensor) => sensor.refresh(),
        }
    }

    pub fn snapshot(&self) -> EntitySnapshot {
        match self {
            Self::Tracker(tracker) => tracker.snapshot(),
            Self::Derived(sensor) => sensor.snapshot(),
        }
    }
}

pub fn tracker_unique_id(device_id: DeviceId) -> String {
    format!("pajgps_{device_id}")
}

/// Tracker, battery (only for battery-capable models) and speed entities of one device.
pub fn entities_for_device<A, Cl>(
    descriptor: &DeviceDescriptor,
    api: &Arc<A>,
    tokens: &Arc<TokenManager<A, Cl>>,
    store: &SampleStore,
    clock: Cl,
) -> Vec<Entity<A, Cl>>
where
    A: PajApi,
    Cl: Clock,
{
    let mut entities = vec![Entity::Tracker(TrackerEntity::new(
        descriptor.clone(),
        Arc::clone(api),
        Arc::clone(tokens),
        store.clone(),
        clock,
    ))];

    if descriptor.has_battery {
        entities.push(Entity::Derived(DerivedSensor::new(
            Facet::Battery,
            descriptor.id,
            store.clone(),
        )));
    }
    entities.push(Entity::Derived(DerivedSensor::new(
        Facet::Speed,
        descriptor.id,
        store.clone(),
    )));

    entities
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::adapters::paj_http::PajApiError;
    use crate::app::sample_store::SampleStore;
    use crate::app::session::TokenManager;
    use crate::domain::models::{Credentials, DeviceId};
    use crate::domain::sensor_values::PollState;
    use crate::domain::session_state::RefreshPolicy;
    use crate::test_support::{FakeApi, ManualClock, descriptor, sample};

    use super::{DerivedSensor, Entity, Facet, Reading, TrackerEntity, entities_for_device};

    struct Fixture {
        api: Arc<FakeApi>,
        store: SampleStore,
        entities: Vec<Entity<FakeApi, ManualClock>>,
    }

    fn fixture(has_battery: bool) -> Fixture {
        let api = Arc::new(FakeApi::new());
        let clock = ManualClock::new(1_000);
        let tokens = Arc::new(TokenManager::new(
            Arc::clone(&api),
            clock.clone(),
            Credentials::new("owner@example.com", "secret"),
            RefreshPolicy::default(),
        ));
        let store = SampleStore::new();
        let entities = entities_for_device(
            &descriptor(9064, has_battery),
            &api,
            &tokens,
            &store,
            clock,
        );
        Fixture {
            api,
            store,
            entities,
        }
    }

    async fn update_all(entities: &mut [Entity<FakeApi, ManualClock>]) {
        for entity in entities.iter_mut() {
            entity.update().await;
        }
    }

    #[test]
    fn builds_battery_sensor_only_for_battery_models() {
        let with_battery = fixture(true);
        let without_battery = fixture(false);

        let ids: Vec<String> = with_battery
            .entities
            .iter()
            .map(Entity::unique_id)
            .collect();
        assert_eq!(
            ids,
            vec!["pajgps_9064", "pajgps_9064_battery", "pajgps_9064_speed"]
        );
        assert_eq!(without_battery.entities.len(), 2);
    }

    #[actix_web::test]
    async fn successful_poll_feeds_all_entities() {
        let mut fx = fixture(true);
        fx.api
            .push_position(DeviceId(9064), Ok(sample(9064, 49.02, 70.0, 0.0)));

        update_all(&mut fx.entities).await;

        let tracker = fx.entities[0].snapshot();
        assert_eq!(tracker.state, PollState::Fresh);
        match tracker.reading {
            Reading::Location {
                latitude,
                longitude,
                battery_level,
                speed,
                ..
            } => {
                assert_eq!(latitude, Some(49.02));
                assert_eq!(longitude, Some(12.65));
                assert_eq!(battery_level, Some(70));
                assert_eq!(speed, Some(0));
            }
            other => panic!("unexpected reading {other:?}"),
        }
        assert_eq!(tracker.device_class, None);
        assert_eq!(tracker.state_class, None);

        let battery = fx.entities[1].snapshot();
        assert_eq!(battery.icon, "mdi:battery-70");
        assert_eq!(
            battery.reading,
            Reading::Battery {
                level: Some(70),
                unit: "%",
            }
        );
        assert_eq!(battery.name, "PAJ GPS 9064 Battery Level");
        assert_eq!(battery.device_class, Some("battery"));
        assert_eq!(battery.state_class, Some("measurement"));

        let speed = fx.entities[2].snapshot();
        assert_eq!(
            speed.reading,
            Reading::Speed {
                speed: Some(0),
                unit: "km/h",
            }
        );
        assert_eq!(speed.device_class, None);
        assert_eq!(speed.state_class, Some("measurement"));
    }

    #[actix_web::test]
    async fn failed_poll_keeps_previous_sample_for_derived_sensors() {
        let mut fx = fixture(true);
        fx.api
            .push_position(DeviceId(9064), Ok(sample(9064, 49.02, 55.0, 30.0)));
        fx.api.push_position(
            DeviceId(9064),
            Err(PajApiError::Transport("connection reset".to_string())),
        );

        update_all(&mut fx.entities).await;
        update_all(&mut fx.entities).await;

        let tracker = fx.entities[0].snapshot();
        assert_eq!(tracker.state, PollState::Stale);
        assert!(matches!(
            tracker.reading,
            Reading::Location {
                latitude: None,
                battery_level: None,
                speed: None,
                ..
            }
        ));
        assert!(tracker.raw_data.is_some());

        let battery = fx.entities[1].snapshot();
        assert_eq!(battery.state, PollState::Stale);
        assert!(matches!(
            battery.reading,
            Reading::Battery { level: Some(55), .. }
        ));
    }

    #[actix_web::test]
    async fn tracker_keeps_last_sample_across_a_failed_poll() {
        let api = Arc::new(FakeApi::new());
        let clock = ManualClock::new(0);
        let tokens = Arc::new(TokenManager::new(
            Arc::clone(&api),
            clock.clone(),
            Credentials::new("owner@example.com", "secret"),
            RefreshPolicy::default(),
        ));
        let mut tracker = TrackerEntity::new(
            descriptor(9064, true),
            Arc::clone(&api),
            tokens,
            SampleStore::new(),
            clock,
        );
        api.push_position(DeviceId(9064), Ok(sample(9064, 49.02, 70.0, 8.0)));
        assert_eq!(tracker.state(), PollState::Uninitialized);
        assert!(tracker.last_sample().is_none());

        tracker.update().await;
        assert_eq!(tracker.state(), PollState::Fresh);

        tracker.update().await;
        assert_eq!(tracker.state(), PollState::Stale);
        let kept = tracker.last_sample().expect("sample kept");
        assert_eq!(kept.latitude, 49.02);
        assert_eq!(kept.speed, 8.0);
    }

    #[actix_web::test]
    async fn failure_before_any_sample_stays_uninitialized() {
        let mut fx = fixture(true);

        update_all(&mut fx.entities).await;

        for entity in &fx.entities {
            assert_eq!(entity.snapshot().state, PollState::Uninitialized);
        }
        assert_eq!(fx.entities[1].snapshot().icon, "mdi:battery-alert");
    }

    #[actix_web::test]
    async fn rejected_token_triggers_fresh_login_on_next_poll() {
        let mut fx = fixture(false);
        fx.api.push_position(
            DeviceId(9064),
            Err(PajApiError::Auth {
                status: 401,
                message: "invalid token".to_string(),
            }),
        );
        fx.api
            .push_position(DeviceId(9064), Ok(sample(9064, 1.0, 50.0, 0.0)));

        fx.entities[0].update().await;
        fx.entities[0].update().await;

        assert_eq!(fx.api.login_calls(), 2);
        assert_eq!(
            fx.api.position_tokens(),
            vec!["token-1".to_string(), "token-2".to_string()]
        );
        assert_eq!(fx.entities[0].snapshot().state, PollState::Fresh);
    }

    #[actix_web::test]
    async fn derived_sensor_polled_before_tracker_sees_previous_tick() {
        let mut fx = fixture(true);
        fx.api
            .push_position(DeviceId(9064), Ok(sample(9064, 1.0, 80.0, 0.0)));
        fx.api
            .push_position(DeviceId(9064), Ok(sample(9064, 2.0, 40.0, 0.0)));

        fx.entities[0].update().await;
        fx.entities[1].update().await;
        assert_eq!(fx.entities[1].snapshot().icon, "mdi:battery-80");

        // second tick, battery first
        fx.entities[1].update().await;
        assert_eq!(fx.entities[1].snapshot().icon, "mdi:battery-80");
        fx.entities[0].update().await;
        fx.entities[1].update().await;
        assert_eq!(fx.entities[1].snapshot().icon, "mdi:battery-40");
    }

    #[test]
    fn derived_values_are_clamped() {
        let store = SampleStore::new();
        store.publish(
            DeviceId(1),
            sample(1, 0.0, 180.0, -12.0),
            crate::domain::session_state::TimestampMs(5),
        );
        let mut battery = DerivedSensor::new(Facet::Battery, DeviceId(1), store.clone());
        let mut speed = DerivedSensor::new(Facet::Speed, DeviceId(1), store);

        battery.refresh();
        speed.refresh();

        assert_eq!(battery.value(), Some(100));
        assert_eq!(speed.value(), Some(0));
        assert_eq!(battery.snapshot().icon, "mdi:battery");
        assert_eq!(speed.state(), PollState::Fresh);
        assert_eq!(speed.facet(), Facet::Speed);
    }

    #[test]
    fn derived_sensor_without_store_entry_is_uninitialized() {
        let mut speed = DerivedSensor::new(Facet::Speed, DeviceId(1), SampleStore::new());

        speed.refresh();

        assert_eq!(speed.state(), PollState::Uninitialized);
        assert_eq!(speed.value(), None);
    }

    #[actix_web::test]
    async fn store_is_keyed_by_polled_device() {
        let mut fx = fixture(false);
        fx.api
            .push_position(DeviceId(9064), Ok(sample(1237050, 3.0, 10.0, 0.0)));

        fx.entities[0].update().await;

        assert!(fx.store.latest(DeviceId(9064)).is_some());
        assert!(fx.store.latest(DeviceId(1237050)).is_none());
    }
}
