use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use actix_web::dev::ServerHandle;
use actix_web::{App, HttpServer, web};
use async_trait::async_trait;

use crate::adapters::paj_http::{DeviceMap, PajApi, PajApiError};
use crate::domain::models::{
    Credentials, DeviceDescriptor, DeviceId, LoginResponse, PositionSample,
};
use crate::domain::paj_payload::DeviceListPolicy;
use crate::domain::session_state::{Clock, TimestampMs};

#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start)),
        }
    }

    pub fn set(&self, value: i64) {
        self.now.store(value, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> TimestampMs {
        TimestampMs(self.now.load(Ordering::SeqCst))
    }
}

pub fn descriptor(id: i64, has_battery: bool) -> DeviceDescriptor {
    DeviceDescriptor {
        id: DeviceId(id),
        name: format!("Tracker {id}"),
        imei: format!("imei-{id}"),
        model: format!("Model {id}"),
        has_battery,
    }
}

pub fn sample(device_id: i64, latitude: f64, battery: f64, speed: f64) -> PositionSample {
    PositionSample {
        latitude,
        longitude: 12.65,
        heading: 0.0,
        battery,
        speed,
        device_id: DeviceId(device_id),
        accuracy: 0.0,
    }
}

/// Scriptable in-memory stand-in for the PAJ cloud. Login `n` hands out `token-n`.
#[derive(Debug, Default)]
pub struct FakeApi {
    login_calls: AtomicUsize,
    login_failure: Mutex<Option<PajApiError>>,
    devices: Mutex<Option<Result<DeviceMap, PajApiError>>>,
    positions: Mutex<HashMap<DeviceId, VecDeque<Result<PositionSample, PajApiError>>>>,
    position_tokens: Mutex<Vec<String>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn fail_logins(&self, error: PajApiError) {
        *self.login_failure.lock().expect("fake api lock") = Some(error);
    }

    pub fn allow_logins(&self) {
        *self.login_failure.lock().expect("fake api lock") = None;
    }

    pub fn set_devices(&self, devices: Vec<DeviceDescriptor>) {
        let map = devices.into_iter().map(|d| (d.id, d)).collect();
        *self.devices.lock().expect("fake api lock") = Some(Ok(map));
    }

    pub fn fail_devices(&self, error: PajApiError) {
        *self.devices.lock().expect("fake api lock") = Some(Err(error));
    }

    pub fn push_position(&self, device_id: DeviceId, result: Result<PositionSample, PajApiError>) {
        self.positions
            .lock()
            .expect("fake api lock")
            .entry(device_id)
            .or_default()
            .push_back(result);
    }

    pub fn position_tokens(&self) -> Vec<String> {
        self.position_tokens.lock().expect("fake api lock").clone()
    }
}

#[async_trait]
impl PajApi for FakeApi {
    async fn login(&self, _credentials: &Credentials) -> Result<LoginResponse, PajApiError> {
        let call = self.login_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(error) = self.login_failure.lock().expect("fake api lock").clone() {
            return Err(error);
        }
        Ok(LoginResponse {
            token: format!("token-{call}"),
            user_id: Some(1),
            route_icon: None,
        })
    }

    async fn list_devices(
        &self,
        _token: &str,
        _policy: DeviceListPolicy,
    ) -> Result<DeviceMap, PajApiError> {
        self.devices
            .lock()
            .expect("fake api lock")
            .clone()
            .unwrap_or_else(|| Ok(DeviceMap::new()))
    }

    async fn latest_position(
        &self,
        token: &str,
        device_id: DeviceId,
    ) -> Result<PositionSample, PajApiError> {
        self.position_tokens
            .lock()
            .expect("fake api lock")
            .push(token.to_string());
        self.positions
            .lock()
            .expect("fake api lock")
            .get_mut(&device_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Err(PajApiError::NoData))
    }
}

pub struct FakeServer {
    pub base_url: String,
    handle: ServerHandle,
}

impl FakeServer {
    pub async fn stop(self) {
        self.handle.stop(false).await;
    }
}

/// Serves `routes` on an ephemeral local port; `base_url` points at its `/api/` prefix.
pub async fn start_fake_server<F>(routes: F) -> FakeServer
where
    F: Fn(&mut web::ServiceConfig) + Clone + Send + 'static,
{
    let server = HttpServer::new(move || App::new().configure(routes.clone()))
        .workers(1)
        .bind(("127.0.0.1", 0))
        .expect("fake server should bind");
    let addr = server.addrs()[0];
    let server = server.run();
    let handle = server.handle();
    actix_web::rt::spawn(server);

    FakeServer {
        base_url: format!("http://{addr}/api/"),
        handle,
    }
}
