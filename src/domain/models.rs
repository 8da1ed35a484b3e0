use std::fmt;

use serde::Serialize;

pub const DOMAIN: &str = "pajgps";
pub const MANUFACTURER: &str = "PAJ GPS";
pub const SW_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Identifier the remote service assigns to a tracker. Stable for the device's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct DeviceId(pub i64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.email.trim().is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &"<redacted>")
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: Option<i64>,
    pub route_icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceDescriptor {
    pub id: DeviceId,
    pub name: String,
    pub imei: String,
    pub model: String,
    pub has_battery: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    pub heading: f64,
    pub battery: f64,
    pub speed: f64,
    pub device_id: DeviceId,
    pub accuracy: f64,
}

impl fmt::Display for PositionSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lat: {}, lng: {}, direction: {}, battery: {}, speed: {}, iddevice: {}",
            self.latitude, self.longitude, self.heading, self.battery, self.speed, self.device_id
        )
    }
}

/// Groups every entity that belongs to one physical tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub identifiers: (String, DeviceId),
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub sw_version: String,
}

impl DeviceInfo {
    pub fn for_descriptor(descriptor: &DeviceDescriptor) -> Self {
        Self {
            identifiers: (DOMAIN.to_string(), descriptor.id),
            name: format!("PAJ GPS {}", descriptor.id),
            manufacturer: MANUFACTURER.to_string(),
            model: descriptor.model.clone(),
            sw_version: SW_VERSION.to_string(),
        }
    }
}
