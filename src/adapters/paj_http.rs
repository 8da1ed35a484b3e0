use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::domain::models::{
    Credentials, DeviceDescriptor, DeviceId, LoginResponse, PositionSample,
};
use crate::domain::paj_payload::{
    DeviceCatalog, DeviceListPolicy, PayloadError, parse_device_list, parse_latest_position,
    parse_login,
};

pub const DEFAULT_API_URL: &str = "https://connect.paj-gps.de/api/";

pub type DeviceMap = BTreeMap<DeviceId, DeviceDescriptor>;

/// The three calls the integration makes against the PAJ cloud.
#[async_trait]
pub trait PajApi: Send + Sync + 'static {
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, PajApiError>;

    async fn list_devices(
        &self,
        token: &str,
        policy: DeviceListPolicy,
    ) -> Result<DeviceMap, PajApiError>;

    async fn latest_position(
        &self,
        token: &str,
        device_id: DeviceId,
    ) -> Result<PositionSample, PajApiError>;
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PajApiError {
    #[error("authentication failed (HTTP {status}): {message}")]
    Auth { status: u16, message: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    MalformedResponse(PayloadError),
    #[error("no data returned")]
    NoData,
}

impl PajApiError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

impl From<PayloadError> for PajApiError {
    fn from(error: PayloadError) -> Self {
        match error {
            PayloadError::NoData => Self::NoData,
            other => Self::MalformedResponse(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Login,
    Devices,
    LastPoints,
}

impl Endpoint {
    pub fn label(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Devices => "device list",
            Self::LastPoints => "last points",
        }
    }
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Turns a raw status/body pair into the JSON payload or a classified error.
pub fn interpret_response(endpoint: Endpoint, status: u16, body: &str) -> Result<Value, PajApiError> {
    if status == 200 {
        return serde_json::from_str(body)
            .map_err(|error| PajApiError::MalformedResponse(PayloadError::InvalidJson(error.to_string())));
    }

    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|response| response.error)
        .unwrap_or_else(|_| format!("HTTP {status}"));

    match (endpoint, status) {
        (Endpoint::Login, _) | (_, 401 | 403) => Err(PajApiError::Auth { status, message }),
        _ => Err(PajApiError::Transport(format!(
            "{} returned HTTP {status}: {message}",
            endpoint.label()
        ))),
    }
}

pub fn log_skipped_devices(catalog: &DeviceCatalog) {
    for skipped in &catalog.skipped {
        tracing::warn!(
            index = skipped.index,
            device_id = ?skipped.device_id.map(|id| id.0),
            error = %skipped.error,
            "skipping device entry that could not be mapped"
        );
    }
}

#[derive(Debug, Clone)]
pub struct PajHttpClient {
    base_url: String,
    client: reqwest::Client,
}

impl PajHttpClient {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, PajApiError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(transport_error)?;

        let mut base_url = base_url.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(
        &self,
        endpoint: Endpoint,
        request: reqwest::RequestBuilder,
    ) -> Result<Value, PajApiError> {
        let response = request
            .header(ACCEPT, "application/json")
            .header("X-CSRF-TOKEN", "")
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;

        tracing::debug!(endpoint = endpoint.label(), status, "paj api responded");
        interpret_response(endpoint, status, &body)
    }
}

#[async_trait]
impl PajApi for PajHttpClient {
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, PajApiError> {
        let request = self
            .client
            .post(format!("{}login", self.base_url))
            .query(&[
                ("email", credentials.email.as_str()),
                ("password", credentials.password.as_str()),
            ]);

        let payload = self.send(Endpoint::Login, request).await?;
        Ok(parse_login(&payload)?)
    }

    async fn list_devices(
        &self,
        token: &str,
        policy: DeviceListPolicy,
    ) -> Result<DeviceMap, PajApiError> {
        let request = self
            .client
            .get(format!("{}device", self.base_url))
            .bearer_auth(token);

        let payload = self.send(Endpoint::Devices, request).await?;
        let catalog = parse_device_list(&payload, policy)?;
        log_skipped_devices(&catalog);
        Ok(catalog.devices)
    }

    async fn latest_position(
        &self,
        token: &str,
        device_id: DeviceId,
    ) -> Result<PositionSample, PajApiError> {
        let request = self
            .client
            .get(format!("{}trackerdata/{device_id}/last_points", self.base_url))
            .query(&[("lastPoints", 1)])
            .bearer_auth(token);

        let payload = self.send(Endpoint::LastPoints, request).await?;
        Ok(parse_latest_position(&payload)?)
    }
}

// The login URL carries the credentials as query parameters.
fn transport_error(error: reqwest::Error) -> PajApiError {
    PajApiError::Transport(error.without_url().to_string())
}
