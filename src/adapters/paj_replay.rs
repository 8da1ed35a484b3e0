use std::collections::HashMap;
use std::fs;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::adapters::paj_http::{
    DeviceMap, Endpoint, PajApi, PajApiError, interpret_response, log_skipped_devices,
};
use crate::domain::models::{Credentials, DeviceId, LoginResponse, PositionSample};
use crate::domain::paj_payload::{
    DeviceListPolicy, parse_device_list, parse_latest_position, parse_login,
};

#[derive(Debug, Error)]
pub enum ReplayScriptError {
    #[error("failed to read replay script: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse replay script: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid replay script: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
struct ScriptFile {
    #[serde(default = "default_loop")]
    loop_forever: bool,
    login: Vec<ScriptEvent>,
    devices: Vec<ScriptEvent>,
    #[serde(default)]
    positions: HashMap<i64, Vec<ScriptEvent>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ScriptEvent {
    #[serde(default = "default_status")]
    status: u16,
    body: Option<Value>,
    error: Option<String>,
}

#[derive(Debug, Default)]
struct ReplayState {
    login_idx: usize,
    devices_idx: usize,
    position_idx: HashMap<i64, usize>,
}

#[derive(Debug, Clone, Copy)]
enum Sequence {
    Login,
    Devices,
    Positions(DeviceId),
}

/// Serves scripted responses in place of the remote service.
#[derive(Debug)]
pub struct PajReplayClient {
    script: ScriptFile,
    state: Mutex<ReplayState>,
}

fn default_loop() -> bool {
    true
}

fn default_status() -> u16 {
    200
}

impl PajReplayClient {
    pub fn from_file(path: &str) -> Result<Self, ReplayScriptError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ReplayScriptError> {
        let script: ScriptFile = serde_json::from_str(content)?;

        if script.login.is_empty() {
            return Err(ReplayScriptError::Invalid(
                "script must contain at least one login event".to_string(),
            ));
        }
        if script.devices.is_empty() {
            return Err(ReplayScriptError::Invalid(
                "script must contain at least one devices event".to_string(),
            ));
        }
        let all_events = script
            .login
            .iter()
            .chain(script.devices.iter())
            .chain(script.positions.values().flatten());
        for event in all_events {
            if event.body.is_some() == event.error.is_some() {
                return Err(ReplayScriptError::Invalid(
                    "script event must contain exactly one of: body or error".to_string(),
                ));
            }
        }

        Ok(Self {
            script,
            state: Mutex::new(ReplayState::default()),
        })
    }

    fn next_event(&self, sequence: Sequence) -> Result<ScriptEvent, PajApiError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| PajApiError::Transport("replay state lock poisoned".to_string()))?;

        let (events, idx_ref) = match sequence {
            Sequence::Login => (&self.script.login, &mut state.login_idx),
            Sequence::Devices => (&self.script.devices, &mut state.devices_idx),
            Sequence::Positions(device_id) => {
                let events = self.script.positions.get(&device_id.0).ok_or_else(|| {
                    PajApiError::Transport(format!(
                        "replay script has no positions for device {device_id}"
                    ))
                })?;
                (events, state.position_idx.entry(device_id.0).or_insert(0))
            }
        };

        if *idx_ref >= events.len() {
            if self.script.loop_forever {
                *idx_ref = 0;
            } else {
                return Err(PajApiError::Transport("replay finished".to_string()));
            }
        }

        let event = events
            .get(*idx_ref)
            .cloned()
            .ok_or_else(|| PajApiError::Transport("replay sequence is empty".to_string()))?;
        *idx_ref = idx_ref.saturating_add(1);

        Ok(event)
    }

    fn execute_event(endpoint: Endpoint, event: ScriptEvent) -> Result<Value, PajApiError> {
        match (event.body, event.error) {
            (Some(body), None) => interpret_response(endpoint, event.status, &body.to_string()),
            (None, Some(error)) => Err(PajApiError::Transport(format!("scripted failure: {error}"))),
            _ => Err(PajApiError::Transport(
                "script event must contain exactly one of: body or error".to_string(),
            )),
        }
    }
}

#[async_trait]
impl PajApi for PajReplayClient {
    async fn login(&self, _credentials: &Credentials) -> Result<LoginResponse, PajApiError> {
        let payload = Self::execute_event(Endpoint::Login, self.next_event(Sequence::Login)?)?;
        Ok(parse_login(&payload)?)
    }

    async fn list_devices(
        &self,
        _token: &str,
        policy: DeviceListPolicy,
    ) -> Result<DeviceMap, PajApiError> {
        let payload = Self::execute_event(Endpoint::Devices, self.next_event(Sequence::Devices)?)?;
        let catalog = parse_device_list(&payload, policy)?;
        log_skipped_devices(&catalog);
        Ok(catalog.devices)
    }

    async fn latest_position(
        &self,
        _token: &str,
        device_id: DeviceId,
    ) -> Result<PositionSample, PajApiError> {
        let event = self.next_event(Sequence::Positions(device_id))?;
        let payload = Self::execute_event(Endpoint::LastPoints, event)?;
        Ok(parse_latest_position(&payload)?)
    }
}

#[cfg(test)]
mod tests {
    use crate::adapters::paj_http::{PajApi, PajApiError};
    use crate::domain::models::{Credentials, DeviceId};
    use crate::domain::paj_payload::DeviceListPolicy;

    use super::{PajReplayClient, ReplayScriptError};

    fn fixture(path: &str) -> String {
        format!(
            "{}/testdata/replay/{path}",
            env!("CARGO_MANIFEST_DIR").replace("\\", "/")
        )
    }

    #[actix_web::test]
    async fn replays_and_loops_scripted_positions() {
        let client =
            PajReplayClient::from_file(&fixture("happy_loop.json")).expect("script should load");

        let login = client
            .login(&Credentials::new("a", "b"))
            .await
            .expect("login should succeed");
        assert_eq!(login.token, "replay-token");

        let devices = client
            .list_devices(&login.token, DeviceListPolicy::SkipInvalid)
            .await
            .expect("device list should succeed");
        assert_eq!(devices.len(), 1);

        let first = client
            .latest_position(&login.token, DeviceId(9064))
            .await
            .expect("first sample");
        let second = client
            .latest_position(&login.token, DeviceId(9064))
            .await
            .expect("second sample");
        let third = client
            .latest_position(&login.token, DeviceId(9064))
            .await
            .expect("replay should loop to first sample");

        assert_eq!(first.latitude, 49.02);
        assert_eq!(second.latitude, 49.03);
        assert_eq!(third.latitude, 49.02);
    }

    #[actix_web::test]
    async fn scripted_failures_map_to_client_errors() {
        let client =
            PajReplayClient::from_file(&fixture("failures.json")).expect("script should load");

        let login = client.login(&Credentials::new("a", "b")).await;
        assert_eq!(
            login,
            Err(PajApiError::Auth {
                status: 401,
                message: "wrong credentials".to_string(),
            })
        );

        let timeout = client.latest_position("t", DeviceId(1)).await;
        assert_eq!(
            timeout,
            Err(PajApiError::Transport("scripted failure: timeout".to_string()))
        );

        let empty = client.latest_position("t", DeviceId(1)).await;
        assert_eq!(empty, Err(PajApiError::NoData));

        let finished = client.latest_position("t", DeviceId(1)).await;
        assert_eq!(
            finished,
            Err(PajApiError::Transport("replay finished".to_string()))
        );
    }

    #[actix_web::test]
    async fn unknown_device_has_no_positions() {
        let client =
            PajReplayClient::from_file(&fixture("happy_loop.json")).expect("script should load");

        let result = client.latest_position("t", DeviceId(1)).await;

        assert!(matches!(result, Err(PajApiError::Transport(_))));
    }

    #[test]
    fn rejects_script_without_login_events() {
        let err = PajReplayClient::from_json(r#"{"login": [], "devices": [{"body": {}}]}"#)
            .expect_err("empty login sequence should fail");

        assert!(matches!(err, ReplayScriptError::Invalid(_)));
    }

    #[test]
    fn rejects_event_with_body_and_error() {
        let err = PajReplayClient::from_json(
            r#"{"login": [{"body": {}, "error": "timeout"}], "devices": [{"body": {}}]}"#,
        )
        .expect_err("ambiguous event should fail");

        assert!(matches!(err, ReplayScriptError::Invalid(_)));
    }

    #[test]
    fn rejects_invalid_top_level_json() {
        let err = PajReplayClient::from_json("not json").expect_err("invalid json should fail");

        assert!(matches!(err, ReplayScriptError::Json(_)));
    }
}
