use std::time::Duration;

use crate::adapters::paj_http::DEFAULT_API_URL;
use crate::app::AppError;
use crate::app::entry::EntryOptions;
use crate::domain::models::Credentials;
use crate::domain::paj_payload::DeviceListPolicy;
use crate::domain::session_state::RefreshPolicy;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub credentials: Credentials,
    pub api_url: String,
    pub poll_interval_secs: u64,
    pub token_refresh_secs: u64,
    pub http_timeout: Option<Duration>,
    pub device_list_policy: DeviceListPolicy,
    pub http_bind: String,
    pub replay_file: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let email = non_empty(&lookup, "PAJGPS_EMAIL")
            .ok_or_else(|| AppError::config("PAJGPS_EMAIL is required"))?;
        // passwords are taken verbatim, surrounding whitespace included
        let password = lookup("PAJGPS_PASSWORD")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::config("PAJGPS_PASSWORD is required"))?;

        let poll_interval_secs = parse_or_default(&lookup, "POLL_INTERVAL_SECS", 30_u64)?;
        if poll_interval_secs == 0 {
            return Err(AppError::config("POLL_INTERVAL_SECS must be greater than zero"));
        }

        let http_timeout = match non_empty(&lookup, "HTTP_TIMEOUT_SECS") {
            Some(raw) => Some(Duration::from_secs(raw.parse::<u64>().map_err(|_| {
                AppError::config("HTTP_TIMEOUT_SECS must be a valid number")
            })?)),
            None => None,
        };

        let device_list_policy = match non_empty(&lookup, "DEVICE_LIST_POLICY") {
            Some(raw) => raw
                .parse::<DeviceListPolicy>()
                .map_err(|error| AppError::config(format!("DEVICE_LIST_POLICY: {error}")))?,
            None => DeviceListPolicy::default(),
        };

        Ok(Self {
            credentials: Credentials::new(email, password),
            api_url: non_empty(&lookup, "PAJGPS_API_URL")
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            poll_interval_secs,
            token_refresh_secs: parse_or_default(&lookup, "TOKEN_REFRESH_SECS", 600_u64)?,
            http_timeout,
            device_list_policy,
            http_bind: non_empty(&lookup, "HTTP_BIND")
                .unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            replay_file: non_empty(&lookup, "PAJGPS_REPLAY_FILE"),
        })
    }

    pub fn credentials(&self) -> Credentials {
        self.credentials.clone()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn entry_options(&self) -> EntryOptions {
        EntryOptions {
            refresh_policy: RefreshPolicy::new(Duration::from_secs(self.token_refresh_secs)),
            device_list_policy: self.device_list_policy,
        }
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or_default<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::config(format!("{key} must be a valid number"))),
        None => Ok(default),
    }
}
