use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use pajgps_home::adapters::paj_http::{PajApi, PajHttpClient};
use pajgps_home::app::config::AppConfig;
use pajgps_home::app::runtime::SystemClock;
use pajgps_home::app::session::TokenManager;
use pajgps_home::domain::sensor_values::{clamp_battery, clamp_speed};

const POLL_INTERVAL: Duration = Duration::from_secs(30);

fn main() {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            println!("[{}] ERROR: {err}", now_iso());
            return;
        }
    };

    let api = match PajHttpClient::new(&config.api_url, config.http_timeout) {
        Ok(api) => Arc::new(api),
        Err(err) => {
            println!("[{}] ERROR: could not build HTTP client: {err}", now_iso());
            return;
        }
    };

    actix_web::rt::System::new().block_on(probe(api, config));
}

async fn probe(api: Arc<PajHttpClient>, config: AppConfig) {
    let tokens = TokenManager::new(
        Arc::clone(&api),
        SystemClock,
        config.credentials(),
        config.entry_options().refresh_policy,
    );

    println!(
        "Starting PAJ GPS status probe against {} (interval: {}s)...",
        api.base_url(),
        POLL_INTERVAL.as_secs()
    );

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        ticker.tick().await;
        poll_account(api.as_ref(), &tokens, &config).await;
        println!();
    }
}

async fn poll_account(
    api: &PajHttpClient,
    tokens: &TokenManager<PajHttpClient, SystemClock>,
    config: &AppConfig,
) {
    let Some(token) = tokens.ensure_token().await else {
        println!("[{}] ERROR: could not get login token", now_iso());
        return;
    };

    let devices = match api.list_devices(&token, config.device_list_policy).await {
        Ok(devices) => devices,
        Err(err) => {
            if err.is_auth() {
                tokens.invalidate();
            }
            println!("[{}] ERROR: device list: {err}", now_iso());
            return;
        }
    };

    for descriptor in devices.values() {
        match api.latest_position(&token, descriptor.id).await {
            Ok(sample) => println!(
                "[{}] {} ({}): lat={:.6} lng={:.6} battery={}% speed={} km/h",
                now_iso(),
                descriptor.name,
                descriptor.id,
                sample.latitude,
                sample.longitude,
                clamp_battery(sample.battery),
                clamp_speed(sample.speed),
            ),
            Err(err) => {
                if err.is_auth() {
                    tokens.invalidate();
                }
                println!(
                    "[{}] {} ({}): ERROR last points: {err}",
                    now_iso(),
                    descriptor.name,
                    descriptor.id
                );
            }
        }
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
