pub mod config;
pub mod entities;
pub mod entry;
mod error;
mod logging;
pub mod registry;
pub mod runtime;
pub mod sample_store;
pub mod session;

pub use error::AppError;

pub fn run() -> Result<(), AppError> {
    logging::init()?;

    let config = config::AppConfig::from_env()?;

    tracing::info!(
        api_url = %config.api_url,
        poll_interval_secs = config.poll_interval_secs,
        token_refresh_secs = config.token_refresh_secs,
        http_timeout_secs = config.http_timeout.map(|t| t.as_secs()),
        device_list_policy = ?config.device_list_policy,
        http_bind = %config.http_bind,
        replay_file = config.replay_file.as_deref(),
        "application bootstrap initialized"
    );

    runtime::run(config)
}
