//! Bridge from `voxwatch_config::Config` to tracker and logging settings.

use std::time::Duration;

use voxwatch_config::Config;
use voxwatch_gateway::{TokenType, TrackerConfig, TrackerResult, WatchSet};
use voxwatch_telemetry::{FileRotation, LogConfig, LogFormat};

/// Prefix of rolling log files.
const LOG_FILE_PREFIX: &str = "voxwatch";

/// Convert config to [`TrackerConfig`], connecting to `gateway_url`.
///
/// # Errors
///
/// Returns an error if the token type is unknown.
pub(crate) fn to_tracker_config(cfg: &Config, gateway_url: String) -> TrackerResult<TrackerConfig> {
    let gateway = &cfg.gateway;
    Ok(TrackerConfig {
        token: gateway.token.trim().to_owned(),
        token_type: token_type(cfg)?,
        gateway_url,
        intents: gateway.intents,
        watch: cfg.watch.channel_ids.iter().collect::<WatchSet>(),
        self_user_id: cfg.watch.self_user_id.clone(),
        hello_timeout: Duration::from_secs(gateway.hello_timeout_secs),
        invalid_session_delay: Duration::from_secs(gateway.invalid_session_delay_secs),
        zombie_detection: gateway.zombie_detection,
    })
}

/// Parse the configured token type.
///
/// # Errors
///
/// Returns an error if the token type is unknown.
pub(crate) fn token_type(cfg: &Config) -> TrackerResult<TokenType> {
    cfg.gateway.token_type.parse()
}

/// Convert config to [`LogConfig`].
pub(crate) fn to_log_config(cfg: &Config) -> LogConfig {
    let format = cfg
        .logging
        .format
        .parse::<LogFormat>()
        .unwrap_or_default();

    let mut log_config = LogConfig::new(&cfg.logging.level).with_format(format);

    if let Some(dir) = &cfg.logging.directory {
        let rotation = cfg
            .logging
            .rotation
            .parse::<FileRotation>()
            .unwrap_or_default();
        log_config = log_config.with_file_logging(dir, LOG_FILE_PREFIX, rotation);
    }

    for directive in &cfg.logging.directives {
        log_config = log_config.with_directive(directive);
    }

    log_config
}
