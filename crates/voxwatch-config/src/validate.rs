//! Post-merge validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Config, PLACEHOLDER_TOKEN};

const TOKEN_TYPES: &[&str] = &["user", "bot"];
const LOG_FORMATS: &[&str] = &["pretty", "compact", "json", "full"];
const ROTATIONS: &[&str] = &["daily", "hourly", "never"];

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn is_snowflake(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

fn has_scheme(url: &str, schemes: &[&str]) -> bool {
    schemes.iter().any(|scheme| {
        url.strip_prefix(scheme)
            .and_then(|rest| rest.strip_prefix("://"))
            .is_some_and(|host| !host.is_empty())
    })
}

fn one_of(field: &str, value: &str, allowed: &[&str]) -> ConfigResult<()> {
    if allowed.contains(&value.to_ascii_lowercase().as_str()) {
        Ok(())
    } else {
        Err(invalid(
            field,
            format!("'{value}' is not one of: {}", allowed.join(", ")),
        ))
    }
}

fn positive(field: &str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        Err(invalid(field, "must be greater than zero"))
    } else {
        Ok(())
    }
}

/// Validate a fully merged configuration.
///
/// # Errors
///
/// Returns the first [`ConfigError::Invalid`] found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    let gateway = &config.gateway;
    let token = gateway.token.trim();
    if token.is_empty() {
        return Err(invalid(
            "gateway.token",
            "a token is required (set it in config.toml or VOXWATCH_TOKEN)",
        ));
    }
    if token == PLACEHOLDER_TOKEN {
        return Err(invalid("gateway.token", "replace the placeholder token"));
    }
    one_of("gateway.token_type", &gateway.token_type, TOKEN_TYPES)?;
    if !has_scheme(&gateway.api_base, &["http", "https"]) {
        return Err(invalid("gateway.api_base", "must be an http(s) URL"));
    }
    if let Some(url) = &gateway.gateway_url
        && !has_scheme(url, &["ws", "wss"])
    {
        return Err(invalid("gateway.gateway_url", "must be a ws(s) URL"));
    }
    if gateway.intents == 0 {
        return Err(invalid("gateway.intents", "must request at least one intent"));
    }
    positive("gateway.hello_timeout_secs", gateway.hello_timeout_secs)?;

    if config.watch.channel_ids.is_empty() {
        return Err(invalid(
            "watch.channel_ids",
            "at least one channel id is required",
        ));
    }
    if let Some(bad) = config.watch.channel_ids.iter().find(|id| !is_snowflake(id)) {
        return Err(invalid(
            "watch.channel_ids",
            format!("'{bad}' is not a numeric id"),
        ));
    }
    if let Some(id) = &config.watch.self_user_id
        && !is_snowflake(id)
    {
        return Err(invalid("watch.self_user_id", "must be a numeric id"));
    }

    positive("lookup.timeout_secs", config.lookup.timeout_secs)?;

    let notify = &config.notify;
    if notify.enabled {
        match &notify.webhook_url {
            Some(url) if has_scheme(url, &["http", "https"]) => {},
            Some(_) => return Err(invalid("notify.webhook_url", "must be an http(s) URL")),
            None => {
                return Err(invalid(
                    "notify.webhook_url",
                    "required when notifications are enabled",
                ));
            },
        }
        positive("notify.timeout_secs", notify.timeout_secs)?;
    }

    let file_name = config.storage.file_name.trim();
    if file_name.is_empty() || file_name.contains(['/', '\\']) {
        return Err(invalid(
            "storage.file_name",
            "must be a plain file name",
        ));
    }

    if config.logging.level.trim().is_empty() {
        return Err(invalid("logging.level", "must not be empty"));
    }
    one_of("logging.format", &config.logging.format, LOG_FORMATS)?;
    one_of("logging.rotation", &config.logging.rotation, ROTATIONS)?;

    Ok(())
}
