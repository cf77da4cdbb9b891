//! Environment variable fallbacks.
//!
//! Env vars are a fallback, not an override: they only fill fields that no
//! config file set.

use std::collections::HashMap;

use tracing::debug;

use crate::merge::{ConfigLayer, FieldSources};

/// Mapping from environment variable name to config field path.
struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
}

const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "VOXWATCH_TOKEN",
        field_path: "gateway.token",
    },
    EnvMapping {
        var_name: "VOXWATCH_TOKEN_TYPE",
        field_path: "gateway.token_type",
    },
    EnvMapping {
        var_name: "VOXWATCH_CHANNEL_IDS",
        field_path: "watch.channel_ids",
    },
    EnvMapping {
        var_name: "VOXWATCH_SELF_USER_ID",
        field_path: "watch.self_user_id",
    },
    EnvMapping {
        var_name: "VOXWATCH_WEBHOOK_URL",
        field_path: "notify.webhook_url",
    },
    EnvMapping {
        var_name: "VOXWATCH_LOG_LEVEL",
        field_path: "logging.level",
    },
    EnvMapping {
        var_name: "VOXWATCH_DATA_DIR",
        field_path: "storage.data_dir",
    },
];

/// Snapshot of the process environment (`VOXWATCH_*` only).
pub(crate) fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with("VOXWATCH_"))
        .collect()
}

/// Apply env fallbacks to fields that only have a default (or nothing).
///
/// Returns the number of env vars applied.
pub(crate) fn apply_env_fallbacks<S: std::hash::BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> usize {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        if matches!(
            sources.get(mapping.field_path),
            Some(ConfigLayer::User | ConfigLayer::Explicit)
        ) {
            continue;
        }
        let Some(raw) = env_vars.get(mapping.var_name) else {
            continue;
        };

        debug!(
            var = mapping.var_name,
            field = mapping.field_path,
            "applying env var fallback"
        );
        set_field(merged, mapping.field_path, coerce(mapping.field_path, raw));
        sources.insert(mapping.field_path.to_owned(), ConfigLayer::Environment);
        count = count.saturating_add(1);
    }

    count
}

/// Channel lists are comma-separated; everything else is a string.
fn coerce(path: &str, raw: &str) -> toml::Value {
    if path == "watch.channel_ids" {
        toml::Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(|id| toml::Value::String(id.to_owned()))
                .collect(),
        )
    } else {
        toml::Value::String(raw.trim().to_owned())
    }
}

/// Set a dotted field, creating intermediate tables.
fn set_field(root: &mut toml::Value, path: &str, value: toml::Value) {
    let mut segments = path.split('.').peekable();
    let mut current = root;
    while let Some(segment) = segments.next() {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        if segments.peek().is_none() {
            table.insert(segment.to_owned(), value);
            return;
        }
        current = table
            .entry(segment.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }
}
