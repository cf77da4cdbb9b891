//! Config file discovery and layered loading.
//!
//! 1. Parse the embedded `defaults.toml`
//! 2. Merge the user file (`~/.voxwatch/config.toml`, or `VOXWATCH_HOME`)
//! 3. Merge the file passed with `--config`
//! 4. Apply `VOXWATCH_*` env fallbacks for fields no file set
//! 5. Deserialize and validate

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::env::{apply_env_fallbacks, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{self, ConfigLayer, FieldSources};
use crate::show::ResolvedConfig;
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Name of the per-user config directory under `$HOME`.
const HOME_DIR_NAME: &str = ".voxwatch";

/// Load the configuration with layered precedence.
///
/// `explicit` is a file given on the command line; it must exist.
/// `home_override` replaces the `~/.voxwatch` directory used for the user
/// file.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is unreadable or
/// malformed, or if the merged configuration fails validation.
pub fn load(explicit: Option<&Path>, home_override: Option<&Path>) -> ConfigResult<ResolvedConfig> {
    load_with_env(explicit, home_override, &collect_env_vars())
}

pub(crate) fn load_with_env(
    explicit: Option<&Path>,
    home_override: Option<&Path>,
    env_vars: &HashMap<String, String>,
) -> ConfigResult<ResolvedConfig> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::Parse {
            origin: "<embedded defaults>".to_owned(),
            source: e,
        })?;

    let mut field_sources = FieldSources::new();
    let mut loaded_files = Vec::new();
    merge::seed(&merged, ConfigLayer::Defaults, &mut field_sources);

    if let Some((overlay, path)) = user_config(home_override, env_vars)? {
        merge::overlay(&mut merged, &overlay, ConfigLayer::User, &mut field_sources);
        loaded_files.push(path.display().to_string());
        info!(path = %path.display(), "loaded user config");
    }

    if let Some(path) = explicit {
        let overlay = read_file(path)?;
        merge::overlay(&mut merged, &overlay, ConfigLayer::Explicit, &mut field_sources);
        loaded_files.push(path.display().to_string());
        info!(path = %path.display(), "loaded config file");
    }

    let env_count = apply_env_fallbacks(&mut merged, &mut field_sources, env_vars);
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable fallbacks");
    }

    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                origin: "<merged config>".to_owned(),
                source: e,
            })?;

    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        field_sources,
        loaded_files,
    })
}

/// Find and parse the user-level config file, if any.
fn user_config(
    home_override: Option<&Path>,
    env_vars: &HashMap<String, String>,
) -> ConfigResult<Option<(toml::Value, PathBuf)>> {
    if let Some(dir) = home_override {
        let path = dir.join("config.toml");
        return Ok(try_load_file(&path)?.map(|overlay| (overlay, path)));
    }

    let home_dir = home_directory()?;
    let user_path = home_dir.join(HOME_DIR_NAME).join("config.toml");
    if let Some(overlay) = try_load_file(&user_path)? {
        return Ok(Some((overlay, user_path)));
    }

    let Some(raw) = env_vars.get("VOXWATCH_HOME") else {
        return Ok(None);
    };
    let Some(canonical) = validate_home(raw, &home_dir) else {
        warn!(
            path = raw,
            "VOXWATCH_HOME is not a directory owned by the current user; ignoring"
        );
        return Ok(None);
    };
    let path = canonical.join("config.toml");
    Ok(try_load_file(&path)?.map(|overlay| (overlay, path)))
}

/// Read and parse a file that must exist.
fn read_file(path: &Path) -> ConfigResult<toml::Value> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_content(path, &content)
}

/// Try to load a file, returning `None` if it doesn't exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            });
        },
    };
    parse_content(path, &content).map(Some)
}

fn parse_content(path: &Path, content: &str) -> ConfigResult<toml::Value> {
    // Checked after reading so there is no gap between stat and read.
    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::TooLarge {
            path: path.to_path_buf(),
            size: content.len(),
            limit: MAX_CONFIG_FILE_SIZE,
        });
    }

    toml::from_str(content).map_err(|e| ConfigError::Parse {
        origin: path.display().to_string(),
        source: e,
    })
}

/// Accept `VOXWATCH_HOME` only if it is a real directory owned by the same
/// user as `home_dir`. Returns the canonical path.
fn validate_home(raw_path: &str, home_dir: &Path) -> Option<PathBuf> {
    let canonical = PathBuf::from(raw_path).canonicalize().ok()?;
    if !canonical.is_dir() {
        return None;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        let dir_uid = canonical.metadata().ok()?.uid();
        let home_uid = home_dir.metadata().ok()?.uid();
        if dir_uid != home_uid {
            return None;
        }
    }

    #[cfg(not(unix))]
    let _ = home_dir;

    Some(canonical)
}

fn home_directory() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)
}
