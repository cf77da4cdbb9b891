//! Merging TOML layers while remembering where each value came from.

use std::collections::HashMap;
use std::fmt;

use toml::Value;

/// Origin of a resolved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayer {
    /// Embedded `defaults.toml`.
    Defaults,
    /// `config.toml` in the voxwatch home directory.
    User,
    /// File named with `--config`.
    Explicit,
    /// `VOXWATCH_*` variable filling an unset field.
    Environment,
}

impl ConfigLayer {
    /// Short label used in `check-config` annotations.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Defaults => "defaults",
            Self::User => "user",
            Self::Explicit => "--config",
            Self::Environment => "env",
        }
    }
}

impl fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Dotted key (`gateway.token`) to the layer that last set it.
pub type FieldSources = HashMap<String, ConfigLayer>;

fn join_key(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_owned()
    } else {
        format!("{parent}.{key}")
    }
}

/// Attribute every leaf of `tree` to `layer`.
pub(crate) fn seed(tree: &Value, layer: ConfigLayer, sources: &mut FieldSources) {
    mark_leaves(tree, "", layer, sources);
}

/// Lay `top` over `base`. Tables merge key by key; any other value,
/// arrays included, replaces what was below it.
pub(crate) fn overlay(base: &mut Value, top: &Value, layer: ConfigLayer, sources: &mut FieldSources) {
    overlay_at(base, top, "", layer, sources);
}

fn overlay_at(
    base: &mut Value,
    top: &Value,
    at: &str,
    layer: ConfigLayer,
    sources: &mut FieldSources,
) {
    let (Value::Table(below), Value::Table(above)) = (&mut *base, top) else {
        *base = top.clone();
        sources.insert(at.to_owned(), layer);
        return;
    };

    for (key, value) in above {
        let key_path = join_key(at, key);
        if let Some(existing) = below.get_mut(key) {
            if value.is_table() {
                overlay_at(existing, value, &key_path, layer, sources);
            } else {
                *existing = value.clone();
                sources.insert(key_path, layer);
            }
        } else {
            mark_leaves(value, &key_path, layer, sources);
            below.insert(key.clone(), value.clone());
        }
    }
}

fn mark_leaves(value: &Value, at: &str, layer: ConfigLayer, sources: &mut FieldSources) {
    match value {
        Value::Table(table) => {
            for (key, child) in table {
                mark_leaves(child, &join_key(at, key), layer, sources);
            }
        },
        _ => {
            sources.insert(at.to_owned(), layer);
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toml(s: &str) -> Value {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn scalar_override_leaves_siblings_alone() {
        let mut merged = toml("[gateway]\ntoken = \"\"\nintents = 128\n");
        let mut sources = FieldSources::new();
        seed(&merged, ConfigLayer::Defaults, &mut sources);

        overlay(
            &mut merged,
            &toml("[gateway]\ntoken = \"abc\"\n"),
            ConfigLayer::User,
            &mut sources,
        );

        assert_eq!(merged["gateway"]["token"].as_str(), Some("abc"));
        assert_eq!(merged["gateway"]["intents"].as_integer(), Some(128));
        assert_eq!(sources["gateway.token"], ConfigLayer::User);
        assert_eq!(sources["gateway.intents"], ConfigLayer::Defaults);
    }

    #[test]
    fn channel_list_is_replaced_whole() {
        let mut merged = toml("[watch]\nchannel_ids = [\"1\", \"2\"]\n");
        let mut sources = FieldSources::new();
        overlay(
            &mut merged,
            &toml("[watch]\nchannel_ids = [\"3\"]\n"),
            ConfigLayer::Explicit,
            &mut sources,
        );

        let ids = merged["watch"]["channel_ids"].as_array().unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(sources["watch.channel_ids"], ConfigLayer::Explicit);
    }

    #[test]
    fn section_missing_below_is_attributed_per_leaf() {
        let mut merged = toml("[gateway]\ntoken = \"\"\n");
        let mut sources = FieldSources::new();
        overlay(
            &mut merged,
            &toml("[notify]\nenabled = true\nusername = \"x\"\n"),
            ConfigLayer::User,
            &mut sources,
        );

        assert_eq!(sources["notify.enabled"], ConfigLayer::User);
        assert_eq!(sources["notify.username"], ConfigLayer::User);
        assert!(!sources.contains_key("notify"));
    }

    #[test]
    fn labels() {
        assert_eq!(ConfigLayer::Explicit.to_string(), "--config");
        assert_eq!(ConfigLayer::Environment.label(), "env");
    }
}
