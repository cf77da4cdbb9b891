//! Terminal styling.

use colored::{ColoredString, Colorize};
use voxwatch_core::{ConnectionState, PresenceKind};

const RULE_WIDTH: usize = 44;
const KEY_WIDTH: usize = 14;

/// Styling helpers for console output. Colors follow `colored`'s global
/// override, so tests and pipes get plain text.
pub(crate) struct Theme;

impl Theme {
    pub(crate) fn banner() -> String {
        format!(
            "{} {}",
            "voxwatch".bold().cyan(),
            format!("{} · voice presence tracker", env!("CARGO_PKG_VERSION")).dimmed()
        )
    }

    pub(crate) fn header(text: &str) -> String {
        text.bold().cyan().to_string()
    }

    pub(crate) fn success(text: &str) -> String {
        Self::marked("ok".green(), text)
    }

    pub(crate) fn error(text: &str) -> String {
        Self::marked("error".red().bold(), text)
    }

    pub(crate) fn info(text: &str) -> String {
        Self::marked("--".blue(), text)
    }

    pub(crate) fn dimmed(text: &str) -> String {
        text.dimmed().to_string()
    }

    pub(crate) fn separator() -> String {
        "─".repeat(RULE_WIDTH).dimmed().to_string()
    }

    /// `key` left-aligned in a fixed column, then the value.
    pub(crate) fn kv(key: &str, value: &str) -> String {
        format!("{:<KEY_WIDTH$} {value}", format!("{key}:").bold())
    }

    pub(crate) fn presence(kind: PresenceKind) -> String {
        match kind {
            PresenceKind::Join => "+ join ".green().to_string(),
            PresenceKind::Leave => "- leave".red().to_string(),
        }
    }

    pub(crate) fn state(state: ConnectionState) -> String {
        let label = state.to_string();
        let styled = match state {
            ConnectionState::Connected => label.green(),
            ConnectionState::Reconnecting { .. } => label.yellow(),
            ConnectionState::Disconnected => label.red(),
            _ => label.dimmed(),
        };
        styled.to_string()
    }

    fn marked(marker: ColoredString, text: &str) -> String {
        format!("[{marker}] {text}")
    }
}
