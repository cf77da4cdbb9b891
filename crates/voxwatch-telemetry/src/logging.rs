//! Subscriber construction.
//!
//! Diagnostics go to stderr or to rolling files. Stdout is left to the
//! tracker's console feed.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::error::{TelemetryError, TelemetryResult};

fn parse_choice<T: Copy>(
    kind: &'static str,
    raw: &str,
    choices: &[(&str, T)],
) -> TelemetryResult<T> {
    let wanted = raw.trim().to_ascii_lowercase();
    choices
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, value)| *value)
        .ok_or_else(|| TelemetryError::UnknownOption {
            kind,
            value: raw.to_owned(),
        })
}

/// How often rolling log files are cut.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRotation {
    /// New file each day.
    #[default]
    Daily,
    /// New file each hour.
    Hourly,
    /// One file forever.
    Never,
}

impl FileRotation {
    fn appender_rotation(self) -> Rotation {
        match self {
            Self::Daily => Rotation::DAILY,
            Self::Hourly => Rotation::HOURLY,
            Self::Never => Rotation::NEVER,
        }
    }
}

impl FromStr for FileRotation {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_choice(
            "file rotation",
            s,
            &[
                ("daily", Self::Daily),
                ("hourly", Self::Hourly),
                ("never", Self::Never),
            ],
        )
    }
}

/// Line format of emitted events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, for reading in a terminal.
    Pretty,
    /// One short line per event.
    #[default]
    Compact,
    /// Newline-delimited JSON.
    Json,
    /// One line with every field.
    Full,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_choice(
            "log format",
            s,
            &[
                ("pretty", Self::Pretty),
                ("compact", Self::Compact),
                ("json", Self::Json),
                ("full", Self::Full),
            ],
        )
    }
}

/// Where diagnostics are written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogTarget {
    /// Standard error, colored.
    #[default]
    Stderr,
    /// Rolling files `dir/prefix.<date>`, never colored.
    Files {
        /// Directory, created on setup.
        dir: PathBuf,
        /// File name prefix.
        prefix: String,
        /// Cut interval.
        rotation: FileRotation,
    },
}

/// Inputs to [`setup_logging`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base `EnvFilter` level, e.g. `info`.
    pub level: String,
    /// Line format.
    pub format: LogFormat,
    /// Output destination.
    pub target: LogTarget,
    /// Extra per-target directives, e.g. `voxwatch_gateway=trace`.
    pub directives: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new("info")
    }
}

impl LogConfig {
    /// Stderr, compact format, at `level`.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            directives: Vec::new(),
        }
    }

    /// Set the line format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Write to rolling files instead of stderr.
    #[must_use]
    pub fn with_file_logging(
        mut self,
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        rotation: FileRotation,
    ) -> Self {
        self.target = LogTarget::Files {
            dir: dir.into(),
            prefix: prefix.into(),
            rotation,
        };
        self
    }

    /// Add a per-target directive.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    fn build_filter(&self) -> TelemetryResult<EnvFilter> {
        let bad = |directive: &str, reason: String| TelemetryError::Filter {
            directive: directive.to_owned(),
            reason,
        };

        let mut filter =
            EnvFilter::try_new(&self.level).map_err(|e| bad(self.level.as_str(), e.to_string()))?;
        for directive in &self.directives {
            let parsed = directive
                .parse()
                .map_err(|e: tracing_subscriber::filter::ParseError| {
                    bad(directive.as_str(), e.to_string())
                })?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }

    fn fmt_layer<W>(&self, writer: W, ansi: bool) -> Box<dyn Layer<Registry> + Send + Sync>
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        let layer = fmt::layer().with_writer(writer).with_ansi(ansi);
        match self.format {
            LogFormat::Json => layer.json().boxed(),
            LogFormat::Pretty => layer.pretty().boxed(),
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Full => layer.boxed(),
        }
    }
}

/// Flushes buffered file output when dropped. Hold it until exit.
#[derive(Debug)]
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _worker: Option<WorkerGuard>,
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// Fails on a bad level or directive, an uncreatable log directory, or if
/// a global subscriber is already set.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<LogGuard> {
    let filter = config.build_filter()?;

    let (layer, worker) = match &config.target {
        LogTarget::Stderr => (config.fmt_layer(std::io::stderr, true), None),
        LogTarget::Files {
            dir,
            prefix,
            rotation,
        } => {
            std::fs::create_dir_all(dir).map_err(|source| TelemetryError::LogDir {
                path: dir.clone(),
                source,
            })?;
            let appender =
                RollingFileAppender::new(rotation.appender_rotation(), dir, prefix.as_str());
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (config.fmt_layer(writer, false), Some(guard))
        },
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|e| TelemetryError::AlreadyInstalled(e.to_string()))?;

    Ok(LogGuard { _worker: worker })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_compact_stderr() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.target, LogTarget::Stderr);
        assert!(config.directives.is_empty());
    }

    #[test]
    fn file_logging_replaces_target() {
        let config = LogConfig::new("debug")
            .with_format(LogFormat::Json)
            .with_file_logging("logs", "vw", FileRotation::Hourly)
            .with_directive("voxwatch_gateway=trace");

        assert_eq!(
            config.target,
            LogTarget::Files {
                dir: PathBuf::from("logs"),
                prefix: "vw".into(),
                rotation: FileRotation::Hourly,
            }
        );
        assert_eq!(config.directives, vec!["voxwatch_gateway=trace"]);
    }

    #[test]
    fn option_names_are_case_insensitive() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" full ".parse::<LogFormat>().unwrap(), LogFormat::Full);
        assert_eq!("Never".parse::<FileRotation>().unwrap(), FileRotation::Never);
    }

    #[test]
    fn unknown_option_names_the_option() {
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(TelemetryError::UnknownOption { kind: "log format", .. })
        ));
        let err = "weekly".parse::<FileRotation>().unwrap_err();
        assert_eq!(err.to_string(), "unknown file rotation 'weekly'");
    }

    #[test]
    fn directives_extend_filter() {
        let config = LogConfig::new("debug").with_directive("voxwatch=trace");
        assert!(config.build_filter().is_ok());
    }

    #[test]
    fn bad_directive_is_reported() {
        let config = LogConfig::new("debug").with_directive("[invalid=syntax");
        match config.build_filter() {
            Err(TelemetryError::Filter { directive, .. }) => {
                assert_eq!(directive, "[invalid=syntax");
            },
            other => panic!("expected filter error, got {other:?}"),
        }
    }

    #[test]
    fn setup_creates_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("nested").join("logs");
        let config =
            LogConfig::new("info").with_file_logging(&logs, "voxwatch", FileRotation::Never);

        // The directory exists even if another test already installed the
        // global subscriber.
        let _guard = setup_logging(&config);
        assert!(logs.is_dir());
    }
}
