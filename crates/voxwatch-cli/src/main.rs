//! Voxwatch CLI - Discord voice presence tracker.
//!
//! Connects to the Discord gateway, reports joins and leaves in watched
//! voice channels, and summarizes the resulting presence log.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use voxwatch_config::{Config, ShowFormat};
use voxwatch_storage::{ExportFormat, Period};

mod commands;
mod config_bridge;
mod theme;

use commands::{check_config, export, run, stats};
use theme::Theme;

/// Voxwatch - Discord voice presence tracker
#[derive(Parser)]
#[command(name = "voxwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to an extra configuration file, layered over ~/.voxwatch/config.toml
    #[arg(short, long, global = true, env = "VOXWATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the gateway and track watched voice channels
    Run,

    /// Summarize the presence log
    Stats {
        /// today, week, month or all
        #[arg(short, long, default_value = "all")]
        period: Period,

        /// Print the statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export presence records
    Export {
        /// json or csv
        #[arg(short, long, default_value = "json")]
        format: ExportFormat,

        /// Output file
        #[arg(short, long)]
        out: PathBuf,

        /// today, week, month or all
        #[arg(short, long, default_value = "all")]
        period: Period,
    },

    /// Validate and print the resolved configuration (secrets redacted)
    CheckConfig {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = ShowArg::Toml)]
        format: ShowArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ShowArg {
    Toml,
    Json,
}

impl From<ShowArg> for ShowFormat {
    fn from(arg: ShowArg) -> Self {
        match arg {
            ShowArg::Toml => Self::Toml,
            ShowArg::Json => Self::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let resolved = Config::load(cli.config.as_deref());

    // Set up logging from config, with --verbose override.
    let log_config = match &resolved {
        Ok(resolved) => {
            let mut lc = config_bridge::to_log_config(&resolved.config);
            if cli.verbose {
                "debug".clone_into(&mut lc.level);
            }
            lc
        },
        Err(_) => {
            let level = if cli.verbose { "debug" } else { "info" };
            voxwatch_telemetry::LogConfig::new(level)
        },
    };
    let _log_guard = match voxwatch_telemetry::setup_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        },
    };

    if let Commands::CheckConfig { format } = cli.command {
        return match resolved {
            Ok(resolved) => {
                check_config::show_config(&resolved, format.into())?;
                Ok(ExitCode::SUCCESS)
            },
            Err(e) => {
                eprintln!("{}", Theme::error(&e.to_string()));
                Ok(ExitCode::FAILURE)
            },
        };
    }

    let config = resolved.context("failed to load configuration")?.config;

    match cli.command {
        Commands::Run => {
            println!("{}", Theme::banner());
            return run::run_tracker(&config).await;
        },
        Commands::Stats { period, json } => stats::show_stats(&config, period, json)?,
        Commands::Export {
            format,
            out,
            period,
        } => export::export_records(&config, format, &out, period)?,
        Commands::CheckConfig { .. } => {},
    }

    Ok(ExitCode::SUCCESS)
}
