//! Run command - connect to the gateway and track voice presence.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Local, Utc};
use tracing::{error, info, warn};
use voxwatch_config::Config;
use voxwatch_core::{EventSink, NormalizedEvent, SinkSet, StatusEvent, TrackerEvent, format_duration};
use voxwatch_gateway::{DiscordRest, MetadataCache, WebhookNotifier};
use voxwatch_storage::{CsvLogSink, CsvLogStore};

use crate::config_bridge;
use crate::theme::Theme;

/// Upper bound for flushing the presence log on exit.
const LOG_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Prints presence events and state changes to stdout.
struct ConsoleSink;

impl ConsoleSink {
    fn presence_line(event: &NormalizedEvent) -> String {
        let time = DateTime::<Utc>::from_timestamp_millis(event.timestamp_ms)
            .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
            .unwrap_or_default();
        let mut line = format!(
            "{} {} {} → {} ({})",
            Theme::dimmed(&time),
            Theme::presence(event.kind),
            event.user_name,
            event.channel_name,
            event.guild_name,
        );
        if let Some(ms) = event.stay_duration_ms {
            line.push_str(&Theme::dimmed(&format!(" after {}", format_duration(ms))));
        }
        line
    }
}

impl EventSink for ConsoleSink {
    fn deliver(&self, event: &TrackerEvent) {
        match event {
            TrackerEvent::Presence(presence) => println!("{}", Self::presence_line(presence)),
            TrackerEvent::Status(StatusEvent::StateChanged { state, .. }) => {
                println!("{}", Theme::info(&Theme::state(*state)));
            },
            TrackerEvent::Status(StatusEvent::Error { message, fatal }) => {
                if *fatal {
                    error!(%message, "Tracker stopped");
                } else {
                    warn!(%message, "Tracker error");
                }
            },
        }
    }
}

/// Run the tracker until Ctrl-C or a fatal failure.
pub(crate) async fn run_tracker(cfg: &Config) -> anyhow::Result<ExitCode> {
    let lookup_timeout = Duration::from_secs(cfg.lookup.timeout_secs);
    let rest = DiscordRest::new(
        &cfg.gateway.api_base,
        cfg.gateway.token.trim(),
        config_bridge::token_type(cfg)?,
        lookup_timeout,
    )
    .context("failed to build REST client")?;

    let gateway_url = match &cfg.gateway.gateway_url {
        Some(url) => url.clone(),
        None => rest.gateway_url().await,
    };
    let tracker_config = config_bridge::to_tracker_config(cfg, gateway_url)?;

    let metadata = Arc::new(MetadataCache::new(Arc::new(rest), lookup_timeout));
    metadata.prime(tracker_config.watch.iter()).await;

    let data_dir = cfg.data_dir()?;
    let store = CsvLogStore::open(&data_dir, &cfg.storage.file_name)
        .with_context(|| format!("failed to open presence log in {}", data_dir.display()))?;
    info!(path = %store.path().display(), "Logging presence events");
    let (log_sink, log_writer) = CsvLogSink::spawn(Arc::new(store));

    let mut sinks = SinkSet::new()
        .with(Arc::new(log_sink))
        .with(Arc::new(ConsoleSink));
    if cfg.notify.enabled
        && let Some(url) = &cfg.notify.webhook_url
    {
        let notifier = WebhookNotifier::new(
            url,
            &cfg.notify.username,
            true,
            Duration::from_secs(cfg.notify.timeout_secs),
        )
        .context("failed to set up webhook notifications")?;
        sinks.push(Arc::new(notifier));
    }

    println!(
        "{}",
        Theme::info(&format!(
            "Watching {} channel(s), press Ctrl-C to stop",
            tracker_config.watch.len()
        ))
    );
    let mut handle = voxwatch_gateway::spawn(tracker_config, metadata, Arc::new(sinks))?;

    let finished = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for Ctrl-C");
            }
            info!("Shutting down");
            None
        },
        result = handle.finished() => Some(result),
    };
    let result = match finished {
        Some(result) => result,
        None => handle.stop().await,
    };

    // The tracker has dropped its sinks; wait for queued rows to land.
    if tokio::time::timeout(LOG_FLUSH_TIMEOUT, log_writer).await.is_err() {
        warn!("Presence log writer did not finish in time");
    }

    match result {
        Ok(()) => {
            println!("{}", Theme::success("Stopped"));
            Ok(ExitCode::SUCCESS)
        },
        Err(e) => {
            eprintln!("{}", Theme::error(&e.to_string()));
            Ok(ExitCode::FAILURE)
        },
    }
}
