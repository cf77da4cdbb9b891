//! Stats command - summarize the presence log.

use std::fmt::Write as _;

use anyhow::Context;
use chrono::{DateTime, Local, Utc};
use voxwatch_config::Config;
use voxwatch_core::format_duration;
use voxwatch_storage::{CsvLogStore, Period, Statistics};

use crate::theme::Theme;

/// Users listed in the summary.
const TOP_USERS: usize = 10;

/// Open the presence log named by `cfg`.
pub(crate) fn open_store(cfg: &Config) -> anyhow::Result<CsvLogStore> {
    let data_dir = cfg.data_dir()?;
    CsvLogStore::open(&data_dir, &cfg.storage.file_name)
        .with_context(|| format!("failed to open presence log in {}", data_dir.display()))
}

/// Print statistics for `period`.
pub(crate) fn show_stats(cfg: &Config, period: Period, json: bool) -> anyhow::Result<()> {
    let store = open_store(cfg)?;
    let records = store.load().context("failed to read presence log")?;
    let stats = Statistics::calculate(&records, period, Local::now());

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print!("{}", render(&stats));
    }
    Ok(())
}

fn local_timestamp(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

/// Human-readable summary.
fn render(stats: &Statistics) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "\n{}",
        Theme::header(&format!("Voice activity ({})", stats.period))
    );
    let _ = writeln!(out, "{}", Theme::separator());

    if stats.total_events == 0 {
        let _ = writeln!(out, "{}", Theme::info("No events recorded in this period"));
        return out;
    }

    let _ = writeln!(out, "{}", Theme::kv("Events", &stats.total_events.to_string()));
    let _ = writeln!(out, "{}", Theme::kv("Joins", &stats.joins.to_string()));
    let _ = writeln!(out, "{}", Theme::kv("Leaves", &stats.leaves.to_string()));
    if let Some(hour) = stats.busiest_hour() {
        let _ = writeln!(
            out,
            "{}",
            Theme::kv("Busiest hour", &format!("{hour:02}:00-{hour:02}:59"))
        );
    }

    let _ = writeln!(out, "\n{}", Theme::header("Top users"));
    for user in stats.top_users(TOP_USERS) {
        let average = user
            .average_stay_ms()
            .map(format_duration)
            .unwrap_or_else(|| "-".to_owned());
        let _ = writeln!(
            out,
            "  {:<24} {:>12}  {} joins, avg {}, last seen {}  {}",
            user.user_name,
            format_duration(user.total_duration_ms),
            user.join_count,
            average,
            local_timestamp(user.last_seen_ms),
            Theme::dimmed(&user.guild_name),
        );
    }

    let _ = writeln!(out, "\n{}", Theme::header("Channels"));
    for channel in &stats.channels {
        let _ = writeln!(
            out,
            "  {:<24} {:>12}  {} joins, {} users  {}",
            channel.channel_name,
            format_duration(channel.total_duration_ms),
            channel.join_count,
            channel.unique_users,
            Theme::dimmed(&channel.guild_name),
        );
    }

    let _ = writeln!(out, "\n{}", Theme::header("Servers"));
    for guild in &stats.guilds {
        let _ = writeln!(
            out,
            "  {:<24} {:>12}  {} joins",
            guild.guild_name,
            format_duration(guild.total_duration_ms),
            guild.join_count,
        );
    }
    out.push('\n');
    out
}
