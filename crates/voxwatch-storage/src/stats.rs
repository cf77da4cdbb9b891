//! Aggregate statistics over presence records.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, Local, NaiveTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use voxwatch_core::PresenceKind;

use crate::error::StorageError;
use crate::record::LogRecord;

/// Reporting window, anchored to local time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    /// Since local midnight.
    Today,
    /// Since local midnight on the most recent Sunday.
    Week,
    /// Since the first of the month.
    Month,
    /// Everything.
    #[default]
    All,
}

impl Period {
    /// Lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Week => "week",
            Self::Month => "month",
            Self::All => "all",
        }
    }

    /// Start of the window relative to `now`; `None` for [`Period::All`].
    #[must_use]
    pub fn start(self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        let today = now.date_naive();
        let first_day = match self {
            Self::All => return None,
            Self::Today => today,
            Self::Week => {
                today.checked_sub_days(Days::new(u64::from(now.weekday().num_days_from_sunday())))?
            },
            Self::Month => today.with_day(1)?,
        };
        Local
            .from_local_datetime(&first_day.and_time(NaiveTime::MIN))
            .earliest()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "today" => Ok(Self::Today),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "all" => Ok(Self::All),
            other => Err(StorageError::UnknownPeriod(other.to_owned())),
        }
    }
}

/// Per-user totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    /// Guild the user was seen in.
    pub guild_name: String,
    /// User display name.
    pub user_name: String,
    /// Sum of recorded stays.
    pub total_duration_ms: u64,
    /// Number of joins.
    pub join_count: u32,
    /// Number of leaves.
    pub leave_count: u32,
    /// Timestamp of the latest event.
    pub last_seen_ms: i64,
}

impl UserStats {
    /// Mean stay per leave, if any leave was recorded.
    #[must_use]
    pub fn average_stay_ms(&self) -> Option<u64> {
        self.total_duration_ms.checked_div(u64::from(self.leave_count))
    }
}

/// Per-channel totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStats {
    /// Guild owning the channel.
    pub guild_name: String,
    /// Channel display name.
    pub channel_name: String,
    /// Sum of recorded stays.
    pub total_duration_ms: u64,
    /// Number of joins.
    pub join_count: u32,
    /// Number of leaves.
    pub leave_count: u32,
    /// Distinct users seen in the channel.
    pub unique_users: usize,
}

/// Per-guild totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuildStats {
    /// Guild display name.
    pub guild_name: String,
    /// Sum of recorded stays.
    pub total_duration_ms: u64,
    /// Number of joins.
    pub join_count: u32,
    /// Number of leaves.
    pub leave_count: u32,
}

/// Statistics for one period. Lists are sorted by total stay, longest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    /// Window the statistics cover.
    pub period: Period,
    /// Records in the window.
    pub total_events: usize,
    /// Joins in the window.
    pub joins: usize,
    /// Leaves in the window.
    pub leaves: usize,
    /// Per-user totals.
    pub users: Vec<UserStats>,
    /// Per-channel totals.
    pub channels: Vec<ChannelStats>,
    /// Per-guild totals.
    pub guilds: Vec<GuildStats>,
    /// Stay time by local hour of the leave.
    pub hourly_ms: [u64; 24],
}

struct ChannelAcc {
    stats: ChannelStats,
    users: HashSet<String>,
}

impl Statistics {
    /// Aggregate `records` that fall in `period` as seen from `now`.
    #[must_use]
    pub fn calculate(records: &[LogRecord], period: Period, now: DateTime<Local>) -> Self {
        let start_ms = period.start(now).map(|start| start.timestamp_millis());

        let mut stats = Self {
            period,
            total_events: 0,
            joins: 0,
            leaves: 0,
            users: Vec::new(),
            channels: Vec::new(),
            guilds: Vec::new(),
            hourly_ms: [0; 24],
        };
        let mut users: BTreeMap<(&str, &str), UserStats> = BTreeMap::new();
        let mut channels: BTreeMap<(&str, &str), ChannelAcc> = BTreeMap::new();
        let mut guilds: BTreeMap<&str, GuildStats> = BTreeMap::new();

        for record in records
            .iter()
            .filter(|r| start_ms.is_none_or(|start| r.timestamp >= start))
        {
            stats.total_events = stats.total_events.saturating_add(1);
            let stay = record.stay_duration_ms.unwrap_or(0);

            let user = users
                .entry((record.guild_name.as_str(), record.user_name.as_str()))
                .or_insert_with(|| UserStats {
                    guild_name: record.guild_name.clone(),
                    user_name: record.user_name.clone(),
                    total_duration_ms: 0,
                    join_count: 0,
                    leave_count: 0,
                    last_seen_ms: record.timestamp,
                });
            user.last_seen_ms = user.last_seen_ms.max(record.timestamp);

            let channel = channels
                .entry((record.guild_name.as_str(), record.channel_name.as_str()))
                .or_insert_with(|| ChannelAcc {
                    stats: ChannelStats {
                        guild_name: record.guild_name.clone(),
                        channel_name: record.channel_name.clone(),
                        total_duration_ms: 0,
                        join_count: 0,
                        leave_count: 0,
                        unique_users: 0,
                    },
                    users: HashSet::new(),
                });
            channel.users.insert(record.user_name.clone());

            let guild = guilds
                .entry(record.guild_name.as_str())
                .or_insert_with(|| GuildStats {
                    guild_name: record.guild_name.clone(),
                    total_duration_ms: 0,
                    join_count: 0,
                    leave_count: 0,
                });

            match record.event_type {
                PresenceKind::Join => {
                    stats.joins = stats.joins.saturating_add(1);
                    user.join_count = user.join_count.saturating_add(1);
                    channel.stats.join_count = channel.stats.join_count.saturating_add(1);
                    guild.join_count = guild.join_count.saturating_add(1);
                },
                PresenceKind::Leave => {
                    stats.leaves = stats.leaves.saturating_add(1);
                    user.leave_count = user.leave_count.saturating_add(1);
                    user.total_duration_ms = user.total_duration_ms.saturating_add(stay);
                    channel.stats.leave_count = channel.stats.leave_count.saturating_add(1);
                    channel.stats.total_duration_ms =
                        channel.stats.total_duration_ms.saturating_add(stay);
                    guild.leave_count = guild.leave_count.saturating_add(1);
                    guild.total_duration_ms = guild.total_duration_ms.saturating_add(stay);

                    if let Some(slot) = record
                        .local_time()
                        .and_then(|t| stats.hourly_ms.get_mut(t.hour() as usize))
                    {
                        *slot = slot.saturating_add(stay);
                    }
                },
            }
        }

        stats.users = users.into_values().collect();
        stats.channels = channels
            .into_values()
            .map(|mut acc| {
                acc.stats.unique_users = acc.users.len();
                acc.stats
            })
            .collect();
        stats.guilds = guilds.into_values().collect();

        stats
            .users
            .sort_by(|a, b| b.total_duration_ms.cmp(&a.total_duration_ms));
        stats
            .channels
            .sort_by(|a, b| b.total_duration_ms.cmp(&a.total_duration_ms));
        stats
            .guilds
            .sort_by(|a, b| b.total_duration_ms.cmp(&a.total_duration_ms));
        stats
    }

    /// The `n` users with the longest total stay.
    #[must_use]
    pub fn top_users(&self, n: usize) -> &[UserStats] {
        &self.users[..n.min(self.users.len())]
    }

    /// Local hour with the most stay time, if any.
    #[must_use]
    pub fn busiest_hour(&self) -> Option<u32> {
        self.hourly_ms
            .iter()
            .zip(0u32..)
            .filter(|(ms, _)| **ms > 0)
            .max_by_key(|(ms, _)| **ms)
            .map(|(_, hour)| hour)
    }
}
