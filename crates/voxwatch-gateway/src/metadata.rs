//! Memoized display names for channels, guilds, and users.
//!
//! Names come from an injected [`MetadataSource`]. Each cache keeps at most
//! one lookup in flight per key: concurrent callers for the same key wait on
//! the same result. Successful names are kept for the life of the process;
//! failures are not cached, so the next call retries.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::LookupError;

/// Channel record returned by a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    /// Channel name.
    pub name: String,
    /// Owning guild, for guild channels.
    pub guild_id: Option<String>,
}

/// Guild record returned by a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildInfo {
    /// Guild name.
    pub name: String,
}

/// Account record returned by a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserInfo {
    /// Unique account name.
    pub username: Option<String>,
    /// Global display name.
    pub global_name: Option<String>,
}

/// Guild-scoped member record returned by a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemberInfo {
    /// Guild nickname.
    pub nick: Option<String>,
    /// The member's account.
    pub user: Option<UserInfo>,
}

/// Remote lookups backing the cache.
///
/// `Ok(None)` means the entity is unknown or not visible to us; it is an
/// expected outcome, not an error.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Look up a channel by id.
    async fn channel(&self, channel_id: &str) -> Result<Option<ChannelInfo>, LookupError>;

    /// Look up a guild by id.
    async fn guild(&self, guild_id: &str) -> Result<Option<GuildInfo>, LookupError>;

    /// Look up an account by id.
    async fn user(&self, user_id: &str) -> Result<Option<UserInfo>, LookupError>;

    /// Look up a guild member.
    async fn member(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<Option<MemberInfo>, LookupError>;
}

/// Name candidates carried inline by a membership update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameHint {
    /// Guild nickname.
    pub nick: Option<String>,
    /// Global display name.
    pub global_name: Option<String>,
    /// Account name.
    pub username: Option<String>,
}

impl NameHint {
    /// The highest-priority non-empty name: nickname, global name, account name.
    #[must_use]
    pub fn best(&self) -> Option<&str> {
        [&self.nick, &self.global_name, &self.username]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|name| !name.trim().is_empty())
    }
}

impl From<&MemberInfo> for NameHint {
    fn from(member: &MemberInfo) -> Self {
        let user = member.user.clone().unwrap_or_default();
        Self {
            nick: member.nick.clone(),
            global_name: user.global_name,
            username: user.username,
        }
    }
}

impl From<&UserInfo> for NameHint {
    fn from(user: &UserInfo) -> Self {
        Self {
            nick: None,
            global_name: user.global_name.clone(),
            username: user.username.clone(),
        }
    }
}

// ── Single-flight name cache ─────────────────────────────────

type Flight = watch::Receiver<Option<Option<String>>>;

enum Slot {
    Ready(String),
    Pending(Flight),
}

enum Lookup {
    Hit(String),
    Wait(Flight),
}

/// A key → name map with at most one lookup in flight per key.
#[derive(Default)]
struct NameCache {
    slots: Arc<DashMap<String, Slot>>,
}

impl NameCache {
    /// The cached name, without triggering a lookup.
    fn peek(&self, key: &str) -> Option<String> {
        self.slots.get(key).and_then(|slot| match &*slot {
            Slot::Ready(name) => Some(name.clone()),
            Slot::Pending(_) => None,
        })
    }

    /// Return the cached name, join the in-flight lookup, or start one.
    ///
    /// The lookup runs on its own task, so it completes and populates the
    /// cache even if every caller stops waiting.
    fn lookup_or_spawn<F, Fut>(&self, key: &str, fetch: F) -> Lookup
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        match self.slots.entry(key.to_owned()) {
            Entry::Occupied(entry) => match entry.get() {
                Slot::Ready(name) => Lookup::Hit(name.clone()),
                Slot::Pending(flight) => Lookup::Wait(flight.clone()),
            },
            Entry::Vacant(entry) => {
                let (tx, rx) = watch::channel(None);
                entry.insert(Slot::Pending(rx.clone()));

                let slots = Arc::clone(&self.slots);
                let key = key.to_owned();
                let lookup = fetch();
                tokio::spawn(async move {
                    let result = lookup.await;
                    match &result {
                        Some(name) => {
                            slots.insert(key, Slot::Ready(name.clone()));
                        },
                        None => {
                            slots.remove(&key);
                        },
                    }
                    let _ = tx.send(Some(result));
                });
                Lookup::Wait(rx)
            },
        }
    }

    async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Option<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        match self.lookup_or_spawn(key, fetch) {
            Lookup::Hit(name) => Some(name),
            Lookup::Wait(mut flight) => match flight.wait_for(Option::is_some).await {
                Ok(result) => result.clone().flatten(),
                Err(_) => {
                    // The flight task died without reporting; let the next caller retry.
                    self.slots
                        .remove_if(key, |_, slot| matches!(slot, Slot::Pending(_)));
                    None
                },
            },
        }
    }

    fn prefetch<F, Fut>(&self, key: &str, fetch: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        let _ = self.lookup_or_spawn(key, fetch);
    }
}

/// Run a lookup under `timeout`, degrading every failure to `None`.
async fn bounded<T>(
    what: &'static str,
    id: String,
    timeout: Duration,
    lookup: impl Future<Output = Result<Option<T>, LookupError>>,
) -> Option<T> {
    match tokio::time::timeout(timeout, lookup).await {
        Ok(Ok(Some(record))) => Some(record),
        Ok(Ok(None)) => {
            debug!(kind = what, id = %id, "Lookup returned nothing");
            None
        },
        Ok(Err(e)) => {
            warn!(kind = what, id = %id, error = %e, "Lookup failed");
            None
        },
        Err(_) => {
            warn!(
                kind = what,
                id = %id,
                error = %LookupError::Timeout(timeout),
                "Lookup failed"
            );
            None
        },
    }
}

// ── MetadataCache ────────────────────────────────────────────

/// Default time budget for a single remote lookup.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Guild name used when an update carries no guild.
pub const UNKNOWN_GUILD: &str = "Unknown Server";

/// Memoizing front for a [`MetadataSource`].
pub struct MetadataCache {
    source: Arc<dyn MetadataSource>,
    timeout: Duration,
    channels: NameCache,
    /// Channel id → owning guild id, learned from channel lookups.
    channel_guilds: Arc<DashMap<String, String>>,
    guilds: NameCache,
    /// Keyed by `guild:user`.
    members: NameCache,
    users: NameCache,
}

impl MetadataCache {
    /// Create a cache over `source` with a per-lookup `timeout`.
    #[must_use]
    pub fn new(source: Arc<dyn MetadataSource>, timeout: Duration) -> Self {
        Self {
            source,
            timeout,
            channels: NameCache::default(),
            channel_guilds: Arc::new(DashMap::new()),
            guilds: NameCache::default(),
            members: NameCache::default(),
            users: NameCache::default(),
        }
    }

    fn fetch_channel(
        &self,
        channel_id: &str,
    ) -> impl Future<Output = Option<String>> + Send + 'static {
        let source = Arc::clone(&self.source);
        let guilds = Arc::clone(&self.channel_guilds);
        let timeout = self.timeout;
        let id = channel_id.to_owned();
        async move {
            let info = bounded("channel", id.clone(), timeout, source.channel(&id)).await?;
            if let Some(guild_id) = info.guild_id {
                guilds.insert(id, guild_id);
            }
            Some(info.name)
        }
    }

    fn fetch_guild(
        &self,
        guild_id: &str,
    ) -> impl Future<Output = Option<String>> + Send + 'static {
        let source = Arc::clone(&self.source);
        let timeout = self.timeout;
        let id = guild_id.to_owned();
        async move {
            bounded("guild", id.clone(), timeout, source.guild(&id))
                .await
                .map(|g| g.name)
        }
    }

    /// Resolve a channel name, looking it up on a miss.
    pub async fn resolve_channel_name(&self, channel_id: &str) -> Option<String> {
        self.channels
            .get_or_fetch(channel_id, || self.fetch_channel(channel_id))
            .await
    }

    /// Resolve a guild name, looking it up on a miss.
    pub async fn resolve_guild_name(&self, guild_id: &str) -> Option<String> {
        self.guilds
            .get_or_fetch(guild_id, || self.fetch_guild(guild_id))
            .await
    }

    /// Channel name with the channel id as fallback.
    pub async fn channel_name(&self, channel_id: &str) -> String {
        self.resolve_channel_name(channel_id)
            .await
            .unwrap_or_else(|| channel_id.to_owned())
    }

    /// Guild name with `"Guild {id}"` / [`UNKNOWN_GUILD`] as fallbacks.
    pub async fn guild_name(&self, guild_id: Option<&str>) -> String {
        let Some(guild_id) = guild_id else {
            return UNKNOWN_GUILD.to_owned();
        };
        self.resolve_guild_name(guild_id)
            .await
            .unwrap_or_else(|| format!("Guild {guild_id}"))
    }

    /// Cached channel name, never triggering a lookup.
    #[must_use]
    pub fn cached_channel_name(&self, channel_id: &str) -> Option<String> {
        self.channels.peek(channel_id)
    }

    /// Channel name from the cache, or the id while a background lookup
    /// fills it in.
    #[must_use]
    pub fn channel_name_now(&self, channel_id: &str) -> String {
        if let Some(name) = self.channels.peek(channel_id) {
            return name;
        }
        self.channels.prefetch(channel_id, || self.fetch_channel(channel_id));
        channel_id.to_owned()
    }

    /// Like [`guild_name`](Self::guild_name), but answers from the cache
    /// and looks a miss up in the background.
    #[must_use]
    pub fn guild_name_now(&self, guild_id: Option<&str>) -> String {
        let Some(guild_id) = guild_id else {
            return UNKNOWN_GUILD.to_owned();
        };
        if let Some(name) = self.guilds.peek(guild_id) {
            return name;
        }
        self.guilds.prefetch(guild_id, || self.fetch_guild(guild_id));
        format!("Guild {guild_id}")
    }

    /// Owning guild of a channel, if a lookup has revealed it.
    #[must_use]
    pub fn guild_for_channel(&self, channel_id: &str) -> Option<String> {
        self.channel_guilds.get(channel_id).map(|g| g.clone())
    }

    /// Resolve a user's display name without waiting on the network.
    ///
    /// Order: inline hint, cached guild member, cached account, then
    /// `"User {id}"`. The fallback also starts a background lookup so later
    /// events for the same user get a real name.
    #[must_use]
    pub fn display_name(&self, user_id: &str, guild_id: Option<&str>, hint: &NameHint) -> String {
        if let Some(name) = hint.best() {
            return name.to_owned();
        }
        if let Some(guild_id) = guild_id
            && let Some(name) = self.members.peek(&member_key(guild_id, user_id))
        {
            return name;
        }
        if let Some(name) = self.users.peek(user_id) {
            return name;
        }

        self.prefetch_user(user_id, guild_id);
        format!("User {user_id}")
    }

    fn prefetch_user(&self, user_id: &str, guild_id: Option<&str>) {
        let source = Arc::clone(&self.source);
        let timeout = self.timeout;
        let user = user_id.to_owned();

        if let Some(guild_id) = guild_id {
            let guild = guild_id.to_owned();
            self.members
                .prefetch(&member_key(guild_id, user_id), move || async move {
                    let member = bounded(
                        "member",
                        user.clone(),
                        timeout,
                        source.member(&guild, &user),
                    )
                    .await?;
                    NameHint::from(&member).best().map(str::to_owned)
                });
        } else {
            self.users.prefetch(user_id, move || async move {
                let info = bounded("user", user.clone(), timeout, source.user(&user)).await?;
                NameHint::from(&info).best().map(str::to_owned)
            });
        }
    }

    /// Resolve names for every watched channel and their guilds up front.
    pub async fn prime<'a>(&self, channel_ids: impl IntoIterator<Item = &'a str>) {
        let ids: Vec<&str> = channel_ids.into_iter().collect();
        let names = join_all(ids.iter().map(|id| self.resolve_channel_name(id))).await;
        let resolved = names.iter().filter(|n| n.is_some()).count();
        debug!(channels = ids.len(), resolved, "Primed channel names");

        let guild_ids: Vec<String> = ids
            .iter()
            .filter_map(|id| self.guild_for_channel(id))
            .collect();
        join_all(guild_ids.iter().map(|g| self.resolve_guild_name(g))).await;
    }
}

fn member_key(guild_id: &str, user_id: &str) -> String {
    format!("{guild_id}:{user_id}")
}
