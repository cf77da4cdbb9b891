//! Presence transition tracking.
//!
//! [`PresenceTracker`] keeps each observed user's current voice channel and,
//! while that channel is watched, the time they joined it. Every membership
//! update is turned into zero or more [`NormalizedEvent`]s:
//!
//! | previous → new            | events                |
//! |---------------------------|-----------------------|
//! | none/unwatched → watched  | Join                  |
//! | watched → none/unwatched  | Leave                 |
//! | watched A → watched B     | Leave(A), then Join(B)|
//! | X → X                     | nothing               |
//!
//! Invariant: `joined_at_ms` is set if and only if the current channel is
//! in the watch set.

use std::collections::{HashMap, HashSet};

use tracing::trace;
use voxwatch_core::NormalizedEvent;

/// Immutable set of watched channel ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSet(HashSet<String>);

impl WatchSet {
    /// Whether `channel_id` is watched. `None` never is.
    #[must_use]
    pub fn contains(&self, channel_id: Option<&str>) -> bool {
        channel_id.is_some_and(|id| self.0.contains(id))
    }

    /// Watched channel ids in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of watched channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing is watched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for WatchSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Where a user currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPresence {
    /// Current voice channel.
    pub current_channel_id: Option<String>,
    /// Join time in epoch ms, only while in a watched channel.
    pub joined_at_ms: Option<i64>,
}

/// One membership update, already enriched with display names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipUpdate {
    /// The user whose voice state changed.
    pub user_id: String,
    /// New channel, `None` when the user left voice.
    pub channel_id: Option<String>,
    /// Guild of the voice state.
    pub guild_id: Option<String>,
    /// Resolved guild display name.
    pub guild_name: String,
    /// Resolved user display name.
    pub user_name: String,
}

/// Per-user channel bookkeeping for one tracker.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    watch: WatchSet,
    self_user_id: Option<String>,
    users: HashMap<String, UserPresence>,
}

impl PresenceTracker {
    /// Create a tracker for `watch`, ignoring updates about `self_user_id`.
    #[must_use]
    pub fn new(watch: WatchSet, self_user_id: Option<String>) -> Self {
        Self {
            watch,
            self_user_id,
            users: HashMap::new(),
        }
    }

    /// The watch set.
    #[must_use]
    pub fn watch_set(&self) -> &WatchSet {
        &self.watch
    }

    /// Whether `user_id` is the configured self user.
    #[must_use]
    pub fn is_self(&self, user_id: &str) -> bool {
        self.self_user_id.as_deref() == Some(user_id)
    }

    /// Whether a self user id is known.
    #[must_use]
    pub fn has_self_user(&self) -> bool {
        self.self_user_id.is_some()
    }

    /// Set the self user id, dropping any presence recorded for it.
    pub fn set_self_user_id(&mut self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        self.users.remove(&user_id);
        self.self_user_id = Some(user_id);
    }

    /// The user's current channel, if known.
    #[must_use]
    pub fn current_channel(&self, user_id: &str) -> Option<&str> {
        self.users
            .get(user_id)
            .and_then(|p| p.current_channel_id.as_deref())
    }

    /// Full presence record for a user.
    #[must_use]
    pub fn presence(&self, user_id: &str) -> Option<&UserPresence> {
        self.users.get(user_id)
    }

    /// Number of users with a tracked presence.
    #[must_use]
    pub fn tracked_users(&self) -> usize {
        self.users.len()
    }

    /// Whether moving between `previous` and `next` could emit anything.
    #[must_use]
    pub fn involves_watched(&self, previous: Option<&str>, next: Option<&str>) -> bool {
        previous != next && (self.watch.contains(previous) || self.watch.contains(next))
    }

    /// Apply one update and return the resulting events in emission order.
    ///
    /// `channel_name` maps a channel id to its display name; it is only
    /// called for channels that appear in an emitted event.
    pub fn on_membership_update(
        &mut self,
        update: &MembershipUpdate,
        now_ms: i64,
        channel_name: impl Fn(&str) -> String,
    ) -> Vec<NormalizedEvent> {
        if self.is_self(&update.user_id) {
            trace!(user_id = %update.user_id, "Ignoring self update");
            return Vec::new();
        }

        let previous = self.users.get(&update.user_id).cloned();
        let previous_channel = previous.as_ref().and_then(|p| p.current_channel_id.clone());
        let next_channel = update.channel_id.clone();

        if previous_channel == next_channel {
            // Mute, deafen, or a repeated state: nothing moved.
            return Vec::new();
        }

        let was_watched = self.watch.contains(previous_channel.as_deref());
        let is_watched = self.watch.contains(next_channel.as_deref());
        let mut events = Vec::new();

        if was_watched && let Some(left) = previous_channel.as_deref() {
            let joined_at = previous.as_ref().and_then(|p| p.joined_at_ms);
            let stay = joined_at.map_or(0, |joined| {
                u64::try_from(now_ms.saturating_sub(joined)).unwrap_or(0)
            });
            events.push(NormalizedEvent::leave(
                &update.guild_name,
                &update.user_name,
                channel_name(left),
                left,
                now_ms,
                stay,
            ));
        }

        if is_watched && let Some(joined) = next_channel.as_deref() {
            events.push(NormalizedEvent::join(
                &update.guild_name,
                &update.user_name,
                channel_name(joined),
                joined,
                now_ms,
            ));
        }

        match next_channel {
            Some(channel) => {
                self.users.insert(
                    update.user_id.clone(),
                    UserPresence {
                        current_channel_id: Some(channel),
                        joined_at_ms: is_watched.then_some(now_ms),
                    },
                );
            },
            None => {
                self.users.remove(&update.user_id);
            },
        }

        events
    }
}
