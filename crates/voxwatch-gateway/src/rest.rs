//! REST API client used for metadata lookups and gateway discovery.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{LookupError, TrackerError, TrackerResult};
use crate::metadata::{ChannelInfo, GuildInfo, MemberInfo, MetadataSource, UserInfo};
use crate::protocol::GatewayResponse;

/// Default REST API base URL.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Gateway URL used when discovery fails.
pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg";

/// How the token is presented in the `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenType {
    /// Raw token, as a user account sends it.
    #[default]
    User,
    /// `Bot <token>`.
    Bot,
}

impl FromStr for TokenType {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "bot" => Ok(Self::Bot),
            other => Err(TrackerError::Config(format!("unknown token type: {other}"))),
        }
    }
}

/// REST client for channel, guild, user, and member lookups.
#[derive(Clone)]
pub struct DiscordRest {
    http: reqwest::Client,
    api_base: String,
    token: String,
    token_type: TokenType,
}

impl fmt::Debug for DiscordRest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordRest")
            .field("api_base", &self.api_base)
            .field("token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct ChannelResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    guild_id: Option<String>,
}

#[derive(Deserialize)]
struct GuildResponse {
    name: String,
}

#[derive(Deserialize)]
struct UserResponse {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    global_name: Option<String>,
}

#[derive(Deserialize)]
struct MemberResponse {
    #[serde(default)]
    nick: Option<String>,
    #[serde(default)]
    user: Option<UserResponse>,
}

impl From<UserResponse> for UserInfo {
    fn from(user: UserResponse) -> Self {
        Self {
            username: user.username,
            global_name: user.global_name,
        }
    }
}

impl DiscordRest {
    /// Build a client. `timeout` bounds every request.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Http`] if the HTTP client cannot be built.
    pub fn new(
        api_base: impl Into<String>,
        token: impl Into<String>,
        token_type: TokenType,
        timeout: Duration,
    ) -> TrackerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("voxwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_owned(),
            token: token.into(),
            token_type,
        })
    }

    fn authorization(&self) -> String {
        match self.token_type {
            TokenType::User => self.token.clone(),
            TokenType::Bot => format!("Bot {}", self.token),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, LookupError> {
        let url = format!("{}{path}", self.api_base);
        let resp = self
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .send()
            .await?;

        match resp.status() {
            status if status.is_success() => Ok(Some(resp.json().await?)),
            // Privacy-restricted or deleted entities.
            StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                debug!(path, status = resp.status().as_u16(), "Entity not visible");
                Ok(None)
            },
            StatusCode::UNAUTHORIZED => Err(LookupError::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => Err(LookupError::RateLimited),
            other => Err(LookupError::Status(other.as_u16())),
        }
    }

    /// Discover the gateway URL, falling back to [`DEFAULT_GATEWAY_URL`].
    pub async fn gateway_url(&self) -> String {
        match self.get_json::<GatewayResponse>("/gateway").await {
            Ok(Some(body)) => body.url,
            Ok(None) => DEFAULT_GATEWAY_URL.to_owned(),
            Err(e) => {
                warn!(error = %e, "Gateway discovery failed, using default URL");
                DEFAULT_GATEWAY_URL.to_owned()
            },
        }
    }
}

#[async_trait]
impl MetadataSource for DiscordRest {
    async fn channel(&self, channel_id: &str) -> Result<Option<ChannelInfo>, LookupError> {
        let channel: Option<ChannelResponse> =
            self.get_json(&format!("/channels/{channel_id}")).await?;
        Ok(channel.map(|c| ChannelInfo {
            name: c.name.unwrap_or_else(|| channel_id.to_owned()),
            guild_id: c.guild_id,
        }))
    }

    async fn guild(&self, guild_id: &str) -> Result<Option<GuildInfo>, LookupError> {
        let guild: Option<GuildResponse> = self.get_json(&format!("/guilds/{guild_id}")).await?;
        Ok(guild.map(|g| GuildInfo { name: g.name }))
    }

    async fn user(&self, user_id: &str) -> Result<Option<UserInfo>, LookupError> {
        let user: Option<UserResponse> = self.get_json(&format!("/users/{user_id}")).await?;
        Ok(user.map(UserInfo::from))
    }

    async fn member(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<Option<MemberInfo>, LookupError> {
        let member: Option<MemberResponse> = self
            .get_json(&format!("/guilds/{guild_id}/members/{user_id}"))
            .await?;
        Ok(member.map(|m| MemberInfo {
            nick: m.nick,
            user: m.user.map(UserInfo::from),
        }))
    }
}
