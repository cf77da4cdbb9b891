//! Gateway v10 wire format.
//!
//! Only what the tracker reads is typed. Dispatch bodies for events it
//! does not route stay as raw `serde_json::Value`.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Gateway opcodes the tracker sends or handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Opcode {
    Dispatch = 0,
    Heartbeat = 1,
    Identify = 2,
    Resume = 6,
    Reconnect = 7,
    InvalidSession = 9,
    Hello = 10,
    HeartbeatAck = 11,
}

impl Opcode {
    pub(crate) fn from_u8(op: u8) -> Option<Self> {
        Some(match op {
            0 => Self::Dispatch,
            1 => Self::Heartbeat,
            2 => Self::Identify,
            6 => Self::Resume,
            7 => Self::Reconnect,
            9 => Self::InvalidSession,
            10 => Self::Hello,
            11 => Self::HeartbeatAck,
            _ => return None,
        })
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> Self {
        op as u8
    }
}

/// Close codes with special handling.
pub mod close_code {
    /// Clean close.
    pub const NORMAL: u16 = 1000;
    /// Peer going away.
    pub const GOING_AWAY: u16 = 1001;
    /// Close frame without a status code.
    pub const NO_STATUS: u16 = 1005;
    /// No close frame: network loss, dead socket, missed ACK.
    pub const ABNORMAL: u16 = 1006;
    /// Sent by us on op 7 so the session stays resumable.
    pub const RECONNECT_REQUESTED: u16 = 4000;
    /// Token rejected.
    pub const AUTHENTICATION_FAILED: u16 = 4004;
    /// Bad shard in Identify.
    pub const INVALID_SHARD: u16 = 4010;
    /// Intents bitmask not understood.
    pub const INVALID_INTENTS: u16 = 4013;
    /// Intents not granted to this account.
    pub const DISALLOWED_INTENTS: u16 = 4014;

    /// Codes after which reconnecting can never succeed.
    #[must_use]
    pub fn is_fatal(code: u16) -> bool {
        matches!(
            code,
            AUTHENTICATION_FAILED | INVALID_SHARD | INVALID_INTENTS | DISALLOWED_INTENTS
        )
    }
}

/// `GUILD_VOICE_STATES`.
pub const VOICE_STATES_INTENT: u32 = 1 << 7;

/// Dispatch names routed by the tracker.
pub(crate) mod event {
    pub(crate) const READY: &str = "READY";
    pub(crate) const RESUMED: &str = "RESUMED";
    pub(crate) const VOICE_STATE_UPDATE: &str = "VOICE_STATE_UPDATE";
}

/// One frame on the socket, either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: Option<Value>,
    /// Dispatch sequence; `None` for every other opcode.
    #[serde(default)]
    pub s: Option<u64>,
    /// Dispatch event name.
    #[serde(default)]
    pub t: Option<String>,
}

impl GatewayPayload {
    fn outgoing(op: Opcode, d: Option<Value>) -> Self {
        Self {
            op: op.into(),
            d,
            s: None,
            t: None,
        }
    }

    /// Decoded opcode, `None` if unknown.
    pub(crate) fn opcode(&self) -> Option<Opcode> {
        Opcode::from_u8(self.op)
    }

    /// op 2 with the client properties and the requested intents.
    pub(crate) fn identify(token: &str, intents: u32) -> Self {
        Self::outgoing(
            Opcode::Identify,
            Some(json!({
                "token": token,
                "intents": intents,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "voxwatch",
                    "device": "voxwatch",
                },
            })),
        )
    }

    /// op 6.
    pub(crate) fn resume(token: &str, session_id: &str, seq: u64) -> Self {
        Self::outgoing(
            Opcode::Resume,
            Some(json!({
                "token": token,
                "session_id": session_id,
                "seq": seq,
            })),
        )
    }

    /// op 1. `d` is the last sequence, or null before the first dispatch.
    pub(crate) fn heartbeat(seq: Option<u64>) -> Self {
        Self::outgoing(Opcode::Heartbeat, Some(seq.map_or(Value::Null, Value::from)))
    }
}

/// op 10 body.
#[derive(Debug, Deserialize)]
pub(crate) struct Hello {
    /// Milliseconds between heartbeats.
    pub heartbeat_interval: u64,
}

/// `READY` body.
#[derive(Debug, Deserialize)]
pub(crate) struct Ready {
    pub session_id: String,
    #[serde(default)]
    pub resume_gateway_url: Option<String>,
    #[serde(default)]
    pub user: Option<CurrentUser>,
}

/// The account this session belongs to.
#[derive(Debug, Deserialize)]
pub(crate) struct CurrentUser {
    pub id: String,
}

/// `VOICE_STATE_UPDATE` body.
#[derive(Debug, Deserialize)]
pub(crate) struct VoiceState {
    pub user_id: String,
    /// Null once the user has left voice.
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub member: Option<VoiceMember>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VoiceMember {
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub user: Option<MemberUser>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MemberUser {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub global_name: Option<String>,
}

/// `GET /gateway` response.
#[derive(Debug, Deserialize)]
pub(crate) struct GatewayResponse {
    pub url: String,
}

/// Hosts a `resume_gateway_url` may point at.
const RESUME_HOSTS: &[&str] = &["discord.gg"];

/// Accept a resume URL only if it is `wss://` on a Discord host.
pub(crate) fn is_trusted_resume_url(raw: &str) -> bool {
    let Ok(parsed) = url::Url::parse(raw) else {
        return false;
    };
    if parsed.scheme() != "wss" {
        return false;
    }
    parsed.host_str().is_some_and(|host| {
        RESUME_HOSTS.iter().any(|allowed| {
            host == *allowed
                || host
                    .strip_suffix(allowed)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    })
}

/// Set `v=10&encoding=json` on a gateway base URL, replacing any query.
pub(crate) fn with_gateway_query(base: &str) -> String {
    match url::Url::parse(base) {
        Ok(mut parsed) => {
            parsed
                .query_pairs_mut()
                .clear()
                .append_pair("v", "10")
                .append_pair("encoding", "json");
            parsed.into()
        },
        Err(_) => format!("{}?v=10&encoding=json", base.trim_end_matches('/')),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcodes_round_trip_through_u8() {
        for op in [
            Opcode::Dispatch,
            Opcode::Heartbeat,
            Opcode::Identify,
            Opcode::Resume,
            Opcode::Reconnect,
            Opcode::InvalidSession,
            Opcode::Hello,
            Opcode::HeartbeatAck,
        ] {
            assert_eq!(Opcode::from_u8(u8::from(op)), Some(op));
        }
        assert_eq!(u8::from(Opcode::HeartbeatAck), 11);
        assert_eq!(Opcode::from_u8(3), None);
    }

    #[test]
    fn only_auth_and_intent_codes_are_fatal() {
        for code in [4004, 4010, 4013, 4014] {
            assert!(close_code::is_fatal(code), "{code}");
        }
        for code in [1000, 1001, 1006, 4000, 4009] {
            assert!(!close_code::is_fatal(code), "{code}");
        }
    }

    #[test]
    fn hello_frame_decodes() {
        let frame: GatewayPayload =
            serde_json::from_str(r#"{"op":10,"d":{"heartbeat_interval":41250},"s":null,"t":null}"#)
                .unwrap();
        assert_eq!(frame.opcode(), Some(Opcode::Hello));
        assert!(frame.s.is_none());

        let hello: Hello = serde_json::from_value(frame.d.unwrap()).unwrap();
        assert_eq!(hello.heartbeat_interval, 41_250);
    }

    #[test]
    fn identify_requests_voice_states() {
        let frame = serde_json::to_value(GatewayPayload::identify("my-token", VOICE_STATES_INTENT))
            .unwrap();
        assert_eq!(frame["op"], 2);
        assert_eq!(frame["d"]["token"], "my-token");
        assert_eq!(frame["d"]["intents"], 128);
        assert_eq!(frame["d"]["properties"]["device"], "voxwatch");
    }

    #[test]
    fn resume_carries_session_and_seq() {
        let frame = serde_json::to_value(GatewayPayload::resume("tok", "sess-1", 42)).unwrap();
        assert_eq!(frame["op"], 6);
        assert_eq!(frame["d"]["session_id"], "sess-1");
        assert_eq!(frame["d"]["seq"], 42);
    }

    #[test]
    fn heartbeat_sends_null_before_first_dispatch() {
        let frame = serde_json::to_value(GatewayPayload::heartbeat(Some(7))).unwrap();
        assert_eq!(frame["op"], 1);
        assert_eq!(frame["d"], 7);

        let frame = serde_json::to_value(GatewayPayload::heartbeat(None)).unwrap();
        assert!(frame.as_object().unwrap().contains_key("d"));
        assert!(frame["d"].is_null());
    }

    #[test]
    fn voice_state_with_member() {
        let state: VoiceState = serde_json::from_value(json!({
            "user_id": "42",
            "channel_id": "100",
            "guild_id": "1",
            "session_id": "abc",
            "member": {
                "nick": null,
                "user": { "username": "alice", "global_name": "Alice" },
            },
        }))
        .unwrap();
        assert_eq!(state.channel_id.as_deref(), Some("100"));
        let user = state.member.unwrap().user.unwrap();
        assert_eq!(user.global_name.as_deref(), Some("Alice"));
    }

    #[test]
    fn voice_state_leave() {
        let state: VoiceState =
            serde_json::from_str(r#"{"user_id":"42","channel_id":null}"#).unwrap();
        assert!(state.channel_id.is_none());
        assert!(state.guild_id.is_none());
        assert!(state.member.is_none());
    }

    #[test]
    fn resume_url_trust() {
        assert!(is_trusted_resume_url("wss://gateway-us-east1-b.discord.gg"));
        assert!(is_trusted_resume_url("wss://discord.gg/?v=10"));

        assert!(!is_trusted_resume_url("ws://gateway.discord.gg"));
        assert!(!is_trusted_resume_url("wss://discord.gg.example.com"));
        assert!(!is_trusted_resume_url("wss://notdiscord.gg"));
        assert!(!is_trusted_resume_url("gateway.discord.gg"));
    }

    #[test]
    fn gateway_query_replaces_existing() {
        assert_eq!(
            with_gateway_query("wss://gateway.discord.gg"),
            "wss://gateway.discord.gg/?v=10&encoding=json"
        );
        assert_eq!(
            with_gateway_query("ws://127.0.0.1:9000/?v=9"),
            "ws://127.0.0.1:9000/?v=10&encoding=json"
        );
    }
}
