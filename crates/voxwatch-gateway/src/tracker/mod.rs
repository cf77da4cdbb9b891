//! Gateway connection state machine.
//!
//! [`GatewayTracker`] owns one logical Gateway connection at a time and
//! drives it through
//! `Disconnected → Connecting → AwaitingHello → Identifying/Resuming → Connected`.
//! Voice state dispatches are enriched through the [`MetadataCache`] and
//! handed to the [`PresenceTracker`]; the resulting events, together with
//! every state change and error, go to a single [`EventSink`].
//!
//! # Lifecycle
//!
//! [`spawn`] runs the tracker on its own task and returns a
//! [`TrackerHandle`]. The tracker reconnects on its own according to
//! [`reconnect::decide`]; it returns only on shutdown or a fatal error.
//! Dropping the handle shuts the tracker down.

mod config;
mod session;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::{Stream, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info, trace, warn};
use voxwatch_core::{ConnectionState, EventSink, StatusEvent, TrackerEvent};

pub use self::config::{PLACEHOLDER_TOKEN, TrackerConfig};
use self::session::Session;
use crate::connection::{self, Outbound};
use crate::error::{TrackerError, TrackerResult};
use crate::heartbeat::HeartbeatScheduler;
use crate::metadata::{MetadataCache, NameHint};
use crate::presence::{MembershipUpdate, PresenceTracker};
use crate::protocol::{
    self, GatewayPayload, Hello, Opcode, Ready, VoiceMember, VoiceState, close_code, event,
};
use crate::reconnect::{self, ReconnectDecision};

/// How long the writer may keep flushing after a session ends.
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Outbound frame queue depth per connection.
const OUTBOUND_CAPACITY: usize = 64;

/// Why a single connection ended.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// Shutdown requested.
    Shutdown,
    /// Socket closed (or considered closed) with this code.
    Closed(u16),
}

/// Requests from the handle to the running tracker.
enum Command {
    Close { code: u16, reason: String },
}

/// Per-connection timers polled by the event loop.
struct LoopTimers {
    zombie: oneshot::Receiver<()>,
    zombie_armed: bool,
    reidentify: Option<Pin<Box<Sleep>>>,
}

impl LoopTimers {
    fn new(zombie: oneshot::Receiver<()>) -> Self {
        Self {
            zombie,
            zombie_armed: true,
            reidentify: None,
        }
    }
}

// ── Handle ───────────────────────────────────────────────────

/// Control surface for a tracker.
pub struct TrackerHandle {
    shutdown_tx: broadcast::Sender<()>,
    command_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    join: Option<JoinHandle<TrackerResult<()>>>,
}

impl TrackerHandle {
    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch connection state changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Close the current socket with `code`. The tracker then reconnects
    /// as it would after a server-initiated close.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Shutdown`] if the tracker is no longer running.
    pub async fn close(&self, code: u16, reason: impl Into<String>) -> TrackerResult<()> {
        self.command_tx
            .send(Command::Close {
                code,
                reason: reason.into(),
            })
            .await
            .map_err(|_| TrackerError::Shutdown)
    }

    /// Wait for the tracker task to finish on its own.
    ///
    /// Cancel-safe. Returns `Ok(())` immediately once the result has been
    /// collected.
    ///
    /// # Errors
    ///
    /// Returns the fatal error that ended the tracker.
    pub async fn finished(&mut self) -> TrackerResult<()> {
        let Some(join) = self.join.as_mut() else {
            return Ok(());
        };
        let result = join.await;
        self.join = None;
        result.map_err(|e| TrackerError::Protocol(format!("tracker task failed: {e}")))?
    }

    /// Stop the tracker from any state and wait until it has stopped.
    ///
    /// Cancels the heartbeat and any pending reconnect, closes the socket,
    /// and leaves the tracker `Disconnected`. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns the fatal error if the tracker had already failed.
    pub async fn stop(&mut self) -> TrackerResult<()> {
        // No receiver means the tracker is already gone.
        let _ = self.shutdown_tx.send(());
        self.finished().await
    }
}

/// Spawn a tracker on the current runtime.
///
/// # Errors
///
/// Returns [`TrackerError::Config`] if `config` is invalid.
pub fn spawn(
    config: TrackerConfig,
    metadata: Arc<MetadataCache>,
    sink: Arc<dyn EventSink>,
) -> TrackerResult<TrackerHandle> {
    let (mut tracker, mut handle) = GatewayTracker::new(config, metadata, sink)?;
    handle.join = Some(tokio::spawn(async move { tracker.run().await }));
    Ok(handle)
}

// ── Tracker ──────────────────────────────────────────────────

/// Gateway connection plus presence bookkeeping for one watch set.
pub struct GatewayTracker {
    config: TrackerConfig,
    session: Session,
    /// Consecutive reconnect attempts since the last READY/RESUMED.
    attempt: u32,
    presence: PresenceTracker,
    metadata: Arc<MetadataCache>,
    sink: Arc<dyn EventSink>,
    heartbeat: HeartbeatScheduler,
    sequence_tx: watch::Sender<Option<u64>>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_rx: broadcast::Receiver<()>,
    commands: mpsc::Receiver<Command>,
}

impl GatewayTracker {
    /// Create a tracker and its handle. Does not connect yet.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Config`] if `config` is invalid.
    pub fn new(
        config: TrackerConfig,
        metadata: Arc<MetadataCache>,
        sink: Arc<dyn EventSink>,
    ) -> TrackerResult<(Self, TrackerHandle)> {
        config.validate()?;

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (command_tx, commands) = mpsc::channel(8);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (sequence_tx, _) = watch::channel(None);
        let presence = PresenceTracker::new(config.watch.clone(), config.self_user_id.clone());

        let tracker = Self {
            config,
            session: Session::default(),
            attempt: 0,
            presence,
            metadata,
            sink,
            heartbeat: HeartbeatScheduler::new(),
            sequence_tx,
            state_tx,
            shutdown_rx,
            commands,
        };
        let handle = TrackerHandle {
            shutdown_tx,
            command_tx,
            state_rx,
            join: None,
        };
        Ok((tracker, handle))
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Presence bookkeeping.
    #[must_use]
    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Run until shutdown or a fatal error.
    ///
    /// # Errors
    ///
    /// Returns the fatal [`TrackerError`] that stopped the tracker: a fatal
    /// close code, or [`TrackerError::ReconnectExhausted`].
    pub async fn run(&mut self) -> TrackerResult<()> {
        let result = self.run_loop().await;

        self.heartbeat.stop().await;
        self.attempt = 0;
        self.set_state(ConnectionState::Disconnected, None);

        match result {
            Err(TrackerError::Shutdown) => {
                info!("Tracker stopped");
                Ok(())
            },
            other => other,
        }
    }

    async fn run_loop(&mut self) -> TrackerResult<()> {
        loop {
            let end = self.connect_and_run().await;
            self.heartbeat.stop().await;

            let code = match end {
                Ok(SessionEnd::Shutdown) | Err(TrackerError::Shutdown) => {
                    return Err(TrackerError::Shutdown);
                },
                Ok(SessionEnd::Closed(code)) | Err(TrackerError::Closed(code)) => code,
                Err(e) if e.is_fatal() => {
                    self.report_error(&e, true);
                    return Err(e);
                },
                Err(e) => {
                    // Connect and handshake failures count as abnormal closes.
                    self.report_error(&e, false);
                    close_code::ABNORMAL
                },
            };

            let delay = self.plan_reconnect(code)?;
            self.sleep_or_shutdown(delay).await?;
        }
    }

    /// Apply the reconnect policy to a close and return the delay.
    fn plan_reconnect(&mut self, code: u16) -> TrackerResult<Duration> {
        if close_code::is_fatal(code) {
            let err = TrackerError::from_fatal_close(code);
            self.clear_session();
            self.report_error(&err, true);
            return Err(err);
        }

        match reconnect::decide(code, self.attempt) {
            ReconnectDecision::Retry {
                delay,
                next_attempt,
            } => {
                self.attempt = next_attempt;
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                info!(
                    code,
                    attempt = next_attempt,
                    delay_ms,
                    resume = self.session.can_resume(),
                    "Reconnecting after close"
                );
                self.set_state(
                    ConnectionState::Reconnecting {
                        attempt: next_attempt,
                        delay_ms,
                    },
                    Some(format!("closed with code {code}")),
                );
                Ok(delay)
            },
            ReconnectDecision::GiveUp => {
                let err = TrackerError::ReconnectExhausted {
                    code,
                    attempts: self.attempt,
                };
                self.clear_session();
                self.report_error(&err, true);
                Err(err)
            },
        }
    }

    /// Single connection attempt: connect, handshake, run event loop.
    async fn connect_and_run(&mut self) -> TrackerResult<SessionEnd> {
        let resume = self.session.can_resume();
        let url = protocol::with_gateway_query(self.connect_base_url(resume));
        info!(url = %url, resume, "Connecting to Gateway");
        self.set_state(ConnectionState::Connecting, None);

        let (writer, mut reader) = tokio::select! {
            biased;
            _ = self.shutdown_rx.recv() => return Ok(SessionEnd::Shutdown),
            conn = connection::connect(&url) => conn?,
        };
        self.set_state(ConnectionState::AwaitingHello, None);

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let mut writer_handle = connection::spawn_writer(writer, outbound_rx);

        let end = self.drive(&mut reader, &outbound_tx, resume).await;

        // The heartbeat holds a sender; stop it so the writer sees EOF.
        self.heartbeat.stop().await;
        drop(outbound_tx);
        tokio::select! {
            _ = &mut writer_handle => {},
            () = tokio::time::sleep(WRITER_FLUSH_TIMEOUT) => {
                writer_handle.abort();
            },
        }

        end
    }

    fn connect_base_url(&self, resume: bool) -> &str {
        match &self.session.resume_url {
            Some(url) if resume => url,
            _ => &self.config.gateway_url,
        }
    }

    /// Wait for Hello, start heartbeating, authenticate, then process events.
    async fn drive<R>(
        &mut self,
        reader: &mut R,
        outbound: &mpsc::Sender<Outbound>,
        resume: bool,
    ) -> TrackerResult<SessionEnd>
    where
        R: Stream<Item = Result<Message, WsError>> + Unpin,
    {
        let hello_timeout = self.config.hello_timeout;
        let hello = tokio::select! {
            biased;
            _ = self.shutdown_rx.recv() => return Ok(SessionEnd::Shutdown),
            hello = wait_for_hello(reader, hello_timeout) => hello?,
        };

        let zombie = self.start_heartbeat(&hello, outbound);
        self.authenticate(outbound, resume).await?;
        self.event_loop(reader, outbound, LoopTimers::new(zombie))
            .await
    }

    fn start_heartbeat(
        &mut self,
        hello: &Hello,
        outbound: &mpsc::Sender<Outbound>,
    ) -> oneshot::Receiver<()> {
        let interval = Duration::from_millis(hello.heartbeat_interval);
        self.heartbeat.start(
            interval,
            self.sequence_tx.subscribe(),
            outbound.clone(),
            self.config.zombie_detection,
        )
    }

    /// Send Resume if requested and possible, Identify otherwise.
    async fn authenticate(
        &mut self,
        outbound: &mpsc::Sender<Outbound>,
        resume: bool,
    ) -> TrackerResult<()> {
        let (payload, state) = match (&self.session.session_id, self.session.sequence) {
            (Some(session_id), Some(seq)) if resume => {
                info!(session_id = %session_id, seq, "Resuming session");
                (
                    GatewayPayload::resume(&self.config.token, session_id, seq),
                    ConnectionState::Resuming,
                )
            },
            _ => {
                info!(intents = self.config.intents, "Identifying");
                (
                    GatewayPayload::identify(&self.config.token, self.config.intents),
                    ConnectionState::Identifying,
                )
            },
        };
        send_payload(outbound, payload).await?;
        self.set_state(state, None);
        Ok(())
    }

    /// Main event loop: reads frames in order and reacts to timers.
    async fn event_loop<R>(
        &mut self,
        reader: &mut R,
        outbound: &mpsc::Sender<Outbound>,
        mut timers: LoopTimers,
    ) -> TrackerResult<SessionEnd>
    where
        R: Stream<Item = Result<Message, WsError>> + Unpin,
    {
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.recv() => {
                    info!("Tracker received shutdown signal");
                    let _ = outbound.try_send(Outbound::Close {
                        code: close_code::NORMAL,
                        reason: "shutdown".into(),
                    });
                    return Ok(SessionEnd::Shutdown);
                }

                signal = &mut timers.zombie, if timers.zombie_armed => {
                    timers.zombie_armed = false;
                    if signal.is_ok() {
                        warn!("Zombie connection detected, reconnecting");
                        let _ = outbound.try_send(Outbound::Close {
                            code: close_code::RECONNECT_REQUESTED,
                            reason: "heartbeat ack missed".into(),
                        });
                        return Ok(SessionEnd::Closed(close_code::ABNORMAL));
                    }
                }

                Some(command) = self.commands.recv() => {
                    let Command::Close { code, reason } = command;
                    info!(code, reason = %reason, "Closing connection on request");
                    let _ = outbound.send(Outbound::Close { code, reason }).await;
                    return Ok(SessionEnd::Closed(code));
                }

                () = async {
                    if let Some(timer) = timers.reidentify.as_mut() {
                        timer.await;
                    }
                }, if timers.reidentify.is_some() => {
                    timers.reidentify = None;
                    info!("Re-identifying after invalid session");
                    send_payload(
                        outbound,
                        GatewayPayload::identify(&self.config.token, self.config.intents),
                    )
                    .await?;
                    self.set_state(ConnectionState::Identifying, Some("invalid session".into()));
                }

                frame = reader.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            let payload: GatewayPayload = match serde_json::from_str(&text) {
                                Ok(p) => p,
                                Err(e) => {
                                    warn!(error = %e, "Dropping malformed Gateway payload");
                                    continue;
                                },
                            };
                            if let Some(end) = self
                                .handle_payload(payload, outbound, &mut timers)
                                .await?
                            {
                                return Ok(end);
                            }
                        },
                        Some(Ok(Message::Close(frame))) => {
                            let code = frame
                                .as_ref()
                                .map_or(close_code::NO_STATUS, |f| f.code.into());
                            info!(code, "Gateway closed the connection");
                            return Ok(SessionEnd::Closed(code));
                        },
                        Some(Ok(_)) => {},
                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket read error");
                            return Ok(SessionEnd::Closed(close_code::ABNORMAL));
                        },
                        None => {
                            warn!("WebSocket stream ended");
                            return Ok(SessionEnd::Closed(close_code::ABNORMAL));
                        },
                    }
                }
            }
        }
    }

    /// Handle a single Gateway payload.
    ///
    /// Returns `Some(SessionEnd)` if the connection should end.
    async fn handle_payload(
        &mut self,
        payload: GatewayPayload,
        outbound: &mpsc::Sender<Outbound>,
        timers: &mut LoopTimers,
    ) -> TrackerResult<Option<SessionEnd>> {
        match payload.opcode() {
            Some(Opcode::Dispatch) => {
                self.handle_dispatch(payload);
                Ok(None)
            },
            Some(Opcode::Heartbeat) => {
                let seq = self.session.sequence;
                debug!(seq = ?seq, "Gateway requested an immediate heartbeat");
                send_payload(outbound, GatewayPayload::heartbeat(seq)).await?;
                Ok(None)
            },
            Some(Opcode::HeartbeatAck) => {
                self.heartbeat.ack_received();
                Ok(None)
            },
            Some(Opcode::Reconnect) => {
                info!("Server requested reconnect (op=7)");
                let code = close_code::RECONNECT_REQUESTED;
                let _ = outbound
                    .send(Outbound::Close {
                        code,
                        reason: "reconnect requested".into(),
                    })
                    .await;
                Ok(Some(SessionEnd::Closed(code)))
            },
            Some(Opcode::InvalidSession) => {
                let delay = self.config.invalid_session_delay;
                info!(
                    delay_ms = delay.as_millis(),
                    "Invalid session, clearing session and re-identifying"
                );
                self.clear_session();
                timers.reidentify = Some(Box::pin(tokio::time::sleep(delay)));
                Ok(None)
            },
            Some(Opcode::Hello) => {
                match parse_hello(payload.d) {
                    Ok(hello) => {
                        debug!(
                            interval_ms = hello.heartbeat_interval,
                            "Hello mid-session, restarting heartbeat"
                        );
                        timers.zombie = self.start_heartbeat(&hello, outbound);
                        timers.zombie_armed = true;
                    },
                    Err(e) => warn!(error = %e, "Dropping malformed Hello"),
                }
                Ok(None)
            },
            _ => {
                debug!(op = payload.op, "Unhandled Gateway opcode");
                Ok(None)
            },
        }
    }

    /// Handle a dispatch event (op=0).
    fn handle_dispatch(&mut self, payload: GatewayPayload) {
        if let Some(seq) = payload.s {
            self.session.sequence = Some(seq);
            self.sequence_tx.send_replace(Some(seq));
        }

        let Some(name) = payload.t.as_deref() else {
            trace!("Dispatch without event name");
            return;
        };

        match name {
            event::READY => self.handle_ready(payload.d),
            event::RESUMED => {
                info!("Gateway session resumed");
                self.attempt = 0;
                self.set_state(ConnectionState::Connected, Some("resumed".into()));
            },
            event::VOICE_STATE_UPDATE => {
                let Some(data) = payload.d else {
                    warn!("VOICE_STATE_UPDATE without data");
                    return;
                };
                match serde_json::from_value::<VoiceState>(data) {
                    Ok(voice_state) => self.handle_voice_state(voice_state),
                    Err(e) => warn!(error = %e, "Dropping malformed VOICE_STATE_UPDATE"),
                }
            },
            other => trace!(event = other, "Ignoring Gateway dispatch"),
        }
    }

    /// Handle the `READY` dispatch event.
    fn handle_ready(&mut self, data: Option<serde_json::Value>) {
        let ready = match data.map(serde_json::from_value::<Ready>) {
            Some(Ok(ready)) => ready,
            Some(Err(e)) => {
                warn!(error = %e, "Dropping malformed READY");
                return;
            },
            None => {
                warn!("READY without data");
                return;
            },
        };

        info!(session_id = %ready.session_id, "Gateway session established (READY)");
        self.session.session_id = Some(ready.session_id);
        self.session.resume_url = match ready.resume_gateway_url {
            Some(url) if protocol::is_trusted_resume_url(&url) => Some(url),
            Some(url) => {
                warn!(url = %url, "READY contained invalid resume URL, ignoring");
                None
            },
            None => None,
        };

        if let Some(user) = ready.user
            && !self.presence.has_self_user()
        {
            debug!(user_id = %user.id, "Learned own user id from READY");
            self.presence.set_self_user_id(user.id);
        }

        self.attempt = 0;
        self.set_state(ConnectionState::Connected, Some("ready".into()));
    }

    /// Enrich a voice state and feed it to the presence tracker.
    fn handle_voice_state(&mut self, voice_state: VoiceState) {
        if self.presence.is_self(&voice_state.user_id) {
            trace!("Ignoring own voice state");
            return;
        }

        let previous = self
            .presence
            .current_channel(&voice_state.user_id)
            .map(str::to_owned);
        let next = voice_state.channel_id.as_deref();

        // Names are only needed when a watched channel is involved. Misses
        // fall back at once and are looked up in the background.
        let (guild_name, user_name) = if self.presence.involves_watched(previous.as_deref(), next)
        {
            let guild_id = voice_state.guild_id.clone().or_else(|| {
                next.or(previous.as_deref())
                    .and_then(|c| self.metadata.guild_for_channel(c))
            });
            let hint = voice_state
                .member
                .as_ref()
                .map(member_hint)
                .unwrap_or_default();
            let guild_name = self.metadata.guild_name_now(guild_id.as_deref());
            let user_name =
                self.metadata
                    .display_name(&voice_state.user_id, guild_id.as_deref(), &hint);
            (guild_name, user_name)
        } else {
            (String::new(), String::new())
        };

        let update = MembershipUpdate {
            user_id: voice_state.user_id,
            channel_id: voice_state.channel_id,
            guild_id: voice_state.guild_id,
            guild_name,
            user_name,
        };
        let metadata = &self.metadata;
        let events = self.presence.on_membership_update(
            &update,
            Utc::now().timestamp_millis(),
            |id| metadata.channel_name_now(id),
        );

        for event in events {
            info!(
                kind = %event.kind,
                user = %event.user_name,
                channel = %event.channel_name,
                stay_ms = ?event.stay_duration_ms,
                "Presence transition"
            );
            self.sink.deliver(&TrackerEvent::Presence(event));
        }
    }

    fn clear_session(&mut self) {
        self.session.clear();
        self.sequence_tx.send_replace(None);
    }

    /// Publish a state change.
    fn set_state(&self, state: ConnectionState, detail: Option<String>) {
        self.state_tx.send_replace(state);
        info!(state = %state, detail = detail.as_deref().unwrap_or(""), "Connection state changed");
        self.sink
            .deliver(&TrackerEvent::Status(StatusEvent::StateChanged { state, detail }));
    }

    /// Publish an error status.
    fn report_error(&self, err: &TrackerError, fatal: bool) {
        if fatal {
            error!(error = %err, "Fatal Gateway error");
        } else {
            warn!(error = %err, "Gateway connection error");
        }
        self.sink.deliver(&TrackerEvent::Status(StatusEvent::Error {
            message: err.to_string(),
            fatal,
        }));
    }

    /// Sleep for a duration, or return early on shutdown.
    async fn sleep_or_shutdown(&mut self, duration: Duration) -> TrackerResult<()> {
        tokio::select! {
            biased;
            _ = self.shutdown_rx.recv() => Err(TrackerError::Shutdown),
            () = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

fn member_hint(member: &VoiceMember) -> NameHint {
    let (global_name, username) = member
        .user
        .as_ref()
        .map_or((None, None), |u| (u.global_name.clone(), u.username.clone()));
    NameHint {
        nick: member.nick.clone(),
        global_name,
        username,
    }
}

async fn send_payload(
    outbound: &mpsc::Sender<Outbound>,
    payload: GatewayPayload,
) -> TrackerResult<()> {
    outbound
        .send(Outbound::Payload(payload))
        .await
        .map_err(|_| TrackerError::Protocol("writer channel closed".into()))
}

/// Wait for the Hello payload after connecting.
async fn wait_for_hello<R>(reader: &mut R, timeout: Duration) -> TrackerResult<Hello>
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let hello = async {
        loop {
            match reader.next().await {
                Some(Ok(Message::Text(text))) => {
                    let payload: GatewayPayload = match serde_json::from_str(&text) {
                        Ok(p) => p,
                        Err(e) => {
                            warn!(error = %e, "Dropping malformed payload before Hello");
                            continue;
                        },
                    };
                    if payload.opcode() == Some(Opcode::Hello) {
                        return parse_hello(payload.d);
                    }
                    debug!(op = payload.op, "Ignoring payload before Hello");
                },
                Some(Ok(Message::Close(frame))) => {
                    let code = frame
                        .as_ref()
                        .map_or(close_code::NO_STATUS, |f| f.code.into());
                    return Err(TrackerError::Closed(code));
                },
                Some(Ok(_)) => {},
                Some(Err(e)) => return Err(TrackerError::from(e)),
                None => {
                    return Err(TrackerError::Protocol(
                        "connection closed before Hello".into(),
                    ));
                },
            }
        }
    };

    tokio::time::timeout(timeout, hello)
        .await
        .map_err(|_| TrackerError::HelloTimeout)?
}

fn parse_hello(data: Option<serde_json::Value>) -> TrackerResult<Hello> {
    let data = data.ok_or_else(|| TrackerError::Protocol("Hello missing data".into()))?;
    let hello: Hello = serde_json::from_value(data)?;
    if hello.heartbeat_interval == 0 {
        return Err(TrackerError::Protocol(
            "Hello with zero heartbeat interval".into(),
        ));
    }
    Ok(hello)
}

#[cfg(test)]
mod tests {
    use futures::channel::mpsc::{UnboundedSender, unbounded};
    use serde_json::json;
    use tokio::time::Instant;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use voxwatch_core::{ChannelSink, NormalizedEvent, PresenceKind};

    use super::*;
    use crate::metadata::tests::StubSource;
    use crate::rest::DEFAULT_GATEWAY_URL;

    type Frames = futures::channel::mpsc::UnboundedReceiver<Result<Message, WsError>>;

    // ── Helpers ──────────────────────────────────────────────

    fn test_config() -> TrackerConfig {
        TrackerConfig {
            token: "test-token".into(),
            watch: ["100", "200"].into_iter().collect(),
            self_user_id: Some("self".into()),
            ..TrackerConfig::default()
        }
    }

    fn test_tracker(
        config: TrackerConfig,
    ) -> (
        GatewayTracker,
        TrackerHandle,
        mpsc::UnboundedReceiver<TrackerEvent>,
    ) {
        let source = StubSource::default()
            .with_channel("100", "general", "1")
            .with_channel("200", "music", "1")
            .with_guild("1", "Test Guild");
        tracker_with_source(config, source)
    }

    fn tracker_with_source(
        config: TrackerConfig,
        source: StubSource,
    ) -> (
        GatewayTracker,
        TrackerHandle,
        mpsc::UnboundedReceiver<TrackerEvent>,
    ) {
        let metadata = Arc::new(MetadataCache::new(
            Arc::new(source),
            Duration::from_secs(1),
        ));
        let (sink, events) = ChannelSink::new();
        let (tracker, handle) = GatewayTracker::new(config, metadata, Arc::new(sink)).unwrap();
        (tracker, handle, events)
    }

    fn frames() -> (UnboundedSender<Result<Message, WsError>>, Frames) {
        unbounded()
    }

    fn text(value: serde_json::Value) -> Result<Message, WsError> {
        Ok(Message::Text(value.to_string().into()))
    }

    fn dispatch(name: &str, seq: u64, data: serde_json::Value) -> Result<Message, WsError> {
        text(json!({ "op": 0, "t": name, "s": seq, "d": data }))
    }

    fn voice_state(user: &str, channel: Option<&str>) -> serde_json::Value {
        json!({
            "user_id": user,
            "channel_id": channel,
            "guild_id": "1",
            "member": { "nick": "Ali", "user": { "username": "ali" } },
        })
    }

    /// Timers with a zombie signal that never fires while the sender lives.
    fn idle_timers() -> (oneshot::Sender<()>, LoopTimers) {
        let (tx, rx) = oneshot::channel();
        (tx, LoopTimers::new(rx))
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<TrackerEvent>) -> Vec<TrackerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    fn presence_events(events: &[TrackerEvent]) -> Vec<NormalizedEvent> {
        events
            .iter()
            .filter_map(|e| match e {
                TrackerEvent::Presence(p) => Some(p.clone()),
                TrackerEvent::Status(_) => None,
            })
            .collect()
    }

    fn sent_op(frame: &Outbound) -> Option<Opcode> {
        match frame {
            Outbound::Payload(p) => p.opcode(),
            Outbound::Close { .. } => None,
        }
    }

    // ── Invalid Session Tests ───────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn invalid_session_sends_single_identify_after_delay() {
        let (mut tracker, _handle, _events) = test_tracker(test_config());
        tracker.session = Session {
            sequence: Some(42),
            session_id: Some("old-session".into()),
            resume_url: None,
        };

        let (frames_tx, mut frames) = frames();
        frames_tx
            .unbounded_send(text(json!({ "op": 9, "d": false })))
            .unwrap();
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let (_zombie_tx, timers) = idle_timers();
        let start = Instant::now();

        let (first, elapsed) = tokio::select! {
            _ = tracker.event_loop(&mut frames, &out_tx, timers) => panic!("event loop ended early"),
            observed = async {
                let first = out_rx.recv().await.unwrap();
                let elapsed = start.elapsed();
                // Nothing else may follow.
                tokio::time::sleep(Duration::from_secs(30)).await;
                (first, elapsed)
            } => observed,
        };

        assert_eq!(sent_op(&first), Some(Opcode::Identify));
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_secs(6));
        assert!(out_rx.try_recv().is_err());
        assert_eq!(tracker.session, Session::default());
        assert!(!tracker.session.can_resume());
    }

    // ── Opcode Tests ────────────────────────────────────────

    #[tokio::test]
    async fn reconnect_request_closes_with_resumable_code() {
        let (mut tracker, _handle, _events) = test_tracker(test_config());
        tracker.session.session_id = Some("sess".into());
        tracker.session.sequence = Some(5);

        let (frames_tx, mut frames) = frames();
        frames_tx.unbounded_send(text(json!({ "op": 7 }))).unwrap();
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let (_zombie_tx, timers) = idle_timers();

        let end = tracker
            .event_loop(&mut frames, &out_tx, timers)
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::Closed(close_code::RECONNECT_REQUESTED));
        assert!(matches!(
            out_rx.recv().await.unwrap(),
            Outbound::Close { code: 4000, .. }
        ));
        assert!(tracker.session.can_resume());
    }

    #[tokio::test]
    async fn server_heartbeat_request_is_answered_immediately() {
        let (mut tracker, _handle, _events) = test_tracker(test_config());
        tracker.session.sequence = Some(9);

        let (frames_tx, mut frames) = frames();
        frames_tx.unbounded_send(text(json!({ "op": 1 }))).unwrap();
        drop(frames_tx);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let (_zombie_tx, timers) = idle_timers();

        tracker
            .event_loop(&mut frames, &out_tx, timers)
            .await
            .unwrap();
        let Outbound::Payload(beat) = out_rx.recv().await.unwrap() else {
            panic!("expected heartbeat");
        };
        assert_eq!(beat.opcode(), Some(Opcode::Heartbeat));
        assert_eq!(beat.d, Some(json!(9)));
    }

    #[tokio::test]
    async fn close_frame_and_stream_end_map_to_codes() {
        let (mut tracker, _handle, _events) = test_tracker(test_config());
        let (out_tx, _out_rx) = mpsc::channel(16);

        let (frames_tx, mut frames) = frames();
        frames_tx
            .unbounded_send(Ok(Message::Close(Some(CloseFrame {
                code: 4009.into(),
                reason: "timeout".into(),
            }))))
            .unwrap();
        let (_zombie_tx, timers) = idle_timers();
        let end = tracker.event_loop(&mut frames, &out_tx, timers).await;
        assert_eq!(end.unwrap(), SessionEnd::Closed(4009));

        drop(frames_tx);
        let (_zombie_tx, timers) = idle_timers();
        let end = tracker.event_loop(&mut frames, &out_tx, timers).await;
        assert_eq!(end.unwrap(), SessionEnd::Closed(close_code::ABNORMAL));
    }

    #[tokio::test]
    async fn zombie_signal_ends_session_as_abnormal() {
        let (mut tracker, _handle, _events) = test_tracker(test_config());
        let (_frames_tx, mut frames) = frames();
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let (zombie_tx, timers) = idle_timers();
        zombie_tx.send(()).unwrap();

        let end = tracker
            .event_loop(&mut frames, &out_tx, timers)
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::Closed(close_code::ABNORMAL));
        assert!(matches!(
            out_rx.recv().await.unwrap(),
            Outbound::Close { code: 4000, .. }
        ));
    }

    #[tokio::test]
    async fn handle_close_command_closes_socket() {
        let (mut tracker, handle, _events) = test_tracker(test_config());
        let (_frames_tx, mut frames) = frames();
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let (_zombie_tx, timers) = idle_timers();

        handle.close(4001, "manual").await.unwrap();
        let end = tracker
            .event_loop(&mut frames, &out_tx, timers)
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::Closed(4001));
        assert!(matches!(
            out_rx.recv().await.unwrap(),
            Outbound::Close { code: 4001, .. }
        ));
    }

    #[tokio::test]
    async fn shutdown_ends_event_loop() {
        let (mut tracker, handle, _events) = test_tracker(test_config());
        let (_frames_tx, mut frames) = frames();
        let (out_tx, _out_rx) = mpsc::channel(16);
        let (_zombie_tx, timers) = idle_timers();

        handle.shutdown_tx.send(()).unwrap();
        let end = tracker
            .event_loop(&mut frames, &out_tx, timers)
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::Shutdown);
    }

    // ── Dispatch Tests ──────────────────────────────────────

    #[tokio::test]
    async fn live_session_resumes_then_resumed_connects() {
        let (mut tracker, handle, mut events) = test_tracker(test_config());
        tracker.session.session_id = Some("sess".into());
        tracker.session.sequence = Some(7);
        assert!(tracker.session.can_resume());

        let (frames_tx, mut frames) = frames();
        frames_tx
            .unbounded_send(text(json!({ "op": 10, "d": { "heartbeat_interval": 45000 } })))
            .unwrap();
        frames_tx
            .unbounded_send(dispatch("RESUMED", 8, json!(null)))
            .unwrap();
        drop(frames_tx);
        let (out_tx, mut out_rx) = mpsc::channel(16);

        let end = tracker.drive(&mut frames, &out_tx, true).await.unwrap();
        tracker.heartbeat.stop().await;
        assert!(matches!(end, SessionEnd::Closed(close_code::ABNORMAL)));

        let mut sent = Vec::new();
        while let Ok(frame) = out_rx.try_recv() {
            if let Outbound::Payload(payload) = frame
                && payload.opcode() != Some(Opcode::Heartbeat)
            {
                sent.push(payload);
            }
        }
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].opcode(), Some(Opcode::Resume));
        let body = sent[0].d.as_ref().unwrap();
        assert_eq!(body["token"], "test-token");
        assert_eq!(body["session_id"], "sess");
        assert_eq!(body["seq"], 7);

        let states: Vec<ConnectionState> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                TrackerEvent::Status(StatusEvent::StateChanged { state, .. }) => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![ConnectionState::Resuming, ConnectionState::Connected]
        );
        assert_eq!(handle.state(), ConnectionState::Connected);
        assert_eq!(tracker.session.session_id.as_deref(), Some("sess"));
        assert_eq!(tracker.session.sequence, Some(8));
    }

    #[tokio::test]
    async fn resume_without_sequence_falls_back_to_identify() {
        let (mut tracker, _handle, _events) = test_tracker(test_config());
        tracker.session.session_id = Some("sess".into());
        let (out_tx, mut out_rx) = mpsc::channel(4);

        tracker.authenticate(&out_tx, true).await.unwrap();

        let frame = out_rx.try_recv().unwrap();
        assert_eq!(sent_op(&frame), Some(Opcode::Identify));
        assert_eq!(tracker.state(), ConnectionState::Identifying);
    }

    #[tokio::test]
    async fn ready_establishes_session_and_resets_attempts() {
        let config = TrackerConfig {
            self_user_id: None,
            ..test_config()
        };
        let (mut tracker, handle, mut events) = test_tracker(config);
        tracker.attempt = 3;

        let (frames_tx, mut frames) = frames();
        frames_tx
            .unbounded_send(dispatch(
                "READY",
                1,
                json!({
                    "session_id": "abc",
                    "resume_gateway_url": "wss://gateway-us-east1-b.discord.gg",
                    "user": { "id": "me" },
                }),
            ))
            .unwrap();
        drop(frames_tx);
        let (out_tx, _out_rx) = mpsc::channel(16);
        let (_zombie_tx, timers) = idle_timers();

        tracker
            .event_loop(&mut frames, &out_tx, timers)
            .await
            .unwrap();

        assert_eq!(tracker.session.session_id.as_deref(), Some("abc"));
        assert_eq!(tracker.session.sequence, Some(1));
        assert_eq!(
            tracker.session.resume_url.as_deref(),
            Some("wss://gateway-us-east1-b.discord.gg")
        );
        assert_eq!(tracker.attempt, 0);
        assert!(tracker.presence().is_self("me"));
        assert_eq!(handle.state(), ConnectionState::Connected);
        assert!(drain(&mut events).iter().any(|e| matches!(
            e,
            TrackerEvent::Status(StatusEvent::StateChanged {
                state: ConnectionState::Connected,
                ..
            })
        )));
    }

    #[tokio::test]
    async fn ready_with_foreign_resume_url_is_not_trusted() {
        let (mut tracker, _handle, _events) = test_tracker(test_config());
        tracker.handle_ready(Some(json!({
            "session_id": "abc",
            "resume_gateway_url": "wss://evil.example.com",
        })));
        assert_eq!(tracker.session.session_id.as_deref(), Some("abc"));
        assert!(tracker.session.resume_url.is_none());
        assert_eq!(tracker.connect_base_url(true), DEFAULT_GATEWAY_URL);
    }

    #[tokio::test]
    async fn voice_state_updates_emit_join_then_leave() {
        let (mut tracker, _handle, mut events) = test_tracker(test_config());
        tracker.metadata.prime(["100", "200"]).await;

        let (frames_tx, mut frames) = frames();
        frames_tx
            .unbounded_send(dispatch("VOICE_STATE_UPDATE", 2, voice_state("u1", Some("100"))))
            .unwrap();
        frames_tx
            .unbounded_send(dispatch("VOICE_STATE_UPDATE", 3, voice_state("self", Some("100"))))
            .unwrap();
        frames_tx
            .unbounded_send(dispatch("VOICE_STATE_UPDATE", 4, voice_state("u1", None)))
            .unwrap();
        drop(frames_tx);
        let (out_tx, _out_rx) = mpsc::channel(16);
        let (_zombie_tx, timers) = idle_timers();

        tracker
            .event_loop(&mut frames, &out_tx, timers)
            .await
            .unwrap();

        let presence = presence_events(&drain(&mut events));
        assert_eq!(presence.len(), 2);

        assert_eq!(presence[0].kind, PresenceKind::Join);
        assert_eq!(presence[0].user_name, "Ali");
        assert_eq!(presence[0].channel_name, "general");
        assert_eq!(presence[0].guild_name, "Test Guild");

        assert_eq!(presence[1].kind, PresenceKind::Leave);
        assert_eq!(presence[1].channel_id, "100");
        assert!(presence[1].stay_duration_ms.is_some());

        assert_eq!(tracker.session.sequence, Some(4));
        assert!(tracker.presence().presence("u1").is_none());
        assert!(tracker.presence().presence("self").is_none());
    }

    #[tokio::test]
    async fn watched_move_emits_leave_then_join() {
        let (mut tracker, _handle, mut events) = test_tracker(test_config());
        tracker.metadata.prime(["100", "200"]).await;

        let (frames_tx, mut frames) = frames();
        for (seq, channel) in [(1, "100"), (2, "200")] {
            frames_tx
                .unbounded_send(dispatch("VOICE_STATE_UPDATE", seq, voice_state("u1", Some(channel))))
                .unwrap();
        }
        drop(frames_tx);
        let (out_tx, _out_rx) = mpsc::channel(16);
        let (_zombie_tx, timers) = idle_timers();
        tracker
            .event_loop(&mut frames, &out_tx, timers)
            .await
            .unwrap();

        let kinds: Vec<(PresenceKind, String)> = presence_events(&drain(&mut events))
            .into_iter()
            .map(|e| (e.kind, e.channel_name))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (PresenceKind::Join, "general".to_owned()),
                (PresenceKind::Leave, "general".to_owned()),
                (PresenceKind::Join, "music".to_owned()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_name_lookups_do_not_hold_up_events() {
        let source = StubSource {
            delay: Duration::from_millis(500),
            ..StubSource::default()
        }
        .with_channel("100", "general", "1")
        .with_guild("1", "Test Guild");
        let (mut tracker, _handle, mut events) = tracker_with_source(test_config(), source);

        let (frames_tx, mut frames) = frames();
        frames_tx
            .unbounded_send(dispatch("VOICE_STATE_UPDATE", 1, voice_state("u1", Some("100"))))
            .unwrap();
        drop(frames_tx);
        let (out_tx, _out_rx) = mpsc::channel(16);
        let (_zombie_tx, timers) = idle_timers();

        let started = Instant::now();
        tracker
            .event_loop(&mut frames, &out_tx, timers)
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));

        let presence = presence_events(&drain(&mut events));
        assert_eq!(presence.len(), 1);
        assert_eq!(presence[0].channel_name, "100");
        assert_eq!(presence[0].guild_name, "Guild 1");
        assert_eq!(presence[0].user_name, "Ali");

        // The background lookups land and later events get real names.
        tokio::time::sleep(Duration::from_millis(800)).await;
        let (frames_tx, mut frames) = self::frames();
        frames_tx
            .unbounded_send(dispatch("VOICE_STATE_UPDATE", 2, voice_state("u1", None)))
            .unwrap();
        drop(frames_tx);
        let (_zombie_tx, timers) = idle_timers();
        tracker
            .event_loop(&mut frames, &out_tx, timers)
            .await
            .unwrap();

        let presence = presence_events(&drain(&mut events));
        assert_eq!(presence.len(), 1);
        assert_eq!(presence[0].kind, PresenceKind::Leave);
        assert_eq!(presence[0].channel_name, "general");
        assert_eq!(presence[0].guild_name, "Test Guild");
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped() {
        let (mut tracker, _handle, _events) = test_tracker(test_config());
        tracker.attempt = 2;

        let (frames_tx, mut frames) = frames();
        frames_tx
            .unbounded_send(Ok(Message::Text("not json".into())))
            .unwrap();
        frames_tx
            .unbounded_send(dispatch("VOICE_STATE_UPDATE", 1, json!({ "channel_id": 5 })))
            .unwrap();
        frames_tx
            .unbounded_send(dispatch("RESUMED", 2, json!(null)))
            .unwrap();
        drop(frames_tx);
        let (out_tx, _out_rx) = mpsc::channel(16);
        let (_zombie_tx, timers) = idle_timers();

        let end = tracker.event_loop(&mut frames, &out_tx, timers).await;
        assert_eq!(end.unwrap(), SessionEnd::Closed(close_code::ABNORMAL));
        assert_eq!(tracker.attempt, 0);
        assert_eq!(tracker.session.sequence, Some(2));
        assert_eq!(tracker.state(), ConnectionState::Connected);
    }

    // ── Reconnect Tests ─────────────────────────────────────

    #[tokio::test]
    async fn non_abnormal_closes_give_up_after_five_attempts() {
        let (mut tracker, _handle, mut events) = test_tracker(test_config());
        tracker.session.session_id = Some("sess".into());
        tracker.session.sequence = Some(1);

        for expected in 1..=5 {
            let delay = tracker.plan_reconnect(4000).unwrap();
            assert_eq!(delay, Duration::from_secs(5));
            assert_eq!(tracker.attempt, expected);
        }

        let err = tracker.plan_reconnect(4000).unwrap_err();
        assert!(matches!(
            err,
            TrackerError::ReconnectExhausted {
                code: 4000,
                attempts: 5
            }
        ));
        assert_eq!(tracker.session, Session::default());
        assert!(drain(&mut events).iter().any(|e| matches!(
            e,
            TrackerEvent::Status(StatusEvent::Error { fatal: true, .. })
        )));
    }

    #[tokio::test]
    async fn abnormal_closes_back_off_and_keep_session() {
        let (mut tracker, handle, _events) = test_tracker(test_config());
        tracker.session.session_id = Some("sess".into());
        tracker.session.sequence = Some(1);

        let delays: Vec<Duration> = (0..3)
            .map(|_| tracker.plan_reconnect(close_code::ABNORMAL).unwrap())
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(5000),
                Duration::from_millis(7500),
                Duration::from_millis(11250),
            ]
        );
        assert_eq!(
            handle.state(),
            ConnectionState::Reconnecting {
                attempt: 3,
                delay_ms: 11250
            }
        );
        assert!(tracker.session.can_resume());
    }

    #[tokio::test]
    async fn fatal_close_code_stops_immediately() {
        let (mut tracker, _handle, _events) = test_tracker(test_config());
        let err = tracker.plan_reconnect(4004).unwrap_err();
        assert!(matches!(err, TrackerError::AuthenticationFailed));
        assert_eq!(tracker.attempt, 0);
    }

    #[tokio::test]
    async fn retryable_closes_keep_session_resumable() {
        let (mut tracker, _handle, _events) = test_tracker(test_config());
        tracker.session.session_id = Some("sess".into());
        tracker.session.sequence = Some(7);

        for code in [close_code::NORMAL, close_code::GOING_AWAY, 4000] {
            tracker.plan_reconnect(code).unwrap();
            assert!(tracker.session.can_resume(), "{code}");
        }
        assert_eq!(tracker.session.session_id.as_deref(), Some("sess"));
        assert_eq!(tracker.session.sequence, Some(7));
    }

    #[tokio::test]
    async fn codeless_close_frame_is_retryable_and_keeps_session() {
        let (mut tracker, _handle, _events) = test_tracker(test_config());
        tracker.session.session_id = Some("sess".into());
        tracker.session.sequence = Some(7);

        let (frames_tx, mut frames) = frames();
        frames_tx.unbounded_send(Ok(Message::Close(None))).unwrap();
        let (out_tx, _out_rx) = mpsc::channel(16);
        let (_zombie_tx, timers) = idle_timers();

        let end = tracker
            .event_loop(&mut frames, &out_tx, timers)
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::Closed(close_code::NO_STATUS));

        tracker.plan_reconnect(close_code::NO_STATUS).unwrap();
        assert!(tracker.session.can_resume());
    }

    // ── Lifecycle Tests ─────────────────────────────────────

    #[test]
    fn invalid_config_is_rejected() {
        let source = Arc::new(StubSource::default());
        let metadata = Arc::new(MetadataCache::new(source, Duration::from_secs(1)));
        let (sink, _events) = ChannelSink::new();
        let result = GatewayTracker::new(TrackerConfig::default(), metadata, Arc::new(sink));
        assert!(matches!(result, Err(TrackerError::Config(_))));
    }

    #[tokio::test]
    async fn stop_cancels_pending_reconnect_and_is_idempotent() {
        let config = TrackerConfig {
            // Nothing listens here: every connect fails fast.
            gateway_url: "ws://127.0.0.1:1".into(),
            ..test_config()
        };
        let source = Arc::new(StubSource::default());
        let metadata = Arc::new(MetadataCache::new(source, Duration::from_secs(1)));
        let (sink, _events) = ChannelSink::new();
        let mut handle = spawn(config, metadata, Arc::new(sink)).unwrap();

        let mut state = handle.subscribe_state();
        tokio::time::timeout(
            Duration::from_secs(5),
            state.wait_for(|s| matches!(s, ConnectionState::Reconnecting { .. })),
        )
        .await
        .unwrap()
        .unwrap();

        handle.stop().await.unwrap();
        assert_eq!(handle.state(), ConnectionState::Disconnected);
        handle.stop().await.unwrap();
    }
}
