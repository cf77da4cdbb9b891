//! `WebSocket` connection management for the Discord Gateway.
//!
//! Connecting yields the split halves of the socket. The write half is
//! owned by a dedicated writer task fed through an mpsc channel so the
//! heartbeat and the event loop can both send without sharing the sink.

use std::fmt::Display;

use futures::stream::{SplitSink, SplitStream};
use futures::{Sink, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error};

use crate::error::TrackerResult;
use crate::protocol::GatewayPayload;

/// Type alias for the `WebSocket` stream used by the tracker.
pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the gateway socket.
pub(crate) type WsWriter = SplitSink<WsStream, Message>;

/// Read half of the gateway socket.
pub(crate) type WsReader = SplitStream<WsStream>;

/// A frame queued for the writer task.
#[derive(Debug, Clone)]
pub(crate) enum Outbound {
    /// A Gateway payload, sent as JSON text.
    Payload(GatewayPayload),
    /// A close frame. The writer stops after sending it.
    Close {
        /// Close code.
        code: u16,
        /// Human-readable reason.
        reason: String,
    },
}

/// Connect to the given Gateway URL and split the socket.
pub(crate) async fn connect(url: &str) -> TrackerResult<(WsWriter, WsReader)> {
    let (ws, _response) = connect_async(url).await?;
    Ok(ws.split())
}

/// Spawn the writer task.
///
/// Drains `outbound_rx` into `writer` until the channel closes, a send
/// fails, or a close frame has been written.
pub(crate) fn spawn_writer<W>(writer: W, mut outbound_rx: mpsc::Receiver<Outbound>) -> JoinHandle<()>
where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display,
{
    tokio::spawn(async move {
        let mut writer = writer;
        while let Some(frame) = outbound_rx.recv().await {
            let (message, last) = match frame {
                Outbound::Payload(payload) => match serde_json::to_string(&payload) {
                    Ok(json) => (Message::Text(json.into()), false),
                    Err(e) => {
                        error!(error = %e, "Failed to serialize Gateway payload");
                        continue;
                    },
                },
                Outbound::Close { code, reason } => {
                    debug!(code, reason = %reason, "Writer task: sending close frame");
                    let frame = CloseFrame {
                        code: code.into(),
                        reason: reason.into(),
                    };
                    (Message::Close(Some(frame)), true)
                },
            };

            if let Err(e) = writer.send(message).await {
                debug!(error = %e, "Writer task: send failed");
                return;
            }
            if last {
                break;
            }
        }
        if let Err(e) = writer.close().await {
            debug!(error = %e, "Writer task: close failed");
        }
    })
}
