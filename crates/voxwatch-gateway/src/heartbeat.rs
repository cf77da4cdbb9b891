//! Heartbeat scheduling for the Gateway connection.
//!
//! One scheduler lives for the whole tracker run. Each `Hello` starts a
//! fresh heartbeat task, superseding any previous one; closing the socket
//! or stopping the tracker cancels it. The task reads the latest sequence
//! number from a `watch` channel so it never contends with the event loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::connection::Outbound;
use crate::protocol::GatewayPayload;

/// Owns the running heartbeat task, if any.
pub(crate) struct HeartbeatScheduler {
    task: Option<JoinHandle<()>>,
    /// Whether the last heartbeat we sent has been acknowledged.
    ack: Arc<AtomicBool>,
}

impl HeartbeatScheduler {
    pub(crate) fn new() -> Self {
        Self {
            task: None,
            ack: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Start heartbeating every `interval`, replacing any running task.
    ///
    /// The first beat is sent after `interval * jitter` (random 0.0..1.0).
    /// With `zombie_detection` on, a beat that finds the previous one
    /// unacknowledged fires the returned oneshot instead of sending.
    pub(crate) fn start(
        &mut self,
        interval: Duration,
        sequence: watch::Receiver<Option<u64>>,
        outbound: mpsc::Sender<Outbound>,
        zombie_detection: bool,
    ) -> oneshot::Receiver<()> {
        if let Some(previous) = self.task.take() {
            debug!("Superseding running heartbeat");
            previous.abort();
        }

        self.ack.store(true, Ordering::SeqCst);
        let (zombie_tx, zombie_rx) = oneshot::channel();
        let ack = Arc::clone(&self.ack);

        self.task = Some(tokio::spawn(run_heartbeat(
            interval,
            sequence,
            ack,
            outbound,
            zombie_tx,
            zombie_detection,
        )));
        zombie_rx
    }

    /// Record a Heartbeat ACK (`op=11`).
    pub(crate) fn ack_received(&self) {
        trace!("Heartbeat ACK received");
        self.ack.store(true, Ordering::SeqCst);
    }

    /// Whether a heartbeat task is currently owned.
    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancel the running task and wait until it has stopped.
    ///
    /// Idempotent: a second call finds no task and returns immediately.
    pub(crate) async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            // Cancelled or already finished; either way it no longer runs.
            let _ = task.await;
            debug!("Heartbeat stopped");
        }
    }
}

impl Drop for HeartbeatScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_heartbeat(
    interval: Duration,
    sequence: watch::Receiver<Option<u64>>,
    ack: Arc<AtomicBool>,
    outbound: mpsc::Sender<Outbound>,
    zombie_tx: oneshot::Sender<()>,
    zombie_detection: bool,
) {
    // First beat: jitter to prevent thundering herd.
    let jitter_factor = f64::from(fastrand::u32(0..1000)) / 1000.0;
    let first_delay = interval.mul_f64(jitter_factor);
    debug!(
        interval_ms = interval.as_millis(),
        first_delay_ms = first_delay.as_millis(),
        "Heartbeat task started"
    );
    tokio::time::sleep(first_delay).await;

    loop {
        if zombie_detection && !ack.load(Ordering::SeqCst) {
            warn!("Heartbeat ACK missed, zombie connection detected");
            let _ = zombie_tx.send(());
            return;
        }

        let seq = *sequence.borrow();
        ack.store(false, Ordering::SeqCst);
        trace!(seq = ?seq, "Sending heartbeat");

        // Writer gone means the connection is already closing.
        if outbound
            .send(Outbound::Payload(GatewayPayload::heartbeat(seq)))
            .await
            .is_err()
        {
            debug!("Heartbeat outbound channel closed");
            return;
        }

        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Opcode;

    fn expect_heartbeat(frame: Outbound) -> Option<u64> {
        match frame {
            Outbound::Payload(p) => {
                assert_eq!(p.opcode(), Some(Opcode::Heartbeat));
                p.d.and_then(|d| d.as_u64())
            },
            Outbound::Close { .. } => panic!("expected heartbeat"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_carries_latest_sequence() {
        let mut scheduler = HeartbeatScheduler::new();
        let (seq_tx, seq_rx) = watch::channel(None);
        let (out_tx, mut out_rx) = mpsc::channel(8);

        let _zombie = scheduler.start(Duration::from_millis(1000), seq_rx, out_tx, true);

        assert_eq!(expect_heartbeat(out_rx.recv().await.unwrap()), None);
        scheduler.ack_received();
        seq_tx.send_replace(Some(12));
        assert_eq!(expect_heartbeat(out_rx.recv().await.unwrap()), Some(12));

        scheduler.stop().await;
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_ack_signals_zombie() {
        let mut scheduler = HeartbeatScheduler::new();
        let (_seq_tx, seq_rx) = watch::channel(Some(1));
        let (out_tx, mut out_rx) = mpsc::channel(8);

        let zombie = scheduler.start(Duration::from_millis(500), seq_rx, out_tx, true);
        out_rx.recv().await.unwrap();

        // No ACK: the next tick reports a zombie instead of beating.
        zombie.await.unwrap();
        assert!(out_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn zombie_detection_disabled_keeps_beating() {
        let mut scheduler = HeartbeatScheduler::new();
        let (_seq_tx, seq_rx) = watch::channel(None);
        let (out_tx, mut out_rx) = mpsc::channel(8);

        let _zombie = scheduler.start(Duration::from_millis(500), seq_rx, out_tx, false);
        for _ in 0..3 {
            expect_heartbeat(out_rx.recv().await.unwrap());
        }
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_cancels() {
        let mut scheduler = HeartbeatScheduler::new();
        let (_seq_tx, seq_rx) = watch::channel(None);
        let (out_tx, mut out_rx) = mpsc::channel(8);

        let _zombie = scheduler.start(Duration::from_secs(60), seq_rx, out_tx, true);
        scheduler.stop().await;
        scheduler.stop().await;

        // The task owned the only sender; once cancelled the channel closes.
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn new_start_supersedes_previous_task() {
        let mut scheduler = HeartbeatScheduler::new();
        let (_seq_tx, seq_rx) = watch::channel(None);
        let (first_tx, mut first_rx) = mpsc::channel(8);
        let (second_tx, mut second_rx) = mpsc::channel(8);

        let _first = scheduler.start(Duration::from_secs(60), seq_rx.clone(), first_tx, true);
        let _second = scheduler.start(Duration::from_millis(100), seq_rx, second_tx, true);

        expect_heartbeat(second_rx.recv().await.unwrap());
        assert!(first_rx.recv().await.is_none());
        scheduler.stop().await;
    }
}
