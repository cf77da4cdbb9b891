//! Reconnect policy.
//!
//! A pure decision over `(close_code, attempt)`. Abnormal closes (1006)
//! retry forever with exponential growth capped at one minute. Every other
//! close retries at a fixed interval until the attempt budget runs out.

use std::time::Duration;

use crate::protocol::close_code;

/// Attempt budget for non-abnormal closes.
pub const MAX_ATTEMPTS: u32 = 5;

/// Base delay in milliseconds.
pub const BASE_DELAY_MS: u64 = 5_000;

/// Upper bound on the abnormal-close delay in milliseconds.
pub const MAX_DELAY_MS: u64 = 60_000;

/// Growth factor between consecutive abnormal-close delays.
const GROWTH: f64 = 1.5;

/// Outcome of a reconnect decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Reconnect after `delay`, then count as `next_attempt`.
    Retry {
        /// How long to wait.
        delay: Duration,
        /// Attempt counter after this retry.
        next_attempt: u32,
    },
    /// Stop retrying and report a terminal failure.
    GiveUp,
}

/// Decide what to do after the socket closed with `code` on `attempt`.
#[must_use]
pub fn decide(code: u16, attempt: u32) -> ReconnectDecision {
    let next_attempt = attempt.saturating_add(1);

    if code == close_code::ABNORMAL {
        return ReconnectDecision::Retry {
            delay: Duration::from_millis(abnormal_delay_ms(attempt)),
            next_attempt,
        };
    }

    if attempt < MAX_ATTEMPTS {
        ReconnectDecision::Retry {
            delay: Duration::from_millis(BASE_DELAY_MS),
            next_attempt,
        }
    } else {
        ReconnectDecision::GiveUp
    }
}

/// `min(5000 * 1.5^attempt, 60000)`, floored to whole milliseconds.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn abnormal_delay_ms(attempt: u32) -> u64 {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let raw = BASE_DELAY_MS as f64 * GROWTH.powi(exponent);
    let capped = raw.min(MAX_DELAY_MS as f64);
    capped.floor() as u64
}
