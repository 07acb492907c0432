//! Bounded wait for an inbound reply
//!
//! A wait repeatedly snapshots the most recent messages of one conversation
//! until it sees a message newer than the caller's watermark that the current
//! identity did not write, or until its deadline passes. Each call is
//! independent; nothing is remembered between waits.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::chat_ref::ChatRef;
use crate::errors::AppResult;
use crate::session::SessionHolder;
use crate::transport::Message;

/// Poll cadence of a wait
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    /// Sleep after a poll cycle that found nothing
    pub interval: Duration,
    /// Messages fetched per poll cycle
    pub batch_size: usize,
    /// Caller-supplied timeouts above this are clamped down to it
    pub max_timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            batch_size: 5,
            max_timeout: Duration::from_secs(300),
        }
    }
}

impl PollSettings {
    /// Convert a caller timeout in (possibly fractional) seconds
    ///
    /// Zero, negative and NaN become zero, which makes the wait time out
    /// without polling.
    pub fn clamp_timeout(&self, timeout_seconds: f64) -> Duration {
        if !timeout_seconds.is_finite() {
            return if timeout_seconds == f64::INFINITY {
                self.max_timeout
            } else {
                Duration::ZERO
            };
        }
        if timeout_seconds <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(timeout_seconds)
            .unwrap_or(self.max_timeout)
            .min(self.max_timeout)
    }
}

/// How a wait ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Found {
        message_id: i64,
        text: Option<String>,
        sender_id: Option<i64>,
    },
    TimedOut,
}

/// Wait for a reply in `chat` newer than `after_message_id`
///
/// Within one fetched batch the first qualifying message in fetch order
/// (newest first) wins, not the lowest qualifying id. When several replies
/// land inside one poll interval the caller therefore sees the newest one.
///
/// # Errors
///
/// - `NotAuthenticated` if the session is not authorized
/// - any transport error from a poll; the wait is abandoned, not retried
pub async fn wait_for_response(
    session: &SessionHolder,
    chat: &ChatRef,
    after_message_id: i64,
    timeout: Duration,
    settings: PollSettings,
) -> AppResult<WaitOutcome> {
    let self_id = session.require_identity().await?.id;
    let deadline = Instant::now() + timeout;

    let mut cycles = 0_u32;
    while Instant::now() < deadline {
        cycles += 1;
        let batch = session.fetch_recent(chat, settings.batch_size).await?;
        if let Some(found) = first_reply(&batch, after_message_id, self_id) {
            debug!(%chat, cycles, message_id = found.id, "reply found");
            return Ok(WaitOutcome::Found {
                message_id: found.id,
                text: found.text.clone(),
                sender_id: found.sender_id,
            });
        }
        sleep(settings.interval).await;
    }

    debug!(%chat, cycles, "wait timed out");
    Ok(WaitOutcome::TimedOut)
}

/// First message in `batch` above the watermark not written by `self_id`
fn first_reply(batch: &[Message], after_message_id: i64, self_id: i64) -> Option<&Message> {
    batch.iter().find(|m| {
        m.id > after_message_id && !m.outgoing && m.sender_id != Some(self_id)
    })
}
