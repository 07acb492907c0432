//! Messaging transport seam
//!
//! The session holder talks to the remote service only through
//! [`MessengerTransport`]. The production implementation lives in
//! [`crate::telegram`]; tests substitute an in-memory fake.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::chat_ref::ChatRef;
use crate::errors::AppResult;

/// The authenticated account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Numeric account id
    pub id: i64,
    /// Display (first) name
    pub first_name: String,
    /// Public username, if the account has one
    pub username: Option<String>,
}

/// A message as seen in a conversation snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Per-conversation id; higher ids were sent no earlier than lower ones
    pub id: i64,
    /// Author id, when the service reports one
    pub sender_id: Option<i64>,
    /// Text body; `None` for media without caption and service messages
    pub text: Option<String>,
    pub date: Option<DateTime<Utc>>,
    /// Authored by the current identity
    pub outgoing: bool,
}

/// Result of a send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub id: i64,
    pub date: Option<DateTime<Utc>>,
}

/// Connection to the remote messaging service
///
/// Implementations must tolerate interleaved concurrent calls from many
/// requests; the holder does not serialize message operations.
#[async_trait]
pub trait MessengerTransport: Send + Sync {
    /// Open the network session. Calling it on a connected transport is a no-op.
    async fn connect(&self) -> AppResult<()>;

    fn is_connected(&self) -> bool;

    /// Whether the stored credential is bound to a signed-in account
    async fn is_authorized(&self) -> AppResult<bool>;

    async fn get_me(&self) -> AppResult<Identity>;

    async fn send_message(&self, chat: &ChatRef, text: &str) -> AppResult<SentMessage>;

    /// Up to `limit` messages of `chat`, most recent first
    async fn get_messages(&self, chat: &ChatRef, limit: usize) -> AppResult<Vec<Message>>;

    /// Close the network session. Safe to call when never connected.
    async fn disconnect(&self);
}
