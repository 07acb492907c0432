//! In-memory transport for unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::chat_ref::ChatRef;
use crate::errors::{AppError, AppResult};
use crate::session::SessionHolder;
use crate::transport::{Identity, Message, MessengerTransport, SentMessage};

pub const SELF_ID: i64 = 1_000;
pub const PEER_ID: i64 = 2_000;

pub fn me() -> Identity {
    Identity {
        id: SELF_ID,
        first_name: "Tester".to_owned(),
        username: Some("tester".to_owned()),
    }
}

pub fn chat() -> ChatRef {
    ChatRef::Id(123)
}

/// Message written by someone else
pub fn inbound(id: i64, text: &str) -> Message {
    Message {
        id,
        sender_id: Some(PEER_ID),
        text: Some(text.to_owned()),
        date: Utc.timestamp_opt(1_700_000_000 + id, 0).single(),
        outgoing: false,
    }
}

/// Message written by the test identity
pub fn outbound(id: i64, text: &str) -> Message {
    Message {
        id,
        sender_id: Some(SELF_ID),
        text: Some(text.to_owned()),
        date: Utc.timestamp_opt(1_700_000_000 + id, 0).single(),
        outgoing: true,
    }
}

/// Scriptable fake of the remote service
///
/// Conversations are kept in ascending id order and served most recent first.
#[derive(Debug, Default)]
pub struct FakeTransport {
    identity: Option<Identity>,
    connect_error: Option<String>,
    identity_error: Option<String>,
    omit_sent_date: AtomicBool,
    connected: AtomicBool,
    chats: Mutex<HashMap<ChatRef, Vec<Message>>>,
    fetch_error: Mutex<Option<String>>,
    fetches: AtomicUsize,
    connects: AtomicUsize,
}

impl FakeTransport {
    pub fn authorized() -> Self {
        Self {
            identity: Some(me()),
            ..Self::default()
        }
    }

    pub fn unauthorized() -> Self {
        Self::default()
    }

    pub fn failing_connect(reason: &str) -> Self {
        Self {
            identity: Some(me()),
            connect_error: Some(reason.to_owned()),
            ..Self::default()
        }
    }

    /// Authorized, but loading the identity fails
    pub fn identity_unavailable(reason: &str) -> Self {
        Self {
            identity: Some(me()),
            identity_error: Some(reason.to_owned()),
            ..Self::default()
        }
    }

    /// Sent messages come back without a server date
    pub fn send_without_date(&self) {
        self.omit_sent_date.store(true, Ordering::SeqCst);
    }

    pub fn push(&self, chat: &ChatRef, message: Message) {
        let mut chats = self.chats.lock().expect("chats lock");
        let history = chats.entry(chat.clone()).or_default();
        history.push(message);
        history.sort_by_key(|m| m.id);
    }

    pub fn fail_fetches(&self, reason: &str) {
        *self.fetch_error.lock().expect("fetch_error lock") = Some(reason.to_owned());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> AppResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::transport("Cannot send requests while disconnected"))
        }
    }
}

#[async_trait]
impl MessengerTransport for FakeTransport {
    async fn connect(&self) -> AppResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.connect_error {
            return Err(AppError::transport(reason.clone()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn is_authorized(&self) -> AppResult<bool> {
        self.ensure_connected()?;
        Ok(self.identity.is_some())
    }

    async fn get_me(&self) -> AppResult<Identity> {
        self.ensure_connected()?;
        if let Some(reason) = &self.identity_error {
            return Err(AppError::transport(reason.clone()));
        }
        self.identity
            .clone()
            .ok_or_else(|| AppError::transport("AUTH_KEY_UNREGISTERED"))
    }

    async fn send_message(&self, chat: &ChatRef, text: &str) -> AppResult<SentMessage> {
        self.ensure_connected()?;
        let mut chats = self.chats.lock().expect("chats lock");
        let history = chats.entry(chat.clone()).or_default();
        let id = history.last().map_or(1, |m| m.id + 1);
        let message = outbound(id, text);
        let sent = SentMessage {
            id,
            date: if self.omit_sent_date.load(Ordering::SeqCst) {
                None
            } else {
                message.date
            },
        };
        history.push(message);
        Ok(sent)
    }

    async fn get_messages(&self, chat: &ChatRef, limit: usize) -> AppResult<Vec<Message>> {
        self.ensure_connected()?;
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.fetch_error.lock().expect("fetch_error lock").clone() {
            return Err(AppError::transport(reason));
        }
        let chats = self.chats.lock().expect("chats lock");
        Ok(chats
            .get(chat)
            .map(|history| history.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// Holder over `fake`, already connected
pub async fn connected_session(fake: &Arc<FakeTransport>) -> Arc<SessionHolder> {
    let session = Arc::new(SessionHolder::new(fake.clone()));
    session.connect().await;
    session
}
