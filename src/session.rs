//! Identity/session holder
//!
//! Owns the single long-lived connection to the messaging service and the
//! identity it is authorized as. One holder is shared by every request.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::chat_ref::ChatRef;
use crate::errors::{AppError, AppResult};
use crate::transport::{Identity, Message, MessengerTransport, SentMessage};

/// Authorization state, replaced wholesale on connect/disconnect
#[derive(Debug, Default)]
struct SessionState {
    connected: bool,
    identity: Option<Identity>,
}

/// Holder of the one authenticated session
///
/// Message operations only read the state long enough to check authorization;
/// the transport call itself runs without holding the lock so concurrent
/// requests (including long waits) never queue behind each other.
pub struct SessionHolder {
    transport: Arc<dyn MessengerTransport>,
    state: RwLock<SessionState>,
}

impl SessionHolder {
    pub fn new(transport: Arc<dyn MessengerTransport>) -> Self {
        Self {
            transport,
            state: RwLock::new(SessionState::default()),
        }
    }

    /// Connect and load the identity
    ///
    /// Idempotent: a connected holder is left untouched. Never fails; any
    /// error is logged and leaves the holder unauthenticated (and, if the
    /// connection itself failed, disconnected).
    pub async fn connect(&self) {
        let mut state = self.state.write().await;
        if state.connected && self.transport.is_connected() {
            return;
        }

        if let Err(e) = self.transport.connect().await {
            error!("Startup error: {e}");
            *state = SessionState::default();
            return;
        }
        state.connected = self.transport.is_connected();
        state.identity = None;

        match self.transport.is_authorized().await {
            Ok(true) => match self.transport.get_me().await {
                Ok(me) => {
                    info!(
                        "Connected as: {} (@{})",
                        me.first_name,
                        me.username.as_deref().unwrap_or("-")
                    );
                    state.identity = Some(me);
                }
                Err(e) => error!("Startup error: could not load identity: {e}"),
            },
            Ok(false) => warn!("Not authorized. Run `telegram-sender auth` first."),
            Err(e) => error!("Startup error: authorization check failed: {e}"),
        }
    }

    pub async fn is_authorized(&self) -> bool {
        self.state.read().await.identity.is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub async fn current_identity(&self) -> Option<Identity> {
        self.state.read().await.identity.clone()
    }

    /// Identity or `NotAuthenticated`
    pub async fn require_identity(&self) -> AppResult<Identity> {
        self.current_identity()
            .await
            .ok_or(AppError::NotAuthenticated)
    }

    pub async fn send_message(&self, chat: &ChatRef, text: &str) -> AppResult<SentMessage> {
        self.require_identity().await?;
        self.transport.send_message(chat, text).await
    }

    /// Most recent `limit` messages of `chat`, newest first
    pub async fn fetch_recent(&self, chat: &ChatRef, limit: usize) -> AppResult<Vec<Message>> {
        self.require_identity().await?;
        self.transport.get_messages(chat, limit).await
    }

    /// Release the transport and forget the identity. Safe when never connected.
    pub async fn disconnect(&self) {
        let mut state = self.state.write().await;
        let was_connected = state.connected || self.transport.is_connected();
        self.transport.disconnect().await;
        *state = SessionState::default();
        if was_connected {
            info!("Disconnected");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::errors::AppError;
    use crate::testing::{FakeTransport, chat, connected_session, inbound, me};

    use super::SessionHolder;

    #[tokio::test]
    async fn connect_loads_identity_when_authorized() {
        let fake = Arc::new(FakeTransport::authorized());
        let session = connected_session(&fake).await;

        assert!(session.is_connected());
        assert!(session.is_authorized().await);
        assert_eq!(session.current_identity().await, Some(me()));
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let fake = Arc::new(FakeTransport::authorized());
        let session = connected_session(&fake).await;
        session.connect().await;
        session.connect().await;

        assert_eq!(fake.connect_count(), 1);
        assert!(session.is_authorized().await);
    }

    #[tokio::test]
    async fn unauthorized_session_stays_connected_without_identity() {
        let fake = Arc::new(FakeTransport::unauthorized());
        let session = connected_session(&fake).await;

        assert!(session.is_connected());
        assert!(!session.is_authorized().await);
        assert_eq!(session.current_identity().await, None);
    }

    #[tokio::test]
    async fn identity_load_failure_leaves_session_connected_but_unauthorized() {
        let fake = Arc::new(FakeTransport::identity_unavailable("FLOOD_WAIT_30"));
        let session = connected_session(&fake).await;

        assert!(session.is_connected());
        assert!(!session.is_authorized().await);
        assert_eq!(session.current_identity().await, None);
        let err = session
            .send_message(&chat(), "hi")
            .await
            .expect_err("no identity, no sending");
        assert!(matches!(err, AppError::NotAuthenticated));
    }

    #[tokio::test]
    async fn failed_connect_degrades_instead_of_failing() {
        let fake = Arc::new(FakeTransport::failing_connect("network unreachable"));
        let session = connected_session(&fake).await;

        assert!(!session.is_connected());
        assert!(!session.is_authorized().await);
    }

    #[tokio::test]
    async fn message_operations_require_authorization() {
        let fake = Arc::new(FakeTransport::unauthorized());
        let session = connected_session(&fake).await;

        let send = session.send_message(&chat(), "hi").await;
        assert!(matches!(send, Err(AppError::NotAuthenticated)));
        let fetch = session.fetch_recent(&chat(), 1).await;
        assert!(matches!(fetch, Err(AppError::NotAuthenticated)));
        assert_eq!(fake.fetch_count(), 0);
    }

    #[tokio::test]
    async fn send_and_fetch_delegate_to_transport() {
        let fake = Arc::new(FakeTransport::authorized());
        fake.push(&chat(), inbound(7, "earlier"));
        let session = connected_session(&fake).await;

        let sent = session.send_message(&chat(), "hello").await.expect("send");
        assert_eq!(sent.id, 8);

        let recent = session.fetch_recent(&chat(), 5).await.expect("fetch");
        let ids: Vec<i64> = recent.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![8, 7]);
        assert_eq!(recent[0].text.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn disconnect_is_safe_without_connect_and_clears_identity() {
        let fake = Arc::new(FakeTransport::authorized());
        let fresh = SessionHolder::new(fake.clone());
        fresh.disconnect().await;
        assert!(!fresh.is_connected());

        let session = connected_session(&fake).await;
        session.disconnect().await;
        assert!(!session.is_connected());
        assert!(!session.is_authorized().await);
    }
}
