//! Telegram MTProto transport and interactive login
//!
//! Provides timeout-bounded wrappers around `grammers-client` calls for a
//! personal (user) account. The durable credential lives in the session file
//! produced by [`authenticate_interactive`]; the HTTP server only ever loads
//! it.

use std::collections::HashMap;
use std::future::Future;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use grammers_client::types::{Chat, PackedChat};
use grammers_client::{Client, Config, InitParams, SignInError};
use grammers_session::Session;
use secrecy::{ExposeSecret, SecretString};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::chat_ref::ChatRef;
use crate::config::ServerConfig;
use crate::errors::{AppError, AppResult};
use crate::transport::{Identity, Message, MessengerTransport, SentMessage};

/// Run one remote call under the configured bound
///
/// Both expiry and the call's own error become `Transport` errors carrying
/// the operation name.
async fn bounded<T, E, F>(limit: Duration, op: &str, fut: F) -> AppResult<T>
where
    E: std::fmt::Display,
    F: Future<Output = Result<T, E>>,
{
    timeout(limit, fut)
        .await
        .map_err(|_| AppError::transport(format!("{op} timed out")))
        .and_then(|r| r.map_err(|e| AppError::transport(format!("{e}"))))
}

/// `grammers`-backed implementation of [`MessengerTransport`]
///
/// The client handle is cheap to clone and safe for concurrent invocations,
/// so it is copied out of the mutex for every call and the lock is never held
/// across an await.
pub struct TelegramTransport {
    api_id: i32,
    api_hash: SecretString,
    session_path: PathBuf,
    request_timeout: Duration,
    client: Mutex<Option<Client>>,
    self_id: Mutex<Option<i64>>,
    /// Resolved chats for the process lifetime, keyed by caller reference
    chats: tokio::sync::Mutex<HashMap<ChatRef, PackedChat>>,
}

impl TelegramTransport {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            api_id: config.api_id,
            api_hash: config.api_hash.clone(),
            session_path: config.session_path(),
            request_timeout: config.request_timeout(),
            client: Mutex::new(None),
            self_id: Mutex::new(None),
            chats: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    fn client(&self) -> AppResult<Client> {
        self.client
            .lock()
            .map_err(|_| AppError::Internal("telegram client lock poisoned".to_owned()))?
            .clone()
            .ok_or_else(|| AppError::transport("Cannot send requests while disconnected"))
    }

    fn cached_self_id(&self) -> Option<i64> {
        self.self_id.lock().ok().and_then(|id| *id)
    }

    /// Resolve a caller reference to a packed chat, consulting the cache first
    async fn resolve(&self, client: &Client, chat: &ChatRef) -> AppResult<PackedChat> {
        if let Some(packed) = self.chats.lock().await.get(chat) {
            return Ok(packed.clone());
        }

        let packed = match chat {
            ChatRef::SelfChat => {
                bounded(self.request_timeout, "get_me", client.get_me())
                    .await?
                    .pack()
            }
            ChatRef::Username(name) => {
                bounded(
                    self.request_timeout,
                    "resolve_username",
                    client.resolve_username(name),
                )
                .await?
                .ok_or_else(|| {
                    AppError::transport(format!("No user has \"{name}\" as username"))
                })?
                .pack()
            }
            ChatRef::Phone(digits) => self.find_contact_by_phone(client, digits).await?,
            ChatRef::Id(id) => self.find_in_dialogs(client, *id).await?,
        };

        debug!(%chat, "resolved chat");
        self.chats.lock().await.insert(chat.clone(), packed.clone());
        Ok(packed)
    }

    /// Walk the dialog list until a chat with a matching id shows up
    async fn find_in_dialogs(&self, client: &Client, id: i64) -> AppResult<PackedChat> {
        let candidates = bare_chat_ids(id);
        let mut dialogs = client.iter_dialogs();
        loop {
            let next = bounded(self.request_timeout, "iter_dialogs", dialogs.next()).await?;
            let Some(dialog) = next else {
                return Err(AppError::transport(format!(
                    "Could not find the input entity for chat {id}"
                )));
            };
            let chat: &Chat = dialog.chat();
            if candidates.contains(&chat.id()) {
                return Ok(chat.pack());
            }
        }
    }

    /// Walk the dialog list until a user with a matching phone number shows up
    ///
    /// Only users whose number is visible to this account (contacts, mostly)
    /// can be found this way.
    async fn find_contact_by_phone(&self, client: &Client, digits: &str) -> AppResult<PackedChat> {
        let mut dialogs = client.iter_dialogs();
        loop {
            let next = bounded(self.request_timeout, "iter_dialogs", dialogs.next()).await?;
            let Some(dialog) = next else {
                return Err(AppError::transport(format!(
                    "Could not find a contact with phone +{digits}"
                )));
            };
            if let Chat::User(user) = dialog.chat() {
                if user.phone().is_some_and(|phone| same_phone(phone, digits)) {
                    return Ok(dialog.chat().pack());
                }
            }
        }
    }

    fn to_message(&self, msg: &grammers_client::types::Message) -> Message {
        let outgoing = msg.outgoing();
        let sender_id = msg
            .sender()
            .map(|sender| sender.id())
            .or_else(|| outgoing.then(|| self.cached_self_id()).flatten());
        let text = msg.text();
        Message {
            id: i64::from(msg.id()),
            sender_id,
            text: (!text.is_empty()).then(|| text.to_owned()),
            date: Some(msg.date()),
            outgoing,
        }
    }
}

#[async_trait]
impl MessengerTransport for TelegramTransport {
    async fn connect(&self) -> AppResult<()> {
        if self.is_connected() {
            return Ok(());
        }
        let client = connect_client(
            self.api_id,
            &self.api_hash,
            &self.session_path,
            self.request_timeout,
        )
        .await?;
        *self
            .client
            .lock()
            .map_err(|_| AppError::Internal("telegram client lock poisoned".to_owned()))? =
            Some(client);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client.lock().map(|c| c.is_some()).unwrap_or(false)
    }

    async fn is_authorized(&self) -> AppResult<bool> {
        let client = self.client()?;
        bounded(self.request_timeout, "is_authorized", client.is_authorized()).await
    }

    async fn get_me(&self) -> AppResult<Identity> {
        let client = self.client()?;
        let me = bounded(self.request_timeout, "get_me", client.get_me()).await?;
        if let Ok(mut id) = self.self_id.lock() {
            *id = Some(me.id());
        }
        Ok(Identity {
            id: me.id(),
            first_name: me.first_name().to_owned(),
            username: me.username().map(str::to_owned),
        })
    }

    async fn send_message(&self, chat: &ChatRef, text: &str) -> AppResult<SentMessage> {
        let client = self.client()?;
        let packed = self.resolve(&client, chat).await?;
        let sent = bounded(
            self.request_timeout,
            "send_message",
            client.send_message(packed, text),
        )
        .await?;
        Ok(SentMessage {
            id: i64::from(sent.id()),
            date: Some(sent.date()),
        })
    }

    async fn get_messages(&self, chat: &ChatRef, limit: usize) -> AppResult<Vec<Message>> {
        let client = self.client()?;
        let packed = self.resolve(&client, chat).await?;
        let mut iter = client.iter_messages(packed).limit(limit);
        let mut messages = Vec::with_capacity(limit);
        while messages.len() < limit {
            match bounded(self.request_timeout, "get_messages", iter.next()).await? {
                Some(msg) => messages.push(self.to_message(&msg)),
                None => break,
            }
        }
        Ok(messages)
    }

    async fn disconnect(&self) {
        let client = match self.client.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(client) = client {
            if let Err(e) = client.session().save_to_file(&self.session_path) {
                warn!("could not save session file: {e}");
            }
            self.chats.lock().await.clear();
        }
    }
}

/// Open an MTProto connection using (or creating) the session file
async fn connect_client(
    api_id: i32,
    api_hash: &SecretString,
    session_path: &PathBuf,
    limit: Duration,
) -> AppResult<Client> {
    let session = Session::load_file_or_create(session_path).map_err(|e| {
        AppError::Internal(format!(
            "cannot open session file {}: {e}",
            session_path.display()
        ))
    })?;

    bounded(
        limit,
        "connect",
        Client::connect(Config {
            session,
            api_id,
            api_hash: api_hash.expose_secret().to_owned(),
            params: InitParams::default(),
        }),
    )
    .await
}

/// Ids a chat may carry for a caller-supplied id
///
/// Accepts the bare id as well as the marked forms used by the Bot API:
/// `-100<id>` for channels and supergroups and `-<id>` for basic groups.
fn bare_chat_ids(id: i64) -> Vec<i64> {
    let mut ids = vec![id];
    if id < 0 {
        let digits = id.unsigned_abs().to_string();
        if let Some(channel) = digits
            .strip_prefix("100")
            .filter(|rest| !rest.is_empty())
            .and_then(|rest| rest.parse::<i64>().ok())
        {
            ids.push(channel);
        }
        if let Some(group) = id.checked_neg() {
            ids.push(group);
        }
    }
    ids
}

/// Compare a profile phone with caller digits, ignoring `+` and separators
fn same_phone(profile: &str, digits: &str) -> bool {
    profile
        .chars()
        .filter(char::is_ascii_digit)
        .eq(digits.chars())
}

/// Read one trimmed line from stdin after printing `prompt`
fn prompt(message: &str) -> AppResult<String> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(message.as_bytes())
        .and_then(|()| stdout.flush())
        .map_err(|e| AppError::Internal(format!("cannot write prompt: {e}")))?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| AppError::Internal(format!("cannot read input: {e}")))?;
    Ok(line.trim().to_owned())
}

async fn prompt_async(message: &'static str) -> AppResult<String> {
    tokio::task::spawn_blocking(move || prompt(message))
        .await
        .map_err(|e| AppError::Internal(format!("prompt task failed: {e}")))?
}

/// One-time interactive login producing the session file
///
/// Connects with the configured application credentials; when the session
/// is not yet authorized, asks for the phone number (unless `TELEGRAM_PHONE`
/// is set), the login code and, for two-factor accounts, the password. The
/// session file is saved on success.
pub async fn authenticate_interactive(config: &ServerConfig) -> AppResult<Identity> {
    let session_path = config.session_path();
    info!("API_ID: {}", config.api_id);
    info!("API_HASH: ****");

    let client = connect_client(
        config.api_id,
        &config.api_hash,
        &session_path,
        config.request_timeout(),
    )
    .await?;
    info!("Connected to Telegram servers");

    let limit = config.request_timeout();
    if bounded(limit, "is_authorized", client.is_authorized()).await? {
        info!("Session already authenticated");
    } else {
        info!("Starting authentication");
        let phone = match &config.phone {
            Some(phone) => phone.expose_secret().to_owned(),
            None => prompt_async("Phone number (with +country code): ").await?,
        };
        if phone.is_empty() {
            return Err(AppError::invalid("phone number is required"));
        }

        let token = bounded(limit, "request_login_code", client.request_login_code(&phone)).await?;
        let code = prompt_async("Verification code: ").await?;

        match client.sign_in(&token, &code).await {
            Ok(_) => {}
            Err(SignInError::PasswordRequired(password_token)) => {
                if let Some(hint) = password_token.hint() {
                    info!("Two-factor password hint: {hint}");
                }
                let password =
                    SecretString::new(prompt_async("Two-factor password: ").await?.into());
                client
                    .check_password(password_token, password.expose_secret().as_bytes())
                    .await
                    .map_err(|e| AppError::transport(format!("password check failed: {e}")))?;
            }
            Err(e) => return Err(AppError::transport(format!("sign in failed: {e}"))),
        }
    }

    client.session().save_to_file(&session_path).map_err(|e| {
        AppError::Internal(format!(
            "cannot save session file {}: {e}",
            session_path.display()
        ))
    })?;

    let me = bounded(limit, "get_me", client.get_me()).await?;
    let identity = Identity {
        id: me.id(),
        first_name: me.first_name().to_owned(),
        username: me.username().map(str::to_owned),
    };
    info!(
        "Logged in as: {} (@{})",
        identity.first_name,
        identity.username.as_deref().unwrap_or("-")
    );
    info!("Session saved to: {}", session_path.display());
    Ok(identity)
}
