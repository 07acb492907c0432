//! Configuration for the Telegram session and HTTP server
//!
//! All configuration is loaded from environment variables. The MTProto
//! application credentials keep their conventional `TELEGRAM_API_*` names;
//! everything owned by this service uses the `TELEGRAM_SENDER_` prefix.

use std::env;
use std::env::VarError;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::errors::{AppError, AppResult};
use crate::waiter::PollSettings;

/// Server-wide configuration
///
/// Shared with the HTTP handlers through the application state. The API hash
/// is stored using `SecretString` to prevent accidental logging.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// MTProto application id from my.telegram.org
    pub api_id: i32,
    /// MTProto application hash
    pub api_hash: SecretString,
    /// Session file stem; the file on disk is `<session_name>.session`
    pub session_name: String,
    /// Address the HTTP listener binds to
    pub host: String,
    /// Port the HTTP listener binds to
    pub port: u16,
    /// Sleep between two poll cycles of a wait, in milliseconds
    pub poll_interval_ms: u64,
    /// Number of recent messages fetched per poll cycle
    pub poll_batch_size: usize,
    /// Upper bound applied to a caller-supplied wait timeout, in seconds
    pub max_wait_seconds: u64,
    /// Bound on every single remote call, in milliseconds
    pub request_timeout_ms: u64,
    /// Phone number used by the interactive login instead of prompting
    pub phone: Option<SecretString>,
}

impl ServerConfig {
    /// Load all configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if required environment variables are missing
    /// or malformed.
    ///
    /// # Example Environment
    ///
    /// ```text
    /// TELEGRAM_API_ID=123456
    /// TELEGRAM_API_HASH=0123456789abcdef0123456789abcdef
    /// TELEGRAM_SENDER_SESSION_NAME=telegram_session
    /// TELEGRAM_SENDER_PORT=5001
    /// ```
    pub fn load_from_env() -> AppResult<Self> {
        let api_id = parse_value::<i32>("TELEGRAM_API_ID", &required_env("TELEGRAM_API_ID")?)?;
        let api_hash = required_env("TELEGRAM_API_HASH")?;

        let session_name = optional_env("TELEGRAM_SENDER_SESSION_NAME")?
            .unwrap_or_else(|| "telegram_session".to_owned());
        validate_session_name(&session_name)?;

        let poll_interval_ms = parse_env("TELEGRAM_SENDER_POLL_INTERVAL_MS", 1_000_u64)?;
        let poll_batch_size = parse_env("TELEGRAM_SENDER_POLL_BATCH_SIZE", 5_usize)?;
        validate_poll(poll_interval_ms, poll_batch_size)?;

        Ok(Self {
            api_id,
            api_hash: SecretString::new(api_hash.into()),
            session_name,
            host: optional_env("TELEGRAM_SENDER_HOST")?.unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: parse_env("TELEGRAM_SENDER_PORT", 5001)?,
            poll_interval_ms,
            poll_batch_size,
            max_wait_seconds: parse_env("TELEGRAM_SENDER_MAX_WAIT_SECONDS", 300)?,
            request_timeout_ms: parse_env("TELEGRAM_SENDER_REQUEST_TIMEOUT_MS", 30_000)?,
            phone: optional_env("TELEGRAM_PHONE")?.map(|p| SecretString::new(p.into())),
        })
    }

    /// Path of the durable session credential file
    pub fn session_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.session", self.session_name))
    }

    /// `host:port` string for the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Poll cadence handed to the response waiter
    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(self.poll_interval_ms),
            batch_size: self.poll_batch_size,
            max_timeout: Duration::from_secs(self.max_wait_seconds),
        }
    }
}

/// Both poll knobs must be non-zero
fn validate_poll(interval_ms: u64, batch_size: usize) -> AppResult<()> {
    if interval_ms == 0 {
        return Err(AppError::invalid(
            "TELEGRAM_SENDER_POLL_INTERVAL_MS must be at least 1",
        ));
    }
    if batch_size == 0 {
        return Err(AppError::invalid(
            "TELEGRAM_SENDER_POLL_BATCH_SIZE must be at least 1",
        ));
    }
    Ok(())
}

/// Session names become file names, so path separators are rejected
fn validate_session_name(name: &str) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::invalid(
            "TELEGRAM_SENDER_SESSION_NAME must not be empty",
        ));
    }
    if name.contains(['/', '\\']) || name.chars().any(|ch| ch.is_ascii_control()) {
        return Err(AppError::invalid(format!(
            "TELEGRAM_SENDER_SESSION_NAME contains invalid characters: '{name}'"
        )));
    }
    Ok(())
}

/// Read a required environment variable, returning error if missing or empty
fn required_env(key: &str) -> AppResult<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_owned()),
        _ => Err(AppError::InvalidInput(format!(
            "missing required environment variable {key}"
        ))),
    }
}

/// Read an optional environment variable, treating blank values as unset
fn optional_env(key: &str) -> AppResult<Option<String>> {
    match env::var(key) {
        Ok(v) if v.trim().is_empty() => Ok(None),
        Ok(v) => Ok(Some(v.trim().to_owned())),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

/// Parse a numeric environment variable with default fallback
///
/// Returns `default` if unset.
///
/// # Errors
///
/// Returns `InvalidInput` if the variable is set but does not parse.
fn parse_env<T: FromStr>(key: &str, default: T) -> AppResult<T> {
    match optional_env(key)? {
        Some(v) => parse_value(key, &v),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> AppResult<T> {
    raw.trim().parse::<T>().map_err(|_| {
        AppError::InvalidInput(format!(
            "invalid {} environment variable {key}: '{raw}'",
            short_type_name::<T>()
        ))
    })
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}
