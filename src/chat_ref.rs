//! Conversation reference parsing
//!
//! Callers address a conversation either by numeric id or by a string form:
//! a decimal id, an international phone number (`+15551234567`), a username
//! (`name`, `@name`), a `t.me` link, or the self chat (`me` / `self`). Everything is normalized into [`ChatRef`] before it reaches
//! the session.

use std::fmt;

use regex::Regex;
use serde_json::Value;

use crate::errors::{AppError, AppResult};

/// Normalized conversation reference
///
/// # Example
///
/// ```text
/// 123456789          -> ChatRef::Id(123456789)
/// "-1001234567890"   -> ChatRef::Id(-1001234567890)
/// "+15551234567"     -> ChatRef::Phone("15551234567")
/// "@durov"           -> ChatRef::Username("durov")
/// "https://t.me/foo" -> ChatRef::Username("foo")
/// "me"               -> ChatRef::SelfChat
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChatRef {
    /// Numeric id, bare or in marked (`-100…`) form
    Id(i64),
    /// Contact phone number, digits only
    Phone(String),
    /// Public username without the leading `@`
    Username(String),
    /// The account's own "Saved Messages" chat
    SelfChat,
}

impl ChatRef {
    /// Parse a `chat_id` field from a JSON request body
    ///
    /// Returns `Ok(None)` when the value counts as missing: absent, `null`,
    /// empty string, or `0` (as a number or a string).
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for values that are present but cannot name a
    /// conversation (booleans, objects, fractional numbers, garbage strings).
    pub fn from_json(value: Option<&Value>) -> AppResult<Option<Self>> {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => match n.as_i64() {
                Some(0) => Ok(None),
                Some(id) => Ok(Some(Self::Id(id))),
                None => Err(AppError::invalid(format!("invalid chat_id '{n}'"))),
            },
            Some(Value::String(s)) if s.trim().is_empty() || s.trim().parse::<i64>() == Ok(0) => {
                Ok(None)
            }
            Some(Value::String(s)) => Self::parse(s).map(Some),
            Some(_) => Err(AppError::invalid(
                "chat_id must be a number or a string",
            )),
        }
    }

    /// Parse the string form of a conversation reference
    pub fn parse(raw: &str) -> AppResult<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("me") || raw.eq_ignore_ascii_case("self") {
            return Ok(Self::SelfChat);
        }
        if let Some(digits) = raw.strip_prefix('+') {
            let phone_pattern = Regex::new(r"^[0-9]{7,15}$")
                .map_err(|e| AppError::Internal(format!("invalid phone regex: {e}")))?;
            if phone_pattern.is_match(digits) {
                return Ok(Self::Phone(digits.to_owned()));
            }
            return Err(AppError::invalid(format!("invalid chat_id '{raw}'")));
        }
        if let Ok(id) = raw.parse::<i64>() {
            if id == 0 {
                return Err(AppError::invalid("chat_id must not be 0"));
            }
            return Ok(Self::Id(id));
        }

        let username_pattern = Regex::new(r"^@?([A-Za-z][A-Za-z0-9_]{3,31})$")
            .map_err(|e| AppError::Internal(format!("invalid username regex: {e}")))?;
        let link_pattern = Regex::new(
            r"^(?:https?://)?(?:www\.)?(?:t|telegram)\.me/([A-Za-z][A-Za-z0-9_]{3,31})/?$",
        )
        .map_err(|e| AppError::Internal(format!("invalid link regex: {e}")))?;

        username_pattern
            .captures(raw)
            .or_else(|| link_pattern.captures(raw))
            .and_then(|c| c.get(1))
            .map(|m| Self::Username(m.as_str().to_owned()))
            .ok_or_else(|| AppError::invalid(format!("invalid chat_id '{raw}'")))
    }
}

impl fmt::Display for ChatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Phone(digits) => write!(f, "+{digits}"),
            Self::Username(name) => write!(f, "@{name}"),
            Self::SelfChat => f.write_str("me"),
        }
    }
}
