//! Request and response DTOs for the HTTP surface
//!
//! Request fields are deliberately loose (`serde_json::Value` for ids and
//! text) so that a missing or empty field is reported as a 400 with the
//! documented message instead of a generic deserialization failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat_ref::ChatRef;
use crate::errors::{AppError, AppResult};
use crate::transport::Message;
use crate::waiter::WaitOutcome;

/// Largest `limit` accepted by `get_last_message`
pub const MAX_FETCH_LIMIT: i64 = 100;

/// Default wait in seconds when `timeout` is omitted
pub const DEFAULT_WAIT_SECONDS: f64 = 30.0;

/// Input: `POST /send_telegram`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendRequest {
    /// Target conversation (number or string form)
    pub chat_id: Option<Value>,
    /// Text to send; numbers are sent in their decimal form
    pub message: Option<Value>,
}

impl SendRequest {
    /// Validate into a chat reference and message text
    ///
    /// # Errors
    ///
    /// `InvalidInput("Missing chat_id or message")` when either is absent or
    /// empty, or the chat reference error when `chat_id` is malformed.
    pub fn into_parts(self) -> AppResult<(ChatRef, String)> {
        let chat = ChatRef::from_json(self.chat_id.as_ref())?;
        let text = message_text(self.message.as_ref())?;
        match (chat, text) {
            (Some(chat), Some(text)) => Ok((chat, text)),
            _ => Err(AppError::invalid("Missing chat_id or message")),
        }
    }
}

/// Input: `POST /get_last_message`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetLastMessageRequest {
    pub chat_id: Option<Value>,
    /// Messages to fetch (1..100, default 1); the newest is returned
    pub limit: Option<i64>,
}

impl GetLastMessageRequest {
    pub fn into_parts(self) -> AppResult<(ChatRef, usize)> {
        let chat = require_chat(self.chat_id.as_ref())?;
        let limit = self.limit.unwrap_or(1).clamp(1, MAX_FETCH_LIMIT);
        Ok((chat, usize::try_from(limit).unwrap_or(1)))
    }
}

/// Input: `POST /wait_for_response`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WaitRequest {
    pub chat_id: Option<Value>,
    /// Watermark; only messages with a higher id qualify (default 0)
    pub after_message_id: Option<i64>,
    /// Seconds to wait, fractions allowed (default 30)
    pub timeout: Option<f64>,
}

impl WaitRequest {
    pub fn into_parts(self) -> AppResult<(ChatRef, i64, f64)> {
        let chat = require_chat(self.chat_id.as_ref())?;
        Ok((
            chat,
            self.after_message_id.unwrap_or(0),
            self.timeout.unwrap_or(DEFAULT_WAIT_SECONDS),
        ))
    }
}

fn require_chat(value: Option<&Value>) -> AppResult<ChatRef> {
    ChatRef::from_json(value)?.ok_or_else(|| AppError::invalid("Missing chat_id"))
}

/// Message text from a JSON scalar; `None` when absent or empty
fn message_text(value: Option<&Value>) -> AppResult<Option<String>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(_) => Err(AppError::invalid("message must be a string")),
    }
}

/// Output: `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub authenticated: bool,
    pub connected: bool,
    /// Username of the authorized identity
    pub user: Option<String>,
    pub version: String,
}

/// Output: `GET /info`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InfoResponse {
    pub service: String,
    pub version: String,
    pub endpoints: Vec<String>,
}

/// Output: `POST /send_telegram`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendResponse {
    pub success: bool,
    pub message_id: i64,
    /// RFC 3339 send time
    pub timestamp: String,
}

/// Output: `POST /get_last_message`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum LastMessageResponse {
    Found {
        success: bool,
        message_id: i64,
        sender_id: Option<i64>,
        text: Option<String>,
        date: Option<String>,
    },
    Empty {
        success: bool,
        text: Option<String>,
    },
}

impl LastMessageResponse {
    pub fn from_newest(messages: &[Message]) -> Self {
        match messages.first() {
            Some(m) => Self::Found {
                success: true,
                message_id: m.id,
                sender_id: m.sender_id,
                text: m.text.clone(),
                date: m.date.as_ref().map(format_timestamp),
            },
            None => Self::Empty {
                success: false,
                text: None,
            },
        }
    }
}

/// Output: `POST /wait_for_response`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum WaitResponse {
    Found {
        success: bool,
        message_id: i64,
        text: Option<String>,
        sender_id: Option<i64>,
    },
    Timeout {
        success: bool,
        message: String,
    },
}

impl From<WaitOutcome> for WaitResponse {
    fn from(outcome: WaitOutcome) -> Self {
        match outcome {
            WaitOutcome::Found {
                message_id,
                text,
                sender_id,
            } => Self::Found {
                success: true,
                message_id,
                text,
                sender_id,
            },
            WaitOutcome::TimedOut => Self::Timeout {
                success: false,
                message: "Timeout".to_owned(),
            },
        }
    }
}

/// RFC 3339 with an explicit `+00:00` offset
pub fn format_timestamp(date: &DateTime<Utc>) -> String {
    date.to_rfc3339()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{
        GetLastMessageRequest, LastMessageResponse, SendRequest, WaitRequest, WaitResponse,
        format_timestamp,
    };
    use crate::chat_ref::ChatRef;
    use crate::waiter::WaitOutcome;

    #[test]
    fn send_request_requires_both_fields() {
        for body in [
            json!({}),
            json!({"chat_id": "123"}),
            json!({"message": "hi"}),
            json!({"chat_id": "", "message": "hi"}),
            json!({"chat_id": 123, "message": ""}),
        ] {
            let req: SendRequest = serde_json::from_value(body.clone()).expect("deserialize");
            let err = req.into_parts().expect_err("must fail");
            assert_eq!(err.to_string(), "Missing chat_id or message", "{body}");
        }
    }

    #[test]
    fn send_request_stringifies_numeric_messages() {
        let req: SendRequest =
            serde_json::from_value(json!({"chat_id": 5, "message": 42})).expect("deserialize");
        let (chat, text) = req.into_parts().expect("valid");
        assert_eq!(chat, ChatRef::Id(5));
        assert_eq!(text, "42");
    }

    #[test]
    fn get_last_message_defaults_and_clamps_limit() {
        let req: GetLastMessageRequest =
            serde_json::from_value(json!({"chat_id": "@someone"})).expect("deserialize");
        assert_eq!(req.into_parts().expect("valid").1, 1);

        let req: GetLastMessageRequest =
            serde_json::from_value(json!({"chat_id": 1, "limit": 1000})).expect("deserialize");
        assert_eq!(req.into_parts().expect("valid").1, 100);

        let req: GetLastMessageRequest =
            serde_json::from_value(json!({"chat_id": 1, "limit": -4})).expect("deserialize");
        assert_eq!(req.into_parts().expect("valid").1, 1);
    }

    #[test]
    fn wait_request_defaults() {
        let req: WaitRequest = serde_json::from_value(json!({"chat_id": "123"})).expect("deserialize");
        let (chat, after, timeout) = req.into_parts().expect("valid");
        assert_eq!(chat, ChatRef::Id(123));
        assert_eq!(after, 0);
        assert_eq!(timeout, 30.0);

        let req: WaitRequest = serde_json::from_value(json!({"timeout": 2})).expect("deserialize");
        assert_eq!(req.into_parts().expect_err("must fail").to_string(), "Missing chat_id");
    }

    #[test]
    fn response_shapes_match_the_wire_format() {
        assert_eq!(
            serde_json::to_value(LastMessageResponse::from_newest(&[])).expect("serialize"),
            json!({"success": false, "text": null})
        );
        assert_eq!(
            serde_json::to_value(WaitResponse::from(WaitOutcome::TimedOut)).expect("serialize"),
            json!({"success": false, "message": "Timeout"})
        );
    }

    #[test]
    fn timestamps_use_explicit_utc_offset() {
        let date = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).single().expect("date");
        assert_eq!(format_timestamp(&date), "2025-01-02T03:04:05+00:00");
    }
}
