//! Backend-neutral reply types: chat messages, the reply error taxonomy, and the trait the
//! webhook dispatcher calls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One message sent to the conversational backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub content: String,
    pub role: Role,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            role: Role::User,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            role: Role::Assistant,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            role: Role::System,
        }
    }
}

/// Why a reply could not be produced.
///
/// `Request`, `Timeout` and `Status` are transport-level failures; `EmptyReply` means the
/// backend answered successfully but with no text.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("chatbase request failed: {0}")]
    Request(reqwest::Error),
    #[error("chatbase request timed out")]
    Timeout,
    #[error("chatbase api error: {status} {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("chatbase returned an empty reply")]
    EmptyReply,
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BackendError::Timeout
        } else {
            BackendError::Request(e)
        }
    }
}

impl BackendError {
    /// True when the same request may succeed if sent again.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Timeout => true,
            BackendError::Request(e) => e.is_connect() || e.is_timeout(),
            BackendError::Status { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            BackendError::EmptyReply => false,
        }
    }
}

/// A service that turns an ordered conversation into one reply string.
#[async_trait]
pub trait ReplyBackend: Send + Sync {
    async fn request_reply(&self, messages: Vec<ChatMessage>) -> Result<String, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_serializes_lowercase_role() {
        let v = serde_json::to_value(ChatMessage::user("hi")).expect("serialize");
        assert_eq!(v, serde_json::json!({ "content": "hi", "role": "user" }));
        let v = serde_json::to_value(ChatMessage::system("be brief")).expect("serialize");
        assert_eq!(v["role"], "system");
        assert_eq!(ChatMessage::assistant("ok").role, Role::Assistant);
    }

    #[test]
    fn retryable_classification() {
        assert!(BackendError::Timeout.is_retryable());
        assert!(!BackendError::EmptyReply.is_retryable());
        assert!(BackendError::Status {
            status: reqwest::StatusCode::BAD_GATEWAY,
            body: String::new(),
        }
        .is_retryable());
        assert!(BackendError::Status {
            status: reqwest::StatusCode::TOO_MANY_REQUESTS,
            body: String::new(),
        }
        .is_retryable());
        assert!(!BackendError::Status {
            status: reqwest::StatusCode::UNAUTHORIZED,
            body: "bad key".to_string(),
        }
        .is_retryable());
    }
}
