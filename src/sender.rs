//! Sender identity and inbound message events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque sender identifier assigned by the messaging platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SenderId(String);

impl SenderId {
    /// Wrap a raw platform id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw platform id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SenderId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A single inbound chat message, stamped on receipt
#[derive(Debug, Clone)]
pub struct MessageEvent {
    /// Who sent the message
    pub sender: SenderId,
    /// Message text; `None` for attachments, stickers and the like
    pub text: Option<String>,
    /// When the webhook delivery carrying this message arrived
    pub received_at: DateTime<Utc>,
}

impl MessageEvent {
    /// Create an event stamped with the current time
    #[must_use]
    pub fn now(sender: SenderId, text: Option<String>) -> Self {
        Self {
            sender,
            text,
            received_at: Utc::now(),
        }
    }

    /// Text of the message if present and non-empty
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }
}
