//! Webhook delivery payloads
//!
//! Only the fields the bot reads are modelled; everything is defaulted so
//! unexpected shapes still deserialize.

use crate::sender::{MessageEvent, SenderId};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// `object` values carrying chat messages
const MESSAGING_OBJECTS: &[&str] = &["page", "instagram"];

/// Top-level webhook delivery body
#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    /// Subscription object type
    #[serde(default)]
    pub object: String,
    /// Batched entries
    #[serde(default)]
    pub entry: Vec<Entry>,
}

/// One entry of a delivery
#[derive(Debug, Default, Deserialize)]
pub struct Entry {
    /// Messaging records in this entry
    #[serde(default)]
    pub messaging: Vec<MessagingRecord>,
}

/// A messaging record (message, delivery receipt, postback, ...)
#[derive(Debug, Default, Deserialize)]
pub struct MessagingRecord {
    /// Who triggered the record
    pub sender: Option<Participant>,
    /// Present for message records only
    pub message: Option<InboundMessage>,
}

/// Sender or recipient reference
#[derive(Debug, Deserialize)]
pub struct Participant {
    /// Platform-scoped id
    pub id: String,
}

/// Message body of a messaging record
#[derive(Debug, Default, Deserialize)]
pub struct InboundMessage {
    /// Text, absent for attachments
    pub text: Option<String>,
    /// Set when the page itself sent the message
    #[serde(default)]
    pub is_echo: bool,
}

impl WebhookPayload {
    /// Whether this delivery carries chat messages
    #[must_use]
    pub fn is_messaging(&self) -> bool {
        MESSAGING_OBJECTS.contains(&self.object.as_str())
    }

    /// Message events in delivery order, all stamped with `received_at`
    ///
    /// Non-message records and echoes of the page's own messages are skipped.
    /// A message without text still yields an event (with `text: None`).
    #[must_use]
    pub fn into_events(self, received_at: DateTime<Utc>) -> Vec<MessageEvent> {
        if !self.is_messaging() {
            return Vec::new();
        }

        self.entry
            .into_iter()
            .flat_map(|entry| entry.messaging)
            .filter_map(|record| {
                let sender = record.sender?;
                let message = record.message?;
                if message.is_echo {
                    return None;
                }
                Some(MessageEvent {
                    sender: SenderId::new(sender.id),
                    text: message.text,
                    received_at,
                })
            })
            .collect()
    }
}
