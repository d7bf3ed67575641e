//! One-way follower confirmation

use crate::sender::SenderId;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Replies that count as "I followed the account" (compared lowercased and trimmed)
pub const CONFIRMATION_PHRASES: &[&str] = &["i follow", "followed", "done"];

/// Returns `true` if `text` is one of the accepted confirmation phrases
///
/// # Examples
///
/// ```
/// use reel_relay::gate::is_confirmation_phrase;
///
/// assert!(is_confirmation_phrase("I FOLLOW "));
/// assert!(!is_confirmation_phrase("hello"));
/// ```
#[must_use]
pub fn is_confirmation_phrase(text: &str) -> bool {
    let normalized = text.trim().to_lowercase();
    CONFIRMATION_PHRASES.contains(&normalized.as_str())
}

/// Set of senders that confirmed they follow the account
///
/// Membership is never revoked for the life of the process.
#[derive(Clone, Default)]
pub struct FollowerGate {
    confirmed: Arc<RwLock<HashSet<SenderId>>>,
}

impl FollowerGate {
    /// Creates an empty gate
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `sender` has confirmed before
    pub async fn is_confirmed(&self, sender: &SenderId) -> bool {
        self.confirmed.read().await.contains(sender)
    }

    /// Marks `sender` as confirmed. Confirming twice is a no-op.
    pub async fn confirm(&self, sender: &SenderId) {
        if self.confirmed.write().await.insert(sender.clone()) {
            info!(sender = %sender, "Sender confirmed as follower");
        }
    }

    /// Number of confirmed senders
    pub async fn confirmed_count(&self) -> usize {
        self.confirmed.read().await.len()
    }
}
