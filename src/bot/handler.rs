//! Per-event orchestration
//!
//! Runs the admission checks in fixed order (rate limit, follower gate), then
//! the media pipeline (extract, fetch, publish), and answers the sender exactly
//! once. Nothing escapes [`EventHandler::handle`]: every failure becomes a
//! canned reply plus a log line.

use super::messages;
use super::reply::{GraphApiDispatcher, ReplyDispatcher};
use crate::config::Settings;
use crate::gate::{is_confirmation_phrase, FollowerGate, RateLimiter};
use crate::media::{
    extract_reel_url, AnonymousFileHost, HttpMediaFetcher, MediaFetcher, MediaReference,
    RehostedLink, Rehoster,
};
use crate::sender::{MessageEvent, SenderId};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Branch taken for one inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The event carried no text; nothing was sent
    Ignored,
    /// Rate limit exceeded
    Throttled,
    /// Unconfirmed sender asked to follow first
    Prompted,
    /// Sender just confirmed
    Confirmed,
    /// Confirmed sender without a reel link got the help text
    Help,
    /// Media rehosted and the link delivered
    Delivered(RehostedLink),
    /// Page or media retrieval failed
    FetchFailed,
    /// Upload to the file host failed
    PublishFailed,
}

/// Handles inbound chat events end to end
pub struct EventHandler {
    limiter: RateLimiter,
    gate: FollowerGate,
    fetcher: Arc<dyn MediaFetcher>,
    rehoster: Arc<dyn Rehoster>,
    replies: Arc<dyn ReplyDispatcher>,
}

impl EventHandler {
    /// Assemble a handler from its collaborators
    #[must_use]
    pub fn new(
        limiter: RateLimiter,
        gate: FollowerGate,
        fetcher: Arc<dyn MediaFetcher>,
        rehoster: Arc<dyn Rehoster>,
        replies: Arc<dyn ReplyDispatcher>,
    ) -> Self {
        Self {
            limiter,
            gate,
            fetcher,
            rehoster,
            replies,
        }
    }

    /// Build the production handler: HTTP fetcher, file host and Send API
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            RateLimiter::new(settings.rate_window(), settings.rate_max_messages),
            FollowerGate::new(),
            Arc::new(HttpMediaFetcher::new(settings)),
            Arc::new(AnonymousFileHost::new(settings)),
            Arc::new(GraphApiDispatcher::new(settings)),
        )
    }

    /// Follower state shared by this handler
    #[must_use]
    pub const fn gate(&self) -> &FollowerGate {
        &self.gate
    }

    /// Process one inbound event and reply to its sender
    #[instrument(skip_all, fields(sender = %event.sender))]
    pub async fn handle(&self, event: MessageEvent) -> Outcome {
        let Some(text) = event.text() else {
            debug!("Event without text ignored");
            return Outcome::Ignored;
        };
        let sender = &event.sender;

        if !self.limiter.allow(sender, event.received_at).await {
            info!("Rate limit hit");
            self.reply(sender, messages::THROTTLED).await;
            return Outcome::Throttled;
        }

        if !self.gate.is_confirmed(sender).await {
            if is_confirmation_phrase(text) {
                self.gate.confirm(sender).await;
                self.reply(sender, messages::FOLLOW_THANKS).await;
                return Outcome::Confirmed;
            }
            self.reply(sender, messages::FOLLOW_PROMPT).await;
            return Outcome::Prompted;
        }

        match extract_reel_url(text) {
            Some(reference) => self.process_reel(sender, &reference).await,
            None => {
                self.reply(sender, messages::HELP).await;
                Outcome::Help
            }
        }
    }

    async fn process_reel(&self, sender: &SenderId, reference: &MediaReference) -> Outcome {
        info!(reel = %reference, "Processing reel");

        let asset = match self.fetcher.fetch(reference).await {
            Ok(asset) => asset,
            Err(e) => {
                warn!(reel = %reference, error = %e, "Failed to retrieve reel");
                self.reply(sender, messages::DOWNLOAD_FAILED).await;
                return Outcome::FetchFailed;
            }
        };

        let published = self.rehoster.publish(&asset).await;
        asset.discard();

        match published {
            Ok(link) => {
                self.reply(sender, &messages::video_link(&link)).await;
                Outcome::Delivered(link)
            }
            Err(e) => {
                warn!(reel = %reference, error = %e, "Failed to rehost reel");
                self.reply(sender, messages::UPLOAD_FAILED).await;
                Outcome::PublishFailed
            }
        }
    }

    async fn reply(&self, recipient: &SenderId, text: &str) {
        if let Err(e) = self.replies.send(recipient, text).await {
            error!(recipient = %recipient, error = %e, "Failed to send reply");
        }
    }
}
