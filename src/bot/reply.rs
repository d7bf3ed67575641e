//! Outbound replies through the messaging platform Send API

use crate::config::{RetryPolicy, Settings};
use crate::sender::SenderId;
use crate::utils::{
    create_http_client, is_transient_status, retry_operation, truncate_str, LOGGED_BODY_LIMIT,
};
use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

/// Errors produced while sending a reply
#[derive(Debug, Error)]
pub enum ReplyError {
    /// Connection error or timeout
    #[error("network error: {0}")]
    Network(String),
    /// The Send API answered with a non-success status
    #[error("send API rejected reply: HTTP {status} - {body}")]
    Rejected {
        /// Response status code
        status: StatusCode,
        /// Truncated response body
        body: String,
    },
}

impl ReplyError {
    /// Whether another attempt may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Rejected { status, .. } => is_transient_status(*status),
        }
    }
}

impl From<reqwest::Error> for ReplyError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

/// Sends text replies to senders
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReplyDispatcher: Send + Sync {
    /// Deliver `text` to `recipient`
    async fn send(&self, recipient: &SenderId, text: &str) -> Result<(), ReplyError>;
}

/// [`ReplyDispatcher`] posting to `<graph api>/me/messages`
pub struct GraphApiDispatcher {
    client: HttpClient,
    endpoint: String,
    access_token: String,
    retry: RetryPolicy,
}

impl GraphApiDispatcher {
    /// Create a dispatcher from application settings
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: create_http_client(settings.http_timeout(), &settings.user_agent),
            endpoint: format!("{}/me/messages", settings.graph_api_base.trim_end_matches('/')),
            access_token: settings.page_access_token.clone(),
            retry: settings.reply_retry(),
        }
    }

    /// Override the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn post(&self, body: &serde_json::Value) -> Result<(), ReplyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("access_token", self.access_token.as_str())])
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let text = truncate_str(text.trim(), LOGGED_BODY_LIMIT);

        if !status.is_success() {
            return Err(ReplyError::Rejected { status, body: text });
        }
        debug!(status = %status, body = %text, "Send API response");
        Ok(())
    }
}

#[async_trait]
impl ReplyDispatcher for GraphApiDispatcher {
    async fn send(&self, recipient: &SenderId, text: &str) -> Result<(), ReplyError> {
        let body = json!({
            "recipient": { "id": recipient.as_str() },
            "message": { "text": text },
        });

        retry_operation(
            "reply send",
            self.retry,
            || self.post(&body),
            ReplyError::is_transient,
        )
        .await?;

        info!(recipient = %recipient, "Sent reply");
        Ok(())
    }
}
