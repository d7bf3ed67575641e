//! Webhook HTTP server
//!
//! `GET /webhook` answers the subscription handshake, `POST /webhook` accepts
//! message deliveries. Deliveries are always acknowledged with 200 so the
//! platform never redelivers. Events are processed in background tasks, one
//! per sender in the delivery, so a slow transfer for one sender never holds
//! up another while each sender's messages keep their order.

use crate::bot::EventHandler;
use crate::sender::{MessageEvent, SenderId};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Delivery payload types
pub mod payload;

pub use payload::WebhookPayload;

/// Body returned for every delivery
pub const ACK_BODY: &str = "EVENT_RECEIVED";

/// How long shutdown waits for in-flight events before dropping them
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Shared state for the webhook routes
#[derive(Clone)]
pub struct AppState {
    handler: Arc<EventHandler>,
    verify_token: Arc<str>,
    tasks: TaskTracker,
}

impl AppState {
    /// Bundle the event handler with the handshake secret
    #[must_use]
    pub fn new(handler: Arc<EventHandler>, verify_token: impl Into<Arc<str>>) -> Self {
        Self {
            handler,
            verify_token: verify_token.into(),
            tasks: TaskTracker::new(),
        }
    }

    /// Background event tasks spawned by this state
    #[must_use]
    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }
}

/// Query parameters of the subscription handshake
#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    /// Expected to be `subscribe`
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    /// Must equal the configured verify token
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    /// Echoed back on success
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Build the webhook router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", get(verify).post(receive))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the router until Ctrl-C
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    serve_with_shutdown(listener, state, shutdown_signal(), SHUTDOWN_GRACE).await
}

/// Serve the router until `signal` resolves, then wait up to `grace` for
/// in-flight events
///
/// Events still running after `grace` are dropped with the runtime, which
/// also removes their temporary files.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve_with_shutdown(
    listener: TcpListener,
    state: AppState,
    signal: impl Future<Output = ()> + Send + 'static,
    grace: Duration,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let tasks = state.tasks.clone();
    info!(%addr, "Webhook server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(signal)
        .await?;

    tasks.close();
    info!(pending = tasks.len(), "Waiting for in-flight events");
    if tokio::time::timeout(grace, tasks.wait()).await.is_err() {
        warn!(pending = tasks.len(), "Shutdown grace elapsed, dropping in-flight events");
    }

    info!("Webhook server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn verify(State(state): State<AppState>, Query(params): Query<VerifyParams>) -> Response {
    let token_matches = params.verify_token.as_deref() == Some(&*state.verify_token);
    if params.mode.as_deref() == Some("subscribe") && token_matches {
        info!("Webhook verified");
        return (StatusCode::OK, params.challenge.unwrap_or_default()).into_response();
    }

    warn!(mode = ?params.mode, "Webhook verification failed");
    (StatusCode::FORBIDDEN, "Verification failed").into_response()
}

async fn receive(State(state): State<AppState>, body: Bytes) -> (StatusCode, &'static str) {
    let received_at = Utc::now();

    match serde_json::from_slice::<WebhookPayload>(&body) {
        Ok(payload) => {
            if !payload.is_messaging() {
                debug!(object = %payload.object, "Ignoring non-messaging delivery");
            }
            let events = payload.into_events(received_at);
            if !events.is_empty() {
                spawn_events(&state, events);
            }
        }
        Err(e) => warn!(error = %e, "Malformed webhook body"),
    }

    (StatusCode::OK, ACK_BODY)
}

/// Split a delivery into per-sender batches, keeping arrival order within each
fn batch_by_sender(events: Vec<MessageEvent>) -> Vec<Vec<MessageEvent>> {
    let mut batches: Vec<(SenderId, Vec<MessageEvent>)> = Vec::new();
    for event in events {
        match batches.iter_mut().find(|(sender, _)| *sender == event.sender) {
            Some((_, batch)) => batch.push(event),
            None => batches.push((event.sender.clone(), vec![event])),
        }
    }
    batches.into_iter().map(|(_, batch)| batch).collect()
}

/// Handle each sender's events on its own tracked task
fn spawn_events(state: &AppState, events: Vec<MessageEvent>) {
    let batches = batch_by_sender(events);
    debug!(senders = batches.len(), "Dispatching message events");

    for batch in batches {
        let handler = Arc::clone(&state.handler);
        state.tasks.spawn(async move {
            for event in batch {
                let outcome = handler.handle(event).await;
                debug!(?outcome, "Event handled");
            }
        });
    }
}

async fn health() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(sender: &str, text: &str) -> MessageEvent {
        MessageEvent {
            sender: SenderId::new(sender),
            text: Some(text.to_string()),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn test_batches_keep_per_sender_order() {
        let batches = batch_by_sender(vec![
            event("a", "1"),
            event("b", "1"),
            event("a", "2"),
            event("c", "1"),
            event("b", "2"),
        ]);

        let shape: Vec<Vec<(String, String)>> = batches
            .iter()
            .map(|batch| {
                batch
                    .iter()
                    .map(|e| (e.sender.to_string(), e.text.clone().unwrap_or_default()))
                    .collect()
            })
            .collect();
        let pair = |s: &str, t: &str| (s.to_string(), t.to_string());
        assert_eq!(
            shape,
            vec![
                vec![pair("a", "1"), pair("a", "2")],
                vec![pair("b", "1"), pair("b", "2")],
                vec![pair("c", "1")],
            ]
        );
    }
}
