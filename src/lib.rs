//! Reel relay bot
//!
//! Webhook-driven chat bot that rate-limits senders, asks them to confirm they
//! follow the account, then turns Instagram reel links into rehosted video links.

/// Message handling and replies
pub mod bot;
/// Configuration and settings management
pub mod config;
/// Admission checks
pub mod gate;
/// Media retrieval pipeline
pub mod media;
/// Sender identity and inbound events
pub mod sender;
/// Shared helpers
pub mod utils;
/// Webhook HTTP server
pub mod web;
