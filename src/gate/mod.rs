//! Admission checks run before any media work
//!
//! Every inbound event first passes the [`RateLimiter`], then the
//! [`FollowerGate`].

/// One-way follower confirmation
pub mod follower;
/// Sliding-window rate limiting
pub mod rate_limit;

pub use follower::{is_confirmation_phrase, FollowerGate, CONFIRMATION_PHRASES};
pub use rate_limit::RateLimiter;
