//! Content moderation
//!
//! Client for the external moderation service, the bounded poll over its
//! asynchronous tasks, and the policy turning results into decisions.

pub mod client;
pub mod policy;
pub mod poll;

pub use client::{
    HttpModerationClient, ModerationError, ModerationLabel, ModerationQuery, ModerationService,
    RiskLevel,
};
pub use policy::ModerationPolicy;
pub use poll::{poll_until_terminal, PollOutcome, PollSettings};
