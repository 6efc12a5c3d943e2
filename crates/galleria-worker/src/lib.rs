//! Galleria review pipeline
//!
//! - `ReviewQueue`: bounded in-memory queue backed by a durable overflow store
//! - `ModerationWorker`: tick-driven scheduler submitting reviews to a worker pool
//! - `ModerationService`: external content-safety checker and its decision policy
//! - `NotificationSink`: owner notifications for terminal outcomes

pub mod moderation;
pub mod notify;
pub mod overflow;
pub mod queue;
pub mod worker;

pub use moderation::{
    poll_until_terminal, HttpModerationClient, ModerationError, ModerationLabel,
    ModerationPolicy, ModerationQuery, ModerationService, PollOutcome, PollSettings, RiskLevel,
};
pub use notify::{Notification, NotificationKind, NotificationSink, TracingNotificationSink};
pub use overflow::{FileOverflowStore, MemoryOverflowStore, OverflowError, OverflowStore};
pub use queue::{ClaimedTask, ReviewQueue, TaskSource};
pub use worker::{ModerationWorker, ModerationWorkerConfig, ReviewOutcome};
