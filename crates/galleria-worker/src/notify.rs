use std::fmt;

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Approved,
    Rejected,
    EscalatedToManualReview,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::Approved => write!(f, "approved"),
            NotificationKind::Rejected => write!(f, "rejected"),
            NotificationKind::EscalatedToManualReview => write!(f, "escalated_to_manual_review"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub owner_id: Uuid,
    pub picture_id: Uuid,
    pub kind: NotificationKind,
    pub message: Option<String>,
}

/// Owner notifications. Delivery is fire-and-forget: sinks log their own
/// failures and never fail the caller.
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Default)]
pub struct TracingNotificationSink;

#[async_trait::async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn notify(&self, notification: Notification) {
        tracing::info!(
            owner_id = %notification.owner_id,
            picture_id = %notification.picture_id,
            kind = %notification.kind,
            message = notification.message.as_deref().unwrap_or(""),
            "Owner notified of review outcome"
        );
    }
}
