use std::time::Duration;

use galleria_core::ModerationConfig;
use tokio::time::{sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

use super::client::{ModerationError, ModerationLabel, ModerationQuery, ModerationService, RiskLevel};

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
    /// Wall-clock budget for the whole poll, independent of attempts.
    pub deadline: Duration,
}

impl From<&ModerationConfig> for PollSettings {
    fn from(config: &ModerationConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.poll_interval_ms),
            max_attempts: config.poll_max_attempts.max(1),
            deadline: Duration::from_secs(config.poll_deadline_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed {
        risk_level: RiskLevel,
        labels: Vec<ModerationLabel>,
    },
    Failed(String),
    /// Attempt budget or deadline exhausted while the task was still processing.
    TimedOut { attempts: u32 },
    Cancelled,
}

/// Poll `task_id` until it leaves `processing`, the attempt budget or
/// deadline runs out, or `cancel` fires.
pub async fn poll_until_terminal(
    service: &dyn ModerationService,
    task_id: &str,
    settings: &PollSettings,
    cancel: &CancellationToken,
) -> Result<PollOutcome, ModerationError> {
    let deadline = Instant::now() + settings.deadline;

    for attempt in 1..=settings.max_attempts {
        let query = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(PollOutcome::Cancelled),
            result = timeout_at(deadline, service.query_task(task_id)) => match result {
                Ok(query) => query?,
                Err(_) => return Ok(PollOutcome::TimedOut { attempts: attempt }),
            },
        };

        match query {
            ModerationQuery::Success { risk_level, labels } => {
                tracing::debug!(task_id, attempt, "Moderation task completed");
                return Ok(PollOutcome::Completed { risk_level, labels });
            }
            ModerationQuery::Failure { reason } => return Ok(PollOutcome::Failed(reason)),
            ModerationQuery::Processing => {}
        }

        if attempt == settings.max_attempts {
            return Ok(PollOutcome::TimedOut { attempts: attempt });
        }

        let wake = Instant::now() + settings.interval;
        if wake >= deadline {
            return Ok(PollOutcome::TimedOut { attempts: attempt });
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(PollOutcome::Cancelled),
            _ = sleep_until(wake) => {}
        }
    }

    Ok(PollOutcome::TimedOut {
        attempts: settings.max_attempts,
    })
}
