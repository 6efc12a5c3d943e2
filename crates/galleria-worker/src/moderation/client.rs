use std::time::Duration;

use galleria_core::{AppError, ModerationConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationLabel {
    pub label: String,
    /// 0-100
    pub confidence: f32,
    /// Threshold suggested by the service for this label, if any.
    #[serde(default)]
    pub threshold: Option<f32>,
    /// Human-readable explanation from the service.
    #[serde(default)]
    pub description: Option<String>,
}

/// State of a submitted moderation task.
#[derive(Debug, Clone, PartialEq)]
pub enum ModerationQuery {
    Processing,
    Success {
        risk_level: RiskLevel,
        labels: Vec<ModerationLabel>,
    },
    Failure {
        reason: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ModerationError {
    #[error("Moderation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Moderation service returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("Invalid moderation response: {0}")]
    InvalidResponse(String),

    #[error("Moderation service is not configured")]
    NotConfigured,
}

impl From<ModerationError> for AppError {
    fn from(err: ModerationError) -> Self {
        match err {
            ModerationError::Http(e) if e.is_timeout() => {
                AppError::Timeout(format!("Moderation request timed out: {}", e))
            }
            other => AppError::dependency("moderation", other.to_string()),
        }
    }
}

/// External content-safety checker. Tasks are asynchronous: submit, then poll.
#[async_trait::async_trait]
pub trait ModerationService: Send + Sync {
    async fn create_task(&self, image_url: &str) -> Result<String, ModerationError>;

    async fn query_task(&self, task_id: &str) -> Result<ModerationQuery, ModerationError>;
}

#[derive(Serialize)]
struct CreateTaskRequest<'a> {
    image_url: &'a str,
}

#[derive(Deserialize)]
struct CreateTaskResponse {
    task_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum TaskStatus {
    Processing,
    Success,
    Failure,
}

#[derive(Deserialize)]
struct TaskStatusResponse {
    status: TaskStatus,
    #[serde(default)]
    risk_level: Option<RiskLevel>,
    #[serde(default)]
    labels: Vec<ModerationLabel>,
    #[serde(default)]
    reason: Option<String>,
}

impl TryFrom<TaskStatusResponse> for ModerationQuery {
    type Error = ModerationError;

    fn try_from(response: TaskStatusResponse) -> Result<Self, Self::Error> {
        match response.status {
            TaskStatus::Processing => Ok(ModerationQuery::Processing),
            TaskStatus::Success => {
                let risk_level = response.risk_level.ok_or_else(|| {
                    ModerationError::InvalidResponse("success without risk_level".to_string())
                })?;
                Ok(ModerationQuery::Success {
                    risk_level,
                    labels: response.labels,
                })
            }
            TaskStatus::Failure => Ok(ModerationQuery::Failure {
                reason: response
                    .reason
                    .unwrap_or_else(|| "unspecified failure".to_string()),
            }),
        }
    }
}

/// JSON-over-HTTP moderation client.
///
/// `POST {endpoint}/tasks` with `{"image_url": ...}` returns `{"task_id": ...}`;
/// `GET {endpoint}/tasks/{task_id}` returns the task status.
pub struct HttpModerationClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpModerationClient {
    pub fn new(config: &ModerationConfig) -> Result<Self, ModerationError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or(ModerationError::NotConfigured)?
            .trim_end_matches('/')
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ModerationError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(ModerationError::Service {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait::async_trait]
impl ModerationService for HttpModerationClient {
    #[tracing::instrument(skip(self, image_url))]
    async fn create_task(&self, image_url: &str) -> Result<String, ModerationError> {
        let request = self
            .client
            .post(format!("{}/tasks", self.endpoint))
            .json(&CreateTaskRequest { image_url });
        let response = Self::check(self.authorize(request).send().await?).await?;
        let body: CreateTaskResponse = response.json().await?;

        tracing::debug!(task_id = %body.task_id, "Moderation task created");
        Ok(body.task_id)
    }

    #[tracing::instrument(skip(self))]
    async fn query_task(&self, task_id: &str) -> Result<ModerationQuery, ModerationError> {
        let request = self
            .client
            .get(format!("{}/tasks/{}", self.endpoint, task_id));
        let response = Self::check(self.authorize(request).send().await?).await?;
        let body: TaskStatusResponse = response.json().await?;
        body.try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<ModerationQuery, ModerationError> {
        let response: TaskStatusResponse = serde_json::from_str(json).unwrap();
        response.try_into()
    }

    #[test]
    fn test_status_response_mapping() {
        assert_eq!(parse(r#"{"status":"processing"}"#).unwrap(), ModerationQuery::Processing);

        let success = parse(
            r#"{"status":"success","risk_level":"high",
                "labels":[{"label":"violent_gunKnives","confidence":85.0}]}"#,
        )
        .unwrap();
        match success {
            ModerationQuery::Success { risk_level, labels } => {
                assert_eq!(risk_level, RiskLevel::High);
                assert_eq!(labels[0].label, "violent_gunKnives");
                assert!(labels[0].threshold.is_none());
                assert!(labels[0].description.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }

        let described = parse(
            r#"{"status":"success","risk_level":"medium",
                "labels":[{"label":"porn","confidence":40.0,"description":"swimwear"}]}"#,
        )
        .unwrap();
        match described {
            ModerationQuery::Success { labels, .. } => {
                assert_eq!(labels[0].description.as_deref(), Some("swimwear"));
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(matches!(
            parse(r#"{"status":"failure"}"#).unwrap(),
            ModerationQuery::Failure { .. }
        ));
        assert!(matches!(
            parse(r#"{"status":"success"}"#),
            Err(ModerationError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_client_requires_endpoint() {
        assert!(matches!(
            HttpModerationClient::new(&ModerationConfig::default()),
            Err(ModerationError::NotConfigured)
        ));
    }
}
