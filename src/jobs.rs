//! Client for the companion batch-job service.
//!
//! The companion service shells out to the external moderation and
//! response-generation scripts; this side only triggers the jobs and
//! relays their `{ output, success }` result to the admin panel.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("service returned status {0}")]
    Status(u16),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("response parsing failed: {0}")]
    Parse(String),
}

/// Which external job to trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Moderation,
    OllamaResponse,
}

impl JobKind {
    pub fn path(&self) -> &'static str {
        match self {
            JobKind::Moderation => "/run-moderation",
            JobKind::OllamaResponse => "/run-ollama-response",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            JobKind::Moderation => "moderation",
            JobKind::OllamaResponse => "ollama-response",
        }
    }
}

/// Result contract of the companion service
#[derive(Debug, Clone, Deserialize)]
pub struct JobOutcome {
    pub output: String,
    pub success: bool,
}

#[async_trait]
pub trait JobService: Send + Sync {
    async fn run(&self, job: JobKind) -> JobResult<JobOutcome>;
}

/// HTTP implementation against the companion service
pub struct HttpJobService {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpJobService {
    pub fn new(base_url: String, timeout: Duration) -> JobResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| JobError::Request(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            client,
        })
    }
}

#[async_trait]
impl JobService for HttpJobService {
    async fn run(&self, job: JobKind) -> JobResult<JobOutcome> {
        let url = format!("{}{}", self.base_url, job.path());
        tracing::info!("Triggering {} job at {}", job.name(), url);

        let response = tokio::time::timeout(self.timeout, self.client.post(&url).send())
            .await
            .map_err(|_| JobError::Timeout(self.timeout))?
            .map_err(|e| JobError::Request(e.to_string()))?;

        // The service answers 500 with the same body shape on script
        // failure; read the body either way and let `success` decide.
        let status = response.status();
        if !status.is_success() && !status.is_server_error() {
            return Err(JobError::Status(status.as_u16()));
        }

        response
            .json::<JobOutcome>()
            .await
            .map_err(|e| JobError::Parse(e.to_string()))
    }
}

/// Companion service configuration
#[derive(Debug, Clone)]
pub struct JobsConfig {
    /// Base URL of the companion service (None = jobs disabled)
    pub base_url: Option<String>,
    pub timeout: Duration,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            base_url: Some("http://localhost:5000".to_string()),
            timeout: Duration::from_secs(120),
        }
    }
}

impl JobsConfig {
    /// Load from JOBS_BASE_URL / JOBS_TIMEOUT.
    /// An explicitly empty JOBS_BASE_URL disables the companion client.
    pub fn from_env() -> Self {
        let base_url = match std::env::var("JOBS_BASE_URL") {
            Ok(url) => {
                let trimmed = url.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Err(_) => Some("http://localhost:5000".to_string()),
        };

        let timeout = std::env::var("JOBS_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(120));

        Self { base_url, timeout }
    }

    pub fn build_service(&self) -> JobResult<Option<HttpJobService>> {
        match &self.base_url {
            Some(base_url) => Ok(Some(HttpJobService::new(base_url.clone(), self.timeout)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_job_paths() {
        assert_eq!(JobKind::Moderation.path(), "/run-moderation");
        assert_eq!(JobKind::OllamaResponse.path(), "/run-ollama-response");
    }

    #[test]
    fn test_outcome_parses_service_contract() {
        let outcome: JobOutcome =
            serde_json::from_str(r#"{"output":"12 preguntas revisadas","success":true}"#).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.output, "12 preguntas revisadas");
    }

    #[test]
    #[serial]
    fn test_config_default_base_url() {
        std::env::remove_var("JOBS_BASE_URL");
        std::env::remove_var("JOBS_TIMEOUT");
        let config = JobsConfig::from_env();
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:5000"));
        assert_eq!(config.timeout, Duration::from_secs(120));
    }

    #[test]
    #[serial]
    fn test_config_empty_url_disables_jobs() {
        std::env::set_var("JOBS_BASE_URL", "");
        let config = JobsConfig::from_env();
        assert!(config.base_url.is_none());
        assert!(config.build_service().unwrap().is_none());
        std::env::remove_var("JOBS_BASE_URL");
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let service = HttpJobService::new(
            "http://localhost:5000/".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(service.base_url, "http://localhost:5000");
    }
}
