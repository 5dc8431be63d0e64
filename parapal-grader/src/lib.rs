use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use parapal_config::GraderConfig;
use parapal_core::{GradeRequest, GradingEngine};
use parapal_protocol::{rubric_label, GradingReply, Rubric, Standard};
use thiserror::Error;
use tracing::{debug, info, warn};

mod protocol;
pub mod report;

use protocol::request::build_grade_request_payload;
use protocol::transport::send_grade_http;
use report::GradeOutcome;

#[derive(Debug, Error)]
pub enum GraderError {
    #[error("Not authenticated. Please sign in to grade essays.")]
    AuthenticationMissing,
    #[error("essay_text cannot be blank.")]
    EmptyEssay,
    #[error("Failed to grade essay: could not reach the grading service.")]
    Transport(#[from] reqwest::Error),
    #[error("{message}")]
    RequestFailed { status: u16, message: String },
    #[error("{message}")]
    ServiceGrading { message: String },
}

/// Source of the short-lived bearer credential sent with each request.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn bearer_token(&self) -> Option<String>;
}

/// Reads the token from an environment variable on every call, so a
/// refreshed token is picked up without rebuilding the client.
pub struct EnvTokenProvider {
    env_key: String,
}

impl EnvTokenProvider {
    pub fn new(env_key: impl Into<String>) -> Self {
        Self {
            env_key: env_key.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for EnvTokenProvider {
    async fn bearer_token(&self) -> Option<String> {
        env::var(&self.env_key).ok()
    }
}

pub struct StaticTokenProvider(pub Option<String>);

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}

#[derive(Clone)]
pub struct GradingClient {
    config: GraderConfig,
    client: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
}

impl GradingClient {
    pub fn new(config: GraderConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            tokens,
        }
    }

    pub fn from_env_token(config: GraderConfig) -> Self {
        let tokens = Arc::new(EnvTokenProvider::new(config.token_env_key.clone()));
        Self::new(config, tokens)
    }

    pub fn config(&self) -> &GraderConfig {
        &self.config
    }

    /// Sends one essay for grading. Every failure comes back as a
    /// [`GraderError`] whose message is ready to show the user.
    pub async fn submit_for_grading(
        &self,
        essay_text: &str,
        rubric: Option<&Rubric>,
        standards: &[Standard],
    ) -> Result<GradingReply, GraderError> {
        let token = self
            .tokens
            .bearer_token()
            .await
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or(GraderError::AuthenticationMissing)?;

        if essay_text.trim().is_empty() {
            return Err(GraderError::EmptyEssay);
        }

        let label = rubric_label(rubric);
        let payload =
            build_grade_request_payload(essay_text, rubric, standards, &self.config.default_rubric);
        debug!(
            essay_chars = payload.essay_text.chars().count(),
            rubric = %label,
            standards = payload.standards.len(),
            "sending grading request"
        );

        let wire = send_grade_http(&self.client, &self.config.endpoint, &token, &payload)
            .await
            .inspect_err(|err| warn!(error = %err, "grading request did not complete"))?;

        match wire.interpret() {
            GradeOutcome::Success { display_text } => {
                info!(status = wire.status, rubric = %label, "essay graded");
                Ok(GradingReply {
                    reply_text: display_text,
                    rubric_label: label,
                })
            }
            outcome @ GradeOutcome::ServiceError { .. } => {
                warn!(status = wire.status, "grading service reported an error");
                Err(GraderError::ServiceGrading {
                    message: outcome.user_message(),
                })
            }
            GradeOutcome::TransportFailure { message } => {
                warn!(status = wire.status, "grading request failed");
                Err(GraderError::RequestFailed {
                    status: wire.status,
                    message,
                })
            }
        }
    }
}

#[async_trait]
impl GradingEngine for GradingClient {
    async fn grade(&self, request: &GradeRequest) -> Result<GradingReply, String> {
        self.submit_for_grading(
            &request.essay_text,
            request.rubric.as_ref(),
            &request.standards,
        )
        .await
        .map_err(|err| err.to_string())
    }
}
