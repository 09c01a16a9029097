//! Reqwest-backed gateway client
//!
//! Two underlying clients: a retrying one (exponential backoff) for
//! the JSON endpoints, and a plain one for the chat stream, since a
//! retry layer must not replay a partially consumed stream.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use log::{error, info, warn};
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use study_core::{AttemptStatus, Config, ExamAttempt, Paper, SessionSummary, Subject};

use crate::credentials::CredentialStore;
use crate::error::{GatewayError, Result};
use crate::gateway::{
    ChatGateway, ChatStream, ChatStreamRequest, ExamGateway, ResponseSave, SessionDetail,
};

const SESSION_ID_HEADER: &str = "X-Session-ID";
const STREAM_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct SignupRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: String,
}

#[derive(Debug, Serialize)]
struct StartAttemptRequest<'a> {
    paper_ids: &'a [String],
}

#[derive(Debug, Deserialize)]
struct StartAttemptResponse {
    id: String,
}

/// Per-paper score block on a finished attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperScore {
    pub correct: u32,
    pub total: u32,
    pub percentage: f64,
}

/// Result view of an attempt fetched after submission.
#[derive(Debug, Clone, Deserialize)]
pub struct AttemptResult {
    pub id: String,
    pub status: AttemptStatus,
    #[serde(default)]
    pub scores: HashMap<String, PaperScore>,
}

/// HTTP client for the platform gateway.
pub struct PlatformClient {
    api: ClientWithMiddleware,
    stream: Client,
    base: String,
    credentials: Arc<dyn CredentialStore>,
}

impl PlatformClient {
    pub fn new(config: &Config, credentials: Arc<dyn CredentialStore>) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let api_inner = Client::builder().timeout(timeout).build()?;
        // No total timeout on the stream client; a generation can
        // legitimately outlive any fixed request budget.
        let stream = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            api: Self::build_retry_client(api_inner),
            stream,
            base: config.api_base.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn build_retry_client(client: Client) -> ClientWithMiddleware {
        // Exponential backoff: 1s, 2s, 4s with jitter
        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_secs(1), Duration::from_secs(8))
            .build_with_max_retries(3);

        ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn bearer(&self) -> Result<String> {
        self.credentials.load().ok_or(GatewayError::AuthMissing)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(GatewayError::RequestFailed {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let token = self.bearer()?;
        let response = self
            .api
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn post_json<B: Serialize>(&self, path: &str, body: Option<&B>) -> Result<reqwest::Response> {
        let token = self.bearer()?;
        let mut request = self.api.post(self.url(path)).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        Self::check(response).await
    }

    // ========== Auth ==========

    /// Log in and store the returned bearer token.
    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        let response = self
            .api
            .post(self.url("/auth/login"))
            .json(&LoginRequest { email, password })
            .send()
            .await?;
        let auth: AuthResponse = Self::check(response).await?.json().await?;
        self.credentials.save(auth.token);
        info!("Logged in as {email}");
        Ok(())
    }

    /// Create an account and store the returned bearer token.
    pub async fn signup(&self, name: &str, email: &str, password: &str) -> Result<()> {
        let response = self
            .api
            .post(self.url("/auth/signup"))
            .json(&SignupRequest {
                name,
                email,
                password,
            })
            .send()
            .await?;
        let auth: AuthResponse = Self::check(response).await?.json().await?;
        self.credentials.save(auth.token);
        Ok(())
    }

    /// Drop the stored credential.
    pub fn logout(&self) {
        self.credentials.clear();
    }

    // ========== Exam catalog ==========

    pub async fn list_subjects(&self) -> Result<Vec<Subject>> {
        self.get_json("/exam/subjects").await
    }

    /// Papers without question bodies.
    pub async fn list_papers(&self) -> Result<Vec<Paper>> {
        self.get_json("/exam/papers").await
    }

    /// Start a new attempt over the given papers; returns the attempt id.
    pub async fn start_attempt(&self, paper_ids: &[String]) -> Result<String> {
        let response = self
            .post_json("/exam/start", Some(&StartAttemptRequest { paper_ids }))
            .await?;
        let started: StartAttemptResponse = response.json().await?;
        Ok(started.id)
    }

    pub async fn list_attempts(&self) -> Result<Vec<ExamAttempt>> {
        self.get_json("/exam/attempts").await
    }

    /// Scores for a submitted attempt; fetched separately after submit.
    pub async fn fetch_results(&self, attempt_id: &str) -> Result<AttemptResult> {
        self.get_json(&format!("/exam/attempt/{attempt_id}/results"))
            .await
    }
}

#[async_trait]
impl ExamGateway for PlatformClient {
    async fn fetch_attempt(&self, attempt_id: &str) -> Result<ExamAttempt> {
        self.get_json(&format!("/exam/attempt/{attempt_id}")).await
    }

    async fn fetch_paper(&self, paper_id: &str) -> Result<Paper> {
        self.get_json(&format!("/exam/papers/{paper_id}")).await
    }

    async fn save_response(&self, attempt_id: &str, save: &ResponseSave) -> Result<()> {
        self.post_json(&format!("/exam/attempt/{attempt_id}/response"), Some(save))
            .await?;
        Ok(())
    }

    async fn submit_attempt(&self, attempt_id: &str) -> Result<()> {
        self.post_json::<()>(&format!("/exam/attempt/{attempt_id}/submit"), None)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ChatGateway for PlatformClient {
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        self.get_json("/history").await
    }

    async fn fetch_session(&self, session_id: &str) -> Result<SessionDetail> {
        self.get_json(&format!("/session/{session_id}")).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let token = self.bearer()?;
        let response = self
            .api
            .delete(self.url(&format!("/session/{session_id}")))
            .bearer_auth(token)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn stream_chat(&self, request: ChatStreamRequest) -> Result<ChatStream> {
        let token = self.bearer()?;
        let response = self
            .stream
            .post(self.url("/chat/stream"))
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;
        let response = Self::check(response).await?;

        // The gateway sets this header when it allocated a new session.
        let assigned_session_id = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => {
                        if tx.send(Ok(bytes)).await.is_err() {
                            // Receiver dropped: the caller stopped
                            // generation, abort the transfer.
                            warn!("Chat stream receiver dropped, aborting transfer");
                            break;
                        }
                    }
                    Err(err) => {
                        error!("Error reading chat stream: {err}");
                        let _ = tx.send(Err(GatewayError::from(err))).await;
                        break;
                    }
                }
            }
        });

        Ok(ChatStream {
            assigned_session_id,
            chunks: rx,
        })
    }
}
