//! Gateway traits and wire DTOs
//!
//! The state engines depend on these seams rather than on the concrete
//! HTTP client, so tests can drive them with scripted gateways.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use study_core::{ExamAttempt, MessageRole, Paper, Response, SessionSummary};

use crate::error::Result;

/// Body of `POST /exam/attempt/{id}/response`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseSave {
    pub question_id: String,
    #[serde(flatten)]
    pub response: Response,
}

/// Exam-facing gateway surface used by the exam engine.
#[async_trait]
pub trait ExamGateway: Send + Sync + 'static {
    async fn fetch_attempt(&self, attempt_id: &str) -> Result<ExamAttempt>;

    async fn fetch_paper(&self, paper_id: &str) -> Result<Paper>;

    /// Durably persist one question's response. Best-effort: callers
    /// log and swallow failures, in-memory state stays authoritative.
    async fn save_response(&self, attempt_id: &str, save: &ResponseSave) -> Result<()>;

    /// Finalize the attempt. Callers must not mark terminal state
    /// until this returns Ok.
    async fn submit_attempt(&self, attempt_id: &str) -> Result<()>;
}

/// One prior turn carried in the chat stream request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: MessageRole,
    pub content: String,
}

/// Body of `POST /chat/stream`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStreamRequest {
    /// Empty for a brand-new session; the gateway allocates an id and
    /// returns it in the `X-Session-ID` response header.
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub message: String,
    pub history: Vec<HistoryMessage>,
}

/// An open chat response stream.
///
/// `assigned_session_id` is read from the response headers before any
/// body bytes are consumed; chunks arrive on the channel in network
/// order. Dropping the receiver aborts the transfer.
#[derive(Debug)]
pub struct ChatStream {
    pub assigned_session_id: Option<String>,
    pub chunks: mpsc::Receiver<Result<Bytes>>,
}

/// Full session payload from `GET /session/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDetail {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<WireMessage>,
}

/// Message shape as stored by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Chat-facing gateway surface used by the chat engine.
#[async_trait]
pub trait ChatGateway: Send + Sync + 'static {
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>>;

    async fn fetch_session(&self, session_id: &str) -> Result<SessionDetail>;

    async fn delete_session(&self, session_id: &str) -> Result<()>;

    async fn stream_chat(&self, request: ChatStreamRequest) -> Result<ChatStream>;
}
