//! Chat data model - sessions, messages, session identity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a chat session.
///
/// A session created optimistically on the client starts `Local` and is
/// swapped to `Remote` exactly once, when the gateway allocates an id
/// during the first streaming round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionId {
    Local(Uuid),
    Remote(String),
}

impl SessionId {
    /// Generate a fresh client-local identifier.
    pub fn new_local() -> Self {
        Self::Local(Uuid::new_v4())
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// The server-assigned id, if this session has been reconciled.
    pub fn as_remote(&self) -> Option<&str> {
        match self {
            Self::Remote(id) => Some(id),
            Self::Local(_) => None,
        }
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(id) => write!(f, "local-{id}"),
            Self::Remote(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    /// The gateway historically emits `"ai"` for assistant messages.
    #[serde(alias = "ai")]
    Assistant,
}

/// One message within a session.
///
/// `content` is only mutated while an assistant message is being
/// incrementally filled during streaming; afterwards it is immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: SessionId,
    pub title: String,
    /// Chronological, append-only from the client's perspective.
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    /// Whether message bodies have been fetched for this session.
    /// Listings are lazily hydrated; bodies load on first open.
    #[serde(default)]
    pub hydrated: bool,
}

const TITLE_MAX_CHARS: usize = 30;

impl ChatSession {
    /// Create a client-local session titled after its first message.
    pub fn new_local(first_message: &str) -> Self {
        Self {
            id: SessionId::new_local(),
            title: derive_title(first_message),
            messages: Vec::new(),
            created_at: Utc::now(),
            hydrated: true,
        }
    }
}

/// Derive a session title from the first user message, truncated.
pub fn derive_title(first_message: &str) -> String {
    let trimmed = first_message.trim();
    if trimmed.chars().count() <= TITLE_MAX_CHARS {
        return trimmed.to_string();
    }
    let prefix: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
    format!("{prefix}...")
}

/// Session listing entry as returned by `GET /history` (no bodies).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}
