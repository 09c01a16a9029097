//! Gateway error taxonomy
//!
//! Four classes with distinct handling policies:
//! - `AuthMissing` is handled at the point of use by redirecting to
//!   login, never surfaced as an in-UI error;
//! - `RequestFailed` / `Network` are best-effort-swallowed for exam
//!   response saves, surfaced with retry for submission, and rendered
//!   as an assistant error message in chat;
//! - `Cancelled` is a deliberate client abort and is not an error for
//!   display purposes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no credential present, login required")]
    AuthMissing,

    #[error("request failed with status {status}: {message}")]
    RequestFailed { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("cancelled")]
    Cancelled,
}

impl GatewayError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_auth_missing(&self) -> bool {
        matches!(self, Self::AuthMissing)
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<reqwest_middleware::Error> for GatewayError {
    fn from(err: reqwest_middleware::Error) -> Self {
        Self::Network(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
