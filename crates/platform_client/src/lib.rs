//! platform_client - HTTP gateway client for the study platform
//!
//! Provides the transport layer both state engines sit on:
//! - `error` - the gateway error taxonomy
//! - `credentials` - injected bearer-credential storage
//! - `gateway` - the traits the engines consume, plus wire DTOs
//! - `client` - the reqwest implementation

pub mod client;
pub mod credentials;
pub mod error;
pub mod gateway;

// Re-export commonly used types
pub use client::{AttemptResult, PaperScore, PlatformClient};
pub use credentials::{CredentialStore, MemoryCredentialStore};
pub use error::{GatewayError, Result};
pub use gateway::{
    ChatGateway, ChatStream, ChatStreamRequest, ExamGateway, HistoryMessage, ResponseSave,
    SessionDetail, WireMessage,
};
