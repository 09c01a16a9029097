//! study_core - Core types for the study platform client
//!
//! This crate provides the foundational types used across the client engines:
//! - `exam` - attempts, papers, questions, responses
//! - `chat` - sessions, messages, session identity
//! - `config` - client configuration loading

pub mod chat;
pub mod config;
pub mod exam;

// Re-export commonly used types
pub use chat::{ChatMessage, ChatSession, MessageRole, SessionId, SessionSummary};
pub use config::Config;
pub use exam::{
    Answer, AttemptStatus, ExamAttempt, Paper, Question, QuestionOption, QuestionStatus,
    QuestionType, Response, Subject,
};
