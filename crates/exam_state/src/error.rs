//! Exam engine error types

use platform_client::GatewayError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExamError {
    /// The attempt is submitted; all further mutation is rejected.
    #[error("attempt is closed")]
    AttemptClosed,

    /// A submission is already in flight.
    #[error("submission already in flight")]
    SubmissionInFlight,

    #[error("unknown question: {0}")]
    QuestionNotFound(String),

    #[error("attempt has no questions")]
    NoQuestions,

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

pub type Result<T> = std::result::Result<T, ExamError>;
