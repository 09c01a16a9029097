//! Chat engine error types

use platform_client::GatewayError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("unknown session: {0}")]
    SessionNotFound(String),

    #[error("a generation is already in progress")]
    GenerationInProgress,
}

pub type Result<T> = std::result::Result<T, ChatError>;
