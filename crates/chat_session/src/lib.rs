//! chat_session - Chat streaming and session engine
//!
//! Client-side engine for the tutoring chat: optimistic session
//! creation with server-side identity reconciliation, streamed
//! responses typed out at a fixed cadence, cancellation, and lazy
//! history hydration.

pub mod error;
pub mod manager;
pub mod typewriter;

// Re-export commonly used types
pub use error::ChatError;
pub use manager::{ChatManager, ChatSnapshot};
pub use typewriter::TypewriterBuffer;
