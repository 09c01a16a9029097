//! exam_state - Exam attempt state machine
//!
//! Client-side engine for a timed multi-paper exam: per-question
//! response tracking, status transitions, countdown with idempotent
//! auto-submit, navigation, and per-question save serialization.

pub mod engine;
pub mod error;
pub mod machine;
pub mod session;

// Re-export commonly used types
pub use engine::ExamEngine;
pub use error::ExamError;
pub use session::{
    AttemptPhase, ExamSession, ExamSnapshot, NavTarget, PaletteCounts, SaveCommand, TickOutcome,
};
