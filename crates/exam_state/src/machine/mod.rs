//! Per-question status machine

mod transitions;

pub use transitions::{on_answer, on_clear, on_toggle_mark};
