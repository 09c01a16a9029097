//! Status transitions - pure functions over `QuestionStatus`
//!
//! The full per-question lifecycle:
//! - absent from the response map means `NotVisited`;
//! - leaving a question with no entry records `NotAnswered`
//!   (handled by session navigation, not here);
//! - the three user actions below cover every remaining edge.

use study_core::QuestionStatus;

/// Status after an answer is recorded. The review mark is sticky:
/// answering a marked question yields `AnsweredMarked`, never plain
/// `Answered`.
pub fn on_answer(prev: QuestionStatus) -> QuestionStatus {
    if prev.is_marked() {
        QuestionStatus::AnsweredMarked
    } else {
        QuestionStatus::Answered
    }
}

/// Status after toggling "mark for review". Never discards a stored
/// answer, only flips the mark flag.
pub fn on_toggle_mark(prev: QuestionStatus) -> QuestionStatus {
    use QuestionStatus::*;
    match prev {
        Answered => AnsweredMarked,
        AnsweredMarked => Answered,
        Marked => NotAnswered,
        NotVisited | NotAnswered => Marked,
    }
}

/// Status after clearing the response: the answer is dropped, the mark
/// survives.
pub fn on_clear(prev: QuestionStatus) -> QuestionStatus {
    if prev.is_marked() {
        QuestionStatus::Marked
    } else {
        QuestionStatus::NotAnswered
    }
}
