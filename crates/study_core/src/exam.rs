//! Exam data model - attempts, papers, questions, responses
//!
//! These types mirror the gateway wire contract. Reference data
//! (papers, questions, options) is read-only on the client; only
//! `Response` entries are mutated while an attempt is in progress.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A candidate's answer to a single question.
///
/// The wire format is untagged: a single option id, a list of option
/// ids, or a bare number, depending on the question type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    /// Selected option id (MCQ).
    Single(String),
    /// Selected option ids (MSQ), in selection order.
    Multiple(Vec<String>),
    /// Numeric value (SA).
    Numeric(f64),
}

/// Per-question status as tracked by the palette.
///
/// A question with no `Response` entry at all is implicitly `NotVisited`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionStatus {
    NotVisited,
    Answered,
    NotAnswered,
    Marked,
    AnsweredMarked,
}

impl QuestionStatus {
    /// Whether this status carries a "mark for review" flag.
    pub fn is_marked(&self) -> bool {
        matches!(self, Self::Marked | Self::AnsweredMarked)
    }

    /// Whether this status carries a stored answer.
    pub fn is_answered(&self) -> bool {
        matches!(self, Self::Answered | Self::AnsweredMarked)
    }
}

impl Default for QuestionStatus {
    fn default() -> Self {
        Self::NotVisited
    }
}

/// The recorded state of one question within an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub answer: Option<Answer>,
    pub status: QuestionStatus,
    /// Cumulative seconds spent on this question across all visits.
    #[serde(default)]
    pub time_spent: u32,
}

impl Response {
    pub fn empty() -> Self {
        Self {
            answer: None,
            status: QuestionStatus::NotVisited,
            time_spent: 0,
        }
    }
}

/// Attempt lifecycle status, mirrored from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptStatus {
    InProgress,
    Submitted,
    Abandoned,
}

/// Attempt metadata as returned by `GET /exam/attempt/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamAttempt {
    pub id: String,
    /// Ordered paper ids composing the attempt.
    pub paper_ids: Vec<String>,
    /// Server-seeded remaining time; decremented client-side.
    pub time_remaining_secs: u32,
    /// Saved responses keyed by question id.
    #[serde(default)]
    pub responses: HashMap<String, Response>,
    #[serde(default = "default_attempt_status")]
    pub status: AttemptStatus,
}

fn default_attempt_status() -> AttemptStatus {
    AttemptStatus::InProgress
}

/// A selectable option belonging to one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QuestionType {
    /// Single-choice.
    Mcq,
    /// Multiple-choice.
    Msq,
    /// Short answer (numeric).
    Sa,
}

/// One question. Belongs to exactly one paper; `question_number` and
/// the option order are significant and preserved as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub question_number: u32,
    pub question_type: QuestionType,
    pub question_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_image: Option<String>,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    pub marks: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

/// An exam subject from the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    #[serde(default)]
    pub id: String,
    pub name: String,
}

/// A named collection of ordered questions belonging to one subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_wire_format_is_untagged() {
        let single: Answer = serde_json::from_str("\"opt-b\"").unwrap();
        assert_eq!(single, Answer::Single("opt-b".to_string()));

        let multiple: Answer = serde_json::from_str("[\"a\",\"c\"]").unwrap();
        assert_eq!(
            multiple,
            Answer::Multiple(vec!["a".to_string(), "c".to_string()])
        );

        let numeric: Answer = serde_json::from_str("42.5").unwrap();
        assert_eq!(numeric, Answer::Numeric(42.5));
    }

    #[test]
    fn status_uses_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&QuestionStatus::AnsweredMarked).unwrap(),
            "\"ANSWERED_MARKED\""
        );
        let parsed: QuestionStatus = serde_json::from_str("\"NOT_VISITED\"").unwrap();
        assert_eq!(parsed, QuestionStatus::NotVisited);
    }

    #[test]
    fn absent_answer_deserializes_as_none() {
        let resp: Response =
            serde_json::from_str(r#"{"answer":null,"status":"NOT_ANSWERED","time_spent":7}"#)
                .unwrap();
        assert!(resp.answer.is_none());
        assert_eq!(resp.status, QuestionStatus::NotAnswered);
        assert_eq!(resp.time_spent, 7);
    }

    #[test]
    fn attempt_defaults_to_in_progress() {
        let attempt: ExamAttempt = serde_json::from_str(
            r#"{"id":"a1","paper_ids":["p1","p2"],"time_remaining_secs":3600}"#,
        )
        .unwrap();
        assert_eq!(attempt.status, AttemptStatus::InProgress);
        assert!(attempt.responses.is_empty());
        assert_eq!(attempt.paper_ids, vec!["p1", "p2"]);
    }

    #[test]
    fn marked_statuses() {
        assert!(QuestionStatus::Marked.is_marked());
        assert!(QuestionStatus::AnsweredMarked.is_marked());
        assert!(!QuestionStatus::Answered.is_marked());
        assert!(!QuestionStatus::NotVisited.is_marked());
    }
}
