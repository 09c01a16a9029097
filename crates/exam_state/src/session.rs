//! Exam session core - in-memory state of one attempt
//!
//! Synchronous and deterministic: every suspension-free state change
//! lives here, and the async engine layer only schedules the resulting
//! `SaveCommand`s and drives the countdown. Tests call `tick()` and
//! the mutators directly.
//!
//! Save policy is deferred-save-on-navigation: `record_answer` only
//! marks the question dirty; the durable save flushes when the
//! candidate leaves the question or submits. Mark and clear persist
//! immediately.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use study_core::{Answer, ExamAttempt, Paper, QuestionStatus, Response};
use tracing::debug;

use crate::error::{ExamError, Result};
use crate::machine::{on_answer, on_clear, on_toggle_mark};

/// A durable save scheduled for one question.
///
/// `revision` is a per-question monotonic counter; the save queue uses
/// it to discard a stale write that would otherwise overtake a newer
/// one for the same question.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveCommand {
    pub question_id: String,
    pub response: Response,
    pub revision: u64,
}

/// Navigation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavTarget {
    Index(usize),
    Next,
    Prev,
}

/// Attempt lifecycle phase on the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptPhase {
    InProgress,
    /// Submission request in flight; mutation is rejected but the
    /// attempt reopens if the request fails.
    Submitting,
    /// Terminal. Set only after the server acknowledged submission.
    Submitted,
}

/// Outcome of one countdown tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    /// True exactly once, on the tick that reaches zero.
    pub expired: bool,
}

/// Palette summary. `AnsweredMarked` counts toward `marked`, not
/// `answered`, matching the palette legend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaletteCounts {
    pub answered: usize,
    pub not_answered: usize,
    pub marked: usize,
    pub not_visited: usize,
    pub total: usize,
}

/// Read-only view published to rendering layers.
#[derive(Debug, Clone, Serialize)]
pub struct ExamSnapshot {
    pub attempt_id: String,
    pub current_index: usize,
    pub total_questions: usize,
    pub time_remaining_secs: u32,
    pub phase: AttemptPhase,
    pub palette: PaletteCounts,
    /// Per-question status in global question order.
    pub statuses: Vec<QuestionStatus>,
}

/// In-memory state of one in-progress attempt.
///
/// Question order is the concatenation of papers in the order the
/// attempt stored them, each paper's questions in their stored order.
/// This ordering drives both the palette grid and next/previous.
#[derive(Debug)]
pub struct ExamSession {
    attempt_id: String,
    papers: Vec<Paper>,
    /// Flattened question ids in global order.
    order: Vec<String>,
    responses: HashMap<String, Response>,
    revisions: HashMap<String, u64>,
    /// Questions with a recorded-but-unsaved answer.
    dirty: HashSet<String>,
    current: usize,
    time_remaining_secs: u32,
    /// Whole seconds spent on the current question since arriving,
    /// folded into its response on answer or navigation.
    elapsed_on_current: u32,
    phase: AttemptPhase,
    auto_submit_fired: bool,
}

impl ExamSession {
    /// Assemble a session from attempt metadata and its papers.
    /// Papers are reordered to match `attempt.paper_ids`.
    pub fn new(attempt: ExamAttempt, mut papers: Vec<Paper>) -> Result<Self> {
        let position: HashMap<&str, usize> = attempt
            .paper_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        papers.sort_by_key(|paper| position.get(paper.id.as_str()).copied().unwrap_or(usize::MAX));

        let order: Vec<String> = papers
            .iter()
            .flat_map(|paper| paper.questions.iter().map(|q| q.id.clone()))
            .collect();
        if order.is_empty() {
            return Err(ExamError::NoQuestions);
        }

        Ok(Self {
            attempt_id: attempt.id,
            papers,
            order,
            responses: attempt.responses,
            revisions: HashMap::new(),
            dirty: HashSet::new(),
            current: 0,
            time_remaining_secs: attempt.time_remaining_secs,
            elapsed_on_current: 0,
            phase: AttemptPhase::InProgress,
            auto_submit_fired: false,
        })
    }

    // ========== Accessors ==========

    pub fn attempt_id(&self) -> &str {
        &self.attempt_id
    }

    pub fn papers(&self) -> &[Paper] {
        &self.papers
    }

    pub fn total_questions(&self) -> usize {
        self.order.len()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_question_id(&self) -> &str {
        &self.order[self.current]
    }

    pub fn time_remaining_secs(&self) -> u32 {
        self.time_remaining_secs
    }

    pub fn phase(&self) -> AttemptPhase {
        self.phase
    }

    pub fn status_of(&self, question_id: &str) -> QuestionStatus {
        self.responses
            .get(question_id)
            .map(|resp| resp.status)
            .unwrap_or(QuestionStatus::NotVisited)
    }

    pub fn response_of(&self, question_id: &str) -> Option<&Response> {
        self.responses.get(question_id)
    }

    // ========== Mutators ==========

    /// Record an answer locally (optimistic). The durable save is
    /// deferred until navigation or submit.
    pub fn record_answer(&mut self, question_id: &str, answer: Answer) -> Result<()> {
        self.ensure_open()?;
        self.ensure_known(question_id)?;
        let elapsed = self.take_elapsed_if_current(question_id);

        let entry = self
            .responses
            .entry(question_id.to_string())
            .or_insert_with(Response::empty);
        entry.status = on_answer(entry.status);
        entry.answer = Some(answer);
        entry.time_spent += elapsed;

        self.bump_revision(question_id);
        self.dirty.insert(question_id.to_string());
        Ok(())
    }

    /// Toggle "mark for review". Persists immediately.
    pub fn toggle_mark(&mut self, question_id: &str) -> Result<SaveCommand> {
        self.ensure_open()?;
        self.ensure_known(question_id)?;

        let entry = self
            .responses
            .entry(question_id.to_string())
            .or_insert_with(Response::empty);
        entry.status = on_toggle_mark(entry.status);

        Ok(self.command_for(question_id))
    }

    /// Clear the stored answer. Persists immediately.
    pub fn clear_response(&mut self, question_id: &str) -> Result<SaveCommand> {
        self.ensure_open()?;
        self.ensure_known(question_id)?;

        let entry = self
            .responses
            .entry(question_id.to_string())
            .or_insert_with(Response::empty);
        entry.status = on_clear(entry.status);
        entry.answer = None;

        Ok(self.command_for(question_id))
    }

    /// Move the current-question pointer, clamped to the valid range.
    ///
    /// Leaving a question has two side effects: a question with no
    /// entry is recorded as `NotAnswered` (visit tracking), and a
    /// deferred answer save for it is flushed.
    pub fn navigate(&mut self, target: NavTarget) -> Result<Option<SaveCommand>> {
        self.ensure_open()?;
        let total = self.order.len();
        let requested = match target {
            NavTarget::Index(index) => index,
            NavTarget::Next => self.current.saturating_add(1),
            NavTarget::Prev => self.current.saturating_sub(1),
        };
        let next = requested.min(total - 1);
        if next == self.current {
            return Ok(None);
        }

        let leaving = self.order[self.current].clone();
        let elapsed = std::mem::take(&mut self.elapsed_on_current);

        let command = if let Some(entry) = self.responses.get_mut(&leaving) {
            entry.time_spent += elapsed;
            if self.dirty.remove(&leaving) {
                Some(self.command_for(&leaving))
            } else {
                None
            }
        } else {
            // First visit ends without an answer: record it.
            self.responses.insert(
                leaving.clone(),
                Response {
                    answer: None,
                    status: QuestionStatus::NotAnswered,
                    time_spent: elapsed,
                },
            );
            Some(self.command_for(&leaving))
        };

        debug!(from = self.current, to = next, "navigate");
        self.current = next;
        Ok(command)
    }

    /// Advance the countdown by one second.
    ///
    /// Never goes below zero. The tick that reaches zero reports
    /// `expired` exactly once, even if ticks keep arriving.
    pub fn tick(&mut self) -> TickOutcome {
        if self.phase != AttemptPhase::InProgress {
            return TickOutcome { expired: false };
        }
        self.time_remaining_secs = self.time_remaining_secs.saturating_sub(1);
        self.elapsed_on_current += 1;

        if self.time_remaining_secs == 0 && !self.auto_submit_fired {
            self.auto_submit_fired = true;
            return TickOutcome { expired: true };
        }
        TickOutcome { expired: false }
    }

    /// Enter the submitting phase and take every outstanding save.
    ///
    /// Guards against a second concurrent submit (timer expiry racing
    /// a manual click). The terminal state is only reached via
    /// `confirm_submitted` after the server acknowledged.
    pub fn begin_submit(&mut self) -> Result<Vec<SaveCommand>> {
        match self.phase {
            AttemptPhase::Submitting => return Err(ExamError::SubmissionInFlight),
            AttemptPhase::Submitted => return Err(ExamError::AttemptClosed),
            AttemptPhase::InProgress => {}
        }
        self.phase = AttemptPhase::Submitting;

        // Fold pending time into the current question's entry, if any.
        let current_id = self.order[self.current].clone();
        let elapsed = std::mem::take(&mut self.elapsed_on_current);
        if let Some(entry) = self.responses.get_mut(&current_id) {
            entry.time_spent += elapsed;
        }

        let mut commands: Vec<SaveCommand> = Vec::with_capacity(self.dirty.len());
        let pending: Vec<String> = self.dirty.drain().collect();
        for question_id in pending {
            commands.push(self.command_for(&question_id));
        }
        Ok(commands)
    }

    /// Server acknowledged the submission: the attempt is now terminal.
    pub fn confirm_submitted(&mut self) {
        self.phase = AttemptPhase::Submitted;
    }

    /// Submission failed: reopen for retry. A timer-triggered submit
    /// will not fire again; manual retry remains available.
    pub fn fail_submit(&mut self) {
        if self.phase == AttemptPhase::Submitting {
            self.phase = AttemptPhase::InProgress;
        }
    }

    // ========== Views ==========

    pub fn palette(&self) -> PaletteCounts {
        let mut answered = 0;
        let mut not_answered = 0;
        let mut marked = 0;
        for resp in self.responses.values() {
            match resp.status {
                QuestionStatus::Answered => answered += 1,
                QuestionStatus::NotAnswered => not_answered += 1,
                QuestionStatus::Marked | QuestionStatus::AnsweredMarked => marked += 1,
                QuestionStatus::NotVisited => {}
            }
        }
        PaletteCounts {
            answered,
            not_answered,
            marked,
            not_visited: self.order.len() - self.responses.len(),
            total: self.order.len(),
        }
    }

    pub fn snapshot(&self) -> ExamSnapshot {
        ExamSnapshot {
            attempt_id: self.attempt_id.clone(),
            current_index: self.current,
            total_questions: self.order.len(),
            time_remaining_secs: self.time_remaining_secs,
            phase: self.phase,
            palette: self.palette(),
            statuses: self.order.iter().map(|id| self.status_of(id)).collect(),
        }
    }

    // ========== Internal ==========

    fn ensure_open(&self) -> Result<()> {
        match self.phase {
            AttemptPhase::InProgress => Ok(()),
            AttemptPhase::Submitting => Err(ExamError::SubmissionInFlight),
            AttemptPhase::Submitted => Err(ExamError::AttemptClosed),
        }
    }

    fn ensure_known(&self, question_id: &str) -> Result<()> {
        if self.order.iter().any(|id| id == question_id) {
            Ok(())
        } else {
            Err(ExamError::QuestionNotFound(question_id.to_string()))
        }
    }

    fn take_elapsed_if_current(&mut self, question_id: &str) -> u32 {
        if self.order[self.current] == question_id {
            std::mem::take(&mut self.elapsed_on_current)
        } else {
            0
        }
    }

    fn bump_revision(&mut self, question_id: &str) -> u64 {
        let rev = self.revisions.entry(question_id.to_string()).or_insert(0);
        *rev += 1;
        *rev
    }

    fn command_for(&mut self, question_id: &str) -> SaveCommand {
        let revision = self.bump_revision(question_id);
        let response = self
            .responses
            .get(question_id)
            .cloned()
            .unwrap_or_else(Response::empty);
        SaveCommand {
            question_id: question_id.to_string(),
            response,
            revision,
        }
    }
}
