//! Exam engine - async driver around `ExamSession`
//!
//! Owns the gateway, the countdown task, and the save worker. The UI
//! layer reads snapshots through `subscribe()` and calls the documented
//! operations; it never touches the session state directly.

use std::sync::Arc;
use std::time::Duration;

use study_core::{Answer, AttemptStatus};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use platform_client::ExamGateway;
use platform_client::ResponseSave;

use crate::error::{ExamError, Result};
use crate::session::{ExamSession, ExamSnapshot, NavTarget, SaveCommand};

enum SaveJob {
    Save(SaveCommand),
    /// Ack once every previously enqueued save has been attempted.
    Flush(oneshot::Sender<()>),
}

/// Async exam engine. Cheap to share behind an `Arc`.
pub struct ExamEngine<G: ExamGateway> {
    gateway: Arc<G>,
    attempt_id: String,
    session: Arc<Mutex<ExamSession>>,
    snapshot_tx: watch::Sender<ExamSnapshot>,
    save_tx: mpsc::UnboundedSender<SaveJob>,
    shutdown: CancellationToken,
}

impl<G: ExamGateway> ExamEngine<G> {
    /// Fetch attempt metadata and papers, then assemble the engine.
    ///
    /// `AuthMissing` bubbles up for the caller to redirect to login;
    /// `AttemptClosed` means the attempt is invalid or already
    /// finished and the caller should return to the exam list.
    pub async fn load(gateway: Arc<G>, attempt_id: &str) -> Result<Self> {
        let attempt = gateway.fetch_attempt(attempt_id).await?;
        if attempt.status != AttemptStatus::InProgress {
            return Err(ExamError::AttemptClosed);
        }

        // Papers load in the order the attempt stored them; that order
        // defines the global question numbering.
        let mut papers = Vec::with_capacity(attempt.paper_ids.len());
        for paper_id in &attempt.paper_ids {
            papers.push(gateway.fetch_paper(paper_id).await?);
        }

        let session = ExamSession::new(attempt, papers)?;
        let (snapshot_tx, _) = watch::channel(session.snapshot());
        let (save_tx, save_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        tokio::spawn(run_save_worker(
            Arc::clone(&gateway),
            attempt_id.to_string(),
            save_rx,
            shutdown.clone(),
        ));

        Ok(Self {
            gateway,
            attempt_id: attempt_id.to_string(),
            session: Arc::new(Mutex::new(session)),
            snapshot_tx,
            save_tx,
            shutdown,
        })
    }

    /// Watch-channel subscription for rendering layers.
    pub fn subscribe(&self) -> watch::Receiver<ExamSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub async fn snapshot(&self) -> ExamSnapshot {
        self.session.lock().await.snapshot()
    }

    /// Record an answer locally; the durable save is deferred until
    /// the candidate navigates away or submits.
    pub async fn record_answer(&self, question_id: &str, answer: Answer) -> Result<()> {
        let mut session = self.session.lock().await;
        session.record_answer(question_id, answer)?;
        self.snapshot_tx.send_replace(session.snapshot());
        Ok(())
    }

    pub async fn toggle_mark(&self, question_id: &str) -> Result<()> {
        let mut session = self.session.lock().await;
        let command = session.toggle_mark(question_id)?;
        self.snapshot_tx.send_replace(session.snapshot());
        let _ = self.save_tx.send(SaveJob::Save(command));
        Ok(())
    }

    pub async fn clear_response(&self, question_id: &str) -> Result<()> {
        let mut session = self.session.lock().await;
        let command = session.clear_response(question_id)?;
        self.snapshot_tx.send_replace(session.snapshot());
        let _ = self.save_tx.send(SaveJob::Save(command));
        Ok(())
    }

    pub async fn navigate(&self, target: NavTarget) -> Result<()> {
        let mut session = self.session.lock().await;
        let command = session.navigate(target)?;
        self.snapshot_tx.send_replace(session.snapshot());
        if let Some(command) = command {
            let _ = self.save_tx.send(SaveJob::Save(command));
        }
        Ok(())
    }

    /// Spawn the 1-second countdown. Expiry auto-submits exactly once;
    /// the task ends when the attempt is submitted or the engine shuts
    /// down.
    pub fn start_countdown(&self) -> tokio::task::JoinHandle<()> {
        let gateway = Arc::clone(&self.gateway);
        let attempt_id = self.attempt_id.clone();
        let session = Arc::clone(&self.session);
        let snapshot_tx = self.snapshot_tx.clone();
        let save_tx = self.save_tx.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of a tokio interval completes immediately.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let expired = {
                            let mut session = session.lock().await;
                            let outcome = session.tick();
                            snapshot_tx.send_replace(session.snapshot());
                            outcome.expired
                        };
                        if expired {
                            info!("Time expired, auto-submitting attempt {attempt_id}");
                            if let Err(err) = submit_attempt(
                                &gateway,
                                &attempt_id,
                                &session,
                                &snapshot_tx,
                                &save_tx,
                            )
                            .await
                            {
                                warn!("Auto-submit failed: {err}");
                            }
                        }
                        if session.lock().await.phase() == crate::session::AttemptPhase::Submitted {
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Submit the attempt: flush outstanding saves, post the final
    /// submission, and only then enter the terminal state. On failure
    /// the attempt reopens so the user can retry.
    pub async fn submit(&self) -> Result<()> {
        submit_attempt(
            &self.gateway,
            &self.attempt_id,
            &self.session,
            &self.snapshot_tx,
            &self.save_tx,
        )
        .await
    }

    /// Stop the countdown and the save worker.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl<G: ExamGateway> Drop for ExamEngine<G> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn submit_attempt<G: ExamGateway>(
    gateway: &Arc<G>,
    attempt_id: &str,
    session: &Arc<Mutex<ExamSession>>,
    snapshot_tx: &watch::Sender<ExamSnapshot>,
    save_tx: &mpsc::UnboundedSender<SaveJob>,
) -> Result<()> {
    let commands = {
        let mut session = session.lock().await;
        let commands = session.begin_submit()?;
        snapshot_tx.send_replace(session.snapshot());
        commands
    };

    for command in commands {
        let _ = save_tx.send(SaveJob::Save(command));
    }
    // Wait for the queue to drain so the submission is ordered after
    // every response save.
    let (ack_tx, ack_rx) = oneshot::channel();
    if save_tx.send(SaveJob::Flush(ack_tx)).is_ok() {
        let _ = ack_rx.await;
    }

    match gateway.submit_attempt(attempt_id).await {
        Ok(()) => {
            let mut session = session.lock().await;
            session.confirm_submitted();
            snapshot_tx.send_replace(session.snapshot());
            info!("Attempt {attempt_id} submitted");
            Ok(())
        }
        Err(err) => {
            let mut session = session.lock().await;
            session.fail_submit();
            snapshot_tx.send_replace(session.snapshot());
            error!("Failed to submit attempt {attempt_id}: {err}");
            Err(err.into())
        }
    }
}

/// Save worker: serializes response saves so a later edit can never be
/// overtaken by an earlier in-flight save for the same question.
/// Failures are logged and swallowed; in-memory state stays the source
/// of truth until the next successful save.
async fn run_save_worker<G: ExamGateway>(
    gateway: Arc<G>,
    attempt_id: String,
    mut rx: mpsc::UnboundedReceiver<SaveJob>,
    shutdown: CancellationToken,
) {
    let mut last_sent: std::collections::HashMap<String, u64> = std::collections::HashMap::new();
    loop {
        let job = tokio::select! {
            _ = shutdown.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        // Drain whatever else is queued and keep only the newest
        // revision per question.
        let mut batch = vec![job];
        while let Ok(next) = rx.try_recv() {
            batch.push(next);
        }

        let mut order: Vec<String> = Vec::new();
        let mut latest: std::collections::HashMap<String, SaveCommand> =
            std::collections::HashMap::new();
        let mut flushes: Vec<oneshot::Sender<()>> = Vec::new();
        for job in batch {
            match job {
                SaveJob::Save(command) => match latest.get(&command.question_id) {
                    Some(existing) if existing.revision >= command.revision => {}
                    _ => {
                        if !latest.contains_key(&command.question_id) {
                            order.push(command.question_id.clone());
                        }
                        latest.insert(command.question_id.clone(), command);
                    }
                },
                SaveJob::Flush(ack) => flushes.push(ack),
            }
        }

        for question_id in order {
            let command = latest.remove(&question_id).expect("command present");
            if last_sent
                .get(&question_id)
                .is_some_and(|sent| *sent >= command.revision)
            {
                continue;
            }
            let save = ResponseSave {
                question_id: question_id.clone(),
                response: command.response,
            };
            match gateway.save_response(&attempt_id, &save).await {
                Ok(()) => {
                    last_sent.insert(question_id, command.revision);
                }
                Err(err) => {
                    // Best-effort persistence.
                    warn!("Failed to save response for {question_id}: {err}");
                }
            }
        }

        for ack in flushes {
            let _ = ack.send(());
        }
    }
}
