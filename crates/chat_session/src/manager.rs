//! Chat manager - conversation threads and generation lifecycle
//!
//! Owns the session list, the current-session pointer, and at most one
//! in-flight generation. The UI reads snapshots via `subscribe()` and
//! calls the documented operations; it never mutates the lists
//! directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde::Serialize;
use study_core::{ChatMessage, ChatSession, Config, MessageRole, SessionId};
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use platform_client::{ChatGateway, ChatStreamRequest, GatewayError, HistoryMessage};

use crate::error::{ChatError, Result};
use crate::typewriter::TypewriterBuffer;

/// Read-only view published to rendering layers.
#[derive(Debug, Clone, Serialize)]
pub struct ChatSnapshot {
    /// Most-recent-first.
    pub sessions: Vec<ChatSession>,
    pub current: Option<SessionId>,
    pub generating: bool,
}

#[derive(Debug, Default)]
struct ChatState {
    sessions: Vec<ChatSession>,
    current: Option<SessionId>,
}

impl ChatState {
    fn session_mut(&mut self, id: &SessionId) -> Option<&mut ChatSession> {
        self.sessions.iter_mut().find(|s| &s.id == id)
    }

    fn message_mut(&mut self, session_id: &SessionId, message_id: Uuid) -> Option<&mut ChatMessage> {
        self.session_mut(session_id)?
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
    }
}

/// Chat session engine.
pub struct ChatManager<G: ChatGateway> {
    gateway: Arc<G>,
    state: Arc<Mutex<ChatState>>,
    snapshot_tx: watch::Sender<ChatSnapshot>,
    generating: AtomicBool,
    cancel: StdMutex<Option<CancellationToken>>,
    typing_interval: Duration,
    max_chunk_chars: usize,
}

impl<G: ChatGateway> ChatManager<G> {
    pub fn new(gateway: Arc<G>, config: &Config) -> Self {
        let (snapshot_tx, _) = watch::channel(ChatSnapshot {
            sessions: Vec::new(),
            current: None,
            generating: false,
        });
        Self {
            gateway,
            state: Arc::new(Mutex::new(ChatState::default())),
            snapshot_tx,
            generating: AtomicBool::new(false),
            cancel: StdMutex::new(None),
            typing_interval: Duration::from_millis(config.typing_interval_ms.max(1)),
            max_chunk_chars: config.typing_chunk_chars.clamp(1, 3),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub async fn snapshot(&self) -> ChatSnapshot {
        let state = self.state.lock().await;
        self.build_snapshot(&state)
    }

    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::SeqCst)
    }

    /// Pull the session listing from the gateway. Bodies stay
    /// unloaded; already-hydrated sessions keep their messages.
    /// Local-only sessions (not yet reconciled) stay at the front.
    pub async fn load_history(&self) -> Result<()> {
        let summaries = self.gateway.list_sessions().await?;
        let mut state = self.state.lock().await;

        let mut merged: Vec<ChatSession> = state
            .sessions
            .iter()
            .filter(|s| s.id.is_local())
            .cloned()
            .collect();
        for summary in summaries {
            let id = SessionId::Remote(summary.id);
            match state.sessions.iter().find(|s| s.id == id) {
                Some(existing) => merged.push(existing.clone()),
                None => merged.push(ChatSession {
                    id,
                    title: summary.title,
                    messages: Vec::new(),
                    created_at: summary.updated_at.unwrap_or_else(chrono::Utc::now),
                    hydrated: false,
                }),
            }
        }
        state.sessions = merged;
        self.publish(&state);
        Ok(())
    }

    /// Make a session current, fetching its messages on first open.
    /// A session already hydrated is never refetched.
    pub async fn open_session(&self, session_id: &SessionId) -> Result<()> {
        let needs_fetch = {
            let mut state = self.state.lock().await;
            let session = state
                .session_mut(session_id)
                .ok_or_else(|| ChatError::SessionNotFound(session_id.to_string()))?;
            let needs_fetch = !session.hydrated;
            state.current = Some(session_id.clone());
            self.publish(&state);
            needs_fetch
        };

        if !needs_fetch {
            return Ok(());
        }
        let remote_id = match session_id.as_remote() {
            Some(id) => id.to_string(),
            // A local session only exists on this client; there is
            // nothing to fetch.
            None => return Ok(()),
        };

        let detail = self.gateway.fetch_session(&remote_id).await?;
        let mut state = self.state.lock().await;
        if let Some(session) = state.session_mut(session_id) {
            session.messages = detail
                .messages
                .into_iter()
                .map(|m| ChatMessage {
                    id: Uuid::new_v4(),
                    role: m.role,
                    content: m.content,
                    timestamp: m.created_at.unwrap_or_else(chrono::Utc::now),
                })
                .collect();
            session.hydrated = true;
            debug!("Hydrated session {session_id}");
        }
        self.publish(&state);
        Ok(())
    }

    /// Clear the current-session pointer. No server call; the next
    /// message materializes a new session lazily, so empty sessions
    /// are never persisted.
    pub async fn new_session(&self) {
        let mut state = self.state.lock().await;
        state.current = None;
        self.publish(&state);
    }

    /// Remove a session locally and request server-side deletion.
    pub async fn delete_session(&self, session_id: &SessionId) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            state.sessions.retain(|s| &s.id != session_id);
            if state.current.as_ref() == Some(session_id) {
                state.current = None;
            }
            self.publish(&state);
        }

        if let Some(remote_id) = session_id.as_remote() {
            if let Err(err) = self.gateway.delete_session(remote_id).await {
                warn!("Failed to delete session {remote_id} on server: {err}");
                return Err(err.into());
            }
        }
        Ok(())
    }

    /// Send a user message and stream the reply into the current
    /// session, typing it out at a fixed cadence. Resolves when the
    /// generation completes, fails, or is stopped.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        if self.generating.swap(true, Ordering::SeqCst) {
            return Err(ChatError::GenerationInProgress);
        }
        let token = CancellationToken::new();
        *self.cancel.lock().expect("cancel lock") = Some(token.clone());

        let result = self.run_generation(text, token).await;

        self.generating.store(false, Ordering::SeqCst);
        *self.cancel.lock().expect("cancel lock") = None;
        {
            let state = self.state.lock().await;
            self.publish(&state);
        }
        result
    }

    /// Cancel the in-flight generation, keeping whatever partial
    /// content is already displayed. Safe to call when idle.
    pub fn stop_generation(&self) {
        if let Some(token) = self.cancel.lock().expect("cancel lock").take() {
            info!("Stopping generation");
            token.cancel();
        }
        self.generating.store(false, Ordering::SeqCst);
    }

    // ========== Internal ==========

    async fn run_generation(&self, text: &str, token: CancellationToken) -> Result<()> {
        // Optimistic local append; session materializes lazily.
        let (session_key, request) = {
            let mut state = self.state.lock().await;
            let session_key = match state.current.clone() {
                Some(id) => id,
                None => {
                    let session = ChatSession::new_local(text);
                    let id = session.id.clone();
                    state.sessions.insert(0, session);
                    state.current = Some(id.clone());
                    id
                }
            };
            let session = state
                .session_mut(&session_key)
                .expect("current session exists");
            let history: Vec<HistoryMessage> = session
                .messages
                .iter()
                .map(|m| HistoryMessage {
                    role: m.role,
                    content: m.content.clone(),
                })
                .collect();
            session.messages.push(ChatMessage::user(text));
            let request = ChatStreamRequest {
                // Empty for a brand-new session so the gateway
                // allocates an id.
                session_id: session_key.as_remote().unwrap_or_default().to_string(),
                message: text.to_string(),
                history,
            };
            self.publish(&state);
            (session_key, request)
        };

        let stream = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            result = self.gateway.stream_chat(request) => match result {
                Ok(stream) => stream,
                Err(err) => {
                    self.append_error(&session_key, &err).await;
                    return Err(err.into());
                }
            },
        };

        // Swap the temporary identity for the server-assigned one,
        // exactly once, before any content lands.
        let session_key = match stream.assigned_session_id.clone() {
            Some(real_id) => self.reconcile(&session_key, real_id).await,
            None => session_key,
        };

        // Placeholder assistant message the drain fills in.
        let message_id = {
            let mut state = self.state.lock().await;
            let message = ChatMessage::assistant("");
            let id = message.id;
            if let Some(session) = state.session_mut(&session_key) {
                session.messages.push(message);
            }
            self.publish(&state);
            id
        };

        let mut chunks = stream.chunks;
        let mut buffer = TypewriterBuffer::new();
        let mut ticker = tokio::time::interval(self.typing_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut network_error: Option<GatewayError> = None;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    // Deliberate stop: keep partial text, append nothing.
                    debug!("Generation cancelled mid-stream");
                    return Ok(());
                }
                chunk = chunks.recv(), if !buffer.is_closed() => {
                    match chunk {
                        Some(Ok(bytes)) => buffer.push_bytes(&bytes),
                        Some(Err(err)) => {
                            if !err.is_cancelled() {
                                network_error = Some(err);
                            }
                            buffer.close();
                        }
                        None => buffer.close(),
                    }
                }
                _ = ticker.tick() => {
                    let piece = buffer.drain_step(self.max_chunk_chars);
                    if !piece.is_empty() {
                        let mut state = self.state.lock().await;
                        if let Some(message) = state.message_mut(&session_key, message_id) {
                            message.content.push_str(&piece);
                        }
                        self.publish(&state);
                    }
                    if buffer.is_finished() {
                        break;
                    }
                }
            }
        }

        if let Some(err) = network_error {
            self.append_error(&session_key, &err).await;
            return Err(err.into());
        }
        Ok(())
    }

    /// Replace a temporary session id with the server-assigned one.
    /// Applies at most once per session; messages stay attached to the
    /// single surviving record.
    async fn reconcile(&self, session_key: &SessionId, real_id: String) -> SessionId {
        if !session_key.is_local() {
            return session_key.clone();
        }
        let mut state = self.state.lock().await;
        let new_id = SessionId::Remote(real_id);
        match state.session_mut(session_key) {
            Some(session) => {
                session.id = new_id.clone();
                session.hydrated = true;
            }
            None => return session_key.clone(),
        }
        if state.current.as_ref() == Some(session_key) {
            state.current = Some(new_id.clone());
        }
        info!("Reconciled session {session_key} -> {new_id}");
        self.publish(&state);
        new_id
    }

    /// Surface a failure as an assistant message in the conversation.
    /// Fills the empty streaming placeholder if one is pending.
    async fn append_error(&self, session_key: &SessionId, err: &GatewayError) {
        let mut state = self.state.lock().await;
        if let Some(session) = state.session_mut(session_key) {
            let text = format!("Error: {err}");
            match session.messages.last_mut() {
                Some(last) if last.role == MessageRole::Assistant && last.content.is_empty() => {
                    last.content = text;
                }
                _ => session.messages.push(ChatMessage::assistant(text)),
            }
        }
        self.publish(&state);
    }

    fn build_snapshot(&self, state: &ChatState) -> ChatSnapshot {
        ChatSnapshot {
            sessions: state.sessions.clone(),
            current: state.current.clone(),
            generating: self.generating.load(Ordering::SeqCst),
        }
    }

    fn publish(&self, state: &ChatState) {
        self.snapshot_tx.send_replace(self.build_snapshot(state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use platform_client::{ChatStream, SessionDetail, WireMessage};
    use std::sync::atomic::AtomicUsize;
    use study_core::SessionSummary;
    use tokio::sync::mpsc;

    type Script = Vec<std::result::Result<Bytes, GatewayError>>;

    fn text_chunks(parts: &[&'static str]) -> Script {
        parts
            .iter()
            .map(|part| Ok(Bytes::from_static(part.as_bytes())))
            .collect()
    }

    struct MockGateway {
        assigned_id: Option<&'static str>,
        script: StdMutex<Script>,
        /// Keep the sender alive so the stream never closes.
        hold_open: bool,
        held: StdMutex<Option<mpsc::Sender<platform_client::Result<Bytes>>>>,
        summaries: Vec<SessionSummary>,
        fetches: AtomicUsize,
        deletes: StdMutex<Vec<String>>,
    }

    impl MockGateway {
        fn new(assigned_id: Option<&'static str>, script: Script) -> Self {
            Self {
                assigned_id,
                script: StdMutex::new(script),
                hold_open: false,
                held: StdMutex::new(None),
                summaries: Vec::new(),
                fetches: AtomicUsize::new(0),
                deletes: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatGateway for MockGateway {
        async fn list_sessions(&self) -> platform_client::Result<Vec<SessionSummary>> {
            Ok(self.summaries.clone())
        }

        async fn fetch_session(&self, session_id: &str) -> platform_client::Result<SessionDetail> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(SessionDetail {
                id: session_id.to_string(),
                title: "Fetched".to_string(),
                messages: vec![
                    WireMessage {
                        role: MessageRole::User,
                        content: "hi".to_string(),
                        created_at: None,
                    },
                    WireMessage {
                        role: MessageRole::Assistant,
                        content: "hello".to_string(),
                        created_at: None,
                    },
                ],
            })
        }

        async fn delete_session(&self, session_id: &str) -> platform_client::Result<()> {
            self.deletes.lock().unwrap().push(session_id.to_string());
            Ok(())
        }

        async fn stream_chat(
            &self,
            _request: ChatStreamRequest,
        ) -> platform_client::Result<ChatStream> {
            let (tx, rx) = mpsc::channel(16);
            for item in self.script.lock().unwrap().drain(..) {
                tx.try_send(item).unwrap();
            }
            if self.hold_open {
                *self.held.lock().unwrap() = Some(tx);
            }
            Ok(ChatStream {
                assigned_session_id: self.assigned_id.map(str::to_string),
                chunks: rx,
            })
        }
    }

    fn manager(gateway: MockGateway) -> ChatManager<MockGateway> {
        ChatManager::new(Arc::new(gateway), &Config::default())
    }

    fn assistant_content(snapshot: &ChatSnapshot) -> String {
        snapshot.sessions[0]
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::Assistant)
            .map(|m| m.content.clone())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn typed_content_equals_streamed_bytes() {
        let manager = manager(MockGateway::new(
            Some("srv-1"),
            text_chunks(&[
                "The mitochondria ",
                "is the powerhouse ",
                "of the cell.",
            ]),
        ));

        manager.send_message("What is a mitochondria?").await.unwrap();

        let snapshot = manager.snapshot().await;
        assert_eq!(
            assistant_content(&snapshot),
            "The mitochondria is the powerhouse of the cell."
        );
        assert!(!snapshot.generating);
    }

    #[tokio::test(start_paused = true)]
    async fn multibyte_character_split_across_chunks_survives() {
        // Chunk boundaries fall inside both three-byte characters.
        let word = "数学".as_bytes();
        let manager = manager(MockGateway::new(
            Some("srv-1"),
            vec![
                Ok(Bytes::copy_from_slice(&word[..2])),
                Ok(Bytes::copy_from_slice(&word[2..5])),
                Ok(Bytes::copy_from_slice(&word[5..])),
            ],
        ));

        manager.send_message("translate mathematics").await.unwrap();

        assert_eq!(assistant_content(&manager.snapshot().await), "数学");
    }

    #[tokio::test(start_paused = true)]
    async fn first_message_materializes_and_reconciles_session() {
        let manager = manager(MockGateway::new(Some("srv-42"), text_chunks(&["ok"])));
        assert!(manager.snapshot().await.sessions.is_empty());

        manager.send_message("hello there").await.unwrap();

        let snapshot = manager.snapshot().await;
        // Exactly one session record survives the identity swap.
        assert_eq!(snapshot.sessions.len(), 1);
        let session = &snapshot.sessions[0];
        assert_eq!(session.id, SessionId::Remote("srv-42".to_string()));
        assert_eq!(snapshot.current, Some(session.id.clone()));
        assert_eq!(session.title, "hello there");
        // User message and assistant reply both attached.
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].role, MessageRole::User);
    }

    #[tokio::test(start_paused = true)]
    async fn stream_error_appends_visible_message() {
        let manager = manager(MockGateway::new(
            Some("srv-1"),
            vec![
                Ok(Bytes::from_static(b"partial ")),
                Err(GatewayError::Network("connection reset".to_string())),
            ],
        ));

        let result = manager.send_message("hi").await;
        assert!(result.is_err());

        let snapshot = manager.snapshot().await;
        let content = assistant_content(&snapshot);
        assert!(content.contains("partial "));
        assert!(content.contains("Error:"));
        assert!(!snapshot.generating);
        // The user message was not lost.
        assert_eq!(snapshot.sessions[0].messages[0].content, "hi");
    }

    #[tokio::test(start_paused = true)]
    async fn stop_generation_keeps_partial_text_without_error() {
        let mut gateway = MockGateway::new(Some("srv-1"), text_chunks(&["partial answer"]));
        gateway.hold_open = true;
        let manager = Arc::new(manager(gateway));

        let sender = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.send_message("question").await })
        };
        // Let the drain type out what has arrived, then stop.
        tokio::time::sleep(Duration::from_secs(1)).await;
        manager.stop_generation();
        assert!(!manager.is_generating());

        sender.await.unwrap().unwrap();

        let snapshot = manager.snapshot().await;
        let content = assistant_content(&snapshot);
        assert_eq!(content, "partial answer");
        assert!(!content.contains("Error"));
        assert!(!snapshot.generating);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_generation_is_a_noop_when_idle() {
        let manager = manager(MockGateway::new(None, vec![]));
        manager.stop_generation();
        assert!(!manager.is_generating());
    }

    #[tokio::test]
    async fn open_session_hydrates_exactly_once() {
        let mut gateway = MockGateway::new(None, vec![]);
        gateway.summaries = vec![SessionSummary {
            id: "srv-9".to_string(),
            title: "Algebra help".to_string(),
            updated_at: None,
        }];
        let manager = manager(gateway);
        manager.load_history().await.unwrap();

        let id = SessionId::Remote("srv-9".to_string());
        manager.open_session(&id).await.unwrap();
        manager.open_session(&id).await.unwrap();

        let snapshot = manager.snapshot().await;
        assert_eq!(snapshot.current, Some(id));
        assert_eq!(snapshot.sessions[0].messages.len(), 2);

        let gateway_fetches = {
            let state = manager.gateway.fetches.load(Ordering::SeqCst);
            state
        };
        assert_eq!(gateway_fetches, 1);
    }

    #[tokio::test]
    async fn open_unknown_session_fails() {
        let manager = manager(MockGateway::new(None, vec![]));
        let missing = SessionId::Remote("nope".to_string());
        assert!(matches!(
            manager.open_session(&missing).await,
            Err(ChatError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_session_clears_current_and_calls_server() {
        let mut gateway = MockGateway::new(None, vec![]);
        gateway.summaries = vec![SessionSummary {
            id: "srv-3".to_string(),
            title: "Physics".to_string(),
            updated_at: None,
        }];
        let manager = manager(gateway);
        manager.load_history().await.unwrap();

        let id = SessionId::Remote("srv-3".to_string());
        manager.open_session(&id).await.unwrap();
        manager.delete_session(&id).await.unwrap();

        let snapshot = manager.snapshot().await;
        assert!(snapshot.sessions.is_empty());
        assert!(snapshot.current.is_none());
        assert_eq!(
            *manager.gateway.deletes.lock().unwrap(),
            vec!["srv-3".to_string()]
        );
    }

    #[tokio::test]
    async fn new_session_clears_pointer_without_server_call() {
        let manager = manager(MockGateway::new(Some("srv-1"), vec![]));
        manager.new_session().await;
        let snapshot = manager.snapshot().await;
        assert!(snapshot.current.is_none());
        assert!(snapshot.sessions.is_empty());
    }
}
