//! Integration tests for PlatformClient chat endpoints

use std::sync::Arc;

use platform_client::{
    ChatGateway, ChatStreamRequest, GatewayError, HistoryMessage, MemoryCredentialStore,
    PlatformClient,
};
use study_core::{Config, MessageRole};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(uri: &str) -> PlatformClient {
    let config = Config {
        api_base: uri.to_string(),
        ..Config::default()
    };
    PlatformClient::new(&config, Arc::new(MemoryCredentialStore::with_token("tok"))).expect("client")
}

async fn collect_chunks(
    mut chunks: tokio::sync::mpsc::Receiver<platform_client::Result<bytes::Bytes>>,
) -> String {
    let mut out = String::new();
    while let Some(chunk) = chunks.recv().await {
        out.push_str(&String::from_utf8_lossy(&chunk.unwrap()));
    }
    out
}

#[tokio::test]
async fn new_session_stream_reads_assigned_id_from_header() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/stream"))
        .and(header("Authorization", "Bearer tok"))
        .and(body_json(serde_json::json!({
            "sessionId": "",
            "message": "What is inertia?",
            "history": []
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Session-ID", "srv-77")
                .set_body_string("Inertia is the resistance of a body to changes in motion."),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let stream = client
        .stream_chat(ChatStreamRequest {
            session_id: String::new(),
            message: "What is inertia?".to_string(),
            history: Vec::new(),
        })
        .await
        .unwrap();

    assert_eq!(stream.assigned_session_id.as_deref(), Some("srv-77"));
    let body = collect_chunks(stream.chunks).await;
    assert_eq!(
        body,
        "Inertia is the resistance of a body to changes in motion."
    );
}

#[tokio::test]
async fn existing_session_stream_carries_history_and_no_header() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/stream"))
        .and(body_json(serde_json::json!({
            "sessionId": "srv-77",
            "message": "And momentum?",
            "history": [
                {"role": "user", "content": "What is inertia?"},
                {"role": "assistant", "content": "Resistance to change in motion."}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string("Momentum is mass times velocity."))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let stream = client
        .stream_chat(ChatStreamRequest {
            session_id: "srv-77".to_string(),
            message: "And momentum?".to_string(),
            history: vec![
                HistoryMessage {
                    role: MessageRole::User,
                    content: "What is inertia?".to_string(),
                },
                HistoryMessage {
                    role: MessageRole::Assistant,
                    content: "Resistance to change in motion.".to_string(),
                },
            ],
        })
        .await
        .unwrap();

    // No reconciliation needed for an already-known session.
    assert!(stream.assigned_session_id.is_none());
    assert_eq!(
        collect_chunks(stream.chunks).await,
        "Momentum is mass times velocity."
    );
}

#[tokio::test]
async fn stream_request_failure_is_reported_before_any_chunk() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/stream"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model overloaded"))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let err = client
        .stream_chat(ChatStreamRequest {
            session_id: String::new(),
            message: "hi".to_string(),
            history: Vec::new(),
        })
        .await
        .unwrap_err();

    match err {
        GatewayError::RequestFailed { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "model overloaded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn list_sessions_returns_summaries_without_bodies() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/history"))
        .and(header("Authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": "srv-1", "title": "Thermodynamics basics"},
            {"id": "srv-2", "title": "Integrals", "updated_at": "2026-08-20T10:00:00Z"}
        ])))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let sessions = client.list_sessions().await.unwrap();

    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].id, "srv-1");
    assert!(sessions[0].updated_at.is_none());
    assert!(sessions[1].updated_at.is_some());
}

#[tokio::test]
async fn fetch_session_accepts_legacy_ai_role() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/session/srv-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "srv-1",
            "title": "Thermodynamics basics",
            "messages": [
                {"role": "user", "content": "Define entropy"},
                {"role": "ai", "content": "Entropy measures disorder."}
            ]
        })))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let detail = client.fetch_session("srv-1").await.unwrap();

    assert_eq!(detail.messages.len(), 2);
    assert_eq!(detail.messages[1].role, MessageRole::Assistant);
}

#[tokio::test]
async fn delete_session_issues_delete() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/session/srv-1"))
        .and(header("Authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    client.delete_session("srv-1").await.unwrap();
}
