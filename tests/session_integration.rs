//! Session integration tests
//!
//! End-to-end tests driving `StorySession` against the in-memory transport.
//! Covers the handshake, a full generation run, run resets, connection
//! lifecycle, and resilience to bad frames and dropped connections.

use serde_json::json;
use std::time::Duration;
use story_session::{
    AgentActivityState, AgentIdentity, MemoryTransport, ProtocolEvent, SessionConfig,
    SessionError, SessionOutcome, StaticToken, StoryGenerationParams, StorySession,
    ThemeOptions, FnTokenProvider,
};
use tokio_stream::StreamExt;

const WAIT: Duration = Duration::from_secs(2);

fn test_session(transport: &MemoryTransport) -> StorySession {
    StorySession::new(
        SessionConfig::default().with_api_url("https://stories.test"),
        transport.clone(),
        StaticToken::new("jwt-test"),
    )
}

async fn connected_session(transport: &MemoryTransport) -> StorySession {
    let mut session = test_session(transport);
    session.connect().unwrap();
    session.wait_for(WAIT, |s| s.is_connected).await.unwrap();
    session
}

async fn wait_for_frames(transport: &MemoryTransport, count: usize) {
    tokio::time::timeout(WAIT, async {
        while transport.sent_frames().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("frames were not sent in time");
}

// ─── Handshake ───────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_authenticates_first() {
    let transport = MemoryTransport::new();
    let session = connected_session(&transport).await;

    assert_eq!(transport.opened_urls(), vec!["wss://stories.test/ws/generate"]);
    assert_eq!(
        transport.sent_json(),
        vec![json!({"type": "auth", "token": "jwt-test"})]
    );
    assert!(session.connection_error().is_none());
}

#[tokio::test]
async fn test_connect_twice_opens_one_transport() {
    let transport = MemoryTransport::new();
    let mut session = test_session(&transport);

    session.connect().unwrap();
    session.connect().unwrap();
    session.wait_for(WAIT, |s| s.is_connected).await.unwrap();

    assert_eq!(transport.open_count(), 1);
    assert_eq!(transport.sent_frames().len(), 1);
}

#[tokio::test]
async fn test_missing_token_blocks_generation() {
    let transport = MemoryTransport::new();
    let mut session = StorySession::new(
        SessionConfig::default(),
        transport.clone(),
        StaticToken::none(),
    );

    session.connect().unwrap();
    let state = session
        .wait_for(WAIT, |s| s.connection_error.is_some())
        .await
        .unwrap();

    assert!(!state.is_connected);
    assert_eq!(
        state.connection_error.as_deref(),
        Some("Authentication failed: No token available")
    );
    assert_eq!(transport.close_count(), 1);

    let result = session.generate_story(StoryGenerationParams::new("scp", 1));
    assert!(matches!(result, Err(SessionError::NotConnected)));
    assert!(transport.sent_frames().is_empty());
}

#[tokio::test]
async fn test_token_error_reports_retrieval_failure() {
    let transport = MemoryTransport::new();
    let mut session = StorySession::new(
        SessionConfig::default(),
        transport.clone(),
        FnTokenProvider::new(|| async { Err(SessionError::Auth("expired".to_string())) }),
    );

    session.connect().unwrap();
    let state = session
        .wait_for(WAIT, |s| s.connection_error.is_some())
        .await
        .unwrap();

    assert_eq!(
        state.connection_error.as_deref(),
        Some("Authentication failed: Token retrieval error")
    );
}

#[tokio::test]
async fn test_reconnect_after_auth_failure() {
    let transport = MemoryTransport::new();
    transport.refuse_connections(true);
    let mut session = test_session(&transport);

    session.connect().unwrap();
    session
        .wait_for(WAIT, |s| s.connection_error.is_some())
        .await
        .unwrap();
    session.disconnect().await;

    transport.refuse_connections(false);
    session.connect().unwrap();
    let state = session.wait_for(WAIT, |s| s.is_connected).await.unwrap();

    assert!(state.connection_error.is_none());
    assert_eq!(transport.open_count(), 1);
}

// ─── Generation run ──────────────────────────────────────────────

#[tokio::test]
async fn test_full_generation_run() {
    let transport = MemoryTransport::new();
    let session = connected_session(&transport).await;

    let params = StoryGenerationParams::new("scp", 3)
        .with_protagonist("Dr. Bright")
        .with_theme_options(ThemeOptions::defaults_for("scp"));
    session.generate_story(params).unwrap();
    assert!(session.is_generating());

    wait_for_frames(&transport, 2).await;
    let request = &transport.sent_json()[1];
    assert_eq!(request["theme"], "scp");
    assert_eq!(request["pages"], 3);
    assert_eq!(request["protagonist"], "Dr. Bright");
    assert!(request["themeOptions"].is_object());

    let script = [
        json!({"type": "auth_success", "message": "ok"}),
        json!({"type": "session_created", "session_id": "sess-42"}),
        json!({"type": "status", "message": "Planning"}),
        json!({"type": "agent_update", "agent": "Writer", "state": "thinking", "activity": "Outlining"}),
        json!({"type": "agent_stream_chunk", "agent": "Writer", "chunk": "Item #: "}),
        json!({"type": "agent_stream_chunk", "agent": "Writer", "chunk": "SCP-9001"}),
    ];
    for frame in script {
        assert!(transport.push_json(frame));
    }

    let state = session
        .wait_for(WAIT, |s| s.streaming.get(AgentIdentity::Writer) == Some("Item #: SCP-9001"))
        .await
        .unwrap();
    assert_eq!(state.session_id.as_deref(), Some("sess-42"));
    assert_eq!(state.current_activity.as_deref(), Some("Outlining"));
    assert_eq!(state.agent_states.get(AgentIdentity::Writer), AgentActivityState::Thinking);
    assert_eq!(session.current_streaming_agent(), Some(AgentIdentity::Writer));

    transport.push_json(json!({
        "type": "agent_message",
        "agent": "Writer",
        "message": "Item #: SCP-9001",
        "turn": 1,
        "phase": "Drafting"
    }));
    transport.push_json(json!({
        "type": "agent_message",
        "agent": "Reader",
        "message": "More dread.",
        "turn": 2,
        "phase": "Review"
    }));

    let state = session
        .wait_for(WAIT, |s| s.agent_message_count() == 2)
        .await
        .unwrap();
    assert!(state.streaming.is_empty());
    assert_eq!(state.current_turn, Some(2));
    assert_eq!(state.current_phase.as_deref(), Some("Review"));
    assert_eq!(state.current_agent, Some(AgentIdentity::Reader));
    assert_eq!(state.agent_states.get(AgentIdentity::Reader), AgentActivityState::Writing);
    assert_eq!(state.agent_states.get(AgentIdentity::Writer), AgentActivityState::Waiting);

    transport.push_json(json!({"type": "completed", "story": "THE END", "session_id": "sess-42"}));

    let state = session.wait_for(WAIT, |s| s.outcome.is_some()).await.unwrap();
    assert!(!state.is_generating);
    assert!(state.is_connected);
    assert_eq!(state.story(), Some("THE END"));
    assert_eq!(state.session_id.as_deref(), Some("sess-42"));
    assert!(state.current_agent.is_none());
    assert!(state.current_phase.is_none());
    assert!(state
        .agent_states
        .iter()
        .all(|(_, s)| s == AgentActivityState::Waiting));

    // auth_success is consumed by the handshake, everything else is logged
    let kinds: Vec<&str> = state.messages.iter().map(|e| e.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            "session_created",
            "status",
            "agent_update",
            "agent_stream_chunk",
            "agent_stream_chunk",
            "agent_message",
            "agent_message",
            "completed",
        ]
    );
}

#[tokio::test]
async fn test_backend_error_ends_run_without_story() {
    let transport = MemoryTransport::new();
    let session = connected_session(&transport).await;
    session
        .generate_story(StoryGenerationParams::new("noir", 1))
        .unwrap();

    transport.push_json(json!({"type": "agent_stream_chunk", "agent": "Expert", "chunk": "Hmm"}));
    transport.push_json(json!({"type": "error", "message": "boom"}));

    let state = session.wait_for(WAIT, |s| s.outcome.is_some()).await.unwrap();
    assert!(!state.is_generating);
    assert!(state.story().is_none());
    assert!(state.streaming.is_empty());
    assert_eq!(
        state.outcome,
        Some(SessionOutcome::Failed {
            message: "boom".to_string()
        })
    );
    assert_eq!(state.messages.last().and_then(ProtocolEvent::text), Some("boom"));
}

#[tokio::test]
async fn test_second_generation_clears_previous_run() {
    let transport = MemoryTransport::new();
    let session = connected_session(&transport).await;

    session
        .generate_story(StoryGenerationParams::new("fantasy", 2))
        .unwrap();
    transport.push_json(json!({"type": "session_created", "session_id": "first"}));
    transport.push_json(json!({"type": "agent_stream_chunk", "agent": "Reader", "chunk": "partial"}));
    transport.push_json(json!({"type": "completed", "story": "Once."}));
    session.wait_for(WAIT, |s| s.outcome.is_some()).await.unwrap();

    session
        .generate_story(StoryGenerationParams::new("fantasy", 4))
        .unwrap();

    let state = session.snapshot();
    assert!(state.messages.is_empty());
    assert!(state.streaming.is_empty());
    assert!(state.outcome.is_none());
    assert!(state.session_id.is_none());
    assert!(state.is_generating);

    wait_for_frames(&transport, 3).await;
    assert_eq!(transport.sent_json()[2]["pages"], 4);
}

// ─── Resilience ──────────────────────────────────────────────────

#[tokio::test]
async fn test_malformed_frames_do_not_drop_connection() {
    let transport = MemoryTransport::new();
    let session = connected_session(&transport).await;

    transport.push_frame("{not json");
    transport.push_json(json!({"message": "no type"}));
    transport.push_json(json!({"type": "agent_message", "agent": "Narrator", "message": "?"}));
    transport.push_json(json!({"type": "telemetry", "cpu": 0.4}));
    transport.push_json(json!({"type": "status", "message": "still here"}));

    let state = session
        .wait_for(WAIT, |s| s.messages.len() == 2)
        .await
        .unwrap();
    assert!(state.is_connected);
    assert_eq!(state.messages[0].kind(), "telemetry");
    assert_eq!(state.messages[1].text(), Some("still here"));
}

#[tokio::test]
async fn test_abnormal_close_reports_lost_connection() {
    let transport = MemoryTransport::new();
    let session = connected_session(&transport).await;
    session
        .generate_story(StoryGenerationParams::new("cyberpunk", 2))
        .unwrap();
    transport.push_json(json!({"type": "agent_stream_chunk", "agent": "Writer", "chunk": "Neon"}));
    session
        .wait_for(WAIT, |s| !s.streaming.is_empty())
        .await
        .unwrap();

    transport.drop_connection();

    let state = session.wait_for(WAIT, |s| !s.is_connected).await.unwrap();
    assert!(!state.is_generating);
    assert!(state.streaming.is_empty());
    assert!(state.streaming.current().is_none());
    assert_eq!(
        state.connection_error.as_deref(),
        Some("Connection lost - server may be down")
    );
}

#[tokio::test]
async fn test_transport_error_ends_connection_and_allows_reconnect() {
    let transport = MemoryTransport::new();
    let mut session = connected_session(&transport).await;
    session
        .generate_story(StoryGenerationParams::new("romance", 2))
        .unwrap();

    transport.push_error("reset by peer");

    let state = session.wait_for(WAIT, |s| !s.is_connected).await.unwrap();
    assert!(!state.is_generating);
    assert_eq!(state.connection_error.as_deref(), Some("WebSocket connection error"));
    assert_eq!(transport.close_count(), 1);

    session.connect().unwrap();
    session.wait_for(WAIT, |s| s.is_connected).await.unwrap();

    assert_eq!(transport.open_count(), 2);
    assert!(!session.is_generating());
    assert!(session.connection_error().is_none());
    assert!(session
        .generate_story(StoryGenerationParams::new("romance", 2))
        .is_ok());
}

#[tokio::test]
async fn test_reconnect_after_server_drop() {
    let transport = MemoryTransport::new();
    let mut session = connected_session(&transport).await;

    transport.drop_connection();
    session.wait_for(WAIT, |s| !s.is_connected).await.unwrap();

    session.connect().unwrap();
    session.wait_for(WAIT, |s| s.is_connected).await.unwrap();
    assert_eq!(transport.open_count(), 2);
}

// ─── Lifecycle ───────────────────────────────────────────────────

#[tokio::test]
async fn test_disconnect_closes_transport() {
    let transport = MemoryTransport::new();
    let mut session = connected_session(&transport).await;

    session.disconnect().await;

    assert!(!session.is_connected());
    assert_eq!(transport.close_count(), 1);
    assert!(!transport.push_frame(r#"{"type":"status","message":"late"}"#));

    session.disconnect().await;
    assert_eq!(transport.close_count(), 1);
}

#[tokio::test]
async fn test_drop_disconnects() {
    let transport = MemoryTransport::new();
    let session = connected_session(&transport).await;

    drop(session);

    tokio::time::timeout(WAIT, async {
        while transport.close_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("transport was not closed on drop");
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let first = MemoryTransport::new();
    let second = MemoryTransport::new();
    let a = connected_session(&first).await;
    let b = connected_session(&second).await;

    first.push_json(json!({"type": "session_created", "session_id": "only-a"}));
    a.wait_for(WAIT, |s| s.session_id.is_some()).await.unwrap();

    assert_eq!(a.session_id().as_deref(), Some("only-a"));
    assert!(b.session_id().is_none());
}

#[tokio::test]
async fn test_updates_stream_yields_snapshots() {
    let transport = MemoryTransport::new();
    let session = connected_session(&transport).await;
    let mut updates = session.updates();

    let initial = updates.next().await.unwrap();
    assert!(initial.is_connected);

    transport.push_json(json!({"type": "status", "message": "tick"}));

    let next = tokio::time::timeout(WAIT, updates.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.messages.len(), 1);
}
