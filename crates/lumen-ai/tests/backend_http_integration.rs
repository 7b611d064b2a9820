use futures_util::StreamExt;
use httpmock::prelude::*;
use lumen_ai::{
    classify, BackendClient, BackendConfig, ChatStreamRequest, ChatTransport, FrameDecoder,
    LumenAiError, MemoryStore, MessageId, MessageRole, PersonaDirectory, StreamEvent,
};
use serde_json::json;

fn client_for(server: &MockServer) -> BackendClient {
    BackendClient::new(BackendConfig {
        api_base: server.base_url(),
        connect_timeout_ms: 5_000,
    })
    .expect("backend client should be created")
}

#[tokio::test]
async fn integration_chat_stream_sends_expected_body_and_yields_events() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/chat/stream")
            .header("accept", "text/event-stream")
            .header_exists("x-lumen-request-id")
            .json_body(json!({
                "message": "describe this",
                "images": ["aGVsbG8="],
                "persona_id": "poet"
            }));
        then.status(200)
            .header("content-type", "text/event-stream")
            .body(concat!(
                "data: {\"searching\":true}\n\n",
                "data: {\"token\":\"Hel\"}\n\n",
                "data: {\"token\":\"lo\"}\n\n",
                "data: {\"done\":true,\"sources\":[],\"user_timestamp\":\"u1\",\"assistant_timestamp\":\"a1\"}\n\n"
            ));
    });

    let client = client_for(&server);
    let mut stream = client
        .open_stream(&ChatStreamRequest {
            message: "describe this".to_string(),
            images: vec!["aGVsbG8=".to_string()],
            persona_id: Some("poet".to_string()),
        })
        .await
        .expect("stream should open");

    let mut decoder = FrameDecoder::new();
    let mut events = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.expect("chunk");
        for frame in decoder.push(&chunk) {
            for record in frame.records() {
                events.extend(classify(record.expect("valid record")));
            }
        }
    }

    mock.assert();
    assert_eq!(events.len(), 4);
    assert_eq!(events[0], StreamEvent::Searching);
    let StreamEvent::Done(done) = &events[3] else {
        panic!("expected done event last");
    };
    assert_eq!(done.user_timestamp, Some(MessageId::new("u1")));
    assert_eq!(done.assistant_timestamp, Some(MessageId::new("a1")));
}

#[tokio::test]
async fn integration_chat_stream_surfaces_server_error_detail() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/chat/stream");
        then.status(400)
            .json_body(json!({"error": "message or images required"}));
    });

    let client = client_for(&server);
    let error = match client.open_stream(&ChatStreamRequest::default()).await {
        Ok(_) => panic!("non-success status must fail before streaming"),
        Err(error) => error,
    };

    mock.assert();
    match &error {
        LumenAiError::HttpStatus { status, .. } => assert_eq!(*status, 400),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(error.user_message(), "message or images required");
}

#[tokio::test]
async fn integration_chat_stream_falls_back_to_status_message_for_opaque_body() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/chat/stream");
        then.status(503).body("upstream unavailable");
    });

    let client = client_for(&server);
    let error = match client.open_stream(&ChatStreamRequest::default()).await {
        Ok(_) => panic!("non-success status must fail before streaming"),
        Err(error) => error,
    };
    assert_eq!(error.user_message(), "Request failed (status 503)");
}

#[tokio::test]
async fn regression_unreachable_server_reports_connectivity_error() {
    let client = BackendClient::new(BackendConfig {
        api_base: "http://127.0.0.1:9".to_string(),
        connect_timeout_ms: 500,
    })
    .expect("client");

    let error = match client.open_stream(&ChatStreamRequest::default()).await {
        Ok(_) => panic!("connection should fail"),
        Err(error) => error,
    };
    assert!(matches!(error, LumenAiError::Http(_)));
    assert!(error.user_message().contains("Could not reach the chat server"));
}

#[tokio::test]
async fn integration_memory_recent_passes_persona_and_parses_entries() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/memory/recent")
            .query_param("persona_id", "poet");
        then.status(200).json_body(json!({
            "entries": [
                {"timestamp": "t1", "role": "user", "content": "hi"},
                {"timestamp": "t2", "role": "assistant", "persona_name": "Poet", "content": "hello",
                 "sources": ["https://example.com"], "generated_image_path": "/personas/poet/images/a.png"}
            ]
        }));
    });

    let client = client_for(&server);
    let entries = client.recent(Some("poet")).await.expect("recent entries");

    mock.assert();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].role, MessageRole::Assistant);
    assert_eq!(
        entries[1].generated_image_path.as_deref(),
        Some("/personas/poet/images/a.png")
    );
}

#[tokio::test]
async fn integration_memory_delete_posts_timestamp_and_maps_not_found() {
    let server = MockServer::start();
    let ok = server.mock(|when, then| {
        when.method(POST)
            .path("/memory/delete")
            .json_body(json!({"timestamp": "t1", "persona_id": "poet"}));
        then.status(200).json_body(json!({"ok": true}));
    });
    let missing = server.mock(|when, then| {
        when.method(POST)
            .path("/memory/delete")
            .json_body(json!({"timestamp": "gone"}));
        then.status(404).json_body(json!({"error": "entry not found"}));
    });

    let client = client_for(&server);
    client
        .delete(Some("poet"), &MessageId::new("t1"))
        .await
        .expect("delete should succeed");
    let error = client
        .delete(None, &MessageId::new("gone"))
        .await
        .expect_err("missing entry should fail");

    ok.assert();
    missing.assert();
    assert_eq!(error.user_message(), "entry not found");
}

#[tokio::test]
async fn integration_memory_clear_and_persona_listing() {
    let server = MockServer::start();
    let clear = server.mock(|when, then| {
        when.method(POST).path("/memory/clear").json_body(json!({}));
        then.status(200).json_body(json!({"ok": true}));
    });
    let personas = server.mock(|when, then| {
        when.method(GET).path("/personas").query_param("public", "false");
        then.status(200).json_body(json!({
            "personas": [
                {"id": "assistant", "name": "Assistant", "path": ".personas/assistant",
                 "config_path": ".personas/assistant/assistant.config",
                 "memory_path": ".personas/assistant/memory.json"},
                {"id": "poet", "name": "Poet"}
            ],
            "default": "assistant"
        }));
    });

    let client = client_for(&server);
    client.clear(None).await.expect("clear should succeed");
    let poet = client
        .lookup("poet")
        .await
        .expect("lookup should succeed")
        .expect("poet exists");
    let missing = client.lookup("nobody").await.expect("lookup should succeed");

    clear.assert();
    personas.assert_calls(2);
    assert_eq!(poet.name, "Poet");
    assert!(missing.is_none());
}
