use std::sync::Arc;

use httpmock::prelude::*;
use lumen_ai::{BackendClient, BackendConfig, GeneratedImage, MessageId};
use lumen_session::{ChatController, ImagePayload, RenderInstruction, SubmitOutcome};
use serde_json::json;

fn controller_for(server: &MockServer) -> ChatController {
    let client = Arc::new(
        BackendClient::new(BackendConfig {
            api_base: server.base_url(),
            connect_timeout_ms: 5_000,
        })
        .expect("backend client should be created"),
    );
    ChatController::new(client.clone(), client.clone(), client)
}

#[tokio::test]
async fn integration_streamed_reply_is_rendered_and_reconciled() {
    let server = MockServer::start();
    let stream = server.mock(|when, then| {
        when.method(POST)
            .path("/chat/stream")
            .json_body(json!({"message": "draw a cat"}));
        then.status(200)
            .header("content-type", "text/event-stream")
            .body(concat!(
                "data: {\"thinking\":\"cats...\"}\n\n",
                "data: {\"token\":\"Here\"}\n\n",
                "data: {\"token\":\" you go\"}\n\n",
                "data: {\"done\":true,\"sources\":[\"https://cats.example\"],",
                "\"image_result\":{\"generated_image_path\":\"/img/cat.png\"},",
                "\"user_timestamp\":1700000000.5,\"assistant_timestamp\":\"a1\"}\n\n"
            ));
    });
    let delete = server.mock(|when, then| {
        when.method(POST)
            .path("/memory/delete")
            .json_body(json!({"timestamp": "a1"}));
        then.status(200).json_body(json!({"ok": true}));
    });

    let mut controller = controller_for(&server);
    let mut rendered = Vec::new();
    let SubmitOutcome::Exchanged(report) = controller
        .submit("draw a cat", &mut rendered)
        .await
        .expect("submit")
    else {
        panic!("expected an exchange");
    };

    stream.assert();
    assert_eq!(report.outcome.summary.thinking, "cats...");
    assert_eq!(report.outcome.summary.text, "Here you go");
    assert!(rendered.contains(&RenderInstruction::CollapseThinking));
    assert!(rendered.contains(&RenderInstruction::ShowSources(vec![
        "https://cats.example".to_string()
    ])));
    assert!(rendered.contains(&RenderInstruction::ShowGeneratedImage(
        GeneratedImage::Path("/img/cat.png".to_string())
    )));

    let transcript = controller.transcript();
    let user = transcript.get(report.user_entry).expect("user entry");
    assert_eq!(user.timestamp(), Some(&MessageId::new("1700000000.5")));
    let assistant = transcript.get(report.assistant_entry).expect("assistant entry");
    assert_eq!(assistant.text, "Here you go");
    assert!(assistant.is_deletable());

    controller
        .delete(report.assistant_entry)
        .await
        .expect("delete");
    delete.assert();
    assert_eq!(controller.transcript().len(), 1);
}

#[tokio::test]
async fn integration_server_rejection_is_shown_on_assistant_entry() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/chat/stream");
        then.status(400)
            .json_body(json!({"error": "message or images required"}));
    });

    let mut controller = controller_for(&server);
    controller
        .composer_mut()
        .attach(ImagePayload::from_bytes(b"png".to_vec()));
    let error = controller
        .submit("", &mut Vec::new())
        .await
        .expect_err("server rejects");

    assert_eq!(error.user_message(), "message or images required");
    let entries = controller.transcript().entries();
    assert!(entries[1].is_error);
    assert!(!controller.is_busy());
}

#[tokio::test]
async fn integration_error_done_record_flags_response() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/chat/stream");
        then.status(200)
            .header("content-type", "text/event-stream")
            .body("data: {\"done\":true,\"error\":\"model offline\",\"final\":\"Sorry.\"}");
    });

    let mut controller = controller_for(&server);
    let mut rendered = Vec::new();
    let SubmitOutcome::Exchanged(report) = controller
        .submit("hi", &mut rendered)
        .await
        .expect("submit")
    else {
        panic!("expected an exchange");
    };

    assert!(report.outcome.summary.is_error);
    assert_eq!(
        report.outcome.summary.error_detail.as_deref(),
        Some("model offline")
    );
    assert!(rendered.contains(&RenderInstruction::HideThinking));
    let assistant = controller
        .transcript()
        .get(report.assistant_entry)
        .expect("assistant entry");
    assert_eq!(assistant.text, "Sorry.");
    assert!(assistant.is_error);
    assert!(!assistant.is_deletable());
}

#[tokio::test]
async fn integration_switch_persona_loads_its_history() {
    let server = MockServer::start();
    let personas = server.mock(|when, then| {
        when.method(GET).path("/personas").query_param("public", "false");
        then.status(200).json_body(json!({
            "personas": [{"id": "poet", "name": "Poet"}],
            "default": "poet"
        }));
    });
    let recent = server.mock(|when, then| {
        when.method(GET)
            .path("/memory/recent")
            .query_param("persona_id", "poet");
        then.status(200).json_body(json!({
            "entries": [
                {"timestamp": "t1", "role": "user", "content": "a rhyme?"},
                {"timestamp": "t2", "role": "assistant", "content": "in time."}
            ]
        }));
    });

    let mut controller = controller_for(&server);
    controller.switch_persona("poet").await.expect("switch");

    personas.assert();
    recent.assert();
    assert_eq!(controller.persona_id(), Some("poet"));
    assert_eq!(controller.transcript().len(), 2);
}
