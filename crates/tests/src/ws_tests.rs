//! Listener endpoint behavior: health, join/leave, ignored client messages,
//! and best-effort broadcast.

use std::sync::Arc;

use futures::SinkExt;
use tokio_tungstenite::tungstenite::Message;

use airscribe_api::ws::dispatcher;
use airscribe_relay::FormattedMessage;

use crate::fixtures::backends::{PendingPcm, ScriptedSpeech};
use crate::fixtures::test_app::{TestApp, next_transcription};

const PLAYLIST: &str = "File1=http://example.com/stream.mp3\n";

async fn idle_app() -> TestApp {
    TestApp::spawn(
        PLAYLIST,
        Arc::new(PendingPcm),
        Arc::new(ScriptedSpeech::new(Vec::new())),
        None,
    )
    .await
}

fn message(text: &str) -> FormattedMessage {
    FormattedMessage {
        original_text: text.to_string(),
        display_text: text.to_string(),
    }
}

#[tokio::test]
async fn health_reports_state_and_listener_count() {
    let app = idle_app().await;

    let body: serde_json::Value = reqwest::get(format!("http://{}/health", app.addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "ok");
    assert_eq!(body["pipeline"], "Starting");
    assert_eq!(body["subscribers"], 0);
}

#[tokio::test]
async fn listeners_join_and_leave() {
    let app = idle_app().await;

    let mut listener = app.connect_listener().await;
    app.wait_for_listener_count(1).await;

    listener.close(None).await.unwrap();
    app.wait_for_listener_count(0).await;
}

#[tokio::test]
async fn client_messages_are_ignored() {
    let app = idle_app().await;

    let mut listener = app.connect_listener().await;
    app.wait_for_listener_count(1).await;

    listener
        .send(Message::text(r#"{"anything": "goes"}"#))
        .await
        .unwrap();

    // The connection stays up and still receives broadcasts.
    dispatcher::broadcast(&app.subscribers, &message("radio check")).await;
    assert_eq!(
        next_transcription(&mut listener).await.as_deref(),
        Some("radio check")
    );
}

#[tokio::test]
async fn broadcast_with_no_listeners_is_a_no_op() {
    let app = idle_app().await;
    dispatcher::broadcast(&app.subscribers, &message("anybody home")).await;
}

#[tokio::test]
async fn dead_listener_does_not_block_the_rest() {
    let app = idle_app().await;

    let dropped = app.connect_listener().await;
    let mut alive = app.connect_listener().await;
    app.wait_for_listener_count(2).await;

    // Tear the first socket down without a close handshake.
    drop(dropped);

    // Both broadcasts go through; whichever one hits the dead socket first
    // removes it and carries on.
    dispatcher::broadcast(&app.subscribers, &message("first")).await;
    dispatcher::broadcast(&app.subscribers, &message("second")).await;

    assert_eq!(
        next_transcription(&mut alive).await.as_deref(),
        Some("first")
    );
    assert_eq!(
        next_transcription(&mut alive).await.as_deref(),
        Some("second")
    );
}
