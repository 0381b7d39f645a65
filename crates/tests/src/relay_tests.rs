//! End-to-end pipeline scenarios: synthetic audio and speech backends, real
//! server, real WebSocket listeners.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use airscribe_relay::PipelineState;
use airscribe_relay::error::RelayError;

use crate::fixtures::backends::{
    FailingReformat, FixedReformat, PendingPcm, ScriptedSpeech, StaticPcm,
};
use crate::fixtures::test_app::{TEST_CHUNK_BYTES, TestApp, next_transcription};

const PLAYLIST: &str = "File1=http://example.com/stream.mp3\n";

#[tokio::test]
async fn silent_stream_ends_with_no_broadcasts() {
    let pcm = Arc::new(StaticPcm::silence(TEST_CHUNK_BYTES));
    let speech = Arc::new(ScriptedSpeech::new(Vec::new()));

    let app = TestApp::spawn(PLAYLIST, pcm.clone(), speech.clone(), None).await;
    let mut listener = app.connect_listener().await;
    app.wait_for_listener_count(1).await;

    app.run_pipeline().await.unwrap().unwrap();

    assert_eq!(app.pipeline.state(), PipelineState::Stopped);
    assert_eq!(
        pcm.opened_url.lock().unwrap().as_deref(),
        Some("http://example.com/stream.mp3")
    );
    // One 2-second frame forwarded, then end-of-stream.
    assert_eq!(speech.frames_seen.load(Ordering::SeqCst), 1);
    assert_eq!(next_transcription(&mut listener).await, None);
}

#[tokio::test]
async fn transcription_reaches_every_listener_exactly_once() {
    let pcm = Arc::new(StaticPcm::silence(TEST_CHUNK_BYTES));
    let speech = Arc::new(ScriptedSpeech::new(vec!["taxi to runway two seven"]));
    let reformatter = Arc::new(FixedReformat("Taxi to runway 27."));

    let app = TestApp::spawn(PLAYLIST, pcm, speech, Some(reformatter)).await;
    let mut first = app.connect_listener().await;
    let mut second = app.connect_listener().await;
    app.wait_for_listener_count(2).await;

    app.run_pipeline().await.unwrap().unwrap();

    assert_eq!(
        next_transcription(&mut first).await.as_deref(),
        Some("Taxi to runway 27.")
    );
    assert_eq!(
        next_transcription(&mut second).await.as_deref(),
        Some("Taxi to runway 27.")
    );

    // Exactly once: nothing further arrives on either socket.
    assert_eq!(next_transcription(&mut first).await, None);
    assert_eq!(next_transcription(&mut second).await, None);
}

#[tokio::test]
async fn reformat_failure_falls_back_to_the_raw_transcript() {
    let pcm = Arc::new(StaticPcm::silence(TEST_CHUNK_BYTES));
    let speech = Arc::new(ScriptedSpeech::new(vec!["cleared to land runway one niner"]));

    let app = TestApp::spawn(PLAYLIST, pcm, speech, Some(Arc::new(FailingReformat))).await;
    let mut listener = app.connect_listener().await;
    app.wait_for_listener_count(1).await;

    app.run_pipeline().await.unwrap().unwrap();

    assert_eq!(
        next_transcription(&mut listener).await.as_deref(),
        Some("cleared to land runway one niner")
    );
}

#[tokio::test]
async fn segments_are_broadcast_in_emission_order() {
    let pcm = Arc::new(StaticPcm::silence(TEST_CHUNK_BYTES));
    let speech = Arc::new(ScriptedSpeech::new(vec![
        "contact tower one one eight point seven",
        "hold short runway two eight left",
        "cleared for takeoff",
    ]));

    let app = TestApp::spawn(PLAYLIST, pcm, speech, None).await;
    let mut listener = app.connect_listener().await;
    app.wait_for_listener_count(1).await;

    app.run_pipeline().await.unwrap().unwrap();

    let mut received = Vec::new();
    while let Some(text) = next_transcription(&mut listener).await {
        received.push(text);
    }
    assert_eq!(
        received,
        vec![
            "contact tower one one eight point seven",
            "hold short runway two eight left",
            "cleared for takeoff",
        ]
    );
}

#[tokio::test]
async fn stop_ends_a_live_stream_and_is_idempotent() {
    let app = TestApp::spawn(
        PLAYLIST,
        Arc::new(PendingPcm),
        Arc::new(ScriptedSpeech::new(Vec::new())),
        None,
    )
    .await;

    let runner = app.run_pipeline();

    let mut state_rx = app.pipeline.subscribe_state();
    while *state_rx.borrow_and_update() < PipelineState::Running {
        state_rx.changed().await.unwrap();
    }

    app.pipeline.stop();
    app.pipeline.stop();

    tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("pipeline should stop promptly")
        .unwrap()
        .unwrap();
    assert_eq!(app.pipeline.state(), PipelineState::Stopped);

    app.pipeline.stop();
    assert_eq!(app.pipeline.state(), PipelineState::Stopped);
}

#[tokio::test]
async fn playlist_without_stream_entry_aborts_startup() {
    let app = TestApp::spawn(
        "[playlist]\nTitle1=Tower\n",
        Arc::new(PendingPcm),
        Arc::new(ScriptedSpeech::new(Vec::new())),
        None,
    )
    .await;

    let result = app.run_pipeline().await.unwrap();
    assert!(matches!(result, Err(RelayError::PlaylistResolve { .. })));
    assert_eq!(app.pipeline.state(), PipelineState::Stopped);
}
