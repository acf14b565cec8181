mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{settle, wait_until, FakeConnector, Harness};
use live_guide::channel::{ChannelEvent, ServerMessage};
use live_guide::codec::{encode_audio, to_base64};
use live_guide::error::SessionError;
use live_guide::session::{ConnectionStatus, SessionConfig, TranscriptRole};
use tokio::sync::Notify;

fn speech_message(seconds: f64) -> ChannelEvent {
    let samples = vec![0.1f32; (seconds * 24_000.0) as usize];
    let data = to_base64(encode_audio(&samples).data());
    let json = format!(
        r#"{{"serverContent":{{"modelTurn":{{"parts":[{{"inlineData":{{"mimeType":"audio/pcm;rate=24000","data":"{}"}}}}]}}}}}}"#,
        data
    );
    ChannelEvent::Message(serde_json::from_str(&json).unwrap())
}

fn server_message(json: &str) -> ChannelEvent {
    let message: ServerMessage = serde_json::from_str(json).unwrap();
    ChannelEvent::Message(message)
}

#[tokio::test]
async fn test_open_activates_session() {
    let h = Harness::new();

    h.session.start().await.unwrap();
    assert_eq!(h.session.status().await, ConnectionStatus::Connecting);
    assert!(!h.devices.mic.started.load(Ordering::SeqCst));

    let connected = h.channel().connected.lock().unwrap().clone().unwrap();
    assert_eq!(connected.model, SessionConfig::default().model);
    assert!(connected.session_id.starts_with("live-"));

    h.channel().emit(ChannelEvent::Open).await;
    h.wait_for_status(ConnectionStatus::Active).await;
    wait_until(|| h.devices.mic.started.load(Ordering::SeqCst)).await;

    assert_eq!(
        *h.handler.statuses.lock().unwrap(),
        vec![ConnectionStatus::Connecting, ConnectionStatus::Active]
    );
    assert!(h.session.stats().await.session_id.is_some());
}

#[tokio::test]
async fn test_silent_window_sends_exactly_one_chunk() {
    let h = Harness::new();
    h.start_active().await;

    assert!(h.devices.mic.push(vec![0.0; 4096]).await);
    wait_until(|| !h.channel().audio_chunks().is_empty()).await;
    settle().await;

    let chunks = h.channel().audio_chunks();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].sample_rate(), 16_000);
    assert_eq!(chunks[0].data().len(), 8192);
    assert!(chunks[0].data().iter().all(|&b| b == 0));
}

#[tokio::test]
async fn test_partial_windows_are_joined() {
    let h = Harness::new();
    h.start_active().await;

    h.devices.mic.push(vec![0.0; 3000]).await;
    h.devices.mic.push(vec![0.0; 3000]).await;
    wait_until(|| h.channel().audio_chunks().len() == 1).await;
    settle().await;

    assert_eq!(h.channel().audio_chunks().len(), 1);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let h = Harness::new();
    h.start_active().await;

    h.session.stop().await;

    assert_eq!(h.session.status().await, ConnectionStatus::Idle);
    assert!(!h.session.holds_resources().await);
    assert!(h.devices.mic.stopped.load(Ordering::SeqCst));
    assert!(h.devices.mic.closed.load(Ordering::SeqCst));
    assert!(h.devices.camera.stopped.load(Ordering::SeqCst));
    assert!(h.devices.output.closed.load(Ordering::SeqCst));
    assert!(h.channel().closed.load(Ordering::SeqCst));

    let statuses = h.handler.statuses.lock().unwrap().len();

    h.session.stop().await;

    assert_eq!(h.session.status().await, ConnectionStatus::Idle);
    assert!(!h.session.holds_resources().await);
    assert_eq!(h.channel().close_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.handler.statuses.lock().unwrap().len(), statuses);
    assert!(h.handler.errors.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_stop_before_start_does_nothing() {
    let h = Harness::new();

    h.session.stop().await;

    assert_eq!(h.session.status().await, ConnectionStatus::Idle);
    assert!(h.handler.statuses.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_no_media_after_stop_with_capture_in_flight() {
    let h = Harness::new();
    h.start_active().await;

    let mic = Arc::clone(&h.devices.mic);
    let capture = async move {
        for _ in 0..32 {
            if !mic.push(vec![0.2; 4096]).await {
                break;
            }
            tokio::task::yield_now().await;
        }
    };

    tokio::join!(capture, h.session.stop());
    let after_stop = h.channel().audio_chunks().len();

    assert!(!h.devices.mic.push(vec![0.2; 4096]).await);
    settle().await;

    assert_eq!(h.channel().sent_after_close.load(Ordering::SeqCst), 0);
    assert_eq!(h.channel().audio_chunks().len(), after_stop);
    assert_eq!(h.session.stats().await.audio_chunks_sent, after_stop);
}

#[tokio::test]
async fn test_interrupt_halts_live_segments_and_resets_cursor() {
    let h = Harness::new();
    h.start_active().await;

    h.channel().emit(speech_message(0.5)).await;
    h.channel().emit(speech_message(0.25)).await;

    let mut state = None;
    for _ in 0..400 {
        state = h.session.playback_state().await;
        if matches!(state, Some((_, 2))) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let (cursor, live) = state.unwrap();
    assert_eq!(live, 2);
    assert!((cursor - 0.75).abs() < 1e-9);

    let played = h.devices.output.played.lock().unwrap().clone();
    assert_eq!(played[0].1, 0.0);
    assert!((played[1].1 - 0.5).abs() < 1e-9);

    h.channel()
        .emit(server_message(r#"{"serverContent":{"interrupted":true}}"#))
        .await;
    wait_until(|| h.devices.output.halted.lock().unwrap().len() == 2).await;
    settle().await;

    let (cursor, live) = h.session.playback_state().await.unwrap();
    assert_eq!(live, 0);
    assert_eq!(cursor, 0.0);

    let mut halted = h.devices.output.halted.lock().unwrap().clone();
    halted.sort_unstable();
    assert_eq!(halted, vec![played[0].0, played[1].0]);
    assert_eq!(h.session.stats().await.interruptions, 1);
}

#[tokio::test]
async fn test_finished_segment_leaves_live_set() {
    let h = Harness::new();
    h.start_active().await;

    h.channel().emit(speech_message(0.1)).await;
    wait_until(|| h.devices.output.played.lock().unwrap().len() == 1).await;

    let id = h.devices.output.played.lock().unwrap()[0].0;
    h.devices.output.finish(id);

    for _ in 0..400 {
        if let Some((_, 0)) = h.session.playback_state().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("finished segment was never released");
}

#[tokio::test]
async fn test_undecodable_audio_is_dropped() {
    let h = Harness::new();
    h.start_active().await;

    let odd = to_base64(&[1, 2, 3]);
    let json = format!(
        r#"{{"serverContent":{{"modelTurn":{{"parts":[{{"inlineData":{{"mimeType":"audio/pcm;rate=24000","data":"{}"}}}}]}}}}}}"#,
        odd
    );
    h.channel().emit(server_message(&json)).await;
    h.channel().emit(speech_message(0.1)).await;
    wait_until(|| h.devices.output.played.lock().unwrap().len() == 1).await;

    let stats = h.session.stats().await;
    assert_eq!(stats.playback_segments_dropped, 1);
    assert_eq!(stats.playback_segments_scheduled, 1);
    assert_eq!(h.session.status().await, ConnectionStatus::Active);
}

#[tokio::test]
async fn test_transcriptions_are_forwarded_with_roles() {
    let h = Harness::new();
    h.start_active().await;

    h.channel()
        .emit(server_message(
            r#"{"serverContent":{"inputTranscription":{"text":"where is the door"}}}"#,
        ))
        .await;
    h.channel()
        .emit(server_message(
            r#"{"serverContent":{"outputTranscription":{"text":"two steps to your left"}}}"#,
        ))
        .await;
    wait_until(|| h.handler.transcripts.lock().unwrap().len() == 2).await;

    let transcripts = h.handler.transcripts.lock().unwrap().clone();
    assert_eq!(
        transcripts,
        vec![
            ("where is the door".to_string(), TranscriptRole::User),
            ("two steps to your left".to_string(), TranscriptRole::Assistant),
        ]
    );
}

#[tokio::test]
async fn test_remote_error_surfaces_then_tears_down() {
    let h = Harness::new();
    h.start_active().await;

    h.channel()
        .emit(ChannelEvent::Error("quota exceeded".to_string()))
        .await;
    h.wait_for_status(ConnectionStatus::Idle).await;

    assert_eq!(
        *h.handler.statuses.lock().unwrap(),
        vec![
            ConnectionStatus::Connecting,
            ConnectionStatus::Active,
            ConnectionStatus::Error,
            ConnectionStatus::Idle,
        ]
    );
    let errors = h.handler.errors.lock().unwrap().clone();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("quota exceeded"));
    assert!(h.session.last_error().await.unwrap().contains("quota exceeded"));
    assert!(!h.session.holds_resources().await);
    assert!(h.channel().closed.load(Ordering::SeqCst));

    // A later stop has nothing left to do
    h.session.stop().await;
    assert_eq!(h.handler.statuses.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn test_remote_close_tears_down() {
    let h = Harness::new();
    h.start_active().await;

    h.channel()
        .emit(ChannelEvent::Close {
            reason: Some("session expired".to_string()),
        })
        .await;
    h.wait_for_status(ConnectionStatus::Idle).await;

    assert!(!h.session.holds_resources().await);
    assert!(h.devices.camera.stopped.load(Ordering::SeqCst));
    assert!(h.handler.errors.lock().unwrap().is_empty());
    assert!(h.session.last_error().await.is_none());
}

#[tokio::test]
async fn test_revoked_microphone_is_fatal() {
    let h = Harness::new();
    h.start_active().await;

    h.devices.mic.revoke();
    h.wait_for_status(ConnectionStatus::Idle).await;

    let errors = h.handler.errors.lock().unwrap().clone();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("revoked"));
    assert!(h
        .handler
        .statuses
        .lock()
        .unwrap()
        .contains(&ConnectionStatus::Error));
    assert!(!h.session.holds_resources().await);
}

#[tokio::test]
async fn test_denied_camera_fails_start() {
    let h = Harness::new();
    h.devices.deny_camera.store(true, Ordering::SeqCst);

    let result = h.session.start().await;

    assert!(matches!(result, Err(SessionError::DeviceAccess(_))));
    assert_eq!(h.session.status().await, ConnectionStatus::Error);
    assert!(h.session.last_error().await.is_some());
    assert_eq!(h.handler.errors.lock().unwrap().len(), 1);
    assert!(!h.session.holds_resources().await);
    // The microphone acquired first is released again
    assert!(h.devices.mic.stopped.load(Ordering::SeqCst));
    assert!(h.channel().connected.lock().unwrap().is_none());

    // Retrying from ERROR is allowed
    h.devices.deny_camera.store(false, Ordering::SeqCst);
    h.session.start().await.unwrap();
    assert_eq!(h.session.status().await, ConnectionStatus::Connecting);
    assert!(h.session.last_error().await.is_none());
}

#[tokio::test]
async fn test_refused_connection_releases_devices() {
    let connector = FakeConnector::default();
    connector.refuse.store(true, Ordering::SeqCst);
    let h = Harness::with(SessionConfig::default(), connector);

    let result = h.session.start().await;

    assert!(matches!(result, Err(SessionError::ChannelConnect(_))));
    assert_eq!(h.session.status().await, ConnectionStatus::Error);
    assert!(h.devices.mic.stopped.load(Ordering::SeqCst));
    assert!(h.devices.camera.stopped.load(Ordering::SeqCst));
    assert!(h.devices.output.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_second_start_is_rejected() {
    let h = Harness::new();
    h.start_active().await;

    let result = h.session.start().await;

    assert!(matches!(
        result,
        Err(SessionError::AlreadyActive(ConnectionStatus::Active))
    ));
    assert_eq!(h.devices.microphones_opened.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stop_while_connecting_cancels_start() {
    let gate = Arc::new(Notify::new());
    let connector = FakeConnector {
        gate: Some(Arc::clone(&gate)),
        ..FakeConnector::default()
    };
    let h = Harness::with(SessionConfig::default(), connector);

    let session = h.session.clone();
    let start = tokio::spawn(async move { session.start().await });

    h.wait_for_status(ConnectionStatus::Connecting).await;
    h.session.stop().await;
    assert_eq!(h.session.status().await, ConnectionStatus::Idle);

    gate.notify_one();
    let result = start.await.unwrap();

    assert!(matches!(result, Err(SessionError::Cancelled)));
    assert_eq!(h.session.status().await, ConnectionStatus::Idle);
    assert!(!h.session.holds_resources().await);
    assert!(h.channel().closed.load(Ordering::SeqCst));
    assert!(h.devices.output.closed.load(Ordering::SeqCst));
    assert!(h.devices.mic.stopped.load(Ordering::SeqCst));
    assert!(!h.devices.mic.started.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_camera_frames_follow_the_timer() {
    let config = SessionConfig {
        video_interval: Duration::from_millis(20),
        ..SessionConfig::default()
    };
    let h = Harness::with(config, FakeConnector::default());
    h.start_active().await;

    wait_until(|| h.channel().video_frames() >= 2).await;
    h.session.stop().await;
    let sent = h.channel().video_frames();

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.channel().video_frames(), sent);
    assert_eq!(h.session.stats().await.video_frames_sent, sent);
    assert_eq!(h.channel().sent_after_close.load(Ordering::SeqCst), 0);
}
