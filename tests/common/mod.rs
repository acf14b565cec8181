//! In-memory devices, output and channel for driving sessions in tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{Rgb, RgbImage};
use live_guide::capture::{
    AudioConstraints, AudioFrame, Camera, MediaDevices, MediaTrack, Microphone, TrackKind,
    VideoConstraints,
};
use live_guide::channel::{
    ChannelConnector, ChannelEvent, LiveConnectConfig, RealtimeInput, RemoteChannel,
};
use live_guide::codec::DecodedSegment;
use live_guide::error::{ChannelError, DeviceError, OutputError};
use live_guide::playback::{AudioOutput, HandleId};
use live_guide::session::{ConnectionStatus, LiveSession, SessionConfig, SessionHandler, TranscriptRole};
use tokio::sync::{mpsc, Notify};

// ============================================================================
// Microphone
// ============================================================================

#[derive(Default)]
pub struct MicState {
    pub enabled: AtomicBool,
    pub stopped: AtomicBool,
    pub closed: AtomicBool,
    pub started: AtomicBool,
    pub frames: Mutex<Option<mpsc::Sender<AudioFrame>>>,
}

impl MicState {
    /// Deliver one capture callback's worth of samples
    pub async fn push(&self, samples: Vec<f32>) -> bool {
        let tx = self.frames.lock().unwrap().clone();
        match tx {
            Some(tx) => tx
                .send(AudioFrame {
                    samples,
                    sample_rate: 16_000,
                    channels: 1,
                    timestamp_ms: 0,
                })
                .await
                .is_ok(),
            None => false,
        }
    }

    /// Simulate the device disappearing
    pub fn revoke(&self) {
        self.frames.lock().unwrap().take();
    }
}

pub struct FakeMicrophone(pub Arc<MicState>);

impl MediaTrack for FakeMicrophone {
    fn kind(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn label(&self) -> &str {
        "fake microphone"
    }

    fn set_enabled(&self, enabled: bool) {
        self.0.enabled.store(enabled, Ordering::SeqCst);
    }

    fn stop(&self) -> Result<(), DeviceError> {
        self.0.stopped.store(true, Ordering::SeqCst);
        self.0.frames.lock().unwrap().take();
        Ok(())
    }
}

#[async_trait::async_trait]
impl Microphone for FakeMicrophone {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, DeviceError> {
        let (tx, rx) = mpsc::channel(64);
        *self.0.frames.lock().unwrap() = Some(tx);
        self.0.started.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.0.closed.store(true, Ordering::SeqCst);
        self.0.frames.lock().unwrap().take();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Camera
// ============================================================================

#[derive(Default)]
pub struct CameraState {
    pub stopped: AtomicBool,
    pub snapshots: AtomicUsize,
}

pub struct FakeCamera(pub Arc<CameraState>);

impl MediaTrack for FakeCamera {
    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn label(&self) -> &str {
        "fake camera"
    }

    fn set_enabled(&self, _enabled: bool) {}

    fn stop(&self) -> Result<(), DeviceError> {
        self.0.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Camera for FakeCamera {
    fn snapshot(&self) -> Option<RgbImage> {
        if self.0.stopped.load(Ordering::SeqCst) {
            return None;
        }
        self.0.snapshots.fetch_add(1, Ordering::SeqCst);
        Some(RgbImage::from_pixel(8, 8, Rgb([40, 80, 120])))
    }
}

// ============================================================================
// Output
// ============================================================================

#[derive(Default)]
pub struct OutputState {
    pub now: Mutex<f64>,
    pub played: Mutex<Vec<(HandleId, f64)>>,
    pub halted: Mutex<Vec<HandleId>>,
    pub closed: AtomicBool,
    pub ended: Mutex<Option<mpsc::UnboundedSender<HandleId>>>,
}

impl OutputState {
    /// Report a voice as finished on its own
    pub fn finish(&self, id: HandleId) {
        if let Some(tx) = self.ended.lock().unwrap().as_ref() {
            let _ = tx.send(id);
        }
    }
}

/// Output whose clock only moves when a test moves it
pub struct FakeOutput(pub Arc<OutputState>);

impl AudioOutput for FakeOutput {
    fn current_time(&self) -> f64 {
        *self.0.now.lock().unwrap()
    }

    fn sample_rate(&self) -> u32 {
        24_000
    }

    fn play(&mut self, id: HandleId, _: &DecodedSegment, start: f64) -> Result<(), OutputError> {
        if self.is_closed() {
            return Err(OutputError::Closed);
        }
        self.0.played.lock().unwrap().push((id, start));
        Ok(())
    }

    fn halt(&mut self, id: HandleId) -> Result<(), OutputError> {
        self.0.halted.lock().unwrap().push(id);
        Ok(())
    }

    fn close(&mut self) -> Result<(), OutputError> {
        if self.0.closed.swap(true, Ordering::SeqCst) {
            return Err(OutputError::Closed);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Devices
// ============================================================================

#[derive(Default)]
pub struct FakeDevices {
    pub mic: Arc<MicState>,
    pub camera: Arc<CameraState>,
    pub output: Arc<OutputState>,
    pub deny_microphone: AtomicBool,
    pub deny_camera: AtomicBool,
    pub microphones_opened: AtomicUsize,
}

#[async_trait::async_trait]
impl MediaDevices for FakeDevices {
    async fn open_microphone(
        &self,
        _constraints: &AudioConstraints,
    ) -> Result<Box<dyn Microphone>, DeviceError> {
        if self.deny_microphone.load(Ordering::SeqCst) {
            return Err(DeviceError::PermissionDenied("microphone".to_string()));
        }
        self.microphones_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeMicrophone(Arc::clone(&self.mic))))
    }

    async fn open_camera(
        &self,
        _constraints: &VideoConstraints,
    ) -> Result<Arc<dyn Camera>, DeviceError> {
        if self.deny_camera.load(Ordering::SeqCst) {
            return Err(DeviceError::PermissionDenied("camera".to_string()));
        }
        Ok(Arc::new(FakeCamera(Arc::clone(&self.camera))))
    }

    async fn open_output(
        &self,
        _sample_rate: u32,
        ended: mpsc::UnboundedSender<HandleId>,
    ) -> Result<Box<dyn AudioOutput>, DeviceError> {
        *self.output.ended.lock().unwrap() = Some(ended);
        Ok(Box::new(FakeOutput(Arc::clone(&self.output))))
    }
}

// ============================================================================
// Channel
// ============================================================================

#[derive(Default)]
pub struct ChannelState {
    pub sent: Mutex<Vec<RealtimeInput>>,
    pub closed: AtomicBool,
    pub close_calls: AtomicUsize,
    pub sent_after_close: AtomicUsize,
    pub events: Mutex<Option<mpsc::Sender<ChannelEvent>>>,
    pub connected: Mutex<Option<LiveConnectConfig>>,
}

impl ChannelState {
    /// Deliver an inbound event as if the service had sent it
    pub async fn emit(&self, event: ChannelEvent) {
        let tx = self.events.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }

    pub fn audio_chunks(&self) -> Vec<live_guide::codec::EncodedAudioChunk> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|input| match input {
                RealtimeInput::Audio(chunk) => Some(chunk.clone()),
                RealtimeInput::Video(_) => None,
            })
            .collect()
    }

    pub fn video_frames(&self) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|input| matches!(input, RealtimeInput::Video(_)))
            .count()
    }
}

pub struct FakeChannel(pub Arc<ChannelState>);

impl RemoteChannel for FakeChannel {
    fn send_realtime_input(&self, input: RealtimeInput) -> Result<(), ChannelError> {
        if self.0.closed.load(Ordering::SeqCst) {
            self.0.sent_after_close.fetch_add(1, Ordering::SeqCst);
            return Err(ChannelError::Closed);
        }
        self.0.sent.lock().unwrap().push(input);
        Ok(())
    }

    fn close(&self) -> Result<(), ChannelError> {
        self.0.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.0.closed.swap(true, Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeConnector {
    pub channel: Arc<ChannelState>,
    pub refuse: AtomicBool,
    /// When set, `connect` waits for a notification before returning
    pub gate: Option<Arc<Notify>>,
}

#[async_trait::async_trait]
impl ChannelConnector for FakeConnector {
    async fn connect(
        &self,
        config: &LiveConnectConfig,
    ) -> Result<(Arc<dyn RemoteChannel>, mpsc::Receiver<ChannelEvent>), ChannelError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ChannelError::Connect("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::channel(64);
        *self.channel.events.lock().unwrap() = Some(tx);
        *self.channel.connected.lock().unwrap() = Some(config.clone());

        Ok((Arc::new(FakeChannel(Arc::clone(&self.channel))), rx))
    }
}

// ============================================================================
// Handler
// ============================================================================

#[derive(Default)]
pub struct RecordingHandler {
    pub statuses: Mutex<Vec<ConnectionStatus>>,
    pub errors: Mutex<Vec<String>>,
    pub transcripts: Mutex<Vec<(String, TranscriptRole)>>,
}

impl SessionHandler for RecordingHandler {
    fn on_transcription(&self, text: &str, role: TranscriptRole) {
        self.transcripts.lock().unwrap().push((text.to_string(), role));
    }

    fn on_status_change(&self, status: ConnectionStatus) {
        self.statuses.lock().unwrap().push(status);
    }

    fn on_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub session: LiveSession,
    pub devices: Arc<FakeDevices>,
    pub connector: Arc<FakeConnector>,
    pub handler: Arc<RecordingHandler>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(SessionConfig::default(), FakeConnector::default())
    }

    pub fn with(mut config: SessionConfig, connector: FakeConnector) -> Self {
        // Keep the camera quiet unless a test asks for it
        if config.video_interval == SessionConfig::default().video_interval {
            config.video_interval = Duration::from_secs(3600);
        }

        let devices = Arc::new(FakeDevices::default());
        let connector = Arc::new(connector);
        let handler = Arc::new(RecordingHandler::default());

        let session = LiveSession::new(
            config,
            devices.clone(),
            connector.clone(),
            handler.clone(),
        );

        Self {
            session,
            devices,
            connector,
            handler,
        }
    }

    pub fn channel(&self) -> &ChannelState {
        &self.connector.channel
    }

    /// Start and wait until the session is streaming
    pub async fn start_active(&self) {
        self.session.start().await.unwrap();
        self.channel().emit(ChannelEvent::Open).await;
        self.wait_for_status(ConnectionStatus::Active).await;
        wait_until(|| self.devices.mic.started.load(Ordering::SeqCst)).await;
    }

    pub async fn wait_for_status(&self, status: ConnectionStatus) {
        for _ in 0..400 {
            if self.session.status().await == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("session never reached {}", status);
    }
}

/// Poll until `condition` holds (2s limit)
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never became true");
}

/// Give spawned tasks a chance to run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
