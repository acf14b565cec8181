use chrono::Utc;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::events::{SessionEvent, SessionHandler, TranscriptRole};
use super::state::{ConnectionStatus, StopFlag};
use super::stats::SessionStats;
use crate::capture::{
    spawn_video_timer, AudioCapturePipeline, AudioConstraints, MediaDevices, MediaStream,
    VideoCapturePipeline, VideoConstraints,
};
use crate::channel::{ChannelConnector, ChannelEvent, LiveConnectConfig, RemoteChannel, ServerMessage};
use crate::codec::{decode_audio, from_base64};
use crate::error::{DeviceError, Result, SessionError};
use crate::playback::{AudioOutput, PlaybackScheduler};

/// Collaborators a session is built from
struct Shared {
    config: SessionConfig,
    devices: Arc<dyn MediaDevices>,
    connector: Arc<dyn ChannelConnector>,
    handler: Arc<dyn SessionHandler>,
}

/// The live streaming session controller
///
/// Owns every resource of the current engagement: the media stream, the
/// playback scheduler and its output, the remote channel, both capture
/// pipelines and the video timer. Inbound events are routed by a single
/// dispatch task, one at a time, under the session lock.
///
/// Cloning is cheap; all clones control the same session.
#[derive(Clone)]
pub struct LiveSession {
    shared: Arc<Shared>,
    core: Arc<Mutex<SessionCore>>,
    /// Stop flag of the current engagement, reachable without the lock
    stopping: Arc<StdMutex<StopFlag>>,
}

/// Resources of one engagement; all `None` while idle
struct SessionCore {
    status: ConnectionStatus,
    stopping: StopFlag,
    stream: Option<MediaStream>,
    channel: Option<Arc<dyn RemoteChannel>>,
    scheduler: Option<PlaybackScheduler>,
    audio: Option<AudioCapturePipeline>,
    video: Option<VideoCapturePipeline>,
    video_timer: Option<JoinHandle<()>>,
    forwarders: Vec<JoinHandle<()>>,
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
    stats: SessionStats,
    last_error: Option<String>,
}

/// Resources acquired by `start()` before they are handed to the session
#[derive(Default)]
struct Acquired {
    stream: Option<MediaStream>,
    output: Option<Box<dyn AudioOutput>>,
    channel: Option<Arc<dyn RemoteChannel>>,
}

impl Acquired {
    /// Release everything in teardown order, ignoring failures
    fn release(self) {
        if let Some(mut output) = self.output {
            if let Err(e) = output.close() {
                debug!("Ignoring output close failure: {}", e);
            }
        }
        if let Some(mut stream) = self.stream {
            if let Err(e) = stream.microphone.close() {
                debug!("Ignoring microphone close failure: {}", e);
            }
            stream.stop_tracks();
        }
        if let Some(channel) = self.channel {
            if let Err(e) = channel.close() {
                debug!("Ignoring channel close failure: {}", e);
            }
        }
    }
}

impl LiveSession {
    pub fn new(
        config: SessionConfig,
        devices: Arc<dyn MediaDevices>,
        connector: Arc<dyn ChannelConnector>,
        handler: Arc<dyn SessionHandler>,
    ) -> Self {
        let stopping = StopFlag::raised();

        Self {
            shared: Arc::new(Shared {
                config,
                devices,
                connector,
                handler,
            }),
            core: Arc::new(Mutex::new(SessionCore {
                status: ConnectionStatus::Idle,
                stopping: stopping.clone(),
                stream: None,
                channel: None,
                scheduler: None,
                audio: None,
                video: None,
                video_timer: None,
                forwarders: Vec::new(),
                events: None,
                stats: SessionStats::default(),
                last_error: None,
            })),
            stopping: Arc::new(StdMutex::new(stopping)),
        }
    }

    /// Acquire devices, open the remote channel and begin the engagement
    ///
    /// Capture does not begin here: it starts once the remote side
    /// acknowledges the connection. Failing to reach the devices or the
    /// service leaves the session in `ERROR` with the error surfaced.
    pub async fn start(&self) -> Result<()> {
        let stopping = StopFlag::new();
        let session_id = format!("live-{}", uuid::Uuid::new_v4());

        {
            let mut core = self.core.lock().await;
            if !core.status.can_start() {
                warn!("Session already {}", core.status);
                return Err(SessionError::AlreadyActive(core.status));
            }

            info!("Starting live session: {}", session_id);

            core.stopping = stopping.clone();
            core.last_error = None;
            core.stats = SessionStats {
                session_id: Some(session_id.clone()),
                started_at: Some(Utc::now()),
                ..SessionStats::default()
            };
            core.set_status(ConnectionStatus::Connecting, &self.shared);
            self.set_stop_flag(stopping.clone());
        }

        let mut acquired = Acquired::default();
        let config = &self.shared.config;

        let audio_constraints = AudioConstraints {
            sample_rate: config.capture_sample_rate,
            channels: 1,
        };
        match self
            .shared
            .devices
            .open_stream(&audio_constraints, &VideoConstraints::default())
            .await
        {
            Ok(stream) => acquired.stream = Some(stream),
            Err(e) => return self.fail_start(&stopping, acquired, e.into()).await,
        }
        if stopping.is_raised() {
            return Self::cancel_start(acquired);
        }

        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        match self
            .shared
            .devices
            .open_output(config.output_sample_rate, ended_tx)
            .await
        {
            Ok(output) => acquired.output = Some(output),
            Err(e) => return self.fail_start(&stopping, acquired, e.into()).await,
        }
        if stopping.is_raised() {
            return Self::cancel_start(acquired);
        }

        let connect_config = LiveConnectConfig {
            session_id: session_id.clone(),
            model: config.model.clone(),
            voice_name: config.voice_name.clone(),
            system_instruction: config.system_instruction.clone(),
            input_transcription: config.transcription,
            output_transcription: config.transcription,
        };
        let channel_rx = match self.shared.connector.connect(&connect_config).await {
            Ok((channel, rx)) => {
                acquired.channel = Some(channel);
                rx
            }
            Err(e) => {
                let err = SessionError::ChannelConnect(e);
                return self.fail_start(&stopping, acquired, err).await;
            }
        };

        let mut core = self.core.lock().await;
        if stopping.is_raised() {
            drop(core);
            return Self::cancel_start(acquired);
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        core.forwarders.push(forward(channel_rx, events_tx.clone(), SessionEvent::Channel));
        core.forwarders
            .push(forward_unbounded(ended_rx, events_tx.clone(), SessionEvent::PlaybackEnded));

        let Acquired {
            stream,
            output,
            channel,
        } = acquired;
        core.stream = stream;
        core.channel = channel;
        core.scheduler = output.map(|output| PlaybackScheduler::new(output, stopping.clone()));
        core.events = Some(events_tx);
        drop(core);

        tokio::spawn(dispatch_loop(self.clone(), events_rx, stopping));

        info!("Live session {} connecting, waiting for the service", session_id);
        Ok(())
    }

    /// Tear the engagement down
    ///
    /// Idempotent: only the first call after a start does anything.
    /// Every step runs even if an earlier one fails.
    pub async fn stop(&self) {
        let stopping = self.stop_flag();
        if !stopping.raise() {
            debug!("Stop requested while already stopped");
            return;
        }

        info!("Stopping live session");

        let mut core = self.core.lock().await;
        core.teardown(&self.shared);
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.core.lock().await.status
    }

    /// Counters for the current or last engagement
    pub async fn stats(&self) -> SessionStats {
        self.core.lock().await.current_stats()
    }

    /// The error that ended the last engagement, if any
    pub async fn last_error(&self) -> Option<String> {
        self.core.lock().await.last_error.clone()
    }

    /// Whether any device, channel or task handle is still held
    pub async fn holds_resources(&self) -> bool {
        let core = self.core.lock().await;
        core.stream.is_some()
            || core.channel.is_some()
            || core.scheduler.is_some()
            || core.audio.is_some()
            || core.video.is_some()
            || core.video_timer.is_some()
            || core.events.is_some()
            || !core.forwarders.is_empty()
    }

    /// Playback cursor and live segment count, if playback is set up
    pub async fn playback_state(&self) -> Option<(f64, usize)> {
        let core = self.core.lock().await;
        core.scheduler
            .as_ref()
            .map(|s| (s.next_start_time(), s.live_count()))
    }

    fn stop_flag(&self) -> StopFlag {
        self.stopping
            .lock()
            .map(|flag| flag.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn set_stop_flag(&self, flag: StopFlag) {
        match self.stopping.lock() {
            Ok(mut current) => *current = flag,
            Err(poisoned) => *poisoned.into_inner() = flag,
        }
    }

    async fn fail_start(
        &self,
        stopping: &StopFlag,
        acquired: Acquired,
        err: SessionError,
    ) -> Result<()> {
        acquired.release();

        // A stop that raced the failed attempt already reset the session
        if !stopping.raise() {
            return Err(SessionError::Cancelled);
        }

        let message = err.to_string();
        error!("Failed to start live session: {}", message);

        let mut core = self.core.lock().await;
        core.last_error = Some(message.clone());
        core.set_status(ConnectionStatus::Error, &self.shared);
        self.shared.handler.on_error(&message);

        Err(err)
    }

    fn cancel_start(acquired: Acquired) -> Result<()> {
        info!("Session stopped while starting, releasing devices");
        acquired.release();
        Err(SessionError::Cancelled)
    }
}

impl SessionCore {
    fn set_status(&mut self, status: ConnectionStatus, shared: &Shared) {
        if self.status != status {
            self.status = status;
            shared.handler.on_status_change(status);
        }
    }

    fn current_stats(&self) -> SessionStats {
        let mut stats = self.stats.clone();
        if let Some(audio) = &self.audio {
            stats.audio_chunks_sent += audio.sent();
            stats.audio_chunks_dropped += audio.dropped();
        }
        if let Some(video) = &self.video {
            stats.video_frames_sent += video.sent();
            stats.video_frames_dropped += video.dropped();
        }
        stats
    }

    /// Route one event; returns `false` once the engagement is over
    async fn dispatch(&mut self, event: SessionEvent, shared: &Shared) -> bool {
        if self.stopping.is_raised() {
            return false;
        }

        match event {
            SessionEvent::Channel(ChannelEvent::Open) => self.activate(shared).await,
            SessionEvent::Channel(ChannelEvent::Message(message)) => {
                self.handle_message(message, shared)
            }
            SessionEvent::Channel(ChannelEvent::Error(message)) => {
                self.fail(SessionError::Remote(message), shared)
            }
            SessionEvent::Channel(ChannelEvent::Close { reason }) => {
                info!(
                    "Guidance service closed the connection ({})",
                    reason.as_deref().unwrap_or("no reason given")
                );
                if self.stopping.raise() {
                    self.teardown(shared);
                }
            }
            SessionEvent::AudioCaptured(frame) => {
                if let Some(audio) = self.audio.as_mut() {
                    audio.on_frame(frame);
                }
            }
            SessionEvent::AudioCaptureFailed(err) => {
                self.fail(SessionError::DeviceAccess(err), shared)
            }
            SessionEvent::VideoTick => {
                if let Some(video) = self.video.as_mut() {
                    video.on_tick();
                }
            }
            SessionEvent::VideoEncoded(frame) => {
                if let Some(video) = self.video.as_mut() {
                    video.on_encoded(frame);
                }
            }
            SessionEvent::PlaybackEnded(id) => {
                if let Some(scheduler) = self.scheduler.as_mut() {
                    scheduler.complete(id);
                }
            }
        }

        !self.stopping.is_raised()
    }

    /// The remote side is ready: go active, then start both capture pipelines
    async fn activate(&mut self, shared: &Shared) {
        if self.status != ConnectionStatus::Connecting {
            debug!("Ignoring open acknowledgment while {}", self.status);
            return;
        }

        let (Some(channel), Some(events)) = (self.channel.clone(), self.events.clone()) else {
            return;
        };

        self.set_status(ConnectionStatus::Active, shared);

        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        let camera = Arc::clone(&stream.camera);

        let frames = match stream.microphone.start().await {
            Ok(frames) => frames,
            Err(e) => return self.fail(SessionError::DeviceAccess(e), shared),
        };
        if self.stopping.is_raised() {
            return;
        }

        let config = &shared.config;
        let stopping = self.stopping.clone();

        self.audio = Some(
            AudioCapturePipeline::new(Arc::clone(&channel), stopping.clone())
                .with_window(config.audio_window),
        );
        self.forwarders.push(forward_capture(frames, events.clone(), stopping.clone()));

        self.video = Some(
            VideoCapturePipeline::new(camera, channel, events.clone(), stopping)
                .with_quality(config.jpeg_quality),
        );
        self.video_timer = Some(spawn_video_timer(config.video_interval, events));

        info!("Live session active, streaming camera and microphone");
    }

    fn handle_message(&mut self, message: ServerMessage, shared: &Shared) {
        if self.status != ConnectionStatus::Active {
            debug!("Ignoring server message while {}", self.status);
            return;
        }

        if let Some(text) = message.output_text() {
            shared.handler.on_transcription(text, TranscriptRole::Assistant);
            self.stats.transcript_segments_count += 1;
        }

        if let Some(text) = message.input_text() {
            shared.handler.on_transcription(text, TranscriptRole::User);
            self.stats.transcript_segments_count += 1;
        }

        if let Some(inline) = message.audio_payload() {
            let decoded = from_base64(&inline.data)
                .and_then(|bytes| decode_audio(&bytes, inline.sample_rate(), 1));

            match decoded {
                Ok(segment) => {
                    let scheduled = self
                        .scheduler
                        .as_mut()
                        .and_then(|scheduler| scheduler.schedule(&segment));
                    if scheduled.is_some() {
                        self.stats.playback_segments_scheduled += 1;
                    } else {
                        self.stats.playback_segments_dropped += 1;
                    }
                }
                Err(e) => {
                    self.stats.playback_segments_dropped += 1;
                    warn!("{}", SessionError::Decode(e));
                }
            }
        }

        if message.is_interrupted() {
            if let Some(scheduler) = self.scheduler.as_mut() {
                scheduler.interrupt();
            }
            self.stats.interruptions += 1;
        }
    }

    /// Surface a fatal error and tear down
    fn fail(&mut self, err: SessionError, shared: &Shared) {
        if !self.stopping.raise() {
            debug!("Ignoring error during teardown: {}", err);
            return;
        }

        let message = err.to_string();
        error!("Live session failed: {}", message);

        self.last_error = Some(message.clone());
        self.set_status(ConnectionStatus::Error, shared);
        shared.handler.on_error(&message);

        self.teardown(shared);
    }

    /// Release every resource in a fixed order
    ///
    /// Callers raise the stop flag first. No step can keep a later one from
    /// running: failures are logged and ignored.
    fn teardown(&mut self, shared: &Shared) {
        // 1. Video timer and pending encodes
        if let Some(timer) = self.video_timer.take() {
            timer.abort();
        }
        if let Some(video) = self.video.as_mut() {
            video.cancel();
        }

        // 2. Playback
        let output = self
            .scheduler
            .as_mut()
            .and_then(|scheduler| scheduler.release());
        self.scheduler = None;

        // 3. Capture and output contexts
        if let Some(stream) = self.stream.as_mut() {
            if !stream.microphone.is_closed() {
                if let Err(e) = stream.microphone.close() {
                    debug!("Ignoring capture context close failure: {}", e);
                }
            }
        }
        if let Some(mut output) = output {
            if !output.is_closed() {
                if let Err(e) = output.close() {
                    debug!("Ignoring output close failure: {}", e);
                }
            }
        }

        // 4. Media tracks
        if let Some(stream) = self.stream.take() {
            stream.stop_tracks();
        }

        // 5. Remote channel
        if let Some(channel) = self.channel.take() {
            if let Err(e) = channel.close() {
                debug!("Ignoring channel close failure: {}", e);
            }
        }

        // 6. Remaining handles
        self.stats = self.current_stats();
        self.audio = None;
        self.video = None;
        self.events = None;
        for task in self.forwarders.drain(..) {
            task.abort();
        }

        self.set_status(ConnectionStatus::Idle, shared);

        info!(
            "Live session stopped ({} audio chunks, {} video frames sent)",
            self.stats.audio_chunks_sent, self.stats.video_frames_sent
        );
    }
}

/// Consume the engagement's event stream until it ends
async fn dispatch_loop(
    session: LiveSession,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    stopping: StopFlag,
) {
    while let Some(event) = events.recv().await {
        if stopping.is_raised() {
            break;
        }

        let mut core = session.core.lock().await;
        if !core.dispatch(event, &session.shared).await {
            break;
        }
    }

    debug!("Session dispatch loop finished");
}

fn forward<T, F>(
    mut rx: mpsc::Receiver<T>,
    events: mpsc::UnboundedSender<SessionEvent>,
    wrap: F,
) -> JoinHandle<()>
where
    T: Send + 'static,
    F: Fn(T) -> SessionEvent + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            if events.send(wrap(item)).is_err() {
                break;
            }
        }
    })
}

fn forward_unbounded<T, F>(
    mut rx: mpsc::UnboundedReceiver<T>,
    events: mpsc::UnboundedSender<SessionEvent>,
    wrap: F,
) -> JoinHandle<()>
where
    T: Send + 'static,
    F: Fn(T) -> SessionEvent + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            if events.send(wrap(item)).is_err() {
                break;
            }
        }
    })
}

/// Forward microphone frames; an early end of capture means the device is gone
fn forward_capture(
    mut frames: mpsc::Receiver<crate::capture::AudioFrame>,
    events: mpsc::UnboundedSender<SessionEvent>,
    stopping: StopFlag,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if stopping.is_raised() {
                return;
            }
            if events.send(SessionEvent::AudioCaptured(frame)).is_err() {
                return;
            }
        }

        if !stopping.is_raised() {
            let _ = events.send(SessionEvent::AudioCaptureFailed(DeviceError::Revoked(
                "microphone stopped delivering audio".to_string(),
            )));
        }
    })
}
