use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::device::Camera;
use crate::channel::{RealtimeInput, RemoteChannel};
use crate::codec::{encode_frame, EncodedVideoFrame, DEFAULT_JPEG_QUALITY};
use crate::session::{SessionEvent, StopFlag};

/// Default period between camera snapshots
pub const DEFAULT_VIDEO_INTERVAL: Duration = Duration::from_millis(1500);

/// Periodic camera snapshots, un-mirrored and JPEG-compressed
///
/// A tick grabs the current camera frame and hands it to a blocking task
/// for encoding; the result comes back as [`SessionEvent::VideoEncoded`]
/// and is forwarded from [`on_encoded`](Self::on_encoded). Both steps
/// check the stop flag, so a frame still encoding when the session stops
/// is never sent. [`cancel`](Self::cancel) aborts encodes still in flight.
pub struct VideoCapturePipeline {
    camera: Arc<dyn Camera>,
    channel: Arc<dyn RemoteChannel>,
    events: mpsc::UnboundedSender<SessionEvent>,
    stopping: StopFlag,
    in_flight: Vec<(JoinHandle<()>, AbortHandle)>,
    quality: u8,
    sent: usize,
    dropped: usize,
}

impl VideoCapturePipeline {
    pub fn new(
        camera: Arc<dyn Camera>,
        channel: Arc<dyn RemoteChannel>,
        events: mpsc::UnboundedSender<SessionEvent>,
        stopping: StopFlag,
    ) -> Self {
        Self {
            camera,
            channel,
            events,
            stopping,
            in_flight: Vec::new(),
            quality: DEFAULT_JPEG_QUALITY,
            sent: 0,
            dropped: 0,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Snapshot the camera and start encoding; returns whether a frame was taken
    pub fn on_tick(&mut self) -> bool {
        if self.stopping.is_raised() {
            return false;
        }

        let Some(snapshot) = self.camera.snapshot() else {
            self.dropped += 1;
            debug!("No camera frame available, skipping tick");
            return false;
        };

        self.in_flight.retain(|(task, _)| !task.is_finished());

        let quality = self.quality;
        let stopping = self.stopping.clone();
        let encode = tokio::task::spawn_blocking(move || {
            if stopping.is_raised() {
                return None;
            }
            Some(encode_frame(&snapshot, quality))
        });
        let encode_abort = encode.abort_handle();

        let events = self.events.clone();
        let task = tokio::spawn(async move {
            let frame = match encode.await {
                Ok(Some(Ok(frame))) => Some(frame),
                Ok(Some(Err(e))) => {
                    debug!("Frame encoding produced nothing: {}", e);
                    None
                }
                Ok(None) => None,
                Err(e) => {
                    debug!("Frame encoding task failed: {}", e);
                    None
                }
            };

            let _ = events.send(SessionEvent::VideoEncoded(frame));
        });

        self.in_flight.push((task, encode_abort));
        true
    }

    /// Abort encodes still in flight; each one counts as a dropped frame
    pub fn cancel(&mut self) {
        for (task, encode) in self.in_flight.drain(..) {
            if !task.is_finished() {
                self.dropped += 1;
            }
            encode.abort();
            task.abort();
        }
    }

    /// Encodes started but not yet handed back
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .iter()
            .filter(|(task, _)| !task.is_finished())
            .count()
    }

    /// Forward an encoded frame; returns whether it was sent
    pub fn on_encoded(&mut self, frame: Option<EncodedVideoFrame>) -> bool {
        if self.stopping.is_raised() {
            return false;
        }

        let Some(frame) = frame else {
            self.dropped += 1;
            return false;
        };

        match self.channel.send_realtime_input(RealtimeInput::Video(frame)) {
            Ok(()) => {
                self.sent += 1;
                debug!("Sent video frame ({} total)", self.sent);
                true
            }
            Err(e) => {
                self.dropped += 1;
                warn!("Dropping video frame: {}", e);
                false
            }
        }
    }

    pub fn sent(&self) -> usize {
        self.sent
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

/// Post a [`SessionEvent::VideoTick`] every `period` until aborted
///
/// The first tick fires one period after start. Late ticks are not
/// caught up; each fires a full period after the previous one.
pub fn spawn_video_timer(
    period: Duration,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if events.send(SessionEvent::VideoTick).is_err() {
                break;
            }
        }
    })
}
