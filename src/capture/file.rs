//! File-backed devices for headless sessions
//!
//! A WAV file stands in for the microphone and a still image for the
//! camera, so a full session can run on machines with no capture hardware.

use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::device::{
    AudioConstraints, AudioFrame, Camera, MediaDevices, MediaTrack, Microphone, TrackKind,
    VideoConstraints,
};
use crate::codec::CAPTURE_WINDOW;
use crate::error::DeviceError;
use crate::playback::{AudioOutput, HandleId, WavOutput};

/// Decoded contents of a WAV file
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Normalized, interleaved samples
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DeviceError> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = hound::WavReader::open(path)?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|s| s as f32 / scale))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

/// Microphone that replays a WAV file in real time
///
/// Frames of `window` samples per channel are delivered at the pace the
/// file would play. After the end of the file it either loops or keeps
/// delivering silence, like an open microphone in a quiet room.
pub struct WavMicrophone {
    label: String,
    audio: Arc<AudioFile>,
    window: usize,
    looping: bool,
    enabled: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    closed: bool,
    task: Option<JoinHandle<()>>,
}

impl WavMicrophone {
    pub fn open(path: impl AsRef<Path>, looping: bool) -> Result<Self, DeviceError> {
        let audio = AudioFile::open(&path)?;
        if audio.channels == 0 || audio.sample_rate == 0 {
            return Err(DeviceError::Unavailable(format!(
                "{} has no playable audio",
                audio.path
            )));
        }

        Ok(Self {
            label: format!("wav microphone ({})", audio.path),
            audio: Arc::new(audio),
            window: CAPTURE_WINDOW,
            looping,
            enabled: Arc::new(AtomicBool::new(true)),
            stopped: Arc::new(AtomicBool::new(false)),
            closed: false,
            task: None,
        })
    }

    /// Samples per channel in each delivered frame
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }
}

impl MediaTrack for WavMicrophone {
    fn kind(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn stop(&self) -> Result<(), DeviceError> {
        self.stopped.store(true, Ordering::SeqCst);
        debug!("{} stopped", self.label);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Microphone for WavMicrophone {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, DeviceError> {
        if self.closed || self.stopped.load(Ordering::SeqCst) {
            return Err(DeviceError::Unavailable(format!("{} is stopped", self.label)));
        }

        let (tx, rx) = mpsc::channel(100);
        let audio = Arc::clone(&self.audio);
        let enabled = Arc::clone(&self.enabled);
        let stopped = Arc::clone(&self.stopped);
        let window = self.window;
        let looping = self.looping;

        let frame_len = window * audio.channels as usize;
        let period = Duration::from_secs_f64(window as f64 / audio.sample_rate as f64);

        info!(
            "Starting {} ({} samples every {:?})",
            self.label, window, period
        );

        let task = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            let mut cursor = 0usize;
            let mut timestamp_ms = 0u64;

            loop {
                interval.tick().await;
                if stopped.load(Ordering::SeqCst) {
                    break;
                }

                let mut samples = Vec::with_capacity(frame_len);
                while samples.len() < frame_len {
                    if cursor >= audio.samples.len() {
                        if looping && !audio.samples.is_empty() {
                            cursor = 0;
                        } else {
                            samples.resize(frame_len, 0.0);
                            break;
                        }
                    }
                    let take = (frame_len - samples.len()).min(audio.samples.len() - cursor);
                    samples.extend_from_slice(&audio.samples[cursor..cursor + take]);
                    cursor += take;
                }

                if !enabled.load(Ordering::SeqCst) {
                    samples.iter_mut().for_each(|s| *s = 0.0);
                }

                let frame = AudioFrame {
                    samples,
                    sample_rate: audio.sample_rate,
                    channels: audio.channels,
                    timestamp_ms,
                };
                timestamp_ms += period.as_millis() as u64;

                if tx.send(frame).await.is_err() {
                    break;
                }
            }

            debug!("WAV microphone task finished");
        });

        self.task = Some(task);
        Ok(rx)
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Camera that always sees the same picture
pub struct StillCamera {
    label: String,
    image: RgbImage,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

impl StillCamera {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DeviceError> {
        let path = path.as_ref();
        let image = image::open(path)?.to_rgb8();

        info!(
            "Still camera loaded {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );

        Ok(Self::from_image(
            format!("still camera ({})", path.display()),
            image,
        ))
    }

    pub fn from_image(label: impl Into<String>, image: RgbImage) -> Self {
        Self {
            label: label.into(),
            image,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        }
    }
}

impl MediaTrack for StillCamera {
    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn stop(&self) -> Result<(), DeviceError> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Camera for StillCamera {
    fn snapshot(&self) -> Option<RgbImage> {
        if self.stopped.load(Ordering::SeqCst) || !self.enabled.load(Ordering::SeqCst) {
            return None;
        }
        Some(self.image.clone())
    }
}

/// Devices backed by files: WAV microphone, still camera, WAV-rendering output
#[derive(Debug, Clone)]
pub struct FileDevices {
    pub microphone_path: PathBuf,
    pub camera_path: PathBuf,
    /// Where to write what would have been played; `None` discards it
    pub output_path: Option<PathBuf>,
    pub looping: bool,
}

#[async_trait::async_trait]
impl MediaDevices for FileDevices {
    async fn open_microphone(
        &self,
        constraints: &AudioConstraints,
    ) -> Result<Box<dyn Microphone>, DeviceError> {
        let path = self.microphone_path.clone();
        let looping = self.looping;
        let microphone = tokio::task::spawn_blocking(move || WavMicrophone::open(path, looping))
            .await
            .map_err(|e| DeviceError::Unavailable(e.to_string()))??;

        if microphone.audio.sample_rate != constraints.sample_rate {
            info!(
                "Microphone file is {}Hz, will be converted to {}Hz",
                microphone.audio.sample_rate, constraints.sample_rate
            );
        }

        Ok(Box::new(microphone))
    }

    async fn open_camera(
        &self,
        _constraints: &VideoConstraints,
    ) -> Result<Arc<dyn Camera>, DeviceError> {
        let path = self.camera_path.clone();
        let camera = tokio::task::spawn_blocking(move || StillCamera::open(path))
            .await
            .map_err(|e| DeviceError::Unavailable(e.to_string()))??;

        Ok(Arc::new(camera))
    }

    async fn open_output(
        &self,
        sample_rate: u32,
        ended: mpsc::UnboundedSender<HandleId>,
    ) -> Result<Box<dyn AudioOutput>, DeviceError> {
        Ok(Box::new(WavOutput::new(
            self.output_path.clone(),
            sample_rate,
            ended,
        )))
    }
}
