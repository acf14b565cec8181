use std::sync::Arc;
use tracing::{debug, warn};

use super::device::AudioFrame;
use crate::channel::{RealtimeInput, RemoteChannel};
use crate::codec::{encode_audio, RateConverter, CAPTURE_SAMPLE_RATE, CAPTURE_WINDOW};
use crate::error::CodecError;
use crate::session::StopFlag;

/// Chunks microphone audio into fixed windows and forwards each one
///
/// At most one partial window is held between frames; every complete
/// window is encoded and sent immediately, in capture order. The rate
/// converter is built from the first frame's rate and keeps its filter
/// state for the rest of the capture.
pub struct AudioCapturePipeline {
    channel: Arc<dyn RemoteChannel>,
    stopping: StopFlag,
    converter: Option<RateConverter>,
    window: usize,
    pending: Vec<f32>,
    sent: usize,
    dropped: usize,
}

impl AudioCapturePipeline {
    pub fn new(channel: Arc<dyn RemoteChannel>, stopping: StopFlag) -> Self {
        Self {
            channel,
            stopping,
            converter: None,
            window: CAPTURE_WINDOW,
            pending: Vec::with_capacity(CAPTURE_WINDOW),
            sent: 0,
            dropped: 0,
        }
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    /// Feed one microphone frame; returns how many chunks were sent
    pub fn on_frame(&mut self, frame: AudioFrame) -> usize {
        if self.stopping.is_raised() {
            self.pending.clear();
            return 0;
        }

        let samples = match self.process_frame(frame) {
            Ok(samples) => samples,
            Err(e) => {
                self.dropped += 1;
                warn!("Dropping audio frame: {}", e);
                return 0;
            }
        };
        self.pending.extend_from_slice(&samples);

        let mut sent = 0;
        while self.pending.len() >= self.window {
            let window: Vec<f32> = self.pending.drain(..self.window).collect();

            // Stop may have been raised from another task mid-frame
            if self.stopping.is_raised() {
                self.pending.clear();
                self.dropped += 1;
                break;
            }

            let chunk = encode_audio(&window);
            match self.channel.send_realtime_input(RealtimeInput::Audio(chunk)) {
                Ok(()) => {
                    sent += 1;
                    self.sent += 1;
                }
                Err(e) => {
                    self.dropped += 1;
                    warn!("Dropping audio chunk: {}", e);
                }
            }
        }

        if sent > 0 {
            debug!("Sent {} audio chunk(s) ({} total)", sent, self.sent);
        }

        sent
    }

    /// Chunks forwarded to the channel so far
    pub fn sent(&self) -> usize {
        self.sent
    }

    /// Chunks discarded so far
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Samples waiting for the rest of their window
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Bring a frame to the capture format: mono at 16 kHz
    fn process_frame(&mut self, frame: AudioFrame) -> Result<Vec<f32>, CodecError> {
        let frame = Self::to_mono(frame);

        let converter = match self.converter.take() {
            Some(converter) if converter.from_rate() == frame.sample_rate => converter,
            previous => {
                if let Some(previous) = previous {
                    warn!(
                        "Microphone rate changed from {}Hz to {}Hz",
                        previous.from_rate(),
                        frame.sample_rate
                    );
                }
                debug!(
                    "Converting microphone audio from {}Hz to {}Hz",
                    frame.sample_rate, CAPTURE_SAMPLE_RATE
                );
                RateConverter::new(frame.sample_rate, CAPTURE_SAMPLE_RATE)?
            }
        };

        self.converter.insert(converter).process(&frame.samples)
    }

    /// Average interleaved channels into one
    fn to_mono(frame: AudioFrame) -> AudioFrame {
        if frame.channels <= 1 {
            return frame;
        }

        let channels = frame.channels as usize;
        let samples = frame
            .samples
            .chunks_exact(channels)
            .map(|f| f.iter().sum::<f32>() / channels as f32)
            .collect();

        AudioFrame {
            samples,
            channels: 1,
            ..frame
        }
    }
}
