//! Playback output devices
//!
//! The output device owns the output clock. Voices are scheduled against
//! that clock; when one finishes on its own, its handle id is sent on the
//! `ended` channel so the scheduler can forget it.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::codec::{DecodedSegment, RateConverter};
use crate::error::OutputError;

/// Identifier of one scheduled playback voice
pub type HandleId = u64;

/// An output audio context: a clock plus the ability to start and halt voices
pub trait AudioOutput: Send {
    /// Current output clock in seconds since the output was opened
    fn current_time(&self) -> f64;

    fn sample_rate(&self) -> u32;

    /// Start `segment` at `start_time` on the output clock
    fn play(
        &mut self,
        id: HandleId,
        segment: &DecodedSegment,
        start_time: f64,
    ) -> Result<(), OutputError>;

    /// Silence a voice immediately
    fn halt(&mut self, id: HandleId) -> Result<(), OutputError>;

    /// Release the device
    fn close(&mut self) -> Result<(), OutputError>;

    fn is_closed(&self) -> bool;
}

struct Voice {
    start_sample: usize,
    rendered: Vec<f32>,
    end_time: f64,
    timer: JoinHandle<()>,
}

/// Wall-clock output that renders the scheduled timeline to a mono WAV file
///
/// Useful for headless runs: what would have come out of the speakers is
/// streamed to `path` as the clock passes it, and the file is finalized
/// when the output is closed. Only audio that has not been heard yet stays
/// in memory. With no path nothing is rendered and only the clock and
/// completion notifications remain.
pub struct WavOutput {
    path: Option<PathBuf>,
    sample_rate: u32,
    opened_at: Instant,
    /// Mixed samples not yet written; index 0 is absolute sample `written`
    timeline: Vec<f32>,
    written: usize,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    voices: HashMap<HandleId, Voice>,
    ended_tx: mpsc::UnboundedSender<HandleId>,
    closed: bool,
}

impl WavOutput {
    pub fn new(
        path: Option<PathBuf>,
        sample_rate: u32,
        ended_tx: mpsc::UnboundedSender<HandleId>,
    ) -> Self {
        info!(
            "Playback output opened ({}Hz, render to {:?})",
            sample_rate, path
        );

        Self {
            path,
            sample_rate,
            opened_at: Instant::now(),
            timeline: Vec::new(),
            written: 0,
            writer: None,
            voices: HashMap::new(),
            ended_tx,
            closed: false,
        }
    }

    /// Rendered output not yet written to disk (mono, output sample rate)
    pub fn timeline(&self) -> &[f32] {
        &self.timeline
    }

    /// Samples already written to disk
    pub fn written(&self) -> usize {
        self.written
    }

    fn position(&self, time: f64) -> usize {
        (time.max(0.0) * self.sample_rate as f64).round() as usize
    }

    /// Downmix to mono and convert to the output rate
    fn render(&self, segment: &DecodedSegment) -> Result<Vec<f32>, OutputError> {
        let channels = segment.channels().max(1) as usize;
        let mono: Vec<f32> = segment
            .samples()
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();

        Ok(RateConverter::convert(
            &mono,
            segment.sample_rate(),
            self.sample_rate,
        )?)
    }

    /// Add `samples` into the unwritten timeline at absolute `start_sample`
    ///
    /// Anything that falls before the written mark is already final and
    /// is skipped.
    fn mix(&mut self, start_sample: usize, samples: &[f32], gain: f32) {
        let skip = self.written.saturating_sub(start_sample);
        if skip >= samples.len() {
            return;
        }

        let begin = start_sample + skip - self.written;
        let end = begin + samples.len() - skip;
        if self.timeline.len() < end {
            self.timeline.resize(end, 0.0);
        }
        for (slot, sample) in self.timeline[begin..end].iter_mut().zip(&samples[skip..]) {
            *slot += gain * sample;
        }
    }

    /// Write everything before absolute sample `position`
    ///
    /// Silence between voices is written straight to the file.
    fn flush_until(&mut self, position: usize) -> Result<(), OutputError> {
        let count = position.saturating_sub(self.written);
        if count == 0 || self.path.is_none() {
            return Ok(());
        }

        if self.writer.is_none() {
            self.writer = self.create_writer()?;
        }
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };

        let mixed = count.min(self.timeline.len());
        for sample in self.timeline.drain(..mixed) {
            writer.write_sample(to_pcm(sample))?;
        }
        for _ in mixed..count {
            writer.write_sample(0i16)?;
        }
        self.written += count;

        Ok(())
    }

    fn create_writer(&self) -> Result<Option<hound::WavWriter<BufWriter<File>>>, OutputError> {
        let Some(path) = &self.path else {
            return Ok(None);
        };

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        Ok(Some(hound::WavWriter::create(path, spec)?))
    }
}

fn to_pcm(sample: f32) -> i16 {
    (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

impl AudioOutput for WavOutput {
    fn current_time(&self) -> f64 {
        self.opened_at.elapsed().as_secs_f64()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn play(
        &mut self,
        id: HandleId,
        segment: &DecodedSegment,
        start_time: f64,
    ) -> Result<(), OutputError> {
        if self.closed {
            return Err(OutputError::Closed);
        }

        let now = self.current_time();
        self.voices.retain(|_, voice| voice.end_time > now);
        self.flush_until(self.position(now))?;

        let start_sample = self.position(start_time);
        let rendered = if self.path.is_some() {
            self.render(segment)?
        } else {
            Vec::new()
        };
        self.mix(start_sample, &rendered, 1.0);

        let end_time = start_time + segment.duration_secs();
        let deadline = self.opened_at + Duration::from_secs_f64(end_time.max(0.0));
        let ended_tx = self.ended_tx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = ended_tx.send(id);
        });

        debug!(
            "Voice {} scheduled at {:.3}s for {:.3}s",
            id,
            start_time,
            segment.duration_secs()
        );

        self.voices.insert(
            id,
            Voice {
                start_sample,
                rendered,
                end_time,
                timer,
            },
        );

        Ok(())
    }

    fn halt(&mut self, id: HandleId) -> Result<(), OutputError> {
        let voice = self
            .voices
            .remove(&id)
            .ok_or(OutputError::UnknownHandle(id))?;
        voice.timer.abort();

        // Remove whatever part of the voice had not been heard yet
        let cut = self.position(self.current_time()).max(voice.start_sample);
        let played = (cut - voice.start_sample).min(voice.rendered.len());
        self.mix(cut, &voice.rendered[played..], -1.0);

        debug!("Voice {} halted", id);
        Ok(())
    }

    fn close(&mut self) -> Result<(), OutputError> {
        if self.closed {
            return Err(OutputError::Closed);
        }
        self.closed = true;

        for (_, voice) in self.voices.drain() {
            voice.timer.abort();
        }

        if self.path.is_some() {
            self.flush_until(self.written + self.timeline.len())?;
            let writer = match self.writer.take() {
                Some(writer) => Some(writer),
                None => self.create_writer()?,
            };
            if let Some(writer) = writer {
                writer.finalize()?;
            }

            info!(
                "Rendered {:.1}s of playback to {:?}",
                self.written as f64 / self.sample_rate as f64,
                self.path
            );
        }

        info!("Playback output closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for WavOutput {
    fn drop(&mut self) {
        for (_, voice) in self.voices.drain() {
            voice.timer.abort();
        }
    }
}
