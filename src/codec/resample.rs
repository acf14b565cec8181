use rubato::{FftFixedIn, Resampler};

use crate::error::CodecError;

const CHUNK_SIZE: usize = 1024;
const SUB_CHUNKS: usize = 2;

/// Streaming mono sample-rate converter
///
/// Input is buffered until a full resampler block is available, so frames
/// of any length can be fed in and the filter state carries across them.
/// Equal rates pass samples through untouched.
pub struct RateConverter {
    from_rate: u32,
    to_rate: u32,
    inner: Option<FftFixedIn<f32>>,
    pending: Vec<f32>,
}

impl RateConverter {
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self, CodecError> {
        let inner = if from_rate == to_rate {
            None
        } else {
            let resampler = FftFixedIn::<f32>::new(
                from_rate as usize,
                to_rate as usize,
                CHUNK_SIZE,
                SUB_CHUNKS,
                1,
            )
            .map_err(|e| CodecError::Resample {
                from: from_rate,
                to: to_rate,
                reason: e.to_string(),
            })?;
            Some(resampler)
        };

        Ok(Self {
            from_rate,
            to_rate,
            inner,
            pending: Vec::new(),
        })
    }

    pub fn from_rate(&self) -> u32 {
        self.from_rate
    }

    pub fn to_rate(&self) -> u32 {
        self.to_rate
    }

    /// Convert the next run of samples
    ///
    /// Whatever does not fill a block is held back for the next call.
    pub fn process(&mut self, samples: &[f32]) -> Result<Vec<f32>, CodecError> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(samples.to_vec());
        };

        self.pending.extend_from_slice(samples);

        let mut output = Vec::new();
        let mut consumed = 0;
        while self.pending.len() - consumed >= inner.input_frames_next() {
            let needed = inner.input_frames_next();
            let wave = [&self.pending[consumed..consumed + needed]];
            let result = inner
                .process(&wave[..], None)
                .map_err(|e| resample_error(self.from_rate, self.to_rate, e))?;
            output.extend(result.into_iter().next().unwrap_or_default());
            consumed += needed;
        }
        self.pending.drain(..consumed);

        Ok(output)
    }

    /// Push one block of held-back input, or silence, through the filter
    fn flush(&mut self) -> Result<Vec<f32>, CodecError> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(Vec::new());
        };

        let result = if self.pending.is_empty() {
            inner.process_partial::<Vec<f32>>(None, None)
        } else {
            let wave = [std::mem::take(&mut self.pending)];
            inner.process_partial(Some(&wave[..]), None)
        }
        .map_err(|e| resample_error(self.from_rate, self.to_rate, e))?;

        Ok(result.into_iter().next().unwrap_or_default())
    }

    /// Convert a complete clip in one pass
    ///
    /// The resampler delay is trimmed so the result lines up with the input
    /// and has exactly `len * to_rate / from_rate` samples.
    pub fn convert(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, CodecError> {
        let mut converter = Self::new(from_rate, to_rate)?;
        let Some(delay) = converter.inner.as_ref().map(|inner| inner.output_delay()) else {
            return Ok(samples.to_vec());
        };

        let expected = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;

        let mut output = converter.process(samples)?;
        while output.len() < delay + expected {
            let tail = converter.flush()?;
            if tail.is_empty() {
                break;
            }
            output.extend(tail);
        }

        output.drain(..delay.min(output.len()));
        output.resize(expected, 0.0);
        Ok(output)
    }
}

fn resample_error(from: u32, to: u32, e: impl std::fmt::Display) -> CodecError {
    CodecError::Resample {
        from,
        to,
        reason: e.to_string(),
    }
}
