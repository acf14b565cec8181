use crate::error::CodecError;

/// Sample rate the microphone is captured at (Hz)
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Number of samples in one capture window
pub const CAPTURE_WINDOW: usize = 4096;

/// Sample rate of synthesized speech returned by the service (Hz)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Width of one encoded sample in bytes (16-bit PCM)
pub const SAMPLE_WIDTH: usize = 2;

/// One window of microphone audio in wire format (16-bit PCM, little-endian, mono)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudioChunk {
    data: Vec<u8>,
    sample_rate: u32,
}

impl EncodedAudioChunk {
    /// Raw PCM bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of samples carried by this chunk
    pub fn sample_count(&self) -> usize {
        self.data.len() / SAMPLE_WIDTH
    }

    /// Format declaration sent alongside the payload
    pub fn mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.sample_rate)
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Decoded audio ready for the output device (normalized f32, interleaved)
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSegment {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl DecodedSegment {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of sample frames (one sample per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Playback length in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Samples of a single channel, de-interleaved
    pub fn channel(&self, index: u16) -> impl Iterator<Item = f32> + '_ {
        self.samples
            .iter()
            .skip(index as usize)
            .step_by(self.channels.max(1) as usize)
            .copied()
    }
}

/// Encode captured float samples into a 16 kHz PCM chunk
///
/// Each sample is scaled by 32768 and clamped to the i16 range, so inputs
/// outside `[-1, 1]` saturate instead of wrapping.
pub fn encode_audio(samples: &[f32]) -> EncodedAudioChunk {
    let data = samples
        .iter()
        .map(|&s| (s * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .flat_map(i16::to_le_bytes)
        .collect();

    EncodedAudioChunk {
        data,
        sample_rate: CAPTURE_SAMPLE_RATE,
    }
}

/// Decode 16-bit little-endian PCM into normalized float samples
pub fn decode_audio(
    bytes: &[u8],
    sample_rate: u32,
    channels: u16,
) -> Result<DecodedSegment, CodecError> {
    if channels == 0 {
        return Err(CodecError::InvalidChannels(channels));
    }

    if bytes.len() % SAMPLE_WIDTH != 0 {
        return Err(CodecError::PartialSample(bytes.len()));
    }

    let sample_count = bytes.len() / SAMPLE_WIDTH;
    if sample_count % channels as usize != 0 {
        return Err(CodecError::PartialFrame {
            samples: sample_count,
            channels,
        });
    }

    let samples = bytes
        .chunks_exact(SAMPLE_WIDTH)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect();

    Ok(DecodedSegment::new(samples, sample_rate, channels))
}
