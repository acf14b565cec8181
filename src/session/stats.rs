use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::events::TranscriptRole;

/// Counters for one live engagement
///
/// Dropped media is never surfaced as an error; it is only counted here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    /// Unique engagement identifier
    pub session_id: Option<String>,

    /// When the current (or last) engagement started
    pub started_at: Option<DateTime<Utc>>,

    /// Encoded audio chunks forwarded to the channel
    pub audio_chunks_sent: usize,

    /// Audio chunks discarded (stopping, or the channel refused them)
    pub audio_chunks_dropped: usize,

    /// Camera frames forwarded to the channel
    pub video_frames_sent: usize,

    /// Camera ticks that produced nothing to send
    pub video_frames_dropped: usize,

    /// Speech segments scheduled for playback
    pub playback_segments_scheduled: usize,

    /// Speech segments discarded (undecodable or unplayable)
    pub playback_segments_dropped: usize,

    /// Remote interruption signals handled
    pub interruptions: usize,

    /// Transcription fragments forwarded to the caller
    pub transcript_segments_count: usize,
}

/// One transcription fragment, as collected for callers that poll
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Transcribed text
    pub text: String,

    /// Who spoke
    pub role: TranscriptRole,

    /// When this fragment was received
    pub timestamp: DateTime<Utc>,
}
