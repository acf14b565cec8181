use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{error, info};

use super::state::ConnectionStatus;
use super::stats::TranscriptSegment;
use crate::capture::AudioFrame;
use crate::channel::ChannelEvent;
use crate::codec::EncodedVideoFrame;
use crate::error::DeviceError;
use crate::playback::HandleId;

/// Speaker of a transcription fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    User,
    Assistant,
}

/// Caller-facing notifications (the UI side of the session)
pub trait SessionHandler: Send + Sync {
    fn on_transcription(&self, text: &str, role: TranscriptRole);

    fn on_status_change(&self, status: ConnectionStatus);

    fn on_error(&self, message: &str);
}

/// Everything the dispatch loop reacts to, in one stream
#[derive(Debug)]
pub enum SessionEvent {
    /// Inbound from the remote channel
    Channel(ChannelEvent),
    /// One batch of microphone samples
    AudioCaptured(AudioFrame),
    /// The microphone stopped delivering
    AudioCaptureFailed(DeviceError),
    /// Video timer fired
    VideoTick,
    /// A snapshot finished encoding (`None` if nothing was produced)
    VideoEncoded(Option<EncodedVideoFrame>),
    /// A playback segment finished on its own
    PlaybackEnded(HandleId),
}

/// Handler that logs everything and keeps the transcript
///
/// Used by the CLI and the HTTP surface, which poll instead of reacting.
#[derive(Default)]
pub struct TranscriptLog {
    segments: Mutex<Vec<TranscriptSegment>>,
    status: Mutex<Option<ConnectionStatus>>,
    last_error: Mutex<Option<String>>,
}

impl TranscriptLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn segments(&self) -> Vec<TranscriptSegment> {
        self.segments
            .lock()
            .map(|segments| segments.clone())
            .unwrap_or_default()
    }

    pub fn last_status(&self) -> Option<ConnectionStatus> {
        self.status.lock().ok().and_then(|status| *status)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }
}

impl SessionHandler for TranscriptLog {
    fn on_transcription(&self, text: &str, role: TranscriptRole) {
        info!("[{:?}] {}", role, text);

        if let Ok(mut segments) = self.segments.lock() {
            segments.push(TranscriptSegment {
                text: text.to_string(),
                role,
                timestamp: Utc::now(),
            });
        }
    }

    fn on_status_change(&self, status: ConnectionStatus) {
        info!("Session status: {}", status);

        if status == ConnectionStatus::Connecting {
            if let Ok(mut last_error) = self.last_error.lock() {
                *last_error = None;
            }
        }
        if let Ok(mut current) = self.status.lock() {
            *current = Some(status);
        }
    }

    fn on_error(&self, message: &str) {
        error!("Session error: {}", message);

        if let Ok(mut last_error) = self.last_error.lock() {
            *last_error = Some(message.to_string());
        }
    }
}
