use crate::session::{LiveSession, TranscriptLog};
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The single live session this process drives
    pub session: LiveSession,

    /// Transcript and notifications collected from the session
    pub transcript: Arc<TranscriptLog>,
}

impl AppState {
    pub fn new(session: LiveSession, transcript: Arc<TranscriptLog>) -> Self {
        Self {
            session,
            transcript,
        }
    }
}
