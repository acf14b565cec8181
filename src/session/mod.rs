//! Live session management
//!
//! This module provides the `LiveSession` controller that manages:
//! - Device acquisition (microphone, camera, playback output)
//! - The remote channel to the guidance service
//! - Audio and video capture pipelines
//! - Scheduling and interrupting synthesized speech
//! - Ordered teardown on stop or failure

mod config;
mod events;
mod session;
mod state;
mod stats;

pub use self::config::{SessionConfig, DEFAULT_SYSTEM_INSTRUCTION};
pub use events::{SessionEvent, SessionHandler, TranscriptLog, TranscriptRole};
pub use session::LiveSession;
pub use state::{ConnectionStatus, StopFlag};
pub use stats::{SessionStats, TranscriptSegment};
