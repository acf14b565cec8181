use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use super::output::{AudioOutput, HandleId};
use crate::codec::DecodedSegment;
use crate::session::StopFlag;

/// One scheduled segment of synthesized speech
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackHandle {
    pub id: HandleId,
    /// Start on the output clock (seconds)
    pub start_time: f64,
    /// Length of the segment (seconds)
    pub duration: f64,
}

impl PlaybackHandle {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

/// Gapless, in-order scheduler for decoded speech segments
///
/// Segments are placed back to back using a playback cursor: each one starts
/// at `max(cursor, now)` and moves the cursor to its own end. `interrupt`
/// halts everything still live and resets the cursor so the next segment
/// plays immediately instead of after a stale backlog.
pub struct PlaybackScheduler {
    output: Option<Box<dyn AudioOutput>>,
    next_start_time: f64,
    live: BTreeMap<HandleId, PlaybackHandle>,
    next_id: HandleId,
    stopping: StopFlag,
}

impl PlaybackScheduler {
    pub fn new(output: Box<dyn AudioOutput>, stopping: StopFlag) -> Self {
        let next_start_time = output.current_time();

        info!(
            "Playback scheduler ready ({}Hz output)",
            output.sample_rate()
        );

        Self {
            output: Some(output),
            next_start_time,
            live: BTreeMap::new(),
            next_id: 0,
            stopping,
        }
    }

    /// Schedule a segment right after everything already queued
    ///
    /// Returns `None` when the session is stopping, the output is gone, or
    /// the output refused the segment. Nothing is advanced in that case.
    pub fn schedule(&mut self, segment: &DecodedSegment) -> Option<PlaybackHandle> {
        if self.stopping.is_raised() {
            return None;
        }

        let output = self.output.as_mut().filter(|o| !o.is_closed())?;

        let start_time = self.next_start_time.max(output.current_time());
        let handle = PlaybackHandle {
            id: self.next_id,
            start_time,
            duration: segment.duration_secs(),
        };

        if let Err(e) = output.play(handle.id, segment, start_time) {
            warn!("Failed to schedule playback segment: {}", e);
            return None;
        }

        self.next_id += 1;
        self.next_start_time = handle.end_time();
        self.live.insert(handle.id, handle);

        debug!(
            "Scheduled segment {} at {:.3}s ({:.3}s, {} live)",
            handle.id,
            handle.start_time,
            handle.duration,
            self.live.len()
        );

        Some(handle)
    }

    /// Forget a handle whose playback finished naturally
    pub fn complete(&mut self, id: HandleId) -> bool {
        self.live.remove(&id).is_some()
    }

    /// Halt every live segment and reset the cursor
    ///
    /// Returns how many segments were cut short. Failures to halt an
    /// individual segment are logged and otherwise ignored.
    pub fn interrupt(&mut self) -> usize {
        let halted = self.live.len();

        for id in std::mem::take(&mut self.live).into_keys() {
            if let Some(output) = self.output.as_mut() {
                if let Err(e) = output.halt(id) {
                    debug!("Ignoring failure to halt segment {}: {}", id, e);
                }
            }
        }

        self.next_start_time = 0.0;

        if halted > 0 {
            info!("Playback interrupted ({} segments halted)", halted);
        }

        halted
    }

    /// Halt everything and hand the output back for closing
    pub fn release(&mut self) -> Option<Box<dyn AudioOutput>> {
        self.interrupt();
        self.output.take()
    }

    /// Where the next segment would start if the output clock were behind it
    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    /// Output clock, if the output is still attached
    pub fn current_time(&self) -> Option<f64> {
        self.output.as_ref().map(|o| o.current_time())
    }

    pub fn live_handles(&self) -> impl Iterator<Item = &PlaybackHandle> {
        self.live.values()
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}
