//! Playback session tracking.
//!
//! The playback layer emits discrete lifecycle events and exposes the
//! current position on demand; this module turns those into watch-store
//! writes. A session stamps last-played when it opens, saves on a periodic
//! tick while playing, saves on pause, saves once more on teardown, and
//! force-completes (resume position reset to the start) when playback runs
//! to the end.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::store::StoreHandle;

/// Lifecycle events reported by the playback layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Media opened; duration is known from here on.
    Ready,
    Playing,
    Paused,
    /// Playback ran to the end of the file.
    Ended,
}

/// Where a session currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Ready,
    Playing,
    Paused,
    Ended,
}

/// On-demand playhead readout from the playback layer. Implementations
/// report a zero duration until the media is ready.
pub trait PositionSource: Send {
    fn position_ms(&self) -> i64;
    fn duration_ms(&self) -> i64;
}

/// Persists watch progress for one playback session.
pub struct SessionTracker {
    video_id: i64,
    phase: SessionPhase,
    store: StoreHandle,
}

impl SessionTracker {
    pub fn new(video_id: i64, store: StoreHandle) -> Self {
        Self {
            video_id,
            phase: SessionPhase::Idle,
            store,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_playing(&self) -> bool {
        self.phase == SessionPhase::Playing
    }

    /// Stamp the last-played time. Called once when the session opens.
    pub fn start(&self) {
        self.store.mark_played(self.video_id);
        info!(id = self.video_id, "Playback session opened");
    }

    /// Apply one lifecycle event.
    pub fn on_event(&mut self, event: PlaybackEvent, source: &dyn PositionSource) {
        match event {
            PlaybackEvent::Ready => {
                if self.phase == SessionPhase::Idle {
                    self.phase = SessionPhase::Ready;
                }
            }
            PlaybackEvent::Playing => {
                self.phase = SessionPhase::Playing;
            }
            PlaybackEvent::Paused => {
                self.phase = SessionPhase::Paused;
                self.save_progress(source);
            }
            PlaybackEvent::Ended => {
                self.phase = SessionPhase::Ended;
                self.force_complete(source);
            }
        }
    }

    /// Persist the current fraction and playhead. No-op while the duration
    /// is still unknown.
    pub fn save_progress(&self, source: &dyn PositionSource) {
        let duration = source.duration_ms();
        if duration <= 0 {
            return;
        }
        let position = source.position_ms();
        let fraction = position as f32 / duration as f32;
        self.store.record_progress(self.video_id, fraction, duration);
        self.store.record_resume_position(self.video_id, position);
        debug!(id = self.video_id, position, "Saved session progress");
    }

    /// Playback ran to the end: record full completion and reset the resume
    /// position so the next open starts over.
    fn force_complete(&self, source: &dyn PositionSource) {
        let duration = source.duration_ms();
        self.store.record_progress(self.video_id, 1.0, duration);
        self.store.record_resume_position(self.video_id, 0);
        info!(id = self.video_id, "Playback ended, marked completed");
    }

    /// Teardown: one final save unless the session already ended. The final
    /// save is enqueued after any in-flight periodic save, so it wins.
    pub fn close(&mut self, source: &dyn PositionSource) {
        if self.phase != SessionPhase::Ended {
            self.save_progress(source);
        }
        self.phase = SessionPhase::Idle;
    }
}

/// Drive a tracker from a playback event stream plus a periodic save tick.
///
/// Returns when the event channel closes (session teardown), after the
/// final save. `interval` comes from the configured save cadence.
pub async fn run(
    mut tracker: SessionTracker,
    mut events: mpsc::UnboundedReceiver<PlaybackEvent>,
    source: impl PositionSource,
    interval: Duration,
) {
    tracker.start();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => tracker.on_event(event, &source),
                None => {
                    tracker.close(&source);
                    break;
                }
            },
            _ = ticker.tick(), if tracker.is_playing() => {
                tracker.save_progress(&source);
            }
        }
    }
}
