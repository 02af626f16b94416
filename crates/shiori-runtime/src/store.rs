//! Async handle over the watch store.
//!
//! The SQLite store lives on one dedicated thread; callers talk to it over
//! an unbounded command channel. Channel order is the write-ordering
//! guarantee: a session's teardown save is enqueued after any in-flight
//! periodic save, so the last write for a video always wins.

use std::path::Path;

use tokio::sync::{mpsc, oneshot};
use tracing::{error, warn};

use shiori_core::error::ShioriError;
use shiori_core::models::{VideoRecord, WatchState};
use shiori_core::organizer;
use shiori_core::storage::ProgressStore;

/// Cloneable handle to the store thread.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::UnboundedSender<StoreCommand>,
}

enum StoreCommand {
    RecordProgress {
        id: i64,
        fraction: f32,
        duration_ms: i64,
    },
    RecordResumePosition {
        id: i64,
        position_ms: i64,
    },
    MarkPlayed {
        id: i64,
    },
    Read {
        id: i64,
        reply: oneshot::Sender<WatchState>,
    },
    StartPosition {
        id: i64,
        reply: oneshot::Sender<i64>,
    },
    RecentlyPlayed {
        limit: u32,
        reply: oneshot::Sender<Vec<i64>>,
    },
    Enrich {
        records: Vec<VideoRecord>,
        reply: oneshot::Sender<Vec<VideoRecord>>,
    },
    Clear {
        id: i64,
        reply: oneshot::Sender<Result<(), ShioriError>>,
    },
}

impl StoreHandle {
    /// Open the store at the given path on a dedicated thread.
    pub fn open(path: &Path) -> Option<Self> {
        let store = ProgressStore::open(path)
            .map_err(|e| error!("Failed to open watch store: {e}"))
            .ok()?;
        Self::with_store(store)
    }

    /// Wrap an already-open store (tests pass the in-memory one).
    pub fn with_store(store: ProgressStore) -> Option<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name("watch-store".into())
            .spawn(move || actor_loop(store, rx))
            .map_err(|e| error!("Failed to spawn store thread: {e}"))
            .ok()?;

        Some(Self { tx })
    }

    /// Queue a progress save. Fire-and-forget: failures are logged on the
    /// store thread and the session keeps playing.
    pub fn record_progress(&self, id: i64, fraction: f32, duration_ms: i64) {
        let _ = self.tx.send(StoreCommand::RecordProgress {
            id,
            fraction,
            duration_ms,
        });
    }

    /// Queue a resume-position save. Fire-and-forget.
    pub fn record_resume_position(&self, id: i64, position_ms: i64) {
        let _ = self
            .tx
            .send(StoreCommand::RecordResumePosition { id, position_ms });
    }

    /// Queue a last-played stamp. Fire-and-forget.
    pub fn mark_played(&self, id: i64) {
        let _ = self.tx.send(StoreCommand::MarkPlayed { id });
    }

    /// Watch state for a video; zero-valued when unknown.
    pub async fn read(&self, id: i64) -> WatchState {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(StoreCommand::Read { id, reply });
        rx.await.unwrap_or_default()
    }

    /// Position playback should open at (0 for completed videos).
    pub async fn playback_start_position(&self, id: i64) -> i64 {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(StoreCommand::StartPosition { id, reply });
        rx.await.unwrap_or(0)
    }

    /// Up to `limit` ids with a saved position, most recently played first.
    pub async fn recently_played(&self, limit: u32) -> Vec<i64> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(StoreCommand::RecentlyPlayed { limit, reply });
        rx.await.unwrap_or_default()
    }

    /// Merge current store state into a record batch on the store thread.
    /// Returns the batch unchanged if the store thread is gone.
    pub async fn enrich(&self, records: Vec<VideoRecord>) -> Vec<VideoRecord> {
        let (reply, rx) = oneshot::channel();
        let fallback = records.clone();
        let _ = self.tx.send(StoreCommand::Enrich { records, reply });
        rx.await.unwrap_or(fallback)
    }

    /// Drop all stored state for a video.
    pub async fn clear(&self, id: i64) -> Result<(), ShioriError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(StoreCommand::Clear { id, reply });
        rx.await
            .unwrap_or_else(|_| Err(ShioriError::Config("store thread closed".into())))
    }
}

fn actor_loop(store: ProgressStore, mut rx: mpsc::UnboundedReceiver<StoreCommand>) {
    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            StoreCommand::RecordProgress {
                id,
                fraction,
                duration_ms,
            } => {
                if let Err(e) = store.record_progress(id, fraction, duration_ms) {
                    warn!(id, error = %e, "Failed to save watch progress");
                }
            }
            StoreCommand::RecordResumePosition { id, position_ms } => {
                if let Err(e) = store.record_resume_position(id, position_ms) {
                    warn!(id, error = %e, "Failed to save resume position");
                }
            }
            StoreCommand::MarkPlayed { id } => {
                if let Err(e) = store.mark_played(id) {
                    warn!(id, error = %e, "Failed to stamp last-played time");
                }
            }
            StoreCommand::Read { id, reply } => {
                let _ = reply.send(store.read(id));
            }
            StoreCommand::StartPosition { id, reply } => {
                let _ = reply.send(store.playback_start_position(id));
            }
            StoreCommand::RecentlyPlayed { limit, reply } => {
                let ids = store.recently_played(limit).unwrap_or_else(|e| {
                    warn!(error = %e, "Recently-played query failed");
                    Vec::new()
                });
                let _ = reply.send(ids);
            }
            StoreCommand::Enrich { records, reply } => {
                let _ = reply.send(organizer::enrich_with_progress(records, &store));
            }
            StoreCommand::Clear { id, reply } => {
                let _ = reply.send(store.clear(id));
            }
        }
    }
}
