//! Async host for the shiori core: owns the watch-store thread, the
//! library service, and per-session progress tracking.

mod library;
mod session;
mod store;

pub use library::{LibraryService, LibraryState, Selection};
pub use session::{run as run_session, PlaybackEvent, PositionSource, SessionPhase, SessionTracker};
pub use store::StoreHandle;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use shiori_core::config::AppConfig;
use shiori_core::index::FsMediaIndex;
use shiori_core::models::VideoRecord;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),
}

/// Wires config, the watch store, and the library service together.
pub struct Runtime {
    config: AppConfig,
    store: StoreHandle,
    library: LibraryService,
}

impl Runtime {
    /// Load user config, open the watch store at its configured path, and
    /// index the configured library roots.
    pub fn new() -> Result<Self, RuntimeError> {
        let config = AppConfig::load().map_err(|e| RuntimeError::Config(e.to_string()))?;
        let db_path =
            AppConfig::ensure_db_path().map_err(|e| RuntimeError::Config(e.to_string()))?;
        let store = StoreHandle::open(&db_path)
            .ok_or_else(|| RuntimeError::Store("failed to open watch store".into()))?;
        Ok(Self::with_parts(config, store))
    }

    /// Build from preconstructed parts (tests use an in-memory store).
    pub fn with_parts(config: AppConfig, store: StoreHandle) -> Self {
        let roots = config.library.roots.iter().map(PathBuf::from).collect();
        let index = FsMediaIndex::new(roots).follow_links(config.library.follow_links);
        let library = LibraryService::new(Arc::new(index), store.clone());
        Self {
            config,
            store,
            library,
        }
    }

    /// Kick off the initial library scan when configured to do so.
    pub async fn start(&self) {
        if self.config.library.scan_on_startup {
            self.library.refresh().await;
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn library(&self) -> &LibraryService {
        &self.library
    }

    /// Configured cadence for periodic session saves.
    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.config.playback.save_interval_secs)
    }

    /// Most recently played videos, capped at the configured limit.
    pub async fn recently_played(&self) -> Vec<VideoRecord> {
        self.library.recent(self.config.playback.recent_limit).await
    }

    /// Tracker for one playback session; drive it with [`run_session`].
    pub fn session(&self, video_id: i64) -> SessionTracker {
        SessionTracker::new(video_id, self.store.clone())
    }
}
