//! Background library refresh and the listing snapshot handed to the
//! presentation layer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use shiori_core::index::MediaIndex;
use shiori_core::models::{FolderGroup, VideoRecord};
use shiori_core::organizer;

use crate::store::StoreHandle;

/// Listing snapshot the presentation layer renders from. Replaced
/// wholesale on publish; never mutated in place.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct LibraryState {
    pub videos: Vec<VideoRecord>,
    pub folders: Vec<FolderGroup>,
    /// Human-readable scan status, also carrying discovery error text.
    pub status: String,
    pub loading: bool,
}

/// What selecting a listing tile resolves to.
#[derive(Debug, Clone)]
pub enum Selection {
    /// Singleton tile: open playback directly at the given position.
    Play {
        video: VideoRecord,
        start_position_ms: i64,
    },
    /// Directory tile: show the members as a sub-listing.
    Browse(Vec<VideoRecord>),
}

/// Owns the listing state and coordinates refreshes against the media
/// index and the watch store.
pub struct LibraryService {
    index: Arc<dyn MediaIndex + Send + Sync>,
    store: StoreHandle,
    state: Arc<RwLock<LibraryState>>,
    generation: Arc<AtomicU64>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl LibraryService {
    pub fn new(index: Arc<dyn MediaIndex + Send + Sync>, store: StoreHandle) -> Self {
        Self {
            index,
            store,
            state: Arc::new(RwLock::new(LibraryState::default())),
            generation: Arc::new(AtomicU64::new(0)),
            refresh_task: Mutex::new(None),
        }
    }

    /// Current listing snapshot.
    pub async fn state(&self) -> LibraryState {
        self.state.read().await.clone()
    }

    /// Rescan the media index and publish a fresh listing.
    ///
    /// Returns once the scan is underway; the listing lands in the shared
    /// state when done. Re-triggering abandons the in-flight refresh: the
    /// stale task is aborted, and a generation check keeps a straggler from
    /// publishing out-of-date results over newer ones.
    pub async fn refresh(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(stale) = self.refresh_task.lock().await.take() {
            stale.abort();
        }

        {
            let mut state = self.state.write().await;
            state.loading = true;
            state.status = "Scanning video files...".into();
        }

        let index = Arc::clone(&self.index);
        let store = self.store.clone();
        let state = Arc::clone(&self.state);
        let latest = Arc::clone(&self.generation);

        let task = tokio::spawn(async move {
            let discovered =
                tokio::task::spawn_blocking(move || organizer::discover(index.as_ref())).await;

            let outcome = match discovered {
                Ok(Ok(records)) => {
                    let videos = store.enrich(records).await;
                    let folders = organizer::group_into_folders(&videos);
                    Ok((videos, folders))
                }
                Ok(Err(e)) => Err(e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            if latest.load(Ordering::SeqCst) != generation {
                // Superseded while scanning; a newer refresh owns the state.
                return;
            }

            let mut state = state.write().await;
            state.loading = false;
            match outcome {
                Ok((videos, folders)) => {
                    state.status = format!("Scan complete - {} videos found", videos.len());
                    info!(
                        videos = videos.len(),
                        folders = folders.len(),
                        "Library refresh complete"
                    );
                    state.videos = videos;
                    state.folders = folders;
                }
                Err(message) => {
                    warn!(error = %message, "Library refresh failed");
                    state.videos = Vec::new();
                    state.folders = Vec::new();
                    state.status = format!("Error: {message}");
                }
            }
        });

        *self.refresh_task.lock().await = Some(task);
    }

    /// Wait for an in-flight refresh to settle.
    pub async fn wait_for_refresh(&self) {
        let task = self.refresh_task.lock().await.take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Re-merge progress into the current records and re-group, without
    /// touching the media index. Used when returning from playback.
    pub async fn refresh_progress_only(&self) {
        let records = self.state.read().await.videos.clone();
        if records.is_empty() {
            return;
        }
        let videos = self.store.enrich(records).await;
        let folders = organizer::group_into_folders(&videos);

        let mut state = self.state.write().await;
        state.videos = videos;
        state.folders = folders;
    }

    /// Resolve a tile selection: singletons open playback at their stored
    /// start position, directories browse into a freshly enriched member
    /// list.
    pub async fn select(&self, group: &FolderGroup) -> Selection {
        if let Some(video) = group.sole_video() {
            let start_position_ms = self.store.playback_start_position(video.id).await;
            Selection::Play {
                video: video.clone(),
                start_position_ms,
            }
        } else {
            Selection::Browse(self.store.enrich(group.videos.clone()).await)
        }
    }

    /// Case-insensitive title and folder search over the current listing.
    pub async fn search(&self, query: &str) -> Vec<VideoRecord> {
        let state = self.state.read().await;
        organizer::search(&state.videos, query)
    }

    /// Most recently played videos with a saved position, capped at `limit`.
    pub async fn recent(&self, limit: u32) -> Vec<VideoRecord> {
        let ids = self.store.recently_played(limit).await;
        let state = self.state.read().await;
        organizer::recent_videos(&state.videos, &ids)
    }
}
