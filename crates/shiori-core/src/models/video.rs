use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Fraction above which a video counts as started.
pub const WATCHED_THRESHOLD: f32 = 0.10;

/// Fraction at or above which a video counts as completed.
pub const COMPLETION_THRESHOLD: f32 = 0.95;

/// Progress-derived state merged into a [`VideoRecord`] from the watch
/// store. All-zero when the store has no row for the video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchState {
    /// Raw playhead position at the last save, in milliseconds.
    pub resume_position_ms: i64,
    /// Position over duration, clamped to 0.0..=1.0.
    pub fraction: f32,
    pub completed: bool,
    /// Epoch milliseconds of the last progress save; 0 when never watched.
    pub last_watched: i64,
}

/// One physical video file, as reported by the media index.
///
/// Treated as an immutable value: progress enrichment replaces the whole
/// record via [`VideoRecord::with_watch_state`] rather than mutating in
/// place, so a published listing never mixes progress generations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    /// Stable opaque id assigned by the media index; the join key into the
    /// watch store.
    pub id: i64,
    /// Display name as reported by the index (extension included).
    pub title: String,
    /// Absolute filesystem path; the dedup and grouping key.
    pub path: PathBuf,
    /// Opaque playable reference handed to the playback layer.
    pub locator: String,
    pub duration_ms: i64,
    pub size_bytes: u64,
    /// Epoch seconds the index first saw the file.
    pub date_added: i64,
    pub mime_type: String,
    pub resolution: Option<String>,
    /// Directory containing the file, or the "Unknown" sentinel when the
    /// index row had no resolvable parent.
    pub parent_folder: PathBuf,
    pub watch: WatchState,
}

impl VideoRecord {
    /// Copy of this record carrying fresh progress state.
    pub fn with_watch_state(mut self, watch: WatchState) -> Self {
        self.watch = watch;
        self
    }

    /// Title with the file extension stripped.
    pub fn display_title(&self) -> &str {
        match self.title.rfind('.') {
            Some(idx) if idx > 0 => &self.title[..idx],
            _ => &self.title,
        }
    }

    /// Watched percentage, rounded to the nearest whole point.
    pub fn progress_percent(&self) -> u8 {
        (self.watch.fraction * 100.0).round() as u8
    }

    pub fn is_watched(&self) -> bool {
        self.watch.fraction > WATCHED_THRESHOLD
    }

    pub fn is_fully_watched(&self) -> bool {
        self.watch.fraction >= COMPLETION_THRESHOLD
    }
}

/// One tile in the browse listing: either a real directory grouping several
/// videos, or a synthetic wrapper around a single video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderGroup {
    /// Directory base name, or the video's display title for singletons.
    pub name: String,
    /// Group identity: the directory path, or the member's own path for
    /// singletons. Unique across a listing.
    pub path: PathBuf,
    pub video_count: usize,
    pub videos: Vec<VideoRecord>,
}

impl FolderGroup {
    /// Group for a real directory holding several videos. Members are kept
    /// sorted by title.
    pub fn directory(name: impl Into<String>, path: PathBuf, mut videos: Vec<VideoRecord>) -> Self {
        videos.sort_by(|a, b| a.title.cmp(&b.title));
        Self {
            name: name.into(),
            path,
            video_count: videos.len(),
            videos,
        }
    }

    /// Pass-through group around a single video: selecting it opens playback
    /// directly instead of a sub-listing.
    pub fn singleton(video: VideoRecord) -> Self {
        Self {
            name: video.display_title().to_string(),
            path: video.path.clone(),
            video_count: 1,
            videos: vec![video],
        }
    }

    pub fn is_singleton(&self) -> bool {
        self.video_count == 1
    }

    /// The sole member of a pass-through group, `None` for real directories.
    pub fn sole_video(&self) -> Option<&VideoRecord> {
        if self.video_count == 1 {
            self.videos.first()
        } else {
            None
        }
    }
}
