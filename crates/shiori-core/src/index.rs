//! Media index collaborator.
//!
//! The organizer never walks the filesystem itself; it asks a [`MediaIndex`]
//! for candidate rows and re-validates them. [`FsMediaIndex`] is the
//! built-in implementation, walking configured root directories and
//! synthesizing rows for recognized video files.

use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::error::ShioriError;

/// MIME types accepted by index queries, one per recognized extension.
pub const VIDEO_MIME_TYPES: &[&str] = &[
    "video/mp4",
    "video/x-m4v",
    "video/x-msvideo",
    "video/x-matroska",
    "video/quicktime",
    "video/x-ms-wmv",
    "video/x-flv",
    "video/webm",
    "video/3gpp",
];

/// One row returned by a media index query.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// Stable id; the same file keeps the same id across queries.
    pub id: i64,
    pub display_name: String,
    pub path: PathBuf,
    /// 0 when the index cannot know the duration without decoding.
    pub duration_ms: i64,
    pub size_bytes: u64,
    /// Epoch seconds the file entered the index.
    pub date_added: i64,
    pub mime_type: String,
    pub resolution: Option<String>,
}

/// Scope of an index query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryScope {
    /// Every video row the index knows about.
    All,
    /// Rows whose path contains the given pattern, e.g. "/Movies/".
    PathContains(String),
}

/// Device-wide video metadata index.
///
/// Rows are authoritative for ids and metadata but may be stale: callers
/// re-validate existence and extension on their side.
pub trait MediaIndex {
    fn query(
        &self,
        scope: &QueryScope,
        mime_types: &[&str],
    ) -> Result<Vec<IndexEntry>, ShioriError>;
}

/// Stable opaque id for a video path: the first eight bytes of the blake3
/// hash of the path string. A file keeps its id across rescans, so watch
/// state stays attached to it.
pub fn path_id(path: &Path) -> i64 {
    let hash = blake3::hash(path.to_string_lossy().as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    i64::from_le_bytes(bytes)
}

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "mp4" => Some("video/mp4"),
        "m4v" => Some("video/x-m4v"),
        "avi" => Some("video/x-msvideo"),
        "mkv" => Some("video/x-matroska"),
        "mov" => Some("video/quicktime"),
        "wmv" => Some("video/x-ms-wmv"),
        "flv" => Some("video/x-flv"),
        "webm" => Some("video/webm"),
        "3gp" => Some("video/3gpp"),
        _ => None,
    }
}

/// Filesystem-backed media index over configured library roots.
#[derive(Debug, Clone)]
pub struct FsMediaIndex {
    roots: Vec<PathBuf>,
    follow_links: bool,
}

impl FsMediaIndex {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            follow_links: false,
        }
    }

    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }
}

impl MediaIndex for FsMediaIndex {
    fn query(
        &self,
        scope: &QueryScope,
        mime_types: &[&str],
    ) -> Result<Vec<IndexEntry>, ShioriError> {
        let mut entries = Vec::new();

        for root in &self.roots {
            if !root.is_dir() {
                warn!(path = %root.display(), "Library root does not exist, skipping");
                continue;
            }

            for entry in WalkDir::new(root)
                .follow_links(self.follow_links)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path();

                let ext = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.to_lowercase());
                let Some(mime) = ext.as_deref().and_then(mime_for_extension) else {
                    continue;
                };
                if !mime_types.contains(&mime) {
                    continue;
                }

                if let QueryScope::PathContains(pattern) = scope {
                    if !path.to_string_lossy().contains(pattern.as_str()) {
                        continue;
                    }
                }

                let metadata = match entry.metadata() {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Failed to read file metadata");
                        continue;
                    }
                };

                let date_added = metadata
                    .created()
                    .or_else(|_| metadata.modified())
                    .ok()
                    .map(|t| {
                        let dt: chrono::DateTime<chrono::Utc> = t.into();
                        dt.timestamp()
                    })
                    .unwrap_or_default();

                let display_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("unknown")
                    .to_string();

                entries.push(IndexEntry {
                    id: path_id(path),
                    display_name,
                    path: path.to_path_buf(),
                    duration_ms: 0,
                    size_bytes: metadata.len(),
                    date_added,
                    mime_type: mime.to_string(),
                    resolution: None,
                });
            }
        }

        Ok(entries)
    }
}
