//! Library organizer.
//!
//! Turns raw media-index rows into the browsable listing: discovery with
//! re-validation and dedup, progress enrichment from the watch store, and
//! folder grouping. Discovery is a one-shot query; returning to the listing
//! after playback only re-merges progress via [`refresh_listing`], since
//! grouping is deterministic for a fixed set of paths.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::ShioriError;
use crate::index::{IndexEntry, MediaIndex, QueryScope, VIDEO_MIME_TYPES};
use crate::models::{FolderGroup, VideoRecord, WatchState};
use crate::storage::ProgressStore;

/// File extensions recognized as video, lowercase.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v", "3gp",
];

/// Conventional top-level media directories. Videos sitting directly in one
/// of these are always listed as their own tile, never collapsed into a
/// folder tile, so a flat "Movies" dump stays browsable file by file.
pub const ROOT_MEDIA_FOLDERS: &[&str] = &["Movies", "Videos", "Download", "DCIM", "Camera"];

/// Sentinel parent for index rows whose path has no resolvable parent.
pub const UNKNOWN_FOLDER: &str = "Unknown";

/// Path pattern for the scoped discovery pass.
const MOVIES_PATTERN: &str = "/Movies/";

/// Discover all playable videos known to the media index.
///
/// Two passes, one scoped to the conventional Movies location and one
/// unscoped, unioned and deduplicated by absolute path with the first
/// occurrence winning. Pass order is a tie-break, not a correctness
/// requirement: both passes describe the same files. Rows are re-validated
/// here, so vanished files and foreign extensions are dropped no matter
/// what the index claims.
pub fn discover(index: &dyn MediaIndex) -> Result<Vec<VideoRecord>, ShioriError> {
    let movies = index.query(
        &QueryScope::PathContains(MOVIES_PATTERN.into()),
        VIDEO_MIME_TYPES,
    )?;
    debug!(count = movies.len(), "Scoped discovery pass complete");

    let all = index.query(&QueryScope::All, VIDEO_MIME_TYPES)?;
    debug!(count = all.len(), "Unscoped discovery pass complete");

    let mut seen = HashSet::new();
    let mut records = Vec::new();
    for entry in movies.into_iter().chain(all) {
        if entry.path.as_os_str().is_empty() {
            continue;
        }
        if !seen.insert(entry.path.clone()) {
            continue;
        }
        if let Some(record) = validate(entry) {
            records.push(record);
        }
    }

    info!(count = records.len(), "Discovery complete");
    Ok(records)
}

/// Re-validate one index row. The index may lag the filesystem, so rows for
/// vanished files or non-video extensions are dropped silently.
fn validate(entry: IndexEntry) -> Option<VideoRecord> {
    let ext = entry
        .path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    let is_video = ext
        .as_deref()
        .map(|e| VIDEO_EXTENSIONS.contains(&e))
        .unwrap_or(false);
    if !is_video {
        return None;
    }

    if !entry.path.exists() {
        debug!(path = %entry.path.display(), "File vanished since index query, dropping");
        return None;
    }

    let locator = locator_for(&entry.path);
    let parent_folder = parent_or_unknown(&entry.path);

    Some(VideoRecord {
        id: entry.id,
        title: entry.display_name,
        path: entry.path,
        locator,
        duration_ms: entry.duration_ms,
        size_bytes: entry.size_bytes,
        date_added: entry.date_added,
        mime_type: entry.mime_type,
        resolution: entry.resolution,
        parent_folder,
        watch: WatchState::default(),
    })
}

/// Opaque playable reference for a path. Falls back to the raw path string
/// when it cannot form a file URL (relative paths).
fn locator_for(path: &Path) -> String {
    url::Url::from_file_path(path)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| path.to_string_lossy().into_owned())
}

fn parent_or_unknown(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(UNKNOWN_FOLDER))
}

/// Merge current watch-store state into each record.
///
/// Produces fresh records instead of mutating; read-only with respect to
/// the store and idempotent, so re-running it after playback is always
/// safe. Store failures degrade to zero state inside [`ProgressStore::read`].
pub fn enrich_with_progress(records: Vec<VideoRecord>, store: &ProgressStore) -> Vec<VideoRecord> {
    records
        .into_iter()
        .map(|record| {
            let watch = store.read(record.id);
            record.with_watch_state(watch)
        })
        .collect()
}

/// Classify records into the browsable folder listing.
///
/// Records partition by grouping key: videos sitting directly in a root
/// media directory key on their own path (forced singleton), everything
/// else keys on its parent directory. A multi-video partition becomes a
/// directory tile; partitions of one become pass-through singleton tiles.
/// Output order is total: by name, then path.
pub fn group_into_folders(records: &[VideoRecord]) -> Vec<FolderGroup> {
    let mut partitions: BTreeMap<PathBuf, Vec<&VideoRecord>> = BTreeMap::new();
    for record in records {
        partitions
            .entry(grouping_key(record))
            .or_default()
            .push(record);
    }

    let mut groups = Vec::new();
    for (_, members) in partitions {
        let parent = members[0].parent_folder.clone();
        let parent_name = dir_base_name(&parent);
        if members.len() > 1 && !is_root_media_folder(&parent_name) {
            groups.push(FolderGroup::directory(
                parent_name,
                parent,
                members.into_iter().cloned().collect(),
            ));
        } else {
            for member in members {
                groups.push(FolderGroup::singleton(member.clone()));
            }
        }
    }

    groups.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));
    groups
}

/// Re-merge fresh progress into an already-discovered set and re-group.
///
/// Used when returning to the listing after playback: no rescan, and the
/// folder structure stays stable while watch fields update.
pub fn refresh_listing(
    records: Vec<VideoRecord>,
    store: &ProgressStore,
) -> (Vec<VideoRecord>, Vec<FolderGroup>) {
    let videos = enrich_with_progress(records, store);
    let folders = group_into_folders(&videos);
    (videos, folders)
}

/// Case-insensitive search over title and parent folder path.
pub fn search(records: &[VideoRecord], query: &str) -> Vec<VideoRecord> {
    let needle = query.to_lowercase();
    records
        .iter()
        .filter(|r| {
            r.title.to_lowercase().contains(&needle)
                || r.parent_folder
                    .to_string_lossy()
                    .to_lowercase()
                    .contains(&needle)
        })
        .cloned()
        .collect()
}

/// Resolve recently-played store ids against the current record set, keeping
/// the store's most-recent-first order. Ids the listing no longer contains
/// are skipped.
pub fn recent_videos(records: &[VideoRecord], recent_ids: &[i64]) -> Vec<VideoRecord> {
    recent_ids
        .iter()
        .filter_map(|id| records.iter().find(|r| r.id == *id))
        .cloned()
        .collect()
}

pub fn completed_videos(records: &[VideoRecord]) -> Vec<VideoRecord> {
    records
        .iter()
        .filter(|r| r.watch.completed)
        .cloned()
        .collect()
}

/// Started but not finished: past the watched threshold, not completed.
pub fn in_progress_videos(records: &[VideoRecord]) -> Vec<VideoRecord> {
    records
        .iter()
        .filter(|r| r.is_watched() && !r.watch.completed)
        .cloned()
        .collect()
}

/// Partition key for one record (see [`group_into_folders`]).
fn grouping_key(record: &VideoRecord) -> PathBuf {
    let parent_name = dir_base_name(&record.parent_folder);
    if is_root_media_folder(&parent_name) && is_direct_child(&record.path, &record.parent_folder) {
        record.path.clone()
    } else {
        record.parent_folder.clone()
    }
}

/// Case-insensitive substring match against [`ROOT_MEDIA_FOLDERS`], so
/// "videos", "My Movies" and "camera-roll" all count.
fn is_root_media_folder(name: &str) -> bool {
    let lower = name.to_lowercase();
    ROOT_MEDIA_FOLDERS
        .iter()
        .any(|root| lower.contains(&root.to_lowercase()))
}

/// True when `path` sits immediately inside `dir`.
fn is_direct_child(path: &Path, dir: &Path) -> bool {
    match path.strip_prefix(dir) {
        Ok(rest) => rest.components().count() <= 1,
        Err(_) => false,
    }
}

fn dir_base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{path_id, FsMediaIndex};
    use std::fs;
    use tempfile::TempDir;

    fn video(id: i64, path: &str) -> VideoRecord {
        let path = PathBuf::from(path);
        let title = path.file_name().unwrap().to_str().unwrap().to_string();
        let parent_folder = parent_or_unknown(&path);
        VideoRecord {
            id,
            title,
            locator: path.to_string_lossy().into_owned(),
            path,
            duration_ms: 120_000,
            size_bytes: 1024,
            date_added: 0,
            mime_type: "video/mp4".into(),
            resolution: None,
            parent_folder,
            watch: WatchState::default(),
        }
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, b"x").unwrap();
        path
    }

    fn entry_for(path: &Path) -> IndexEntry {
        IndexEntry {
            id: path_id(path),
            display_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: path.to_path_buf(),
            duration_ms: 0,
            size_bytes: 1,
            date_added: 0,
            mime_type: "video/mp4".into(),
            resolution: None,
        }
    }

    /// Index double that applies scope filtering but no validation, so
    /// stale rows reach the organizer untouched.
    struct FakeIndex {
        entries: Vec<IndexEntry>,
    }

    impl MediaIndex for FakeIndex {
        fn query(
            &self,
            scope: &QueryScope,
            _mime_types: &[&str],
        ) -> Result<Vec<IndexEntry>, ShioriError> {
            Ok(self
                .entries
                .iter()
                .filter(|e| match scope {
                    QueryScope::All => true,
                    QueryScope::PathContains(p) => e.path.to_string_lossy().contains(p.as_str()),
                })
                .cloned()
                .collect())
        }
    }

    #[test]
    fn test_discover_dedups_across_passes() {
        let dir = TempDir::new().unwrap();
        let a = touch(dir.path(), "Movies/a.mp4");
        let b = touch(dir.path(), "Other/b.mp4");

        // a.mp4 matches both the scoped and the unscoped pass.
        let index = FakeIndex {
            entries: vec![entry_for(&a), entry_for(&b)],
        };
        let records = discover(&index).unwrap();

        assert_eq!(records.len(), 2);
        let paths: Vec<&PathBuf> = records.iter().map(|r| &r.path).collect();
        assert!(paths.contains(&&a));
        assert!(paths.contains(&&b));
    }

    #[test]
    fn test_discover_drops_vanished_files() {
        let dir = TempDir::new().unwrap();
        let real = touch(dir.path(), "Movies/real.mp4");
        let gone = dir.path().join("Movies/gone.mp4");

        let index = FakeIndex {
            entries: vec![entry_for(&real), entry_for(&gone)],
        };
        let records = discover(&index).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, real);
    }

    #[test]
    fn test_discover_drops_foreign_extensions() {
        let dir = TempDir::new().unwrap();
        let video = touch(dir.path(), "Movies/film.mp4");
        let text = touch(dir.path(), "Movies/readme.txt");
        let bare = touch(dir.path(), "Movies/noext");

        let index = FakeIndex {
            entries: vec![entry_for(&video), entry_for(&text), entry_for(&bare)],
        };
        let records = discover(&index).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, video);
    }

    #[test]
    fn test_discover_skips_empty_paths() {
        let dir = TempDir::new().unwrap();
        let real = touch(dir.path(), "Movies/a.mp4");
        let mut empty = entry_for(&real);
        empty.path = PathBuf::new();

        let index = FakeIndex {
            entries: vec![empty, entry_for(&real)],
        };
        let records = discover(&index).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_discover_builds_locator_and_parent() {
        let dir = TempDir::new().unwrap();
        let path = touch(dir.path(), "Movies/a.mp4");

        let index = FakeIndex {
            entries: vec![entry_for(&path)],
        };
        let records = discover(&index).unwrap();

        assert_eq!(records[0].locator, url::Url::from_file_path(&path).unwrap().to_string());
        assert_eq!(records[0].parent_folder, dir.path().join("Movies"));
        assert_eq!(records[0].watch, WatchState::default());
    }

    #[test]
    fn test_parent_or_unknown_for_bare_name() {
        assert_eq!(
            parent_or_unknown(Path::new("clip.mp4")),
            PathBuf::from(UNKNOWN_FOLDER)
        );
    }

    #[test]
    fn test_root_media_children_stay_singletons() {
        let records = vec![
            video(1, "/sd/Movies/a.mp4"),
            video(2, "/sd/Movies/b.mp4"),
            video(3, "/sd/Movies/c.mp4"),
        ];
        let groups = group_into_folders(&records);

        assert_eq!(groups.len(), 3);
        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert!(groups.iter().all(|g| g.is_singleton()));
    }

    #[test]
    fn test_subfolder_collapses_into_directory_tile() {
        let records = vec![
            video(1, "/sd/Movies/Trip/b.mp4"),
            video(2, "/sd/Movies/Trip/c.mp4"),
        ];
        let groups = group_into_folders(&records);

        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.name, "Trip");
        assert_eq!(group.path, PathBuf::from("/sd/Movies/Trip"));
        assert_eq!(group.video_count, 2);
        let titles: Vec<&str> = group.videos.iter().map(|v| v.title.as_str()).collect();
        assert_eq!(titles, ["b.mp4", "c.mp4"]);
    }

    #[test]
    fn test_single_video_subfolder_is_singleton() {
        let records = vec![video(1, "/sd/Movies/Solo/only.mp4")];
        let groups = group_into_folders(&records);

        assert_eq!(groups.len(), 1);
        assert!(groups[0].is_singleton());
        assert_eq!(groups[0].name, "only");
        assert_eq!(groups[0].path, PathBuf::from("/sd/Movies/Solo/only.mp4"));
    }

    #[test]
    fn test_root_matching_is_case_insensitive_substring() {
        let records = vec![
            video(1, "/sd/videos/a.mp4"),
            video(2, "/sd/videos/b.mp4"),
            video(3, "/sd/My Movies/c.mp4"),
            video(4, "/sd/My Movies/d.mp4"),
        ];
        let groups = group_into_folders(&records);

        // All four are direct children of root-like directories.
        assert_eq!(groups.len(), 4);
        assert!(groups.iter().all(|g| g.is_singleton()));
    }

    #[test]
    fn test_non_root_directory_collapses() {
        let records = vec![
            video(1, "/data/shows/Season1/e1.mp4"),
            video(2, "/data/shows/Season1/e2.mp4"),
            video(3, "/data/shows/Season2/e1.mp4"),
        ];
        let groups = group_into_folders(&records);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "Season1");
        assert_eq!(groups[0].video_count, 2);
        assert_eq!(groups[1].name, "e1");
        assert!(groups[1].is_singleton());
    }

    #[test]
    fn test_deep_nesting_groups_by_immediate_parent() {
        let records = vec![
            video(1, "/sd/Movies/Trip/Day1/x.mp4"),
            video(2, "/sd/Movies/Trip/Day1/y.mp4"),
        ];
        let groups = group_into_folders(&records);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "Day1");
    }

    #[test]
    fn test_grouping_deterministic_under_input_order() {
        let mut records = vec![
            video(1, "/sd/Movies/a.mp4"),
            video(2, "/sd/Movies/Trip/b.mp4"),
            video(3, "/sd/Movies/Trip/c.mp4"),
            video(4, "/data/shows/Season1/e1.mp4"),
            video(5, "/data/shows/Season1/e2.mp4"),
        ];
        let forward = group_into_folders(&records);
        records.reverse();
        let reversed = group_into_folders(&records);

        assert_eq!(forward, reversed);
    }

    #[test]
    fn test_enrich_merges_store_state() {
        let store = ProgressStore::open_memory().unwrap();
        store.record_progress(2, 0.5, 120_000).unwrap();
        store.record_resume_position(2, 60_000).unwrap();

        let records = vec![video(1, "/sd/Movies/a.mp4"), video(2, "/sd/Movies/b.mp4")];
        let enriched = enrich_with_progress(records, &store);

        assert_eq!(enriched[0].watch, WatchState::default());
        assert_eq!(enriched[1].watch.fraction, 0.5);
        assert_eq!(enriched[1].watch.resume_position_ms, 60_000);
    }

    #[test]
    fn test_enrich_idempotent() {
        let store = ProgressStore::open_memory().unwrap();
        store.record_progress(1, 0.42, 120_000).unwrap();

        let records = vec![video(1, "/sd/Movies/a.mp4")];
        let once = enrich_with_progress(records, &store);
        let twice = enrich_with_progress(once.clone(), &store);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_refresh_listing_updates_watch_without_restructuring() {
        let store = ProgressStore::open_memory().unwrap();
        let records = vec![
            video(1, "/sd/Movies/Trip/b.mp4"),
            video(2, "/sd/Movies/Trip/c.mp4"),
        ];
        let (videos, folders) = refresh_listing(records, &store);

        store.record_progress(1, 0.6, 120_000).unwrap();
        let (videos2, folders2) = refresh_listing(videos, &store);

        assert_eq!(folders.len(), folders2.len());
        assert_eq!(folders[0].path, folders2[0].path);
        assert_eq!(videos2[0].watch.fraction, 0.6);
    }

    #[test]
    fn test_search_matches_title_and_folder() {
        let records = vec![
            video(1, "/sd/Movies/Holiday.mp4"),
            video(2, "/sd/Trips/beach.mp4"),
        ];

        let by_title = search(&records, "holi");
        assert_eq!(by_title.len(), 1);
        assert_eq!(by_title[0].id, 1);

        let by_folder = search(&records, "trips");
        assert_eq!(by_folder.len(), 1);
        assert_eq!(by_folder[0].id, 2);

        assert!(search(&records, "nothing").is_empty());
    }

    #[test]
    fn test_recent_videos_preserves_store_order() {
        let records = vec![
            video(1, "/sd/Movies/a.mp4"),
            video(2, "/sd/Movies/b.mp4"),
            video(3, "/sd/Movies/c.mp4"),
        ];
        let recent = recent_videos(&records, &[3, 1, 99]);

        let ids: Vec<i64> = recent.iter().map(|r| r.id).collect();
        assert_eq!(ids, [3, 1]);
    }

    #[test]
    fn test_completed_and_in_progress_filters() {
        let mut done = video(1, "/sd/Movies/a.mp4");
        done.watch.fraction = 1.0;
        done.watch.completed = true;
        let mut started = video(2, "/sd/Movies/b.mp4");
        started.watch.fraction = 0.4;
        let fresh = video(3, "/sd/Movies/c.mp4");

        let records = vec![done, started, fresh];
        assert_eq!(completed_videos(&records).len(), 1);
        assert_eq!(completed_videos(&records)[0].id, 1);
        assert_eq!(in_progress_videos(&records).len(), 1);
        assert_eq!(in_progress_videos(&records)[0].id, 2);
    }

    #[test]
    fn test_full_listing_flow() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "Movies/a.mp4");
        let b = touch(dir.path(), "Movies/Trip/b.mp4");
        touch(dir.path(), "Movies/Trip/c.mp4");
        touch(dir.path(), "Movies/notes.txt");

        let index = FsMediaIndex::new(vec![dir.path().to_path_buf()]);
        let records = discover(&index).unwrap();
        assert_eq!(records.len(), 3);

        let store = ProgressStore::open_memory().unwrap();
        let (videos, folders) = refresh_listing(records, &store);

        let names: Vec<&str> = folders.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["Trip", "a"]);
        assert_eq!(folders[0].video_count, 2);
        assert!(folders[1].is_singleton());

        // A session on b: half watched, then reflected on refresh.
        let b_id = path_id(&b);
        store.record_progress(b_id, 0.5, 120_000).unwrap();
        store.record_resume_position(b_id, 60_000).unwrap();

        let (videos, folders) = refresh_listing(videos, &store);
        let b_rec = videos.iter().find(|v| v.id == b_id).unwrap();
        assert_eq!(b_rec.watch.fraction, 0.5);
        assert!(b_rec.is_watched());
        assert!(!b_rec.watch.completed);

        let trip = &folders[0];
        let b_in_group = trip.videos.iter().find(|v| v.id == b_id).unwrap();
        assert_eq!(b_in_group.watch.resume_position_ms, 60_000);

        // Others untouched.
        assert!(videos
            .iter()
            .filter(|v| v.id != b_id)
            .all(|v| v.watch == WatchState::default()));
    }
}
