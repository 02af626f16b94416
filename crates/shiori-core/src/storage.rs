//! Persistent per-video watch state.
//!
//! One fixed-size row per video id, overwritten in place. Rows are written
//! every few seconds during playback, so writes stay small and bounded.
//! Reads degrade to zero-value defaults when a row (or the store itself) is
//! unavailable: a missing resume point costs the user a few seconds of
//! seeking, a crash here would cost the whole player.

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use crate::error::ShioriError;
use crate::models::{WatchState, COMPLETION_THRESHOLD};

const SCHEMA_V1: &str = include_str!("../../../migrations/001_initial.sql");
const SCHEMA_V2: &str = include_str!("../../../migrations/002_recent_index.sql");

/// Full stored row for one video.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressEntry {
    pub resume_position_ms: i64,
    pub fraction: f32,
    pub completed: bool,
    /// Epoch ms of the first completion; kept across re-watches.
    pub completed_at: Option<i64>,
    /// Epoch ms of the last progress save.
    pub last_watched: i64,
    /// Epoch ms the last playback session opened.
    pub last_played: i64,
}

/// SQLite-backed store of watch progress.
pub struct ProgressStore {
    conn: Connection,
}

impl ProgressStore {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self, ShioriError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, ShioriError> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Persist a progress tick: fraction clamped to 0..=1 (non-finite values
    /// rejected), completion set at the threshold, `last_watched` stamped now.
    ///
    /// Overwrites the previous progress fields entirely. The resume position
    /// has its own write path and is left untouched, so the two saves
    /// tolerate arriving in either order.
    pub fn record_progress(
        &self,
        id: i64,
        fraction: f32,
        duration_ms: i64,
    ) -> Result<(), ShioriError> {
        // clamp() passes NaN through.
        if !fraction.is_finite() {
            return Err(ShioriError::InvalidProgress(format!(
                "non-finite fraction {fraction} for video {id}"
            )));
        }
        let fraction = fraction.clamp(0.0, 1.0);
        let completed = fraction >= COMPLETION_THRESHOLD;
        let now = Utc::now().timestamp_millis();

        // completed_at marks the first completion only; re-saves and
        // re-watches keep the original stamp.
        let existing = self.entry(id)?;
        let newly_completed = completed && !existing.as_ref().is_some_and(|e| e.completed);
        let completed_at = if newly_completed {
            Some(now)
        } else {
            existing.and_then(|e| e.completed_at)
        };

        self.conn.execute(
            "INSERT INTO watch_state (video_id, fraction, completed, completed_at, last_watched)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(video_id) DO UPDATE SET
               fraction = excluded.fraction,
               completed = excluded.completed,
               completed_at = excluded.completed_at,
               last_watched = excluded.last_watched",
            params![id, fraction, completed, completed_at, now],
        )?;
        debug!(id, percent = (fraction * 100.0) as i32, duration_ms, "Saved watch progress");
        Ok(())
    }

    /// Persist the raw playhead position, clamped to >= 0. Independent of
    /// [`record_progress`].
    pub fn record_resume_position(&self, id: i64, position_ms: i64) -> Result<(), ShioriError> {
        let position_ms = position_ms.max(0);
        self.conn.execute(
            "INSERT INTO watch_state (video_id, resume_position_ms)
             VALUES (?1, ?2)
             ON CONFLICT(video_id) DO UPDATE SET
               resume_position_ms = excluded.resume_position_ms",
            params![id, position_ms],
        )?;
        Ok(())
    }

    /// Stamp the last-played time. Called once when a playback session opens.
    pub fn mark_played(&self, id: i64) -> Result<(), ShioriError> {
        let now = Utc::now().timestamp_millis();
        self.conn.execute(
            "INSERT INTO watch_state (video_id, last_played)
             VALUES (?1, ?2)
             ON CONFLICT(video_id) DO UPDATE SET
               last_played = excluded.last_played",
            params![id, now],
        )?;
        Ok(())
    }

    /// Current watch state for a video, zero-valued when no row exists.
    ///
    /// Store failures also degrade to the default instead of surfacing: the
    /// listing and the player both keep working with "never watched" state.
    pub fn read(&self, id: i64) -> WatchState {
        match self.entry(id) {
            Ok(Some(e)) => WatchState {
                resume_position_ms: e.resume_position_ms,
                fraction: e.fraction,
                completed: e.completed,
                last_watched: e.last_watched,
            },
            Ok(None) => WatchState::default(),
            Err(e) => {
                warn!(id, error = %e, "Progress read failed, defaulting to zero state");
                WatchState::default()
            }
        }
    }

    /// Position playback should open at. Completed videos start over from
    /// zero even when a nonzero resume position is still stored; store
    /// failures degrade to zero.
    pub fn playback_start_position(&self, id: i64) -> i64 {
        match self.entry(id) {
            Ok(Some(e)) if e.completed => 0,
            Ok(Some(e)) => e.resume_position_ms,
            Ok(None) => 0,
            Err(e) => {
                warn!(id, error = %e, "Start-position read failed, starting from zero");
                0
            }
        }
    }

    /// Ids with a saved resume position, most recently played first.
    pub fn recently_played(&self, limit: u32) -> Result<Vec<i64>, ShioriError> {
        let mut stmt = self.conn.prepare(
            "SELECT video_id FROM watch_state
             WHERE resume_position_ms > 0
             ORDER BY last_played DESC, video_id DESC
             LIMIT ?1",
        )?;
        let ids = stmt
            .query_map(params![limit], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }

    /// Full stored row, `None` when the video has never been written.
    pub fn entry(&self, id: i64) -> Result<Option<ProgressEntry>, ShioriError> {
        self.conn
            .query_row(
                "SELECT resume_position_ms, fraction, completed, completed_at,
                        last_watched, last_played
                 FROM watch_state WHERE video_id = ?1",
                params![id],
                |row| {
                    Ok(ProgressEntry {
                        resume_position_ms: row.get(0)?,
                        fraction: row.get(1)?,
                        completed: row.get(2)?,
                        completed_at: row.get(3)?,
                        last_watched: row.get(4)?,
                        last_played: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    /// Drop every stored field for a video. Reads afterwards return the
    /// zero-value default again.
    pub fn clear(&self, id: i64) -> Result<(), ShioriError> {
        self.conn
            .execute("DELETE FROM watch_state WHERE video_id = ?1", params![id])?;
        Ok(())
    }
}

/// Run schema migrations using `PRAGMA user_version` for version tracking.
fn run_migrations(conn: &Connection) -> Result<(), ShioriError> {
    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        conn.execute_batch(SCHEMA_V1)?;
        conn.pragma_update(None, "user_version", 1)?;
    }
    if version < 2 {
        conn.execute_batch(SCHEMA_V2)?;
        conn.pragma_update(None, "user_version", 2)?;
    }
    Ok(())
}
