use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::record::Post;

const TRACKER_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS acted_posts (
    post_id TEXT PRIMARY KEY,
    link TEXT NOT NULL,
    acted_at TEXT NOT NULL
);";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    pub acted: u64,
    pub skipped: u64,
}

#[derive(Debug, Clone)]
struct ActedEntry {
    link: String,
    acted_at: DateTime<Utc>,
}

/// Process-lifetime bookkeeping of liked and skipped posts.
///
/// The tracker never prevents an action; callers decide what to filter.
#[derive(Debug, Default)]
pub struct ActionTracker {
    acted: HashMap<String, ActedEntry>,
    stats: TrackerStats,
}

impl ActionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds identifiers acted on by earlier runs. Counters are left at zero.
    pub fn with_history(history: Vec<(String, String, DateTime<Utc>)>) -> Self {
        let acted = history
            .into_iter()
            .map(|(id, link, acted_at)| (id, ActedEntry { link, acted_at }))
            .collect();
        Self {
            acted,
            stats: TrackerStats::default(),
        }
    }

    pub fn record_acted(&mut self, post: &Post) {
        self.stats.acted = self.stats.acted.saturating_add(1);
        self.acted.entry(post.id.clone()).or_insert_with(|| ActedEntry {
            link: post.link.clone(),
            acted_at: Utc::now(),
        });
    }

    pub fn record_skipped(&mut self, post: &Post) {
        self.stats.skipped = self.stats.skipped.saturating_add(1);
        debug!(post = %post.id, skipped = self.stats.skipped, "post skipped");
    }

    pub fn has_acted(&self, id: &str) -> bool {
        self.acted.contains_key(id)
    }

    pub fn acted_ids(&self) -> impl Iterator<Item = &str> {
        self.acted.keys().map(String::as_str)
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("failed to open tracker database {path}: {source}")]
    Open {
        source: rusqlite::Error,
        path: PathBuf,
    },
    #[error("failed to execute statement on tracker database: {0}")]
    Execute(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid timestamp in tracker database: {0}")]
    Timestamp(String),
}

pub type TrackerResult<T> = Result<T, TrackerError>;

/// SQLite-backed history of liked posts, shared between runs.
#[derive(Debug, Clone)]
pub struct TrackerStore {
    path: PathBuf,
}

impl TrackerStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> TrackerResult<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        let conn = Connection::open_with_flags(&self.path, flags).map_err(|source| {
            TrackerError::Open {
                source,
                path: self.path.clone(),
            }
        })?;
        conn.execute_batch(TRACKER_SCHEMA)?;
        Ok(conn)
    }

    pub fn load(&self) -> TrackerResult<ActionTracker> {
        let conn = self.open()?;
        let mut stmt = conn.prepare("SELECT post_id, link, acted_at FROM acted_posts")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut history = Vec::with_capacity(rows.len());
        for (id, link, acted_at) in rows {
            let acted_at = DateTime::parse_from_rfc3339(&acted_at)
                .map_err(|err| TrackerError::Timestamp(format!("{acted_at}: {err}")))?
                .with_timezone(&Utc);
            history.push((id, link, acted_at));
        }
        debug!(path = %self.path.display(), entries = history.len(), "tracker history loaded");
        Ok(ActionTracker::with_history(history))
    }

    /// Writes every acted identifier; existing rows keep their first timestamp.
    pub fn save(&self, tracker: &ActionTracker) -> TrackerResult<usize> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO acted_posts (post_id, link, acted_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(post_id) DO NOTHING",
            )?;
            for (id, entry) in &tracker.acted {
                written += stmt.execute(params![id, entry.link, entry.acted_at.to_rfc3339()])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }
}
