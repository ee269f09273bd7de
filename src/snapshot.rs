//! The cached leaderboard state and its on-disk copy.
//!
//! A [`Snapshot`] is never edited in place: refreshes build a replacement and
//! swap it in whole. [`SnapshotStore`] persists each replacement as a single
//! JSON document, written to a temp file in the same directory and renamed
//! over the previous copy.

use crate::aggregate::{aggregate, AggregateEntry};
use crate::error::PersistenceError;
use crate::feeds::{Author, Mention};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Newest first.
    pub mentions: Vec<Mention>,
    /// Keyed by author id, in discovery order.
    pub authors: IndexMap<String, Author>,
    /// Derived; recomputed on load.
    #[serde(default)]
    pub aggregate: Vec<AggregateEntry>,
    pub newest_mention_id: Option<String>,
    pub target_handle: String,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_full_refresh: Option<DateTime<Utc>>,
    /// Derived; recomputed on load.
    #[serde(default)]
    pub total_mentions: usize,
}

impl Snapshot {
    pub fn empty(target_handle: impl Into<String>) -> Self {
        Self {
            mentions: Vec::new(),
            authors: IndexMap::new(),
            aggregate: Vec::new(),
            newest_mention_id: None,
            target_handle: target_handle.into(),
            last_updated: None,
            last_full_refresh: None,
            total_mentions: 0,
        }
    }

    /// Assemble a snapshot, deriving `aggregate` and `total_mentions`.
    pub fn build(
        target_handle: String,
        mentions: Vec<Mention>,
        authors: IndexMap<String, Author>,
        newest_mention_id: Option<String>,
        last_updated: Option<DateTime<Utc>>,
        last_full_refresh: Option<DateTime<Utc>>,
    ) -> Self {
        let aggregate = aggregate(&mentions, &authors);
        Self {
            total_mentions: mentions.len(),
            mentions,
            authors,
            aggregate,
            newest_mention_id,
            target_handle,
            last_updated,
            last_full_refresh,
        }
    }

    /// Recompute the derived fields from `mentions` and `authors`.
    pub fn rebuild(self) -> Self {
        Self::build(
            self.target_handle,
            self.mentions,
            self.authors,
            self.newest_mention_id,
            self.last_updated,
            self.last_full_refresh,
        )
    }

    pub fn unique_users(&self) -> usize {
        self.aggregate.len()
    }

    pub fn age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.last_updated.map(|updated| now - updated)
    }
}

/// `now - last_updated < ttl`. A snapshot that was never filled is not fresh.
pub fn is_fresh(snapshot: &Snapshot, ttl: Duration, now: DateTime<Utc>) -> bool {
    match snapshot.last_updated {
        Some(updated) => elapsed(updated, now) < ttl,
        None => false,
    }
}

/// True when no full refresh has ever completed or the last one is older
/// than `interval`.
pub fn needs_full_refresh(snapshot: &Snapshot, interval: Duration, now: DateTime<Utc>) -> bool {
    match snapshot.last_full_refresh {
        Some(refreshed) => elapsed(refreshed, now) > interval,
        None => true,
    }
}

fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    // clock skew into the future counts as zero age
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted snapshot. A missing file is `Ok(None)`.
    pub fn load(&self) -> Result<Option<Snapshot>, PersistenceError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        Ok(Some(snapshot.rebuild()))
    }

    /// Load a snapshot for `target_handle`, ignoring one saved for another handle.
    pub fn load_for(&self, target_handle: &str) -> Result<Option<Snapshot>, PersistenceError> {
        Ok(self.load()?.filter(|snapshot| {
            let matches = snapshot.target_handle.eq_ignore_ascii_case(target_handle);
            if !matches {
                tracing::info!(
                    saved = %snapshot.target_handle,
                    target = %target_handle,
                    "Discarding snapshot saved for a different handle"
                );
            }
            matches
        }))
    }

    /// Overwrite the persisted copy in one rename.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let payload = serde_json::to_vec_pretty(snapshot)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&payload)?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|err| PersistenceError::Io(err.error))?;
        Ok(())
    }
}
