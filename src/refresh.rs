//! Refresh orchestration: full vs incremental policy, single-flight gate, and
//! merging fetch results into a replacement [`Snapshot`].

use crate::error::{FetchError, PersistenceError, RefreshError};
use crate::feeds::{FetchResult, Mention, PaginatedFetcher, SearchSource};
use crate::format::format_full_leaderboard;
use crate::snapshot::{is_fresh, needs_full_refresh, Snapshot, SnapshotStore};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    pub cache_ttl: Duration,
    pub full_refresh_interval: Duration,
    pub fetch_timeout: Duration,
    pub max_mentions: usize,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(5 * 60),
            full_refresh_interval: Duration::from_secs(24 * 60 * 60),
            fetch_timeout: Duration::from_secs(10 * 60),
            max_mentions: 50_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshKind {
    Full,
    Incremental,
}

#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// Another refresh held the gate; nothing was fetched.
    Skipped { snapshot: Arc<Snapshot> },
    Completed {
        kind: RefreshKind,
        new_mentions: usize,
        snapshot: Arc<Snapshot>,
        persisted: bool,
    },
}

impl RefreshOutcome {
    pub fn snapshot(&self) -> &Arc<Snapshot> {
        match self {
            RefreshOutcome::Skipped { snapshot } => snapshot,
            RefreshOutcome::Completed { snapshot, .. } => snapshot,
        }
    }
}

pub struct RefreshCoordinator<S> {
    fetcher: PaginatedFetcher<S>,
    store: SnapshotStore,
    policy: RefreshPolicy,
    current: RwLock<Arc<Snapshot>>,
    in_flight: AtomicBool,
}

/// Holds the single-flight slot; releases it when dropped, whatever the outcome.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn claim(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<S: SearchSource> RefreshCoordinator<S> {
    /// Start from an empty snapshot, replaced by the persisted one if it loads.
    pub fn new(target_handle: &str, fetcher: PaginatedFetcher<S>, store: SnapshotStore, policy: RefreshPolicy) -> Self {
        let snapshot = match store.load_for(target_handle) {
            Ok(Some(snapshot)) => {
                tracing::info!(
                    path = %store.path().display(),
                    mentions = snapshot.total_mentions,
                    "Loaded cached snapshot"
                );
                snapshot
            }
            Ok(None) => Snapshot::empty(target_handle),
            Err(err) => {
                tracing::warn!(path = %store.path().display(), error = %err, "Ignoring unreadable snapshot");
                Snapshot::empty(target_handle)
            }
        };

        Self {
            fetcher,
            store,
            policy,
            current: RwLock::new(Arc::new(snapshot)),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn policy(&self) -> &RefreshPolicy {
        &self.policy
    }

    pub fn fetcher(&self) -> &PaginatedFetcher<S> {
        &self.fetcher
    }

    pub async fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().await.clone()
    }

    pub async fn is_fresh(&self) -> bool {
        is_fresh(&*self.snapshot().await, self.policy.cache_ttl, Utc::now())
    }

    pub async fn needs_full_refresh(&self) -> bool {
        needs_full_refresh(&*self.snapshot().await, self.policy.full_refresh_interval, Utc::now())
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one refresh unless another is already in flight.
    ///
    /// On fetch failure the current snapshot is left untouched. A failed save
    /// still installs the new snapshot in memory.
    pub async fn refresh(&self, force_full_refresh: bool) -> Result<RefreshOutcome, RefreshError> {
        let Some(_flight) = FlightGuard::claim(&self.in_flight) else {
            tracing::debug!("Refresh already in progress, skipping");
            return Ok(RefreshOutcome::Skipped {
                snapshot: self.snapshot().await,
            });
        };

        let current = self.snapshot().await;
        let kind = if force_full_refresh || needs_full_refresh(&current, self.policy.full_refresh_interval, Utc::now()) {
            RefreshKind::Full
        } else {
            RefreshKind::Incremental
        };
        let query = format!("@{}", current.target_handle);
        let started = Instant::now();

        tracing::info!(handle = %current.target_handle, ?kind, "Refresh started");

        let since_id = match kind {
            RefreshKind::Full => None,
            RefreshKind::Incremental => current.newest_mention_id.as_deref(),
        };
        let fetched = match self.fetch(&query, since_id).await {
            Ok(fetched) => fetched,
            Err(err) => {
                tracing::warn!(
                    handle = %current.target_handle,
                    ?kind,
                    error = %err,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Refresh failed, keeping previous snapshot"
                );
                return Err(err.into());
            }
        };

        // timestamps mark completion, not start
        let finished_at = Utc::now();
        let (next, new_mentions) = match kind {
            RefreshKind::Full => {
                let count = fetched.mentions.len();
                (apply_full_refresh(&current, fetched, finished_at), count)
            }
            RefreshKind::Incremental => merge_incremental(&current, fetched, finished_at),
        };
        let next = Arc::new(enforce_retention(next, self.policy.max_mentions));

        *self.current.write().await = next.clone();

        if new_mentions > 0 || kind == RefreshKind::Full {
            tracing::debug!("\n{}", format_full_leaderboard(&next));
        }

        let persisted = match self.persist(next.clone()).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(
                    path = %self.store.path().display(),
                    error = %err,
                    "Failed to persist snapshot; in-memory copy remains authoritative"
                );
                false
            }
        };

        tracing::info!(
            handle = %next.target_handle,
            ?kind,
            new_mentions,
            total_mentions = next.total_mentions,
            unique_users = next.unique_users(),
            persisted,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Refresh complete"
        );

        Ok(RefreshOutcome::Completed {
            kind,
            new_mentions,
            snapshot: next,
            persisted,
        })
    }

    async fn fetch(&self, query: &str, since_id: Option<&str>) -> Result<FetchResult, FetchError> {
        let timeout = self.policy.fetch_timeout;
        tokio::time::timeout(timeout, self.fetcher.fetch(query, since_id))
            .await
            .map_err(|_| FetchError::Timeout(timeout))?
    }

    async fn persist(&self, snapshot: Arc<Snapshot>) -> Result<(), PersistenceError> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.save(&snapshot))
            .await
            .map_err(|err| PersistenceError::Io(std::io::Error::other(err)))?
    }
}

/// Replace mentions and authors wholesale with a full fetch.
pub fn apply_full_refresh(current: &Snapshot, fetched: FetchResult, now: DateTime<Utc>) -> Snapshot {
    let mentions = dedupe_mentions(fetched.mentions, &HashSet::new());
    let mut authors = IndexMap::new();
    for author in fetched.authors {
        authors.entry(author.id.clone()).or_insert(author);
    }
    let newest = newest_mention_id(&mentions).or_else(|| current.newest_mention_id.clone());

    Snapshot::build(
        current.target_handle.clone(),
        mentions,
        authors,
        newest,
        Some(now),
        Some(now),
    )
}

/// Prepend newly fetched mentions and add authors not seen before.
///
/// Returns the replacement snapshot and the number of mentions it gained.
/// With nothing new only `last_updated` moves.
pub fn merge_incremental(current: &Snapshot, fetched: FetchResult, now: DateTime<Utc>) -> (Snapshot, usize) {
    let known: HashSet<&str> = current.mentions.iter().map(|m| m.id.as_str()).collect();
    let fresh = dedupe_mentions(fetched.mentions, &known);

    if fresh.is_empty() {
        let mut next = current.clone();
        next.last_updated = Some(now);
        return (next, 0);
    }

    let added = fresh.len();
    let mut authors = current.authors.clone();
    for author in fetched.authors {
        if !authors.contains_key(&author.id) {
            authors.insert(author.id.clone(), author);
        }
    }

    let mut mentions = fresh;
    mentions.extend(current.mentions.iter().cloned());
    let newest = newest_mention_id(&mentions).or_else(|| current.newest_mention_id.clone());

    let next = Snapshot::build(
        current.target_handle.clone(),
        mentions,
        authors,
        newest,
        Some(now),
        current.last_full_refresh,
    );
    (next, added)
}

/// Keep only the newest `max_mentions` mentions and the authors they reference.
pub fn enforce_retention(snapshot: Snapshot, max_mentions: usize) -> Snapshot {
    if snapshot.mentions.len() <= max_mentions {
        return snapshot;
    }

    let dropped = snapshot.mentions.len() - max_mentions;
    let Snapshot {
        mut mentions,
        authors,
        newest_mention_id,
        target_handle,
        last_updated,
        last_full_refresh,
        ..
    } = snapshot;
    mentions.truncate(max_mentions);

    let referenced: HashSet<&str> = mentions.iter().map(|m| m.author_id.as_str()).collect();
    let authors: IndexMap<_, _> = authors
        .into_iter()
        .filter(|(id, _)| referenced.contains(id.as_str()))
        .collect();

    tracing::info!(dropped, kept = max_mentions, "Trimmed mention history");

    Snapshot::build(
        target_handle,
        mentions,
        authors,
        newest_mention_id,
        last_updated,
        last_full_refresh,
    )
}

/// Drop repeats within the batch and anything already in `known`, keeping fetch order.
fn dedupe_mentions(mentions: Vec<Mention>, known: &HashSet<&str>) -> Vec<Mention> {
    let mut seen = HashSet::new();
    mentions
        .into_iter()
        .filter(|m| !known.contains(m.id.as_str()) && seen.insert(m.id.clone()))
        .collect()
}

/// Latest `created_at`; on equal times the earlier position (newest-first order) wins.
fn newest_mention_id(mentions: &[Mention]) -> Option<String> {
    let mut newest: Option<&Mention> = None;
    for mention in mentions {
        match newest {
            Some(best) if best.created_at >= mention.created_at => {}
            _ => newest = Some(mention),
        }
    }
    newest.map(|m| m.id.clone())
}
