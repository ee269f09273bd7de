use crate::aggregate::{find_entry, normalize_handle};
use crate::feeds::SearchSource;
use crate::format::{format_leaderboard, share_percent, PersonalStats, Tier, UserStats};
use crate::refresh::RefreshCoordinator;
use crate::snapshot::{is_fresh, Snapshot};
use chrono::Utc;
use std::sync::Arc;

/// Read API over the cached snapshot. Never mutates it directly.
pub struct QueryService<S> {
    coordinator: Arc<RefreshCoordinator<S>>,
}

impl<S> Clone for QueryService<S> {
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
        }
    }
}

impl<S: SearchSource + 'static> QueryService<S> {
    pub fn new(coordinator: Arc<RefreshCoordinator<S>>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator<S>> {
        &self.coordinator
    }

    /// Formatted top-10 for the tracked handle.
    pub async fn get_leaderboard(&self) -> String {
        let snapshot = self.current_snapshot().await;
        format_leaderboard(&snapshot, Utc::now())
    }

    /// Rank, count and share for one mentioner, matched case-insensitively
    /// with or without a leading "@".
    pub async fn get_personal_stats(&self, mentioner: &str) -> PersonalStats {
        let snapshot = self.current_snapshot().await;
        personal_stats(&snapshot, mentioner)
    }

    /// Serve a fresh snapshot straight from memory; refresh a stale one first.
    ///
    /// A failed refresh falls back to whatever is cached, even if stale or empty.
    pub async fn current_snapshot(&self) -> Arc<Snapshot> {
        let snapshot = self.coordinator.snapshot().await;
        let ttl = self.coordinator.policy().cache_ttl;
        let now = Utc::now();

        if is_fresh(&snapshot, ttl, now) {
            // past half its ttl: top up in the background so the next read stays fast
            let half_ttl = chrono::Duration::from_std(ttl / 2).unwrap_or(chrono::Duration::zero());
            if snapshot.age(now).is_some_and(|age| age >= half_ttl) {
                self.spawn_background_refresh();
            }
            return snapshot;
        }

        tracing::debug!(handle = %snapshot.target_handle, "Snapshot stale, refreshing before answering");
        match self.coordinator.refresh(false).await {
            Ok(outcome) => outcome.snapshot().clone(),
            Err(err) => {
                tracing::warn!(error = %err, "Serving cached snapshot after failed refresh");
                self.coordinator.snapshot().await
            }
        }
    }

    pub fn spawn_background_refresh(&self) {
        if self.coordinator.is_refreshing() {
            return;
        }
        let coordinator = self.coordinator.clone();
        tokio::spawn(async move {
            if let Err(err) = coordinator.refresh(false).await {
                tracing::warn!(error = %err, "Background refresh failed");
            }
        });
    }
}

pub fn personal_stats(snapshot: &Snapshot, mentioner: &str) -> PersonalStats {
    match find_entry(&snapshot.aggregate, mentioner) {
        Some((rank, entry)) => {
            let total_users = snapshot.unique_users();
            PersonalStats::Found(UserStats {
                entry: entry.clone(),
                rank,
                total_users,
                share_percent: share_percent(entry.count, snapshot.total_mentions),
                tier: Tier::for_rank(rank, total_users),
            })
        }
        None => PersonalStats::NotFound {
            handle: normalize_handle(mentioner).to_string(),
            target_handle: snapshot.target_handle.clone(),
        },
    }
}
