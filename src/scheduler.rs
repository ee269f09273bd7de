use crate::feeds::SearchSource;
use crate::refresh::{RefreshCoordinator, RefreshOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Background task that triggers a refresh every `period`, independent of reads.
///
/// The first tick fires immediately. Ticks that land while a refresh is still
/// running are absorbed by the coordinator's single-flight gate. Dropping the
/// scheduler without calling [`RefreshScheduler::shutdown`] also stops the task.
pub struct RefreshScheduler {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RefreshScheduler {
    pub fn spawn<S: SearchSource + 'static>(coordinator: Arc<RefreshCoordinator<S>>, period: Duration) -> Self {
        let (shutdown, mut stop) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(period_secs = period.as_secs(), "Refresh scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop.changed() => break,
                }

                let force_full = coordinator.needs_full_refresh().await;
                match coordinator.refresh(force_full).await {
                    Ok(RefreshOutcome::Skipped { .. }) => {
                        tracing::debug!("Scheduled refresh skipped, previous one still running");
                    }
                    Ok(RefreshOutcome::Completed { kind, new_mentions, .. }) => {
                        tracing::debug!(?kind, new_mentions, "Scheduled refresh done");
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "Scheduled refresh failed, retrying next tick");
                    }
                }
            }

            tracing::info!("Refresh scheduler stopped");
        });

        Self { shutdown, handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop ticking and wait for the task to exit. An in-flight refresh is
    /// allowed to finish first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.handle.await {
            tracing::error!(error = %err, "Refresh scheduler task panicked");
        }
    }
}
