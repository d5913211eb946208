//! Optional retention sweeper for finished conversions.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::registry::JobRegistry;
use crate::storage;

/// How often the sweeper checks for expired jobs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Remove terminal jobs that finished more than `retention` ago, together
/// with their files. Returns how many were removed.
pub fn sweep_once(registry: &JobRegistry, retention: Duration) -> usize {
    let Ok(retention) = chrono::Duration::from_std(retention) else {
        return 0;
    };
    let cutoff = Utc::now() - retention;

    let mut removed = 0;
    for id in registry.finished_before(cutoff) {
        if let Some(job) = registry.remove(&id) {
            storage::remove_file(&job.input_path);
            storage::remove_file(&job.output_path);
            tracing::debug!(job_id = %id, "Swept expired conversion");
            removed += 1;
        }
    }
    removed
}

/// Run [`sweep_once`] every `interval` until cancelled.
pub async fn run_sweeper(
    registry: Arc<JobRegistry>,
    retention: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!("Retention sweeper started (retention {}s)", retention.as_secs());
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let removed = sweep_once(&registry, retention);
                if removed > 0 {
                    tracing::info!("Swept {removed} expired conversions");
                }
            }
        }
    }
}
