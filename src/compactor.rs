use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::engine::Engine;
use crate::observability;

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that compacts the journal once enough appends pile up, and
/// drops change-feed channels nobody listens to.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_needed(&engine, threshold).await;
        let pruned = engine.notify.prune();
        if pruned > 0 {
            tracing::debug!(pruned, "pruned idle change-feed channels");
        }
    }
}

/// Spawn `run_compactor` with the engine's configured threshold.
pub fn spawn(engine: Arc<Engine>) -> JoinHandle<()> {
    let threshold = engine.config().compact_threshold;
    tokio::spawn(run_compactor(engine, threshold))
}

/// Returns true if a compaction ran and succeeded.
pub async fn compact_if_needed(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.journal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact_journal().await {
        Ok(()) => {
            info!(appends, "compacted journal");
            metrics::counter!(observability::JOURNAL_COMPACTIONS_TOTAL, "status" => "ok")
                .increment(1);
            true
        }
        Err(e) => {
            tracing::warn!("journal compaction failed: {e}");
            metrics::counter!(observability::JOURNAL_COMPACTIONS_TOTAL, "status" => "error")
                .increment(1);
            false
        }
    }
}
