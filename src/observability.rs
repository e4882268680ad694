use std::net::SocketAddr;
use std::time::Instant;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: engine operations. Labels: op, status.
pub const OPERATIONS_TOTAL: &str = "slotbook_operations_total";

/// Histogram: operation latency in seconds, lock wait included. Labels: op.
pub const OPERATION_DURATION_SECONDS: &str = "slotbook_operation_duration_seconds";

/// Counter: rejected candidates. Labels: kind (within_batch, against_existing).
pub const CONFLICTS_TOTAL: &str = "slotbook_conflicts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: committed slots on the timeline.
pub const SLOTS_COMMITTED: &str = "slotbook_slots_committed";

/// Histogram: journal append + fsync duration in seconds.
pub const JOURNAL_APPEND_DURATION_SECONDS: &str = "slotbook_journal_append_duration_seconds";

/// Counter: journal compactions. Labels: status.
pub const JOURNAL_COMPACTIONS_TOTAL: &str = "slotbook_journal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

pub(crate) fn record_operation<T>(op: &'static str, started: Instant, result: &Result<T, EngineError>) {
    let status = match result {
        Ok(_) => "ok",
        Err(e) => e.metric_label(),
    };
    metrics::counter!(OPERATIONS_TOTAL, "op" => op, "status" => status).increment(1);
    metrics::histogram!(OPERATION_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
    if let Err(EngineError::Conflict(c)) = result {
        let kind = match c {
            crate::engine::ConflictError::WithinBatch { .. } => "within_batch",
            crate::engine::ConflictError::AgainstExisting { .. } => "against_existing",
        };
        metrics::counter!(CONFLICTS_TOTAL, "kind" => kind).increment(1);
        tracing::debug!(op, "rejected: {c}");
    }
}
