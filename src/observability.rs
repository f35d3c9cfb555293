use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: reservations accepted.
pub const RESERVATIONS_CREATED_TOTAL: &str = "quadra_reservations_created_total";

/// Counter: reservation creates/updates refused. Labels: reason.
pub const RESERVATIONS_REJECTED_TOTAL: &str = "quadra_reservations_rejected_total";

/// Counter: tournament registrations accepted.
pub const REGISTRATIONS_CREATED_TOTAL: &str = "quadra_registrations_created_total";

/// Counter: tournament registrations refused. Labels: reason.
pub const REGISTRATIONS_REJECTED_TOTAL: &str = "quadra_registrations_rejected_total";

/// Histogram: operation latency in seconds. Labels: operation.
pub const OPERATION_DURATION_SECONDS: &str = "quadra_operation_duration_seconds";

// ── Background work ─────────────────────────────────────────────

/// Counter: scheduled task runs. Labels: task, status.
pub const TASK_RUNS_TOTAL: &str = "quadra_task_runs_total";

/// Counter: rows touched by sweeps. Labels: task.
pub const SWEEP_ROWS_TOTAL: &str = "quadra_sweep_rows_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "quadra_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "quadra_journal_flush_batch_size";

/// Counter: journal compactions.
pub const JOURNAL_COMPACTIONS_TOTAL: &str = "quadra_journal_compactions_total";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
