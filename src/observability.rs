use std::net::SocketAddr;
use std::time::Instant;

use crate::command::Command;
use crate::engine::BookingError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking operations. Labels: op, status (`ok` or the error kind).
pub const OPERATIONS_TOTAL: &str = "fleetbook_operations_total";

/// Histogram: operation latency in seconds. Labels: op.
pub const OPERATION_DURATION_SECONDS: &str = "fleetbook_operation_duration_seconds";

/// Counter: requests rejected because the window was already booked.
pub const WINDOW_CONFLICTS_TOTAL: &str = "fleetbook_window_conflicts_total";

/// Counter: revalidation rounds after losing a booking-generation race.
pub const GENERATION_RETRIES_TOTAL: &str = "fleetbook_generation_retries_total";

/// Counter: transport lines that failed to decode.
pub const MALFORMED_REQUESTS_TOTAL: &str = "fleetbook_malformed_requests_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: journal group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "fleetbook_wal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "fleetbook_wal_flush_batch_size";

/// Counter: journal compactions performed.
pub const WAL_COMPACTIONS_TOTAL: &str = "fleetbook_wal_compactions_total";

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

pub fn record_operation<T>(op: &'static str, started: Instant, result: &Result<T, BookingError>) {
    let status = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::counter!(OPERATIONS_TOTAL, "op" => op, "status" => status).increment(1);
    metrics::histogram!(OPERATION_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
}

/// Map a Command variant to a short label for logs and metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::Create { .. } => "create",
        Command::Update { .. } => "update",
        Command::Cancel { .. } => "cancel",
        Command::Get { .. } => "get",
        Command::List { .. } => "list",
        Command::Delete { .. } => "delete",
        Command::Availability { .. } => "availability",
        Command::Quote { .. } => "quote",
    }
}
