//! Metrics and observability utilities
//!
//! Standardized metric names for sync, embedding, and retrieval paths.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

/// Metrics prefix for all Threadline metrics
pub const METRICS_PREFIX: &str = "threadline";

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_sync_pages_total", METRICS_PREFIX),
        Unit::Count,
        "Total pages fetched from the platform API"
    );

    describe_counter!(
        format!("{}_sync_items_total", METRICS_PREFIX),
        Unit::Count,
        "Total entity records processed by sync runs"
    );

    describe_histogram!(
        format!("{}_sync_run_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Wall-clock duration of complete sync runs"
    );

    describe_counter!(
        format!("{}_connector_retries_total", METRICS_PREFIX),
        Unit::Count,
        "Retries issued by the platform connector"
    );

    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API errors"
    );

    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Retrieval query latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Record one fetched page for an entity type.
pub fn record_page(entity: &'static str, items: usize) {
    counter!(
        format!("{}_sync_pages_total", METRICS_PREFIX),
        "entity" => entity
    )
    .increment(1);

    counter!(
        format!("{}_sync_items_total", METRICS_PREFIX),
        "entity" => entity
    )
    .increment(items as u64);
}

/// Record a finished sync run.
pub fn record_sync_run(duration_secs: f64, status: &'static str) {
    histogram!(
        format!("{}_sync_run_duration_seconds", METRICS_PREFIX),
        "status" => status
    )
    .record(duration_secs);
}

/// Record a connector retry.
pub fn record_retry(reason: &'static str) {
    counter!(
        format!("{}_connector_retries_total", METRICS_PREFIX),
        "reason" => reason
    )
    .increment(1);
}

/// Record an embedding API call outcome.
pub fn record_embedding(model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if !success {
        counter!(
            format!("{}_embedding_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(batch_size as u64);
    }
}

/// Record a retrieval query.
pub fn record_retrieval(duration_secs: f64, result_count: usize) {
    histogram!(format!("{}_retrieval_duration_seconds", METRICS_PREFIX)).record(duration_secs);

    counter!(
        format!("{}_sync_items_total", METRICS_PREFIX),
        "entity" => "retrieval_result"
    )
    .increment(result_count as u64);
}
