//! Prometheus metrics
//!
//! The recorder is process-global, so [`init_metrics`] runs once from `main`.
//! Recording without an installed recorder is a no-op.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

use docchat_core::{QueryResponse, QueryStatus};
use docchat_rag::IngestReport;

use crate::state::AppState;

const QUERIES_TOTAL: &str = "docchat_queries_total";
const QUERY_ATTEMPTS: &str = "docchat_query_attempts";
const INGESTS_TOTAL: &str = "docchat_ingests_total";
const CORPUS_CHUNKS: &str = "docchat_corpus_chunks";

/// Install the Prometheus recorder
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(QUERY_ATTEMPTS.to_string()),
            &[1.0, 2.0, 3.0, 4.0, 5.0, 8.0],
        )?
        .install_recorder()
}

/// Count a finished query by status and record its attempts
pub fn record_query_outcome(response: &QueryResponse) {
    let status = match response.status {
        QueryStatus::Finalized => "finalized",
        QueryStatus::Rejected => "rejected",
        QueryStatus::Unverified => "unverified",
        QueryStatus::Cancelled => "cancelled",
    };
    metrics::counter!(QUERIES_TOTAL, "status" => status).increment(1);
    record_attempts(response.attempts);
}

pub fn record_attempts(attempts: u32) {
    metrics::histogram!(QUERY_ATTEMPTS).record(f64::from(attempts));
}

pub fn record_ingest(report: &IngestReport) {
    let outcome = if report.rebuilt { "rebuilt" } else { "unchanged" };
    metrics::counter!(INGESTS_TOTAL, "outcome" => outcome).increment(1);
    metrics::gauge!(CORPUS_CHUNKS).set(report.chunks as f64);
}

/// `GET /metrics`
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics disabled\n".to_string()),
    }
}
