//! Prometheus metrics for a swap session
//!
//! A swap run is a one-shot process, so instead of serving a scrape endpoint
//! the registry is written in text exposition format to a file at the end of
//! the session (node-exporter textfile collector).

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::path::Path;
use std::time::Duration;
use tracing::info;

lazy_static! {
    pub static ref SWAP_SESSIONS: CounterVec = register_counter_vec!(
        "swapper_sessions_total",
        "Swap sessions by final state",
        &["state"]
    ).unwrap();

    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "swapper_transactions_submitted_total",
        "Transactions included on chain",
        &["chain_id", "kind"]
    ).unwrap();

    pub static ref TX_FAILED: CounterVec = register_counter_vec!(
        "swapper_transactions_failed_total",
        "Transactions that failed to submit or were included with failed status",
        &["chain_id", "kind"]
    ).unwrap();

    pub static ref FINALITY_POLLS: CounterVec = register_counter_vec!(
        "swapper_finality_polls_total",
        "Aggregator status polls by reported status",
        &["chain_id", "status"]
    ).unwrap();

    pub static ref STAGE_LATENCY: HistogramVec = register_histogram_vec!(
        "swapper_stage_latency_seconds",
        "Latency of swap session stages",
        &["stage"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0]
    ).unwrap();
}

pub fn record_session(state: &str) {
    SWAP_SESSIONS.with_label_values(&[state]).inc();
}

pub fn record_tx_submitted(chain_id: u64, kind: &str) {
    TX_SUBMITTED
        .with_label_values(&[&chain_id.to_string(), kind])
        .inc();
}

pub fn record_tx_failed(chain_id: u64, kind: &str) {
    TX_FAILED
        .with_label_values(&[&chain_id.to_string(), kind])
        .inc();
}

pub fn record_finality_poll(chain_id: u64, status: &str) {
    FINALITY_POLLS
        .with_label_values(&[&chain_id.to_string(), status])
        .inc();
}

pub fn record_stage_latency(stage: &str, elapsed: Duration) {
    STAGE_LATENCY
        .with_label_values(&[stage])
        .observe(elapsed.as_secs_f64());
}

/// Render all registered metrics in text exposition format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Write the registry to `path`, via a temp file so collectors never read a partial file
pub fn write_textfile(path: &Path) -> std::io::Result<()> {
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, render())?;
    std::fs::rename(&tmp, path)?;
    info!("Metrics written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_textfile_contains_recorded_metrics() {
        record_tx_submitted(5000, "swap");
        record_finality_poll(5000, "pending");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swapper.prom");
        write_textfile(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("swapper_transactions_submitted_total"));
        assert!(text.contains("swapper_finality_polls_total"));
        assert!(!dir.path().join("swapper.prom.tmp").exists());
    }
}
