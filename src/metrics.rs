// src/metrics.rs
use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("crawl_cycles_total", "Source visits started.");
        describe_counter!(
            "crawl_candidates_total",
            "Candidate items returned by sources."
        );
        describe_counter!(
            "crawl_filtered_total",
            "Candidates dropped as incomplete or irrelevant."
        );
        describe_counter!(
            "crawl_dedup_total",
            "Candidates dropped because they were already ingested."
        );
        describe_counter!("crawl_ingested_total", "Records durably appended.");
        describe_counter!(
            "crawl_source_errors_total",
            "Source listing failures, labelled by kind."
        );
        describe_counter!(
            "crawl_subfetch_errors_total",
            "Comment-thread fetches that failed or timed out."
        );
        describe_counter!(
            "crawl_persist_failures_total",
            "Batches that could not be appended."
        );
        describe_gauge!("crawl_dedup_size", "Identifiers known to be ingested.");
        describe_histogram!(
            "crawl_subfetch_ms",
            "Wall time of one concurrent comment-fetch batch in milliseconds."
        );
    });
}

/// Install the Prometheus recorder with an HTTP listener on `addr`.
/// Must be called from inside a Tokio runtime.
pub fn install_exporter(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("prometheus: install exporter on {addr}"))?;
    ensure_metrics_described();
    Ok(())
}
