// src/ingest/scheduler.rs
//! The crawl loop: one source per cycle in fixed rotation, filter, dedup,
//! concurrent comment fetch, one atomic append, then a fixed pause.
//!
//! The deadline and the shutdown signal are only checked between cycles. A
//! cycle that has started always runs to the end of its persist step.

use anyhow::{bail, Context, Result};
use metrics::{counter, gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{error, info, warn};

use crate::config::CrawlerConfig;
use crate::ingest::comments::SubResourceFetcher;
use crate::ingest::dedup::DedupStore;
use crate::ingest::sink::RecordSink;
use crate::ingest::types::{IngestedRecord, Source, SourceClient, SourceError};
use crate::ingest::ItemFilter;
use crate::metrics::ensure_metrics_described;

pub const DEFAULT_CYCLE_DELAY: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CrawlSettings {
    pub per_source_limit: usize,
    pub time_budget: Duration,
    pub cycle_delay: Duration,
}

impl CrawlSettings {
    pub fn from_config(cfg: &CrawlerConfig) -> Self {
        Self {
            per_source_limit: cfg.per_source_limit,
            time_budget: cfg.time_budget(),
            cycle_delay: cfg.cycle_delay(),
        }
    }
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            per_source_limit: 100,
            time_budget: Duration::from_secs(3600),
            cycle_delay: DEFAULT_CYCLE_DELAY,
        }
    }
}

/// Rotation cursor, deadline and running totals for one invocation.
#[derive(Debug, Clone)]
pub struct RunState {
    cursor: usize,
    deadline: Instant,
    ingested: usize,
    cycles: usize,
}

impl RunState {
    pub fn new(start: Instant, budget: Duration) -> Self {
        Self {
            cursor: 0,
            deadline: start + budget,
            ingested: 0,
            cycles: 0,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn ingested(&self) -> usize {
        self.ingested
    }

    pub fn cycles(&self) -> usize {
        self.cycles
    }

    pub fn expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    /// Count a finished cycle and move to the next source, whatever the outcome.
    pub fn finish_cycle(&mut self, ingested: usize, rotation_len: usize) {
        self.ingested += ingested;
        self.cycles += 1;
        self.cursor = (self.cursor + 1) % rotation_len.max(1);
    }
}

/// What happened during one visit to one source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CycleReport {
    pub source: String,
    pub candidates: usize,
    pub kept: usize,
    pub new: usize,
    pub ingested: usize,
    /// Kind of listing failure, if the source could not be read.
    pub source_error: Option<&'static str>,
    pub persist_failed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub ingested: usize,
    pub cycles: usize,
    pub elapsed: Duration,
    pub interrupted: bool,
}

pub struct Crawler {
    sources: Vec<Source>,
    client: Arc<dyn SourceClient>,
    filter: ItemFilter,
    fetcher: SubResourceFetcher,
    sink: Box<dyn RecordSink>,
    settings: CrawlSettings,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Crawler {
    pub fn new(
        sources: Vec<Source>,
        client: Arc<dyn SourceClient>,
        filter: ItemFilter,
        fetcher: SubResourceFetcher,
        sink: Box<dyn RecordSink>,
        settings: CrawlSettings,
    ) -> Self {
        Self {
            sources,
            client,
            filter,
            fetcher,
            sink,
            settings,
            shutdown: None,
        }
    }

    /// Stop starting new cycles once `true` is sent; also cuts the pause short.
    pub fn with_shutdown(mut self, rx: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(rx);
        self
    }

    /// Crawl until the time budget is spent or shutdown is requested.
    /// Only startup failures (no sources, unreadable store) are returned as errors.
    pub async fn run(&mut self) -> Result<RunSummary> {
        ensure_metrics_described();
        if self.sources.is_empty() {
            bail!("no sources to crawl");
        }

        let existing = self
            .sink
            .load_existing_ids()
            .context("loading already ingested ids")?;
        let mut dedup = DedupStore::from_ids(existing);
        gauge!("crawl_dedup_size").set(dedup.len() as f64);

        let start = Instant::now();
        let mut state = RunState::new(start, self.settings.time_budget);
        info!(
            target: "ingest",
            sources = self.sources.len(),
            known = dedup.len(),
            budget_secs = self.settings.time_budget.as_secs(),
            client = self.client.name(),
            "crawl started"
        );

        while !state.expired(Instant::now()) && !self.shutdown_requested() {
            let source = self.sources[state.cursor()].clone();
            let report = self.run_cycle(&source, &mut dedup).await;
            state.finish_cycle(report.ingested, self.sources.len());

            info!(
                target: "ingest",
                source = %report.source,
                candidates = report.candidates,
                kept = report.kept,
                new = report.new,
                ingested = report.ingested,
                total = state.ingested(),
                "cycle complete"
            );

            if state.expired(Instant::now()) || self.shutdown_requested() {
                break;
            }
            self.pause(state.deadline()).await;
        }

        let summary = RunSummary {
            ingested: state.ingested(),
            cycles: state.cycles(),
            elapsed: start.elapsed(),
            interrupted: self.shutdown_requested(),
        };
        info!(
            target: "ingest",
            total = summary.ingested,
            cycles = summary.cycles,
            elapsed_secs = summary.elapsed.as_secs_f64(),
            interrupted = summary.interrupted,
            "crawl finished"
        );
        Ok(summary)
    }

    /// fetch → filter → dedup → comment fetch → persist → dedup update.
    pub async fn run_cycle(&mut self, source: &Source, dedup: &mut DedupStore) -> CycleReport {
        counter!("crawl_cycles_total").increment(1);
        let mut report = CycleReport {
            source: source.id.clone(),
            ..CycleReport::default()
        };

        let candidates = match self
            .client
            .list_items(source, self.settings.per_source_limit)
            .await
        {
            Ok(items) => items,
            Err(e) => {
                if matches!(e, SourceError::AccessDenied(_)) {
                    info!(target: "ingest", source = %source.id, "skipping source: access denied");
                } else {
                    warn!(target: "ingest", source = %source.id, kind = e.kind(), error = %e, "source fetch failed");
                }
                counter!("crawl_source_errors_total", "kind" => e.kind()).increment(1);
                report.source_error = Some(e.kind());
                return report;
            }
        };
        report.candidates = candidates.len();
        counter!("crawl_candidates_total").increment(candidates.len() as u64);

        let (kept, filtered) = self.filter.apply_batch(candidates);
        counter!("crawl_filtered_total").increment(filtered as u64);
        report.kept = kept.len();

        let (fresh, duplicates) = dedup.retain_unseen(kept, |f| f.item.id.as_str());
        counter!("crawl_dedup_total").increment(duplicates as u64);
        report.new = fresh.len();
        if fresh.is_empty() {
            return report;
        }

        let mut threads = self
            .fetcher
            .fetch_all(fresh.iter().map(|f| f.item.id.clone()))
            .await;
        let records: Vec<IngestedRecord> = fresh
            .into_iter()
            .map(|f| {
                let comments = threads.remove(&f.item.id).unwrap_or_default();
                IngestedRecord::new(f.item, f.content, comments)
            })
            .collect();

        match self.sink.append(&records) {
            Ok(()) => {
                report.ingested = records.len();
                dedup.extend(records.into_iter().map(|r| r.id));
                counter!("crawl_ingested_total").increment(report.ingested as u64);
                gauge!("crawl_dedup_size").set(dedup.len() as f64);
            }
            Err(e) => {
                error!(
                    target: "ingest",
                    source = %source.id,
                    batch = records.len(),
                    error = ?e,
                    "persist failed; batch stays un-ingested"
                );
                counter!("crawl_persist_failures_total").increment(1);
                report.persist_failed = true;
            }
        }
        report
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Fixed inter-cycle delay, never past the deadline; returns early on shutdown.
    async fn pause(&mut self, deadline: Instant) {
        let wake = (Instant::now() + self.settings.cycle_delay).min(deadline);
        let Some(rx) = self.shutdown.as_mut() else {
            sleep_until(wake).await;
            return;
        };
        let interrupted = tokio::select! {
            _ = sleep_until(wake) => false,
            res = rx.wait_for(|stop| *stop) => res.is_ok(),
        };
        // A dropped sender cannot interrupt anymore; finish the pause.
        if !interrupted && Instant::now() < wake {
            sleep_until(wake).await;
        }
    }
}
