// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod ingest;
pub mod metrics;

// ---- Re-exports for stable public API ----
pub use crate::config::{CrawlerConfig, RedditCredentials};
pub use crate::ingest::comments::SubResourceFetcher;
pub use crate::ingest::dedup::DedupStore;
pub use crate::ingest::scheduler::{CrawlSettings, Crawler, CycleReport, RunState, RunSummary};
pub use crate::ingest::sink::{CsvStore, RecordSink};
pub use crate::ingest::types::{
    CandidateItem, IngestedRecord, Source, SourceClient, SourceError, ThreadClient,
};
pub use crate::ingest::{ItemFilter, TextNormalizer};
