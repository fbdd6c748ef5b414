// tests/common/mod.rs
// In-memory collaborators shared by the crawl integration tests.
#![allow(dead_code)]

use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crisis_crawler::ingest::CleanText;
use crisis_crawler::{
    CandidateItem, CrawlSettings, Crawler, IngestedRecord, ItemFilter, RecordSink, Source,
    SourceClient, SourceError, SubResourceFetcher, ThreadClient,
};

pub fn item(id: &str, title: &str, body: &str) -> CandidateItem {
    CandidateItem {
        id: id.into(),
        created_utc: 1_700_000_000.0,
        title: title.into(),
        body: body.into(),
        score: 10,
        num_crossposts: 1,
        num_comments: 2,
    }
}

/// A relevant, complete candidate.
pub fn crisis(id: &str) -> CandidateItem {
    item(id, &format!("Feeling hopeless ({id})"), "Can't sleep again.")
}

#[derive(Clone)]
pub enum Listing {
    Items(Vec<CandidateItem>),
    Denied,
    Broken,
}

/// Serves fixed listings per source and records each visit.
#[derive(Default)]
pub struct ScriptedSource {
    listings: HashMap<String, Listing>,
    visits: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: &str, listing: Listing) -> Self {
        self.listings.insert(source.to_string(), listing);
        self
    }

    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SourceClient for ScriptedSource {
    async fn list_items(
        &self,
        source: &Source,
        limit: usize,
    ) -> Result<Vec<CandidateItem>, SourceError> {
        self.visits.lock().unwrap().push(source.id.clone());
        match self.listings.get(&source.id) {
            Some(Listing::Items(items)) => Ok(items.iter().take(limit).cloned().collect()),
            Some(Listing::Denied) => Err(SourceError::AccessDenied(source.id.clone())),
            Some(Listing::Broken) => Err(SourceError::Network("connection reset".into())),
            None => Ok(Vec::new()),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Returns one comment per item; ids in `failing` error out. `delay` is
/// applied to every fetch (use with a paused clock).
#[derive(Default)]
pub struct ScriptedThreads {
    failing: HashSet<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedThreads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ThreadClient for ScriptedThreads {
    async fn fetch_thread(&self, item_id: &str) -> Result<Vec<String>, SourceError> {
        self.calls.lock().unwrap().push(item_id.to_string());
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if self.failing.contains(item_id) {
            return Err(SourceError::NotFound(item_id.to_string()));
        }
        Ok(vec![format!("You are not alone, {item_id}!")])
    }
}

#[derive(Default)]
struct MemoryState {
    rows: Vec<IngestedRecord>,
    fail_next: usize,
}

/// Shared in-memory sink; clones see the same rows.
#[derive(Clone, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<IngestedRecord> {
        self.inner.lock().unwrap().rows.clone()
    }

    pub fn ids(&self) -> Vec<String> {
        self.rows().into_iter().map(|r| r.id).collect()
    }

    pub fn fail_next(&self, n: usize) {
        self.inner.lock().unwrap().fail_next = n;
    }
}

impl RecordSink for MemorySink {
    fn load_existing_ids(&self) -> Result<HashSet<String>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .rows
            .iter()
            .map(|r| r.id.clone())
            .collect())
    }

    fn append(&mut self, records: &[IngestedRecord]) -> Result<()> {
        let mut st = self.inner.lock().unwrap();
        if st.fail_next > 0 {
            st.fail_next -= 1;
            bail!("disk full");
        }
        st.rows.extend_from_slice(records);
        Ok(())
    }
}

pub fn settings(budget_secs: u64, delay_secs: u64) -> CrawlSettings {
    CrawlSettings {
        per_source_limit: 100,
        time_budget: Duration::from_secs(budget_secs),
        cycle_delay: Duration::from_secs(delay_secs),
    }
}

pub fn crawler(
    sources: &[&str],
    client: Arc<ScriptedSource>,
    threads: Arc<ScriptedThreads>,
    sink: Box<dyn RecordSink>,
    settings: CrawlSettings,
) -> Crawler {
    let filter = ItemFilter::keywords(["hopeless", "panic attack"], false);
    let fetcher = SubResourceFetcher::new(
        threads,
        Arc::new(CleanText),
        5,
        Duration::from_secs(3600),
    );
    Crawler::new(
        Source::rotation(sources.iter().copied()),
        client,
        filter,
        fetcher,
        sink,
        settings,
    )
}
