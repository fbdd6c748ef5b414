// src/ingest/comments.rs
use futures::stream::{self, StreamExt};
use metrics::{counter, histogram};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::ingest::types::{SourceError, ThreadClient};
use crate::ingest::TextNormalizer;

pub const DEFAULT_WORKERS: usize = 5;

/// Fetches and normalizes the comment threads of a batch of items with at most
/// `workers` requests in flight.
///
/// Workers only read the shared client and normalizer; results come back
/// through the stream join, so no locking is involved.
#[derive(Clone)]
pub struct SubResourceFetcher {
    client: Arc<dyn ThreadClient>,
    normalizer: Arc<dyn TextNormalizer>,
    workers: usize,
    timeout: Duration,
}

impl SubResourceFetcher {
    pub fn new(
        client: Arc<dyn ThreadClient>,
        normalizer: Arc<dyn TextNormalizer>,
        workers: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            normalizer,
            workers: workers.max(1),
            timeout,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Returns an entry for every id, with one normalized string per comment
    /// (possibly empty). A failed or timed-out fetch yields an
    /// empty list and is logged; it never fails the batch.
    pub async fn fetch_all<I>(&self, ids: I) -> HashMap<String, Vec<String>>
    where
        I: IntoIterator<Item = String>,
    {
        let t0 = Instant::now();
        let results: Vec<(String, Vec<String>)> = stream::iter(ids)
            .map(|id| async move {
                let texts = match self.fetch_one(&id).await {
                    Ok(texts) => texts,
                    Err(e) => {
                        tracing::warn!(item = %id, kind = e.kind(), error = %e, "sub-resource fetch failed");
                        counter!("crawl_subfetch_errors_total").increment(1);
                        Vec::new()
                    }
                };
                (id, texts)
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        histogram!("crawl_subfetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        results.into_iter().collect()
    }

    async fn fetch_one(&self, id: &str) -> Result<Vec<String>, SourceError> {
        let raw = tokio::time::timeout(self.timeout, self.client.fetch_thread(id))
            .await
            .map_err(|_| SourceError::Timeout(self.timeout))??;
        Ok(raw
            .iter()
            .map(|text| self.normalizer.normalize(text))
            .collect())
    }
}
