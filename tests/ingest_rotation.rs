// tests/ingest_rotation.rs
mod common;

use common::{crawler, crisis, settings, Listing, MemorySink, ScriptedSource, ScriptedThreads};
use std::sync::Arc;

#[tokio::test(start_paused = true)]
async fn every_window_of_len_sources_visits_each_once() {
    let client = Arc::new(
        ScriptedSource::new()
            .with("A", Listing::Items(vec![crisis("a1")]))
            .with("B", Listing::Items(vec![]))
            .with("C", Listing::Items(vec![crisis("c1")])),
    );
    let threads = Arc::new(ScriptedThreads::new());
    let sink = MemorySink::new();

    // cycles start at t = 0, 60, ..., 420
    let mut c = crawler(
        &["A", "B", "C"],
        client.clone(),
        threads,
        Box::new(sink.clone()),
        settings(480, 60),
    );
    let summary = c.run().await.unwrap();

    let visits = client.visits();
    assert_eq!(visits, vec!["A", "B", "C", "A", "B", "C", "A", "B"]);
    for window in visits.windows(3) {
        let mut w = window.to_vec();
        w.sort();
        w.dedup();
        assert_eq!(w.len(), 3, "window {window:?} repeats a source");
    }
    assert_eq!(summary.cycles, 8);
    assert_eq!(summary.ingested, 2);
}

#[tokio::test(start_paused = true)]
async fn denied_and_broken_sources_stay_in_rotation() {
    let client = Arc::new(
        ScriptedSource::new()
            .with("open", Listing::Items(vec![crisis("p1")]))
            .with("private", Listing::Denied)
            .with("flaky", Listing::Broken),
    );
    let sink = MemorySink::new();
    let mut c = crawler(
        &["open", "private", "flaky"],
        client.clone(),
        Arc::new(ScriptedThreads::new()),
        Box::new(sink.clone()),
        settings(360, 60),
    );
    let summary = c.run().await.unwrap();

    assert_eq!(
        client.visits(),
        vec!["open", "private", "flaky", "open", "private", "flaky"]
    );
    assert_eq!(summary.ingested, 1);
    assert_eq!(sink.ids(), vec!["p1"]);
}

#[tokio::test]
async fn single_cycle_report_counts_each_stage() {
    let client = Arc::new(ScriptedSource::new().with(
        "A",
        Listing::Items(vec![
            crisis("new"),
            crisis("known"),
            common::item("dull", "Weekend plans", "hiking"),
            common::item("empty", "hopeless", ""),
        ]),
    ));
    let mut c = crawler(
        &["A"],
        client,
        Arc::new(ScriptedThreads::new()),
        Box::new(MemorySink::new()),
        settings(60, 60),
    );
    let mut dedup = crisis_crawler::DedupStore::from_ids(["known".to_string()].into());
    let source = crisis_crawler::Source {
        id: "A".into(),
        position: 0,
    };

    let report = c.run_cycle(&source, &mut dedup).await;

    assert_eq!(report.candidates, 4);
    assert_eq!(report.kept, 2);
    assert_eq!(report.new, 1);
    assert_eq!(report.ingested, 1);
    assert!(dedup.contains("new"));
    assert!(report.source_error.is_none());
}
