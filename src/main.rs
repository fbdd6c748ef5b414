//! Crisis crawler — binary entrypoint.
//! Loads configuration, authenticates against Reddit, and runs the crawl loop
//! until the time budget is spent or Ctrl-C is pressed.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crisis_crawler::ingest::providers::RedditClient;
use crisis_crawler::{
    CrawlSettings, Crawler, CrawlerConfig, CsvStore, ItemFilter, RedditCredentials, Source,
    SubResourceFetcher,
};

/// Compact human-readable logs by default; `LOG_FORMAT=json` for JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("crisis_crawler=info,ingest=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Credentials live in credentials.env next to the binary; .env is for local overrides.
    let _ = dotenvy::from_filename("credentials.env");
    let _ = dotenvy::dotenv();

    init_tracing();

    let cfg = CrawlerConfig::load()?;
    let credentials = RedditCredentials::from_env()?;
    info!(
        output = %cfg.output_path.display(),
        sources = cfg.sources.len(),
        keywords = cfg.keywords.len(),
        workers = cfg.workers,
        budget_secs = cfg.time_budget_secs,
        "config loaded"
    );

    if let Some(addr) = cfg.metrics_addr {
        crisis_crawler::metrics::install_exporter(addr)?;
        info!(%addr, "prometheus exporter listening");
    }

    let reddit = Arc::new(RedditClient::new(&cfg, credentials)?);
    reddit
        .authenticate()
        .await
        .context("authenticating with Reddit")?;

    let store = CsvStore::open(&cfg.output_path)?;

    let filter = ItemFilter::keywords(&cfg.keywords, cfg.match_body);
    let fetcher = SubResourceFetcher::new(
        reddit.clone(),
        filter.normalizer(),
        cfg.workers,
        cfg.fetch_timeout(),
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("interrupt received; finishing current cycle (press Ctrl-C again to abort)");
        let _ = stop_tx.send(true);

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("second interrupt; aborting without finishing the cycle");
            std::process::exit(130);
        }
    });

    let mut crawler = Crawler::new(
        Source::rotation(cfg.sources.iter().cloned()),
        reddit,
        filter,
        fetcher,
        Box::new(store),
        CrawlSettings::from_config(&cfg),
    )
    .with_shutdown(stop_rx);

    let summary = crawler.run().await?;
    info!(
        total_new = summary.ingested,
        cycles = summary.cycles,
        interrupted = summary.interrupted,
        elapsed_secs = %format!("{:.2}", summary.elapsed.as_secs_f64()),
        "crawler completed"
    );
    Ok(())
}
