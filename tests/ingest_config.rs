// tests/ingest_config.rs
use crisis_crawler::config::crawler::{CrawlerConfig, ENV_CONFIG_PATH};
use std::{env, fs};

const OVERRIDES: [&str; 3] = ["CRAWLER_WORKERS", "CRAWLER_SOURCES", "CRAWLER_OUTPUT_PATH"];

fn clear_env() {
    env::remove_var(ENV_CONFIG_PATH);
    for k in OVERRIDES {
        env::remove_var(k);
    }
}

#[serial_test::serial]
#[test]
fn file_then_env_overrides() {
    clear_env();
    let tmp = tempfile::tempdir().unwrap();
    let p = tmp.path().join("crawler.toml");
    fs::write(
        &p,
        r#"
time_budget_secs = 600
workers = 2
sources = ["anxiety", "ptsd"]
keywords = ["Grief", "grief", " lonely "]
"#,
    )
    .unwrap();
    env::set_var(ENV_CONFIG_PATH, p.display().to_string());
    env::set_var("CRAWLER_WORKERS", "9");

    let cfg = CrawlerConfig::load().unwrap();
    assert_eq!(cfg.time_budget_secs, 600);
    assert_eq!(cfg.workers, 9);
    assert_eq!(cfg.sources, vec!["anxiety", "ptsd"]);
    assert_eq!(cfg.keywords, vec!["Grief", "lonely"]);
    assert_eq!(cfg.per_source_limit, 100);

    clear_env();
}

#[serial_test::serial]
#[test]
fn missing_config_path_is_fatal() {
    clear_env();
    env::set_var(ENV_CONFIG_PATH, "/definitely/not/here/crawler.toml");
    assert!(CrawlerConfig::load().is_err());
    clear_env();
}

#[serial_test::serial]
#[test]
fn empty_source_override_is_fatal() {
    clear_env();
    let tmp = tempfile::tempdir().unwrap();
    let p = tmp.path().join("crawler.toml");
    fs::write(&p, "").unwrap();
    env::set_var(ENV_CONFIG_PATH, p.display().to_string());
    env::set_var("CRAWLER_SOURCES", " , ");
    assert!(CrawlerConfig::load().is_err());
    clear_env();
}
