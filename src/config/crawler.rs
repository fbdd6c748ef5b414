// src/config/crawler.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/crawler.toml";
pub const ENV_CONFIG_PATH: &str = "CRAWLER_CONFIG_PATH";

/// Reddit rejects listing limits above this.
const MAX_PER_SOURCE_LIMIT: usize = 1000;

pub const DEFAULT_SOURCES: [&str; 21] = [
    "mentalhealth",
    "depression",
    "suicidewatch",
    "anxiety",
    "BipolarReddit",
    "offmychest",
    "MMFB",
    "ADHD",
    "BPD",
    "ptsd",
    "therapy",
    "mentalillness",
    "sad",
    "stopselfharm",
    "CPTSD",
    "traumatoolbox",
    "socialanxiety",
    "selfimprovement",
    "breakups",
    "stress",
    "emotionalabuse",
];

pub const DEFAULT_KEYWORDS: [&str; 15] = [
    "depressed",
    "suicidal",
    "overwhelmed",
    "relapse",
    "addiction",
    "self harm",
    "mental breakdown",
    "panic attack",
    "hopeless",
    "crisis line",
    "anxious",
    "therapy",
    "burnout",
    "grief",
    "lonely",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    pub output_path: PathBuf,
    pub time_budget_secs: u64,
    pub per_source_limit: usize,
    pub workers: usize,
    pub cycle_delay_secs: u64,
    /// Upper bound for one comment-thread fetch, including expansion.
    pub fetch_timeout_secs: u64,
    pub max_comments_per_item: usize,
    pub max_more_requests: usize,
    /// Also search the body for keywords (the title is always searched).
    pub match_body: bool,
    pub user_agent: String,
    pub sources: Vec<String>,
    pub keywords: Vec<String>,
    /// Serve Prometheus metrics on this address when set.
    pub metrics_addr: Option<SocketAddr>,
    pub api_base: String,
    pub auth_base: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("crisis_posts_with_comments.csv"),
            time_budget_secs: 3600,
            per_source_limit: 100,
            workers: 5,
            cycle_delay_secs: 60,
            fetch_timeout_secs: 60,
            max_comments_per_item: 1000,
            max_more_requests: 16,
            match_body: false,
            user_agent: format!("crisis-crawler/{}", env!("CARGO_PKG_VERSION")),
            sources: DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect(),
            keywords: DEFAULT_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            metrics_addr: None,
            api_base: "https://oauth.reddit.com".to_string(),
            auth_base: "https://www.reddit.com".to_string(),
        }
    }
}

impl CrawlerConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading crawler config from {}", path.display()))?;
        Self::parse_toml(&data).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse_toml(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Resolve the config file, apply environment overrides, sanitize and validate:
    /// 1) $CRAWLER_CONFIG_PATH (must exist)
    /// 2) config/crawler.toml
    /// 3) built-in defaults
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
                }
                Self::load_from_file(&pb)?
            }
            Err(_) => {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::load_from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        cfg.sanitize();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Override scalar and list options from `CRAWLER_*` style variables.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CRAWLER_OUTPUT_PATH") {
            self.output_path = PathBuf::from(v);
        }
        if let Some(v) = parse_var(&lookup, "CRAWLER_TIME_BUDGET_SECS")? {
            self.time_budget_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "CRAWLER_PER_SOURCE_LIMIT")? {
            self.per_source_limit = v;
        }
        if let Some(v) = parse_var(&lookup, "CRAWLER_WORKERS")? {
            self.workers = v;
        }
        if let Some(v) = parse_var(&lookup, "CRAWLER_CYCLE_DELAY_SECS")? {
            self.cycle_delay_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "CRAWLER_METRICS_ADDR")? {
            self.metrics_addr = Some(v);
        }
        if let Some(v) = lookup("CRAWLER_SOURCES") {
            self.sources = split_list(&v);
        }
        if let Some(v) = lookup("CRAWLER_KEYWORDS") {
            self.keywords = split_list(&v);
        }
        if let Some(v) = lookup("REDDIT_USER_AGENT") {
            if !v.trim().is_empty() {
                self.user_agent = v.trim().to_string();
            }
        }
        Ok(())
    }

    /// Trim and de-duplicate lists (first occurrence wins) and clamp numbers.
    pub fn sanitize(&mut self) {
        self.sources = clean_list(std::mem::take(&mut self.sources), false);
        self.keywords = clean_list(std::mem::take(&mut self.keywords), true);
        self.workers = self.workers.max(1);
        self.per_source_limit = self.per_source_limit.clamp(1, MAX_PER_SOURCE_LIMIT);
        self.max_comments_per_item = self.max_comments_per_item.max(1);
        self.fetch_timeout_secs = self.fetch_timeout_secs.max(1);
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            bail!("no sources configured");
        }
        if self.keywords.is_empty() {
            tracing::warn!("no keywords configured; nothing will be considered relevant");
        }
        Ok(())
    }

    pub fn time_budget(&self) -> Duration {
        Duration::from_secs(self.time_budget_secs)
    }

    pub fn cycle_delay(&self) -> Duration {
        Duration::from_secs(self.cycle_delay_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("invalid {key}={raw:?}: {e}")),
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',').map(|p| p.to_string()).collect()
}

fn clean_list(items: Vec<String>, case_insensitive: bool) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if t.is_empty() {
            continue;
        }
        let key = if case_insensitive {
            t.to_lowercase()
        } else {
            t.to_string()
        };
        if seen.insert(key) {
            out.push(t.to_string());
        }
    }
    out
}

/// Script-app credentials for the password grant.
#[derive(Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

impl RedditCredentials {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();
        let mut get = |key: &'static str| {
            let v = lookup(key).filter(|v| !v.trim().is_empty());
            if v.is_none() {
                missing.push(key);
            }
            v.unwrap_or_default()
        };
        let creds = Self {
            client_id: get("REDDIT_CLIENT_ID"),
            client_secret: get("REDDIT_CLIENT_SECRET"),
            username: get("REDDIT_USERNAME"),
            password: get("REDDIT_PASSWORD"),
        };
        if !missing.is_empty() {
            bail!("missing Reddit credentials: {}", missing.join(", "));
        }
        Ok(creds)
    }
}

// Never print secrets.
impl fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("client_secret_len", &self.client_secret.len())
            .field("password_len", &self.password.len())
            .finish()
    }
}
