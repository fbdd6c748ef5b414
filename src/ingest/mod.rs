// src/ingest/mod.rs
pub mod comments;
pub mod dedup;
pub mod providers;
pub mod scheduler;
pub mod sink;
pub mod types;

use crate::ingest::types::CandidateItem;
use once_cell::sync::OnceCell;
use regex::Regex;
use std::sync::Arc;

/// Clean raw text into the canonical content string:
/// entities decoded, URLs and non-letters removed, whitespace collapsed, lowercased.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip URLs
    static RE_URL: OnceCell<Regex> = OnceCell::new();
    let re_url = RE_URL.get_or_init(|| Regex::new(r"http\S+").unwrap());
    let out = re_url.replace_all(&out, "");

    // 3) Letters and whitespace only
    static RE_NON_ALPHA: OnceCell<Regex> = OnceCell::new();
    let re_non_alpha = RE_NON_ALPHA.get_or_init(|| Regex::new(r"[^A-Za-z\s]").unwrap());
    let out = re_non_alpha.replace_all(&out, "");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    let out = re_ws.replace_all(&out, " ");

    out.trim().to_lowercase()
}

/// Turns raw text into the canonical token string stored on disk.
///
/// The default [`CleanText`] only cleans; a lemmatizing implementation can be
/// injected at startup without touching the crawler.
pub trait TextNormalizer: Send + Sync {
    fn normalize(&self, text: &str) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CleanText;

impl TextNormalizer for CleanText {
    fn normalize(&self, text: &str) -> String {
        normalize_text(text)
    }
}

pub trait RelevanceFilter: Send + Sync {
    fn is_relevant(&self, title: &str, body: &str) -> bool;
}

/// Case-insensitive keyword containment. Looks at the title only unless
/// `match_body` is set.
#[derive(Debug, Clone)]
pub struct KeywordRelevance {
    keywords: Vec<String>,
    match_body: bool,
}

impl KeywordRelevance {
    pub fn new<I, S>(keywords: I, match_body: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self {
            keywords,
            match_body,
        }
    }

    fn contains_keyword(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.keywords.iter().any(|kw| lower.contains(kw.as_str()))
    }
}

impl RelevanceFilter for KeywordRelevance {
    fn is_relevant(&self, title: &str, body: &str) -> bool {
        self.contains_keyword(title) || (self.match_body && self.contains_keyword(body))
    }
}

/// Candidate that passed the filter, with its normalized content.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredItem {
    pub item: CandidateItem,
    pub content: String,
}

/// Relevance predicate plus normalizer, constructed once at startup and
/// shared with the sub-resource fetcher.
#[derive(Clone)]
pub struct ItemFilter {
    relevance: Arc<dyn RelevanceFilter>,
    normalizer: Arc<dyn TextNormalizer>,
}

impl ItemFilter {
    pub fn new(relevance: Arc<dyn RelevanceFilter>, normalizer: Arc<dyn TextNormalizer>) -> Self {
        Self {
            relevance,
            normalizer,
        }
    }

    pub fn keywords<I, S>(keywords: I, match_body: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(
            Arc::new(KeywordRelevance::new(keywords, match_body)),
            Arc::new(CleanText),
        )
    }

    pub fn is_relevant(&self, title: &str, body: &str) -> bool {
        self.relevance.is_relevant(title, body)
    }

    pub fn normalize(&self, text: &str) -> String {
        self.normalizer.normalize(text)
    }

    pub fn normalizer(&self) -> Arc<dyn TextNormalizer> {
        Arc::clone(&self.normalizer)
    }

    /// Keep the item only if it has both a title and a body and matches.
    pub fn apply(&self, item: CandidateItem) -> Option<FilteredItem> {
        if item.title.trim().is_empty() || item.body.trim().is_empty() {
            return None;
        }
        if !self.is_relevant(&item.title, &item.body) {
            return None;
        }
        let content = self.normalize(&format!("{} {}", item.title, item.body));
        Some(FilteredItem { item, content })
    }

    /// Returns (kept, filtered_out_count), preserving input order.
    pub fn apply_batch(&self, items: Vec<CandidateItem>) -> (Vec<FilteredItem>, usize) {
        let total = items.len();
        let kept: Vec<FilteredItem> = items.into_iter().filter_map(|it| self.apply(it)).collect();
        let filtered_out = total - kept.len();
        (kept, filtered_out)
    }
}

impl std::fmt::Debug for ItemFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemFilter").finish_non_exhaustive()
    }
}
