// src/ingest/providers/reddit.rs
//! Reddit client: password-grant OAuth, `hot` listings per subreddit, and full
//! comment-tree expansion with a bounded number of `morechildren` calls.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::{CrawlerConfig, RedditCredentials};
use crate::ingest::types::{CandidateItem, Source, SourceClient, SourceError, ThreadClient};

/// Reddit caps listing pages at 100 items.
const PAGE_SIZE: usize = 100;
/// `morechildren` accepts at most 100 ids per call.
const MORE_CHUNK: usize = 100;
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct Listing<T> {
    data: ListingData<T>,
}

#[derive(Debug, Deserialize)]
struct ListingData<T> {
    after: Option<String>,
    children: Vec<Child<T>>,
}

#[derive(Debug, Deserialize)]
struct Child<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct PostData {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_crossposts: i64,
    #[serde(default)]
    num_comments: i64,
}

impl From<PostData> for CandidateItem {
    fn from(p: PostData) -> Self {
        CandidateItem {
            id: p.id,
            created_utc: p.created_utc,
            title: p.title,
            body: p.selftext,
            score: p.score,
            num_crossposts: p.num_crossposts,
            num_comments: p.num_comments,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: u64,
    error: Option<String>,
}

#[derive(Debug, Clone)]
struct Token {
    value: String,
    expires_at: Instant,
}

/// Parse one `hot` listing page into candidates plus the `after` cursor.
pub fn parse_listing(body: &str) -> Result<(Vec<CandidateItem>, Option<String>), SourceError> {
    let listing: Listing<PostData> = serde_json::from_str(body)?;
    let items = listing
        .data
        .children
        .into_iter()
        .map(|c| c.data.into())
        .collect();
    Ok((items, listing.data.after))
}

/// Comment bodies and unexpanded "more" ids gathered from a comment tree.
#[derive(Debug, Default, PartialEq)]
pub struct CommentWalk {
    pub bodies: Vec<String>,
    pub more: Vec<String>,
}

impl CommentWalk {
    /// Depth-first walk over `t1` comments (and their `replies`) and `more`
    /// stubs. Stops collecting bodies once `max_bodies` is reached.
    pub fn collect(&mut self, things: &[Value], max_bodies: usize) {
        for thing in things {
            if self.bodies.len() >= max_bodies {
                return;
            }
            let data = &thing["data"];
            match thing["kind"].as_str() {
                Some("t1") => {
                    if let Some(body) = data["body"].as_str() {
                        if !matches!(body, "[deleted]" | "[removed]") && !body.trim().is_empty()
                        {
                            self.bodies.push(body.to_string());
                        }
                    }
                    if let Some(children) = data["replies"]["data"]["children"].as_array() {
                        self.collect(children, max_bodies);
                    }
                }
                Some("more") => {
                    if let Some(ids) = data["children"].as_array() {
                        self.more
                            .extend(ids.iter().filter_map(|v| v.as_str().map(str::to_string)));
                    }
                }
                _ => {}
            }
        }
    }
}

/// Top-level comment things from a `/comments/{id}` response
/// (`[post_listing, comment_listing]`).
pub fn comment_things(body: &str) -> Result<Vec<Value>, SourceError> {
    let v: Value = serde_json::from_str(body)?;
    let things = v
        .get(1)
        .and_then(|l| l["data"]["children"].as_array())
        .cloned()
        .ok_or_else(|| SourceError::Decode("comments response missing listing".into()))?;
    Ok(things)
}

/// Things from a `morechildren` response (`{"json":{"data":{"things":[..]}}}`).
pub fn more_things(body: &str) -> Result<Vec<Value>, SourceError> {
    let v: Value = serde_json::from_str(body)?;
    Ok(v["json"]["data"]["things"]
        .as_array()
        .cloned()
        .unwrap_or_default())
}

pub struct RedditClient {
    http: reqwest::Client,
    credentials: RedditCredentials,
    api_base: String,
    auth_base: String,
    max_comments: usize,
    max_more_requests: usize,
    token: Mutex<Option<Token>>,
}

impl RedditClient {
    pub fn new(cfg: &CrawlerConfig, credentials: RedditCredentials) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(Duration::from_secs(cfg.fetch_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            credentials,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            auth_base: cfg.auth_base.trim_end_matches('/').to_string(),
            max_comments: cfg.max_comments_per_item,
            max_more_requests: cfg.max_more_requests,
            token: Mutex::new(None),
        })
    }

    /// Obtain the first token. Called once at startup; failure is fatal there.
    pub async fn authenticate(&self) -> Result<(), SourceError> {
        self.bearer().await.map(|_| ())
    }

    async fn bearer(&self) -> Result<String, SourceError> {
        let mut guard = self.token.lock().await;
        if let Some(t) = guard.as_ref() {
            if Instant::now() + TOKEN_REFRESH_MARGIN < t.expires_at {
                return Ok(t.value.clone());
            }
        }
        let token = self.request_token().await?;
        let value = token.value.clone();
        *guard = Some(token);
        Ok(value)
    }

    async fn request_token(&self) -> Result<Token, SourceError> {
        let url = format!("{}/api/v1/access_token", self.auth_base);
        let resp = self
            .http
            .post(&url)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[
                ("grant_type", "password"),
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
            ])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Auth(format!("token endpoint returned {status}")));
        }
        let body: TokenResponse = resp.json().await?;
        match (body.access_token, body.error) {
            (Some(value), None) => {
                tracing::debug!(expires_in = body.expires_in, "reddit token acquired");
                Ok(Token {
                    value,
                    expires_at: Instant::now() + Duration::from_secs(body.expires_in),
                })
            }
            (_, Some(err)) => Err(SourceError::Auth(err)),
            (None, None) => Err(SourceError::Auth("no access_token in response".into())),
        }
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<String, SourceError> {
        let token = self.bearer().await?;
        let resp = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;
        match resp.status() {
            s if s.is_success() => Ok(resp.text().await?),
            StatusCode::FORBIDDEN => Err(SourceError::AccessDenied(url.to_string())),
            StatusCode::NOT_FOUND => Err(SourceError::NotFound(url.to_string())),
            StatusCode::TOO_MANY_REQUESTS => Err(SourceError::RateLimited),
            StatusCode::UNAUTHORIZED => {
                // Force a fresh token on the next call.
                *self.token.lock().await = None;
                Err(SourceError::Auth(format!("401 from {url}")))
            }
            s => Err(SourceError::Status {
                status: s.as_u16(),
                url: url.to_string(),
            }),
        }
    }
}

#[async_trait]
impl SourceClient for RedditClient {
    async fn list_items(
        &self,
        source: &Source,
        limit: usize,
    ) -> Result<Vec<CandidateItem>, SourceError> {
        let url = format!("{}/r/{}/hot", self.api_base, source.id);
        let mut out: Vec<CandidateItem> = Vec::with_capacity(limit.min(PAGE_SIZE));
        let mut after: Option<String> = None;

        while out.len() < limit {
            let page = (limit - out.len()).min(PAGE_SIZE);
            let mut query = vec![("limit", page.to_string()), ("raw_json", "1".to_string())];
            if let Some(a) = &after {
                query.push(("after", a.clone()));
            }
            let body = self.get(&url, &query).await.map_err(|e| match e {
                SourceError::AccessDenied(_) => SourceError::AccessDenied(source.id.clone()),
                other => other,
            })?;
            let (items, next) = parse_listing(&body)?;
            let got = items.len();
            out.extend(items);
            match next {
                Some(n) if got > 0 => after = Some(n),
                _ => break,
            }
        }
        out.truncate(limit);
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "reddit"
    }
}

#[async_trait]
impl ThreadClient for RedditClient {
    async fn fetch_thread(&self, item_id: &str) -> Result<Vec<String>, SourceError> {
        let url = format!("{}/comments/{}", self.api_base, item_id);
        let body = self
            .get(
                &url,
                &[
                    ("raw_json", "1".to_string()),
                    ("limit", self.max_comments.to_string()),
                ],
            )
            .await?;

        let mut walk = CommentWalk::default();
        walk.collect(&comment_things(&body)?, self.max_comments);

        let more_url = format!("{}/api/morechildren", self.api_base);
        let mut requests = 0usize;
        while !walk.more.is_empty()
            && walk.bodies.len() < self.max_comments
            && requests < self.max_more_requests
        {
            let take = walk.more.len().min(MORE_CHUNK);
            let chunk: Vec<String> = walk.more.drain(..take).collect();
            let body = self
                .get(
                    &more_url,
                    &[
                        ("api_type", "json".to_string()),
                        ("raw_json", "1".to_string()),
                        ("link_id", format!("t3_{item_id}")),
                        ("children", chunk.join(",")),
                    ],
                )
                .await?;
            requests += 1;
            walk.collect(&more_things(&body)?, self.max_comments);
        }
        if !walk.more.is_empty() {
            tracing::debug!(
                item = item_id,
                unexpanded = walk.more.len(),
                "comment expansion limit reached"
            );
        }
        Ok(walk.bodies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn walk_skips_deleted_and_respects_cap() {
        let things = vec![
            json!({"kind":"t1","data":{"body":"first","replies":{"kind":"Listing","data":{"children":[
                {"kind":"t1","data":{"body":"[deleted]","replies":""}},
                {"kind":"t1","data":{"body":"nested","replies":""}},
                {"kind":"more","data":{"children":["x1","x2"]}}
            ]}}}}),
            json!({"kind":"t1","data":{"body":"second","replies":""}}),
        ];
        let mut walk = CommentWalk::default();
        walk.collect(&things, 10);
        assert_eq!(walk.bodies, vec!["first", "nested", "second"]);
        assert_eq!(walk.more, vec!["x1", "x2"]);

        let mut capped = CommentWalk::default();
        capped.collect(&things, 2);
        assert_eq!(capped.bodies, vec!["first", "nested"]);
    }

    #[test]
    fn listing_defaults_missing_fields() {
        let body = r#"{"kind":"Listing","data":{"after":null,"children":[
            {"kind":"t3","data":{"id":"abc","title":"t"}}
        ]}}"#;
        let (items, after) = parse_listing(body).unwrap();
        assert!(after.is_none());
        assert_eq!(items[0].id, "abc");
        assert_eq!(items[0].body, "");
        assert_eq!(items[0].num_comments, 0);
    }

    #[test]
    fn more_things_tolerates_empty() {
        assert!(more_things(r#"{"json":{"errors":[]}}"#).unwrap().is_empty());
    }
}
