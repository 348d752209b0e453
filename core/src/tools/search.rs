use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::ToolResult;
use crate::registry::{Capability, ParamSpec, Tool};

const DEFAULT_NUM_RESULTS: usize = 5;
const MAX_NUM_RESULTS: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Where `search-web` sends its queries.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Up to `limit` hits, best first.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>>;
}

/// Synthetic hits for running without a search service.
pub struct PlaceholderSearch;

#[async_trait]
impl SearchBackend for PlaceholderSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        Ok((1..=limit)
            .map(|i| SearchHit {
                title: format!("Search result {i} for '{query}'"),
                url: format!("https://example.com/result{i}"),
                snippet: format!("Placeholder search result snippet for query: {query}"),
            })
            .collect())
    }
}

/// Client for a SearXNG-compatible `/search?format=json` endpoint.
pub struct SearxngSearch {
    endpoint: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SearxngResponse {
    #[serde(default)]
    results: Vec<SearxngResult>,
}

#[derive(Debug, Deserialize)]
struct SearxngResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

impl SearxngSearch {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SearchBackend for SearxngSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let response: SearxngResponse = self
            .http
            .get(&self.endpoint)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await
            .with_context(|| format!("Search request to {} failed", self.endpoint))?
            .error_for_status()?
            .json()
            .await
            .context("Search backend returned malformed JSON")?;

        Ok(response
            .results
            .into_iter()
            .take(limit)
            .map(|r| SearchHit {
                title: r.title,
                url: r.url,
                snippet: r.content,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    num_results: Option<i64>,
}

pub struct SearchWebTool {
    backend: Box<dyn SearchBackend>,
}

impl SearchWebTool {
    pub fn new(backend: Box<dyn SearchBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for SearchWebTool {
    fn capability(&self) -> Capability {
        Capability::SearchWeb
    }

    fn description(&self) -> &str {
        "Search the web for information"
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::string("query", "Search query").required(),
            ParamSpec::integer("num_results", "Number of results to return")
                .default_value(DEFAULT_NUM_RESULTS.into()),
        ]
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let args: SearchArgs =
            serde_json::from_value(args).context("Failed to parse search-web arguments")?;
        let limit = args
            .num_results
            .map(|n| n.clamp(0, MAX_NUM_RESULTS as i64) as usize)
            .unwrap_or(DEFAULT_NUM_RESULTS);

        info!(query = %args.query, limit, "searching");
        match self.backend.search(&args.query, limit).await {
            Ok(mut hits) => {
                hits.truncate(limit);
                Ok(ToolResult::ok().with("results", serde_json::to_value(hits)?))
            }
            Err(e) => {
                warn!("Search failed: {e:#}");
                Ok(ToolResult::failure(format!("{e:#}")))
            }
        }
    }
}
