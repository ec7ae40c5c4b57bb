//! 搜索主供应商：Tavily POST /search（include_answer）

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::cached::cached_lookup;
use super::http::{build_client, read_json};
use super::traits::{Provider, SearchProvider};
use super::types::{Lookup, SearchHit, SearchQuery, SearchResults};
use crate::cache::{QueryCache, TtlClass};
use crate::core::{Capability, ProviderError};

pub const PROVIDER_NAME: &str = "tavily";

pub struct TavilySearch {
    http: Client,
    base_url: String,
    api_key: String,
    cache: QueryCache,
}

impl TavilySearch {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout_secs: u64, cache: QueryCache) -> Self {
        Self {
            http: build_client(timeout_secs),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            cache,
        }
    }

    async fn fetch(&self, query: &SearchQuery) -> Result<SearchResults, ProviderError> {
        let url = format!("{}/search", self.base_url);
        let body = json!({
            "query": query.query,
            "max_results": query.max_results,
            "include_answer": true,
        });
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await;
        let body = read_json(PROVIDER_NAME, resp).await?;
        normalize_tavily(query, &body).ok_or_else(|| ProviderError::no_results(PROVIDER_NAME))
    }
}

/// answer + results[].{title,url,content}
pub fn normalize_tavily(query: &SearchQuery, body: &Value) -> Option<SearchResults> {
    let answer = body["answer"]
        .as_str()
        .filter(|a| !a.trim().is_empty())
        .map(String::from);
    let hits: Vec<SearchHit> = body["results"]
        .as_array()
        .map(|results| {
            results
                .iter()
                .filter_map(|r| {
                    Some(SearchHit {
                        title: r["title"].as_str()?.to_string(),
                        url: r["url"].as_str().unwrap_or_default().to_string(),
                        snippet: r["content"].as_str().unwrap_or_default().to_string(),
                    })
                })
                .take(query.max_results)
                .collect()
        })
        .unwrap_or_default();

    if hits.is_empty() && answer.is_none() {
        return None;
    }
    Some(SearchResults {
        query: query.query.clone(),
        answer,
        hits,
    })
}

impl Provider for TavilySearch {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    async fn search(&self, query: &SearchQuery) -> Result<Lookup<SearchResults>, ProviderError> {
        cached_lookup(
            &self.cache,
            PROVIDER_NAME,
            Capability::Search,
            query,
            TtlClass::Search,
            || self.fetch(query),
        )
        .await
    }
}
