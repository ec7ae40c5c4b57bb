//! Amadeus Self-Service API：OAuth2 client-credentials 保护的航班 / 酒店库存与位置目录
//!
//! 三个适配器（航班、酒店、位置目录）共享同一个 `AmadeusClient`，也就共享同一份令牌缓存。

pub mod auth;
pub mod flights;
pub mod hotels;
pub mod locations;

use std::sync::Arc;

use reqwest::{Client, StatusCode};
use serde_json::Value;

use super::http::{build_client, read_json};
use crate::core::ProviderError;

pub use auth::{CachedToken, TokenCache, SAFETY_MARGIN_SECS};
pub use flights::AmadeusFlights;
pub use hotels::AmadeusHotels;
pub use locations::AmadeusLocations;

pub struct AmadeusClient {
    http: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    tokens: Arc<TokenCache>,
}

impl AmadeusClient {
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        timeout_secs: u64,
        tokens: Arc<TokenCache>,
    ) -> Self {
        Self {
            http: build_client(timeout_secs),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            tokens,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenCache> {
        &self.tokens
    }

    /// POST /v1/security/oauth2/token → (access_token, expires_in)
    async fn fetch_token(&self, provider: &str) -> Result<(String, i64), ProviderError> {
        let url = format!("{}/v1/security/oauth2/token", self.base_url);
        let resp = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await;
        let body = read_json(provider, resp).await?;

        let token = body["access_token"]
            .as_str()
            .ok_or_else(|| ProviderError::unavailable(provider, "no access_token in token response"))?;
        let expires_in = body["expires_in"].as_i64().unwrap_or(1799);
        Ok((token.to_string(), expires_in))
    }

    /// 带令牌的 GET；401 时丢弃缓存令牌并按不可用处理（不在同一次尝试内重试）
    pub async fn get_json(
        &self,
        provider: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Value, ProviderError> {
        let token = self
            .tokens
            .refresh_if_expired(|| self.fetch_token(provider))
            .await?;

        let url = format!("{}{}", self.base_url, path);
        let resp = self.http.get(&url).bearer_auth(&token).query(query).send().await;

        if let Ok(r) = &resp {
            if r.status() == StatusCode::UNAUTHORIZED {
                self.tokens.invalidate();
            }
        }
        read_json(provider, resp).await
    }
}
