//! SerpAPI：航班回退（google_flights）、酒店回退（google_hotels）、搜索回退（google）
//!
//! SerpAPI 在「没有结果」时也可能返回 200 + `error` 字段，这里区分为 NoResults，其余 error 视为不可用。

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::cached::cached_lookup;
use super::http::{as_f64, build_client, read_json};
use super::traits::{FlightProvider, HotelProvider, Provider, SearchProvider};
use super::types::{
    FlightCriteria, FlightOffer, FlightQuote, HotelCriteria, HotelListing, HotelQuote, Lookup,
    SearchHit, SearchQuery, SearchResults, MAX_HOTEL_LISTINGS,
};
use crate::cache::{QueryCache, TtlClass};
use crate::core::{Capability, ProviderError};

pub const FLIGHTS_PROVIDER: &str = "serpapi_flights";
pub const HOTELS_PROVIDER: &str = "serpapi_hotels";
pub const SEARCH_PROVIDER: &str = "serpapi_search";

pub struct SerpApiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl SerpApiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            http: build_client(timeout_secs),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// GET /search.json?engine=...；处理 200 + error 的情况
    async fn search(&self, provider: &str, params: &[(&str, String)]) -> Result<Value, ProviderError> {
        let url = format!("{}/search.json", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(params)
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await;
        let body = read_json(provider, resp).await?;
        check_error(provider, body)
    }
}

fn check_error(provider: &str, body: Value) -> Result<Value, ProviderError> {
    match body["error"].as_str() {
        Some(msg) if msg.contains("hasn't returned any results") => Err(ProviderError::no_results(provider)),
        Some(msg) => Err(ProviderError::unavailable(provider, msg)),
        None => Ok(body),
    }
}

// ---------------------------------------------------------------------------
// 航班

pub struct SerpApiFlights {
    client: Arc<SerpApiClient>,
    cache: QueryCache,
}

impl SerpApiFlights {
    pub fn new(client: Arc<SerpApiClient>, cache: QueryCache) -> Self {
        Self { client, cache }
    }

    async fn fetch(&self, criteria: &FlightCriteria) -> Result<FlightQuote, ProviderError> {
        let params = [
            ("engine", "google_flights".to_string()),
            ("departure_id", criteria.origin.clone()),
            ("arrival_id", criteria.destination.clone()),
            ("outbound_date", criteria.departure_date()),
            // 2 = 单程
            ("type", "2".to_string()),
            ("adults", criteria.adults.to_string()),
            ("currency", "USD".to_string()),
            ("hl", "en".to_string()),
        ];
        let body = self.client.search(FLIGHTS_PROVIDER, &params).await?;
        normalize_google_flights(criteria, &body).ok_or_else(|| ProviderError::no_results(FLIGHTS_PROVIDER))
    }
}

/// best_flights[] + other_flights[]：price、flights[].airline、flights 段数
pub fn normalize_google_flights(criteria: &FlightCriteria, body: &Value) -> Option<FlightQuote> {
    let offers: Vec<FlightOffer> = ["best_flights", "other_flights"]
        .iter()
        .filter_map(|key| body[*key].as_array())
        .flatten()
        .filter_map(|option| {
            let price = as_f64(&option["price"])?;
            let legs = option["flights"].as_array();
            Some(FlightOffer {
                price,
                carrier: legs
                    .and_then(|l| l.first())
                    .and_then(|leg| leg["airline"].as_str())
                    .map(String::from),
                stops: legs.map(|l| l.len().saturating_sub(1)).unwrap_or(0),
            })
        })
        .collect();
    FlightQuote::from_offers(criteria, "USD", &offers)
}

impl Provider for SerpApiFlights {
    fn name(&self) -> &str {
        FLIGHTS_PROVIDER
    }
}

#[async_trait]
impl FlightProvider for SerpApiFlights {
    async fn search_flights(&self, criteria: &FlightCriteria) -> Result<Lookup<FlightQuote>, ProviderError> {
        cached_lookup(
            &self.cache,
            FLIGHTS_PROVIDER,
            Capability::Flights,
            criteria,
            TtlClass::Flights,
            || self.fetch(criteria),
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// 酒店

pub struct SerpApiHotels {
    client: Arc<SerpApiClient>,
    cache: QueryCache,
}

impl SerpApiHotels {
    pub fn new(client: Arc<SerpApiClient>, cache: QueryCache) -> Self {
        Self { client, cache }
    }

    async fn fetch(&self, criteria: &HotelCriteria) -> Result<HotelQuote, ProviderError> {
        let check_out = criteria
            .check_out()
            .ok_or_else(|| ProviderError::unavailable(HOTELS_PROVIDER, "invalid check-in date"))?;
        let place = criteria.city_name.as_deref().unwrap_or(&criteria.city_code);
        let params = [
            ("engine", "google_hotels".to_string()),
            ("q", format!("hotels in {}", place)),
            ("check_in_date", criteria.check_in.clone()),
            ("check_out_date", check_out),
            ("adults", criteria.adults.to_string()),
            ("currency", "USD".to_string()),
            ("hl", "en".to_string()),
        ];
        let body = self.client.search(HOTELS_PROVIDER, &params).await?;
        normalize_google_hotels(criteria, &body).ok_or_else(|| ProviderError::no_results(HOTELS_PROVIDER))
    }
}

/// properties[]：rate_per_night.extracted_lowest 与 prices[] 中各渠道报价组成区间
pub fn normalize_google_hotels(criteria: &HotelCriteria, body: &Value) -> Option<HotelQuote> {
    let listings: Vec<HotelListing> = body["properties"]
        .as_array()?
        .iter()
        .filter_map(|p| {
            let name = p["name"].as_str()?.to_string();
            let mut nightly: Vec<f64> = p["prices"]
                .as_array()
                .map(|prices| {
                    prices
                        .iter()
                        .filter_map(|x| as_f64(&x["rate_per_night"]["extracted_lowest"]))
                        .collect()
                })
                .unwrap_or_default();
            if let Some(lowest) = as_f64(&p["rate_per_night"]["extracted_lowest"]) {
                nightly.push(lowest);
            }
            let low = nightly.iter().copied().fold(f64::INFINITY, f64::min);
            let high = nightly.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if !low.is_finite() {
                return None;
            }
            Some(HotelListing {
                name,
                nightly_low: low,
                nightly_high: high,
                star_rating: as_f64(&p["extracted_hotel_class"]).map(|s| s as f32),
                url: p["link"].as_str().map(String::from),
            })
        })
        .take(MAX_HOTEL_LISTINGS)
        .collect();

    if listings.is_empty() {
        return None;
    }
    Some(HotelQuote {
        city_code: criteria.city_code.clone(),
        check_in: criteria.check_in.clone(),
        nights: criteria.nights,
        listings,
    })
}

impl Provider for SerpApiHotels {
    fn name(&self) -> &str {
        HOTELS_PROVIDER
    }
}

#[async_trait]
impl HotelProvider for SerpApiHotels {
    async fn search_hotels(&self, criteria: &HotelCriteria) -> Result<Lookup<HotelQuote>, ProviderError> {
        cached_lookup(
            &self.cache,
            HOTELS_PROVIDER,
            Capability::Hotels,
            criteria,
            TtlClass::Hotels,
            || self.fetch(criteria),
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// 网页搜索

pub struct SerpApiSearch {
    client: Arc<SerpApiClient>,
    cache: QueryCache,
}

impl SerpApiSearch {
    pub fn new(client: Arc<SerpApiClient>, cache: QueryCache) -> Self {
        Self { client, cache }
    }

    async fn fetch(&self, query: &SearchQuery) -> Result<SearchResults, ProviderError> {
        let params = [
            ("engine", "google".to_string()),
            ("q", query.query.clone()),
            ("num", query.max_results.to_string()),
            ("hl", "en".to_string()),
        ];
        let body = self.client.search(SEARCH_PROVIDER, &params).await?;
        normalize_google_search(query, &body).ok_or_else(|| ProviderError::no_results(SEARCH_PROVIDER))
    }
}

/// answer_box.answer / answer_box.snippet + organic_results[]
pub fn normalize_google_search(query: &SearchQuery, body: &Value) -> Option<SearchResults> {
    let answer = body["answer_box"]["answer"]
        .as_str()
        .or_else(|| body["answer_box"]["snippet"].as_str())
        .map(String::from);
    let hits: Vec<SearchHit> = body["organic_results"]
        .as_array()
        .map(|results| {
            results
                .iter()
                .filter_map(|r| {
                    Some(SearchHit {
                        title: r["title"].as_str()?.to_string(),
                        url: r["link"].as_str().unwrap_or_default().to_string(),
                        snippet: r["snippet"].as_str().unwrap_or_default().to_string(),
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

impl Provider for SerpApiSearch {
    fn name(&self) -> &str {
        SEARCH_PROVIDER
    }
}

#[async_trait]
impl SearchProvider for SerpApiSearch {
    async fn search(&self, query: &SearchQuery) -> Result<Lookup<SearchResults>, ProviderError> {
        cached_lookup(
            &self.cache,
            SEARCH_PROVIDER,
            Capability::Search,
            query,
            TtlClass::Search,
            || self.fetch(query),
        )
        .await
    }
}
