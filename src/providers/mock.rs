//! 测试替身（无需网络）
//!
//! 固定结果的供应商 + 调用计数，便于断言回退链的调用顺序。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::traits::{FlightProvider, HotelProvider, LocationDirectory, Provider, SearchProvider};
use super::types::{
    FlightCriteria, FlightQuote, HotelCriteria, HotelListing, HotelQuote, LocationCandidate, Lookup,
    SearchQuery, SearchResults,
};
use crate::core::ProviderError;

/// 每次调用返回同一结果的供应商
pub struct StaticProvider<T> {
    name: String,
    outcome: Result<T, ProviderError>,
    calls: AtomicUsize,
}

pub type StaticFlightProvider = StaticProvider<FlightQuote>;
pub type StaticHotelProvider = StaticProvider<HotelQuote>;
pub type StaticSearchProvider = StaticProvider<SearchResults>;

impl<T: Clone + Send + Sync> StaticProvider<T> {
    pub fn returning(name: impl Into<String>, data: T) -> Self {
        Self {
            name: name.into(),
            outcome: Ok(data),
            calls: AtomicUsize::new(0),
        }
    }

    /// 上游成功响应但没有结果
    pub fn empty(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            outcome: Err(ProviderError::no_results(&name)),
            name,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn answer(&self) -> Result<Lookup<T>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone().map(|data| Lookup {
            provider: self.name.clone(),
            cached: false,
            cache_age_secs: None,
            data,
        })
    }
}

impl<T: Send + Sync> Provider for StaticProvider<T> {
    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl FlightProvider for StaticProvider<FlightQuote> {
    async fn search_flights(&self, _criteria: &FlightCriteria) -> Result<Lookup<FlightQuote>, ProviderError> {
        self.answer()
    }
}

#[async_trait]
impl HotelProvider for StaticProvider<HotelQuote> {
    async fn search_hotels(&self, _criteria: &HotelCriteria) -> Result<Lookup<HotelQuote>, ProviderError> {
        self.answer()
    }
}

#[async_trait]
impl SearchProvider for StaticProvider<SearchResults> {
    async fn search(&self, _query: &SearchQuery) -> Result<Lookup<SearchResults>, ProviderError> {
        self.answer()
    }
}

/// 总是返回 Unavailable（模拟 HTTP 500 / 超时），三种能力都实现
pub struct FailingProvider {
    name: String,
    reason: String,
    calls: AtomicUsize,
}

impl FailingProvider {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> Result<T, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::unavailable(&self.name, &self.reason))
    }
}

impl Provider for FailingProvider {
    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl FlightProvider for FailingProvider {
    async fn search_flights(&self, _criteria: &FlightCriteria) -> Result<Lookup<FlightQuote>, ProviderError> {
        self.fail()
    }
}

#[async_trait]
impl HotelProvider for FailingProvider {
    async fn search_hotels(&self, _criteria: &HotelCriteria) -> Result<Lookup<HotelQuote>, ProviderError> {
        self.fail()
    }
}

#[async_trait]
impl SearchProvider for FailingProvider {
    async fn search(&self, _query: &SearchQuery) -> Result<Lookup<SearchResults>, ProviderError> {
        self.fail()
    }
}

/// 固定候选列表的位置目录；记录收到的关键词
#[derive(Default)]
pub struct StaticDirectory {
    candidates: Vec<LocationCandidate>,
    unavailable: bool,
    keywords: Mutex<Vec<String>>,
}

impl StaticDirectory {
    pub fn new(candidates: Vec<LocationCandidate>) -> Self {
        Self {
            candidates,
            ..Self::default()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.keywords.lock().map(|k| k.len()).unwrap_or(0)
    }

    pub fn keywords(&self) -> Vec<String> {
        self.keywords.lock().map(|k| k.clone()).unwrap_or_default()
    }
}

/// 便捷构造候选项
pub fn candidate(iata_code: &str, name: &str, country_code: &str) -> LocationCandidate {
    LocationCandidate {
        iata_code: iata_code.to_string(),
        name: name.to_string(),
        country_code: Some(country_code.to_string()),
        sub_type: "CITY".to_string(),
    }
}

#[async_trait]
impl LocationDirectory for StaticDirectory {
    async fn search_locations(&self, keyword: &str) -> Result<Vec<LocationCandidate>, ProviderError> {
        if let Ok(mut k) = self.keywords.lock() {
            k.push(keyword.to_string());
        }
        if self.unavailable {
            return Err(ProviderError::unavailable("static_directory", "HTTP 503"));
        }
        if self.candidates.is_empty() {
            return Err(ProviderError::no_results("static_directory"));
        }
        Ok(self.candidates.clone())
    }
}

/// 测试用航班报价
pub fn sample_flight_quote(origin: &str, destination: &str, month: &str) -> FlightQuote {
    FlightQuote {
        origin: origin.to_string(),
        destination: destination.to_string(),
        departure_date: format!("{}-15", month),
        price_low: 420.0,
        price_median: 515.0,
        price_high: 780.0,
        currency: "USD".to_string(),
        carrier: Some("BA".to_string()),
        route: format!("{} → {} (nonstop)", origin, destination),
        offer_count: 3,
    }
}

/// 测试用酒店报价
pub fn sample_hotel_quote(city_code: &str, check_in: &str, nights: u32) -> HotelQuote {
    HotelQuote {
        city_code: city_code.to_string(),
        check_in: check_in.to_string(),
        nights,
        listings: vec![HotelListing {
            name: format!("Grand Hotel {}", city_code),
            nightly_low: 180.0,
            nightly_high: 240.0,
            star_rating: Some(4.0),
            url: None,
        }],
    }
}

/// 测试用搜索结果
pub fn sample_search_results(query: &str, answer: Option<&str>) -> SearchResults {
    SearchResults {
        query: query.to_string(),
        answer: answer.map(String::from),
        hits: vec![],
    }
}
