//! 外部数据获取层
//!
//! - types: 规范化响应形状
//! - traits: 供应商抽象
//! - cached: 缓存优先的调用流程
//! - amadeus / serpapi / tavily: 具体上游
//! - fallback: 回退编排
//! - mock: 测试替身

pub mod amadeus;
pub mod cached;
pub mod fallback;
pub mod http;
pub mod mock;
pub mod serpapi;
pub mod tavily;
pub mod traits;
pub mod types;

use std::sync::Arc;

pub use amadeus::{AmadeusClient, AmadeusFlights, AmadeusHotels, AmadeusLocations, TokenCache};
pub use fallback::{FallbackChain, FallbackOrchestrator};
pub use serpapi::{SerpApiClient, SerpApiFlights, SerpApiHotels, SerpApiSearch};
pub use tavily::TavilySearch;
pub use traits::{FlightProvider, HotelProvider, LocationDirectory, Provider, SearchProvider};
pub use types::{
    FlightCriteria, FlightQuote, HotelCriteria, HotelListing, HotelQuote, LocationCandidate, Lookup,
    SearchHit, SearchQuery, SearchResults,
};

use crate::cache::QueryCache;
use crate::config::ProvidersSection;

/// 按配置装配好的供应商集合
pub struct ProviderSet {
    pub orchestrator: FallbackOrchestrator,
    /// 城市解析第一策略使用；没有 Amadeus 凭据时为 None
    pub directory: Option<Arc<dyn LocationDirectory>>,
}

/// 按声明顺序装配三条链：Amadeus → SerpAPI（航班、酒店），Tavily → SerpAPI（搜索）
///
/// 缺少凭据的上游不加入链，只记日志。
pub fn build_providers(cfg: &ProvidersSection, cache: &QueryCache) -> ProviderSet {
    let mut orchestrator = FallbackOrchestrator::default();
    let mut directory: Option<Arc<dyn LocationDirectory>> = None;

    match cfg.amadeus.credentials() {
        Some((id, secret)) => {
            let client = Arc::new(AmadeusClient::new(
                &cfg.amadeus.base_url,
                id,
                secret,
                cfg.timeout_secs,
                Arc::new(TokenCache::new()),
            ));
            orchestrator = orchestrator
                .with_flight_provider(Arc::new(AmadeusFlights::new(client.clone(), cache.clone())))
                .with_hotel_provider(Arc::new(AmadeusHotels::new(client.clone(), cache.clone())));
            directory = Some(Arc::new(AmadeusLocations::new(client)));
        }
        None => tracing::warn!("amadeus credentials missing, flights/hotels primary disabled"),
    }

    let serpapi = cfg
        .serpapi
        .api_key()
        .map(|key| Arc::new(SerpApiClient::new(&cfg.serpapi.base_url, key, cfg.timeout_secs)));

    match &serpapi {
        Some(client) => {
            orchestrator = orchestrator
                .with_flight_provider(Arc::new(SerpApiFlights::new(client.clone(), cache.clone())))
                .with_hotel_provider(Arc::new(SerpApiHotels::new(client.clone(), cache.clone())));
        }
        None => tracing::warn!("serpapi key missing, flights/hotels fallback disabled"),
    }

    match cfg.tavily.api_key() {
        Some(key) => {
            orchestrator = orchestrator.with_search_provider(Arc::new(TavilySearch::new(
                &cfg.tavily.base_url,
                key,
                cfg.timeout_secs,
                cache.clone(),
            )));
        }
        None => tracing::warn!("tavily key missing, search primary disabled"),
    }

    if let Some(client) = serpapi {
        orchestrator = orchestrator.with_search_provider(Arc::new(SerpApiSearch::new(client, cache.clone())));
    }

    tracing::info!(
        flights = ?orchestrator.flights().provider_names(),
        hotels = ?orchestrator.hotels().provider_names(),
        search = ?orchestrator.search_chain().provider_names(),
        "provider chains ready"
    );

    ProviderSet { orchestrator, directory }
}
