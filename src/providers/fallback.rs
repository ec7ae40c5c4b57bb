//! 回退编排
//!
//! 每种能力一条有序供应商链：严格按顺序逐个调用，成功即返回，后面的不再调用；
//! 失败记 warn 后继续下一个。单个供应商每次尝试只发一次上游请求。
//! 全部失败时：最后一个供应商报告「无结果」→ `FetchError::NoResults`，否则 → `FetchError::AllUnavailable`。

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use super::traits::{FlightProvider, HotelProvider, Provider, SearchProvider};
use super::types::{FlightCriteria, FlightQuote, HotelCriteria, HotelQuote, Lookup, SearchQuery, SearchResults};
use crate::core::{Capability, FetchError, ProviderError};

/// 单一能力的有序供应商链
pub struct FallbackChain<P: ?Sized> {
    capability: Capability,
    providers: Vec<Arc<P>>,
}

impl<P: Provider + ?Sized> FallbackChain<P> {
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            providers: Vec::new(),
        }
    }

    /// 追加到链尾（声明顺序即调用顺序）
    pub fn with(mut self, provider: Arc<P>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn push(&mut self, provider: Arc<P>) {
        self.providers.push(provider);
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// 依次调用 `call`，返回第一个成功结果
    pub async fn run<T, F, Fut>(&self, mut call: F) -> Result<Lookup<T>, FetchError>
    where
        F: FnMut(Arc<P>) -> Fut,
        Fut: Future<Output = Result<Lookup<T>, ProviderError>>,
    {
        let capability = self.capability;
        let mut attempts: Vec<ProviderError> = Vec::with_capacity(self.providers.len());

        for provider in &self.providers {
            let name = provider.name().to_string();
            let started = Instant::now();
            match call(Arc::clone(provider)).await {
                Ok(lookup) => {
                    tracing::info!(
                        provider = %name,
                        %capability,
                        cached = lookup.cached,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "provider succeeded"
                    );
                    return Ok(lookup);
                }
                Err(e) => {
                    tracing::warn!(
                        provider = %name,
                        %capability,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        error = %e,
                        "provider failed, trying next"
                    );
                    attempts.push(e);
                }
            }
        }

        match attempts.last() {
            Some(ProviderError::NoResults { provider }) => Err(FetchError::NoResults {
                capability,
                provider: provider.clone(),
            }),
            _ => {
                tracing::error!(%capability, attempted = attempts.len(), "all providers unavailable");
                Err(FetchError::AllUnavailable { capability, attempts })
            }
        }
    }
}

/// 航班 / 酒店 / 搜索三条链
pub struct FallbackOrchestrator {
    flights: FallbackChain<dyn FlightProvider>,
    hotels: FallbackChain<dyn HotelProvider>,
    search: FallbackChain<dyn SearchProvider>,
}

impl Default for FallbackOrchestrator {
    fn default() -> Self {
        Self {
            flights: FallbackChain::new(Capability::Flights),
            hotels: FallbackChain::new(Capability::Hotels),
            search: FallbackChain::new(Capability::Search),
        }
    }
}

impl FallbackOrchestrator {
    pub fn new(
        flights: FallbackChain<dyn FlightProvider>,
        hotels: FallbackChain<dyn HotelProvider>,
        search: FallbackChain<dyn SearchProvider>,
    ) -> Self {
        Self { flights, hotels, search }
    }

    pub fn with_flight_provider(mut self, provider: Arc<dyn FlightProvider>) -> Self {
        self.flights.push(provider);
        self
    }

    pub fn with_hotel_provider(mut self, provider: Arc<dyn HotelProvider>) -> Self {
        self.hotels.push(provider);
        self
    }

    pub fn with_search_provider(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.search.push(provider);
        self
    }

    pub fn flights(&self) -> &FallbackChain<dyn FlightProvider> {
        &self.flights
    }

    pub fn hotels(&self) -> &FallbackChain<dyn HotelProvider> {
        &self.hotels
    }

    pub fn search_chain(&self) -> &FallbackChain<dyn SearchProvider> {
        &self.search
    }

    pub async fn search_flights(&self, criteria: &FlightCriteria) -> Result<Lookup<FlightQuote>, FetchError> {
        self.flights
            .run(|p| async move { p.search_flights(criteria).await })
            .await
    }

    pub async fn search_hotels(&self, criteria: &HotelCriteria) -> Result<Lookup<HotelQuote>, FetchError> {
        self.hotels
            .run(|p| async move { p.search_hotels(criteria).await })
            .await
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<Lookup<SearchResults>, FetchError> {
        self.search.run(|p| async move { p.search(query).await }).await
    }
}
