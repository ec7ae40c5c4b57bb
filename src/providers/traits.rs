//! 供应商抽象
//!
//! 每个上游实现一种能力：search_flights / search_hotels / search（网页搜索）。
//! 位置目录只被城市解析器使用，单独成一个 trait。

use async_trait::async_trait;

use super::types::{
    FlightCriteria, FlightQuote, HotelCriteria, HotelQuote, LocationCandidate, Lookup,
    SearchQuery, SearchResults,
};
use crate::core::ProviderError;

/// 所有供应商共有：稳定的名字（写入缓存主键、日志与响应的 provider 字段）
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;
}

#[async_trait]
pub trait FlightProvider: Provider {
    async fn search_flights(&self, criteria: &FlightCriteria) -> Result<Lookup<FlightQuote>, ProviderError>;
}

#[async_trait]
pub trait HotelProvider: Provider {
    async fn search_hotels(&self, criteria: &HotelCriteria) -> Result<Lookup<HotelQuote>, ProviderError>;
}

#[async_trait]
pub trait SearchProvider: Provider {
    async fn search(&self, query: &SearchQuery) -> Result<Lookup<SearchResults>, ProviderError>;
}

/// 关键词位置目录（城市 + 机场），按上游返回顺序
#[async_trait]
pub trait LocationDirectory: Send + Sync {
    async fn search_locations(&self, keyword: &str) -> Result<Vec<LocationCandidate>, ProviderError>;
}
