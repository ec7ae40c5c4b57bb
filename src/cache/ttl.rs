//! TTL 类别

use crate::config::CacheSection;

/// 缓存条目的 TTL 类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlClass {
    Flights,
    Hotels,
    Search,
    /// 城市解析命中（目录或搜索）
    CityMatch,
    /// 城市解析落到静态兜底
    CityFallback,
}

/// 各类别的具体秒数；默认值见 `CacheSection::default`
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    flights: i64,
    hotels: i64,
    search: i64,
    city_match: i64,
    city_fallback: i64,
}

impl TtlPolicy {
    pub fn from_config(cfg: &CacheSection) -> Self {
        Self {
            flights: cfg.flights_ttl_secs,
            hotels: cfg.hotels_ttl_secs,
            search: cfg.search_ttl_secs,
            city_match: cfg.city_match_ttl_secs,
            city_fallback: cfg.city_fallback_ttl_secs,
        }
    }

    pub fn seconds(&self, class: TtlClass) -> i64 {
        match class {
            TtlClass::Flights => self.flights,
            TtlClass::Hotels => self.hotels,
            TtlClass::Search => self.search,
            TtlClass::CityMatch => self.city_match,
            TtlClass::CityFallback => self.city_fallback,
        }
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::from_config(&CacheSection::default())
    }
}
