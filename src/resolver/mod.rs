//! 城市解析：自由文本城市（+ 可选国家代码）→ 机场 / 城市代码
//!
//! 三个策略按顺序尝试，先成功者胜出：
//! 1. 位置目录按关键词查询；给了国家代码时只接受国家一致的候选（不一致视为未命中）
//! 2. 网页搜索 "nearest major airport to <city>, <country>"，从答案 / 首条摘要中抽取三字母代码
//! 3. 静态兜底表，总能给出结果
//!
//! 解析从不报错；结果带来源标记（method + source），并按 TTL 类别缓存。

pub mod hubs;

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cache::{QueryCache, TtlClass};
use crate::providers::{FallbackOrchestrator, LocationCandidate, LocationDirectory, SearchQuery, SearchResults};

pub use hubs::{country_name, hub_for_country, GLOBAL_DEFAULT_HUB};

/// 写入缓存主键的 provider 名
pub const CACHE_PROVIDER: &str = "city_resolver";

/// 抽取时跳过的常见大写词
const TOKEN_DENYLIST: &[&str] = &["USA", "UAE", "THE", "AND", "FOR"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolveMethod {
    Api,
    WebSearch,
    Fallback,
}

impl ResolveMethod {
    fn ttl_class(self) -> TtlClass {
        match self {
            ResolveMethod::Api | ResolveMethod::WebSearch => TtlClass::CityMatch,
            ResolveMethod::Fallback => TtlClass::CityFallback,
        }
    }
}

/// 解析结果与来源
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedCity {
    pub city_code: String,
    pub method: ResolveMethod,
    /// 人类可读的来源描述
    pub source: String,
}

pub struct CityResolver {
    cache: QueryCache,
    directory: Option<Arc<dyn LocationDirectory>>,
    providers: Arc<FallbackOrchestrator>,
}

impl CityResolver {
    pub fn new(
        cache: QueryCache,
        directory: Option<Arc<dyn LocationDirectory>>,
        providers: Arc<FallbackOrchestrator>,
    ) -> Self {
        Self {
            cache,
            directory,
            providers,
        }
    }

    pub async fn resolve(&self, city: &str, country: Option<&str>) -> ResolvedCity {
        let city = city.trim();
        let country = country.map(str::trim).filter(|c| !c.is_empty());

        let params = json!({
            "city": city.to_lowercase(),
            "country": country.map(str::to_uppercase),
        });
        let hash = QueryCache::hash(&params);

        match self.cache.get(CACHE_PROVIDER, &hash).await {
            Ok(Some(entry)) => match serde_json::from_str::<ResolvedCity>(&entry.response_json) {
                Ok(hit) => {
                    tracing::debug!(city, code = %hit.city_code, "city resolution cache hit");
                    return hit;
                }
                Err(e) => tracing::warn!(city, error = %e, "undecodable city cache entry"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(city, error = %e, "city cache read failed"),
        }

        let resolved = self.resolve_uncached(city, country).await;
        tracing::info!(
            city,
            country = country.unwrap_or("-"),
            code = %resolved.city_code,
            method = ?resolved.method,
            "city resolved"
        );

        match serde_json::to_string(&resolved) {
            Ok(body) => {
                if let Err(e) = self
                    .cache
                    .set_class(CACHE_PROVIDER, &hash, &params, &body, resolved.method.ttl_class())
                    .await
                {
                    tracing::warn!(city, error = %e, "city cache write failed");
                }
            }
            Err(e) => tracing::warn!(city, error = %e, "city result encode failed"),
        }
        resolved
    }

    async fn resolve_uncached(&self, city: &str, country: Option<&str>) -> ResolvedCity {
        if let Some(found) = self.from_directory(city, country).await {
            return found;
        }
        if let Some(found) = self.from_search(city, country).await {
            return found;
        }
        static_fallback(country)
    }

    async fn from_directory(&self, city: &str, country: Option<&str>) -> Option<ResolvedCity> {
        let directory = self.directory.as_ref()?;
        let candidates = match directory.search_locations(city).await {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(city, error = %e, "directory lookup failed");
                return None;
            }
        };
        let chosen = pick_candidate(&candidates, country);
        if chosen.is_none() {
            tracing::debug!(city, country, "no directory candidate in requested country");
        }
        let chosen = chosen?;
        Some(ResolvedCity {
            city_code: chosen.iata_code.clone(),
            method: ResolveMethod::Api,
            source: format!(
                "location directory: {} ({})",
                chosen.name,
                chosen.country_code.as_deref().unwrap_or("?")
            ),
        })
    }

    async fn from_search(&self, city: &str, country: Option<&str>) -> Option<ResolvedCity> {
        let query = match country {
            Some(cc) => format!("nearest major airport to {}, {}", city, country_name(cc)),
            None => format!("nearest major airport to {}", city),
        };
        let lookup = match self.providers.search(&SearchQuery::new(query)).await {
            Ok(l) => l,
            Err(e) => {
                tracing::debug!(city, error = %e, "airport search failed");
                return None;
            }
        };
        let code = extract_airport_code(&lookup.data)?;
        Some(ResolvedCity {
            city_code: code,
            method: ResolveMethod::WebSearch,
            source: format!("web search via {}", lookup.provider),
        })
    }
}

/// 有国家代码时取第一个国家一致的候选；没有时取第一个
pub fn pick_candidate<'a>(candidates: &'a [LocationCandidate], country: Option<&str>) -> Option<&'a LocationCandidate> {
    match country {
        Some(cc) => candidates.iter().find(|c| {
            c.country_code
                .as_deref()
                .is_some_and(|code| code.eq_ignore_ascii_case(cc))
        }),
        None => candidates.first(),
    }
}

/// 先扫答案，再扫首条摘要；第一个不在黑名单里的三字母大写词
pub fn extract_airport_code(results: &SearchResults) -> Option<String> {
    let texts = results
        .answer
        .iter()
        .map(String::as_str)
        .chain(results.hits.first().map(|h| h.snippet.as_str()));
    for text in texts {
        if let Some(code) = first_code_token(text) {
            return Some(code);
        }
    }
    None
}

fn first_code_token(text: &str) -> Option<String> {
    static IATA_TOKEN: OnceLock<Option<Regex>> = OnceLock::new();
    let re = IATA_TOKEN
        .get_or_init(|| Regex::new(r"\b[A-Z]{3}\b").ok())
        .as_ref()?;
    re.find_iter(text)
        .map(|m| m.as_str())
        .find(|token| !TOKEN_DENYLIST.contains(token))
        .map(String::from)
}

/// 国家枢纽表；表外或未给国家时用全局默认
pub fn static_fallback(country: Option<&str>) -> ResolvedCity {
    match country.and_then(|cc| hub_for_country(cc).map(|hub| (cc, hub))) {
        Some((cc, hub)) => ResolvedCity {
            city_code: hub.to_string(),
            method: ResolveMethod::Fallback,
            source: format!("static hub for {}", cc.to_uppercase()),
        },
        None => ResolvedCity {
            city_code: GLOBAL_DEFAULT_HUB.to_string(),
            method: ResolveMethod::Fallback,
            source: "global default hub".to_string(),
        },
    }
}
