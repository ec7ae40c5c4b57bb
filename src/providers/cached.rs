//! 适配器共用的「先查缓存、未命中再调上游」流程
//!
//! 缓存键 = hash({provider, capability, criteria})。上游失败时什么都不写入。
//! 缓存自身的读写故障只记日志，按未命中 / 跳过写入处理。

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use super::types::Lookup;
use crate::cache::{QueryCache, TtlClass};
use crate::core::{Capability, ProviderError};

pub async fn cached_lookup<T, C, F, Fut>(
    cache: &QueryCache,
    provider: &str,
    capability: Capability,
    criteria: &C,
    class: TtlClass,
    fetch: F,
) -> Result<Lookup<T>, ProviderError>
where
    T: Serialize + DeserializeOwned,
    C: Serialize + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let criteria = serde_json::to_value(criteria)
        .map_err(|e| ProviderError::unavailable(provider, format!("criteria encode: {}", e)))?;
    let params = json!({
        "provider": provider,
        "capability": capability.as_str(),
        "criteria": criteria,
    });
    let hash = QueryCache::hash(&params);

    match cache.get(provider, &hash).await {
        Ok(Some(entry)) => match serde_json::from_str::<T>(&entry.response_json) {
            Ok(data) => {
                let age = entry.age_secs(cache.now());
                tracing::debug!(provider, %capability, age, "cache hit");
                return Ok(Lookup {
                    provider: provider.to_string(),
                    cached: true,
                    cache_age_secs: Some(age),
                    data,
                });
            }
            Err(e) => {
                tracing::warn!(provider, error = %e, "undecodable cache entry, refetching");
            }
        },
        Ok(None) => tracing::debug!(provider, %capability, "cache miss"),
        Err(e) => tracing::warn!(provider, error = %e, "cache read failed, calling upstream"),
    }

    let data = fetch().await?;

    match serde_json::to_string(&data) {
        Ok(body) => {
            if let Err(e) = cache.set_class(provider, &hash, &params, &body, class).await {
                tracing::warn!(provider, error = %e, "cache write failed");
            }
        }
        Err(e) => tracing::warn!(provider, error = %e, "response encode failed, not cached"),
    }

    Ok(Lookup {
        provider: provider.to_string(),
        cached: false,
        cache_age_secs: None,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlPolicy;
    use crate::core::ManualClock;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn cache_at(start: i64) -> (TempDir, QueryCache, Arc<ManualClock>) {
        let dir = TempDir::new().unwrap();
        let pool = crate::db::connect(dir.path().join("c.db")).await.unwrap();
        let clock = Arc::new(ManualClock::at_epoch(start));
        (dir, QueryCache::with_clock(pool, clock.clone(), TtlPolicy::default()), clock)
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache_with_age() {
        let (_dir, cache, clock) = cache_at(10_000).await;
        let calls = AtomicUsize::new(0);
        let criteria = json!({"q": "lisbon"});

        let fetch = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ProviderError>(vec!["a".to_string()])
        };
        let first = cached_lookup(&cache, "tavily", Capability::Search, &criteria, TtlClass::Search, fetch)
            .await
            .unwrap();
        assert!(!first.cached);

        clock.advance(Duration::seconds(42));
        let second = cached_lookup(&cache, "tavily", Capability::Search, &criteria, TtlClass::Search, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ProviderError>(vec!["b".to_string()])
        })
        .await
        .unwrap();

        assert!(second.cached);
        assert_eq!(second.cache_age_secs, Some(42));
        assert_eq!(second.data, vec!["a".to_string()]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let (_dir, cache, _clock) = cache_at(0).await;
        let criteria = json!({"q": "oslo"});

        let err = cached_lookup::<Vec<String>, _, _, _>(
            &cache,
            "tavily",
            Capability::Search,
            &criteria,
            TtlClass::Search,
            || async { Err(ProviderError::unavailable("tavily", "HTTP 502")) },
        )
        .await
        .unwrap_err();
        assert!(!err.is_no_results());
        assert_eq!(cache.len().await.unwrap(), 0);
    }
}
