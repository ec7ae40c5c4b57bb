//! 城市解析流水线集成测试

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;
    use wayfarer::cache::{QueryCache, TtlPolicy};
    use wayfarer::core::ManualClock;
    use wayfarer::providers::mock::{
        candidate, sample_search_results, FailingProvider, StaticDirectory, StaticSearchProvider,
    };
    use wayfarer::providers::{FallbackOrchestrator, LocationDirectory};
    use wayfarer::resolver::{CityResolver, ResolveMethod};

    async fn cache(dir: &TempDir) -> QueryCache {
        let pool = wayfarer::db::connect(dir.path().join("resolver.db")).await.unwrap();
        QueryCache::with_clock(pool, Arc::new(ManualClock::at_epoch(1_780_000_000)), TtlPolicy::default())
    }

    #[tokio::test]
    async fn test_country_mismatch_falls_through_to_search() {
        let dir = TempDir::new().unwrap();
        let directory = Arc::new(StaticDirectory::new(vec![candidate("YRK", "YORK", "US")]));
        let search = Arc::new(StaticSearchProvider::returning(
            "tavily",
            sample_search_results(
                "nearest major airport to York, United Kingdom",
                Some("The nearest major airport to York is Leeds Bradford (LBA)."),
            ),
        ));
        let providers = Arc::new(FallbackOrchestrator::default().with_search_provider(search.clone()));
        let dyn_dir: Arc<dyn LocationDirectory> = directory.clone();
        let resolver = CityResolver::new(cache(&dir).await, Some(dyn_dir), providers);

        let resolved = resolver.resolve("York", Some("GB")).await;
        assert_eq!(resolved.city_code, "LBA");
        assert_eq!(resolved.method, ResolveMethod::WebSearch);
        assert_eq!(directory.calls(), 1);
        assert_eq!(search.calls(), 1);

        // 同一城市 + 国家（大小写不同）命中缓存
        let again = resolver.resolve("york", Some("gb")).await;
        assert_eq!(again, resolved);
        assert_eq!(directory.calls(), 1);
        assert_eq!(search.calls(), 1);
    }

    #[tokio::test]
    async fn test_everything_down_degrades_to_static_hub() {
        let dir = TempDir::new().unwrap();
        let providers = Arc::new(
            FallbackOrchestrator::default()
                .with_search_provider(Arc::new(FailingProvider::new("tavily", "HTTP 502")))
                .with_search_provider(Arc::new(FailingProvider::new("serpapi_search", "HTTP 500"))),
        );
        let dyn_dir: Arc<dyn LocationDirectory> = Arc::new(StaticDirectory::unavailable());
        let resolver = CityResolver::new(cache(&dir).await, Some(dyn_dir), providers);

        let paris = resolver.resolve("Giverny", Some("FR")).await;
        assert_eq!(paris.city_code, "CDG");
        assert_eq!(paris.method, ResolveMethod::Fallback);

        let nowhere = resolver.resolve("Atlantis", None).await;
        assert_eq!(nowhere.city_code, "JFK");
        assert_eq!(nowhere.method, ResolveMethod::Fallback);
    }
}
