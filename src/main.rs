//! Wayfarer 维护命令行
//!
//! 用法：
//!   wayfarer cleanup-handoffs              取消所有已过期的待报价交接文档
//!   wayfarer sweep-cache                   删除已过期的查询缓存条目
//!   wayfarer resolve-city <city> [country] 解析城市代码并打印结果（JSON）

use std::sync::Arc;

use anyhow::{bail, Context};
use wayfarer::cache::{QueryCache, TtlPolicy};
use wayfarer::config::{load_config, AppConfig};
use wayfarer::core::{Clock, SystemClock};
use wayfarer::handoff::{HandoffLifecycle, HandoffStore};
use wayfarer::providers::build_providers;
use wayfarer::resolver::CityResolver;

const USAGE: &str = "usage: wayfarer <cleanup-handoffs | sweep-cache | resolve-city <city> [country]>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wayfarer::observability::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        bail!(USAGE);
    };

    let cfg = load_config(None).context("failed to load config")?;
    match command.as_str() {
        "cleanup-handoffs" => cleanup_handoffs(&cfg).await,
        "sweep-cache" => sweep_cache(&cfg).await,
        "resolve-city" => {
            let Some(city) = args.get(1) else {
                bail!(USAGE);
            };
            resolve_city(&cfg, city, args.get(2).map(String::as_str)).await
        }
        other => bail!("unknown command '{}'\n{}", other, USAGE),
    }
}

async fn open_cache(cfg: &AppConfig) -> anyhow::Result<(sqlx::SqlitePool, QueryCache)> {
    let pool = wayfarer::db::connect(&cfg.app.database_path)
        .await
        .with_context(|| format!("failed to open database {}", cfg.app.database_path.display()))?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = QueryCache::with_clock(pool.clone(), clock, TtlPolicy::from_config(&cfg.cache));
    Ok((pool, cache))
}

async fn cleanup_handoffs(cfg: &AppConfig) -> anyhow::Result<()> {
    let (pool, _) = open_cache(cfg).await?;
    let handoffs = HandoffLifecycle::with_clock(HandoffStore::new(pool), Arc::new(SystemClock), &cfg.handoff);
    let cancelled = handoffs.cleanup_expired().await?;
    println!("cancelled {} expired handoff(s)", cancelled);
    Ok(())
}

async fn sweep_cache(cfg: &AppConfig) -> anyhow::Result<()> {
    let (_, cache) = open_cache(cfg).await?;
    let removed = cache.sweep_expired().await?;
    println!("removed {} expired cache entr{}", removed, if removed == 1 { "y" } else { "ies" });
    Ok(())
}

async fn resolve_city(cfg: &AppConfig, city: &str, country: Option<&str>) -> anyhow::Result<()> {
    let (_, cache) = open_cache(cfg).await?;
    let providers = build_providers(&cfg.providers, &cache);
    let resolver = CityResolver::new(cache, providers.directory, Arc::new(providers.orchestrator));
    let resolved = resolver.resolve(city, country).await;
    println!("{}", serde_json::to_string_pretty(&resolved)?);
    Ok(())
}
