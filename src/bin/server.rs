//! Wayfarer HTTP 服务
//!
//! 启动: cargo run --bin wayfarer-server --features server
//! 监听地址取自 [app].bind_addr，可用 WAYFARER__APP__BIND_ADDR 覆盖

use std::sync::Arc;

use anyhow::Context;
use wayfarer::api::{router, AppState};
use wayfarer::cache::{QueryCache, TtlPolicy};
use wayfarer::config::load_config;
use wayfarer::core::{Clock, SystemClock};
use wayfarer::llm::{LlmClient, OpenAiClient};
use wayfarer::providers::build_providers;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wayfarer::observability::init();

    let cfg = load_config(None).context("failed to load config")?;
    let pool = wayfarer::db::connect(&cfg.app.database_path)
        .await
        .with_context(|| format!("failed to open database {}", cfg.app.database_path.display()))?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = QueryCache::with_clock(pool.clone(), clock.clone(), TtlPolicy::from_config(&cfg.cache));
    if cfg.cache.sweep_on_start {
        match cache.sweep_expired().await {
            Ok(removed) => tracing::info!(removed, "startup cache sweep done"),
            Err(e) => tracing::warn!(error = %e, "startup cache sweep failed"),
        }
    }

    let providers = build_providers(&cfg.providers, &cache);
    let llm: Option<Arc<dyn LlmClient>> = match OpenAiClient::from_config(&cfg.llm) {
        Some(client) => Some(Arc::new(client)),
        None => {
            tracing::warn!("OPENAI_API_KEY not set, research and option generation disabled");
            None
        }
    };

    let state = AppState::new(pool, cache, providers, llm, clock, &cfg.handoff);
    let app = router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&cfg.app.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.app.bind_addr))?;
    tracing::info!("Wayfarer API: http://{}", cfg.app.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
