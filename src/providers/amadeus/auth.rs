//! OAuth2 访问令牌缓存
//!
//! 显式持有、可注入的对象（不是模块级单例）。过期判断预留 60 秒安全边际。
//! 检查-刷新不加锁：并发刷新最多多打一次 token 端点，结果等价。

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::core::{Clock, ProviderError, SystemClock};

/// 过期前提前刷新的秒数
pub const SAFETY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub access_token: String,
    /// Unix 秒
    pub expires_at: i64,
}

pub struct TokenCache {
    clock: Arc<dyn Clock>,
    slot: RwLock<Option<CachedToken>>,
    refreshes: AtomicUsize,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            slot: RwLock::new(None),
            refreshes: AtomicUsize::new(0),
        }
    }

    /// 仍在安全边际内有效的令牌
    pub fn current(&self) -> Option<String> {
        let now = self.clock.epoch_secs();
        let slot = self.slot.read().unwrap_or_else(|e| e.into_inner());
        slot.as_ref()
            .filter(|t| now < t.expires_at - SAFETY_MARGIN_SECS)
            .map(|t| t.access_token.clone())
    }

    /// 有效则直接返回；否则调用 `fetch` 取得 (token, expires_in 秒) 并缓存
    pub async fn refresh_if_expired<F, Fut>(&self, fetch: F) -> Result<String, ProviderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(String, i64), ProviderError>>,
    {
        if let Some(token) = self.current() {
            return Ok(token);
        }

        let (access_token, expires_in) = fetch().await?;
        let expires_at = self.clock.epoch_secs() + expires_in;
        *self.slot.write().unwrap_or_else(|e| e.into_inner()) = Some(CachedToken {
            access_token: access_token.clone(),
            expires_at,
        });
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(expires_at, "oauth token refreshed");
        Ok(access_token)
    }

    /// 上游拒绝令牌（401）时丢弃，下一次调用会重新获取
    pub fn invalidate(&self) {
        *self.slot.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::Relaxed)
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}
