//! 查询缓存：SQLite 上的 TTL 缓存，过期条目在读取时惰性删除
//!
//! 没有后台清扫：从未再被读到的过期条目会一直占用存储，需要时可调用 `sweep_expired`。

use std::sync::Arc;

use serde_json::Value;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use super::key::{canonical_json, hash_params};
use super::ttl::{TtlClass, TtlPolicy};
use crate::core::{CacheError, Clock, SystemClock};

/// 一条缓存记录（主键 provider + query_hash）
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub provider: String,
    pub query_hash: String,
    pub params_json: String,
    pub response_json: String,
    pub created_at: i64,
    pub ttl_seconds: i64,
}

impl CacheEntry {
    /// 有效当且仅当 now - created_at < ttl_seconds
    pub fn is_valid_at(&self, now: i64) -> bool {
        now - self.created_at < self.ttl_seconds
    }

    pub fn age_secs(&self, now: i64) -> i64 {
        (now - self.created_at).max(0)
    }
}

/// 内容寻址查询缓存；克隆开销很小（连接池与时钟均为共享句柄）
#[derive(Clone)]
pub struct QueryCache {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    ttl: TtlPolicy,
}

impl QueryCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock), TtlPolicy::default())
    }

    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>, ttl: TtlPolicy) -> Self {
        Self { pool, clock, ttl }
    }

    pub fn now(&self) -> i64 {
        self.clock.epoch_secs()
    }

    /// 参数摘要（键排序后 SHA-256）
    pub fn hash(params: &Value) -> String {
        hash_params(params)
    }

    /// 读取；过期则同步删除并返回 None
    pub async fn get(&self, provider: &str, query_hash: &str) -> Result<Option<CacheEntry>, CacheError> {
        let row = sqlx::query(
            "SELECT provider, query_hash, query_params, response_json, created_at, ttl_seconds
             FROM query_cache WHERE provider = ? AND query_hash = ?",
        )
        .bind(provider)
        .bind(query_hash)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let entry = CacheEntry {
            provider: row.get("provider"),
            query_hash: row.get("query_hash"),
            params_json: row.get("query_params"),
            response_json: row.get("response_json"),
            created_at: row.get("created_at"),
            ttl_seconds: row.get("ttl_seconds"),
        };

        let now = self.now();
        if entry.is_valid_at(now) {
            return Ok(Some(entry));
        }

        tracing::debug!(provider, query_hash, age = entry.age_secs(now), "cache entry expired, deleting");
        // 只删除仍是这一代的行
        sqlx::query(
            "DELETE FROM query_cache WHERE provider = ? AND query_hash = ? AND created_at = ?",
        )
        .bind(provider)
        .bind(query_hash)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(None)
    }

    /// upsert：冲突时覆盖响应体、重置 created_at 并采用新的 TTL
    pub async fn set(
        &self,
        provider: &str,
        query_hash: &str,
        params: &Value,
        response_json: &str,
        ttl_seconds: i64,
    ) -> Result<(), CacheError> {
        sqlx::query(
            "INSERT INTO query_cache (provider, query_hash, query_params, response_json, created_at, ttl_seconds)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(provider, query_hash) DO UPDATE SET
                query_params = excluded.query_params,
                response_json = excluded.response_json,
                created_at = excluded.created_at,
                ttl_seconds = excluded.ttl_seconds",
        )
        .bind(provider)
        .bind(query_hash)
        .bind(canonical_json(params))
        .bind(response_json)
        .bind(self.now())
        .bind(ttl_seconds)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 按 TTL 类别写入
    pub async fn set_class(
        &self,
        provider: &str,
        query_hash: &str,
        params: &Value,
        response_json: &str,
        class: TtlClass,
    ) -> Result<(), CacheError> {
        self.set(provider, query_hash, params, response_json, self.ttl.seconds(class))
            .await
    }

    /// 可选的显式清扫：删除所有已过期条目，返回删除数
    pub async fn sweep_expired(&self) -> Result<u64, CacheError> {
        let result = sqlx::query("DELETE FROM query_cache WHERE ? - created_at >= ttl_seconds")
            .bind(self.now())
            .execute(&self.pool)
            .await?;
        let removed = result.rows_affected();
        if removed > 0 {
            tracing::info!(removed, "swept expired cache entries");
        }
        Ok(removed)
    }

    /// 条目总数（含尚未被读到的过期条目）
    pub async fn len(&self) -> Result<i64, CacheError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM query_cache")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
