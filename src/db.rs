//! SQLite 连接池与表结构
//!
//! 查询缓存、行程、交接文档共用一个库；所有写入都是单行 upsert 或单行条件更新，不需要事务。

use std::path::Path;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// 打开（必要时创建）数据库文件并初始化表
pub async fn connect(db_path: impl AsRef<Path>) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = db_path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    init_tables(&pool).await?;
    Ok(pool)
}

/// 建表（幂等）
pub async fn init_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS query_cache (
            provider TEXT NOT NULL,
            query_hash TEXT NOT NULL,
            query_params TEXT NOT NULL,
            response_json TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            ttl_seconds INTEGER NOT NULL,
            PRIMARY KEY (provider, query_hash)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS trips (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            template_id TEXT,
            intake_json TEXT NOT NULL,
            research_summary TEXT,
            research_viewed INTEGER NOT NULL DEFAULT 0,
            options_json TEXT,
            itinerary_json TEXT,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_trips_user ON trips(user_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS handoffs (
            id TEXT PRIMARY KEY,
            trip_id TEXT NOT NULL UNIQUE,
            user_id TEXT NOT NULL,
            chat_history TEXT NOT NULL,
            research_summary TEXT,
            user_preferences TEXT NOT NULL,
            all_flight_options TEXT NOT NULL,
            selected_flight_id TEXT,
            all_hotel_options TEXT NOT NULL,
            selected_hotel_ids TEXT NOT NULL,
            daily_itinerary TEXT NOT NULL,
            total_estimate_usd REAL NOT NULL,
            margin_percent REAL,
            agent_id TEXT,
            agent_quote_usd REAL,
            quote_status TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            quoted_at INTEGER,
            expires_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_handoffs_status_expiry ON handoffs(quote_status, expires_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_connect_creates_schema_idempotently() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("wayfarer.db");

        let pool = connect(&db_path).await.unwrap();
        init_tables(&pool).await.unwrap();

        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();
        let names: Vec<_> = tables.into_iter().map(|(n,)| n).collect();
        assert_eq!(names, vec!["handoffs", "query_cache", "trips"]);
    }
}
