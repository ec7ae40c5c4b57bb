//! 行程持久化
//!
//! 所有状态变更都是单行条件更新 `WHERE id = ? AND user_id = ? AND status = ?`，
//! 影响行数为 0 表示并发修改或状态已变，由生命周期层决定如何报告。

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

use super::model::{Trip, TripStatus};
use crate::core::TripError;

/// 一次状态迁移附带的字段变更；None 表示保持原值
#[derive(Debug, Default, Clone)]
pub struct TripPatch {
    pub research_summary: Option<String>,
    pub options_json: Option<String>,
    pub itinerary_json: Option<String>,
}

#[derive(Clone)]
pub struct TripStore {
    pool: SqlitePool,
}

impl TripStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, trip: &Trip) -> Result<(), TripError> {
        sqlx::query(
            "INSERT INTO trips (id, user_id, template_id, intake_json, research_summary, research_viewed,
                                options_json, itinerary_json, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&trip.id)
        .bind(&trip.user_id)
        .bind(&trip.template_id)
        .bind(serde_json::to_string(&trip.intake)?)
        .bind(&trip.research_summary)
        .bind(trip.research_viewed)
        .bind(trip.options.as_ref().map(serde_json::to_string).transpose()?)
        .bind(trip.itinerary.as_ref().map(serde_json::to_string).transpose()?)
        .bind(trip.status.as_str())
        .bind(trip.created_at.to_rfc3339())
        .bind(trip.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 按 id 读取，限定所有者
    pub async fn get(&self, id: &str, user_id: &str) -> Result<Option<Trip>, TripError> {
        let row = sqlx::query("SELECT * FROM trips WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| trip_from_row(&r)).transpose()
    }

    /// 最近更新的在前
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Trip>, TripError> {
        let rows = sqlx::query("SELECT * FROM trips WHERE user_id = ? ORDER BY updated_at DESC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(trip_from_row).collect()
    }

    /// 条件迁移；返回是否真的更新了一行
    pub async fn transition(
        &self,
        id: &str,
        user_id: &str,
        from: TripStatus,
        to: TripStatus,
        patch: TripPatch,
        now: DateTime<Utc>,
    ) -> Result<bool, TripError> {
        let result = sqlx::query(
            "UPDATE trips SET
                status = ?,
                research_summary = COALESCE(?, research_summary),
                options_json = COALESCE(?, options_json),
                itinerary_json = COALESCE(?, itinerary_json),
                updated_at = ?
             WHERE id = ? AND user_id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(patch.research_summary)
        .bind(patch.options_json)
        .bind(patch.itinerary_json)
        .bind(now.to_rfc3339())
        .bind(id)
        .bind(user_id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// 置位已查看研究；已为 true 时不修改 updated_at
    pub async fn set_research_viewed(&self, id: &str, user_id: &str, now: DateTime<Utc>) -> Result<bool, TripError> {
        let result = sqlx::query(
            "UPDATE trips SET research_viewed = 1, updated_at = ?
             WHERE id = ? AND user_id = ? AND research_viewed = 0",
        )
        .bind(now.to_rfc3339())
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, TripError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| TripError::Corrupt(format!("timestamp {}: {}", raw, e)))
}

fn trip_from_row(row: &SqliteRow) -> Result<Trip, TripError> {
    let status: String = row.get("status");
    let intake_json: String = row.get("intake_json");
    let options_json: Option<String> = row.get("options_json");
    let itinerary_json: Option<String> = row.get("itinerary_json");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Trip {
        id: row.get("id"),
        user_id: row.get("user_id"),
        template_id: row.get("template_id"),
        intake: serde_json::from_str(&intake_json)?,
        research_summary: row.get("research_summary"),
        research_viewed: row.get("research_viewed"),
        options: options_json.as_deref().map(serde_json::from_str).transpose()?,
        itinerary: itinerary_json.as_deref().map(serde_json::from_str).transpose()?,
        status: status.parse().map_err(TripError::Corrupt)?,
        created_at: parse_time(&created_at)?,
        updated_at: parse_time(&updated_at)?,
    })
}
