//! 交接文档持久化
//!
//! 创建用 `INSERT ... ON CONFLICT(trip_id) DO NOTHING`，trip_id 唯一约束即幂等信号；
//! 状态变更都是以当前 quote_status 为条件的单行更新。

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

use super::model::{HandoffDocument, QuoteStatus};
use crate::core::HandoffError;

#[derive(Clone)]
pub struct HandoffStore {
    pool: SqlitePool,
}

impl HandoffStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 插入；该行程已有文档时不做任何事，返回 false
    pub async fn insert_if_absent(&self, doc: &HandoffDocument) -> Result<bool, HandoffError> {
        let result = sqlx::query(
            "INSERT INTO handoffs (id, trip_id, user_id, chat_history, research_summary, user_preferences,
                                   all_flight_options, selected_flight_id, all_hotel_options, selected_hotel_ids,
                                   daily_itinerary, total_estimate_usd, margin_percent, agent_id, agent_quote_usd,
                                   quote_status, created_at, quoted_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(trip_id) DO NOTHING",
        )
        .bind(&doc.id)
        .bind(&doc.trip_id)
        .bind(&doc.user_id)
        .bind(serde_json::to_string(&doc.chat_history)?)
        .bind(&doc.research_summary)
        .bind(serde_json::to_string(&doc.user_preferences)?)
        .bind(serde_json::to_string(&doc.all_flight_options)?)
        .bind(&doc.selected_flight_id)
        .bind(serde_json::to_string(&doc.all_hotel_options)?)
        .bind(serde_json::to_string(&doc.selected_hotel_ids)?)
        .bind(serde_json::to_string(&doc.daily_itinerary)?)
        .bind(doc.total_estimate_usd)
        .bind(doc.margin_percent)
        .bind(&doc.agent_id)
        .bind(doc.agent_quote_usd)
        .bind(doc.quote_status.as_str())
        .bind(doc.created_at.timestamp())
        .bind(doc.quoted_at.map(|t| t.timestamp()))
        .bind(doc.expires_at.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn get(&self, id: &str) -> Result<Option<HandoffDocument>, HandoffError> {
        let row = sqlx::query("SELECT * FROM handoffs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| handoff_from_row(&r)).transpose()
    }

    pub async fn get_by_trip(&self, trip_id: &str) -> Result<Option<HandoffDocument>, HandoffError> {
        let row = sqlx::query("SELECT * FROM handoffs WHERE trip_id = ?")
            .bind(trip_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| handoff_from_row(&r)).transpose()
    }

    /// 待报价且未过期，按创建时间先后
    pub async fn list_pending(&self, now: DateTime<Utc>) -> Result<Vec<HandoffDocument>, HandoffError> {
        let rows = sqlx::query(
            "SELECT * FROM handoffs WHERE quote_status = 'pending' AND expires_at >= ? ORDER BY created_at ASC",
        )
        .bind(now.timestamp())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(handoff_from_row).collect()
    }

    /// pending → quoted；要求仍为 pending 且未过期
    pub async fn record_quote(
        &self,
        id: &str,
        agent_id: &str,
        quote_usd: f64,
        margin_percent: f64,
        now: DateTime<Utc>,
    ) -> Result<bool, HandoffError> {
        let result = sqlx::query(
            "UPDATE handoffs SET quote_status = 'quoted', agent_id = ?, agent_quote_usd = ?,
                                 margin_percent = ?, quoted_at = ?
             WHERE id = ? AND quote_status = 'pending' AND expires_at >= ?",
        )
        .bind(agent_id)
        .bind(quote_usd)
        .bind(margin_percent)
        .bind(now.timestamp())
        .bind(id)
        .bind(now.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// 从 `from` 中任一状态迁移到 `to`
    pub async fn set_status(&self, id: &str, from: &[QuoteStatus], to: QuoteStatus) -> Result<bool, HandoffError> {
        let placeholders = vec!["?"; from.len()].join(", ");
        let sql = format!(
            "UPDATE handoffs SET quote_status = ? WHERE id = ? AND quote_status IN ({})",
            placeholders
        );
        let mut query = sqlx::query(&sql).bind(to.as_str()).bind(id);
        for status in from {
            query = query.bind(status.as_str());
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    /// 过期清理：pending 且 expires_at < now → cancelled；返回本次迁移的行数
    pub async fn cancel_expired(&self, now: DateTime<Utc>) -> Result<u64, HandoffError> {
        let result = sqlx::query(
            "UPDATE handoffs SET quote_status = 'cancelled' WHERE quote_status = 'pending' AND expires_at < ?",
        )
        .bind(now.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn epoch(secs: i64) -> Result<DateTime<Utc>, HandoffError> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| HandoffError::Corrupt(format!("timestamp out of range: {}", secs)))
}

fn handoff_from_row(row: &SqliteRow) -> Result<HandoffDocument, HandoffError> {
    let chat_history: String = row.get("chat_history");
    let user_preferences: String = row.get("user_preferences");
    let all_flight_options: String = row.get("all_flight_options");
    let all_hotel_options: String = row.get("all_hotel_options");
    let selected_hotel_ids: String = row.get("selected_hotel_ids");
    let daily_itinerary: String = row.get("daily_itinerary");
    let quote_status: String = row.get("quote_status");
    let quoted_at: Option<i64> = row.get("quoted_at");

    Ok(HandoffDocument {
        id: row.get("id"),
        trip_id: row.get("trip_id"),
        user_id: row.get("user_id"),
        chat_history: serde_json::from_str(&chat_history)?,
        research_summary: row.get("research_summary"),
        user_preferences: serde_json::from_str(&user_preferences)?,
        all_flight_options: serde_json::from_str(&all_flight_options)?,
        selected_flight_id: row.get("selected_flight_id"),
        all_hotel_options: serde_json::from_str(&all_hotel_options)?,
        selected_hotel_ids: serde_json::from_str(&selected_hotel_ids)?,
        daily_itinerary: serde_json::from_str(&daily_itinerary)?,
        total_estimate_usd: row.get("total_estimate_usd"),
        margin_percent: row.get("margin_percent"),
        agent_id: row.get("agent_id"),
        agent_quote_usd: row.get("agent_quote_usd"),
        quote_status: quote_status.parse().map_err(HandoffError::Corrupt)?,
        created_at: epoch(row.get("created_at"))?,
        quoted_at: quoted_at.map(epoch).transpose()?,
        expires_at: epoch(row.get("expires_at"))?,
    })
}
