//! 交接文档生命周期：pending → quoted → booked | cancelled
//!
//! 创建对同一行程幂等；报价在过期或低于估价时被拒绝；过期清理是可重复执行的批量条件更新。

use std::sync::Arc;

use chrono::Duration;

use super::model::{margin_percent, HandoffDocument, HandoffDraft, QuoteStatus};
use super::store::HandoffStore;
use crate::config::HandoffSection;
use crate::core::{Clock, HandoffError, SystemClock};

pub struct HandoffLifecycle {
    store: HandoffStore,
    clock: Arc<dyn Clock>,
    expiry: Duration,
    max_chat_history: usize,
}

impl HandoffLifecycle {
    pub fn new(store: HandoffStore) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), &HandoffSection::default())
    }

    pub fn with_clock(store: HandoffStore, clock: Arc<dyn Clock>, cfg: &HandoffSection) -> Self {
        Self {
            store,
            clock,
            expiry: Duration::days(cfg.expiry_days),
            max_chat_history: cfg.max_chat_history,
        }
    }

    /// 每个行程只创建一次；再次调用返回已有文档（含其当前状态）
    pub async fn create(&self, draft: HandoffDraft) -> Result<HandoffDocument, HandoffError> {
        if let Some(existing) = self.store.get_by_trip(&draft.trip_id).await? {
            tracing::debug!(trip_id = %draft.trip_id, "handoff already exists, returning existing");
            return Ok(existing);
        }

        let draft = draft.normalized(self.max_chat_history)?;
        let trip_id = draft.trip_id.clone();

        let now = self.clock.now();
        let doc = HandoffDocument::from_draft(uuid::Uuid::new_v4().to_string(), draft, now, now + self.expiry);

        if self.store.insert_if_absent(&doc).await? {
            tracing::info!(handoff_id = %doc.id, trip_id = %trip_id, expires_at = %doc.expires_at, "handoff created");
        } else {
            tracing::debug!(trip_id = %trip_id, "handoff already exists, returning existing");
        }

        self.store
            .get_by_trip(&trip_id)
            .await?
            .ok_or(HandoffError::NotFound(trip_id))
    }

    pub async fn get(&self, id: &str) -> Result<HandoffDocument, HandoffError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| HandoffError::NotFound(id.to_string()))
    }

    pub async fn get_by_trip(&self, trip_id: &str) -> Result<Option<HandoffDocument>, HandoffError> {
        self.store.get_by_trip(trip_id).await
    }

    /// 顾问报价：只允许 pending、未过期、且不低于估价
    pub async fn submit_quote(&self, id: &str, agent_id: &str, quote_usd: f64) -> Result<HandoffDocument, HandoffError> {
        let doc = self.get(id).await?;
        let now = self.clock.now();

        if doc.is_expired_at(now) {
            tracing::info!(handoff_id = id, expires_at = %doc.expires_at, "quote rejected: handoff expired");
            return Err(HandoffError::Expired(id.to_string()));
        }
        if doc.quote_status != QuoteStatus::Pending {
            return Err(invalid_state(doc.quote_status, "submit a quote"));
        }
        if !quote_usd.is_finite() || quote_usd < doc.total_estimate_usd {
            return Err(HandoffError::QuoteBelowEstimate {
                quote: quote_usd,
                estimate: doc.total_estimate_usd,
            });
        }

        let margin = margin_percent(quote_usd, doc.total_estimate_usd);
        if !self.store.record_quote(id, agent_id, quote_usd, margin, now).await? {
            let current = self.get(id).await?;
            return Err(invalid_state(current.quote_status, "submit a quote"));
        }
        tracing::info!(handoff_id = id, agent_id, quote_usd, margin, "handoff quoted");
        self.get(id).await
    }

    pub async fn mark_booked(&self, id: &str) -> Result<HandoffDocument, HandoffError> {
        self.move_status(id, &[QuoteStatus::Quoted], QuoteStatus::Booked, "book").await
    }

    pub async fn cancel(&self, id: &str) -> Result<HandoffDocument, HandoffError> {
        self.move_status(id, &[QuoteStatus::Pending, QuoteStatus::Quoted], QuoteStatus::Cancelled, "cancel")
            .await
    }

    /// 顾问待办队列
    pub async fn list_pending(&self) -> Result<Vec<HandoffDocument>, HandoffError> {
        self.store.list_pending(self.clock.now()).await
    }

    /// 过期清理；重复执行时第二次返回 0
    pub async fn cleanup_expired(&self) -> Result<u64, HandoffError> {
        let cancelled = self.store.cancel_expired(self.clock.now()).await?;
        if cancelled > 0 {
            tracing::info!(cancelled, "expired handoffs cancelled");
        }
        Ok(cancelled)
    }

    async fn move_status(
        &self,
        id: &str,
        from: &[QuoteStatus],
        to: QuoteStatus,
        action: &str,
    ) -> Result<HandoffDocument, HandoffError> {
        let doc = self.get(id).await?;
        if !from.contains(&doc.quote_status) || !self.store.set_status(id, from, to).await? {
            let current = self.get(id).await?;
            return Err(invalid_state(current.quote_status, action));
        }
        tracing::info!(handoff_id = id, from = %doc.quote_status, to = %to, "handoff status changed");
        self.get(id).await
    }
}

fn invalid_state(current: QuoteStatus, action: &str) -> HandoffError {
    HandoffError::InvalidState {
        current: current.to_string(),
        action: action.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::handoff::model::DayPlan;
    use tempfile::TempDir;

    async fn lifecycle() -> (TempDir, HandoffLifecycle, Arc<ManualClock>) {
        let dir = TempDir::new().unwrap();
        let pool = crate::db::connect(dir.path().join("h.db")).await.unwrap();
        let clock = Arc::new(ManualClock::at_epoch(1_780_000_000));
        let lc = HandoffLifecycle::with_clock(HandoffStore::new(pool), clock.clone(), &HandoffSection::default());
        (dir, lc, clock)
    }

    fn draft(trip_id: &str, estimate: f64) -> HandoffDraft {
        HandoffDraft {
            trip_id: trip_id.to_string(),
            user_id: "u1".to_string(),
            chat_history: vec![],
            research_summary: Some("Summer in London".to_string()),
            user_preferences: serde_json::json!({"tier": "moderate"}),
            all_flight_options: vec![],
            selected_flight_id: None,
            all_hotel_options: vec![],
            selected_hotel_ids: vec![],
            daily_itinerary: vec![DayPlan {
                day: 1,
                city: "London".to_string(),
                activities: vec!["British Museum".to_string()],
            }],
            total_estimate_usd: estimate,
        }
    }

    #[tokio::test]
    async fn test_create_is_idempotent_per_trip() {
        let (_dir, lc, _clock) = lifecycle().await;
        let first = lc.create(draft("trip-1", 100.0)).await.unwrap();
        let second = lc.create(draft("trip-1", 999.0)).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.total_estimate_usd, 100.0);
        assert_eq!(first.expires_at - first.created_at, Duration::days(30));
    }

    #[tokio::test]
    async fn test_existing_handoff_wins_over_invalid_draft() {
        let (_dir, lc, _clock) = lifecycle().await;
        let first = lc.create(draft("trip-1", 100.0)).await.unwrap();

        let mut broken = draft("trip-1", 100.0);
        broken.daily_itinerary[0].day = 2;
        let second = lc.create(broken.clone()).await.unwrap();
        assert_eq!(second.id, first.id);

        broken.trip_id = "trip-2".to_string();
        let err = lc.create(broken).await.unwrap_err();
        assert!(matches!(err, HandoffError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_quote_must_cover_estimate() {
        let (_dir, lc, _clock) = lifecycle().await;
        let doc = lc.create(draft("trip-1", 100.0)).await.unwrap();

        let err = lc.submit_quote(&doc.id, "agent-7", 99.0).await.unwrap_err();
        assert!(matches!(err, HandoffError::QuoteBelowEstimate { .. }));
        assert_eq!(lc.get(&doc.id).await.unwrap().quote_status, QuoteStatus::Pending);

        let quoted = lc.submit_quote(&doc.id, "agent-7", 100.0).await.unwrap();
        assert_eq!(quoted.quote_status, QuoteStatus::Quoted);
        assert_eq!(quoted.agent_quote_usd, Some(100.0));
        assert_eq!(quoted.margin_percent, Some(0.0));
        assert!(quoted.quoted_at.is_some());

        let again = lc.submit_quote(&doc.id, "agent-8", 150.0).await.unwrap_err();
        assert!(matches!(again, HandoffError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_expired_rejects_any_quote() {
        let (_dir, lc, clock) = lifecycle().await;
        let doc = lc.create(draft("trip-1", 100.0)).await.unwrap();
        clock.advance(Duration::days(30) + Duration::seconds(1));

        let err = lc.submit_quote(&doc.id, "agent-7", 10_000.0).await.unwrap_err();
        assert!(matches!(err, HandoffError::Expired(_)));
        assert_eq!(err.status_code(), 410);
        // 不做隐式迁移
        assert_eq!(lc.get(&doc.id).await.unwrap().quote_status, QuoteStatus::Pending);
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let (_dir, lc, clock) = lifecycle().await;
        let old = lc.create(draft("trip-old", 100.0)).await.unwrap();
        let quoted = lc.create(draft("trip-quoted", 100.0)).await.unwrap();
        lc.submit_quote(&quoted.id, "agent-7", 120.0).await.unwrap();

        clock.advance(Duration::days(20));
        let fresh = lc.create(draft("trip-fresh", 100.0)).await.unwrap();
        clock.advance(Duration::days(11));

        assert_eq!(lc.cleanup_expired().await.unwrap(), 1);
        assert_eq!(lc.cleanup_expired().await.unwrap(), 0);

        assert_eq!(lc.get(&old.id).await.unwrap().quote_status, QuoteStatus::Cancelled);
        assert_eq!(lc.get(&quoted.id).await.unwrap().quote_status, QuoteStatus::Quoted);
        let pending = lc.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, fresh.id);
    }

    #[tokio::test]
    async fn test_book_and_cancel() {
        let (_dir, lc, _clock) = lifecycle().await;
        let doc = lc.create(draft("trip-1", 100.0)).await.unwrap();
        assert!(matches!(lc.mark_booked(&doc.id).await, Err(HandoffError::InvalidState { .. })));

        lc.submit_quote(&doc.id, "agent-7", 130.0).await.unwrap();
        let booked = lc.mark_booked(&doc.id).await.unwrap();
        assert_eq!(booked.quote_status, QuoteStatus::Booked);
        assert!(lc.cancel(&doc.id).await.is_err());

        let other = lc.create(draft("trip-2", 50.0)).await.unwrap();
        assert_eq!(lc.cancel(&other.id).await.unwrap().quote_status, QuoteStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_malformed_draft_rejected() {
        let (_dir, lc, _clock) = lifecycle().await;
        let mut d = draft("trip-1", 100.0);
        d.daily_itinerary[0].day = 2;
        assert!(matches!(lc.create(d).await, Err(HandoffError::Malformed(_))));
        assert!(lc.get_by_trip("trip-1").await.unwrap().is_none());
    }
}
