//! 行程生命周期
//!
//! intake → researching → research_complete → options_ready → option_selected → ab_ready
//!
//! 只向前迁移；生成选项前必须通过研究-优先门禁。所有操作都限定在所有者范围内。

use std::sync::Arc;

use serde_json::Value;

use super::intake::TripIntake;
use super::model::{Trip, TripOption, TripStatus};
use super::store::{TripPatch, TripStore};
use crate::core::{Clock, SystemClock, TripError};

pub struct TripLifecycle {
    store: TripStore,
    clock: Arc<dyn Clock>,
}

impl TripLifecycle {
    pub fn new(store: TripStore) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: TripStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn create(
        &self,
        user_id: &str,
        intake: TripIntake,
        template_id: Option<String>,
    ) -> Result<Trip, TripError> {
        intake.validate()?;
        let now = self.clock.now();
        let trip = Trip {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            template_id,
            intake,
            research_summary: None,
            research_viewed: false,
            options: None,
            itinerary: None,
            status: TripStatus::Intake,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(&trip).await?;
        tracing::info!(trip_id = %trip.id, user_id, "trip created");
        Ok(trip)
    }

    pub async fn get(&self, id: &str, user_id: &str) -> Result<Trip, TripError> {
        self.store
            .get(id, user_id)
            .await?
            .ok_or_else(|| TripError::NotFound(id.to_string()))
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Trip>, TripError> {
        self.store.list_for_user(user_id).await
    }

    /// 已处于 researching（上次研究调用失败）时原样返回，允许重试
    pub async fn start_research(&self, id: &str, user_id: &str) -> Result<Trip, TripError> {
        let trip = self.get(id, user_id).await?;
        if trip.status == TripStatus::Researching {
            tracing::debug!(trip_id = %trip.id, "research already in progress, resuming");
            return Ok(trip);
        }
        self.advance(&trip, TripStatus::Researching, TripPatch::default()).await
    }

    /// 写入研究摘要；research_viewed 保持原值（新摘要需要用户查看）
    pub async fn complete_research(&self, id: &str, user_id: &str, summary: String) -> Result<Trip, TripError> {
        let trip = self.get(id, user_id).await?;
        let patch = TripPatch {
            research_summary: Some(summary),
            ..TripPatch::default()
        };
        self.advance(&trip, TripStatus::ResearchComplete, patch).await
    }

    /// 幂等：已查看时直接返回成功
    pub async fn mark_research_viewed(&self, id: &str, user_id: &str) -> Result<Trip, TripError> {
        let trip = self.get(id, user_id).await?;
        if trip.research_viewed {
            return Ok(trip);
        }
        if self.store.set_research_viewed(id, user_id, self.clock.now()).await? {
            tracing::info!(trip_id = id, "research marked viewed");
        }
        self.get(id, user_id).await
    }

    pub async fn can_generate_options(&self, id: &str, user_id: &str) -> Result<bool, TripError> {
        Ok(self.get(id, user_id).await?.can_generate_options())
    }

    /// 门禁检查：研究摘要存在但未查看 → ResearchNotViewed
    pub fn ensure_can_generate(trip: &Trip) -> Result<(), TripError> {
        if trip.can_generate_options() {
            Ok(())
        } else {
            Err(TripError::ResearchNotViewed)
        }
    }

    /// 保存生成的选项（可重复生成，覆盖旧选项）
    pub async fn record_options(
        &self,
        id: &str,
        user_id: &str,
        options: Vec<TripOption>,
    ) -> Result<Trip, TripError> {
        let trip = self.get(id, user_id).await?;
        Self::ensure_can_generate(&trip)?;
        if options.is_empty() {
            return Err(TripError::InvalidOption("no options to record".to_string()));
        }
        let patch = TripPatch {
            options_json: Some(serde_json::to_string(&options)?),
            ..TripPatch::default()
        };
        self.advance(&trip, TripStatus::OptionsReady, patch).await
    }

    pub async fn select_option(&self, id: &str, user_id: &str, index: usize) -> Result<Trip, TripError> {
        let trip = self.get(id, user_id).await?;
        if trip.status != TripStatus::OptionsReady {
            return Err(invalid(trip.status, TripStatus::OptionSelected));
        }
        let option = trip
            .options
            .as_ref()
            .and_then(|opts| opts.get(index))
            .ok_or_else(|| TripError::InvalidOption(format!("option {} does not exist", index)))?;
        let patch = TripPatch {
            itinerary_json: Some(serde_json::to_string(option)?),
            ..TripPatch::default()
        };
        self.advance(&trip, TripStatus::OptionSelected, patch).await
    }

    /// 补全后的行程写回，进入 ab_ready（可交接给旅行顾问）
    pub async fn mark_handoff_ready(&self, id: &str, user_id: &str, itinerary: Value) -> Result<Trip, TripError> {
        let trip = self.get(id, user_id).await?;
        if trip.status != TripStatus::OptionSelected {
            return Err(invalid(trip.status, TripStatus::AbReady));
        }
        let patch = TripPatch {
            itinerary_json: Some(serde_json::to_string(&itinerary)?),
            ..TripPatch::default()
        };
        self.advance(&trip, TripStatus::AbReady, patch).await
    }

    async fn advance(&self, trip: &Trip, to: TripStatus, patch: TripPatch) -> Result<Trip, TripError> {
        if !trip.status.can_advance_to(to) {
            return Err(invalid(trip.status, to));
        }
        let updated = self
            .store
            .transition(&trip.id, &trip.user_id, trip.status, to, patch, self.clock.now())
            .await?;
        if !updated {
            // 读取与更新之间状态已被改变
            let current = self.get(&trip.id, &trip.user_id).await?;
            tracing::warn!(trip_id = %trip.id, expected = %trip.status, actual = %current.status, "trip changed concurrently");
            return Err(invalid(current.status, to));
        }
        tracing::info!(trip_id = %trip.id, from = %trip.status, to = %to, "trip advanced");
        self.get(&trip.id, &trip.user_id).await
    }
}

fn invalid(from: TripStatus, to: TripStatus) -> TripError {
    TripError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::trips::model::CityStop;
    use tempfile::TempDir;

    async fn lifecycle() -> (TempDir, TripLifecycle) {
        let dir = TempDir::new().unwrap();
        let pool = crate::db::connect(dir.path().join("t.db")).await.unwrap();
        let clock = Arc::new(ManualClock::at_epoch(1_780_000_000));
        (dir, TripLifecycle::with_clock(TripStore::new(pool), clock))
    }

    fn option(title: &str) -> TripOption {
        TripOption {
            title: title.to_string(),
            summary: String::new(),
            cities: vec![CityStop {
                name: "London".to_string(),
                country: Some("GB".to_string()),
                nights: 4,
            }],
            estimate_usd: 3200.0,
        }
    }

    #[tokio::test]
    async fn test_research_gate() {
        let (_dir, lc) = lifecycle().await;
        let trip = lc.create("u1", TripIntake::new("JFK", "LHR", "2026-06"), None).await.unwrap();
        lc.start_research(&trip.id, "u1").await.unwrap();
        lc.complete_research(&trip.id, "u1", "Summer in London".to_string()).await.unwrap();

        assert!(!lc.can_generate_options(&trip.id, "u1").await.unwrap());
        let err = lc.record_options(&trip.id, "u1", vec![option("A")]).await.unwrap_err();
        assert!(matches!(err, TripError::ResearchNotViewed));
        assert_eq!(err.requires_action(), Some("view_research"));

        let viewed = lc.mark_research_viewed(&trip.id, "u1").await.unwrap();
        assert!(viewed.research_viewed);
        let again = lc.mark_research_viewed(&trip.id, "u1").await.unwrap();
        assert!(again.research_viewed);
        assert!(lc.can_generate_options(&trip.id, "u1").await.unwrap());

        let ready = lc.record_options(&trip.id, "u1", vec![option("A"), option("B")]).await.unwrap();
        assert_eq!(ready.status, TripStatus::OptionsReady);
    }

    #[tokio::test]
    async fn test_start_research_resumes() {
        let (_dir, lc) = lifecycle().await;
        let trip = lc.create("u1", TripIntake::new("JFK", "LHR", "2026-06"), None).await.unwrap();
        let first = lc.start_research(&trip.id, "u1").await.unwrap();
        let again = lc.start_research(&trip.id, "u1").await.unwrap();
        assert_eq!(first.status, TripStatus::Researching);
        assert_eq!(again.status, TripStatus::Researching);
        assert_eq!(again.updated_at, first.updated_at);

        let done = lc.complete_research(&trip.id, "u1", "Summer in London".to_string()).await.unwrap();
        assert_eq!(done.status, TripStatus::ResearchComplete);
        let err = lc.start_research(&trip.id, "u1").await.unwrap_err();
        assert!(matches!(err, TripError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_trip_without_research_skips_gate() {
        let (_dir, lc) = lifecycle().await;
        let trip = lc.create("u1", TripIntake::new("JFK", "LHR", "2026-06"), None).await.unwrap();
        assert!(lc.can_generate_options(&trip.id, "u1").await.unwrap());
        let ready = lc.record_options(&trip.id, "u1", vec![option("A")]).await.unwrap();
        assert_eq!(ready.status, TripStatus::OptionsReady);

        // 重新生成
        let regenerated = lc.record_options(&trip.id, "u1", vec![option("C")]).await.unwrap();
        assert_eq!(regenerated.options.unwrap()[0].title, "C");
    }

    #[tokio::test]
    async fn test_forward_only_and_select() {
        let (_dir, lc) = lifecycle().await;
        let trip = lc.create("u1", TripIntake::new("JFK", "LHR", "2026-06"), None).await.unwrap();
        lc.record_options(&trip.id, "u1", vec![option("A"), option("B")]).await.unwrap();

        let err = lc.select_option(&trip.id, "u1", 5).await.unwrap_err();
        assert!(matches!(err, TripError::InvalidOption(_)));

        let selected = lc.select_option(&trip.id, "u1", 1).await.unwrap();
        assert_eq!(selected.status, TripStatus::OptionSelected);
        assert_eq!(selected.itinerary.as_ref().unwrap()["title"], "B");

        let err = lc.start_research(&trip.id, "u1").await.unwrap_err();
        assert!(matches!(err, TripError::InvalidTransition { .. }));
        let err = lc.record_options(&trip.id, "u1", vec![option("Z")]).await.unwrap_err();
        assert_eq!(err.status_code(), 409);

        let done = lc
            .mark_handoff_ready(&trip.id, "u1", serde_json::json!({"title": "B", "gaps": []}))
            .await
            .unwrap();
        assert_eq!(done.status, TripStatus::AbReady);
    }

    #[tokio::test]
    async fn test_owner_scoping_and_validation() {
        let (_dir, lc) = lifecycle().await;
        let trip = lc.create("u1", TripIntake::new("JFK", "LHR", "2026-06"), None).await.unwrap();
        assert!(matches!(lc.get(&trip.id, "u2").await, Err(TripError::NotFound(_))));
        assert_eq!(lc.list_for_user("u1").await.unwrap().len(), 1);
        assert!(lc.list_for_user("u2").await.unwrap().is_empty());

        let bad = lc.create("u1", TripIntake::new("JFK", "LHR", "June"), None).await;
        assert!(matches!(bad, Err(TripError::InvalidIntake(_))));
    }
}
