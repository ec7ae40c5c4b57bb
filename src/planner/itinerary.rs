//! 行程规划：研究摘要与候选方案（调用 LLM）
//!
//! 方案从模型回复中第一个 JSON 数组解析（兼容 ```json 代码块）。
//! 生成方案前先过研究-优先门禁，门禁不通过时不调用 LLM。

use std::sync::Arc;

use crate::core::TripError;
use crate::llm::{LlmClient, Message};
use crate::trips::{Trip, TripIntake, TripLifecycle, TripOption};

const RESEARCH_SYSTEM: &str = "You are a travel researcher. Summarize seasonality, visa and entry notes, \
    typical costs and neighbourhoods for the requested trip in a few short paragraphs.";

const OPTIONS_SYSTEM: &str = "You are a travel planner. Reply with a JSON array of 2-3 trip options. \
    Each option: {\"title\", \"summary\", \"cities\": [{\"name\", \"country\" (ISO code), \"nights\"}], \"estimate_usd\"}.";

pub struct ItineraryPlanner {
    llm: Arc<dyn LlmClient>,
}

impl ItineraryPlanner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn research(&self, intake: &TripIntake) -> Result<String, TripError> {
        let messages = vec![Message::system(RESEARCH_SYSTEM), Message::user(describe_intake(intake))];
        let summary = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| TripError::Planner(e.to_string()))?;
        Ok(summary.trim().to_string())
    }

    pub async fn propose_options(
        &self,
        intake: &TripIntake,
        research_summary: Option<&str>,
    ) -> Result<Vec<TripOption>, TripError> {
        let mut prompt = describe_intake(intake);
        if let Some(summary) = research_summary {
            prompt.push_str("\n\nResearch notes:\n");
            prompt.push_str(summary);
        }
        let messages = vec![Message::system(OPTIONS_SYSTEM), Message::user(prompt)];
        let reply = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| TripError::Planner(e.to_string()))?;
        parse_options(&reply)
    }

    /// intake → researching → research_complete
    pub async fn run_research(&self, trips: &TripLifecycle, id: &str, user_id: &str) -> Result<Trip, TripError> {
        let trip = trips.start_research(id, user_id).await?;
        let summary = self.research(&trip.intake).await?;
        trips.complete_research(id, user_id, summary).await
    }

    /// 门禁 → 生成 → 保存为 options_ready
    pub async fn generate_options(&self, trips: &TripLifecycle, id: &str, user_id: &str) -> Result<Trip, TripError> {
        let trip = trips.get(id, user_id).await?;
        TripLifecycle::ensure_can_generate(&trip)?;
        let options = self
            .propose_options(&trip.intake, trip.research_summary.as_deref())
            .await?;
        tracing::info!(trip_id = id, count = options.len(), "trip options generated");
        trips.record_options(id, user_id, options).await
    }
}

fn describe_intake(intake: &TripIntake) -> String {
    let mut text = format!(
        "Trip from {} to {} in {} for {} traveler(s), {} nights. Budget tier: {:?}. Pace: {:?}.",
        intake.origin,
        intake.destination,
        intake.month,
        intake.travelers,
        intake.nights,
        intake.tier,
        intake.activity
    );
    if let Some(notes) = &intake.notes {
        text.push_str(" Notes: ");
        text.push_str(notes);
    }
    text
}

/// 取回复中第一个 JSON 数组并解析为方案列表
pub fn parse_options(reply: &str) -> Result<Vec<TripOption>, TripError> {
    let trimmed = reply.trim();
    let body = match trimmed.find("```json") {
        Some(start) => {
            let rest = &trimmed[start + 7..];
            rest.find("```").map(|end| &rest[..end]).unwrap_or(rest)
        }
        None => trimmed,
    };
    let json_str = match (body.find('['), body.rfind(']')) {
        (Some(start), Some(end)) if end > start => &body[start..=end],
        _ => return Err(TripError::Planner("no JSON array in planner reply".to_string())),
    };

    let options: Vec<TripOption> = serde_json::from_str(json_str)
        .map_err(|e| TripError::Planner(format!("unparseable options: {}", e)))?;
    if options.is_empty() {
        return Err(TripError::Planner("planner returned no options".to_string()));
    }
    if let Some(bad) = options.iter().find(|o| o.cities.is_empty()) {
        return Err(TripError::Planner(format!("option '{}' has no cities", bad.title)));
    }
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::llm::ScriptedLlmClient;
    use crate::trips::{TripStatus, TripStore};
    use tempfile::TempDir;

    const OPTIONS_REPLY: &str = r#"Here are two ideas:
```json
[
  {"title": "Classic London", "summary": "Museums and theatre",
   "cities": [{"name": "London", "country": "GB", "nights": 5}], "estimate_usd": 3400},
  {"title": "London & Paris", "summary": "Two capitals",
   "cities": [{"name": "London", "country": "GB", "nights": 3}, {"name": "Paris", "country": "FR", "nights": 3}],
   "estimate_usd": 4100}
]
```"#;

    #[test]
    fn test_parse_fenced_array() {
        let options = parse_options(OPTIONS_REPLY).unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options[1].cities[1].name, "Paris");
        assert_eq!(options[1].total_nights(), 6);
    }

    #[test]
    fn test_parse_rejects_prose() {
        assert!(matches!(parse_options("I cannot help"), Err(TripError::Planner(_))));
        assert!(parse_options("[]").is_err());
    }

    #[tokio::test]
    async fn test_gate_blocks_llm_call() {
        let dir = TempDir::new().unwrap();
        let pool = crate::db::connect(dir.path().join("p.db")).await.unwrap();
        let trips = TripLifecycle::with_clock(TripStore::new(pool), Arc::new(ManualClock::at_epoch(0)));
        let llm = Arc::new(ScriptedLlmClient::new(["June is peak season in London.", OPTIONS_REPLY]));
        let planner = ItineraryPlanner::new(llm.clone());

        let trip = trips.create("u1", TripIntake::new("JFK", "LHR", "2026-06"), None).await.unwrap();
        let researched = planner.run_research(&trips, &trip.id, "u1").await.unwrap();
        assert_eq!(researched.status, TripStatus::ResearchComplete);
        assert_eq!(llm.calls(), 1);

        let err = planner.generate_options(&trips, &trip.id, "u1").await.unwrap_err();
        assert!(matches!(err, TripError::ResearchNotViewed));
        assert_eq!(llm.calls(), 1);

        trips.mark_research_viewed(&trip.id, "u1").await.unwrap();
        let ready = planner.generate_options(&trips, &trip.id, "u1").await.unwrap();
        assert_eq!(ready.status, TripStatus::OptionsReady);
        assert_eq!(ready.options.unwrap().len(), 2);
        assert!(llm.last_prompt().unwrap().contains("June is peak season"));
    }

    #[tokio::test]
    async fn test_research_retry_after_llm_failure() {
        let dir = TempDir::new().unwrap();
        let pool = crate::db::connect(dir.path().join("p.db")).await.unwrap();
        let trips = TripLifecycle::with_clock(TripStore::new(pool), Arc::new(ManualClock::at_epoch(0)));
        let trip = trips.create("u1", TripIntake::new("JFK", "LHR", "2026-06"), None).await.unwrap();

        let broken = ItineraryPlanner::new(Arc::new(ScriptedLlmClient::new(Vec::<String>::new())));
        let err = broken.run_research(&trips, &trip.id, "u1").await.unwrap_err();
        assert!(matches!(err, TripError::Planner(_)));
        assert_eq!(trips.get(&trip.id, "u1").await.unwrap().status, TripStatus::Researching);

        let planner = ItineraryPlanner::new(Arc::new(ScriptedLlmClient::new(["June is peak season in London."])));
        let researched = planner.run_research(&trips, &trip.id, "u1").await.unwrap();
        assert_eq!(researched.status, TripStatus::ResearchComplete);
        assert_eq!(researched.research_summary.as_deref(), Some("June is peak season in London."));
    }
}
