//! 交接文档：行程上下文的冻结快照，交给旅行顾问报价

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::HandoffError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Pending,
    Quoted,
    Booked,
    Cancelled,
}

impl QuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteStatus::Pending => "pending",
            QuoteStatus::Quoted => "quoted",
            QuoteStatus::Booked => "booked",
            QuoteStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuoteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QuoteStatus::Pending),
            "quoted" => Ok(QuoteStatus::Quoted),
            "booked" => Ok(QuoteStatus::Booked),
            "cancelled" => Ok(QuoteStatus::Cancelled),
            other => Err(format!("unknown quote status: {}", other)),
        }
    }
}

/// 一条对话记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightChoice {
    pub id: String,
    /// 例如 "JFK → LHR (nonstop)"
    pub route: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    pub price_low_usd: f64,
    pub price_high_usd: f64,
    pub provider: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotelChoice {
    pub id: String,
    pub city: String,
    pub name: String,
    pub nightly_low_usd: f64,
    pub nightly_high_usd: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub star_rating: Option<f32>,
    pub provider: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPlan {
    /// 从 1 开始连续编号
    pub day: u32,
    pub city: String,
    #[serde(default)]
    pub activities: Vec<String>,
}

/// 创建交接文档的输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffDraft {
    pub trip_id: String,
    pub user_id: String,
    #[serde(default)]
    pub chat_history: Vec<ChatEntry>,
    #[serde(default)]
    pub research_summary: Option<String>,
    #[serde(default)]
    pub user_preferences: Value,
    #[serde(default)]
    pub all_flight_options: Vec<FlightChoice>,
    #[serde(default)]
    pub selected_flight_id: Option<String>,
    #[serde(default)]
    pub all_hotel_options: Vec<HotelChoice>,
    #[serde(default)]
    pub selected_hotel_ids: Vec<String>,
    pub daily_itinerary: Vec<DayPlan>,
    pub total_estimate_usd: f64,
}

impl HandoffDraft {
    /// 截断聊天记录到最近 `max_chat` 条，然后校验各项不变量
    pub fn normalized(mut self, max_chat: usize) -> Result<Self, HandoffError> {
        if self.chat_history.len() > max_chat {
            let drop = self.chat_history.len() - max_chat;
            self.chat_history.drain(..drop);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), HandoffError> {
        let malformed = |msg: String| Err(HandoffError::Malformed(msg));

        if self
            .chat_history
            .windows(2)
            .any(|w| w[1].timestamp < w[0].timestamp)
        {
            return malformed("chat history timestamps must be non-decreasing".to_string());
        }

        for (i, plan) in self.daily_itinerary.iter().enumerate() {
            let expected = i as u32 + 1;
            if plan.day != expected {
                return malformed(format!("day {} found where day {} expected", plan.day, expected));
            }
        }

        if let Some(flight_id) = &self.selected_flight_id {
            if !self.all_flight_options.iter().any(|f| &f.id == flight_id) {
                return malformed(format!("selected flight {} is not among the options", flight_id));
            }
        }

        for hotel_id in &self.selected_hotel_ids {
            if !self.all_hotel_options.iter().any(|h| &h.id == hotel_id) {
                return malformed(format!("selected hotel {} is not among the options", hotel_id));
            }
        }

        if !self.total_estimate_usd.is_finite() || self.total_estimate_usd < 0.0 {
            return malformed(format!("invalid total estimate {}", self.total_estimate_usd));
        }
        Ok(())
    }
}

/// 持久化的交接文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffDocument {
    pub id: String,
    pub trip_id: String,
    pub user_id: String,
    pub chat_history: Vec<ChatEntry>,
    pub research_summary: Option<String>,
    pub user_preferences: Value,
    pub all_flight_options: Vec<FlightChoice>,
    pub selected_flight_id: Option<String>,
    pub all_hotel_options: Vec<HotelChoice>,
    pub selected_hotel_ids: Vec<String>,
    pub daily_itinerary: Vec<DayPlan>,
    pub total_estimate_usd: f64,
    pub margin_percent: Option<f64>,
    pub agent_id: Option<String>,
    pub agent_quote_usd: Option<f64>,
    pub quote_status: QuoteStatus,
    pub created_at: DateTime<Utc>,
    pub quoted_at: Option<DateTime<Utc>>,
    /// created_at + 有效期，创建时确定，之后不变
    pub expires_at: DateTime<Utc>,
}

impl HandoffDocument {
    pub fn from_draft(id: String, draft: HandoffDraft, created_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            id,
            trip_id: draft.trip_id,
            user_id: draft.user_id,
            chat_history: draft.chat_history,
            research_summary: draft.research_summary,
            user_preferences: draft.user_preferences,
            all_flight_options: draft.all_flight_options,
            selected_flight_id: draft.selected_flight_id,
            all_hotel_options: draft.all_hotel_options,
            selected_hotel_ids: draft.selected_hotel_ids,
            daily_itinerary: draft.daily_itinerary,
            total_estimate_usd: draft.total_estimate_usd,
            margin_percent: None,
            agent_id: None,
            agent_quote_usd: None,
            quote_status: QuoteStatus::Pending,
            created_at,
            quoted_at: None,
            expires_at,
        }
    }

    /// 严格晚于 expires_at 才算过期
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// 报价相对估价的利润率（百分比）；估价为 0 时记 0
pub fn margin_percent(quote: f64, estimate: f64) -> f64 {
    if estimate <= 0.0 {
        return 0.0;
    }
    (quote - estimate) * 100.0 / estimate
}
