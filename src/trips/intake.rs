//! 结构化行程需求及其校验

use serde::{Deserialize, Serialize};

use crate::core::TripError;
use crate::validate::{is_date, is_iata_code, is_month};

/// 最长行程天数
pub const MAX_TRIP_NIGHTS: u32 = 60;

/// 消费档次（封闭枚举，未知值在反序列化时即被拒绝）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Budget,
    #[default]
    Moderate,
    Premium,
    Luxury,
}

/// 活动强度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Relaxed,
    #[default]
    Balanced,
    Active,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripIntake {
    #[serde(alias = "from")]
    pub origin: String,
    #[serde(alias = "to")]
    pub destination: String,
    /// YYYY-MM
    pub month: String,
    /// YYYY-MM-DD
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default = "default_travelers")]
    pub travelers: u32,
    #[serde(default = "default_nights")]
    pub nights: u32,
    #[serde(default)]
    pub tier: Tier,
    #[serde(default)]
    pub activity: ActivityLevel,
    /// 兴趣、限制等自由文本
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

fn default_travelers() -> u32 {
    1
}

fn default_nights() -> u32 {
    7
}

impl TripIntake {
    pub fn new(origin: impl Into<String>, destination: impl Into<String>, month: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
            month: month.into(),
            start_date: None,
            travelers: default_travelers(),
            nights: default_nights(),
            tier: Tier::default(),
            activity: ActivityLevel::default(),
            notes: None,
        }
    }

    pub fn validate(&self) -> Result<(), TripError> {
        let invalid = |msg: String| Err(TripError::InvalidIntake(msg));
        if !is_iata_code(&self.origin) {
            return invalid(format!("origin must be a 3-letter uppercase code: {}", self.origin));
        }
        if !is_iata_code(&self.destination) {
            return invalid(format!("destination must be a 3-letter uppercase code: {}", self.destination));
        }
        if !is_month(&self.month) {
            return invalid(format!("month must be YYYY-MM: {}", self.month));
        }
        if let Some(date) = &self.start_date {
            if !is_date(date) {
                return invalid(format!("start_date must be YYYY-MM-DD: {}", date));
            }
            if !date.starts_with(&self.month) {
                return invalid(format!("start_date {} is outside {}", date, self.month));
            }
        }
        if self.travelers == 0 {
            return invalid("travelers must be at least 1".to_string());
        }
        if self.nights == 0 || self.nights > MAX_TRIP_NIGHTS {
            return invalid(format!("nights must be between 1 and {}", MAX_TRIP_NIGHTS));
        }
        Ok(())
    }

    /// 出发日期；未指定时取当月 15 日
    pub fn departure_date(&self) -> String {
        self.start_date
            .clone()
            .unwrap_or_else(|| format!("{}-15", self.month))
    }
}
