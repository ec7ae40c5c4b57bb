//! 行程记录与状态

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::intake::TripIntake;

/// 行程状态；只能前进，不能回退
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Intake,
    Researching,
    ResearchComplete,
    OptionsReady,
    OptionSelected,
    AbReady,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Intake => "intake",
            TripStatus::Researching => "researching",
            TripStatus::ResearchComplete => "research_complete",
            TripStatus::OptionsReady => "options_ready",
            TripStatus::OptionSelected => "option_selected",
            TripStatus::AbReady => "ab_ready",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            TripStatus::Intake => 0,
            TripStatus::Researching => 1,
            TripStatus::ResearchComplete => 2,
            TripStatus::OptionsReady => 3,
            TripStatus::OptionSelected => 4,
            TripStatus::AbReady => 5,
        }
    }

    /// 向前跳跃允许（没有研究步骤的行程可直接从 intake 到 options_ready）；
    /// 同状态重入只允许 options_ready（重新生成选项）
    pub fn can_advance_to(&self, next: TripStatus) -> bool {
        next.rank() > self.rank() || (*self == next && next == TripStatus::OptionsReady)
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TripStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intake" => Ok(TripStatus::Intake),
            "researching" => Ok(TripStatus::Researching),
            "research_complete" => Ok(TripStatus::ResearchComplete),
            "options_ready" => Ok(TripStatus::OptionsReady),
            "option_selected" => Ok(TripStatus::OptionSelected),
            "ab_ready" => Ok(TripStatus::AbReady),
            other => Err(format!("unknown trip status: {}", other)),
        }
    }
}

/// 选项中的一站
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityStop {
    pub name: String,
    /// ISO 国家代码
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    pub nights: u32,
}

/// 一个候选行程方案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripOption {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub cities: Vec<CityStop>,
    #[serde(default)]
    pub estimate_usd: f64,
}

impl TripOption {
    pub fn total_nights(&self) -> u32 {
        self.cities.iter().map(|c| c.nights).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: String,
    pub user_id: String,
    pub template_id: Option<String>,
    pub intake: TripIntake,
    pub research_summary: Option<String>,
    /// 单向锁存：置为 true 后不会再变回 false
    pub research_viewed: bool,
    pub options: Option<Vec<TripOption>>,
    /// 选中方案；交接就绪后替换为补全后的行程
    pub itinerary: Option<Value>,
    pub status: TripStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    /// 研究-优先门禁：没有研究摘要的行程不受限
    pub fn can_generate_options(&self) -> bool {
        self.research_viewed || self.research_summary.is_none()
    }
}
