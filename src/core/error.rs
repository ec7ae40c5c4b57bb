//! 错误分类
//!
//! 对应数据获取层与生命周期的五类失败：
//! - 单个供应商不可用（`ProviderError`，在回退链内部就地恢复）
//! - 全部供应商不可用 / 无结果（`FetchError`，交给调用方决定是否重试）
//! - 策略违例（`TripError` / `HandoffError` 中的门禁、校验失败，同步拒绝，不自动重试）
//!
//! 城市解析从不报错，只返回带来源标记的结果，因此这里没有对应类型。

use std::fmt;

use thiserror::Error;

/// 数据获取的能力类别（航班 / 酒店 / 通用搜索）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Flights,
    Hotels,
    Search,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Flights => "flights",
            Capability::Hotels => "hotels",
            Capability::Search => "search",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 查询缓存读写错误
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("cache payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// 单个供应商一次调用的失败
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// 非 2xx、传输失败、响应无法解析
    #[error("provider {provider} unavailable: {reason}")]
    Unavailable { provider: String, reason: String },

    /// 上游正常响应但结果集为空
    #[error("provider {provider} returned no results")]
    NoResults { provider: String },
}

impl ProviderError {
    pub fn unavailable(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    pub fn no_results(provider: impl Into<String>) -> Self {
        Self::NoResults {
            provider: provider.into(),
        }
    }

    pub fn provider(&self) -> &str {
        match self {
            Self::Unavailable { provider, .. } | Self::NoResults { provider } => provider,
        }
    }

    pub fn is_no_results(&self) -> bool {
        matches!(self, Self::NoResults { .. })
    }
}

/// 回退链的最终失败
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// 链中每个供应商都失败（或链为空）；可重试的服务错误
    #[error("all {capability} providers unavailable ({} attempted)", .attempts.len())]
    AllUnavailable {
        capability: Capability,
        attempts: Vec<ProviderError>,
    },

    /// 最后一个供应商正常响应但没有结果；业务上的空缺，不是故障
    #[error("no {capability} results from {provider}")]
    NoResults {
        capability: Capability,
        provider: String,
    },
}

impl FetchError {
    pub fn capability(&self) -> Capability {
        match self {
            Self::AllUnavailable { capability, .. } | Self::NoResults { capability, .. } => {
                *capability
            }
        }
    }

    /// 只有「全部不可用」值得调用方稍后重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AllUnavailable { .. })
    }

    /// HTTP 语义：无结果 404，全部不可用 503
    pub fn status_code(&self) -> u16 {
        match self {
            Self::AllUnavailable { .. } => 503,
            Self::NoResults { .. } => 404,
        }
    }
}

/// 行程生命周期错误
#[derive(Error, Debug)]
pub enum TripError {
    #[error("trip not found: {0}")]
    NotFound(String),

    /// 研究-优先门禁：已有研究摘要但用户尚未查看
    #[error("research must be viewed before generating options")]
    ResearchNotViewed,

    #[error("invalid trip transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("invalid intake: {0}")]
    InvalidIntake(String),

    #[error("invalid option selection: {0}")]
    InvalidOption(String),

    #[error("planner error: {0}")]
    Planner(String),

    #[error("corrupt trip record: {0}")]
    Corrupt(String),

    #[error("trip storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl TripError {
    /// 门禁失败时告知前端需要执行的动作
    pub fn requires_action(&self) -> Option<&'static str> {
        match self {
            Self::ResearchNotViewed => Some("view_research"),
            _ => None,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::ResearchNotViewed => 403,
            Self::InvalidTransition { .. } => 409,
            Self::InvalidIntake(_) | Self::InvalidOption(_) => 422,
            Self::Planner(_) => 502,
            Self::Corrupt(_) | Self::Storage(_) => 500,
        }
    }
}

impl From<serde_json::Error> for TripError {
    fn from(e: serde_json::Error) -> Self {
        Self::Corrupt(e.to_string())
    }
}

/// 交接文档生命周期错误
#[derive(Error, Debug)]
pub enum HandoffError {
    #[error("handoff not found: {0}")]
    NotFound(String),

    #[error("handoff {0} has expired")]
    Expired(String),

    #[error("quote {quote:.2} is below the estimate {estimate:.2}")]
    QuoteBelowEstimate { quote: f64, estimate: f64 },

    #[error("handoff is {current}, cannot {action}")]
    InvalidState { current: String, action: String },

    /// 草稿校验失败（天数序列、聊天时间戳、选中项引用等）
    #[error("malformed handoff: {0}")]
    Malformed(String),

    #[error("corrupt handoff record: {0}")]
    Corrupt(String),

    #[error("handoff storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl HandoffError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Expired(_) => 410,
            Self::QuoteBelowEstimate { .. } | Self::Malformed(_) => 422,
            Self::InvalidState { .. } => 409,
            Self::Corrupt(_) | Self::Storage(_) => 500,
        }
    }
}

impl From<serde_json::Error> for HandoffError {
    fn from(e: serde_json::Error) -> Self {
        Self::Corrupt(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_classification() {
        let all = FetchError::AllUnavailable {
            capability: Capability::Flights,
            attempts: vec![ProviderError::unavailable("amadeus", "HTTP 500")],
        };
        assert!(all.is_retryable());
        assert_eq!(all.status_code(), 503);

        let none = FetchError::NoResults {
            capability: Capability::Hotels,
            provider: "serpapi_hotels".into(),
        };
        assert!(!none.is_retryable());
        assert_eq!(none.status_code(), 404);
        assert_ne!(all, none);
    }

    #[test]
    fn test_gate_requires_action() {
        let err = TripError::ResearchNotViewed;
        assert_eq!(err.requires_action(), Some("view_research"));
        assert_eq!(err.status_code(), 403);
        assert_eq!(TripError::NotFound("t".into()).requires_action(), None);
    }
}
