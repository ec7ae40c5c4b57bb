//! 上游 HTTP 公共部分：客户端构建与响应检查

use std::time::Duration;

use reqwest::{Client, Response};
use serde_json::Value;

use crate::core::ProviderError;

const USER_AGENT: &str = concat!("wayfarer/", env!("CARGO_PKG_VERSION"));

/// 带超时与 UA 的客户端；构建失败时退回默认客户端
pub fn build_client(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_default()
}

/// 非 2xx、传输错误、非 JSON 响应都视为不可用
pub async fn read_json(provider: &str, resp: Result<Response, reqwest::Error>) -> Result<Value, ProviderError> {
    let resp = resp.map_err(|e| ProviderError::unavailable(provider, format!("request failed: {}", e)))?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ProviderError::unavailable(
            provider,
            format!("HTTP {}: {}", status, preview(&body)),
        ));
    }
    resp.json::<Value>()
        .await
        .map_err(|e| ProviderError::unavailable(provider, format!("invalid JSON body: {}", e)))
}

/// 上游数字字段可能是数字也可能是字符串（如 "123.45"）
pub fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn preview(body: &str) -> String {
    if body.chars().count() > 200 {
        format!("{}...", body.chars().take(200).collect::<String>())
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_as_f64_accepts_strings_and_numbers() {
        assert_eq!(as_f64(&json!("123.45")), Some(123.45));
        assert_eq!(as_f64(&json!(99)), Some(99.0));
        assert_eq!(as_f64(&json!(null)), None);
        assert_eq!(as_f64(&json!("n/a")), None);
    }
}
