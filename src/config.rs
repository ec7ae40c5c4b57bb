//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `WAYFARER__*` 覆盖（双下划线表示嵌套，如 `WAYFARER__PROVIDERS__TIMEOUT_SECS=20`）。
//! 供应商密钥未写入配置时回退到各自的常规环境变量（`AMADEUS_CLIENT_ID` 等）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub providers: ProvidersSection,
    pub cache: CacheSection,
    pub handoff: HandoffSection,
    pub llm: LlmSection,
}

/// [app] 段：应用名、数据库路径、监听地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    pub database_path: PathBuf,
    pub bind_addr: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            database_path: PathBuf::from("data/wayfarer.db"),
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

/// [providers] 段：上游超时与各供应商凭据
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProvidersSection {
    /// 单次上游 HTTP 调用超时（秒）
    pub timeout_secs: u64,
    pub amadeus: AmadeusSection,
    pub serpapi: SerpApiSection,
    pub tavily: TavilySection,
}

impl Default for ProvidersSection {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            amadeus: AmadeusSection::default(),
            serpapi: SerpApiSection::default(),
            tavily: TavilySection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AmadeusSection {
    pub base_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl Default for AmadeusSection {
    fn default() -> Self {
        Self {
            base_url: "https://test.api.amadeus.com".to_string(),
            client_id: None,
            client_secret: None,
        }
    }
}

impl AmadeusSection {
    /// (client_id, client_secret)；任一缺失返回 None
    pub fn credentials(&self) -> Option<(String, String)> {
        let id = non_empty(self.client_id.clone()).or_else(|| env_non_empty("AMADEUS_CLIENT_ID"))?;
        let secret = non_empty(self.client_secret.clone())
            .or_else(|| env_non_empty("AMADEUS_CLIENT_SECRET"))?;
        Some((id, secret))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SerpApiSection {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for SerpApiSection {
    fn default() -> Self {
        Self {
            base_url: "https://serpapi.com".to_string(),
            api_key: None,
        }
    }
}

impl SerpApiSection {
    pub fn api_key(&self) -> Option<String> {
        non_empty(self.api_key.clone()).or_else(|| env_non_empty("SERPAPI_API_KEY"))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TavilySection {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for TavilySection {
    fn default() -> Self {
        Self {
            base_url: "https://api.tavily.com".to_string(),
            api_key: None,
        }
    }
}

impl TavilySection {
    pub fn api_key(&self) -> Option<String> {
        non_empty(self.api_key.clone()).or_else(|| env_non_empty("TAVILY_API_KEY"))
    }
}

/// [cache] 段：各 TTL 类别（秒）与启动时是否清扫过期条目
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub flights_ttl_secs: i64,
    pub hotels_ttl_secs: i64,
    pub search_ttl_secs: i64,
    pub city_match_ttl_secs: i64,
    pub city_fallback_ttl_secs: i64,
    pub sweep_on_start: bool,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            flights_ttl_secs: 24 * 3600,
            hotels_ttl_secs: 24 * 3600,
            search_ttl_secs: 7 * 24 * 3600,
            city_match_ttl_secs: 7 * 24 * 3600,
            city_fallback_ttl_secs: 24 * 3600,
            sweep_on_start: false,
        }
    }
}

/// [handoff] 段：交接文档有效期与聊天记录上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HandoffSection {
    pub expiry_days: i64,
    pub max_chat_history: usize,
}

impl Default for HandoffSection {
    fn default() -> Self {
        Self {
            expiry_days: 30,
            max_chat_history: 100,
        }
    }
}

/// [llm] 段：OpenAI 兼容端点
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub base_url: Option<String>,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: None,
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

impl LlmSection {
    pub fn api_key(&self) -> Option<String> {
        non_empty(self.api_key.clone()).or_else(|| env_non_empty("OPENAI_API_KEY"))
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

fn env_non_empty(name: &str) -> Option<String> {
    non_empty(std::env::var(name).ok())
}

/// 从 config 目录加载配置，环境变量 WAYFARER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 WAYFARER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("WAYFARER")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_ttl_classes() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.cache.flights_ttl_secs, 86_400);
        assert_eq!(cfg.cache.hotels_ttl_secs, 86_400);
        assert_eq!(cfg.cache.search_ttl_secs, 604_800);
        assert_eq!(cfg.cache.city_match_ttl_secs, 604_800);
        assert_eq!(cfg.cache.city_fallback_ttl_secs, 86_400);
        assert_eq!(cfg.handoff.expiry_days, 30);
        assert_eq!(cfg.handoff.max_chat_history, 100);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[providers]\ntimeout_secs = 5\n\n[handoff]\nexpiry_days = 7\n",
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.providers.timeout_secs, 5);
        assert_eq!(cfg.handoff.expiry_days, 7);
        assert_eq!(cfg.handoff.max_chat_history, 100);
        assert_eq!(cfg.providers.serpapi.base_url, "https://serpapi.com");
    }
}
