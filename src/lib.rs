//! Wayfarer - 旅行行程生成后端
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类与时钟
//! - **db**: SQLite 连接池与表结构
//! - **cache**: 查询缓存（内容寻址键、TTL 类别、惰性过期）
//! - **providers**: 航班 / 酒店 / 搜索上游适配与回退编排
//! - **resolver**: 城市 → 机场 / 城市代码解析
//! - **trips**: 行程状态机与研究-优先门禁
//! - **handoff**: 交接文档与顾问报价
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **planner**: 研究摘要、候选方案与方案补全
//! - **api**: HTTP 接口（feature `server`）

#[cfg(feature = "server")]
pub mod api;
pub mod cache;
pub mod config;
pub mod core;
pub mod db;
pub mod handoff;
pub mod llm;
pub mod observability;
pub mod planner;
pub mod providers;
pub mod resolver;
pub mod trips;
pub mod validate;
