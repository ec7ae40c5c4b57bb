//! 日志初始化：EnvFilter（默认 info，可用 RUST_LOG 覆盖）+ fmt 输出

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 进程内只调用一次；重复调用时忽略（测试中多次初始化不报错）
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}
