//! 日志与追踪系统
//! 初始化结构化日志

use crate::config::LoggingConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// 初始化日志与追踪系统
pub fn init_telemetry(config: &LoggingConfig) {
    // 从环境变量构建过滤器
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let log_layer = match config.format.to_lowercase().as_str() {
        "json" => tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
        "pretty" => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    // 重复初始化（例如测试中）时忽略
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(log_layer)
        .try_init();

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        protocol_version = common::version(),
        level = %config.level,
        format = %config.format,
        "Telemetry initialized"
    );
}
