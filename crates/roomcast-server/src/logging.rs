//! 结构化日志模块
//!
//! Installs a `tracing` subscriber with an `EnvFilter` and a plain or JSON
//! fmt layer.

use anyhow::{anyhow, Result};
use roomcast_config::LogLevel;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive: explicit CLI/`RUST_LOG` value, then `--debug`, then config
pub fn resolve_filter(cli_level: Option<&str>, debug: bool, config_level: LogLevel) -> String {
    match cli_level {
        Some(level) if !level.trim().is_empty() => level.to_string(),
        _ if debug => LogLevel::Debug.to_string(),
        _ => config_level.to_string(),
    }
}

/// 构建环境过滤器
pub fn build_filter(directive: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directive).map_err(|e| anyhow!("Invalid log level: {}", e))
}

/// 初始化日志系统
pub fn init_logging(directive: &str, json_format: bool) -> Result<()> {
    let filter = build_filter(directive)?;
    let registry = tracing_subscriber::registry().with(filter);

    if json_format {
        registry
            .with(fmt::layer().json().with_target(true).with_line_number(true))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .try_init()?;
    }

    tracing::info!(
        target: "roomcast_server",
        "Logging initialized with level: {}",
        directive
    );
    Ok(())
}
