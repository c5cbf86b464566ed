use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use roomcast_config::{Config, ConfigManager};
use roomcast_gateway::Gateway;

mod logging;

use logging::{init_logging, resolve_filter};

#[derive(Parser, Debug, Clone)]
#[command(name = "roomcast-server")]
#[command(about = "Room-scoped WebSocket chat relay")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, env = "DEBUG", default_value = "false")]
    debug: bool,

    /// Bind host (overrides config)
    #[arg(long, env = "ROOMCAST_HOST")]
    host: Option<String>,

    /// Server port (overrides config)
    #[arg(long, env = "PORT", value_parser = parse_port)]
    port: Option<u16>,

    /// Static file directory (overrides config)
    #[arg(long, env = "ROOMCAST_STATIC_DIR")]
    static_dir: Option<String>,

    /// Log level or filter directive (overrides config)
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Config file path
    #[arg(long, env = "ROOMCAST_CONFIG", default_value = roomcast_config::DEFAULT_CONFIG_FILE)]
    config: String,
}

/// Port number, optionally written as `:8080`
fn parse_port(s: &str) -> Result<u16, String> {
    let s = s.trim();
    let digits = s.strip_prefix(':').unwrap_or(s);
    digits
        .parse::<u16>()
        .map_err(|e| format!("invalid port {:?}: {}", s, e))
}

impl Cli {
    /// CLI 参数覆盖配置文件
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(ref host) = self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(ref dir) = self.static_dir {
            config.server.static_dir = dir.clone();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env has to be in the environment before clap reads `env = ...` values
    let dotenv = roomcast_config::load_dotenv();

    let cli = Cli::parse();

    let config_path = roomcast_config::expand_tilde(&cli.config)
        .unwrap_or_else(|| PathBuf::from(&cli.config));
    let config_manager = ConfigManager::load(&config_path)
        .await
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    let mut config = config_manager.config().clone();
    cli.apply_overrides(&mut config);
    ConfigManager::validate(&config).context("Invalid configuration")?;

    let filter = resolve_filter(cli.log_level.as_deref(), cli.debug, config.logging.level);
    init_logging(&filter, config.logging.json_format)?;

    match dotenv {
        Ok(Some(path)) => tracing::info!("Loaded environment from {:?}", path),
        Ok(None) => tracing::debug!("No .env file found"),
        Err(e) => tracing::warn!("Failed to load .env: {}", e),
    }

    tracing::info!("Config loaded from {:?}", config_manager.path());
    tracing::info!("Starting Roomcast server on {}", config.bind_addr());
    tracing::info!("  Static dir: {}", config.server.static_dir);
    tracing::info!("  Default room: {}", config.relay.default_room);
    tracing::info!("  Max connections: {}", config.relay.max_connections);
    tracing::debug!("  Relay config: {:?}", config.relay);

    let gateway = Gateway::from_config(&config);
    if !gateway.handler().clock().is_resolved() {
        tracing::warn!(
            "Time zone {:?} could not be resolved, timestamps will be zero",
            config.relay.timezone
        );
    }

    gateway.run().await?;
    Ok(())
}
