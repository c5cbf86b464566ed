pub mod config;
pub mod manager;

pub use config::{
    Config, ConfigError, ConfigResult, LogLevel, LoggingConfig, RelayConfig, ServerConfig,
};
pub use manager::ConfigManager;

use std::path::PathBuf;

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "roomcast.json";

/// 展开路径中的 ~ 为用户主目录
pub fn expand_tilde(path: &str) -> Option<PathBuf> {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir().map(|home| home.join(rest))
    } else {
        Some(PathBuf::from(path))
    }
}

/// Loads `.env` from the working directory or its parents.
///
/// A missing file is not an error; the returned path is `None` in that case.
pub fn load_dotenv() -> ConfigResult<Option<PathBuf>> {
    match dotenv::dotenv() {
        Ok(path) => {
            tracing::debug!("Loaded environment from {:?}", path);
            Ok(Some(path))
        }
        Err(dotenv::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
