use crate::config::{Config, ConfigError, ConfigResult};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::info;

/// 配置管理器
#[derive(Debug, Clone)]
pub struct ConfigManager {
    path: PathBuf,
    config: Config,
}

impl ConfigManager {
    /// 加载配置文件
    pub async fn load(path: &Path) -> ConfigResult<Self> {
        let config = if path.exists() {
            info!("Loading config from {:?}", path);
            let content = tokio::fs::read_to_string(path).await?;
            let content = Self::expand_env_vars(&content)?;
            let config: Config = serde_json::from_str(&content)?;
            Self::validate(&config)?;
            config
        } else {
            info!("Config file not found, creating default config at {:?}", path);
            let default_config = Config::default();
            // 确保父目录存在
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            let content = serde_json::to_string_pretty(&default_config)?;
            tokio::fs::write(path, &content).await?;
            default_config
        };

        Ok(Self {
            path: path.to_path_buf(),
            config,
        })
    }

    /// 当前配置
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 验证配置
    pub fn validate(config: &Config) -> ConfigResult<()> {
        if config.server.port == 0 {
            return Err(ConfigError::Validation(
                "Server port cannot be 0".to_string(),
            ));
        }

        if config.relay.max_message_chars == 0 {
            return Err(ConfigError::Validation(
                "Relay max_message_chars must be greater than 0".to_string(),
            ));
        }

        if config.relay.max_connections == 0 {
            return Err(ConfigError::Validation(
                "Relay max_connections must be greater than 0".to_string(),
            ));
        }

        if config.relay.default_room.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Relay default_room cannot be empty".to_string(),
            ));
        }

        if config.relay.event_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Relay event_name cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// 展开环境变量 ${VAR} 或 ${VAR:-default}
    fn expand_env_vars(content: &str) -> ConfigResult<String> {
        static ENV_VAR: OnceLock<Regex> = OnceLock::new();
        let re = ENV_VAR
            .get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid"));

        let mut missing = None;
        let expanded = re.replace_all(content, |caps: &regex::Captures<'_>| {
            let var_expr = &caps[1];

            // 处理 ${VAR:-default} 语法
            let (var_name, default_value) = match var_expr.split_once(":-") {
                Some((name, default)) => (name, Some(default)),
                None => (var_expr, None),
            };

            match (std::env::var(var_name), default_value) {
                (Ok(val), _) => val,
                (Err(_), Some(default)) => default.to_string(),
                (Err(_), None) => {
                    missing.get_or_insert_with(|| var_name.to_string());
                    String::new()
                }
            }
        });

        match missing {
            Some(var_name) => Err(ConfigError::EnvVarNotFound(var_name)),
            None => Ok(expanded.into_owned()),
        }
    }

    /// 获取配置文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_creates_default_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("roomcast.json");

        let manager = ConfigManager::load(&config_path).await.unwrap();
        let config = manager.config().clone();

        assert!(config_path.exists());
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.relay.default_room, "lobby");
    }

    #[tokio::test]
    async fn test_load_existing_config_with_env_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("roomcast.json");
        tokio::fs::write(
            &config_path,
            r#"{"server": {"host": "0.0.0.0", "port": ${ROOMCAST_TEST_UNSET_PORT:-4100}, "static_dir": "public"}}"#,
        )
        .await
        .unwrap();

        let manager = ConfigManager::load(&config_path).await.unwrap();
        let config = manager.config().clone();

        assert_eq!(config.server.port, 4100);
        assert_eq!(config.server.static_dir, "public");
        assert_eq!(config.relay.max_message_chars, 200);
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("roomcast.json");
        tokio::fs::write(&config_path, r#"{"relay": {"max_message_chars": 0}}"#)
            .await
            .unwrap();

        let result = ConfigManager::load(&config_path).await;
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("ROOMCAST_TEST_ROOM", "general");

        let content = r#"{"default_room": "${ROOMCAST_TEST_ROOM}"}"#;
        let expanded = ConfigManager::expand_env_vars(content).unwrap();

        assert_eq!(expanded, r#"{"default_room": "general"}"#);
    }

    #[test]
    fn test_env_var_missing() {
        let content = r#"{"default_room": "${ROOMCAST_TEST_DEFINITELY_UNSET}"}"#;
        let result = ConfigManager::expand_env_vars(content);

        assert!(matches!(
            result,
            Err(ConfigError::EnvVarNotFound(name)) if name == "ROOMCAST_TEST_DEFINITELY_UNSET"
        ));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(ConfigManager::validate(&config).is_err());

        config.server.port = 8080;
        assert!(ConfigManager::validate(&config).is_ok());

        config.relay.default_room = "   ".to_string();
        assert!(ConfigManager::validate(&config).is_err());
    }
}
