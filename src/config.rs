use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::services::resolver::{LoadBalanceStrategy, ResolverConfig};

/// 默认配置文件路径，可通过 `DISCOVERY_CONFIG` 覆盖
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// 环境变量前缀
pub const ENV_PREFIX: &str = "DISCOVERY_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid environment override: {0}")]
    Env(#[from] envy::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node: NodeConfig,
    pub discovery: DiscoveryConfig,
    pub heartbeat: HeartbeatConfig,
    pub resolver: ResolverConfig,
}

/// 本节点的服务信息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub service_name: String,
    pub host: String,
    pub port: u16,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            service_name: "metadata".to_string(),
            host: "localhost".to_string(),
            port: 8081,
        }
    }
}

impl NodeConfig {
    pub fn host_port(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// 存活窗口秒数
    pub liveness_window_secs: u64,
    /// 过期实例的删除阈值秒数，不设置则过期实例一直保留
    pub reap_after_secs: Option<u64>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            liveness_window_secs: 5,
            reap_after_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub interval_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { interval_secs: 1 }
    }
}

// 环境变量覆盖项，例如 DISCOVERY_PORT=9000
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    service_name: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    liveness_window_secs: Option<u64>,
    reap_after_secs: Option<u64>,
    heartbeat_interval_secs: Option<u64>,
    resolver_strategy: Option<LoadBalanceStrategy>,
    request_timeout_secs: Option<u64>,
}

impl Config {
    /// 加载配置：`.env` -> 配置文件（不存在则使用默认值）-> 环境变量覆盖 -> 校验
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let path = std::env::var(format!("{ENV_PREFIX}CONFIG"))
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = if Path::new(&path).exists() {
            Self::from_file(&path)?
        } else {
            tracing::info!(path = %path, "Config file not found, using defaults");
            Self::default()
        };

        let overrides = envy::prefixed(ENV_PREFIX).from_env::<EnvOverrides>()?;
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config_str = fs::read_to_string(path)?;
        Self::from_toml(&config_str)
    }

    pub fn from_toml(config_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(config_str)?)
    }

    /// 从键值对迭代器读取环境变量覆盖（便于测试）
    pub fn apply_env_iter<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let overrides = envy::prefixed(ENV_PREFIX).from_iter::<_, EnvOverrides>(vars)?;
        self.apply_overrides(overrides);
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: EnvOverrides) {
        if let Some(service_name) = overrides.service_name {
            self.node.service_name = service_name;
        }
        if let Some(host) = overrides.host {
            self.node.host = host;
        }
        if let Some(port) = overrides.port {
            self.node.port = port;
        }
        if let Some(window) = overrides.liveness_window_secs {
            self.discovery.liveness_window_secs = window;
        }
        if overrides.reap_after_secs.is_some() {
            self.discovery.reap_after_secs = overrides.reap_after_secs;
        }
        if let Some(interval) = overrides.heartbeat_interval_secs {
            self.heartbeat.interval_secs = interval;
        }
        if let Some(strategy) = overrides.resolver_strategy {
            self.resolver.strategy = strategy;
        }
        if overrides.request_timeout_secs.is_some() {
            self.resolver.request_timeout_secs = overrides.request_timeout_secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.service_name.is_empty() {
            return Err(ConfigError::Invalid("node.service_name cannot be empty".into()));
        }
        if self.heartbeat.interval_secs == 0 {
            return Err(ConfigError::Invalid("heartbeat.interval_secs must be positive".into()));
        }

        let window = self.liveness_window();
        let interval = self.heartbeat_interval();
        if window <= interval {
            return Err(ConfigError::Invalid(format!(
                "discovery.liveness_window_secs ({}) must be greater than heartbeat.interval_secs ({})",
                window.as_secs(),
                interval.as_secs()
            )));
        }
        if interval.checked_mul(5).is_none_or(|min_window| window < min_window) {
            tracing::warn!(
                liveness_window_secs = window.as_secs(),
                heartbeat_interval_secs = interval.as_secs(),
                "Liveness window is less than 5 heartbeat periods, instances may flap"
            );
        }

        if let Some(reap_after) = self.reap_after()
            && reap_after < window
        {
            return Err(ConfigError::Invalid(format!(
                "discovery.reap_after_secs ({}) must not be less than the liveness window ({})",
                reap_after.as_secs(),
                window.as_secs()
            )));
        }
        Ok(())
    }

    pub fn liveness_window(&self) -> Duration {
        Duration::from_secs(self.discovery.liveness_window_secs)
    }

    pub fn reap_after(&self) -> Option<Duration> {
        self.discovery.reap_after_secs.map(Duration::from_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat.interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.liveness_window(), Duration::from_secs(5));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(1));
        assert_eq!(config.reap_after(), None);
        assert_eq!(config.node.host_port(), "localhost:8081");
    }

    #[test]
    fn test_parse_toml() {
        let config = Config::from_toml(
            r#"
            [node]
            service_name = "movie"
            port = 8083

            [discovery]
            liveness_window_secs = 10
            reap_after_secs = 60

            [resolver]
            strategy = "random"
            request_timeout_secs = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.node.service_name, "movie");
        assert_eq!(config.node.host_port(), "localhost:8083");
        assert_eq!(config.liveness_window(), Duration::from_secs(10));
        assert_eq!(config.reap_after(), Some(Duration::from_secs(60)));
        assert_eq!(config.heartbeat.interval_secs, 1);
        assert_eq!(config.resolver.strategy, LoadBalanceStrategy::Random);
        assert_eq!(config.resolver.request_timeout(), Some(Duration::from_secs(3)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_invalid_toml() {
        let err = Config::from_toml("[discovery]\nliveness_window_secs = \"five\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_iter(vars(&[
                ("DISCOVERY_SERVICE_NAME", "rating"),
                ("DISCOVERY_PORT", "8082"),
                ("DISCOVERY_HEARTBEAT_INTERVAL_SECS", "2"),
                ("DISCOVERY_LIVENESS_WINDOW_SECS", "12"),
                ("DISCOVERY_RESOLVER_STRATEGY", "random"),
                ("UNRELATED", "ignored"),
            ]))
            .unwrap();

        assert_eq!(config.node.service_name, "rating");
        assert_eq!(config.node.port, 8082);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(2));
        assert_eq!(config.liveness_window(), Duration::from_secs(12));
        assert_eq!(config.resolver.strategy, LoadBalanceStrategy::Random);
    }

    #[test]
    fn test_env_override_bad_value() {
        let mut config = Config::default();
        let err = config
            .apply_env_iter(vars(&[("DISCOVERY_PORT", "not-a-port")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env(_)));
    }

    #[test]
    fn test_window_must_exceed_heartbeat_interval() {
        let mut config = Config::default();
        config.heartbeat.interval_secs = 5;

        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_reap_after_must_cover_window() {
        let mut config = Config::default();
        config.discovery.reap_after_secs = Some(3);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.discovery.reap_after_secs = Some(30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_huge_heartbeat_interval_does_not_overflow() {
        let mut config = Config::default();
        config.heartbeat.interval_secs = u64::MAX / 4;
        config.discovery.liveness_window_secs = u64::MAX;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_service_name_rejected() {
        let mut config = Config::default();
        config.node.service_name.clear();
        assert!(config.validate().is_err());
    }
}
