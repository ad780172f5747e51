use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_PORT: u16 = 10000;
const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

// Settings for the upstream market-data provider
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    pub history_range: String,
    pub request_timeout_secs: u64,
    pub random_agent: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            history_range: "5y".to_string(),
            request_timeout_secs: 30,
            random_agent: true,
        }
    }
}

// Per-IP limits applied to the dashboard route; per_second == 0 disables limiting
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub per_second: u64,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: 10,
            burst_size: 20,
        }
    }
}

impl RateLimitConfig {
    pub fn is_enabled(&self) -> bool {
        self.per_second > 0 && self.burst_size > 0
    }
}

// YAML-serializable configuration structure
#[derive(Serialize, Deserialize, Debug)]
pub struct ConfigYaml {
    pub node_name: Option<String>,
    pub environment: Option<String>,
    pub port: Option<u16>,
    pub provider: Option<ProviderConfig>,
    pub rate_limit: Option<RateLimitConfig>,
    pub chart_font_path: Option<PathBuf>,
}

// Holds application-wide settings
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub node_name: String,
    pub environment: String,
    pub port: u16,
    pub provider: ProviderConfig,
    pub rate_limit: RateLimitConfig,
    pub chart_font_path: Option<PathBuf>,
}

impl AppConfig {
    // Load configuration from YAML file or environment variables
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(config_file) = env::var("CONFIG_FILE") {
            Self::from_yaml(&config_file)
        } else {
            dotenvy::dotenv().ok(); // Load .env file if present
            Ok(Self::from_env())
        }
    }

    pub fn from_yaml(file_path: &str) -> Result<Self, ConfigError> {
        let yaml_content = fs::read_to_string(file_path).map_err(|source| ConfigError::Read {
            path: file_path.to_string(),
            source,
        })?;
        Self::from_yaml_str(&yaml_content)
    }

    pub fn from_yaml_str(yaml_content: &str) -> Result<Self, ConfigError> {
        let yaml_config: ConfigYaml = serde_yaml::from_str(yaml_content)?;

        Ok(Self {
            node_name: yaml_config
                .node_name
                .unwrap_or_else(|| "stock-dashboard".to_string()),
            environment: yaml_config
                .environment
                .unwrap_or_else(|| "development".to_string()),
            port: yaml_config.port.unwrap_or(DEFAULT_PORT),
            provider: yaml_config.provider.unwrap_or_default(),
            rate_limit: yaml_config.rate_limit.unwrap_or_default(),
            chart_font_path: yaml_config.chart_font_path,
        })
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    // Values that fail to parse fall back to their defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let provider_defaults = ProviderConfig::default();
        let provider = ProviderConfig {
            base_url: lookup("PROVIDER_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(provider_defaults.base_url),
            history_range: lookup("HISTORY_RANGE").unwrap_or(provider_defaults.history_range),
            request_timeout_secs: parse_var(&lookup, "REQUEST_TIMEOUT_SECS")
                .unwrap_or(provider_defaults.request_timeout_secs),
            random_agent: parse_var(&lookup, "RANDOM_USER_AGENT").unwrap_or(provider_defaults.random_agent),
        };

        let limit_defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            per_second: parse_var(&lookup, "RATE_LIMIT_PER_SECOND").unwrap_or(limit_defaults.per_second),
            burst_size: parse_var(&lookup, "RATE_LIMIT_BURST").unwrap_or(limit_defaults.burst_size),
        };

        Self {
            node_name: lookup("NODE_NAME").unwrap_or_else(|| "stock-dashboard".to_string()),
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            port: parse_var(&lookup, "PORT").unwrap_or(DEFAULT_PORT),
            provider,
            rate_limit,
            chart_font_path: lookup("CHART_FONT_PATH").map(PathBuf::from),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.request_timeout_secs)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|s| s.trim().parse().ok())
}
