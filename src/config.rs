//! Application configuration from the environment (with `.env` support).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::service::processor::MetadataRefreshPolicy;
use crate::service::retry::DEFAULT_RETRY_DELAY;

pub const DEFAULT_DB_PATH: &str = "offers.db";
pub const DEFAULT_MAILBOX: &str = "INBOX";
pub const DEFAULT_REMOTE_TABLE: &str = "offers";
pub const DEFAULT_FETCH_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Sqlite { path: PathBuf },
    Remote { base_url: String, token: String, table: String },
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AiProvider {
    #[default]
    Gemini,
    OpenAi,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiConfig {
    pub provider: AiProvider,
    /// Absent key is not a configuration error: analysis reports `no_api_key`.
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

/// Top-level configuration for the pipeline binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub log_level: String,
    pub storage: StorageConfig,
    pub ai: AiConfig,
    pub fetch_proxy_url: Option<String>,
    pub fetch_delay: Duration,
    pub maildrop_dir: Option<PathBuf>,
    pub mailbox: String,
    pub sources_file: Option<PathBuf>,
    /// `None` runs the pipeline once.
    pub interval: Option<Duration>,
    pub metadata_refresh: MetadataRefreshPolicy,
    pub retry_delay: Duration,
    /// Candidate criteria for the qualification prompt.
    pub criteria: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is required when {reason}")]
    Missing { var: &'static str, reason: &'static str },

    #[error("{var} has invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl AppConfig {
    /// Read the process environment after loading `.env`, if present.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key/value source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let storage = match get("RADAR_STORAGE").as_deref().unwrap_or("sqlite") {
            "sqlite" => StorageConfig::Sqlite {
                path: PathBuf::from(get("RADAR_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.into())),
            },
            "remote" => StorageConfig::Remote {
                base_url: get("RADAR_REMOTE_URL").ok_or(ConfigError::Missing {
                    var: "RADAR_REMOTE_URL",
                    reason: "RADAR_STORAGE=remote",
                })?,
                token: get("RADAR_REMOTE_TOKEN").ok_or(ConfigError::Missing {
                    var: "RADAR_REMOTE_TOKEN",
                    reason: "RADAR_STORAGE=remote",
                })?,
                table: get("RADAR_REMOTE_TABLE").unwrap_or_else(|| DEFAULT_REMOTE_TABLE.into()),
            },
            "memory" => StorageConfig::Memory,
            other => {
                return Err(ConfigError::Invalid {
                    var: "RADAR_STORAGE",
                    value: other.to_string(),
                    reason: "expected sqlite, remote or memory".into(),
                })
            }
        };

        let provider = match get("RADAR_AI_PROVIDER").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("gemini") => AiProvider::Gemini,
            Some("openai") => AiProvider::OpenAi,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "RADAR_AI_PROVIDER",
                    value: other.to_string(),
                    reason: "expected gemini or openai".into(),
                })
            }
        };

        let metadata_refresh = match get("RADAR_METADATA_REFRESH") {
            Some(value) => MetadataRefreshPolicy::from_str(&value).map_err(|reason| {
                ConfigError::Invalid {
                    var: "RADAR_METADATA_REFRESH",
                    value,
                    reason,
                }
            })?,
            None => MetadataRefreshPolicy::default(),
        };

        Ok(Self {
            log_level: get("RADAR_LOG_LEVEL").unwrap_or_else(|| "info".into()),
            storage,
            ai: AiConfig {
                provider,
                api_key: get("RADAR_AI_API_KEY"),
                model: get("RADAR_AI_MODEL"),
                base_url: get("RADAR_AI_BASE_URL"),
            },
            fetch_proxy_url: get("RADAR_FETCH_PROXY_URL"),
            fetch_delay: parse_millis("RADAR_FETCH_DELAY_MS", get("RADAR_FETCH_DELAY_MS"))?
                .unwrap_or(DEFAULT_FETCH_DELAY),
            maildrop_dir: get("RADAR_MAILDROP_DIR").map(PathBuf::from),
            mailbox: get("RADAR_MAILBOX").unwrap_or_else(|| DEFAULT_MAILBOX.into()),
            sources_file: get("RADAR_SOURCES_FILE").map(PathBuf::from),
            interval: parse_secs("RADAR_INTERVAL_SECS", get("RADAR_INTERVAL_SECS"))?,
            metadata_refresh,
            retry_delay: parse_millis("RADAR_RETRY_DELAY_MS", get("RADAR_RETRY_DELAY_MS"))?
                .unwrap_or(DEFAULT_RETRY_DELAY),
            criteria: get("RADAR_CRITERIA"),
        })
    }
}

fn parse_u64(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|e| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_millis(var: &'static str, value: Option<String>) -> Result<Option<Duration>, ConfigError> {
    value
        .map(|v| parse_u64(var, &v).map(Duration::from_millis))
        .transpose()
}

fn parse_secs(var: &'static str, value: Option<String>) -> Result<Option<Duration>, ConfigError> {
    match value {
        None => Ok(None),
        Some(v) => match parse_u64(var, &v)? {
            0 => Err(ConfigError::Invalid {
                var,
                value: v,
                reason: "interval must be positive".into(),
            }),
            secs => Ok(Some(Duration::from_secs(secs))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_env_missing() {
        let config = config(&[]).unwrap();

        assert_eq!(config.log_level, "info");
        assert_eq!(
            config.storage,
            StorageConfig::Sqlite { path: PathBuf::from(DEFAULT_DB_PATH) }
        );
        assert_eq!(config.ai.provider, AiProvider::Gemini);
        assert_eq!(config.ai.api_key, None);
        assert_eq!(config.mailbox, "INBOX");
        assert_eq!(config.interval, None);
        assert_eq!(config.metadata_refresh, MetadataRefreshPolicy::Keep);
        assert_eq!(config.retry_delay, Duration::from_millis(2000));
        assert_eq!(config.fetch_delay, DEFAULT_FETCH_DELAY);
    }

    #[test]
    fn test_remote_storage_requires_url_and_token() {
        let err = config(&[("RADAR_STORAGE", "remote"), ("RADAR_REMOTE_TOKEN", "t")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Missing { var: "RADAR_REMOTE_URL", reason: "RADAR_STORAGE=remote" }
        );

        let config = config(&[
            ("RADAR_STORAGE", "remote"),
            ("RADAR_REMOTE_URL", "https://tables.example/v0/app"),
            ("RADAR_REMOTE_TOKEN", "t"),
        ])
        .unwrap();
        assert_eq!(
            config.storage,
            StorageConfig::Remote {
                base_url: "https://tables.example/v0/app".into(),
                token: "t".into(),
                table: "offers".into(),
            }
        );
    }

    #[test]
    fn test_invalid_values_name_the_variable() {
        let err = config(&[("RADAR_INTERVAL_SECS", "soon")]).unwrap_err();
        assert!(err.to_string().starts_with("RADAR_INTERVAL_SECS"));

        let err = config(&[("RADAR_INTERVAL_SECS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "RADAR_INTERVAL_SECS", .. }));

        let err = config(&[("RADAR_STORAGE", "postgres")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "RADAR_STORAGE", .. }));

        let err = config(&[("RADAR_METADATA_REFRESH", "always")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "RADAR_METADATA_REFRESH", .. }));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("RADAR_AI_PROVIDER", "OpenAI"),
            ("RADAR_AI_API_KEY", "sk-1"),
            ("RADAR_INTERVAL_SECS", "3600"),
            ("RADAR_METADATA_REFRESH", "overwrite"),
            ("RADAR_RETRY_DELAY_MS", "10"),
            ("RADAR_MAILDROP_DIR", "/var/spool/radar"),
            ("RADAR_LOG_LEVEL", "  "),
        ])
        .unwrap();

        assert_eq!(config.ai.provider, AiProvider::OpenAi);
        assert_eq!(config.ai.api_key.as_deref(), Some("sk-1"));
        assert_eq!(config.interval, Some(Duration::from_secs(3600)));
        assert_eq!(config.metadata_refresh, MetadataRefreshPolicy::Overwrite);
        assert_eq!(config.retry_delay, Duration::from_millis(10));
        assert_eq!(config.maildrop_dir, Some(PathBuf::from("/var/spool/radar")));
        assert_eq!(config.log_level, "info");
    }
}
