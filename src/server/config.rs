use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Postgres connection string. Without one the server keeps monitors in
    /// memory.
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// Upper bound for one reaction script run.
    #[serde(default = "default_timeout_seconds")]
    pub reaction_timeout_seconds: u64,

    /// Request timeout for notification webhooks.
    #[serde(default = "default_timeout_seconds")]
    pub notify_timeout_seconds: u64,

    /// Shell used for script probes.
    #[serde(default = "default_script_shell")]
    pub script_shell: String,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    database_url: Option<String>,
    log_dir: Option<String>,
    reaction_timeout_seconds: Option<u64>,
    notify_timeout_seconds: Option<u64>,
    #[serde(alias = "monitor_script_shell")]
    script_shell: Option<String>,
}

impl PartialServerConfig {
    // An empty variable counts as unset.
    fn without_blanks(mut self) -> Self {
        let blank = |value: &String| !value.trim().is_empty();
        self.database_url = self.database_url.filter(blank);
        self.log_dir = self.log_dir.filter(blank);
        self.script_shell = self.script_shell.filter(blank);
        self
    }
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_script_shell() -> String {
    "bash".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            log_dir: default_log_dir(),
            reaction_timeout_seconds: default_timeout_seconds(),
            notify_timeout_seconds: default_timeout_seconds(),
            script_shell: default_script_shell(),
        }
    }
}

impl ServerConfig {
    /// Loads `.env`, then the optional TOML file, then lets the process
    /// environment override both.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let env_config = envy::from_env::<PartialServerConfig>()?;
        Self::merge(Self::read_file(config_path)?, env_config)
    }

    fn read_file(config_path: Option<&str>) -> Result<PartialServerConfig, ConfigError> {
        match config_path {
            Some(path_str) if Path::new(path_str).exists() => {
                let contents = fs::read_to_string(path_str).map_err(|source| ConfigError::Read {
                    path: path_str.to_string(),
                    source,
                })?;
                toml::from_str::<PartialServerConfig>(&contents).map_err(|source| {
                    ConfigError::Parse {
                        path: path_str.to_string(),
                        source,
                    }
                })
            }
            _ => Ok(PartialServerConfig::default()),
        }
    }

    fn merge(
        file_config: PartialServerConfig,
        env_config: PartialServerConfig,
    ) -> Result<Self, ConfigError> {
        let env_config = env_config.without_blanks();

        // Environment overrides file
        let config = ServerConfig {
            database_url: env_config.database_url.or(file_config.database_url),
            log_dir: env_config
                .log_dir
                .or(file_config.log_dir)
                .unwrap_or_else(default_log_dir),
            reaction_timeout_seconds: env_config
                .reaction_timeout_seconds
                .or(file_config.reaction_timeout_seconds)
                .unwrap_or_else(default_timeout_seconds),
            notify_timeout_seconds: env_config
                .notify_timeout_seconds
                .or(file_config.notify_timeout_seconds)
                .unwrap_or_else(default_timeout_seconds),
            script_shell: env_config
                .script_shell
                .or(file_config.script_shell)
                .unwrap_or_else(default_script_shell),
        };

        for (name, seconds) in [
            ("reaction_timeout_seconds", config.reaction_timeout_seconds),
            ("notify_timeout_seconds", config.notify_timeout_seconds),
        ] {
            if seconds == 0 {
                return Err(ConfigError::InvalidValue { name, value: "0".to_string() });
            }
        }

        Ok(config)
    }

    pub fn reaction_timeout(&self) -> Duration {
        Duration::from_secs(self.reaction_timeout_seconds)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_seconds)
    }
}
