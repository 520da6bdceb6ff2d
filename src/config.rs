use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use thiserror::Error;
use crate::core::{DEFAULT_CHUNK_SIZE, PrivacyStatus, UploaderConfig};
use crate::manifest::JobDefaults;
use crate::utils::{RetryPolicy, RetryStrategy};

/// Looked up in the working directory when `UPLOADER_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "uploader.toml";
pub const CONFIG_ENV: &str = "UPLOADER_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
/// Settings for one run. Every field is optional in the file.
pub struct Config {
    /// OAuth client registration downloaded from the Google Cloud console
    pub client_secret_file: PathBuf,
    /// Where the access/refresh token is persisted between runs
    pub token_file: PathBuf,
    /// Pause between consecutive uploads
    pub pause_secs: u64,
    pub chunk_size: usize,
    /// Timeout for every HTTP request
    pub request_timeout_secs: u64,
    /// Attempts per chunk, including the first
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub category_id: String,
    pub privacy_status: PrivacyStatus,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_secret_file: PathBuf::from("client_secret.json"),
            token_file: PathBuf::from("token.json"),
            pause_secs: 10,
            chunk_size: DEFAULT_CHUNK_SIZE,
            request_timeout_secs: 120,
            max_attempts: 5,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 32_000,
            category_id: "20".to_string(),
            privacy_status: PrivacyStatus::Public,
        }
    }
}

impl Config {
    pub fn from_toml(contents: &str, path: &Path) -> Result<Config, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path`, or defaults when `required` is false and the file is absent.
    pub fn load_from(path: &Path, required: bool) -> Result<Config, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml(&contents, path),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound && !required => {
                Ok(Config::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// `$UPLOADER_CONFIG` if set (must exist), else `./uploader.toml` if present.
    pub fn load() -> Result<Config, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load_from(Path::new(&path), true),
            None => Self::load_from(Path::new(DEFAULT_CONFIG_FILE), false),
        }
    }

    pub fn pause(&self) -> Duration {
        Duration::from_secs(self.pause_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Per-chunk budget: exponential backoff doubling from `initial_backoff_ms`.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            RetryStrategy::Exponential {
                initial: Duration::from_millis(self.initial_backoff_ms),
                multiplier: 2.0,
                max_delay: Duration::from_millis(self.max_backoff_ms),
            },
        )
    }

    pub fn uploader_config(&self, chunk_size: usize) -> UploaderConfig {
        UploaderConfig {
            chunk_size,
            retry: self.retry_policy(),
        }
    }

    pub fn job_defaults(&self) -> JobDefaults {
        JobDefaults {
            category_id: self.category_id.clone(),
            privacy_status: self.privacy_status,
        }
    }
}
