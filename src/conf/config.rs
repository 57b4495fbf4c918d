use std::collections::HashMap;
use std::path::PathBuf;

use crate::{
    conf::{ApiConfig, StorageConfig},
    core::SyncError::{self, ConfigError},
};
use config::{Config as CConfig, ConfigBuilder, Environment, FileFormat, builder::DefaultState};
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "LINKSYNC";

/// Plain environment variables honoured for compatibility with older deployments.
/// They only fill in values that no config file or `LINKSYNC_*` variable sets.
const LEGACY_ENV: [(&str, &str); 3] = [
    ("NASDAQ_DATA_LINK_API_KEY", "api.api_key"),
    ("AWS_BUCKET", "storage.bucket"),
    ("AWS_BUCKET_DIR", "storage.prefix"),
];

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default = "Config::default_schemas_dir")]
    pub schemas_dir: PathBuf,
    #[serde(default = "Config::default_work_dir")]
    pub work_dir: PathBuf,
}

impl Config {
    fn default_schemas_dir() -> PathBuf {
        PathBuf::from("schemas")
    }

    fn default_work_dir() -> PathBuf {
        std::env::temp_dir()
    }

    pub fn from_str(toml_str: &str) -> Result<Config, SyncError> {
        let config = CConfig::builder()
            .add_source(config::File::from_str(toml_str, FileFormat::Toml))
            .build()
            .map_err(|e| ConfigError(e.to_string()))?
            .try_deserialize::<Config>()
            .map_err(|e| ConfigError(e.to_string()))?;
        Ok(config)
    }

    /// Load from an optional TOML file plus the process environment, then validate.
    pub fn load(path: Option<&str>) -> Result<Config, SyncError> {
        Self::load_with_env(path, std::env::vars().collect())
    }

    pub fn load_with_env(
        path: Option<&str>,
        env: HashMap<String, String>,
    ) -> Result<Config, SyncError> {
        let mut builder: ConfigBuilder<DefaultState> = CConfig::builder();
        for (var, key) in LEGACY_ENV {
            if let Some(value) = env.get(var).filter(|v| !v.is_empty()) {
                builder = builder.set_default(key, value.as_str())?;
            }
        }
        if let Some(path) = path {
            builder = builder.add_source(config::File::new(path, FileFormat::Toml));
        }
        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(Some(env.into_iter().collect()));

        let config = builder
            .add_source(environment)
            .build()
            .map_err(|e| ConfigError(e.to_string()))?
            .try_deserialize::<Config>()
            .map_err(|e| ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Startup checks; any failure stops the process before a table is touched.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.api.api_key.trim().is_empty() {
            return Err(ConfigError(
                "API key missing: set api.api_key or NASDAQ_DATA_LINK_API_KEY".to_string(),
            ));
        }
        if self.storage.local_root.is_none()
            && self.storage.bucket.as_deref().is_none_or(str::is_empty)
        {
            return Err(ConfigError(
                "bucket missing: set storage.bucket, AWS_BUCKET or storage.local_root".to_string(),
            ));
        }
        if self.api.per_page == 0 {
            return Err(ConfigError("api.per_page must be positive".to_string()));
        }
        if self.api.page_limit == 0 {
            return Err(ConfigError("api.page_limit must be positive".to_string()));
        }
        if self.storage.max_concurrency == 0 {
            return Err(ConfigError(
                "storage.max_concurrency must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
