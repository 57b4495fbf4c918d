use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "ApiConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "ApiConfig::default_per_page")]
    pub per_page: u32,
    #[serde(default = "ApiConfig::default_page_limit")]
    pub page_limit: u32,
    #[serde(with = "humantime_serde", default = "ApiConfig::default_timeout")]
    pub timeout: Duration,
    #[serde(
        with = "humantime_serde",
        default = "ApiConfig::default_export_poll_interval"
    )]
    pub export_poll_interval: Duration,
    #[serde(default = "ApiConfig::default_export_poll_attempts")]
    pub export_poll_attempts: u32,
}

impl ApiConfig {
    fn default_base_url() -> String {
        String::from("https://data.nasdaq.com/api/v3")
    }

    fn default_per_page() -> u32 {
        10_000
    }

    fn default_page_limit() -> u32 {
        100
    }

    fn default_timeout() -> Duration {
        Duration::from_secs(300)
    }

    fn default_export_poll_interval() -> Duration {
        Duration::from_secs(30)
    }

    fn default_export_poll_attempts() -> u32 {
        20
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: Self::default_base_url(),
            per_page: Self::default_per_page(),
            page_limit: Self::default_page_limit(),
            timeout: Self::default_timeout(),
            export_poll_interval: Self::default_export_poll_interval(),
            export_poll_attempts: Self::default_export_poll_attempts(),
        }
    }
}

// The key never reaches log output.
impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("per_page", &self.per_page)
            .field("page_limit", &self.page_limit)
            .field("timeout", &self.timeout)
            .field("export_poll_interval", &self.export_poll_interval)
            .field("export_poll_attempts", &self.export_poll_attempts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_default() {
        let api = ApiConfig::default();
        assert_eq!(api.base_url, "https://data.nasdaq.com/api/v3");
        assert_eq!(api.per_page, 10_000);
        assert_eq!(api.page_limit, 100);
        assert_eq!(api.timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_debug_redacts_key() {
        let api = ApiConfig {
            api_key: String::from("secret-key"),
            ..ApiConfig::default()
        };
        let out = format!("{:?}", api);
        assert!(!out.contains("secret-key"));
        assert!(out.contains("<redacted>"));
    }
}
