// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! SDK configuration.
//!
//! [`Config::from_env`] reads `DD_*` environment variables on top of
//! [`Config::default`] and validates the result. Hosts that embed the SDK
//! usually build a [`Config`] directly instead.

pub mod batch;
pub mod site;

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::consent::TrackingConsent;
use crate::error::ConfigError;

pub use batch::{
    BatchProcessingLevel, BatchSize, FilePersistenceConfig, UploadConfiguration, UploadFrequency,
};
pub use site::Site;

const DEFAULT_SOURCE: &str = "android";
const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 10;
const DEFAULT_COMPRESSION_LEVEL: i32 = 3;
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Client token sent as `DD-API-KEY`.
    pub client_token: String,
    pub env: String,
    pub service: String,
    pub version: String,
    pub variant: Option<String>,
    /// Reported as `ddsource` and `DD-EVP-ORIGIN`.
    pub source: String,
    pub site: Site,
    /// Overrides the site intake, mostly for proxies and tests.
    pub custom_endpoint: Option<String>,
    /// Root under which every feature keeps its batch directories.
    pub storage_dir: PathBuf,
    pub batch_size: BatchSize,
    pub upload_frequency: UploadFrequency,
    pub batch_processing_level: BatchProcessingLevel,
    pub tracking_consent: TrackingConsent,
    pub proxy_https: Option<String>,
    pub upload_timeout_secs: u64,
    /// zstd level for request bodies; `None` sends them uncompressed.
    pub compression_level: Option<i32>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_token: String::new(),
            env: String::new(),
            service: String::new(),
            version: String::new(),
            variant: None,
            source: DEFAULT_SOURCE.to_string(),
            site: Site::default(),
            custom_endpoint: None,
            storage_dir: env::temp_dir().join("datadog"),
            batch_size: BatchSize::default(),
            upload_frequency: UploadFrequency::default(),
            batch_processing_level: BatchProcessingLevel::default(),
            tracking_consent: TrackingConsent::Pending,
            proxy_https: None,
            upload_timeout_secs: DEFAULT_UPLOAD_TIMEOUT_SECS,
            compression_level: Some(DEFAULT_COMPRESSION_LEVEL),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let client_token =
            env::var("DD_CLIENT_TOKEN").map_err(|_| ConfigError::Missing("DD_CLIENT_TOKEN"))?;
        let compression_level = match env::var("DD_SDK_COMPRESSION_LEVEL") {
            Ok(val) => {
                let level = parse_var::<i32>("DD_SDK_COMPRESSION_LEVEL", &val)?;
                (level > 0).then_some(level)
            }
            Err(_) => defaults.compression_level,
        };

        let config = Self {
            client_token,
            env: env::var("DD_ENV").unwrap_or(defaults.env),
            service: env::var("DD_SERVICE").unwrap_or(defaults.service),
            version: env::var("DD_VERSION").unwrap_or(defaults.version),
            variant: env::var("DD_VARIANT").ok().filter(|v| !v.is_empty()),
            source: env::var("DD_SOURCE").unwrap_or(defaults.source),
            site: from_env_or("DD_SITE", defaults.site)?,
            custom_endpoint: env::var("DD_CUSTOM_ENDPOINT").ok(),
            storage_dir: env::var("DD_SDK_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_dir),
            batch_size: from_env_or("DD_BATCH_SIZE", defaults.batch_size)?,
            upload_frequency: from_env_or("DD_UPLOAD_FREQUENCY", defaults.upload_frequency)?,
            batch_processing_level: from_env_or(
                "DD_BATCH_PROCESSING_LEVEL",
                defaults.batch_processing_level,
            )?,
            tracking_consent: from_env_or("DD_TRACKING_CONSENT", defaults.tracking_consent)?,
            proxy_https: env::var("DD_PROXY_HTTPS")
                .or_else(|_| env::var("HTTPS_PROXY"))
                .ok(),
            upload_timeout_secs: from_env_or("DD_UPLOAD_TIMEOUT", defaults.upload_timeout_secs)?,
            compression_level,
            log_level: env::var("DD_LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_token.trim().is_empty() {
            return Err(ConfigError::Missing("DD_CLIENT_TOKEN"));
        }

        if self.source.trim().is_empty() {
            return Err(ConfigError::Invalid("source cannot be empty".to_string()));
        }

        if self.upload_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "upload timeout must be greater than 0".to_string(),
            ));
        }

        if let Some(level) = self.compression_level {
            if !zstd::compression_level_range().contains(&level) {
                return Err(ConfigError::InvalidValue {
                    name: "DD_SDK_COMPRESSION_LEVEL",
                    value: level.to_string(),
                });
            }
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    pub fn persistence_config(&self) -> FilePersistenceConfig {
        FilePersistenceConfig {
            recent_delay_ms: self.batch_size.window_duration_ms(),
            ..FilePersistenceConfig::default()
        }
    }

    pub fn upload_configuration(&self) -> UploadConfiguration {
        UploadConfiguration {
            frequency: self.upload_frequency,
            batch_processing_level: self.batch_processing_level,
        }
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}

fn from_env_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(val) => parse_var(name, &val),
        Err(_) => Ok(default),
    }
}

fn parse_var<T: FromStr>(name: &'static str, val: &str) -> Result<T, ConfigError> {
    val.parse::<T>().map_err(|_| ConfigError::InvalidValue {
        name,
        value: val.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 10] = [
        "DD_CLIENT_TOKEN",
        "DD_SITE",
        "DD_BATCH_SIZE",
        "DD_UPLOAD_FREQUENCY",
        "DD_BATCH_PROCESSING_LEVEL",
        "DD_TRACKING_CONSENT",
        "DD_SDK_COMPRESSION_LEVEL",
        "DD_SDK_STORAGE_DIR",
        "DD_LOG_LEVEL",
        "DD_VARIANT",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    fn valid_config() -> Config {
        Config {
            client_token: "pub-token".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config_needs_token() {
        assert!(matches!(
            Config::default().validate(),
            Err(ConfigError::Missing("DD_CLIENT_TOKEN"))
        ));
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let config = Config {
            log_level: "loud".to_string(),
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_compression_level() {
        let config = Config {
            compression_level: Some(1_000),
            ..valid_config()
        };
        assert!(config.validate().is_err());

        let config = Config {
            compression_level: None,
            ..valid_config()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_derived_settings() {
        let config = Config {
            batch_size: BatchSize::Large,
            upload_frequency: UploadFrequency::Rare,
            batch_processing_level: BatchProcessingLevel::Low,
            ..valid_config()
        };
        assert_eq!(config.persistence_config().recent_delay_ms, 15_000);
        assert_eq!(config.upload_configuration().frequency.base_step_ms(), 5_000);
        assert_eq!(config.upload_configuration().max_batches_per_upload_job(), 1);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        env::set_var("DD_CLIENT_TOKEN", "pub-abc");
        env::set_var("DD_SITE", "eu1");
        env::set_var("DD_BATCH_SIZE", "small");
        env::set_var("DD_TRACKING_CONSENT", "granted");
        env::set_var("DD_SDK_COMPRESSION_LEVEL", "0");
        env::set_var("DD_SDK_STORAGE_DIR", "/var/lib/dd");
        env::set_var("DD_LOG_LEVEL", "DEBUG");
        env::set_var("DD_VARIANT", "");

        let config = Config::from_env().unwrap();
        assert_eq!(config.client_token, "pub-abc");
        assert_eq!(config.site, Site::Eu1);
        assert_eq!(config.batch_size, BatchSize::Small);
        assert_eq!(config.tracking_consent, TrackingConsent::Granted);
        assert_eq!(config.compression_level, None);
        assert_eq!(config.storage_dir, PathBuf::from("/var/lib/dd"));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.variant, None);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_missing_token() {
        clear_env();
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Missing("DD_CLIENT_TOKEN"))
        ));
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_values() {
        clear_env();
        env::set_var("DD_CLIENT_TOKEN", "pub-abc");
        env::set_var("DD_UPLOAD_FREQUENCY", "hourly");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidValue {
                name: "DD_UPLOAD_FREQUENCY",
                ..
            })
        ));
        clear_env();
    }
}
