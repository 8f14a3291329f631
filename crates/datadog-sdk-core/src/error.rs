// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

/// Errors raised while reading or writing batch and metadata files.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Encryption of non-empty data produced an empty result")]
    EmptyEncryption,

    #[error("Block of type {0:#06x} is larger than the format allows")]
    BlockTooLarge(u16),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised while loading or validating [`crate::config::Config`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value '{value}' for {name}")]
    InvalidValue { name: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised while turning a batch into an intake request.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Invalid intake URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },
}

/// Errors surfaced by [`crate::core::SdkCore`].
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Feature '{0}' is already registered")]
    FeatureAlreadyRegistered(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("SDK core is stopped")]
    Stopped,

    #[error("SDK core must be built from within a Tokio runtime")]
    NoRuntime,
}
