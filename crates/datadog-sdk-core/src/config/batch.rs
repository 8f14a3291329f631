// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batching and upload cadence settings.

use std::str::FromStr;

use crate::error::ConfigError;

/// How long a batch file keeps accepting writes before a new one is started.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BatchSize {
    Small,
    #[default]
    Medium,
    Large,
}

impl BatchSize {
    pub fn window_duration_ms(&self) -> u64 {
        match self {
            BatchSize::Small => 1_000,
            BatchSize::Medium => 5_000,
            BatchSize::Large => 15_000,
        }
    }
}

impl FromStr for BatchSize {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "small" => Ok(BatchSize::Small),
            "medium" => Ok(BatchSize::Medium),
            "large" => Ok(BatchSize::Large),
            _ => Err(ConfigError::InvalidValue {
                name: "DD_BATCH_SIZE",
                value: s.to_string(),
            }),
        }
    }
}

/// Base step of the upload scheduler; delays are multiples of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum UploadFrequency {
    Frequent,
    #[default]
    Average,
    Rare,
}

impl UploadFrequency {
    pub fn base_step_ms(&self) -> u64 {
        match self {
            UploadFrequency::Frequent => 500,
            UploadFrequency::Average => 1_000,
            UploadFrequency::Rare => 5_000,
        }
    }
}

impl FromStr for UploadFrequency {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "frequent" => Ok(UploadFrequency::Frequent),
            "average" => Ok(UploadFrequency::Average),
            "rare" => Ok(UploadFrequency::Rare),
            _ => Err(ConfigError::InvalidValue {
                name: "DD_UPLOAD_FREQUENCY",
                value: s.to_string(),
            }),
        }
    }
}

/// Maximum number of batches a single upload run may send back to back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BatchProcessingLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl BatchProcessingLevel {
    pub fn max_batches_per_upload_job(&self) -> usize {
        match self {
            BatchProcessingLevel::Low => 1,
            BatchProcessingLevel::Medium => 10,
            BatchProcessingLevel::High => 100,
        }
    }
}

impl FromStr for BatchProcessingLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(BatchProcessingLevel::Low),
            "medium" => Ok(BatchProcessingLevel::Medium),
            "high" => Ok(BatchProcessingLevel::High),
            _ => Err(ConfigError::InvalidValue {
                name: "DD_BATCH_PROCESSING_LEVEL",
                value: s.to_string(),
            }),
        }
    }
}

/// Limits enforced by [`crate::storage::orchestrator::BatchFileOrchestrator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilePersistenceConfig {
    /// Age below which a batch is still written to and not yet readable.
    pub recent_delay_ms: u64,
    pub max_batch_size: u64,
    pub max_item_size: u64,
    pub max_items_per_batch: usize,
    pub old_file_threshold_ms: u64,
    pub max_disk_space: u64,
    pub cleanup_frequency_threshold_ms: u64,
}

impl Default for FilePersistenceConfig {
    fn default() -> Self {
        Self {
            recent_delay_ms: BatchSize::default().window_duration_ms(),
            max_batch_size: 4 * 1_024 * 1_024,
            max_item_size: 512 * 1_024,
            max_items_per_batch: 500,
            old_file_threshold_ms: 18 * 60 * 60 * 1_000,
            max_disk_space: 128 * 1_024 * 1_024,
            cleanup_frequency_threshold_ms: 5_000,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct UploadConfiguration {
    pub frequency: UploadFrequency,
    pub batch_processing_level: BatchProcessingLevel,
}

impl UploadConfiguration {
    pub fn max_batches_per_upload_job(&self) -> usize {
        self.batch_processing_level.max_batches_per_upload_job()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("LARGE".parse::<BatchSize>().unwrap(), BatchSize::Large);
        assert_eq!(
            "Frequent".parse::<UploadFrequency>().unwrap(),
            UploadFrequency::Frequent
        );
        assert_eq!(
            "high".parse::<BatchProcessingLevel>().unwrap(),
            BatchProcessingLevel::High
        );
        assert!("huge".parse::<BatchSize>().is_err());
    }

    #[test]
    fn test_defaults() {
        let persistence = FilePersistenceConfig::default();
        assert_eq!(persistence.recent_delay_ms, 5_000);
        assert_eq!(persistence.max_items_per_batch, 500);

        let upload = UploadConfiguration::default();
        assert_eq!(upload.frequency.base_step_ms(), 1_000);
        assert_eq!(upload.max_batches_per_upload_job(), 10);
    }
}
