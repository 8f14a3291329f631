// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-feature storage limits, intake and runtime state.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{BatchSize, Config, FilePersistenceConfig, UploadConfiguration};
use crate::storage::consent_aware::ConsentAwareStorage;
use crate::upload::{
    DataFlusher, DataUploadWorker, DataUploader, IntakeRequestFactory, RequestFactory,
};

pub const LOGS_FEATURE_NAME: &str = "logs";
pub const RUM_FEATURE_NAME: &str = "rum";
pub const TRACING_FEATURE_NAME: &str = "tracing";
pub const SESSION_REPLAY_FEATURE_NAME: &str = "session-replay";

const KIB: u64 = 1_024;
const MIB: u64 = 1_024 * KIB;
const HOUR_MS: u64 = 60 * 60 * 1_000;

/// Storage limits a feature puts on top of the SDK-wide persistence settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeatureStorageConfiguration {
    pub max_item_size: u64,
    pub max_items_per_batch: usize,
    pub max_batch_size: u64,
    pub old_batch_threshold_ms: u64,
    /// Overrides [`Config::batch_size`] for this feature.
    pub batch_size: Option<BatchSize>,
    /// Overrides [`Config::upload_configuration`] for this feature.
    pub upload_configuration: Option<UploadConfiguration>,
}

impl Default for FeatureStorageConfiguration {
    fn default() -> Self {
        Self {
            max_item_size: 512 * KIB,
            max_items_per_batch: 500,
            max_batch_size: 4 * MIB,
            old_batch_threshold_ms: 18 * HOUR_MS,
            batch_size: None,
            upload_configuration: None,
        }
    }
}

impl FeatureStorageConfiguration {
    pub fn logs() -> Self {
        Self::default()
    }

    pub fn rum() -> Self {
        Self::default()
    }

    pub fn tracing() -> Self {
        Self::default()
    }

    /// Records are large and few per batch.
    pub fn session_replay() -> Self {
        Self {
            max_item_size: 10 * MIB,
            max_items_per_batch: 15,
            max_batch_size: 10 * MIB,
            old_batch_threshold_ms: 5 * HOUR_MS,
            ..Self::default()
        }
    }

    pub fn persistence_config(&self, base: FilePersistenceConfig) -> FilePersistenceConfig {
        FilePersistenceConfig {
            recent_delay_ms: self
                .batch_size
                .map_or(base.recent_delay_ms, |size| size.window_duration_ms()),
            max_batch_size: self.max_batch_size,
            max_item_size: self.max_item_size,
            max_items_per_batch: self.max_items_per_batch,
            old_file_threshold_ms: self.old_batch_threshold_ms,
            ..base
        }
    }
}

/// What [`crate::core::SdkCore::register_feature`] needs to know about a feature.
#[derive(Clone, Debug)]
pub struct FeatureConfiguration {
    pub name: String,
    pub storage: FeatureStorageConfiguration,
    pub request_factory: Arc<dyn RequestFactory>,
}

impl FeatureConfiguration {
    pub fn new(
        name: impl Into<String>,
        storage: FeatureStorageConfiguration,
        request_factory: Arc<dyn RequestFactory>,
    ) -> Self {
        Self {
            name: name.into(),
            storage,
            request_factory,
        }
    }

    pub fn logs(config: &Config) -> Self {
        Self::intake(
            LOGS_FEATURE_NAME,
            FeatureStorageConfiguration::logs(),
            IntakeRequestFactory::logs(),
            config,
        )
    }

    pub fn rum(config: &Config) -> Self {
        Self::intake(
            RUM_FEATURE_NAME,
            FeatureStorageConfiguration::rum(),
            IntakeRequestFactory::rum(),
            config,
        )
    }

    pub fn tracing(config: &Config) -> Self {
        Self::intake(
            TRACING_FEATURE_NAME,
            FeatureStorageConfiguration::tracing(),
            IntakeRequestFactory::spans(),
            config,
        )
    }

    pub fn session_replay(config: &Config) -> Self {
        Self::intake(
            SESSION_REPLAY_FEATURE_NAME,
            FeatureStorageConfiguration::session_replay(),
            IntakeRequestFactory::session_replay(),
            config,
        )
    }

    fn intake(
        name: &str,
        storage: FeatureStorageConfiguration,
        factory: IntakeRequestFactory,
        config: &Config,
    ) -> Self {
        Self::new(
            name,
            storage,
            Arc::new(factory.with_custom_endpoint(config.custom_endpoint.clone())),
        )
    }
}

pub fn pending_dir_name(feature: &str) -> String {
    format!("{feature}-pending-v2")
}

pub fn granted_dir_name(feature: &str) -> String {
    format!("{feature}-v2")
}

pub(crate) fn feature_dirs(root: &Path, feature: &str) -> (PathBuf, PathBuf) {
    (
        root.join(pending_dir_name(feature)),
        root.join(granted_dir_name(feature)),
    )
}

/// A registered feature: its storage, uploader and background upload worker.
pub struct SdkFeature {
    name: String,
    storage: Arc<ConsentAwareStorage>,
    flusher: DataFlusher,
    uploader: Arc<dyn DataUploader>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SdkFeature {
    pub(crate) fn new(
        name: String,
        storage: Arc<ConsentAwareStorage>,
        flusher: DataFlusher,
        uploader: Arc<dyn DataUploader>,
    ) -> Self {
        Self {
            name,
            storage,
            flusher,
            uploader,
            cancel: CancellationToken::new(),
            worker: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage(&self) -> &Arc<ConsentAwareStorage> {
        &self.storage
    }

    #[allow(clippy::expect_used)]
    pub(crate) fn start_upload(&self, worker: DataUploadWorker, runtime: &Handle) {
        let handle = runtime.spawn(worker.run(self.cancel.clone()));
        *self.worker.lock().expect("lock poisoned") = Some(handle);
    }

    /// Cancels the upload worker without waiting for it.
    pub(crate) fn cancel_upload(&self) {
        self.cancel.cancel();
    }

    /// Cancels the upload worker and waits for an in-flight run to finish.
    #[allow(clippy::expect_used)]
    pub(crate) async fn stop_upload(&self) {
        self.cancel.cancel();
        let handle = self.worker.lock().expect("lock poisoned").take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("CORE | {} | Upload worker ended abnormally: {e}", self.name);
            }
        }
    }

    /// Uploads and deletes every granted batch once.
    pub(crate) async fn flush(&self) -> usize {
        let flushed = self.flusher.flush(self.uploader.as_ref()).await;
        debug!("CORE | {} | Flushed {flushed} batches", self.name);
        flushed
    }
}

impl fmt::Debug for SdkFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkFeature")
            .field("name", &self.name)
            .field("storage", &self.storage)
            .field("stopped", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_replay_limits() {
        let base = FilePersistenceConfig::default();
        let config = FeatureStorageConfiguration::session_replay().persistence_config(base);
        assert_eq!(config.max_item_size, 10 * MIB);
        assert_eq!(config.max_items_per_batch, 15);
        assert_eq!(config.old_file_threshold_ms, 5 * HOUR_MS);
        assert_eq!(config.recent_delay_ms, base.recent_delay_ms);
        assert_eq!(config.max_disk_space, base.max_disk_space);
    }

    #[test]
    fn test_batch_size_override() {
        let storage = FeatureStorageConfiguration {
            batch_size: Some(BatchSize::Small),
            ..FeatureStorageConfiguration::logs()
        };
        assert_eq!(
            storage
                .persistence_config(FilePersistenceConfig::default())
                .recent_delay_ms,
            1_000
        );
    }

    #[test]
    fn test_feature_directories() {
        let (pending, granted) = feature_dirs(Path::new("/data"), RUM_FEATURE_NAME);
        assert_eq!(pending, Path::new("/data/rum-pending-v2"));
        assert_eq!(granted, Path::new("/data/rum-v2"));
    }

    #[test]
    fn test_feature_configurations() {
        let config = Config::default();
        let names: Vec<String> = [
            FeatureConfiguration::logs(&config),
            FeatureConfiguration::rum(&config),
            FeatureConfiguration::tracing(&config),
            FeatureConfiguration::session_replay(&config),
        ]
        .into_iter()
        .map(|feature| feature.name)
        .collect();
        assert_eq!(names, ["logs", "rum", "tracing", "session-replay"]);
    }
}
