// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Entry point tying configuration, consent, storage and upload together.
//!
//! ```rust,ignore
//! let core = SdkCore::builder(Config::from_env()?).build()?;
//! core.register_feature(FeatureConfiguration::logs(core.config()))?;
//! let logs = core.writer::<serde_json::Value>("logs").ok_or("no logs feature")?;
//! logs.write(&serde_json::json!({"message": "hello"}));
//! core.set_tracking_consent(TrackingConsent::Granted);
//! // ...
//! core.flush_and_stop().await;
//! ```

use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::config::Config;
use crate::consent::{TrackingConsent, TrackingConsentListener, TrackingConsentProvider};
use crate::context::{ContextProvider, DatadogContext};
use crate::error::CoreError;
use crate::feature::{feature_dirs, FeatureConfiguration, SdkFeature};
use crate::http::get_client;
use crate::storage::consent_aware::{ConsentAwareStorage, FileDataProcessor};
use crate::storage::encryption::Encryption;
use crate::storage::format::batch_file_reader_writer;
use crate::storage::metadata::BatchMetadataReaderWriter;
use crate::storage::migrator::ConsentAwareFileMigrator;
use crate::storage::orchestrator::{BatchFileOrchestrator, FileOrchestrator};
use crate::storage::Storage;
use crate::system::{
    NetworkInfo, NetworkInfoProvider, StaticInfoProvider, SystemInfo, SystemInfoProvider,
};
use crate::time::{SystemTimeProvider, TimeProvider};
use crate::upload::{DataFlusher, DataUploadWorker, DataUploader, HttpDataUploader};
use crate::writer::BatchDataWriter;

#[derive(Debug)]
pub struct SdkCoreBuilder {
    config: Config,
    time_provider: Option<Arc<dyn TimeProvider>>,
    system_info: Option<Arc<dyn SystemInfoProvider>>,
    network_info: Option<Arc<dyn NetworkInfoProvider>>,
    encryption: Option<Arc<dyn Encryption>>,
}

impl SdkCoreBuilder {
    #[must_use]
    pub fn with_time_provider(mut self, provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = Some(provider);
        self
    }

    #[must_use]
    pub fn with_system_info_provider(mut self, provider: Arc<dyn SystemInfoProvider>) -> Self {
        self.system_info = Some(provider);
        self
    }

    #[must_use]
    pub fn with_network_info_provider(mut self, provider: Arc<dyn NetworkInfoProvider>) -> Self {
        self.network_info = Some(provider);
        self
    }

    /// Encrypts batch and metadata files of every feature.
    #[must_use]
    pub fn with_encryption(mut self, encryption: Arc<dyn Encryption>) -> Self {
        self.encryption = Some(encryption);
        self
    }

    /// Must be called from within a Tokio runtime; upload workers are spawned on it.
    pub fn build(self) -> Result<SdkCore, CoreError> {
        self.config.validate()?;
        let runtime = Handle::try_current().map_err(|_| CoreError::NoRuntime)?;
        let client = get_client(&self.config)?;

        let context_provider = Arc::new(ContextProvider::new(DatadogContext::from_config(
            &self.config,
        )));
        let consent_provider = Arc::new(TrackingConsentProvider::new(
            self.config.tracking_consent,
        ));
        consent_provider.register_listener(Arc::new(ContextConsentListener(Arc::clone(
            &context_provider,
        ))));

        debug!(
            "CORE | SDK core built for site {} with consent {}",
            self.config.site, self.config.tracking_consent
        );

        Ok(SdkCore {
            config: self.config,
            context_provider,
            consent_provider,
            time_provider: self
                .time_provider
                .unwrap_or_else(|| Arc::new(SystemTimeProvider)),
            system_info: self
                .system_info
                .unwrap_or_else(|| Arc::new(StaticInfoProvider::new(SystemInfo::default()))),
            network_info: self
                .network_info
                .unwrap_or_else(|| Arc::new(StaticInfoProvider::new(NetworkInfo::default()))),
            encryption: self.encryption,
            client,
            runtime,
            features: Mutex::new(HashMap::new()),
            stopped: AtomicBool::new(false),
        })
    }
}

pub struct SdkCore {
    config: Config,
    context_provider: Arc<ContextProvider>,
    consent_provider: Arc<TrackingConsentProvider>,
    time_provider: Arc<dyn TimeProvider>,
    system_info: Arc<dyn SystemInfoProvider>,
    network_info: Arc<dyn NetworkInfoProvider>,
    encryption: Option<Arc<dyn Encryption>>,
    client: reqwest::Client,
    runtime: Handle,
    features: Mutex<HashMap<String, Arc<SdkFeature>>>,
    stopped: AtomicBool,
}

impl SdkCore {
    pub fn builder(config: Config) -> SdkCoreBuilder {
        SdkCoreBuilder {
            config,
            time_provider: None,
            system_info: None,
            network_info: None,
            encryption: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn context(&self) -> DatadogContext {
        self.context_provider.context()
    }

    /// Creates the feature's storage and starts its upload worker.
    #[allow(clippy::expect_used)]
    pub fn register_feature(
        &self,
        configuration: FeatureConfiguration,
    ) -> Result<Arc<SdkFeature>, CoreError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(CoreError::Stopped);
        }
        let mut features = self.features.lock().expect("lock poisoned");
        if features.contains_key(&configuration.name) {
            return Err(CoreError::FeatureAlreadyRegistered(configuration.name));
        }

        let name = configuration.name.clone();
        let persistence = configuration
            .storage
            .persistence_config(self.config.persistence_config());
        let upload_configuration = configuration
            .storage
            .upload_configuration
            .unwrap_or_else(|| self.config.upload_configuration());
        let (pending_dir, granted_dir) = feature_dirs(&self.config.storage_dir, &name);

        let reader_writer = batch_file_reader_writer(self.encryption.clone());
        let metadata_reader_writer = BatchMetadataReaderWriter::new(self.encryption.clone());
        let orchestrator = |dir: PathBuf| -> Arc<dyn FileOrchestrator> {
            Arc::new(BatchFileOrchestrator::new(
                dir,
                persistence,
                Arc::clone(&self.time_provider),
            ))
        };
        let granted_orchestrator = orchestrator(granted_dir);
        let processor = |orchestrator: Arc<dyn FileOrchestrator>| {
            FileDataProcessor::new(
                orchestrator,
                Arc::clone(&reader_writer),
                metadata_reader_writer.clone(),
                persistence.max_item_size,
            )
        };

        let storage = Arc::new(ConsentAwareStorage::new(
            name.clone(),
            processor(orchestrator(pending_dir)),
            processor(Arc::clone(&granted_orchestrator)),
            ConsentAwareFileMigrator::default(),
            self.consent_provider.consent(),
        ));
        storage.attach(&self.consent_provider);

        let flusher = DataFlusher::new(
            Arc::clone(&self.context_provider),
            granted_orchestrator,
            Arc::clone(&reader_writer),
            metadata_reader_writer.clone(),
        );
        let uploader: Arc<dyn DataUploader> = Arc::new(HttpDataUploader::new(
            self.client.clone(),
            configuration.request_factory,
            self.config.compression_level,
        ));
        let worker = DataUploadWorker::new(
            name.clone(),
            Arc::clone(&storage) as Arc<dyn Storage>,
            Arc::clone(&uploader),
            Arc::clone(&self.context_provider),
            Arc::clone(&self.network_info),
            Arc::clone(&self.system_info),
            upload_configuration,
        );

        let feature = Arc::new(SdkFeature::new(name.clone(), storage, flusher, uploader));
        feature.start_upload(worker, &self.runtime);
        features.insert(name.clone(), Arc::clone(&feature));

        info!("CORE | Feature {name} registered");
        Ok(feature)
    }

    #[allow(clippy::expect_used)]
    pub fn feature(&self, name: &str) -> Option<Arc<SdkFeature>> {
        self.features.lock().expect("lock poisoned").get(name).cloned()
    }

    /// Typed writer on a registered feature's storage.
    pub fn writer<T: Serialize>(&self, feature: &str) -> Option<BatchDataWriter<T>> {
        self.feature(feature)
            .map(|feature| BatchDataWriter::new(Arc::clone(feature.storage()) as Arc<dyn Storage>))
    }

    /// Updates the context and migrates every feature's buffered data.
    pub fn set_tracking_consent(&self, consent: TrackingConsent) {
        self.consent_provider.set_consent(consent);
    }

    pub fn tracking_consent(&self) -> TrackingConsent {
        self.consent_provider.consent()
    }

    /// Deletes every buffered batch of every feature, whatever the consent.
    pub fn clear_all_data(&self) {
        for feature in self.all_features() {
            feature.storage().drop_all();
        }
        info!("CORE | All buffered data cleared");
    }

    /// Stops every upload worker, then uploads what is left in the granted
    /// batches once. Returns the number of batches flushed.
    pub async fn flush_and_stop(&self) -> usize {
        self.stopped.store(true, Ordering::SeqCst);
        let features = self.all_features();

        for feature in &features {
            feature.stop_upload().await;
        }
        let mut flushed = 0;
        for feature in &features {
            flushed += feature.flush().await;
        }
        self.consent_provider.unregister_all();

        info!("CORE | SDK core stopped, {flushed} batches flushed");
        flushed
    }

    /// Stops every upload worker without flushing; buffered data stays on disk.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        for feature in self.all_features() {
            feature.cancel_upload();
        }
        self.consent_provider.unregister_all();
        info!("CORE | SDK core stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    #[allow(clippy::expect_used)]
    fn all_features(&self) -> Vec<Arc<SdkFeature>> {
        self.features
            .lock()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for SdkCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkCore")
            .field("config", &self.config)
            .field("consent", &self.tracking_consent())
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

struct ContextConsentListener(Arc<ContextProvider>);

impl TrackingConsentListener for ContextConsentListener {
    fn on_consent_updated(&self, _previous: TrackingConsent, new: TrackingConsent) {
        self.0.update(|context| context.tracking_consent = new);
    }
}
