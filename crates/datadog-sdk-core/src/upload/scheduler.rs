// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic upload of granted batches with an adaptive delay.
//!
//! The delay between runs starts at `DEFAULT_DELAY_FACTOR × step`, where `step`
//! comes from [`UploadFrequency`](crate::config::UploadFrequency), and stays
//! within `[MIN_DELAY_FACTOR × step, MAX_DELAY_FACTOR × step]`. Each run that
//! delivers a batch shortens it by 10%; failures and idle runs lengthen it by
//! 10%; a DNS failure jumps straight to the maximum.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::UploadConfiguration;
use crate::context::ContextProvider;
use crate::storage::Storage;
use crate::system::{NetworkInfoProvider, SystemInfoProvider};
use crate::upload::status::UploadStatus;
use crate::upload::uploader::DataUploader;

pub const MIN_DELAY_FACTOR: u64 = 1;
pub const DEFAULT_DELAY_FACTOR: u64 = 5;
pub const MAX_DELAY_FACTOR: u64 = 10;
pub const DECREASE_PERCENT: f64 = 0.90;
pub const INCREASE_PERCENT: f64 = 1.10;

/// What a single [`DataUploadWorker::run_once`] did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Network or device not ready, nothing attempted.
    NotReady,
    /// No batch was ready for upload.
    NoBatch,
    /// Batches attempted during the run, and the status of the last one.
    Uploaded {
        batches: usize,
        last_status: UploadStatus,
    },
}

pub struct DataUploadWorker {
    feature: String,
    storage: Arc<dyn Storage>,
    uploader: Arc<dyn DataUploader>,
    context_provider: Arc<ContextProvider>,
    network_info: Arc<dyn NetworkInfoProvider>,
    system_info: Arc<dyn SystemInfoProvider>,
    max_batches_per_job: usize,
    min_delay_ms: u64,
    max_delay_ms: u64,
    current_delay_ms: u64,
}

impl DataUploadWorker {
    pub fn new(
        feature: impl Into<String>,
        storage: Arc<dyn Storage>,
        uploader: Arc<dyn DataUploader>,
        context_provider: Arc<ContextProvider>,
        network_info: Arc<dyn NetworkInfoProvider>,
        system_info: Arc<dyn SystemInfoProvider>,
        upload_configuration: UploadConfiguration,
    ) -> Self {
        let step = upload_configuration.frequency.base_step_ms();
        Self {
            feature: feature.into(),
            storage,
            uploader,
            context_provider,
            network_info,
            system_info,
            max_batches_per_job: upload_configuration.max_batches_per_upload_job().max(1),
            min_delay_ms: step * MIN_DELAY_FACTOR,
            max_delay_ms: step * MAX_DELAY_FACTOR,
            current_delay_ms: step * DEFAULT_DELAY_FACTOR,
        }
    }

    pub fn current_delay(&self) -> Duration {
        Duration::from_millis(self.current_delay_ms)
    }

    /// Uploads up to `max_batches_per_job` batches, stopping at the first one
    /// that is not accepted, then adjusts the delay.
    pub async fn run_once(&mut self) -> RunOutcome {
        if !self.network_info.network_info().is_connected()
            || !self.system_info.system_info().is_ready_for_upload()
        {
            debug!(
                "UPLOAD | {} | Network or system not ready, skipping upload",
                self.feature
            );
            self.increase_delay();
            return RunOutcome::NotReady;
        }

        let context = self.context_provider.context();
        let mut batches = 0;
        let mut last_status = None;
        while batches < self.max_batches_per_job {
            let Some(batch) = self.storage.read_next_batch() else {
                break;
            };
            batches += 1;

            let status = self
                .uploader
                .upload(&context, &batch.data, batch.metadata.as_deref())
                .await;
            self.storage.confirm_batch_read(
                &batch.id,
                status.removal_reason(),
                !status.should_retry(),
            );

            let delivered = status.is_success();
            last_status = Some(status);
            if !delivered {
                break;
            }
        }

        let Some(last_status) = last_status else {
            self.increase_delay();
            return RunOutcome::NoBatch;
        };

        match &last_status {
            UploadStatus::DnsError { .. } => self.current_delay_ms = self.max_delay_ms,
            status if status.is_success() => self.decrease_delay(),
            _ => self.increase_delay(),
        }
        RunOutcome::Uploaded {
            batches,
            last_status,
        }
    }

    /// Sleeps the current delay then runs, until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        debug!(
            "UPLOAD | {} | Upload worker started, first run in {} ms",
            self.feature, self.current_delay_ms
        );
        loop {
            tokio::select! {
                () = tokio::time::sleep(self.current_delay()) => {
                    self.run_once().await;
                }
                () = cancel.cancelled() => {
                    debug!("UPLOAD | {} | Upload worker stopped", self.feature);
                    break;
                }
            }
        }
    }

    fn decrease_delay(&mut self) {
        let delay = (self.current_delay_ms as f64 * DECREASE_PERCENT).round() as u64;
        self.current_delay_ms = delay.max(self.min_delay_ms);
    }

    fn increase_delay(&mut self) {
        let delay = (self.current_delay_ms as f64 * INCREASE_PERCENT).round() as u64;
        self.current_delay_ms = delay.min(self.max_delay_ms);
    }
}

impl fmt::Debug for DataUploadWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataUploadWorker")
            .field("feature", &self.feature)
            .field("max_batches_per_job", &self.max_batches_per_job)
            .field("current_delay_ms", &self.current_delay_ms)
            .finish_non_exhaustive()
    }
}
