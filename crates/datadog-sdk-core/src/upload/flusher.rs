// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use tracing::{debug, warn};

use crate::context::ContextProvider;
use crate::storage::format::BatchFileReaderWriter;
use crate::storage::metadata::BatchMetadataReaderWriter;
use crate::storage::mover::FileMover;
use crate::storage::orchestrator::FileOrchestrator;
use crate::upload::uploader::DataUploader;

/// Drains the granted batches of a feature on shutdown, without scheduling.
///
/// Every batch gets exactly one upload attempt and is deleted afterwards,
/// whatever the intake answered.
#[derive(Debug)]
pub struct DataFlusher {
    context_provider: Arc<ContextProvider>,
    orchestrator: Arc<dyn FileOrchestrator>,
    reader_writer: Arc<dyn BatchFileReaderWriter>,
    metadata_reader_writer: BatchMetadataReaderWriter,
    mover: FileMover,
}

impl DataFlusher {
    pub fn new(
        context_provider: Arc<ContextProvider>,
        orchestrator: Arc<dyn FileOrchestrator>,
        reader_writer: Arc<dyn BatchFileReaderWriter>,
        metadata_reader_writer: BatchMetadataReaderWriter,
    ) -> Self {
        Self {
            context_provider,
            orchestrator,
            reader_writer,
            metadata_reader_writer,
            mover: FileMover,
        }
    }

    /// Returns the number of batches processed.
    pub async fn flush(&self, uploader: &dyn DataUploader) -> usize {
        let context = self.context_provider.context();
        let files = self.orchestrator.get_flushable_files();
        let mut flushed = 0;

        for file in files {
            let metadata_file = self.orchestrator.metadata_file(&file);
            let metadata = self
                .metadata_reader_writer
                .read(&metadata_file)
                .unwrap_or_else(|e| {
                    warn!("UPLOAD | Unable to read batch metadata while flushing: {e}");
                    None
                });
            let data = self.reader_writer.read_data(&file);

            if !data.is_empty() {
                let status = uploader.upload(&context, &data, metadata.as_deref()).await;
                debug!("UPLOAD | Flushed batch {}: {status}", file.display());
            }

            self.mover.delete(&file);
            self.mover.delete(&metadata_file);
            flushed += 1;
        }
        flushed
    }
}
