// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! On-disk buffering of events awaiting upload.
//!
//! # Layout
//!
//! ```text
//!   <storage_dir>/
//!     <feature>-pending-v2/      written while consent is pending, never uploaded
//!       1718000000000
//!       1718000000000_metadata
//!     <feature>-v2/              written while consent is granted, read by the uploader
//!       1718000005123
//! ```
//!
//! Batch file names are creation timestamps in milliseconds; the orchestrator
//! uses them to age files. Each batch may carry an opaque metadata sibling.
//!
//! # Components
//!
//! - [`format`]: TLV encoding of events inside a batch file
//! - [`metadata`]: per-batch metadata files
//! - [`orchestrator`]: which file to write to / read from, size and age limits
//! - [`mover`]: delete, clean and move files
//! - [`migrator`]: consent-driven wipe/move of buffered data
//! - [`consent_aware`]: the [`Storage`] implementation routing by consent

pub mod consent_aware;
pub mod encryption;
pub mod format;
pub mod metadata;
pub mod migrator;
pub mod mover;
pub mod orchestrator;

use std::fmt;
use std::path::Path;

/// A serialized event plus its per-event metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawBatchEvent {
    pub data: Vec<u8>,
    pub metadata: Vec<u8>,
}

impl RawBatchEvent {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            metadata: Vec::new(),
        }
    }

    pub fn with_metadata(data: impl Into<Vec<u8>>, metadata: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            metadata: metadata.into(),
        }
    }
}

/// Identifies a batch handed out by [`Storage::read_next_batch`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BatchId(String);

impl BatchId {
    pub fn from_file(file: &Path) -> Self {
        Self(
            file.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        )
    }

    pub fn matches(&self, file: &Path) -> bool {
        file.file_name()
            .is_some_and(|name| name.to_string_lossy() == self.0)
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchData {
    pub id: BatchId,
    pub data: Vec<RawBatchEvent>,
    pub metadata: Option<Vec<u8>>,
}

/// Why a batch left the storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemovalReason {
    IntakeCode(u16),
    /// Upload outcome carried no status code (network, DNS, request creation).
    Invalid,
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemovalReason::IntakeCode(code) => write!(f, "intake-code-{code}"),
            RemovalReason::Invalid => f.write_str("invalid"),
        }
    }
}

/// Write access to the batch currently open for the active consent.
pub trait EventBatchWriter {
    /// Metadata stored alongside the current batch, if any.
    fn current_metadata(&self) -> Option<Vec<u8>>;

    /// Appends `event` and, when given, replaces the batch metadata.
    /// Returns `false` when the event was rejected.
    fn write(&mut self, event: RawBatchEvent, batch_metadata: Option<&[u8]>) -> bool;
}

/// Batch writer handed out when writes must be discarded.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpEventBatchWriter;

impl EventBatchWriter for NoOpEventBatchWriter {
    fn current_metadata(&self) -> Option<Vec<u8>> {
        None
    }

    fn write(&mut self, _event: RawBatchEvent, _batch_metadata: Option<&[u8]>) -> bool {
        true
    }
}

pub trait Storage: Send + Sync {
    /// Runs `callback` with a writer on the current batch. With
    /// `force_new_batch` the writer targets a freshly created batch.
    fn write_current_batch(
        &self,
        force_new_batch: bool,
        callback: &mut dyn FnMut(&mut dyn EventBatchWriter),
    );

    /// Next uploadable batch, locked until [`confirm_batch_read`](Self::confirm_batch_read).
    fn read_next_batch(&self) -> Option<BatchData>;

    fn confirm_batch_read(&self, id: &BatchId, reason: RemovalReason, delete_batch: bool);

    /// Deletes every buffered batch regardless of consent.
    fn drop_all(&self);
}
