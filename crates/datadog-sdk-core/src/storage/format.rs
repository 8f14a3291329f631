// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch file encoding.
//!
//! A batch file is a sequence of TLV blocks, big-endian:
//!
//! ```text
//!   ┌──────────┬────────────┬───────────────┐
//!   │ type u16 │ length u32 │ payload bytes │
//!   └──────────┴────────────┴───────────────┘
//! ```
//!
//! Each event is one `EVENT_METADATA` block followed by one `EVENT` block, so a
//! batch reads back as `[meta, data, meta, data, ...]`. A truncated tail (e.g.
//! the process died mid-write) only loses the events after the last complete
//! pair.

use std::fmt::Debug;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, warn};

use crate::error::StorageError;
use crate::storage::encryption::Encryption;
use crate::storage::RawBatchEvent;

const BLOCK_TYPE_EVENT: u16 = 0x00;
const BLOCK_TYPE_EVENT_METADATA: u16 = 0x01;
const HEADER_SIZE: usize = 2 + 4;

pub trait BatchFileReaderWriter: Send + Sync + Debug {
    fn write_data(
        &self,
        file: &Path,
        event: &RawBatchEvent,
        append: bool,
    ) -> Result<(), StorageError>;

    /// Events stored in `file`. Unreadable or corrupted content is logged and
    /// only the events decoded before the problem are returned.
    fn read_data(&self, file: &Path) -> Vec<RawBatchEvent>;
}

/// Returns the plain reader/writer, wrapped with `encryption` when provided.
pub fn batch_file_reader_writer(
    encryption: Option<Arc<dyn Encryption>>,
) -> Arc<dyn BatchFileReaderWriter> {
    match encryption {
        Some(encryption) => Arc::new(EncryptedBatchReaderWriter::new(encryption)),
        None => Arc::new(PlainBatchFileReaderWriter),
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PlainBatchFileReaderWriter;

impl BatchFileReaderWriter for PlainBatchFileReaderWriter {
    fn write_data(
        &self,
        file: &Path,
        event: &RawBatchEvent,
        append: bool,
    ) -> Result<(), StorageError> {
        let mut buffer =
            Vec::with_capacity(2 * HEADER_SIZE + event.metadata.len() + event.data.len());
        encode_block(&mut buffer, BLOCK_TYPE_EVENT_METADATA, &event.metadata)?;
        encode_block(&mut buffer, BLOCK_TYPE_EVENT, &event.data)?;

        let mut handle = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(file)
            .map_err(|e| StorageError::io(file, e))?;
        // One write call per event keeps pairs whole unless the process dies mid-syscall.
        handle
            .write_all(&buffer)
            .map_err(|e| StorageError::io(file, e))
    }

    fn read_data(&self, file: &Path) -> Vec<RawBatchEvent> {
        let bytes = match fs::read(file) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("STORAGE | Unable to read batch file {}: {e}", file.display());
                return Vec::new();
            }
        };

        let (events, corruption) = decode_events(&bytes);
        if let Some(reason) = corruption {
            warn!(
                "STORAGE | Batch file {} is corrupted ({reason}), keeping {} readable events",
                file.display(),
                events.len()
            );
        }
        events
    }
}

/// Encrypts every block payload with the host's [`Encryption`].
#[derive(Debug)]
pub struct EncryptedBatchReaderWriter {
    encryption: Arc<dyn Encryption>,
    delegate: PlainBatchFileReaderWriter,
}

impl EncryptedBatchReaderWriter {
    pub fn new(encryption: Arc<dyn Encryption>) -> Self {
        Self {
            encryption,
            delegate: PlainBatchFileReaderWriter,
        }
    }

    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, StorageError> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        let encrypted = self.encryption.encrypt(data);
        if encrypted.is_empty() {
            return Err(StorageError::EmptyEncryption);
        }
        Ok(encrypted)
    }
}

impl BatchFileReaderWriter for EncryptedBatchReaderWriter {
    fn write_data(
        &self,
        file: &Path,
        event: &RawBatchEvent,
        append: bool,
    ) -> Result<(), StorageError> {
        let encrypted = RawBatchEvent {
            data: self.encrypt(&event.data)?,
            metadata: self.encrypt(&event.metadata)?,
        };
        self.delegate.write_data(file, &encrypted, append)
    }

    fn read_data(&self, file: &Path) -> Vec<RawBatchEvent> {
        self.delegate
            .read_data(file)
            .into_iter()
            .map(|event| RawBatchEvent {
                data: self.encryption.decrypt(&event.data),
                metadata: if event.metadata.is_empty() {
                    Vec::new()
                } else {
                    self.encryption.decrypt(&event.metadata)
                },
            })
            .collect()
    }
}

fn encode_block(buffer: &mut Vec<u8>, block_type: u16, payload: &[u8]) -> Result<(), StorageError> {
    let length = u32::try_from(payload.len()).map_err(|_| StorageError::BlockTooLarge(block_type))?;
    buffer.extend_from_slice(&block_type.to_be_bytes());
    buffer.extend_from_slice(&length.to_be_bytes());
    buffer.extend_from_slice(payload);
    Ok(())
}

/// Reads one block of `expected_type` starting at `*offset`.
fn decode_block<'a>(
    bytes: &'a [u8],
    offset: &mut usize,
    expected_type: u16,
) -> Result<&'a [u8], String> {
    let header = bytes
        .get(*offset..*offset + HEADER_SIZE)
        .ok_or_else(|| format!("truncated block header at byte {}", *offset))?;
    let block_type = u16::from_be_bytes([header[0], header[1]]);
    if block_type != expected_type {
        return Err(format!(
            "unexpected block type {block_type:#06x} at byte {}, expected {expected_type:#06x}",
            *offset
        ));
    }
    let length = u32::from_be_bytes([header[2], header[3], header[4], header[5]]) as usize;
    let start = *offset + HEADER_SIZE;
    let payload = start
        .checked_add(length)
        .and_then(|end| bytes.get(start..end))
        .ok_or_else(|| format!("block at byte {} declares {length} bytes past the end", *offset))?;
    *offset = start + length;
    Ok(payload)
}

/// Decodes `(metadata, event)` pairs until the end of `bytes` or the first
/// malformed block, whose description is returned alongside the events.
pub(crate) fn decode_events(bytes: &[u8]) -> (Vec<RawBatchEvent>, Option<String>) {
    let mut events = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let pair = decode_block(bytes, &mut offset, BLOCK_TYPE_EVENT_METADATA).and_then(
            |metadata| {
                decode_block(bytes, &mut offset, BLOCK_TYPE_EVENT).map(|data| RawBatchEvent {
                    data: data.to_vec(),
                    metadata: metadata.to_vec(),
                })
            },
        );
        match pair {
            Ok(event) => events.push(event),
            Err(reason) => return (events, Some(reason)),
        }
    }
    (events, None)
}
