// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use crate::error::StorageError;
use crate::storage::encryption::Encryption;

/// Reads and replaces the whole content of a batch metadata file.
#[derive(Debug, Clone, Default)]
pub struct BatchMetadataReaderWriter {
    encryption: Option<Arc<dyn Encryption>>,
}

impl BatchMetadataReaderWriter {
    pub fn new(encryption: Option<Arc<dyn Encryption>>) -> Self {
        Self { encryption }
    }

    pub fn write(&self, file: &Path, metadata: &[u8]) -> Result<(), StorageError> {
        let content = match &self.encryption {
            Some(encryption) if !metadata.is_empty() => {
                let encrypted = encryption.encrypt(metadata);
                if encrypted.is_empty() {
                    return Err(StorageError::EmptyEncryption);
                }
                encrypted
            }
            _ => metadata.to_vec(),
        };
        fs::write(file, content).map_err(|e| StorageError::io(file, e))
    }

    /// `Ok(None)` when the batch has no metadata file.
    pub fn read(&self, file: &Path) -> Result<Option<Vec<u8>>, StorageError> {
        let content = match fs::read(file) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(file, e)),
        };
        match &self.encryption {
            Some(encryption) if !content.is_empty() => Ok(Some(encryption.decrypt(&content))),
            _ => Ok(Some(content)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::ReversingEncryption;
    use tempfile::TempDir;

    #[test]
    fn test_write_replaces_previous_metadata() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("1000_metadata");
        let rw = BatchMetadataReaderWriter::default();

        assert_eq!(rw.read(&file).unwrap(), None);
        rw.write(&file, b"view-1").unwrap();
        rw.write(&file, b"view-2").unwrap();
        assert_eq!(rw.read(&file).unwrap(), Some(b"view-2".to_vec()));
    }

    #[test]
    fn test_encrypted_metadata() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("1000_metadata");
        let rw = BatchMetadataReaderWriter::new(Some(Arc::new(ReversingEncryption)));

        rw.write(&file, b"view-1").unwrap();
        assert_ne!(fs::read(&file).unwrap(), b"view-1".to_vec());
        assert_eq!(rw.read(&file).unwrap(), Some(b"view-1".to_vec()));
    }
}
