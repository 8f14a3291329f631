// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Consent-aware [`Storage`].
//!
//! Writes are routed to a [`DataProcessor`] chosen from the current consent:
//! pending and granted data land in their own directory, data written without
//! consent is accepted and dropped. Reads only ever see the granted directory.
//!
//! Writes and consent migrations share one lock, so an event is never written
//! into a directory that is being wiped or moved.

use std::collections::HashSet;
use std::fmt::{self, Debug};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, error, warn};

use crate::consent::{TrackingConsent, TrackingConsentListener, TrackingConsentProvider};
use crate::storage::format::BatchFileReaderWriter;
use crate::storage::metadata::BatchMetadataReaderWriter;
use crate::storage::migrator::ConsentAwareFileMigrator;
use crate::storage::mover::FileMover;
use crate::storage::orchestrator::FileOrchestrator;
use crate::storage::{
    BatchData, BatchId, EventBatchWriter, NoOpEventBatchWriter, RawBatchEvent, RemovalReason,
    Storage,
};

/// Opens the batch writer for one consent state.
pub trait DataProcessor: Send + Sync + Debug {
    fn batch_writer(&self, force_new_batch: bool) -> Box<dyn EventBatchWriter + '_>;
}

/// Writes into the batches of one orchestrator.
#[derive(Debug)]
pub struct FileDataProcessor {
    orchestrator: Arc<dyn FileOrchestrator>,
    reader_writer: Arc<dyn BatchFileReaderWriter>,
    metadata_reader_writer: BatchMetadataReaderWriter,
    max_item_size: u64,
}

impl FileDataProcessor {
    pub fn new(
        orchestrator: Arc<dyn FileOrchestrator>,
        reader_writer: Arc<dyn BatchFileReaderWriter>,
        metadata_reader_writer: BatchMetadataReaderWriter,
        max_item_size: u64,
    ) -> Self {
        Self {
            orchestrator,
            reader_writer,
            metadata_reader_writer,
            max_item_size,
        }
    }

    pub fn orchestrator(&self) -> &Arc<dyn FileOrchestrator> {
        &self.orchestrator
    }
}

impl DataProcessor for FileDataProcessor {
    fn batch_writer(&self, force_new_batch: bool) -> Box<dyn EventBatchWriter + '_> {
        match self.orchestrator.get_writable_file(force_new_batch) {
            Some(file) => Box::new(FileEventBatchWriter {
                orchestrator: self.orchestrator.as_ref(),
                metadata_file: self.orchestrator.metadata_file(&file),
                file,
                has_reserved_slot: true,
                reader_writer: self.reader_writer.as_ref(),
                metadata_reader_writer: &self.metadata_reader_writer,
                max_item_size: self.max_item_size,
            }),
            None => {
                error!(
                    "STORAGE | No writable batch in {}, rejecting events",
                    self.orchestrator.root_dir().display()
                );
                Box::new(RejectingEventBatchWriter)
            }
        }
    }
}

/// Processor used without consent: events are accepted and discarded.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpDataProcessor;

impl DataProcessor for NoOpDataProcessor {
    fn batch_writer(&self, _force_new_batch: bool) -> Box<dyn EventBatchWriter + '_> {
        Box::new(NoOpEventBatchWriter)
    }
}

/// Appends to the orchestrator's writable batch.
///
/// The slot reserved when the writer was opened covers the first event; every
/// further event asks the orchestrator again, so item and size limits roll the
/// writer over to a new batch.
struct FileEventBatchWriter<'a> {
    orchestrator: &'a dyn FileOrchestrator,
    file: PathBuf,
    metadata_file: PathBuf,
    has_reserved_slot: bool,
    reader_writer: &'a dyn BatchFileReaderWriter,
    metadata_reader_writer: &'a BatchMetadataReaderWriter,
    max_item_size: u64,
}

impl FileEventBatchWriter<'_> {
    fn next_file(&mut self) -> bool {
        if std::mem::take(&mut self.has_reserved_slot) {
            return true;
        }
        let Some(file) = self.orchestrator.get_writable_file(false) else {
            error!(
                "STORAGE | No writable batch in {}, rejecting event",
                self.orchestrator.root_dir().display()
            );
            return false;
        };
        if file != self.file {
            self.metadata_file = self.orchestrator.metadata_file(&file);
            self.file = file;
        }
        true
    }
}

impl EventBatchWriter for FileEventBatchWriter<'_> {
    fn current_metadata(&self) -> Option<Vec<u8>> {
        match self.metadata_reader_writer.read(&self.metadata_file) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("STORAGE | Unable to read batch metadata: {e}");
                None
            }
        }
    }

    fn write(&mut self, event: RawBatchEvent, batch_metadata: Option<&[u8]>) -> bool {
        let size = event.data.len() as u64;
        if size > self.max_item_size {
            error!(
                "STORAGE | Dropping event of {size} bytes, above the {} bytes limit",
                self.max_item_size
            );
            return false;
        }
        if !self.next_file() {
            return false;
        }

        if let Err(e) = self.reader_writer.write_data(&self.file, &event, true) {
            error!("STORAGE | Unable to write event: {e}");
            return false;
        }
        if let Some(metadata) = batch_metadata {
            if let Err(e) = self.metadata_reader_writer.write(&self.metadata_file, metadata) {
                warn!("STORAGE | Unable to write batch metadata: {e}");
            }
        }
        true
    }
}

struct RejectingEventBatchWriter;

impl EventBatchWriter for RejectingEventBatchWriter {
    fn current_metadata(&self) -> Option<Vec<u8>> {
        None
    }

    fn write(&mut self, _event: RawBatchEvent, _batch_metadata: Option<&[u8]>) -> bool {
        false
    }
}

pub struct ConsentAwareStorage {
    feature: String,
    consent: Mutex<TrackingConsent>,
    pending: FileDataProcessor,
    granted: FileDataProcessor,
    denied: NoOpDataProcessor,
    reader_writer: Arc<dyn BatchFileReaderWriter>,
    metadata_reader_writer: BatchMetadataReaderWriter,
    migrator: ConsentAwareFileMigrator,
    mover: FileMover,
    locked_batches: Mutex<HashSet<PathBuf>>,
}

impl ConsentAwareStorage {
    /// Creates the storage and wipes pending data left over by a previous run.
    pub fn new(
        feature: impl Into<String>,
        pending: FileDataProcessor,
        granted: FileDataProcessor,
        migrator: ConsentAwareFileMigrator,
        initial_consent: TrackingConsent,
    ) -> Self {
        let reader_writer = Arc::clone(&granted.reader_writer);
        let metadata_reader_writer = granted.metadata_reader_writer.clone();
        let storage = Self {
            feature: feature.into(),
            consent: Mutex::new(initial_consent),
            pending,
            granted,
            denied: NoOpDataProcessor,
            reader_writer,
            metadata_reader_writer,
            migrator,
            mover: FileMover,
            locked_batches: Mutex::new(HashSet::new()),
        };
        storage.migrate(None, initial_consent);
        storage
    }

    /// Follows `provider` from now on, catching up with its current value.
    pub fn attach(self: &Arc<Self>, provider: &TrackingConsentProvider) {
        provider.register_listener(Arc::new(StorageConsentListener(Arc::downgrade(self))));
        self.apply_consent(provider.consent());
    }

    pub fn feature(&self) -> &str {
        &self.feature
    }

    pub fn pending_orchestrator(&self) -> &Arc<dyn FileOrchestrator> {
        self.pending.orchestrator()
    }

    pub fn granted_orchestrator(&self) -> &Arc<dyn FileOrchestrator> {
        self.granted.orchestrator()
    }

    #[allow(clippy::expect_used)]
    pub fn consent(&self) -> TrackingConsent {
        *self.consent.lock().expect("lock poisoned")
    }

    /// Switches to `new`, migrating buffered data under the write lock.
    #[allow(clippy::expect_used)]
    pub fn apply_consent(&self, new: TrackingConsent) {
        let mut consent = self.consent.lock().expect("lock poisoned");
        let previous = *consent;
        if previous == new {
            return;
        }
        *consent = new;
        self.migrate(Some(previous), new);
    }

    fn migrate(&self, previous: Option<TrackingConsent>, new: TrackingConsent) {
        let migrated = self.migrator.migrate_data(
            previous,
            new,
            self.pending.orchestrator().as_ref(),
            self.granted.orchestrator().as_ref(),
        );
        if !migrated {
            error!(
                "STORAGE | {} | Data migration for consent {new} did not complete",
                self.feature
            );
        }
    }

    fn processor(&self, consent: TrackingConsent) -> &dyn DataProcessor {
        match consent {
            TrackingConsent::Pending => &self.pending,
            TrackingConsent::Granted => &self.granted,
            TrackingConsent::NotGranted => &self.denied,
        }
    }

    /// Returns `false` when the batch file itself is still on disk.
    fn delete_batch(&self, file: &Path) -> bool {
        let metadata_file = self.granted.orchestrator().metadata_file(file);
        let deleted = self.mover.delete(file);
        if !deleted {
            warn!(
                "STORAGE | {} | Batch {} could not be deleted, keeping it locked",
                self.feature,
                file.display()
            );
        }
        self.mover.delete(&metadata_file);
        deleted
    }
}

impl Storage for ConsentAwareStorage {
    /// `callback` runs while the write lock is held and must not call back into
    /// this storage.
    #[allow(clippy::expect_used)]
    fn write_current_batch(
        &self,
        force_new_batch: bool,
        callback: &mut dyn FnMut(&mut dyn EventBatchWriter),
    ) {
        let consent = self.consent.lock().expect("lock poisoned");
        let mut writer = self.processor(*consent).batch_writer(force_new_batch);
        callback(writer.as_mut());
    }

    #[allow(clippy::expect_used)]
    fn read_next_batch(&self) -> Option<BatchData> {
        loop {
            let file = {
                let mut locked = self.locked_batches.lock().expect("lock poisoned");
                let file = self.granted.orchestrator().get_readable_file(&locked)?;
                locked.insert(file.clone());
                file
            };

            let data = self.reader_writer.read_data(&file);
            if data.is_empty() {
                warn!(
                    "STORAGE | {} | Batch {} holds no readable event, deleting it",
                    self.feature,
                    file.display()
                );
                let mut locked = self.locked_batches.lock().expect("lock poisoned");
                if self.delete_batch(&file) {
                    locked.remove(&file);
                }
                continue;
            }

            let metadata_file = self.granted.orchestrator().metadata_file(&file);
            let metadata = self
                .metadata_reader_writer
                .read(&metadata_file)
                .unwrap_or_else(|e| {
                    warn!("STORAGE | {} | Unable to read batch metadata: {e}", self.feature);
                    None
                });

            return Some(BatchData {
                id: BatchId::from_file(&file),
                data,
                metadata,
            });
        }
    }

    #[allow(clippy::expect_used)]
    fn confirm_batch_read(&self, id: &BatchId, reason: RemovalReason, delete_batch: bool) {
        let mut locked = self.locked_batches.lock().expect("lock poisoned");
        let Some(file) = locked.iter().find(|file| id.matches(file)).cloned() else {
            debug!("STORAGE | {} | Batch {id} is not locked, ignoring", self.feature);
            return;
        };
        if delete_batch {
            debug!("STORAGE | {} | Deleting batch {id} ({reason})", self.feature);
            // An undeletable batch stays locked so it is neither re-read nor re-sent.
            if !self.delete_batch(&file) {
                return;
            }
        }
        locked.remove(&file);
    }

    #[allow(clippy::expect_used)]
    fn drop_all(&self) {
        let _consent = self.consent.lock().expect("lock poisoned");
        let mut locked = self.locked_batches.lock().expect("lock poisoned");
        for orchestrator in [self.pending.orchestrator(), self.granted.orchestrator()] {
            self.mover.clean_directory(orchestrator.root_dir());
        }
        locked.clear();
        debug!("STORAGE | {} | Dropped all buffered data", self.feature);
    }
}

impl Debug for ConsentAwareStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsentAwareStorage")
            .field("feature", &self.feature)
            .field("consent", &self.consent())
            .finish_non_exhaustive()
    }
}

struct StorageConsentListener(Weak<ConsentAwareStorage>);

impl TrackingConsentListener for StorageConsentListener {
    fn on_consent_updated(&self, _previous: TrackingConsent, new: TrackingConsent) {
        if let Some(storage) = self.0.upgrade() {
            storage.apply_consent(new);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilePersistenceConfig;
    use crate::storage::format::PlainBatchFileReaderWriter;
    use crate::storage::orchestrator::BatchFileOrchestrator;
    use crate::time::ManualTimeProvider;
    use std::fs;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    const NOW: u64 = 1_700_000_000_000;
    const MAX_ITEM_SIZE: u64 = 16;

    struct Fixture {
        _dir: TempDir,
        time: Arc<ManualTimeProvider>,
        storage: Arc<ConsentAwareStorage>,
    }

    fn fixture(consent: TrackingConsent) -> Fixture {
        fixture_with(consent, |_| {})
    }

    fn fixture_with(consent: TrackingConsent, prepare: impl FnOnce(&Path)) -> Fixture {
        let config = FilePersistenceConfig {
            recent_delay_ms: 1_000,
            ..FilePersistenceConfig::default()
        };
        fixture_with_config(consent, config, prepare)
    }

    fn fixture_with_config(
        consent: TrackingConsent,
        config: FilePersistenceConfig,
        prepare: impl FnOnce(&Path),
    ) -> Fixture {
        let dir = TempDir::new().unwrap();
        prepare(dir.path());
        let time = Arc::new(ManualTimeProvider::new(NOW));
        let reader_writer: Arc<dyn BatchFileReaderWriter> = Arc::new(PlainBatchFileReaderWriter);
        let processor = |name: &str| {
            FileDataProcessor::new(
                Arc::new(BatchFileOrchestrator::new(
                    dir.path().join(name),
                    config,
                    time.clone(),
                )),
                reader_writer.clone(),
                BatchMetadataReaderWriter::default(),
                MAX_ITEM_SIZE,
            )
        };
        let storage = Arc::new(ConsentAwareStorage::new(
            "logs",
            processor("logs-pending-v2"),
            processor("logs-v2"),
            ConsentAwareFileMigrator::with_retry_delay(Duration::ZERO),
            consent,
        ));
        Fixture {
            _dir: dir,
            time,
            storage,
        }
    }

    fn write(storage: &ConsentAwareStorage, data: &str) -> bool {
        let mut accepted = false;
        storage.write_current_batch(false, &mut |writer| {
            accepted = writer.write(RawBatchEvent::new(data), None);
        });
        accepted
    }

    fn data(batch: &BatchData) -> Vec<String> {
        batch
            .data
            .iter()
            .map(|e| String::from_utf8(e.data.clone()).unwrap())
            .collect()
    }

    #[test]
    fn test_granted_writes_become_readable() {
        let f = fixture(TrackingConsent::Granted);
        assert!(write(&f.storage, "a"));
        assert!(write(&f.storage, "b"));

        assert!(f.storage.read_next_batch().is_none());
        f.time.advance(2_000);
        let batch = f.storage.read_next_batch().unwrap();
        assert_eq!(data(&batch), vec!["a", "b"]);
    }

    #[test]
    fn test_pending_writes_are_never_read() {
        let f = fixture(TrackingConsent::Pending);
        assert!(write(&f.storage, "a"));
        f.time.advance(2_000);

        assert!(f.storage.read_next_batch().is_none());
        assert_eq!(f.storage.pending_orchestrator().get_all_files().len(), 1);
    }

    #[test]
    fn test_not_granted_writes_are_dropped() {
        let f = fixture(TrackingConsent::NotGranted);
        assert!(write(&f.storage, "a"));

        assert!(f.storage.pending_orchestrator().get_all_files().is_empty());
        assert!(f.storage.granted_orchestrator().get_all_files().is_empty());
    }

    #[test]
    fn test_oversized_event_is_rejected() {
        let f = fixture(TrackingConsent::Granted);
        assert!(!write(&f.storage, "this event is far too large"));
    }

    #[test]
    fn test_batch_metadata_roundtrip_through_writer() {
        let f = fixture(TrackingConsent::Granted);
        f.storage.write_current_batch(false, &mut |writer| {
            assert!(writer.current_metadata().is_none());
            writer.write(RawBatchEvent::new("a"), Some(b"view-1"));
        });
        f.storage.write_current_batch(false, &mut |writer| {
            assert_eq!(writer.current_metadata(), Some(b"view-1".to_vec()));
        });

        f.time.advance(2_000);
        let batch = f.storage.read_next_batch().unwrap();
        assert_eq!(batch.metadata, Some(b"view-1".to_vec()));
    }

    #[test]
    fn test_startup_wipes_stale_pending_data() {
        let f = fixture_with(TrackingConsent::Pending, |root| {
            let pending = root.join("logs-pending-v2");
            fs::create_dir_all(&pending).unwrap();
            fs::write(pending.join("1000"), b"stale").unwrap();
        });
        assert!(f.storage.pending_orchestrator().get_all_files().is_empty());
    }

    #[test]
    fn test_granting_consent_moves_pending_data() {
        let f = fixture(TrackingConsent::Pending);
        let provider = TrackingConsentProvider::new(TrackingConsent::Pending);
        f.storage.attach(&provider);
        write(&f.storage, "a");

        provider.set_consent(TrackingConsent::Granted);
        f.time.advance(2_000);

        let batch = f.storage.read_next_batch().unwrap();
        assert_eq!(data(&batch), vec!["a"]);
        assert!(f.storage.pending_orchestrator().get_all_files().is_empty());
    }

    #[test]
    fn test_refusing_consent_wipes_pending_data() {
        let f = fixture(TrackingConsent::Pending);
        let provider = TrackingConsentProvider::new(TrackingConsent::Pending);
        f.storage.attach(&provider);
        write(&f.storage, "a");

        provider.set_consent(TrackingConsent::NotGranted);
        assert!(f.storage.pending_orchestrator().get_all_files().is_empty());

        provider.set_consent(TrackingConsent::Granted);
        f.time.advance(2_000);
        assert!(f.storage.read_next_batch().is_none());
    }

    #[test]
    fn test_attach_catches_up_with_provider() {
        let f = fixture(TrackingConsent::Pending);
        let provider = TrackingConsentProvider::new(TrackingConsent::Granted);
        f.storage.attach(&provider);
        assert_eq!(f.storage.consent(), TrackingConsent::Granted);
    }

    #[test]
    fn test_locked_batch_is_not_handed_out_twice() {
        let f = fixture(TrackingConsent::Granted);
        write(&f.storage, "a");
        f.time.advance(2_000);
        write(&f.storage, "b");
        f.time.advance(2_000);

        let first = f.storage.read_next_batch().unwrap();
        let second = f.storage.read_next_batch().unwrap();
        assert_ne!(first.id, second.id);
        assert!(f.storage.read_next_batch().is_none());
    }

    #[test]
    fn test_confirm_keeps_or_deletes_batch() {
        let f = fixture(TrackingConsent::Granted);
        write(&f.storage, "a");
        f.time.advance(2_000);

        let batch = f.storage.read_next_batch().unwrap();
        f.storage
            .confirm_batch_read(&batch.id, RemovalReason::IntakeCode(500), false);
        let retried = f.storage.read_next_batch().unwrap();
        assert_eq!(retried.id, batch.id);

        f.storage
            .confirm_batch_read(&retried.id, RemovalReason::IntakeCode(202), true);
        assert!(f.storage.read_next_batch().is_none());
        assert!(f.storage.granted_orchestrator().get_all_files().is_empty());
    }

    #[test]
    fn test_empty_batch_is_discarded_on_read() {
        let f = fixture(TrackingConsent::Granted);
        let root = f.storage.granted_orchestrator().root_dir().to_path_buf();
        let empty = root.join((NOW - 2_000).to_string());
        fs::create_dir_all(&root).unwrap();
        fs::write(&empty, b"").unwrap();

        assert!(f.storage.read_next_batch().is_none());
        assert!(!empty.exists());
    }

    #[test]
    fn test_drop_all() {
        let f = fixture(TrackingConsent::Granted);
        write(&f.storage, "a");
        f.storage.apply_consent(TrackingConsent::Pending);
        write(&f.storage, "b");

        f.storage.drop_all();
        assert!(f.storage.pending_orchestrator().get_all_files().is_empty());
        assert!(f.storage.granted_orchestrator().get_all_files().is_empty());
    }

    #[test]
    fn test_writes_in_one_callback_roll_over_full_batches() {
        let config = FilePersistenceConfig {
            recent_delay_ms: 1_000,
            max_items_per_batch: 3,
            ..FilePersistenceConfig::default()
        };
        let f = fixture_with_config(TrackingConsent::Granted, config, |_| {});

        let mut accepted = 0;
        f.storage.write_current_batch(false, &mut |writer| {
            for i in 0..10 {
                if writer.write(RawBatchEvent::new(i.to_string()), None) {
                    accepted += 1;
                }
            }
        });
        assert_eq!(accepted, 10);

        let reader = PlainBatchFileReaderWriter;
        let sizes: Vec<usize> = f
            .storage
            .granted_orchestrator()
            .get_all_files()
            .iter()
            .map(|file| reader.read_data(file).len())
            .collect();
        assert_eq!(sizes, vec![3, 3, 3, 1]);
    }

    #[test]
    fn test_writes_in_one_callback_roll_over_large_batches() {
        let config = FilePersistenceConfig {
            recent_delay_ms: 1_000,
            max_batch_size: 20,
            ..FilePersistenceConfig::default()
        };
        let f = fixture_with_config(TrackingConsent::Granted, config, |_| {});

        f.storage.write_current_batch(false, &mut |writer| {
            for _ in 0..4 {
                assert!(writer.write(RawBatchEvent::new("0123456789"), None));
            }
        });

        // Each event takes 22 bytes on disk, so every batch holds one.
        assert_eq!(f.storage.granted_orchestrator().get_all_files().len(), 4);
    }

    #[derive(Debug)]
    struct UndeletableOrchestrator {
        root: PathBuf,
        batch: PathBuf,
    }

    impl FileOrchestrator for UndeletableOrchestrator {
        fn get_writable_file(&self, _force_new_file: bool) -> Option<PathBuf> {
            None
        }

        fn get_readable_file(&self, excluded: &HashSet<PathBuf>) -> Option<PathBuf> {
            (!excluded.contains(&self.batch)).then(|| self.batch.clone())
        }

        fn get_all_files(&self) -> Vec<PathBuf> {
            vec![self.batch.clone()]
        }

        fn get_flushable_files(&self) -> Vec<PathBuf> {
            self.get_all_files()
        }

        fn root_dir(&self) -> &Path {
            &self.root
        }

        fn metadata_file(&self, batch_file: &Path) -> PathBuf {
            batch_file.with_file_name("1000_metadata")
        }
    }

    #[test]
    fn test_undeletable_empty_batch_is_skipped_once() {
        let dir = TempDir::new().unwrap();
        // A path below a regular file reads as empty and cannot be removed.
        let root = dir.path().join("logs-v2");
        fs::write(&root, b"not a directory").unwrap();
        let granted = FileDataProcessor::new(
            Arc::new(UndeletableOrchestrator {
                batch: root.join("1000"),
                root,
            }),
            Arc::new(PlainBatchFileReaderWriter),
            BatchMetadataReaderWriter::default(),
            MAX_ITEM_SIZE,
        );
        let pending = FileDataProcessor::new(
            Arc::new(BatchFileOrchestrator::new(
                dir.path().join("logs-pending-v2"),
                FilePersistenceConfig::default(),
                Arc::new(ManualTimeProvider::new(NOW)),
            )),
            Arc::new(PlainBatchFileReaderWriter),
            BatchMetadataReaderWriter::default(),
            MAX_ITEM_SIZE,
        );
        let storage = ConsentAwareStorage::new(
            "logs",
            pending,
            granted,
            ConsentAwareFileMigrator::with_retry_delay(Duration::ZERO),
            TrackingConsent::Granted,
        );

        assert!(storage.read_next_batch().is_none());
        assert!(storage.read_next_batch().is_none());
    }

    struct GateListener {
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl TrackingConsentListener for GateListener {
        fn on_consent_updated(&self, _previous: TrackingConsent, new: TrackingConsent) {
            if new == TrackingConsent::Granted {
                self.entered.lock().unwrap().send(()).unwrap();
                self.release.lock().unwrap().recv().unwrap();
            }
        }
    }

    #[test]
    fn test_concurrent_consent_changes_reach_storage_in_order() {
        let f = fixture(TrackingConsent::Pending);
        let provider = TrackingConsentProvider::new(TrackingConsent::Pending);
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        provider.register_listener(Arc::new(GateListener {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        }));
        f.storage.attach(&provider);

        thread::scope(|s| {
            let granting = s.spawn(|| provider.set_consent(TrackingConsent::Granted));
            entered_rx.recv().unwrap();
            let refusing = s.spawn(|| provider.set_consent(TrackingConsent::NotGranted));
            thread::sleep(Duration::from_millis(50));
            release_tx.send(()).unwrap();
            granting.join().unwrap();
            refusing.join().unwrap();
        });

        assert_eq!(provider.consent(), TrackingConsent::NotGranted);
        assert_eq!(f.storage.consent(), TrackingConsent::NotGranted);
        assert!(write(&f.storage, "late"));
        assert!(f.storage.granted_orchestrator().get_all_files().is_empty());
    }
}
