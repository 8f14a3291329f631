// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch file lifecycle inside a single directory.
//!
//! A batch is writable while it is recent, small enough and not full; it
//! becomes readable once it is older than the batch window. The margin between
//! the two thresholds (95% / 105% of the window) keeps a file from being read
//! while a writer may still append to it.

use std::collections::HashSet;
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};

use crate::config::FilePersistenceConfig;
use crate::storage::mover::FileMover;
use crate::time::TimeProvider;

const METADATA_SUFFIX: &str = "_metadata";
const WRITE_DELAY_RATIO: f64 = 0.95;
const READ_DELAY_RATIO: f64 = 1.05;

pub trait FileOrchestrator: Send + Sync + Debug {
    /// File to append the next event to, `None` when the directory is unusable.
    fn get_writable_file(&self, force_new_file: bool) -> Option<PathBuf>;

    /// Oldest batch old enough to be uploaded and not in `excluded`.
    fn get_readable_file(&self, excluded: &HashSet<PathBuf>) -> Option<PathBuf>;

    fn get_all_files(&self) -> Vec<PathBuf>;

    /// Batches to drain on shutdown, regardless of age.
    fn get_flushable_files(&self) -> Vec<PathBuf>;

    fn root_dir(&self) -> &Path;

    fn metadata_file(&self, batch_file: &Path) -> PathBuf;
}

#[derive(Debug, Default)]
struct WriterState {
    last_file: Option<PathBuf>,
    last_file_item_count: usize,
    last_cleanup_ms: Option<u64>,
}

#[derive(Debug)]
pub struct BatchFileOrchestrator {
    root_dir: PathBuf,
    config: FilePersistenceConfig,
    time: Arc<dyn TimeProvider>,
    recent_write_delay_ms: u64,
    recent_read_delay_ms: u64,
    mover: FileMover,
    state: Mutex<WriterState>,
}

impl BatchFileOrchestrator {
    pub fn new(
        root_dir: impl Into<PathBuf>,
        config: FilePersistenceConfig,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        let recent_delay = config.recent_delay_ms as f64;
        Self {
            root_dir: root_dir.into(),
            config,
            time,
            recent_write_delay_ms: (recent_delay * WRITE_DELAY_RATIO) as u64,
            recent_read_delay_ms: (recent_delay * READ_DELAY_RATIO) as u64,
            mover: FileMover,
            state: Mutex::new(WriterState::default()),
        }
    }

    fn is_root_dir_valid(&self) -> bool {
        if self.root_dir.exists() {
            if !self.root_dir.is_dir() {
                error!(
                    "STORAGE | Batch root {} is not a directory",
                    self.root_dir.display()
                );
                return false;
            }
            let read_only = fs::metadata(&self.root_dir)
                .map(|m| m.permissions().readonly())
                .unwrap_or(true);
            if read_only {
                error!(
                    "STORAGE | Batch root {} is not writable",
                    self.root_dir.display()
                );
                return false;
            }
            true
        } else {
            match fs::create_dir_all(&self.root_dir) {
                Ok(()) => true,
                Err(e) => {
                    error!(
                        "STORAGE | Unable to create batch root {}: {e}",
                        self.root_dir.display()
                    );
                    false
                }
            }
        }
    }

    /// Batch files sorted oldest first.
    fn list_batch_files(&self) -> Vec<PathBuf> {
        let entries = match fs::read_dir(&self.root_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "STORAGE | Unable to list batch root {}: {e}",
                    self.root_dir.display()
                );
                return Vec::new();
            }
        };
        let mut batches: Vec<(u64, PathBuf)> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter_map(|path| batch_timestamp(&path).map(|ts| (ts, path)))
            .collect();
        batches.sort();
        batches.into_iter().map(|(_, path)| path).collect()
    }

    fn list_orphan_metadata_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.root_dir) else {
            return Vec::new();
        };
        entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .and_then(|name| name.strip_suffix(METADATA_SUFFIX))
                    .is_some_and(|batch| {
                        batch.parse::<u64>().is_ok() && !self.root_dir.join(batch).exists()
                    })
            })
            .collect()
    }

    fn delete_batch(&self, batch_file: &Path) -> u64 {
        let metadata_file = self.metadata_file(batch_file);
        let freed = file_size(batch_file) + file_size(&metadata_file);
        self.mover.delete(batch_file);
        self.mover.delete(&metadata_file);
        freed
    }

    #[allow(clippy::expect_used)]
    fn cleanup_if_due(&self, now: u64) {
        {
            let mut state = self.state.lock().expect("lock poisoned");
            let due = state.last_cleanup_ms.map_or(true, |last| {
                now.saturating_sub(last) >= self.config.cleanup_frequency_threshold_ms
            });
            if !due {
                return;
            }
            state.last_cleanup_ms = Some(now);
        }
        self.delete_obsolete_files(now);
        self.free_space_if_needed();
    }

    fn delete_obsolete_files(&self, now: u64) {
        let threshold = now.saturating_sub(self.config.old_file_threshold_ms);
        for batch in self.list_batch_files() {
            if batch_timestamp(&batch).is_some_and(|ts| ts < threshold) {
                debug!("STORAGE | Deleting obsolete batch {}", batch.display());
                self.delete_batch(&batch);
            }
        }
        for orphan in self.list_orphan_metadata_files() {
            debug!("STORAGE | Deleting orphan metadata {}", orphan.display());
            self.mover.delete(&orphan);
        }
    }

    fn free_space_if_needed(&self) {
        let Ok(entries) = fs::read_dir(&self.root_dir) else {
            return;
        };
        let used: u64 = entries
            .flatten()
            .filter_map(|entry| entry.metadata().ok())
            .filter(|m| m.is_file())
            .map(|m| m.len())
            .sum();
        if used <= self.config.max_disk_space {
            return;
        }

        let mut to_free = used - self.config.max_disk_space;
        warn!(
            "STORAGE | {} uses {used} bytes, over the {} bytes limit; deleting oldest batches",
            self.root_dir.display(),
            self.config.max_disk_space
        );
        for batch in self.list_batch_files() {
            if to_free == 0 {
                break;
            }
            to_free = to_free.saturating_sub(self.delete_batch(&batch));
        }
    }

    #[allow(clippy::expect_used)]
    fn reusable_writable_file(&self, now: u64) -> Option<PathBuf> {
        let mut state = self.state.lock().expect("lock poisoned");
        let last_file = state.last_file.clone()?;
        if !last_file.exists() {
            return None;
        }

        let age = now.saturating_sub(batch_timestamp(&last_file)?);
        let is_recent_enough = age < self.recent_write_delay_ms;
        let has_room_for_more = file_size(&last_file) < self.config.max_batch_size;
        let has_slot_for_more = state.last_file_item_count < self.config.max_items_per_batch;

        if is_recent_enough && has_room_for_more && has_slot_for_more {
            state.last_file_item_count += 1;
            Some(last_file)
        } else {
            None
        }
    }

    #[allow(clippy::expect_used)]
    fn create_new_file(&self, now: u64) -> PathBuf {
        let mut state = self.state.lock().expect("lock poisoned");
        let mut timestamp = now;
        if let Some(last_ts) = state.last_file.as_deref().and_then(batch_timestamp) {
            timestamp = timestamp.max(last_ts + 1);
        }
        let mut file = self.root_dir.join(timestamp.to_string());
        while file.exists() {
            timestamp += 1;
            file = self.root_dir.join(timestamp.to_string());
        }
        debug!("STORAGE | Starting new batch {}", file.display());
        state.last_file = Some(file.clone());
        state.last_file_item_count = 1;
        file
    }
}

impl FileOrchestrator for BatchFileOrchestrator {
    fn get_writable_file(&self, force_new_file: bool) -> Option<PathBuf> {
        if !self.is_root_dir_valid() {
            return None;
        }
        let now = self.time.now_ms();
        self.cleanup_if_due(now);

        if !force_new_file {
            if let Some(file) = self.reusable_writable_file(now) {
                return Some(file);
            }
        }
        Some(self.create_new_file(now))
    }

    fn get_readable_file(&self, excluded: &HashSet<PathBuf>) -> Option<PathBuf> {
        if !self.is_root_dir_valid() {
            return None;
        }
        let now = self.time.now_ms();
        self.cleanup_if_due(now);

        let threshold = now.saturating_sub(self.recent_read_delay_ms);
        self.list_batch_files().into_iter().find(|file| {
            !excluded.contains(file) && batch_timestamp(file).is_some_and(|ts| ts <= threshold)
        })
    }

    fn get_all_files(&self) -> Vec<PathBuf> {
        if !self.is_root_dir_valid() {
            return Vec::new();
        }
        self.list_batch_files()
    }

    fn get_flushable_files(&self) -> Vec<PathBuf> {
        self.get_all_files()
    }

    fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn metadata_file(&self, batch_file: &Path) -> PathBuf {
        let name = batch_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        batch_file.with_file_name(format!("{name}{METADATA_SUFFIX}"))
    }
}

/// Creation time encoded in a batch file name, `None` for any other file.
pub(crate) fn batch_timestamp(file: &Path) -> Option<u64> {
    file.file_name()?.to_str()?.parse::<u64>().ok()
}

fn file_size(file: &Path) -> u64 {
    fs::metadata(file).map(|m| m.len()).unwrap_or(0)
}
