// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Consent-driven migration of buffered batches.
//!
//! | previous     | new          | operation                 |
//! |--------------|--------------|---------------------------|
//! | none         | any          | wipe pending              |
//! | `Pending`    | `NotGranted` | wipe pending              |
//! | `Granted`    | `Pending`    | wipe pending              |
//! | `NotGranted` | `Pending`    | wipe pending              |
//! | `Pending`    | `Granted`    | move pending into granted |
//! | otherwise    |              | nothing                   |
//!
//! Granted data is never wiped by a consent change: it was collected while the
//! user agreed to it.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, error};

use crate::consent::TrackingConsent;
use crate::storage::mover::FileMover;
use crate::storage::orchestrator::FileOrchestrator;

const MAX_ATTEMPTS: usize = 3;
const RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataMigrationOperation {
    NoOp,
    Wipe { dir: PathBuf },
    Move { from: PathBuf, to: PathBuf },
}

impl DataMigrationOperation {
    pub fn for_transition(
        previous: Option<TrackingConsent>,
        new: TrackingConsent,
        pending_dir: &Path,
        granted_dir: &Path,
    ) -> Self {
        use TrackingConsent::{Granted, NotGranted, Pending};

        match (previous, new) {
            (None, _)
            | (Some(Pending), NotGranted)
            | (Some(Granted), Pending)
            | (Some(NotGranted), Pending) => DataMigrationOperation::Wipe {
                dir: pending_dir.to_path_buf(),
            },
            (Some(Pending), Granted) => DataMigrationOperation::Move {
                from: pending_dir.to_path_buf(),
                to: granted_dir.to_path_buf(),
            },
            _ => DataMigrationOperation::NoOp,
        }
    }

    /// Runs the operation, retrying failed attempts after `retry_delay`.
    pub fn run(&self, mover: &FileMover, retry_delay: Duration) -> bool {
        let succeeded = retry_with_delay(retry_delay, || match self {
            DataMigrationOperation::NoOp => true,
            DataMigrationOperation::Wipe { dir } => mover.clean_directory(dir),
            DataMigrationOperation::Move { from, to } => mover.move_files(from, to),
        });
        if !succeeded {
            error!("CONSENT | Data migration {self:?} failed after {MAX_ATTEMPTS} attempts");
        }
        succeeded
    }
}

/// Calls `attempt` until it succeeds, at most [`MAX_ATTEMPTS`] times.
fn retry_with_delay(retry_delay: Duration, mut attempt: impl FnMut() -> bool) -> bool {
    for remaining in (0..MAX_ATTEMPTS).rev() {
        if attempt() {
            return true;
        }
        if remaining > 0 {
            thread::sleep(retry_delay);
        }
    }
    false
}

#[derive(Debug, Clone)]
pub struct ConsentAwareFileMigrator {
    mover: FileMover,
    retry_delay: Duration,
}

impl Default for ConsentAwareFileMigrator {
    fn default() -> Self {
        Self {
            mover: FileMover,
            retry_delay: RETRY_DELAY,
        }
    }
}

impl ConsentAwareFileMigrator {
    pub fn with_retry_delay(retry_delay: Duration) -> Self {
        Self {
            mover: FileMover,
            retry_delay,
        }
    }

    pub fn migrate_data(
        &self,
        previous: Option<TrackingConsent>,
        new: TrackingConsent,
        pending: &dyn FileOrchestrator,
        granted: &dyn FileOrchestrator,
    ) -> bool {
        let operation =
            DataMigrationOperation::for_transition(previous, new, pending.root_dir(), granted.root_dir());
        if operation != DataMigrationOperation::NoOp {
            debug!("CONSENT | Migrating data for {previous:?} -> {new}: {operation:?}");
        }
        operation.run(&self.mover, self.retry_delay)
    }
}
