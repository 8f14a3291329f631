// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, error};

/// Best-effort file operations; failures are logged and reported as `false`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileMover;

impl FileMover {
    /// Deletes a file or a directory tree. A missing target counts as deleted.
    pub fn delete(&self, target: &Path) -> bool {
        let result = if target.is_dir() {
            fs::remove_dir_all(target)
        } else {
            fs::remove_file(target)
        };
        match result {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => true,
            Err(e) => {
                error!("STORAGE | Unable to delete {}: {e}", target.display());
                false
            }
        }
    }

    /// Deletes everything inside `dir`, keeping the directory itself.
    pub fn clean_directory(&self, dir: &Path) -> bool {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return true,
            Err(e) => {
                error!("STORAGE | Unable to list {}: {e}", dir.display());
                return false;
            }
        };
        entries
            .flatten()
            .fold(true, |all_deleted, entry| self.delete(&entry.path()) && all_deleted)
    }

    /// Moves every entry of `src_dir` into `dest_dir`, creating it if needed.
    pub fn move_files(&self, src_dir: &Path, dest_dir: &Path) -> bool {
        if !src_dir.exists() {
            debug!(
                "STORAGE | Nothing to move, {} does not exist",
                src_dir.display()
            );
            return true;
        }
        if !src_dir.is_dir() {
            error!("STORAGE | Move source {} is not a directory", src_dir.display());
            return false;
        }
        if let Err(e) = fs::create_dir_all(dest_dir) {
            error!("STORAGE | Unable to create {}: {e}", dest_dir.display());
            return false;
        }

        let entries = match fs::read_dir(src_dir) {
            Ok(entries) => entries,
            Err(e) => {
                error!("STORAGE | Unable to list {}: {e}", src_dir.display());
                return false;
            }
        };
        entries.flatten().fold(true, |all_moved, entry| {
            let target = dest_dir.join(entry.file_name());
            match fs::rename(entry.path(), &target) {
                Ok(()) => all_moved,
                Err(e) => {
                    error!(
                        "STORAGE | Unable to move {} to {}: {e}",
                        entry.path().display(),
                        target.display()
                    );
                    false
                }
            }
        })
    }
}
