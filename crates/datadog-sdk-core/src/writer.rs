// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Typed entry point for event producers.

use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::error;

use crate::storage::{RawBatchEvent, Storage};

pub trait DataWriter<T> {
    /// Returns `false` when the element was rejected.
    fn write(&self, element: &T) -> bool;

    /// Writes every element under one storage lock, rolling over to a new batch
    /// when the current one is full; returns how many were accepted.
    fn write_all(&self, elements: &[T]) -> usize;
}

/// Serializes elements as JSON into a feature's [`Storage`].
pub struct BatchDataWriter<T> {
    storage: Arc<dyn Storage>,
    _element: PhantomData<fn(&T)>,
}

impl<T> Clone for BatchDataWriter<T> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            _element: PhantomData,
        }
    }
}

impl<T: Serialize> BatchDataWriter<T> {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            _element: PhantomData,
        }
    }

    /// Writes an already serialized event, optionally replacing the batch metadata.
    pub fn write_raw(&self, event: RawBatchEvent, batch_metadata: Option<&[u8]>) -> bool {
        let mut event = Some(event);
        let mut accepted = false;
        self.storage.write_current_batch(false, &mut |writer| {
            if let Some(event) = event.take() {
                accepted = writer.write(event, batch_metadata);
            }
        });
        accepted
    }

    fn serialize(element: &T) -> Option<RawBatchEvent> {
        match serde_json::to_vec(element) {
            Ok(data) => Some(RawBatchEvent::new(data)),
            Err(e) => {
                error!("STORAGE | Unable to serialize event: {e}");
                None
            }
        }
    }
}

impl<T: Serialize> DataWriter<T> for BatchDataWriter<T> {
    fn write(&self, element: &T) -> bool {
        match Self::serialize(element) {
            Some(event) => self.write_raw(event, None),
            None => false,
        }
    }

    fn write_all(&self, elements: &[T]) -> usize {
        let events: Vec<RawBatchEvent> = elements.iter().filter_map(Self::serialize).collect();
        let mut accepted = 0;
        let mut events = Some(events);
        self.storage.write_current_batch(false, &mut |writer| {
            for event in events.take().unwrap_or_default() {
                if writer.write(event, None) {
                    accepted += 1;
                }
            }
        });
        accepted
    }
}
