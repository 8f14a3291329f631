// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Debug;

/// Host-provided at-rest encryption applied to every persisted block.
///
/// `decrypt(encrypt(x))` must return `x`. Encrypting non-empty data into an
/// empty buffer is treated as a failure and the write is dropped.
pub trait Encryption: Send + Sync + Debug {
    fn encrypt(&self, data: &[u8]) -> Vec<u8>;
    fn decrypt(&self, data: &[u8]) -> Vec<u8>;
}
