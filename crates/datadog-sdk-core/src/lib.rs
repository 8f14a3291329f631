// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Datadog SDK Core
//!
//! Local persistence and upload pipeline shared by the Datadog client SDKs.
//! Instrumentation (logs, RUM, tracing, session replay) hands serialized events
//! to a feature's storage; this crate batches them on disk, routes them
//! according to the user's tracking consent, and uploads them to the Datadog
//! intake on an adaptive schedule.
//!
//! ## Architecture
//!
//! ```text
//!   producer ──> DataWriter ──> ConsentAwareStorage ──┬─> <feature>-pending-v2/
//!                                                     └─> <feature>-v2/ ──> DataUploadWorker ──> intake
//!                                                                      └──> DataFlusher (shutdown)
//! ```
//!
//! - [`storage`]: batch file format, file orchestration, consent migration
//! - [`upload`]: request building, HTTP upload, backoff scheduler, flusher
//! - [`core`]: feature registration and lifecycle
//! - [`config`]: environment-driven configuration

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]
#![deny(unused_extern_crates)]

pub mod config;
pub mod consent;
pub mod context;
pub mod core;
pub mod error;
pub mod feature;
pub mod http;
pub mod logger;
pub mod storage;
pub mod system;
pub mod time;
pub mod upload;
pub mod writer;

/// Version reported to the intake in `DD-EVP-ORIGIN-VERSION` and `sdk_version` tags.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");
