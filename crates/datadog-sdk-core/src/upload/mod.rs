// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of granted batches to the Datadog intake.
//!
//! ```text
//!   Storage::read_next_batch
//!       │
//!       v
//!   RequestFactory ──> HttpDataUploader ──> UploadStatus
//!       │                                      │
//!       v                                      v
//!   DataUploadWorker <──── delay ×0.9 / ×1.1 ──┘
//! ```
//!
//! - [`request`]: intake URL, headers and payload layout per feature
//! - [`uploader`]: HTTP POST with optional zstd compression
//! - [`status`]: intake answer, and whether the batch must be kept
//! - [`scheduler`]: the periodic worker and its backoff
//! - [`flusher`]: one-shot drain used on shutdown

pub mod flusher;
pub mod request;
pub mod scheduler;
pub mod status;
pub mod uploader;

pub use flusher::DataFlusher;
pub use request::{IntakeRequestFactory, PayloadFormat, Request, RequestFactory};
pub use scheduler::DataUploadWorker;
pub use status::UploadStatus;
pub use uploader::{DataUploader, HttpDataUploader};
