// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use crate::storage::RemovalReason;

/// Outcome of one batch upload.
///
/// | Status                   | Codes              | Retry |
/// |--------------------------|--------------------|-------|
/// | `Success`                | 2xx                | no    |
/// | `HttpRedirection`        | 3xx                | no    |
/// | `InvalidTokenError`      | 401, 403           | no    |
/// | `HttpClientRateLimiting` | 408, 429           | yes   |
/// | `HttpClientError`        | other 4xx          | no    |
/// | `HttpServerError`        | 5xx                | yes   |
/// | `NetworkError`           | transport failure  | yes   |
/// | `DnsError`               | resolution failure | yes   |
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadStatus {
    Success { code: u16 },
    NetworkError { message: String },
    DnsError { message: String },
    RequestCreationError { message: String },
    InvalidTokenError { code: u16 },
    HttpRedirection { code: u16 },
    HttpClientError { code: u16 },
    HttpClientRateLimiting { code: u16 },
    HttpServerError { code: u16 },
    UnknownHttpError { code: u16 },
    UnknownError { message: String },
}

impl UploadStatus {
    pub fn from_status_code(code: u16) -> Self {
        match code {
            200..=299 => UploadStatus::Success { code },
            300..=399 => UploadStatus::HttpRedirection { code },
            401 | 403 => UploadStatus::InvalidTokenError { code },
            408 | 429 => UploadStatus::HttpClientRateLimiting { code },
            400..=499 => UploadStatus::HttpClientError { code },
            500..=599 => UploadStatus::HttpServerError { code },
            _ => UploadStatus::UnknownHttpError { code },
        }
    }

    /// Whether the batch should stay on disk for another attempt.
    pub fn should_retry(&self) -> bool {
        matches!(
            self,
            UploadStatus::NetworkError { .. }
                | UploadStatus::DnsError { .. }
                | UploadStatus::HttpClientRateLimiting { .. }
                | UploadStatus::HttpServerError { .. }
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UploadStatus::Success { .. })
    }

    pub fn code(&self) -> Option<u16> {
        match self {
            UploadStatus::Success { code }
            | UploadStatus::InvalidTokenError { code }
            | UploadStatus::HttpRedirection { code }
            | UploadStatus::HttpClientError { code }
            | UploadStatus::HttpClientRateLimiting { code }
            | UploadStatus::HttpServerError { code }
            | UploadStatus::UnknownHttpError { code } => Some(*code),
            UploadStatus::NetworkError { .. }
            | UploadStatus::DnsError { .. }
            | UploadStatus::RequestCreationError { .. }
            | UploadStatus::UnknownError { .. } => None,
        }
    }

    pub fn removal_reason(&self) -> RemovalReason {
        self.code()
            .map_or(RemovalReason::Invalid, RemovalReason::IntakeCode)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadStatus::Success { code } => write!(f, "accepted ({code})"),
            UploadStatus::NetworkError { message } => write!(f, "network error: {message}"),
            UploadStatus::DnsError { message } => write!(f, "DNS error: {message}"),
            UploadStatus::RequestCreationError { message } => {
                write!(f, "request creation failed: {message}")
            }
            UploadStatus::InvalidTokenError { code } => {
                write!(f, "client token rejected ({code})")
            }
            UploadStatus::HttpRedirection { code } => write!(f, "unexpected redirection ({code})"),
            UploadStatus::HttpClientError { code } => write!(f, "client error ({code})"),
            UploadStatus::HttpClientRateLimiting { code } => write!(f, "rate limited ({code})"),
            UploadStatus::HttpServerError { code } => write!(f, "server error ({code})"),
            UploadStatus::UnknownHttpError { code } => write!(f, "unknown HTTP status ({code})"),
            UploadStatus::UnknownError { message } => write!(f, "unknown error: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        let cases = [
            (202, UploadStatus::Success { code: 202 }, false),
            (301, UploadStatus::HttpRedirection { code: 301 }, false),
            (400, UploadStatus::HttpClientError { code: 400 }, false),
            (401, UploadStatus::InvalidTokenError { code: 401 }, false),
            (403, UploadStatus::InvalidTokenError { code: 403 }, false),
            (408, UploadStatus::HttpClientRateLimiting { code: 408 }, true),
            (413, UploadStatus::HttpClientError { code: 413 }, false),
            (429, UploadStatus::HttpClientRateLimiting { code: 429 }, true),
            (500, UploadStatus::HttpServerError { code: 500 }, true),
            (503, UploadStatus::HttpServerError { code: 503 }, true),
            (600, UploadStatus::UnknownHttpError { code: 600 }, false),
            (101, UploadStatus::UnknownHttpError { code: 101 }, false),
        ];
        for (code, expected, retry) in cases {
            let status = UploadStatus::from_status_code(code);
            assert_eq!(status, expected);
            assert_eq!(status.should_retry(), retry, "{code}");
            assert_eq!(status.code(), Some(code));
        }
    }

    #[test]
    fn test_transport_errors() {
        let network = UploadStatus::NetworkError {
            message: "reset".to_string(),
        };
        assert!(network.should_retry());
        assert_eq!(network.removal_reason(), RemovalReason::Invalid);

        let creation = UploadStatus::RequestCreationError {
            message: "bad url".to_string(),
        };
        assert!(!creation.should_retry());
        assert_eq!(creation.code(), None);
    }
}
