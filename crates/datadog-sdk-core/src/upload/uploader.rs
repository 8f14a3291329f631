// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_ENCODING, CONTENT_TYPE};
use std::error::Error;
use std::fmt::Debug;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};
use zstd::stream::write::Encoder;

use crate::context::DatadogContext;
use crate::error::RequestError;
use crate::storage::RawBatchEvent;
use crate::upload::request::{Request, RequestFactory};
use crate::upload::status::UploadStatus;

/// Sends one batch to the intake.
#[async_trait]
pub trait DataUploader: Send + Sync + Debug {
    async fn upload(
        &self,
        context: &DatadogContext,
        batch: &[RawBatchEvent],
        batch_metadata: Option<&[u8]>,
    ) -> UploadStatus;
}

#[derive(Debug, Clone)]
pub struct HttpDataUploader {
    client: reqwest::Client,
    request_factory: Arc<dyn RequestFactory>,
    compression_level: Option<i32>,
}

impl HttpDataUploader {
    pub fn new(
        client: reqwest::Client,
        request_factory: Arc<dyn RequestFactory>,
        compression_level: Option<i32>,
    ) -> Self {
        Self {
            client,
            request_factory,
            compression_level,
        }
    }

    fn headers(request: &Request, compressed: bool) -> Result<HeaderMap, RequestError> {
        let mut headers = HeaderMap::with_capacity(request.headers.len() + 2);
        for (name, value) in &request.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| RequestError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|e| RequestError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            headers.insert(header_name, header_value);
        }
        if let Some(content_type) = &request.content_type {
            let value = HeaderValue::from_str(content_type).map_err(|e| {
                RequestError::InvalidHeader {
                    name: CONTENT_TYPE.to_string(),
                    reason: e.to_string(),
                }
            })?;
            headers.insert(CONTENT_TYPE, value);
        }
        if compressed {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static("zstd"));
        }
        Ok(headers)
    }

    /// Compressed body, or `None` when compression is off or failed.
    fn compress(&self, data: &[u8]) -> Option<Vec<u8>> {
        let level = self.compression_level?;
        match encode(data, level) {
            Ok(compressed) => Some(compressed),
            Err(e) => {
                debug!("UPLOAD | Failed to compress payload, sending it as is: {e}");
                None
            }
        }
    }

    fn log_status(request: &Request, status: &UploadStatus, batch_size: usize) {
        let description = &request.description;
        let id = &request.id;
        match status {
            UploadStatus::Success { .. } => {
                debug!("UPLOAD | {description} {id}: batch of {batch_size} events sent, {status}");
            }
            UploadStatus::InvalidTokenError { .. } => {
                error!(
                    "UPLOAD | {description} {id}: {status}. Make sure the client token is valid, \
                     API keys cannot be used as client tokens"
                );
            }
            UploadStatus::HttpClientError { .. }
            | UploadStatus::HttpRedirection { .. }
            | UploadStatus::RequestCreationError { .. }
            | UploadStatus::UnknownHttpError { .. }
            | UploadStatus::UnknownError { .. } => {
                error!("UPLOAD | {description} {id}: {status}, batch of {batch_size} events dropped");
            }
            UploadStatus::HttpClientRateLimiting { .. }
            | UploadStatus::HttpServerError { .. }
            | UploadStatus::NetworkError { .. }
            | UploadStatus::DnsError { .. } => {
                warn!("UPLOAD | {description} {id}: {status}, batch will be retried");
            }
        }
    }
}

#[async_trait]
impl DataUploader for HttpDataUploader {
    async fn upload(
        &self,
        context: &DatadogContext,
        batch: &[RawBatchEvent],
        batch_metadata: Option<&[u8]>,
    ) -> UploadStatus {
        let request = match self.request_factory.create(context, batch, batch_metadata) {
            Ok(request) => request,
            Err(e) => {
                error!("UPLOAD | Unable to create request: {e}");
                return UploadStatus::RequestCreationError {
                    message: e.to_string(),
                };
            }
        };

        let compressed = self.compress(&request.body);
        let headers = match Self::headers(&request, compressed.is_some()) {
            Ok(headers) => headers,
            Err(e) => {
                let status = UploadStatus::RequestCreationError {
                    message: e.to_string(),
                };
                Self::log_status(&request, &status, batch.len());
                return status;
            }
        };
        let body = compressed.unwrap_or_else(|| request.body.clone());

        let start = Instant::now();
        let response = self
            .client
            .post(&request.url)
            .headers(headers)
            .body(body)
            .send()
            .await;

        let status = match response {
            Ok(response) => UploadStatus::from_status_code(response.status().as_u16()),
            Err(e) if is_dns_error(&e) => UploadStatus::DnsError {
                message: e.to_string(),
            },
            Err(e) => UploadStatus::NetworkError {
                message: e.to_string(),
            },
        };
        debug!(
            "UPLOAD | {} {} completed in {} ms",
            request.description,
            request.id,
            start.elapsed().as_millis()
        );
        Self::log_status(&request, &status, batch.len());
        status
    }
}

fn encode(data: &[u8], level: i32) -> Result<Vec<u8>, std::io::Error> {
    let mut encoder = Encoder::new(Vec::new(), level)?;
    encoder.write_all(data)?;
    encoder.finish()
}

/// Resolution failures surface deep in the source chain of a connect error.
fn is_dns_error(error: &reqwest::Error) -> bool {
    if !error.is_connect() {
        return false;
    }
    let mut source: Option<&(dyn Error + 'static)> = error.source();
    while let Some(cause) = source {
        let message = cause.to_string().to_lowercase();
        if message.contains("dns error") || message.contains("failed to lookup address") {
            return true;
        }
        source = cause.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::upload::request::{IntakeRequestFactory, HEADER_API_KEY};
    use mockito::{Matcher, Server};

    fn context() -> DatadogContext {
        DatadogContext::from_config(&Config {
            client_token: "pub-token".to_string(),
            ..Default::default()
        })
    }

    fn uploader(endpoint: String, compression_level: Option<i32>) -> HttpDataUploader {
        HttpDataUploader::new(
            reqwest::Client::new(),
            Arc::new(IntakeRequestFactory::logs().with_custom_endpoint(Some(endpoint))),
            compression_level,
        )
    }

    fn batch() -> Vec<RawBatchEvent> {
        vec![
            RawBatchEvent::new(r#"{"message":"a"}"#),
            RawBatchEvent::new(r#"{"message":"b"}"#),
        ]
    }

    #[tokio::test]
    async fn test_upload_sends_json_array() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v2/logs")
            .match_query(Matcher::UrlEncoded("ddsource".into(), "android".into()))
            .match_header(HEADER_API_KEY, "pub-token")
            .match_header("Content-Type", "application/json")
            .match_body(r#"[{"message":"a"},{"message":"b"}]"#)
            .with_status(202)
            .create_async()
            .await;

        let status = uploader(server.url(), None)
            .upload(&context(), &batch(), None)
            .await;

        assert_eq!(status, UploadStatus::Success { code: 202 });
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_compresses_with_zstd() {
        let mut server = Server::new_async().await;
        let expected = encode(br#"[{"message":"a"},{"message":"b"}]"#, 3).unwrap();
        let mock = server
            .mock("POST", "/api/v2/logs")
            .match_query(Matcher::Any)
            .match_header("Content-Encoding", "zstd")
            .match_body(expected)
            .with_status(202)
            .create_async()
            .await;

        let status = uploader(server.url(), Some(3))
            .upload(&context(), &batch(), None)
            .await;

        assert!(status.is_success());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_maps_intake_errors() {
        let mut server = Server::new_async().await;
        for (code, retry) in [(403, false), (429, true), (400, false), (503, true)] {
            let mock = server
                .mock("POST", "/api/v2/logs")
                .match_query(Matcher::Any)
                .with_status(code)
                .create_async()
                .await;

            let status = uploader(server.url(), None)
                .upload(&context(), &batch(), None)
                .await;

            assert_eq!(status.code(), Some(code as u16));
            assert_eq!(status.should_retry(), retry, "{code}");
            mock.remove_async().await;
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let status = uploader("http://127.0.0.1:1".to_string(), None)
            .upload(&context(), &batch(), None)
            .await;

        assert!(matches!(status, UploadStatus::NetworkError { .. }));
        assert!(status.should_retry());
    }

    #[tokio::test]
    async fn test_invalid_endpoint_is_request_creation_error() {
        let status = uploader("not a url".to_string(), None)
            .upload(&context(), &batch(), None)
            .await;

        assert!(matches!(status, UploadStatus::RequestCreationError { .. }));
        assert!(!status.should_retry());
    }
}
