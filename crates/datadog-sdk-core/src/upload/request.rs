// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Turning a batch into an intake request.

use reqwest::Url;
use std::collections::BTreeMap;
use std::fmt::Debug;
use uuid::Uuid;

use crate::context::DatadogContext;
use crate::error::RequestError;
use crate::storage::RawBatchEvent;

pub const HEADER_API_KEY: &str = "DD-API-KEY";
pub const HEADER_EVP_ORIGIN: &str = "DD-EVP-ORIGIN";
pub const HEADER_EVP_ORIGIN_VERSION: &str = "DD-EVP-ORIGIN-VERSION";
pub const HEADER_REQUEST_ID: &str = "DD-REQUEST-ID";

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_TEXT_UTF8: &str = "text/plain;charset=UTF-8";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub id: String,
    /// Short label used in logs, e.g. `Logs Request`.
    pub description: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

pub trait RequestFactory: Send + Sync + Debug {
    fn create(
        &self,
        context: &DatadogContext,
        batch: &[RawBatchEvent],
        batch_metadata: Option<&[u8]>,
    ) -> Result<Request, RequestError>;
}

/// How the events of a batch are joined into a request body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadFormat {
    /// `[e1,e2,e3]`
    JsonArray,
    /// `e1\ne2\ne3`
    NewLine,
}

impl PayloadFormat {
    pub fn join(&self, batch: &[RawBatchEvent]) -> Vec<u8> {
        let (prefix, separator, suffix): (&[u8], &[u8], &[u8]) = match self {
            PayloadFormat::JsonArray => (b"[", b",", b"]"),
            PayloadFormat::NewLine => (b"", b"\n", b""),
        };
        let size = prefix.len()
            + suffix.len()
            + batch.iter().map(|e| e.data.len()).sum::<usize>()
            + separator.len() * batch.len().saturating_sub(1);

        let mut body = Vec::with_capacity(size);
        body.extend_from_slice(prefix);
        for (i, event) in batch.iter().enumerate() {
            if i > 0 {
                body.extend_from_slice(separator);
            }
            body.extend_from_slice(&event.data);
        }
        body.extend_from_slice(suffix);
        body
    }

    fn content_type(&self) -> &'static str {
        match self {
            PayloadFormat::JsonArray => CONTENT_TYPE_JSON,
            PayloadFormat::NewLine => CONTENT_TYPE_TEXT_UTF8,
        }
    }
}

/// Request factory for the JSON intakes (logs, RUM, spans, session replay).
#[derive(Clone, Debug)]
pub struct IntakeRequestFactory {
    description: &'static str,
    path: &'static str,
    format: PayloadFormat,
    /// Adds `ddtags` with service, version, sdk version and env to the query.
    include_tags: bool,
    custom_endpoint: Option<String>,
}

impl IntakeRequestFactory {
    pub fn new(description: &'static str, path: &'static str, format: PayloadFormat) -> Self {
        Self {
            description,
            path,
            format,
            include_tags: false,
            custom_endpoint: None,
        }
    }

    #[must_use]
    pub fn with_tags(mut self) -> Self {
        self.include_tags = true;
        self
    }

    #[must_use]
    pub fn with_custom_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.custom_endpoint = endpoint;
        self
    }

    pub fn logs() -> Self {
        Self::new("Logs Request", "/api/v2/logs", PayloadFormat::JsonArray)
    }

    pub fn rum() -> Self {
        Self::new("RUM Request", "/api/v2/rum", PayloadFormat::NewLine).with_tags()
    }

    pub fn spans() -> Self {
        Self::new("Traces Request", "/api/v2/spans", PayloadFormat::NewLine)
    }

    pub fn session_replay() -> Self {
        Self::new(
            "Session Replay Request",
            "/api/v2/replay",
            PayloadFormat::NewLine,
        )
        .with_tags()
    }

    fn url(&self, context: &DatadogContext) -> Result<Url, RequestError> {
        let base = self
            .custom_endpoint
            .clone()
            .unwrap_or_else(|| context.site.intake_endpoint());
        let raw = format!("{}{}", base.trim_end_matches('/'), self.path);
        let mut url = Url::parse(&raw).map_err(|e| RequestError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("ddsource", &context.source);
            if self.include_tags {
                query.append_pair("ddtags", &tags(context));
            }
        }
        Ok(url)
    }
}

impl RequestFactory for IntakeRequestFactory {
    fn create(
        &self,
        context: &DatadogContext,
        batch: &[RawBatchEvent],
        _batch_metadata: Option<&[u8]>,
    ) -> Result<Request, RequestError> {
        let id = Uuid::new_v4().to_string();
        let headers = BTreeMap::from([
            (HEADER_API_KEY.to_string(), context.client_token.clone()),
            (HEADER_EVP_ORIGIN.to_string(), context.source.clone()),
            (
                HEADER_EVP_ORIGIN_VERSION.to_string(),
                context.sdk_version.clone(),
            ),
            (HEADER_REQUEST_ID.to_string(), id.clone()),
        ]);

        Ok(Request {
            id,
            description: self.description.to_string(),
            url: self.url(context)?.to_string(),
            headers,
            body: self.format.join(batch),
            content_type: Some(self.format.content_type().to_string()),
        })
    }
}

fn tags(context: &DatadogContext) -> String {
    let mut tags = vec![
        format!("service:{}", context.service),
        format!("version:{}", context.version),
        format!("sdk_version:{}", context.sdk_version),
        format!("env:{}", context.env),
    ];
    if let Some(variant) = &context.variant {
        tags.push(format!("variant:{variant}"));
    }
    tags.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Site};

    fn context() -> DatadogContext {
        DatadogContext::from_config(&Config {
            client_token: "pub-token".to_string(),
            service: "shop".to_string(),
            env: "prod".to_string(),
            version: "1.2.3".to_string(),
            site: Site::Eu1,
            ..Default::default()
        })
    }

    fn batch() -> Vec<RawBatchEvent> {
        vec![
            RawBatchEvent::new(r#"{"a":1}"#),
            RawBatchEvent::new(r#"{"b":2}"#),
        ]
    }

    #[test]
    fn test_payload_formats() {
        assert_eq!(
            PayloadFormat::JsonArray.join(&batch()),
            br#"[{"a":1},{"b":2}]"#.to_vec()
        );
        assert_eq!(
            PayloadFormat::NewLine.join(&batch()),
            b"{\"a\":1}\n{\"b\":2}".to_vec()
        );
        assert_eq!(PayloadFormat::JsonArray.join(&[]), b"[]".to_vec());
    }

    #[test]
    fn test_logs_request() {
        let request = IntakeRequestFactory::logs()
            .create(&context(), &batch(), None)
            .unwrap();

        assert_eq!(
            request.url,
            "https://browser-intake-datadoghq.eu/api/v2/logs?ddsource=android"
        );
        assert_eq!(request.headers[HEADER_API_KEY], "pub-token");
        assert_eq!(request.headers[HEADER_EVP_ORIGIN], "android");
        assert_eq!(request.headers[HEADER_REQUEST_ID], request.id);
        assert_eq!(request.content_type.as_deref(), Some(CONTENT_TYPE_JSON));
        assert!(Uuid::parse_str(&request.id).is_ok());
    }

    #[test]
    fn test_rum_request_carries_tags() {
        let request = IntakeRequestFactory::rum()
            .create(&context(), &batch(), None)
            .unwrap();
        let url = Url::parse(&request.url).unwrap();
        let tags = url
            .query_pairs()
            .find(|(k, _)| k == "ddtags")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        assert_eq!(url.path(), "/api/v2/rum");
        assert!(tags.contains("service:shop"));
        assert!(tags.contains("env:prod"));
        assert!(tags.contains("version:1.2.3"));
        assert_eq!(request.content_type.as_deref(), Some(CONTENT_TYPE_TEXT_UTF8));
    }

    #[test]
    fn test_custom_endpoint() {
        let request = IntakeRequestFactory::spans()
            .with_custom_endpoint(Some("http://127.0.0.1:8080/".to_string()))
            .create(&context(), &batch(), None)
            .unwrap();
        assert_eq!(
            request.url,
            "http://127.0.0.1:8080/api/v2/spans?ddsource=android"
        );
    }

    #[test]
    fn test_invalid_custom_endpoint() {
        let result = IntakeRequestFactory::logs()
            .with_custom_endpoint(Some("not a url".to_string()))
            .create(&context(), &batch(), None);
        assert!(matches!(result, Err(RequestError::InvalidUrl { .. })));
    }
}
