// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::RwLock;

use crate::config::{Config, Site};
use crate::consent::TrackingConsent;
use crate::SDK_VERSION;

/// Snapshot of the SDK state needed to build intake requests.
#[derive(Clone, Debug, PartialEq)]
pub struct DatadogContext {
    pub site: Site,
    pub client_token: String,
    pub service: String,
    pub env: String,
    pub version: String,
    pub variant: Option<String>,
    pub source: String,
    pub sdk_version: String,
    pub tracking_consent: TrackingConsent,
}

impl DatadogContext {
    pub fn from_config(config: &Config) -> Self {
        Self {
            site: config.site,
            client_token: config.client_token.clone(),
            service: config.service.clone(),
            env: config.env.clone(),
            version: config.version.clone(),
            variant: config.variant.clone(),
            source: config.source.clone(),
            sdk_version: SDK_VERSION.to_string(),
            tracking_consent: config.tracking_consent,
        }
    }
}

#[derive(Debug)]
pub struct ContextProvider {
    context: RwLock<DatadogContext>,
}

impl ContextProvider {
    pub fn new(context: DatadogContext) -> Self {
        Self {
            context: RwLock::new(context),
        }
    }

    #[allow(clippy::expect_used)]
    pub fn context(&self) -> DatadogContext {
        self.context.read().expect("lock poisoned").clone()
    }

    #[allow(clippy::expect_used)]
    pub fn update(&self, f: impl FnOnce(&mut DatadogContext)) {
        f(&mut self.context.write().expect("lock poisoned"));
    }
}
