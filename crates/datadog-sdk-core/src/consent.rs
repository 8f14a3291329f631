// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! User tracking consent and change notification.
//!
//! | Consent       | Writes go to            | Uploaded |
//! |---------------|-------------------------|----------|
//! | `Pending`     | `<feature>-pending-v2`  | no       |
//! | `Granted`     | `<feature>-v2`          | yes      |
//! | `NotGranted`  | dropped                 | no       |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

use crate::error::ConfigError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackingConsent {
    Pending,
    Granted,
    NotGranted,
}

impl fmt::Display for TrackingConsent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrackingConsent::Pending => "pending",
            TrackingConsent::Granted => "granted",
            TrackingConsent::NotGranted => "not_granted",
        };
        f.write_str(s)
    }
}

impl FromStr for TrackingConsent {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(TrackingConsent::Pending),
            "granted" => Ok(TrackingConsent::Granted),
            "not_granted" | "not-granted" | "notgranted" => Ok(TrackingConsent::NotGranted),
            _ => Err(ConfigError::InvalidValue {
                name: "DD_TRACKING_CONSENT",
                value: s.to_string(),
            }),
        }
    }
}

pub trait TrackingConsentListener: Send + Sync {
    fn on_consent_updated(&self, previous: TrackingConsent, new: TrackingConsent);
}

/// Holds the current consent and fans changes out to listeners.
///
/// Listeners run synchronously on the thread calling [`set_consent`](Self::set_consent),
/// after the new value is visible to [`consent`](Self::consent). Updates are
/// serialized: a change is fanned out to every listener before the next one
/// starts, so listeners see changes in the order they were made. A listener
/// must not call `set_consent` itself.
pub struct TrackingConsentProvider {
    consent: RwLock<TrackingConsent>,
    update: Mutex<()>,
    listeners: Mutex<Vec<Arc<dyn TrackingConsentListener>>>,
}

impl TrackingConsentProvider {
    pub fn new(initial: TrackingConsent) -> Self {
        Self {
            consent: RwLock::new(initial),
            update: Mutex::new(()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    #[allow(clippy::expect_used)]
    pub fn consent(&self) -> TrackingConsent {
        *self.consent.read().expect("lock poisoned")
    }

    #[allow(clippy::expect_used)]
    pub fn set_consent(&self, new: TrackingConsent) {
        let _update = self.update.lock().expect("lock poisoned");
        let previous = {
            let mut current = self.consent.write().expect("lock poisoned");
            let previous = *current;
            *current = new;
            previous
        };
        if previous == new {
            return;
        }

        debug!("CONSENT | Tracking consent changed from {previous} to {new}");
        let listeners = self.listeners.lock().expect("lock poisoned").clone();
        for listener in listeners {
            listener.on_consent_updated(previous, new);
        }
    }

    #[allow(clippy::expect_used)]
    pub fn register_listener(&self, listener: Arc<dyn TrackingConsentListener>) {
        self.listeners.lock().expect("lock poisoned").push(listener);
    }

    #[allow(clippy::expect_used)]
    pub fn unregister_all(&self) {
        self.listeners.lock().expect("lock poisoned").clear();
    }
}

impl fmt::Debug for TrackingConsentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackingConsentProvider")
            .field("consent", &self.consent())
            .finish_non_exhaustive()
    }
}
