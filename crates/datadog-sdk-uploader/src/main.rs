// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use serde_json::{json, Value};
use std::env;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use datadog_sdk_core::{
    config::Config,
    core::SdkCore,
    feature::{FeatureConfiguration, LOGS_FEATURE_NAME},
    http::prepare_client_provider,
    logger::Formatter,
    writer::DataWriter,
};

#[tokio::main]
pub async fn main() {
    let log_level = env::var("DD_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());
    let env_filter = format!("h2=off,hyper=off,rustls=off,{log_level}");

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .event_format(Formatter)
        .with_writer(std::io::stderr)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    if let Err(e) = prepare_client_provider() {
        error!("Unable to prepare TLS provider: {e}");
        return;
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading configuration: {e}");
            return;
        }
    };

    let core = match SdkCore::builder(config).build() {
        Ok(core) => core,
        Err(e) => {
            error!("Error starting SDK core: {e}");
            return;
        }
    };

    if let Err(e) = core.register_feature(FeatureConfiguration::logs(core.config())) {
        error!("Unable to register logs feature: {e}");
        return;
    }
    let Some(writer) = core.writer::<Value>(LOGS_FEATURE_NAME) else {
        error!("Logs feature is not available");
        return;
    };

    info!(
        "Buffering events from stdin into {} with consent {}",
        core.config().storage_dir.display(),
        core.tracking_consent()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Some(event) = to_event(&line) {
                        if !writer.write(&event) {
                            warn!("Event was rejected by storage");
                        }
                    }
                }
                Ok(None) => {
                    debug!("stdin closed");
                    break;
                }
                Err(e) => {
                    error!("Unable to read stdin: {e}");
                    break;
                }
            },
            _ = &mut ctrl_c => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    let flushed = core.flush_and_stop().await;
    info!("Shut down after flushing {flushed} batches");
}

/// JSON objects are sent as is; any other non-blank line becomes a message.
fn to_event(line: &str) -> Option<Value> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(line) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => Some(json!({ "message": line })),
    }
}
