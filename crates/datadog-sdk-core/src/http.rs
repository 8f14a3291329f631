// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client used by the uploaders.
//!
//! - **FIPS mode**: with the `fips` feature, TLS goes through a FIPS-compliant
//!   rustls provider and the native root store
//! - **Proxy**: `DD_PROXY_HTTPS` / `HTTPS_PROXY`; an unusable proxy falls back to
//!   a direct connection
//! - **Timeouts**: `DD_UPLOAD_TIMEOUT` per request, pooled connections with TCP keep-alive

use reqwest::ClientBuilder;
use std::error::Error;
use std::time::Duration;
use tracing::error;
#[cfg(feature = "fips")]
use tracing::debug;

use crate::config::Config;
use crate::error::CoreError;

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(270);
const TCP_KEEPALIVE: Duration = Duration::from_secs(120);

/// Installs the AWS-LC FIPS provider as the process-wide rustls default.
/// Must run before [`get_client`].
#[cfg(feature = "fips")]
pub fn prepare_client_provider() -> Result<(), CoreError> {
    rustls::crypto::default_fips_provider()
        .install_default()
        .map_err(|e| CoreError::HttpClient(format!("Failed to set up fips provider: {e:?}")))
}

/// Nothing to install outside FIPS builds; reqwest brings its own provider.
#[cfg(not(feature = "fips"))]
pub fn prepare_client_provider() -> Result<(), CoreError> {
    Ok(())
}

/// Builds the upload client, dropping the proxy if it cannot be used.
pub fn get_client(config: &Config) -> Result<reqwest::Client, CoreError> {
    match build_client(config, true) {
        Ok(client) => Ok(client),
        Err(e) => {
            error!("HTTP | Unable to parse proxy configuration: {e}, falling back to direct connection");
            build_client(config, false).map_err(|e| CoreError::HttpClient(e.to_string()))
        }
    }
}

fn build_client(config: &Config, allow_proxy: bool) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut client = create_reqwest_client_builder()?
        .timeout(config.upload_timeout())
        .pool_idle_timeout(Some(POOL_IDLE_TIMEOUT))
        .tcp_keepalive(Some(TCP_KEEPALIVE));

    if allow_proxy {
        if let Some(https_uri) = &config.proxy_https {
            client = client.proxy(reqwest::Proxy::https(https_uri.clone())?);
        }
    }

    Ok(client.build()?)
}

#[cfg(not(feature = "fips"))]
fn create_reqwest_client_builder() -> Result<ClientBuilder, Box<dyn Error>> {
    Ok(reqwest::Client::builder().use_rustls_tls())
}

/// The process must have installed a FIPS crypto provider, e.g. with
/// `rustls::crypto::default_fips_provider().install_default()`.
#[cfg(feature = "fips")]
fn create_reqwest_client_builder() -> Result<ClientBuilder, Box<dyn Error>> {
    let provider =
        rustls::crypto::CryptoProvider::get_default().ok_or("No crypto provider configured")?;
    if !provider.fips() {
        return Err("Crypto provider is not FIPS-compliant".into());
    }

    let mut root_cert_store = rustls::RootCertStore::empty();
    let mut valid_count = 0;
    for cert in rustls_native_certs::load_native_certs().certs {
        match root_cert_store.add(cert) {
            Ok(()) => valid_count += 1,
            Err(err) => debug!("HTTP | Failed to parse certificate: {err:?}"),
        }
    }
    if valid_count == 0 {
        return Err("No valid certificates found in native root store".into());
    }

    let config = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(rustls::ALL_VERSIONS)
        .map_err(|_| "Failed to set protocol versions")?
        .with_root_certificates(root_cert_store)
        .with_no_client_auth();
    if !config.fips() {
        return Err("The final TLS configuration is not FIPS-compliant".into());
    }
    debug!("HTTP | Client builder is configured with FIPS.");

    Ok(reqwest::Client::builder().use_preconfigured_tls(config))
}
