// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client construction for the W3bstream transport.
//!
//! The client carries the per-request timeout from [`ClientOptions`] and the
//! optional HTTPS proxy (`W3BSTREAM_PROXY_HTTPS` / `HTTPS_PROXY`). A proxy URL
//! that reqwest rejects is logged and the client falls back to a direct
//! connection, so a bad proxy setting never prevents publishing.

use crate::config::ClientOptions;
use core::time::Duration;
use std::error::Error;
use tracing::error;

/// Builds the reqwest client used by [`crate::transport::HttpTransport`].
#[must_use]
pub fn get_client(options: &ClientOptions) -> reqwest::Client {
    match build_client(options, true) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            match build_client(options, false) {
                Ok(client) => client,
                Err(inner) => {
                    error!(
                        "Failed to build HTTP client without proxy: {}, using reqwest defaults",
                        inner
                    );
                    reqwest::Client::new()
                }
            }
        }
    }
}

fn build_client(
    options: &ClientOptions,
    allow_proxy: bool,
) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut client = reqwest::Client::builder()
        .timeout(options.timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if allow_proxy {
        if let Some(https_uri) = &options.https_proxy {
            let proxy = reqwest::Proxy::https(https_uri.clone())?;
            client = client.proxy(proxy);
        }
    }

    Ok(client.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_client_without_proxy() {
        let options = ClientOptions::default();
        assert!(build_client(&options, true).is_ok());
    }

    #[test]
    fn test_build_client_with_proxy() {
        let options = ClientOptions {
            https_proxy: Some("http://127.0.0.1:3128".to_string()),
            ..Default::default()
        };
        assert!(build_client(&options, true).is_ok());
    }

    #[test]
    fn test_get_client_falls_back_on_invalid_proxy() {
        let options = ClientOptions {
            https_proxy: Some("::not a url::".to_string()),
            ..Default::default()
        };
        assert!(build_client(&options, true).is_err());
        // Falls back to a direct client instead of failing
        let _client = get_client(&options);
    }
}
