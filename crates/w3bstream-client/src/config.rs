// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::Error;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Options recognized at client construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Start the periodic flush worker and accept `enqueue` calls.
    pub enable_batching: bool,
    /// Maximum number of messages per request.
    pub batch_size: usize,
    /// Interval between two flush ticks of the worker.
    pub publish_interval: Duration,
    /// Bound on queued messages. `0` means unbounded.
    pub max_queue_size: usize,
    /// Per-request timeout of the HTTP transport.
    pub timeout: Duration,
    /// HTTPS proxy URL
    pub https_proxy: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            enable_batching: false,
            batch_size: DEFAULT_BATCH_SIZE,
            publish_interval: DEFAULT_PUBLISH_INTERVAL,
            max_queue_size: 0,
            timeout: DEFAULT_TIMEOUT,
            https_proxy: None,
        }
    }
}

impl ClientOptions {
    /// Create options from `W3BSTREAM_*` environment variables
    pub fn from_env() -> Result<Self, Error> {
        Self::from_env_iter(env::vars())
    }

    /// Same as [`ClientOptions::from_env`] over an explicit set of variables.
    ///
    /// Values that fail to parse fall back to their default.
    pub fn from_env_iter<I, K, V>(vars: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let defaults = Self::default();

        let enable_batching = vars
            .get("W3BSTREAM_ENABLE_BATCHING")
            .map(|val| matches!(val.to_lowercase().as_str(), "true" | "1"))
            .unwrap_or(defaults.enable_batching);
        let batch_size = vars
            .get("W3BSTREAM_BATCH_SIZE")
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(defaults.batch_size);
        let publish_interval = vars
            .get("W3BSTREAM_PUBLISH_INTERVAL_MS")
            .and_then(|val| val.parse::<u64>().ok())
            .map_or(defaults.publish_interval, Duration::from_millis);
        let max_queue_size = vars
            .get("W3BSTREAM_MAX_QUEUE_SIZE")
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(defaults.max_queue_size);
        let timeout = vars
            .get("W3BSTREAM_TIMEOUT_MS")
            .and_then(|val| val.parse::<u64>().ok())
            .map_or(defaults.timeout, Duration::from_millis);
        let https_proxy = vars
            .get("W3BSTREAM_PROXY_HTTPS")
            .or_else(|| vars.get("HTTPS_PROXY"))
            .filter(|val| !val.trim().is_empty())
            .cloned();

        let options = Self {
            enable_batching,
            batch_size,
            publish_interval,
            max_queue_size,
            timeout,
            https_proxy,
        };

        options.validate()?;
        Ok(options)
    }

    /// Validate the options
    pub fn validate(&self) -> Result<(), Error> {
        if self.batch_size == 0 {
            return Err(Error::Configuration(
                "batch size must be greater than 0".to_string(),
            ));
        }

        if self.publish_interval.is_zero() {
            return Err(Error::Configuration(
                "publish interval must be greater than 0".to_string(),
            ));
        }

        if self.timeout.is_zero() {
            return Err(Error::Configuration(
                "timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
