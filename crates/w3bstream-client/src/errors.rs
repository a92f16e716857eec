// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;

/// Errors surfaced by the client's public operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Construction-time parameters are unusable, or the client was used in a
    /// way its configuration does not allow (e.g. enqueue without batching).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The event header is invalid. Raised before any request is issued.
    #[error("validation error: {0}")]
    Validation(String),

    /// A structured payload could not be encoded as JSON.
    #[error("failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The request to the W3bstream node failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failures of a single HTTP dispatch.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{status}: unexpected response from W3bstream node: {body}")]
    Status { status: StatusCode, body: String },

    #[error("failed to resolve api key: {0}")]
    ApiKey(String),
}

impl TransportError {
    /// Status code of the failed response, if the node answered at all.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Request(e) => e.status(),
            Self::ApiKey(_) => None,
        }
    }
}
