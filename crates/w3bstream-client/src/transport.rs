// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of message batches to the W3bstream node.
//!
//! Every batch is one request:
//!
//! ```text
//! POST {url}?eventType=DA-TA_PU-SH&timestamp={ts}
//! Authorization: Bearer {api_key}
//! Content-Type: application/json
//!
//! [{"device_id": "...", "event_type": "...", "payload": "...", "timestamp": ...}, ...]
//! ```
//!
//! The [`Transport`] trait is the seam between the batching engine and the
//! network; [`HttpTransport`] is the reqwest implementation.

use crate::api_key::ApiKeyFactory;
use crate::config::ClientOptions;
use crate::errors::TransportError;
use crate::http::get_client;
use crate::message::Message;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// Event type the node expects on the query string for pushed data.
pub const DATA_PUSH_EVENT_TYPE: &str = "DA-TA_PU-SH";

/// Sends one batch of messages and reports the node's answer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `timestamp` is the value placed on the query string.
    async fn send(
        &self,
        messages: &[Message],
        timestamp: i64,
    ) -> Result<PublishResponse, TransportError>;
}

/// Successful answer of the node for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResponse {
    pub status: StatusCode,
    /// Per-event acknowledgments. Empty when the body was not an
    /// acknowledgment array.
    pub acks: Vec<EventAck>,
}

impl PublishResponse {
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            acks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAck {
    pub index: u64,
    #[serde(default)]
    pub results: Vec<AppletResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppletResult {
    #[serde(default)]
    pub applet_name: String,
    #[serde(rename = "instanceID", default)]
    pub instance_id: String,
    #[serde(default)]
    pub handler: String,
    #[serde(default)]
    pub return_value: Option<serde_json::Value>,
    #[serde(default)]
    pub code: i64,
}

/// reqwest-backed transport posting JSON batches to the node.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: Url,
    api_key_factory: Arc<ApiKeyFactory>,
}

impl HttpTransport {
    #[must_use]
    pub fn new(url: Url, api_key_factory: Arc<ApiKeyFactory>, options: &ClientOptions) -> Self {
        HttpTransport {
            client: get_client(options),
            url,
            api_key_factory,
        }
    }

    /// `{url}?eventType=DA-TA_PU-SH&timestamp={ts}`
    pub(crate) fn request_url(&self, timestamp: i64) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("eventType", DATA_PUSH_EVENT_TYPE)
            .append_pair("timestamp", &timestamp.to_string());
        url
    }

    async fn headers(&self) -> Result<HeaderMap, TransportError> {
        let api_key = self.api_key_factory.get_api_key().await?;
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| TransportError::ApiKey(e.to_string()))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        messages: &[Message],
        timestamp: i64,
    ) -> Result<PublishResponse, TransportError> {
        let headers = self.headers().await?;
        let url = self.request_url(timestamp);

        debug!("Publishing {} messages to {}", messages.len(), self.url);
        let time = Instant::now();
        let resp = self
            .client
            .post(url)
            .headers(headers)
            .json(messages)
            .send()
            .await?;
        let elapsed = time.elapsed();

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(
                "{}: Failed to publish {} messages after {} ms: {:?}",
                status,
                messages.len(),
                elapsed.as_millis(),
                body
            );
            return Err(TransportError::Status { status, body });
        }

        let bytes = resp.bytes().await?;
        let acks = serde_json::from_slice::<Vec<EventAck>>(&bytes).unwrap_or_else(|e| {
            debug!("Response body is not an acknowledgment list: {e}");
            Vec::new()
        });
        debug!(
            "Published {} messages in {} ms",
            messages.len(),
            elapsed.as_millis()
        );
        Ok(PublishResponse { status, acks })
    }
}
