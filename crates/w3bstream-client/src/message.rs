// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Event model and normalization.
//!
//! Producers describe an event with a [`Header`] and a [`Payload`]. Before an
//! event can travel to the W3bstream node it is normalized into a [`Message`]:
//! the header is validated, defaults are applied, and the payload is encoded
//! as text. Normalization is pure and never touches the network.

use crate::errors::Error;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Event type used when the header does not carry one.
pub const DEFAULT_EVENT_TYPE: &str = "DEFAULT";

/// Caller-supplied event metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// Epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Header {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            event_type: None,
            timestamp: None,
        }
    }

    #[must_use]
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Event body, either a JSON value or an opaque byte buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Structured(serde_json::Value),
    Binary(Vec<u8>),
}

impl Payload {
    /// Builds a structured payload from any serializable value.
    pub fn structured<T: Serialize + ?Sized>(value: &T) -> Result<Self, Error> {
        Ok(Self::Structured(serde_json::to_value(value)?))
    }

    /// Text form carried in [`Message::payload`].
    ///
    /// Structured values become compact JSON; bytes are decoded as UTF-8 with
    /// invalid sequences replaced by U+FFFD.
    pub fn encode(&self) -> Result<String, Error> {
        match self {
            Self::Structured(value) => Ok(serde_json::to_string(value)?),
            Self::Binary(bytes) => Ok(String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self::Structured(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self::Binary(bytes.to_vec())
    }
}

/// A header and payload pair accepted by the bulk publish path.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub header: Header,
    pub payload: Payload,
}

impl Event {
    pub fn new(header: Header, payload: impl Into<Payload>) -> Self {
        Self {
            header,
            payload: payload.into(),
        }
    }
}

/// Wire-ready event record. Immutable once built.
///
/// Deserializing applies the same device id check as [`Message::normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMessage")]
pub struct Message {
    device_id: String,
    event_type: String,
    payload: String,
    timestamp: i64,
}

#[derive(Deserialize)]
struct RawMessage {
    device_id: String,
    event_type: String,
    payload: String,
    timestamp: i64,
}

impl TryFrom<RawMessage> for Message {
    type Error = Error;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        if raw.device_id.is_empty() {
            return Err(Error::Validation("device id is required".to_string()));
        }
        Ok(Self {
            device_id: raw.device_id,
            event_type: raw.event_type,
            payload: raw.payload,
            timestamp: raw.timestamp,
        })
    }
}

impl Message {
    /// Validates `header`, applies defaults and encodes `payload`.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] if the device id is empty. This is checked before
    /// anything else so every publish path fails the same way.
    pub fn normalize(header: &Header, payload: &Payload) -> Result<Self, Error> {
        validate_header(header)?;

        let event_type = header
            .event_type
            .clone()
            .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string());
        let timestamp = header.timestamp.unwrap_or_else(now_millis);

        Ok(Self {
            device_id: header.device_id.clone(),
            event_type,
            payload: payload.encode()?,
            timestamp,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// Rejects headers without a device id.
pub fn validate_header(header: &Header) -> Result<(), Error> {
    if header.device_id.is_empty() {
        return Err(Error::Validation("device id is required".to_string()));
    }
    Ok(())
}

/// Current wall clock in epoch milliseconds.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}
