// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared fixtures for the client's unit tests.

#![cfg(test)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;

use crate::errors::TransportError;
use crate::message::{Event, Header, Message, Payload};
use crate::transport::{PublishResponse, Transport};

pub(crate) const MOCK_DEVICE_ID: &str = "1234567890";

/// One request seen by [`RecordingTransport`].
#[derive(Debug, Clone)]
pub(crate) struct SentBatch {
    pub messages: Vec<Message>,
    pub timestamp: i64,
}

/// Transport that records every batch and can be told to fail.
#[derive(Debug, Default)]
pub(crate) struct RecordingTransport {
    sent: Mutex<Vec<SentBatch>>,
    /// Number of upcoming calls that fail before calls succeed again.
    failures_left: AtomicUsize,
    /// Fail on the n-th call (1-based) only; `0` disables.
    fail_on_call: AtomicUsize,
    calls: AtomicUsize,
    /// Sends that started and have not returned yet.
    in_flight: AtomicUsize,
    /// How long every send takes.
    delay: Duration,
}

impl RecordingTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn failing(times: usize) -> Arc<Self> {
        let transport = Self::default();
        transport.failures_left.store(times, Ordering::SeqCst);
        Arc::new(transport)
    }

    pub(crate) fn failing_on_call(n: usize) -> Arc<Self> {
        let transport = Self::default();
        transport.fail_on_call.store(n, Ordering::SeqCst);
        Arc::new(transport)
    }

    pub(crate) fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Batches that were accepted, in dispatch order.
    pub(crate) fn sent(&self) -> Vec<SentBatch> {
        self.sent.lock().expect("lock poisoned").clone()
    }

    pub(crate) fn sent_sizes(&self) -> Vec<usize> {
        self.sent().iter().map(|b| b.messages.len()).collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(
        &self,
        messages: &[Message],
        timestamp: i64,
    ) -> Result<PublishResponse, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
            || self.fail_on_call.load(Ordering::SeqCst) == call;
        if should_fail {
            return Err(TransportError::Status {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: "unavailable".to_string(),
            });
        }

        self.sent.lock().expect("lock poisoned").push(SentBatch {
            messages: messages.to_vec(),
            timestamp,
        });
        Ok(PublishResponse::new(StatusCode::OK))
    }
}

pub(crate) fn header() -> Header {
    Header::new(MOCK_DEVICE_ID).with_event_type("DEFAULT")
}

pub(crate) fn payload() -> Payload {
    json!({"test": "test"}).into()
}

/// `count` events whose timestamps are their index, so order is observable.
pub(crate) fn events(count: usize) -> Vec<Event> {
    (0..count)
        .map(|i| Event::new(header().with_timestamp(i as i64), payload()))
        .collect()
}

pub(crate) fn message(timestamp: i64) -> Message {
    Message::normalize(&header().with_timestamp(timestamp), &payload())
        .expect("valid test message")
}
