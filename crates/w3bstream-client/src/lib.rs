// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client SDK for publishing device events to a W3bstream node.
//!
//! Events can be buffered in a bounded queue and shipped in batches by a
//! periodic flush worker, sent one at a time, or sent in bulk as sequential
//! chunks. Failed queued batches go back to the queue tail and are retried by
//! later flushes.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

pub mod api_key;
pub mod client;
pub mod config;
pub mod errors;
pub mod flusher;
pub mod http;
pub mod message;
pub mod queue;
pub mod transport;
pub mod worker;

pub(crate) mod test_support;

pub use api_key::ApiKeyFactory;
pub use client::W3bstreamClient;
pub use config::ClientOptions;
pub use errors::{Error, TransportError};
pub use flusher::FlushStatus;
pub use message::{Event, Header, Message, Payload, DEFAULT_EVENT_TYPE};
pub use transport::{AppletResult, EventAck, HttpTransport, PublishResponse, Transport};
pub use worker::WorkerState;
