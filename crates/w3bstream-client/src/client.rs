// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Public entry point of the SDK.
//!
//! A [`W3bstreamClient`] offers three ways to publish:
//!
//! - [`W3bstreamClient::enqueue`] buffers the event; the flush worker sends it
//!   later in batches and retries failed batches. Requires
//!   `enable_batching`.
//! - [`W3bstreamClient::publish_direct`] sends one event right away.
//! - [`W3bstreamClient::publish`] sends a list of events right away, split in
//!   `batch_size` chunks sent one after the other.
//!
//! Header validation happens before anything is queued or sent, so an event
//! without a device id fails the same way on every path.

use crate::api_key::ApiKeyFactory;
use crate::config::ClientOptions;
use crate::errors::Error;
use crate::flusher::{batch_timestamp, FlushStatus, Flusher};
use crate::message::{validate_header, Event, Header, Message, Payload};
use crate::queue::Queue;
use crate::transport::{HttpTransport, PublishResponse, Transport};
use crate::worker::{Worker, WorkerState};
use reqwest::Url;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

pub struct W3bstreamClient {
    transport: Arc<dyn Transport>,
    queue: Arc<Mutex<Queue>>,
    flusher: Flusher,
    worker: Option<Worker>,
    options: ClientOptions,
}

impl W3bstreamClient {
    /// Creates a client publishing to `url` with a static API key.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] when `url` or `api_key` is empty, `url` does
    /// not parse, the options are invalid, or batching is enabled outside a
    /// Tokio runtime.
    pub fn new(url: &str, api_key: &str, options: ClientOptions) -> Result<Self, Error> {
        Self::with_api_key_factory(url, ApiKeyFactory::new(api_key), options)
    }

    /// Same as [`W3bstreamClient::new`] with a possibly deferred API key.
    pub fn with_api_key_factory(
        url: &str,
        api_key_factory: ApiKeyFactory,
        options: ClientOptions,
    ) -> Result<Self, Error> {
        if url.is_empty() {
            return Err(Error::Configuration("url is required".to_string()));
        }
        if api_key_factory.is_statically_empty() {
            return Err(Error::Configuration("api key is required".to_string()));
        }
        let url = Url::parse(url)
            .map_err(|e| Error::Configuration(format!("invalid url {url:?}: {e}")))?;
        options.validate()?;

        let transport = HttpTransport::new(url, Arc::new(api_key_factory), &options);
        Self::with_transport(Arc::new(transport), options)
    }

    /// Creates a client on top of a custom transport.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        options: ClientOptions,
    ) -> Result<Self, Error> {
        options.validate()?;

        let queue = Arc::new(Mutex::new(Queue::new(options.max_queue_size)));
        let flusher = Flusher::new(
            Arc::clone(&queue),
            Arc::clone(&transport),
            options.batch_size,
        );

        let worker = if options.enable_batching {
            if tokio::runtime::Handle::try_current().is_err() {
                return Err(Error::Configuration(
                    "batching requires a running Tokio runtime".to_string(),
                ));
            }
            Some(Worker::start(flusher.clone(), options.publish_interval))
        } else {
            None
        };

        Ok(W3bstreamClient {
            transport,
            queue,
            flusher,
            worker,
            options,
        })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Whether the flush worker is running and `enqueue` is accepted.
    pub fn is_batching(&self) -> bool {
        self.worker_state() == WorkerState::Running
    }

    pub fn worker_state(&self) -> WorkerState {
        self.worker
            .as_ref()
            .map_or(WorkerState::Stopped, Worker::state)
    }

    pub fn queue_len(&self) -> usize {
        self.lock_queue().len()
    }

    /// Buffers an event for the flush worker.
    ///
    /// Returns `Ok(false)` without queueing anything when the queue is
    /// bounded and full; the caller decides whether to drop, retry later or
    /// use [`W3bstreamClient::publish_direct`].
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if the worker is not running (batching was not
    /// enabled, or the client was stopped), [`Error::Validation`] if the
    /// header has no device id.
    pub fn enqueue(&self, header: &Header, payload: impl Into<Payload>) -> Result<bool, Error> {
        if !self.is_batching() {
            return Err(Error::Configuration(
                "attempted to enqueue without enabling batching".to_string(),
            ));
        }
        if self.lock_queue().is_full() {
            debug!(
                "Queue full ({} messages), rejecting event",
                self.options.max_queue_size
            );
            return Ok(false);
        }

        let message = Message::normalize(header, &payload.into())?;
        Ok(self.lock_queue().try_push(message))
    }

    /// Sends a single event immediately, bypassing the queue.
    pub async fn publish_direct(
        &self,
        header: &Header,
        payload: impl Into<Payload>,
    ) -> Result<PublishResponse, Error> {
        let message = Message::normalize(header, &payload.into())?;
        let timestamp = message.timestamp();
        Ok(self.transport.send(&[message], timestamp).await?)
    }

    /// Sends `events` immediately in chunks of `batch_size`.
    ///
    /// Every header is validated before the first request. Chunks are sent
    /// strictly one after the other and the responses are returned in the
    /// same order. If a chunk fails, its error is returned; earlier chunks
    /// stay delivered and later ones are not sent.
    pub async fn publish(&self, events: &[Event]) -> Result<Vec<PublishResponse>, Error> {
        for event in events {
            validate_header(&event.header)?;
        }
        let messages = events
            .iter()
            .map(|event| Message::normalize(&event.header, &event.payload))
            .collect::<Result<Vec<_>, _>>()?;

        let batch_size = self.options.batch_size;
        let n_chunks = messages.len().div_ceil(batch_size);
        debug!(
            "Publishing {} events in {n_chunks} chunks of up to {batch_size}",
            messages.len()
        );

        let mut responses = Vec::with_capacity(n_chunks);
        for (i, chunk) in messages.chunks(batch_size).enumerate() {
            let response = self
                .transport
                .send(chunk, batch_timestamp(chunk))
                .await
                .map_err(|e| {
                    debug!("Chunk {} of {n_chunks} failed: {e}", i + 1);
                    e
                })?;
            responses.push(response);
        }
        Ok(responses)
    }

    /// Sends already normalized messages as exactly one request.
    ///
    /// The query timestamp is `timestamp` when given, else the first
    /// message's.
    pub async fn publish_batch(
        &self,
        messages: &[Message],
        timestamp: Option<i64>,
    ) -> Result<PublishResponse, Error> {
        let timestamp = timestamp.unwrap_or_else(|| batch_timestamp(messages));
        Ok(self.transport.send(messages, timestamp).await?)
    }

    /// Runs one flush cycle on the queue.
    pub async fn flush(&self) -> FlushStatus {
        self.flusher.flush().await
    }

    /// Flushes until the queue is empty or a batch fails.
    pub async fn drain(&self) -> usize {
        self.flusher.drain().await
    }

    /// Stops the flush worker after a final drain. Idempotent.
    ///
    /// Returns the number of messages delivered by the final drain.
    pub async fn stop(&self) -> usize {
        match &self.worker {
            Some(worker) => worker.stop().await,
            None => 0,
        }
    }

    fn lock_queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
