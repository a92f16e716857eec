// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::message::{now_millis, Message};
use crate::queue::Queue;
use crate::transport::Transport;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error};

/// Outcome of one flush cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    /// The queue was empty; nothing was sent.
    Idle,
    /// A batch of this many messages was accepted by the node.
    Delivered(usize),
    /// Sending failed and this many messages went back to the queue tail.
    Requeued(usize),
}

/// Moves batches from the queue to the transport.
///
/// Cloning is cheap and clones share the queue, so flushes may run
/// concurrently: each one pops its own slice while holding the queue lock and
/// releases it before awaiting the network.
#[derive(Clone)]
pub struct Flusher {
    queue: Arc<Mutex<Queue>>,
    transport: Arc<dyn Transport>,
    batch_size: usize,
}

impl Flusher {
    pub fn new(queue: Arc<Mutex<Queue>>, transport: Arc<dyn Transport>, batch_size: usize) -> Self {
        Flusher {
            queue,
            transport,
            batch_size,
        }
    }

    /// Sends up to `batch_size` messages from the queue head.
    ///
    /// A failed batch is logged and appended back at the queue tail. There is
    /// no retry limit: the batch is retried by a later flush until it goes
    /// through.
    pub async fn flush(&self) -> FlushStatus {
        let batch = self.lock_queue().pop_batch(self.batch_size);
        if batch.is_empty() {
            return FlushStatus::Idle;
        }

        let n = batch.len();
        debug!("Flushing {n} queued messages");

        match self.transport.send(&batch, batch_timestamp(&batch)).await {
            Ok(_) => {
                debug!("Successfully flushed {n} messages");
                FlushStatus::Delivered(n)
            }
            Err(e) => {
                error!("Failed to flush {n} messages, requeueing them: {e}");
                self.lock_queue().requeue(batch);
                FlushStatus::Requeued(n)
            }
        }
    }

    /// Flushes until the queue is empty or a batch fails.
    ///
    /// Stopping at the first failure keeps the drain finite when the node is
    /// unreachable; the failed batch stays queued. Returns the number of
    /// delivered messages.
    pub async fn drain(&self) -> usize {
        let mut delivered = 0;
        loop {
            match self.flush().await {
                FlushStatus::Idle => break,
                FlushStatus::Delivered(n) => delivered += n,
                FlushStatus::Requeued(n) => {
                    debug!("Drain interrupted, {n} messages left in queue");
                    break;
                }
            }
        }
        delivered
    }

    pub fn queue_len(&self) -> usize {
        self.lock_queue().len()
    }

    fn lock_queue(&self) -> MutexGuard<'_, Queue> {
        // Queue operations cannot leave it half-updated, so a poisoned lock is
        // still usable.
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Timestamp for the request query string: the first message's, else now.
pub(crate) fn batch_timestamp(batch: &[Message]) -> i64 {
    batch.first().map_or_else(now_millis, Message::timestamp)
}
