// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory buffer of normalized messages awaiting batched delivery.
//!
//! Messages are appended at the tail by producers and removed from the head
//! in slices of at most `batch_size` by the flush cycle. A slice whose
//! delivery failed is appended back at the **tail**, so it loses its position
//! relative to messages enqueued after it.
//!
//! The queue may be bounded. A full queue rejects new messages without
//! mutating; unlike eviction, this leaves the decision to drop, retry or
//! publish directly to the caller.

use std::collections::VecDeque;

use crate::message::Message;

#[derive(Debug, Clone, Default)]
pub struct Queue {
    messages: VecDeque<Message>,
    /// Maximum number of queued messages. `0` means unbounded.
    max_size: usize,
}

impl Queue {
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Queue {
            messages: VecDeque::new(),
            max_size,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.max_size > 0 && self.messages.len() >= self.max_size
    }

    /// Appends `message` at the tail. Returns `false` and leaves the queue
    /// untouched when the bound has been reached.
    pub fn try_push(&mut self, message: Message) -> bool {
        if self.is_full() {
            return false;
        }
        self.messages.push_back(message);
        true
    }

    /// Removes up to `batch_size` messages from the head, in order.
    pub fn pop_batch(&mut self, batch_size: usize) -> Vec<Message> {
        let n = batch_size.min(self.messages.len());
        self.messages.drain(..n).collect()
    }

    /// Puts a failed batch back at the tail.
    ///
    /// The bound is not applied here: messages that were already accepted are
    /// never dropped on retry.
    pub fn requeue(&mut self, batch: Vec<Message>) {
        self.messages.extend(batch);
    }

    /// Messages currently queued, head first.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }
}
