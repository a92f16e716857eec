// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic flush worker.
//!
//! The worker is a Tokio task ticking on a fixed interval. Each tick spawns
//! one flush cycle as its own task and goes straight back to waiting, so a
//! slow request never delays the next tick and several dispatches may be in
//! flight at once. The flusher guarantees they carry disjoint batches.
//!
//! ```text
//!   Stopped ──start──> Running ──stop──> Stopped
//!                                  │
//!                                  └─ cancel ticker, then drain the queue
//! ```
//!
//! Stopping only cancels future ticks. Flushes that were already spawned run
//! to completion and may still requeue a failed batch after `stop` returned.

use crate::flusher::Flusher;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Stopped,
    Running,
}

pub struct Worker {
    flusher: Flusher,
    running: AtomicBool,
    cancel_token: CancellationToken,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    /// Spawns the ticker on the current Tokio runtime.
    ///
    /// Must be called from within a runtime.
    pub fn start(flusher: Flusher, publish_interval: Duration) -> Self {
        let cancel_token = CancellationToken::new();
        let ticker = tokio::spawn(run_ticker(
            flusher.clone(),
            publish_interval,
            cancel_token.clone(),
        ));
        debug!(
            "Flush worker started with a {} ms interval",
            publish_interval.as_millis()
        );

        Worker {
            flusher,
            running: AtomicBool::new(true),
            cancel_token,
            ticker: Mutex::new(Some(ticker)),
        }
    }

    pub fn state(&self) -> WorkerState {
        if self.running.load(Ordering::SeqCst) {
            WorkerState::Running
        } else {
            WorkerState::Stopped
        }
    }

    /// Cancels future ticks and drains the queue once.
    ///
    /// The ticker is cancelled and awaited first, then the final drain runs,
    /// so no tick can start a flush once the drain has begun. Returns the number of messages delivered by the final drain. Calling it
    /// again after the worker stopped is a no-op returning `0`.
    pub async fn stop(&self) -> usize {
        if self
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return 0;
        }

        self.cancel_token.cancel();
        let ticker = self
            .ticker
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(ticker) = ticker {
            if let Err(e) = ticker.await {
                error!("Flush worker task failed: {e}");
            }
        }

        debug!("Final flush of queued messages");
        let delivered = self.flusher.drain().await;
        debug!(
            "Flush worker stopped, {delivered} messages delivered by final flush, {} left in queue",
            self.flusher.queue_len()
        );
        delivered
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Ticks stop with the owner; no final flush on drop.
        self.cancel_token.cancel();
    }
}

async fn run_ticker(flusher: Flusher, publish_interval: Duration, cancel_token: CancellationToken) {
    let mut flush_interval = interval(publish_interval);
    flush_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    flush_interval.tick().await; // discard first tick, which is instantaneous

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                debug!("Flush worker cancelled");
                break;
            }
            _ = flush_interval.tick() => {
                let flusher = flusher.clone();
                tokio::spawn(async move {
                    flusher.flush().await;
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flusher::FlushStatus;
    use crate::queue::Queue;
    use crate::test_support::{message, RecordingTransport};
    use std::sync::Arc;

    const INTERVAL: Duration = Duration::from_millis(1000);

    fn setup(
        transport: Arc<RecordingTransport>,
        batch_size: usize,
        queued: usize,
    ) -> (Worker, Flusher, Arc<Mutex<Queue>>) {
        let queue = Arc::new(Mutex::new(Queue::default()));
        {
            let mut guard = queue.lock().unwrap();
            for i in 0..queued {
                guard.try_push(message(i as i64));
            }
        }
        let flusher = Flusher::new(Arc::clone(&queue), transport, batch_size);
        (Worker::start(flusher.clone(), INTERVAL), flusher, queue)
    }

    /// Lets the paused clock run past `ticks` ticks.
    async fn run_ticks(ticks: u32) {
        tokio::time::sleep(INTERVAL * ticks + Duration::from_millis(50)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_starts_running() {
        let (worker, _, _) = setup(RecordingTransport::new(), 10, 0);
        assert_eq!(worker.state(), WorkerState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_flush_before_first_interval() {
        let transport = RecordingTransport::new();
        let (_worker, flusher, _) = setup(Arc::clone(&transport), 10, 25);

        tokio::time::sleep(INTERVAL / 2).await;
        assert_eq!(transport.calls(), 0);
        assert_eq!(flusher.queue_len(), 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_tick_flushes_one_batch() {
        let transport = RecordingTransport::new();
        let (_worker, flusher, _) = setup(Arc::clone(&transport), 10, 25);

        run_ticks(1).await;
        assert_eq!(transport.sent_sizes(), vec![10]);
        assert_eq!(flusher.queue_len(), 15);

        run_ticks(1).await;
        assert_eq!(flusher.queue_len(), 5);

        run_ticks(1).await;
        assert_eq!(flusher.queue_len(), 0);
        assert_eq!(transport.sent_sizes(), vec![10, 10, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_do_not_wait_for_pending_sends() {
        let transport = RecordingTransport::slow(INTERVAL * 10);
        let (_worker, flusher, _) = setup(Arc::clone(&transport), 10, 30);

        run_ticks(3).await;
        assert_eq!(transport.calls(), 3);
        assert_eq!(transport.in_flight(), 3);
        assert_eq!(flusher.queue_len(), 0);

        run_ticks(10).await;
        assert_eq!(transport.in_flight(), 0);
        assert_eq!(transport.sent_sizes(), vec![10, 10, 10]);
        let mut delivered: Vec<i64> = transport
            .sent()
            .iter()
            .flat_map(|b| b.messages.iter().map(crate::message::Message::timestamp))
            .collect();
        delivered.sort_unstable();
        assert_eq!(delivered, (0..30).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_tick_is_retried_on_next_tick() {
        let transport = RecordingTransport::failing(1);
        let (_worker, flusher, _) = setup(Arc::clone(&transport), 10, 5);

        run_ticks(1).await;
        assert_eq!(transport.calls(), 1);
        assert_eq!(flusher.queue_len(), 5);

        run_ticks(1).await;
        assert_eq!(transport.calls(), 2);
        assert_eq!(flusher.queue_len(), 0);
        assert_eq!(transport.sent_sizes(), vec![5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_drains_and_cancels_ticks() {
        let transport = RecordingTransport::new();
        let (worker, flusher, queue) = setup(Arc::clone(&transport), 10, 25);

        assert_eq!(worker.stop().await, 25);
        assert_eq!(worker.state(), WorkerState::Stopped);
        assert_eq!(flusher.queue_len(), 0);
        let calls_after_stop = transport.calls();

        // Anything queued afterwards is never flushed by the worker
        queue.lock().unwrap().try_push(message(99));
        run_ticks(3).await;
        assert_eq!(transport.calls(), calls_after_stop);
        assert_eq!(flusher.queue_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let transport = RecordingTransport::new();
        let (worker, _, _) = setup(Arc::clone(&transport), 10, 3);

        assert_eq!(worker.stop().await, 3);
        assert_eq!(worker.stop().await, 0);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_with_failing_transport_keeps_batch() {
        let transport = RecordingTransport::failing(usize::MAX);
        let (worker, flusher, _) = setup(Arc::clone(&transport), 10, 25);

        assert_eq!(worker.stop().await, 0);
        assert_eq!(flusher.queue_len(), 25);
        assert_eq!(flusher.flush().await, FlushStatus::Requeued(10));
    }
}
