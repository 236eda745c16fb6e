//! Background push queue for aggregate bundles.
//!
//! One worker task drains a bounded queue in FIFO order with at most one
//! delivery in flight. A sink call is never tied to the shutdown token, so
//! cancellation cannot truncate an in-flight store transaction; on
//! cancellation the worker delivers what is already queued, then exits.

use crate::reduce::aggregator::AggData;
use crate::remote::sink::{AggSink, SinkError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_QUEUE_SIZE: usize = 10;

struct PusherInner {
    tx: Option<mpsc::Sender<AggData>>,
    worker: Option<JoinHandle<()>>,
    token: CancellationToken,
    started: bool,
}

pub struct AggPusher {
    sink: Arc<dyn AggSink>,
    capacity: usize,
    inner: Mutex<PusherInner>,
    push_failures: Arc<AtomicU64>,
}

impl AggPusher {
    pub fn new(sink: Arc<dyn AggSink>) -> Self {
        Self::with_capacity(sink, DEFAULT_QUEUE_SIZE)
    }

    pub fn with_capacity(sink: Arc<dyn AggSink>, capacity: usize) -> Self {
        Self {
            sink,
            capacity: capacity.max(1),
            inner: Mutex::new(PusherInner {
                tx: None,
                worker: None,
                token: CancellationToken::new(),
                started: false,
            }),
            push_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Launches the worker if it is not already running. Idempotent.
    pub fn start(&self, token: CancellationToken) {
        let mut inner = self.inner.lock().unwrap();
        if inner.started {
            return;
        }
        inner.started = true;
        inner.token = token.clone();

        let (tx, rx) = mpsc::channel(self.capacity);
        inner.tx = Some(tx);

        let sink = self.sink.clone();
        let failures = self.push_failures.clone();
        inner.worker = Some(tokio::spawn(async move {
            worker_loop(rx, sink, token, failures).await;
        }));

        log::info!("🚚 Aggregate pusher started (queue capacity {})", self.capacity);
    }

    /// Enqueues a bundle for eventual delivery. Blocks while the queue is
    /// full; fails once the queue is closed or shutdown is requested while
    /// waiting. Returning Ok means accepted, not delivered.
    pub async fn push(&self, data: AggData) -> Result<(), SinkError> {
        let (tx, token) = {
            let inner = self.inner.lock().unwrap();
            (inner.tx.clone(), inner.token.clone())
        };
        let tx = tx.ok_or(SinkError::QueueClosed)?;

        tokio::select! {
            // Acceptance wins when both are ready, so a final reduce during
            // shutdown still queues its bundle for the drain
            biased;
            sent = tx.send(data) => sent.map_err(|_| SinkError::QueueClosed),
            _ = token.cancelled() => Err(SinkError::Cancelled),
        }
    }

    /// Bundles accepted but not yet handed to the sink.
    pub fn pending(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .tx
            .as_ref()
            .map(|tx| tx.max_capacity() - tx.capacity())
            .unwrap_or(0)
    }

    pub fn push_failures(&self) -> u64 {
        self.push_failures.load(Ordering::Relaxed)
    }

    /// Closes the input side and waits for the worker to drain, up to
    /// `deadline`. Returns false when the deadline elapsed with deliveries
    /// still pending; those bundles are lost, the documented trade-off of a
    /// forced shutdown.
    pub async fn wait(&self, deadline: Duration) -> bool {
        let worker = {
            let mut inner = self.inner.lock().unwrap();
            inner.tx = None; // closing the channel lets the worker finish
            inner.worker.take()
        };

        let Some(worker) = worker else {
            return true;
        };

        match tokio::time::timeout(deadline, worker).await {
            Ok(_) => true,
            Err(_) => {
                log::error!("❌ Pusher drain deadline exceeded; queued bundles lost");
                false
            }
        }
    }
}

async fn worker_loop(
    mut rx: mpsc::Receiver<AggData>,
    sink: Arc<dyn AggSink>,
    token: CancellationToken,
    failures: Arc<AtomicU64>,
) {
    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(data) => deliver(sink.as_ref(), data, &failures).await,
                // Input closed and fully drained
                None => break,
            },
            _ = token.cancelled() => {
                // Deliver what is already queued, then stop
                while let Ok(data) = rx.try_recv() {
                    deliver(sink.as_ref(), data, &failures).await;
                }
                break;
            }
        }
    }
    log::info!("✅ Aggregate pusher stopped");
}

async fn deliver(sink: &dyn AggSink, data: AggData, failures: &AtomicU64) {
    if let Err(e) = sink.push_agg_data(&data).await {
        failures.fetch_add(1, Ordering::Relaxed);
        log::error!("❌ Aggregate push failed: {}", e);
    }
}
