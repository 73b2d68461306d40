//! # Worker Pool Module
//!
//! Runs one handler on N `may` worker coroutines so invocations execute
//! concurrently against the shared store.
//!
//! ## Features
//!
//! - **Shared queue**: workers pull from one unbounded MPSC channel, which load
//!   balances requests across them
//! - **Containment**: each request goes through [`Dispatcher::invoke_with_id`],
//!   so a faulting handler never takes a worker down
//! - **Metrics**: queue depth, dispatched, completed and faulted counts
//!
//! ## Configuration
//!
//! - `EDGERUN_HANDLER_WORKERS`: number of worker coroutines (default: 4)
//! - `EDGERUN_STACK_SIZE`: worker stack size, decimal or `0x` hex (default: 64 KB)

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use may::sync::mpsc;
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::dispatcher::{Dispatcher, Handler, Receipt};
use crate::ids::InvocationId;
use crate::response::Response;
use crate::runtime_config::{RuntimeConfig, DEFAULT_HANDLER_WORKERS, DEFAULT_STACK_SIZE};

/// Configuration for a worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Number of worker coroutines
    pub num_workers: usize,
    /// Stack size for worker coroutines
    pub stack_size: usize,
}

impl WorkerPoolConfig {
    /// Load configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_runtime(&RuntimeConfig::from_env())
    }

    #[must_use]
    pub fn from_runtime(config: &RuntimeConfig) -> Self {
        Self {
            num_workers: config.handler_workers.max(1),
            stack_size: config.stack_size,
        }
    }

    #[must_use]
    pub fn new(num_workers: usize, stack_size: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
            stack_size,
        }
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: DEFAULT_HANDLER_WORKERS,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

/// Metrics for a worker pool
#[derive(Debug, Default)]
pub struct WorkerPoolMetrics {
    /// Current queue depth (approximate)
    pub queue_depth: AtomicUsize,
    /// Total requests dispatched
    pub dispatched_count: AtomicU64,
    /// Total requests completed, faulted or not
    pub completed_count: AtomicU64,
    /// Completed requests whose receipt is a fault
    pub faulted_count: AtomicU64,
}

impl WorkerPoolMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_dispatch(&self) {
        self.dispatched_count.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completion(&self, faulted: bool) {
        self.completed_count.fetch_add(1, Ordering::Relaxed);
        if faulted {
            self.faulted_count.fetch_add(1, Ordering::Relaxed);
        }
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    /// Undo a dispatch whose send failed.
    fn record_rejected(&self) {
        self.dispatched_count.fetch_sub(1, Ordering::Relaxed);
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get_queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    pub fn get_dispatched_count(&self) -> u64 {
        self.dispatched_count.load(Ordering::Relaxed)
    }

    pub fn get_completed_count(&self) -> u64 {
        self.completed_count.load(Ordering::Relaxed)
    }

    pub fn get_faulted_count(&self) -> u64 {
        self.faulted_count.load(Ordering::Relaxed)
    }
}

struct PoolRequest {
    id: InvocationId,
    reply_tx: mpsc::Sender<Receipt>,
}

/// A pool of worker coroutines invoking one handler.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    sender: Mutex<Option<mpsc::Sender<PoolRequest>>>,
    metrics: Arc<WorkerPoolMetrics>,
    handler_name: String,
}

impl WorkerPool {
    /// Spawn `config.num_workers` coroutines that run `handler` through
    /// `dispatcher` for each submitted request.
    ///
    /// # Safety
    ///
    /// This function is marked unsafe because it spawns coroutines using `may::coroutine::Builder::spawn()`,
    /// which is unsafe in the `may` runtime. The caller must ensure the May coroutine runtime is properly initialized.
    pub unsafe fn new(
        handler_name: &str,
        config: WorkerPoolConfig,
        dispatcher: Arc<Dispatcher>,
        handler: Arc<dyn Handler>,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<PoolRequest>();
        let rx = Arc::new(rx);
        let metrics = Arc::new(WorkerPoolMetrics::new());
        let handler_name = handler_name.to_string();

        info!(
            handler_name = %handler_name,
            num_workers = config.num_workers,
            stack_size = config.stack_size,
            "Creating worker pool"
        );

        for worker_id in 0..config.num_workers {
            let rx = Arc::clone(&rx);
            let dispatcher = Arc::clone(&dispatcher);
            let handler = Arc::clone(&handler);
            let metrics = Arc::clone(&metrics);
            let name = handler_name.clone();

            let spawn_result = may::coroutine::Builder::new()
                .stack_size(config.stack_size)
                .spawn(move || {
                    debug!(handler_name = %name, worker_id = worker_id, "Worker coroutine started");

                    while let Ok(req) = rx.recv() {
                        debug!(
                            invocation_id = %req.id,
                            handler_name = %name,
                            worker_id = worker_id,
                            "Worker processing request"
                        );
                        let receipt = dispatcher.invoke_with_id(&name, handler.as_ref(), req.id);
                        metrics.record_completion(receipt.is_fault());
                        if req.reply_tx.send(receipt).is_err() {
                            debug!(
                                invocation_id = %req.id,
                                handler_name = %name,
                                "Caller went away before the receipt was delivered"
                            );
                        }
                    }

                    debug!(handler_name = %name, worker_id = worker_id, "Worker coroutine exiting");
                });

            if let Err(e) = spawn_result {
                error!(
                    handler_name = %handler_name,
                    worker_id = worker_id,
                    error = %e,
                    "Failed to spawn worker coroutine"
                );
            }
        }

        Self {
            config,
            sender: Mutex::new(Some(tx)),
            metrics,
            handler_name,
        }
    }

    /// Queue one invocation and return the channel its receipt arrives on.
    ///
    /// # Returns
    ///
    /// * `Ok(receiver)` - the invocation was queued
    /// * `Err(Response)` - the pool is shut down (503 error response)
    pub fn submit(&self) -> Result<mpsc::Receiver<Receipt>, Response> {
        self.submit_with_id(InvocationId::new())
    }

    pub fn submit_with_id(&self, id: InvocationId) -> Result<mpsc::Receiver<Receipt>, Response> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.metrics.record_dispatch();

        let sent = match self.sender.lock().as_ref() {
            Some(sender) => sender.send(PoolRequest { id, reply_tx }).is_ok(),
            None => false,
        };
        if !sent {
            self.metrics.record_rejected();
            error!(
                invocation_id = %id,
                handler_name = %self.handler_name,
                "Worker pool channel disconnected"
            );
            return Err(unavailable());
        }
        Ok(reply_rx)
    }

    /// Queue one invocation and block until its receipt arrives.
    pub fn call(&self) -> Result<Receipt, Response> {
        let rx = self.submit()?;
        rx.recv().map_err(|e| {
            error!(
                handler_name = %self.handler_name,
                error = %e,
                "Worker dropped the reply channel"
            );
            unavailable()
        })
    }

    /// Like [`call`](Self::call) but always yields a response.
    #[must_use]
    pub fn dispatch(&self) -> Response {
        match self.call() {
            Ok(receipt) => receipt.response,
            Err(response) => response,
        }
    }

    /// Close the queue. Workers exit once it drains; later submissions get 503.
    pub fn shutdown(&self) {
        if self.sender.lock().take().is_some() {
            info!(handler_name = %self.handler_name, "Worker pool shut down");
        }
    }

    pub fn metrics(&self) -> &Arc<WorkerPoolMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }
}

fn unavailable() -> Response {
    Response::error(503, "Handler workers are not responding")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_pool_config_default() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.stack_size, 0x10000);
    }

    #[test]
    fn test_zero_workers_is_clamped() {
        assert_eq!(WorkerPoolConfig::new(0, 0x8000).num_workers, 1);
        let runtime = RuntimeConfig {
            handler_workers: 0,
            ..RuntimeConfig::default()
        };
        assert_eq!(WorkerPoolConfig::from_runtime(&runtime).num_workers, 1);
    }

    #[test]
    fn test_worker_pool_metrics() {
        let metrics = WorkerPoolMetrics::new();

        assert_eq!(metrics.get_queue_depth(), 0);
        assert_eq!(metrics.get_dispatched_count(), 0);

        metrics.record_dispatch();
        metrics.record_dispatch();
        assert_eq!(metrics.get_dispatched_count(), 2);
        assert_eq!(metrics.get_queue_depth(), 2);

        metrics.record_completion(false);
        metrics.record_completion(true);
        assert_eq!(metrics.get_completed_count(), 2);
        assert_eq!(metrics.get_faulted_count(), 1);
        assert_eq!(metrics.get_queue_depth(), 0);
    }
}
