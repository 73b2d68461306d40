use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;

use super::Middleware;
use crate::dispatcher::{InvocationInfo, Outcome, Receipt};

/// Per-handler counters.
#[derive(Debug, Default)]
pub struct HandlerStats {
    pub invocations: AtomicU64,
    pub faults: AtomicU64,
    pub total_latency_ns: AtomicU64,
}

impl HandlerStats {
    pub fn average_latency(&self) -> Duration {
        let count = self.invocations.load(Ordering::Relaxed);
        if count == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / count)
        }
    }
}

/// Middleware collecting invocation counts and latency.
///
/// All counters are atomics updated with `Ordering::Relaxed`; readings are
/// eventually consistent.
#[derive(Debug, Default)]
pub struct MetricsMiddleware {
    started: AtomicUsize,
    completed: AtomicUsize,
    faulted: AtomicUsize,
    invalid_results: AtomicUsize,
    total_latency_ns: AtomicU64,
    per_handler: DashMap<String, HandlerStats>,
}

impl MetricsMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invocations that entered the dispatcher.
    pub fn started_count(&self) -> usize {
        self.started.load(Ordering::Relaxed)
    }

    pub fn completed_count(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Panics and `Err` returns.
    pub fn faulted_count(&self) -> usize {
        self.faulted.load(Ordering::Relaxed)
    }

    pub fn invalid_result_count(&self) -> usize {
        self.invalid_results.load(Ordering::Relaxed)
    }

    /// Mean handler latency over finalized invocations.
    pub fn average_latency(&self) -> Duration {
        let finalized = (self.completed_count() + self.faulted_count() + self.invalid_result_count())
            as u64;
        if finalized == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / finalized)
        }
    }

    /// `(invocations, faults, average latency)` for `handler_name`.
    pub fn handler_stats(&self, handler_name: &str) -> Option<(u64, u64, Duration)> {
        self.per_handler.get(handler_name).map(|s| {
            (
                s.invocations.load(Ordering::Relaxed),
                s.faults.load(Ordering::Relaxed),
                s.average_latency(),
            )
        })
    }
}

impl Middleware for MetricsMiddleware {
    fn before(&self, _info: &InvocationInfo) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    fn after(&self, receipt: &Receipt) {
        let latency_ns = receipt.elapsed.as_nanos() as u64;
        self.total_latency_ns.fetch_add(latency_ns, Ordering::Relaxed);
        match receipt.outcome {
            Outcome::Completed => self.completed.fetch_add(1, Ordering::Relaxed),
            Outcome::Faulted { .. } => self.faulted.fetch_add(1, Ordering::Relaxed),
            Outcome::InvalidResult { .. } => self.invalid_results.fetch_add(1, Ordering::Relaxed),
        };

        let stats = self
            .per_handler
            .entry(receipt.handler_name.clone())
            .or_default();
        stats.invocations.fetch_add(1, Ordering::Relaxed);
        stats.total_latency_ns.fetch_add(latency_ns, Ordering::Relaxed);
        if receipt.is_fault() {
            stats.faults.fetch_add(1, Ordering::Relaxed);
        }
    }
}
