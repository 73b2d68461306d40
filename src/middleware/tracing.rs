use tracing::{debug, warn};

use super::Middleware;
use crate::dispatcher::{InvocationInfo, Receipt};
use crate::response::status_reason;

/// Emits one summary event per finalized invocation.
///
/// Faults are already logged at `error` by the dispatcher; this adds the
/// per-invocation summary (outcome, status, latency, console line count)
/// that a request log would carry.
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn before(&self, info: &InvocationInfo) {
        debug!(
            invocation_id = %info.id,
            handler_name = %info.handler_name,
            "Invocation started"
        );
    }

    fn after(&self, receipt: &Receipt) {
        let latency_us = receipt.elapsed.as_micros() as u64;
        if receipt.is_fault() {
            warn!(
                invocation_id = %receipt.invocation_id,
                handler_name = %receipt.handler_name,
                status = receipt.status(),
                reason = status_reason(receipt.status()),
                latency_us = latency_us,
                console_lines = receipt.console.len(),
                "Invocation finalized with fault"
            );
        } else {
            debug!(
                invocation_id = %receipt.invocation_id,
                handler_name = %receipt.handler_name,
                status = receipt.status(),
                reason = status_reason(receipt.status()),
                latency_us = latency_us,
                console_lines = receipt.console.len(),
                "Invocation finalized"
            );
        }
    }
}
