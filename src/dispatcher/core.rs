//! Dispatcher core - invokes handlers and contains their faults.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::{debug, error, info, warn};

use super::fault::{install_panic_hook, DispatchError, HandlerFaultError};
use super::handler::{Handler, InvocationContext};
use super::invocation::{Invocation, InvocationInfo, InvocationState, Outcome, Receipt};
use crate::ids::InvocationId;
use crate::middleware::Middleware;
use crate::response::{Response, FAULT_STATUS};
use crate::store::KvStore;

/// Name under which a loader registers the single default-exported handler.
pub const DEFAULT_HANDLER: &str = "default";

/// Runs handlers once per request against a shared store.
///
/// Every invocation ends in exactly one [`Response`]: the handler's own, or a
/// synthesized 500 when the handler panics, returns `Err`, or returns
/// something that is not a response. Nothing a handler does escapes to the
/// caller.
#[derive(Clone)]
pub struct Dispatcher {
    store: KvStore,
    handlers: HashMap<String, Arc<dyn Handler>>,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("Dispatcher")
            .field("store", &self.store)
            .field("handlers", &names)
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(KvStore::in_memory())
    }
}

impl Dispatcher {
    /// Create a dispatcher whose handlers all see `store`.
    #[must_use]
    pub fn new(store: KvStore) -> Self {
        install_panic_hook();
        Dispatcher {
            store,
            handlers: HashMap::new(),
            middlewares: Vec::new(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &KvStore {
        &self.store
    }

    /// Register `handler` under `name`, replacing any previous one.
    pub fn register_handler<H: Handler>(&mut self, name: &str, handler: H) {
        let previous = self.handlers.insert(name.to_string(), Arc::new(handler));
        if previous.is_some() {
            warn!(
                handler_name = %name,
                total_handlers = self.handlers.len(),
                "Replaced existing handler"
            );
        } else {
            info!(
                handler_name = %name,
                total_handlers = self.handlers.len(),
                "Handler registered successfully"
            );
        }
    }

    #[must_use]
    pub fn handler(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(name).cloned()
    }

    /// Registered handler names, sorted.
    #[must_use]
    pub fn handler_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Add middleware. Hooks run in registration order.
    pub fn add_middleware(&mut self, mw: Arc<dyn Middleware>) {
        self.middlewares.push(mw);
    }

    /// Invoke `handler` once and return its final response.
    #[must_use]
    pub fn dispatch(&self, handler: &dyn Handler) -> Response {
        self.invoke(handler).response
    }

    /// Invoke `handler` once and return the full receipt.
    #[must_use]
    pub fn invoke(&self, handler: &dyn Handler) -> Receipt {
        self.invoke_with_id(DEFAULT_HANDLER, handler, InvocationId::new())
    }

    /// Invoke the handler registered under `name`, or `None` if there is none.
    #[must_use]
    pub fn invoke_named(&self, name: &str) -> Option<Receipt> {
        debug!(
            handler_name = %name,
            available_handlers = self.handlers.len(),
            "Handler lookup"
        );
        match self.handlers.get(name) {
            Some(handler) => Some(self.invoke_with_id(name, handler.as_ref(), InvocationId::new())),
            None => {
                error!(
                    handler_name = %name,
                    available_handlers = ?self.handler_names(),
                    "Handler not found"
                );
                None
            }
        }
    }

    /// Like [`invoke_named`](Self::invoke_named) but always yields a
    /// response; an unknown name is a 404.
    #[must_use]
    pub fn dispatch_named(&self, name: &str) -> Response {
        match self.invoke_named(name) {
            Some(receipt) => receipt.response,
            None => Response::error(404, &format!("handler '{name}' not found")),
        }
    }

    /// Invoke `handler` under a caller-chosen id (for correlation).
    pub fn invoke_with_id(&self, name: &str, handler: &dyn Handler, id: InvocationId) -> Receipt {
        let mut invocation = Invocation::new();
        let info = InvocationInfo {
            id,
            handler_name: name.to_string(),
        };

        for mw in &self.middlewares {
            mw.before(&info);
        }

        invocation.advance(InvocationState::Invoking);
        info!(
            invocation_id = %id,
            handler_name = %name,
            "Handler execution start"
        );

        let ctx = InvocationContext::new(id, Arc::from(name), self.store.clone());
        let start = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| handler.handle(&ctx)));
        let elapsed = start.elapsed();

        let (outcome, response) = match result {
            Ok(Ok(output)) => {
                invocation.advance(InvocationState::Completed);
                match output.into_response() {
                    Ok(response) => {
                        info!(
                            invocation_id = %id,
                            handler_name = %name,
                            status = response.status(),
                            latency_ms = elapsed.as_millis() as u64,
                            "Handler execution complete"
                        );
                        (Outcome::Completed, response)
                    }
                    Err(err) => {
                        error!(
                            invocation_id = %id,
                            handler_name = %name,
                            found = %err.found,
                            latency_ms = elapsed.as_millis() as u64,
                            "Handler returned an invalid result"
                        );
                        let response = fault_response(id, &err.to_string());
                        (
                            Outcome::InvalidResult {
                                error: DispatchError::from(err),
                            },
                            response,
                        )
                    }
                }
            }
            Ok(Err(err)) => {
                invocation.advance(InvocationState::Faulted);
                let fault = HandlerFaultError::from_error(&err);
                log_fault(id, name, &fault, elapsed.as_millis() as u64);
                let response = fault_response(id, &fault.message);
                (
                    Outcome::Faulted {
                        error: fault.into(),
                    },
                    response,
                )
            }
            Err(payload) => {
                invocation.advance(InvocationState::Faulted);
                let fault = HandlerFaultError::from_panic(payload.as_ref());
                log_fault(id, name, &fault, elapsed.as_millis() as u64);
                let response = fault_response(id, &fault.message);
                (
                    Outcome::Faulted {
                        error: fault.into(),
                    },
                    response,
                )
            }
        };

        invocation.advance(InvocationState::Finalized);

        let receipt = Receipt {
            invocation_id: id,
            handler_name: name.to_string(),
            outcome,
            response,
            console: ctx.take_console(),
            elapsed,
            states: invocation.into_trail(),
        };

        debug!(
            invocation_id = %id,
            middleware_count = self.middlewares.len(),
            status = receipt.status(),
            "Middleware after execution"
        );
        for mw in &self.middlewares {
            mw.after(&receipt);
        }

        receipt
    }
}

fn log_fault(id: InvocationId, name: &str, fault: &HandlerFaultError, latency_ms: u64) {
    error!(
        invocation_id = %id,
        handler_name = %name,
        fault_kind = ?fault.kind,
        fault_message = %fault.message,
        location = fault.location.as_deref().unwrap_or("<unknown>"),
        latency_ms = latency_ms,
        "Handler faulted"
    );
}

/// Synthesized 500. Carries the message and the invocation id, never a trace.
fn fault_response(id: InvocationId, message: &str) -> Response {
    Response::json(
        FAULT_STATUS,
        json!({
            "error": message,
            "invocation_id": id.to_string(),
        }),
    )
}
