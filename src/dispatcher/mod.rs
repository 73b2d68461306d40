//! # Dispatcher Module
//!
//! Owns the per-request lifecycle: invoke a [`Handler`] exactly once, contain
//! whatever it does, and finalize exactly one [`Response`](crate::response::Response).
//!
//! ## Outcomes
//!
//! | Handler does | Result |
//! |--------------|--------|
//! | returns a `Response` (or a descriptor-shaped JSON value) | forwarded verbatim |
//! | returns any other value, or nothing | 500, [`InvalidHandlerResultError`] |
//! | panics or returns `Err` | 500, [`HandlerFaultError`] |
//!
//! A handler is never retried. Store writes it committed before faulting
//! stay committed.
//!
//! ## Lifecycle
//!
//! `Created -> Invoking -> {Completed | Faulted} -> Finalized`, recorded on
//! every [`Receipt`].
//!
//! ## Example
//!
//! ```rust
//! use edgerun::dispatcher::{handler_fn, Dispatcher};
//! use edgerun::store::KvStore;
//! use serde_json::json;
//!
//! let dispatcher = Dispatcher::new(KvStore::in_memory());
//! let faulty = handler_fn(|ctx| {
//!     ctx.store().set("counter", json!(0))?;
//!     let empty: Vec<i64> = Vec::new();
//!     let _ = empty[0];
//!     unreachable!()
//! });
//!
//! let res = dispatcher.dispatch(&faulty);
//! assert_eq!(res.status(), 500);
//! assert_eq!(dispatcher.store().get("counter").unwrap(), Some(json!(0)));
//! ```

mod core;
mod fault;
mod handler;
mod invocation;

pub use self::core::{Dispatcher, DEFAULT_HANDLER};
pub use fault::{
    install_panic_hook, DispatchError, FaultKind, HandlerFaultError, InvalidHandlerResultError,
};
pub use handler::{handler_fn, FnHandler, Handler, HandlerOutput, InvocationContext};
pub use invocation::{InvocationInfo, InvocationState, Outcome, Receipt};
