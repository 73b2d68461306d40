//! # edgerun
//!
//! **edgerun** is the execution core of an edge-function runtime: it invokes a
//! user-supplied handler once per request, contains every fault the handler
//! raises, and gives the handler an embedded key-value store shared by all
//! invocations in the process.
//!
//! ## Architecture
//!
//! - **[`store`]** - Process-wide key-value store with optional journal-backed durability
//! - **[`dispatcher`]** - Per-request lifecycle, fault containment and receipts
//! - **[`response`]** - Immutable response descriptor and its builder
//! - **[`middleware`]** - Observers around each invocation (metrics, tracing)
//! - **[`worker_pool`]** - `may` coroutine pools running invocations concurrently
//! - **[`runtime_config`]** - YAML and environment configuration
//! - **[`logging`]** - `tracing` subscriber setup
//! - **[`cli`]** - The `edgerun` command
//!
//! ### Invocation Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Caller
//!     participant Dispatcher
//!     participant Middleware
//!     participant Handler
//!     participant Store as KvStore
//!
//!     Caller->>Dispatcher: dispatch(handler)
//!     Dispatcher->>Middleware: before(info)
//!     Dispatcher->>Handler: handle(ctx) inside catch_unwind
//!     Handler->>Store: ctx.store().get("counter")
//!     Handler->>Store: ctx.store().set("counter", 0)
//!     alt returns Response
//!         Handler-->>Dispatcher: Ok(Response)
//!     else panics or returns Err
//!         Handler--xDispatcher: fault
//!         Dispatcher->>Dispatcher: synthesize 500, log with invocation id
//!     end
//!     Dispatcher->>Middleware: after(receipt)
//!     Dispatcher-->>Caller: exactly one Response
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use edgerun::dispatcher::{handler_fn, Dispatcher};
//! use edgerun::response::Response;
//! use edgerun::store::KvStore;
//! use serde_json::json;
//!
//! let dispatcher = Dispatcher::new(KvStore::in_memory());
//! let counter = handler_fn(|ctx| {
//!     let next = match ctx.store().get_as::<i64>("counter")? {
//!         Some(n) => n + 1,
//!         None => 0,
//!     };
//!     ctx.store().set("counter", json!(next))?;
//!     Ok(Response::new().into())
//! });
//!
//! assert_eq!(dispatcher.dispatch(&counter).status(), 200);
//! assert_eq!(dispatcher.dispatch(&counter).status(), 200);
//! assert_eq!(dispatcher.store().get("counter").unwrap(), Some(json!(1)));
//! ```
//!
//! ## Runtime Considerations
//!
//! edgerun uses the `may` coroutine runtime, not tokio or async-std:
//!
//! - worker pools run handlers in coroutines
//! - stack size is configurable via the `EDGERUN_STACK_SIZE` environment variable
//! - handler panics are caught with `catch_unwind`, so the crate must not be
//!   built with `panic = "abort"`

pub mod cli;
pub mod demos;
pub mod dispatcher;
pub mod ids;
pub mod logging;
pub mod middleware;
pub mod response;
pub mod runtime_config;
pub mod store;
pub mod worker_pool;

pub use dispatcher::{handler_fn, Dispatcher, Handler, HandlerOutput, InvocationContext, Receipt};
pub use response::Response;
pub use store::{DurabilityMode, KvStore, StoreError};
