use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::info;

use super::fault::InvalidHandlerResultError;
use crate::ids::InvocationId;
use crate::response::Response;
use crate::store::KvStore;

/// What a handler hands back to the dispatcher.
///
/// Only [`HandlerOutput::Response`], or a [`HandlerOutput::Value`] shaped like
/// a response descriptor, is a valid result. Everything else is turned into a
/// synthesized 500 by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutput {
    Response(Response),
    /// A bare JSON value; accepted only if [`Response::from_descriptor`] takes it
    Value(Value),
    /// The handler produced nothing
    Undefined,
}

impl From<Response> for HandlerOutput {
    fn from(res: Response) -> Self {
        HandlerOutput::Response(res)
    }
}

impl From<Value> for HandlerOutput {
    fn from(value: Value) -> Self {
        HandlerOutput::Value(value)
    }
}

impl From<()> for HandlerOutput {
    fn from(_: ()) -> Self {
        HandlerOutput::Undefined
    }
}

impl HandlerOutput {
    /// Resolve into the final response, or classify as an invalid result.
    pub fn into_response(self) -> Result<Response, InvalidHandlerResultError> {
        match self {
            HandlerOutput::Response(res) => Ok(res),
            HandlerOutput::Value(value) => {
                Response::from_descriptor(&value).ok_or_else(|| InvalidHandlerResultError {
                    found: describe(&value).to_string(),
                })
            }
            HandlerOutput::Undefined => Err(InvalidHandlerResultError {
                found: "undefined".to_string(),
            }),
        }
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object without a valid status",
    }
}

/// Per-invocation scope handed to a handler.
///
/// Carries the invocation id and an explicit handle to the shared store, so
/// handlers never reach for process globals.
pub struct InvocationContext {
    id: InvocationId,
    handler_name: Arc<str>,
    store: KvStore,
    console: Mutex<Vec<String>>,
}

impl InvocationContext {
    pub(crate) fn new(id: InvocationId, handler_name: Arc<str>, store: KvStore) -> Self {
        Self {
            id,
            handler_name,
            store,
            console: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn id(&self) -> InvocationId {
        self.id
    }

    #[must_use]
    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    #[must_use]
    pub fn store(&self) -> &KvStore {
        &self.store
    }

    /// Console output. Kept on the receipt and emitted under the
    /// `edgerun::console` target.
    pub fn log(&self, line: impl Into<String>) {
        let line = line.into();
        info!(
            target: "edgerun::console",
            invocation_id = %self.id,
            handler_name = %self.handler_name,
            "{line}"
        );
        self.console.lock().push(line);
    }

    pub(crate) fn take_console(&self) -> Vec<String> {
        std::mem::take(&mut *self.console.lock())
    }
}

/// A request handler.
///
/// Invoked once per request. Returning `Err` or panicking is a fault; the
/// dispatcher contains both.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, ctx: &InvocationContext) -> anyhow::Result<HandlerOutput>;
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn handle(&self, ctx: &InvocationContext) -> anyhow::Result<HandlerOutput> {
        (**self).handle(ctx)
    }
}

/// Closure adapter produced by [`handler_fn`].
pub struct FnHandler<F>(F);

impl<F> Handler for FnHandler<F>
where
    F: Fn(&InvocationContext) -> anyhow::Result<HandlerOutput> + Send + Sync + 'static,
{
    fn handle(&self, ctx: &InvocationContext) -> anyhow::Result<HandlerOutput> {
        (self.0)(ctx)
    }
}

/// Wrap a closure as a [`Handler`].
///
/// ```rust
/// use edgerun::dispatcher::{handler_fn, Dispatcher};
/// use edgerun::response::Response;
/// use edgerun::store::KvStore;
///
/// let dispatcher = Dispatcher::new(KvStore::in_memory());
/// let hello = handler_fn(|_ctx| Ok(Response::new().into()));
/// assert_eq!(dispatcher.dispatch(&hello).status(), 200);
/// ```
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&InvocationContext) -> anyhow::Result<HandlerOutput> + Send + Sync + 'static,
{
    FnHandler(f)
}
