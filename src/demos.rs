//! Built-in handlers used by the `edgerun run` command and the tests.

use std::sync::Arc;

use anyhow::{bail, Context};
use serde_json::Value;

use crate::dispatcher::{Handler, HandlerOutput, InvocationContext};
use crate::response::Response;

/// Key the counter handlers read and write.
pub const COUNTER_KEY: &str = "counter";

/// Reads the counter, starts it at 0 or increments it, and returns the
/// empty success response.
#[derive(Debug, Default, Clone, Copy)]
pub struct CounterHandler;

impl Handler for CounterHandler {
    fn handle(&self, ctx: &InvocationContext) -> anyhow::Result<HandlerOutput> {
        let next = next_count(ctx)?;
        ctx.store().set(COUNTER_KEY, Value::from(next))?;
        Ok(Response::new().into())
    }
}

/// Same as [`CounterHandler`] except it indexes an empty list after the
/// write, so every invocation faults with the write already committed.
#[derive(Debug, Default, Clone, Copy)]
pub struct FaultyCounterHandler;

impl Handler for FaultyCounterHandler {
    #[allow(clippy::indexing_slicing)]
    fn handle(&self, ctx: &InvocationContext) -> anyhow::Result<HandlerOutput> {
        let next = next_count(ctx)?;
        ctx.store().set(COUNTER_KEY, Value::from(next))?;

        let scratch: Vec<Value> = Vec::new();
        let first = &scratch[1];
        ctx.log(format!("unreachable: {first}"));
        Ok(Response::new().into())
    }
}

fn next_count(ctx: &InvocationContext) -> anyhow::Result<i64> {
    let current = ctx.store().get(COUNTER_KEY)?;
    match &current {
        Some(value) => ctx.log(format!("Counter: {value}")),
        None => ctx.log("Counter: null"),
    }
    match current {
        None => Ok(0),
        Some(value) => {
            let Some(n) = value.as_i64() else {
                bail!("'{COUNTER_KEY}' holds {value}, not an integer");
            };
            n.checked_add(1).context("counter overflowed")
        }
    }
}

/// Built-in handler selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Demo {
    Counter,
    FaultyCounter,
}

impl Demo {
    #[must_use]
    pub fn handler(self) -> Arc<dyn Handler> {
        match self {
            Demo::Counter => Arc::new(CounterHandler),
            Demo::FaultyCounter => Arc::new(FaultyCounterHandler),
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Demo::Counter => "counter",
            Demo::FaultyCounter => "faulty-counter",
        }
    }
}
