//! Fault classification for handler invocations.

use std::any::Any;
use std::cell::RefCell;
use std::sync::Once;

use serde::Serialize;
use thiserror::Error;

/// How a handler faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// The handler panicked (out-of-bounds index, failed unwrap, ...)
    Panic,
    /// The handler returned `Err`
    Error,
}

/// An uncaught fault raised while a handler ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("handler fault ({kind:?}) at {}: {message}", .location.as_deref().unwrap_or("<unknown>"))]
pub struct HandlerFaultError {
    pub kind: FaultKind,
    pub message: String,
    /// `file:line:column` of the panic, when known
    pub location: Option<String>,
}

impl HandlerFaultError {
    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self {
            kind: FaultKind::Panic,
            message: panic_message(payload),
            location: take_panic_location(),
        }
    }

    pub(crate) fn from_error(err: &anyhow::Error) -> Self {
        Self {
            kind: FaultKind::Error,
            message: format!("{err:#}"),
            location: None,
        }
    }
}

/// The handler finished without faulting but returned something that is not
/// a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("handler returned an invalid result: {found}")]
pub struct InvalidHandlerResultError {
    /// Short description of what came back instead
    pub found: String,
}

/// Any handler-origin failure. Always contained by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchError {
    #[error(transparent)]
    Fault(#[from] HandlerFaultError),
    #[error(transparent)]
    InvalidResult(#[from] InvalidHandlerResultError),
}

thread_local! {
    static LAST_PANIC_LOCATION: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Install a panic hook that records where each panic happened so the
/// dispatcher can report it. The previous hook still runs afterwards.
///
/// Idempotent; [`Dispatcher::new`](super::Dispatcher::new) calls it.
pub fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if let Some(location) = info.location() {
                let location = location.to_string();
                LAST_PANIC_LOCATION.with(|slot| *slot.borrow_mut() = Some(location));
            }
            previous(info);
        }));
    });
}

// The hook runs on the panicking thread and unwinding does not yield, so the
// slot is read on the same thread that wrote it.
fn take_panic_location() -> Option<String> {
    LAST_PANIC_LOCATION.with(|slot| slot.borrow_mut().take())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
