use crate::dispatcher::{InvocationInfo, Receipt};

/// Observer around each invocation.
///
/// Hooks see every invocation, faulted or not, but cannot change the
/// response a handler produced.
pub trait Middleware: Send + Sync {
    fn before(&self, _info: &InvocationInfo) {}
    fn after(&self, _receipt: &Receipt) {}
}
