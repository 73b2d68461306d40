//! # Response Module
//!
//! The immutable outcome descriptor delivered to the caller of an invocation.
//!
//! A [`Response`] is either built by a handler or synthesized by the
//! dispatcher when the handler faults or returns something unusable. Once
//! constructed it cannot be modified; [`ResponseBuilder`] is the only way to
//! assemble a non-default one.
//!
//! ## Default
//!
//! `Response::new()` and `Response::default()` are the documented "empty
//! success": status `200`, no headers, no body. Every call yields an equal
//! value.
//!
//! ```rust
//! use edgerun::response::Response;
//!
//! let res = Response::new();
//! assert_eq!(res.status(), 200);
//! assert!(res.body().is_none());
//! assert_eq!(res, Response::default());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;
use std::sync::Arc;

/// Maximum inline headers before heap allocation
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header storage. Names are `Arc<str>` since the same few
/// names repeat across responses.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Status of the default "empty success" response.
pub const DEFAULT_STATUS: u16 = 200;

/// Status of responses synthesized for handler faults and invalid results.
pub const FAULT_STATUS: u16 = 500;

/// Reason phrase for a status code; `"Unknown"` for codes `http` has no name for.
#[must_use]
pub fn status_reason(status: u16) -> &'static str {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown")
}

/// Immutable response descriptor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    status: u16,
    #[serde(skip_serializing_if = "SmallVec::is_empty")]
    headers: HeaderVec,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<Value>,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: DEFAULT_STATUS,
            headers: HeaderVec::new(),
            body: None,
        }
    }
}

impl Response {
    /// The "empty success" response: status 200, no headers, no body.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start building a response.
    #[must_use]
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder::default()
    }

    /// JSON response with a `content-type` header.
    #[must_use]
    pub fn json(status: u16, body: Value) -> Self {
        Self::builder()
            .status(status)
            .header("content-type", "application/json")
            .body(body)
            .build()
    }

    /// Error response carrying `{"error": message}`.
    #[must_use]
    pub fn error(status: u16, message: &str) -> Self {
        Self::json(status, serde_json::json!({ "error": message }))
    }

    /// The 500 response synthesized when a handler faults.
    #[must_use]
    pub fn fault(message: &str) -> Self {
        Self::error(FAULT_STATUS, message)
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Get a header by name (case-insensitive)
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Interpret a JSON value as a response descriptor.
    ///
    /// Accepts an object with a numeric `status` in `100..=599`, an optional
    /// `headers` object of string values and an optional `body`. Anything else
    /// returns `None`.
    #[must_use]
    pub fn from_descriptor(value: &Value) -> Option<Self> {
        let descriptor: Descriptor = serde_json::from_value(value.clone()).ok()?;
        if !(100..=599).contains(&descriptor.status) {
            return None;
        }
        let mut builder = Self::builder().status(descriptor.status);
        if let Some(headers) = descriptor.headers {
            for (name, value) in headers {
                builder = builder.header(&name, value);
            }
        }
        if let Some(body) = descriptor.body {
            builder = builder.body(body);
        }
        Some(builder.build())
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Descriptor {
    status: u16,
    headers: Option<std::collections::BTreeMap<String, String>>,
    body: Option<Value>,
}

/// Builder for [`Response`]. Starts from the default "empty success".
#[derive(Debug, Clone, Default)]
pub struct ResponseBuilder {
    inner: Response,
}

impl ResponseBuilder {
    #[must_use]
    pub fn status(mut self, status: u16) -> Self {
        self.inner.status = status;
        self
    }

    /// Add or replace a header (case-insensitive on the name).
    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.inner
            .headers
            .retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.inner.headers.push((Arc::from(name), value.into()));
        self
    }

    #[must_use]
    pub fn body(mut self, body: Value) -> Self {
        self.inner.body = Some(body);
        self
    }

    #[must_use]
    pub fn build(self) -> Response {
        self.inner
    }
}
