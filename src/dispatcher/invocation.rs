//! Per-invocation lifecycle and the receipt it produces.

use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};

use super::fault::DispatchError;
use crate::ids::InvocationId;
use crate::response::Response;

/// Lifecycle state of one invocation.
///
/// ```text
/// Created -> Invoking -> Completed -> Finalized
///                     \-> Faulted  -/
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationState {
    Created,
    Invoking,
    Completed,
    Faulted,
    Finalized,
}

impl InvocationState {
    /// Whether `self -> next` is a legal step.
    #[must_use]
    pub fn can_advance_to(self, next: InvocationState) -> bool {
        use InvocationState::*;
        matches!(
            (self, next),
            (Created, Invoking)
                | (Invoking, Completed)
                | (Invoking, Faulted)
                | (Completed, Finalized)
                | (Faulted, Finalized)
        )
    }
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvocationState::Created => "created",
            InvocationState::Invoking => "invoking",
            InvocationState::Completed => "completed",
            InvocationState::Faulted => "faulted",
            InvocationState::Finalized => "finalized",
        };
        f.write_str(s)
    }
}

/// Tracks the state of a single invocation and the path it took.
#[derive(Debug)]
pub(crate) struct Invocation {
    state: InvocationState,
    trail: Vec<InvocationState>,
}

impl Invocation {
    pub(crate) fn new() -> Self {
        Self {
            state: InvocationState::Created,
            trail: vec![InvocationState::Created],
        }
    }

    pub(crate) fn state(&self) -> InvocationState {
        self.state
    }

    /// Move to `next`. An illegal step is a dispatcher bug and is refused.
    pub(crate) fn advance(&mut self, next: InvocationState) -> bool {
        if !self.state.can_advance_to(next) {
            debug_assert!(false, "illegal invocation transition {} -> {}", self.state, next);
            return false;
        }
        self.state = next;
        self.trail.push(next);
        true
    }

    pub(crate) fn into_trail(self) -> Vec<InvocationState> {
        self.trail
    }
}

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    /// The handler returned a usable response
    Completed,
    /// The handler panicked or returned `Err`
    Faulted { error: DispatchError },
    /// The handler returned something that is not a response
    InvalidResult { error: DispatchError },
}

impl Outcome {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed)
    }

    #[must_use]
    pub fn error(&self) -> Option<&DispatchError> {
        match self {
            Outcome::Completed => None,
            Outcome::Faulted { error } | Outcome::InvalidResult { error } => Some(error),
        }
    }
}

/// What middleware sees before a handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationInfo {
    pub id: InvocationId,
    pub handler_name: String,
}

/// Finalized record of one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub invocation_id: InvocationId,
    pub handler_name: String,
    pub outcome: Outcome,
    /// Exactly one response, whatever the outcome
    pub response: Response,
    /// Lines the handler logged through its context
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub console: Vec<String>,
    #[serde(rename = "elapsed_us", serialize_with = "serialize_micros")]
    pub elapsed: Duration,
    /// States visited, ending in `Finalized`
    pub states: Vec<InvocationState>,
}

impl Receipt {
    #[must_use]
    pub fn status(&self) -> u16 {
        self.response.status()
    }

    #[must_use]
    pub fn is_fault(&self) -> bool {
        !self.outcome.is_completed()
    }
}

fn serialize_micros<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
}
