use std::fmt;
use std::time::{Duration, Instant};

use bytes::Bytes;
use gpgbridge_frame::Reassembler;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::error::ClientError;

/// Connection-unique identifier of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct OperationId(u64);

impl OperationId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value carried in chunk headers.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an operation asks the engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Encrypt,
    Decrypt,
    Sign,
    Version,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
            Self::Sign => "sign",
            Self::Version => "version",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one operation.
///
/// ```text
/// Created ─▶ Dispatched ─▶ Streaming* ─▶ Completed
///    │            │             │
///    └────────────┴─────────────┴──────▶ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationState {
    Created,
    Dispatched,
    Streaming,
    Completed,
    Failed,
}

impl OperationState {
    /// Completed and Failed are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the state machine permits moving to `next`.
    pub fn can_transition_to(self, next: Self) -> bool {
        use OperationState::*;
        matches!(
            (self, next),
            (Created, Dispatched)
                | (Created, Failed)
                | (Dispatched, Streaming)
                | (Dispatched, Completed)
                | (Dispatched, Failed)
                | (Streaming, Streaming)
                | (Streaming, Completed)
                | (Streaming, Failed)
        )
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Dispatched => "dispatched",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

pub(crate) type Settlement = std::result::Result<Bytes, ClientError>;

/// Bookkeeping for one pending operation, owned by the correlator.
#[derive(Debug)]
pub(crate) struct Operation {
    pub(crate) id: OperationId,
    pub(crate) kind: OperationKind,
    pub(crate) state: OperationState,
    pub(crate) created_at: Instant,
    pub(crate) reassembler: Reassembler,
    settle: Option<oneshot::Sender<Settlement>>,
}

impl Operation {
    pub(crate) fn new(
        id: OperationId,
        kind: OperationKind,
        max_response: usize,
        settle: oneshot::Sender<Settlement>,
    ) -> Self {
        Self {
            id,
            kind,
            state: OperationState::Created,
            created_at: Instant::now(),
            reassembler: Reassembler::new(id.get(), max_response),
            settle: Some(settle),
        }
    }

    /// Move to `next` if the state machine allows it.
    pub(crate) fn advance(&mut self, next: OperationState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            false
        }
    }

    /// State a settlement with `outcome` would move to.
    pub(crate) fn settled_state(outcome: &Settlement) -> OperationState {
        if outcome.is_ok() {
            OperationState::Completed
        } else {
            OperationState::Failed
        }
    }

    /// Deliver the outcome to the waiting handle.
    ///
    /// Returns false if already settled or if the state machine forbids the
    /// step, e.g. completing an operation that was never dispatched.
    pub(crate) fn settle(&mut self, outcome: Settlement) -> bool {
        let next = Self::settled_state(&outcome);
        if !self.state.can_transition_to(next) {
            return false;
        }
        let Some(sender) = self.settle.take() else {
            return false;
        };
        self.state = next;
        // The handle may have been dropped; the operation is settled either way.
        let _ = sender.send(outcome);
        true
    }

    pub(crate) fn info(&self) -> OperationInfo {
        OperationInfo {
            id: self.id,
            kind: self.kind,
            state: self.state,
            age: self.created_at.elapsed(),
        }
    }
}

/// Snapshot of a pending operation for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationInfo {
    pub id: OperationId,
    pub kind: OperationKind,
    pub state: OperationState,
    pub age: Duration,
}
