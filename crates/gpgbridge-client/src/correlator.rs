use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use bytes::{Bytes, BytesMut};
use gpgbridge_frame::{decode_chunk, encode_chunk, max_chunk_body, split};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::channel::MessageSink;
use crate::error::{ClientError, Result};
use crate::operation::{
    Operation, OperationId, OperationInfo, OperationKind, OperationState, Settlement,
};

/// Routes engine responses back to the operation that asked for them.
///
/// Owns every pending [`Operation`]. Ids are handed out in increasing order
/// and never reused; once closed, the correlator refuses new work.
#[derive(Debug)]
pub struct Correlator {
    max_response: usize,
    state: Mutex<CorrelatorState>,
}

#[derive(Debug)]
struct CorrelatorState {
    next_id: u64,
    pending: HashMap<OperationId, Operation>,
    closed: bool,
}

impl Correlator {
    /// Responses larger than `max_response` bytes reject their operation.
    pub fn new(max_response: usize) -> Self {
        Self {
            max_response,
            state: Mutex::new(CorrelatorState {
                next_id: 1,
                pending: HashMap::new(),
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CorrelatorState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new operation and return its id with the receiver its
    /// outcome will be delivered on.
    pub fn begin(
        &self,
        kind: OperationKind,
    ) -> Result<(OperationId, oneshot::Receiver<Settlement>)> {
        let mut state = self.lock();
        if state.closed {
            return Err(ClientError::ConnectionClosed);
        }

        let raw = state.next_id;
        state.next_id = raw
            .checked_add(1)
            .ok_or_else(|| ClientError::ProtocolViolation("operation ids exhausted".to_string()))?;
        let id = OperationId::new(raw);
        if state.pending.contains_key(&id) {
            return Err(ClientError::ProtocolViolation(format!(
                "operation id {id} already in use"
            )));
        }

        let (tx, rx) = oneshot::channel();
        state
            .pending
            .insert(id, Operation::new(id, kind, self.max_response, tx));
        debug!(op_id = raw, %kind, "operation created");
        Ok((id, rx))
    }

    /// Chunk `payload` to fit `sink` and send it on behalf of `id`.
    ///
    /// A send failure rejects the operation with the sink's error.
    pub fn dispatch(&self, sink: &dyn MessageSink, id: OperationId, payload: Bytes) {
        {
            let mut state = self.lock();
            let Some(op) = state.pending.get_mut(&id) else {
                return;
            };
            if !op.advance(OperationState::Dispatched) {
                return;
            }
        }

        let chunks = match split(id.get(), &payload, max_chunk_body(sink.max_message_size())) {
            Ok(chunks) => chunks,
            Err(err) => {
                warn!(op_id = id.get(), error = %err, "cannot chunk payload");
                self.reject(id, ClientError::from(err));
                return;
            }
        };
        debug!(
            op_id = id.get(),
            payload_len = payload.len(),
            chunks = chunks.len(),
            "dispatching"
        );

        let mut buf = BytesMut::new();
        for chunk in &chunks {
            encode_chunk(chunk, &mut buf);
            if let Err(err) = sink.send_message(buf.split().freeze()) {
                warn!(op_id = id.get(), error = %err, "send failed");
                self.reject(id, err);
                return;
            }
        }
    }

    /// Handle one inbound transport message.
    ///
    /// Messages that do not decode, or that name an operation that is not
    /// pending, are dropped.
    pub fn on_message(&self, message: Bytes) {
        let chunk = match decode_chunk(message) {
            Ok(chunk) => chunk,
            Err(err) => {
                warn!(error = %err, "dropping undecodable message");
                return;
            }
        };

        let id = OperationId::new(chunk.operation_id);
        let mut state = self.lock();
        let Some(op) = state.pending.get_mut(&id) else {
            debug!(
                op_id = chunk.operation_id,
                sequence = chunk.sequence,
                "dropping chunk for unknown operation"
            );
            return;
        };
        if !op.advance(OperationState::Streaming) {
            debug!(op_id = id.get(), state = %op.state, "dropping chunk for idle operation");
            return;
        }
        trace!(
            op_id = id.get(),
            sequence = chunk.sequence,
            len = chunk.bytes.len(),
            is_final = chunk.is_final,
            "chunk received"
        );

        let outcome = match op.reassembler.push(chunk) {
            Ok(None) => return,
            Ok(Some(payload)) => Ok(payload),
            Err(err) => {
                warn!(op_id = id.get(), error = %err, "rejecting operation");
                Err(ClientError::from(err))
            }
        };

        let settled = state.pending.remove(&id);
        drop(state);
        if let Some(mut op) = settled {
            op.settle(outcome);
            debug!(op_id = id.get(), state = %op.state, "operation settled");
        }
    }

    /// Fulfil a pending operation. Returns false if it was already settled or
    /// was never dispatched.
    pub fn resolve(&self, id: OperationId, payload: Bytes) -> bool {
        self.settle(id, Ok(payload))
    }

    /// Fail a pending operation. Returns false if it was already settled.
    pub fn reject(&self, id: OperationId, err: ClientError) -> bool {
        self.settle(id, Err(err))
    }

    fn settle(&self, id: OperationId, outcome: Settlement) -> bool {
        let next = Operation::settled_state(&outcome);
        let op = {
            let mut state = self.lock();
            let Some(current) = state.pending.get(&id).map(|op| op.state) else {
                return false;
            };
            if !current.can_transition_to(next) {
                debug!(op_id = id.get(), from = %current, to = %next, "settlement refused");
                return false;
            }
            state.pending.remove(&id)
        };
        match op {
            Some(mut op) => op.settle(outcome),
            None => false,
        }
    }

    /// Fail every pending operation with `CONNECTION_CLOSED` and refuse new
    /// ones. Returns the number of operations failed.
    pub fn close(&self) -> usize {
        let drained: Vec<Operation> = {
            let mut state = self.lock();
            state.closed = true;
            state.pending.drain().map(|(_, op)| op).collect()
        };

        let count = drained.len();
        for mut op in drained {
            op.settle(Err(ClientError::ConnectionClosed));
        }
        if count > 0 {
            debug!(count, "pending operations failed on close");
        }
        count
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of operations awaiting settlement.
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Pending operations ordered by id.
    pub fn snapshot(&self) -> Vec<OperationInfo> {
        let mut ops: Vec<OperationInfo> = self.lock().pending.values().map(Operation::info).collect();
        ops.sort_by_key(|info| info.id);
        ops
    }
}
