//! Client side of the native crypto engine protocol.
//!
//! This is the "just works" layer: [`init`] connects to an engine and hands
//! back a [`Context`] whose operations (`encrypt`, `decrypt`, `sign`,
//! `version`) return [`PendingOperation`] futures. Under the hood every call
//! gets an operation id, its envelope is chunked to fit the transport's
//! message ceiling, and inbound chunks are routed back by id and reassembled.
//!
//! Failures from the caller, the transport and the engine all surface as one
//! [`ClientError`], classified by [`ErrorCode`].

pub mod channel;
pub mod config;
pub mod connection;
pub mod context;
pub mod correlator;
pub mod envelope;
pub mod error;
pub mod operation;
pub mod pending;

pub use channel::{ChannelEvent, MessageSink, TransportChannel};
pub use config::{ClientConfig, ConfigError, Endpoint, DEFAULT_MAX_PAYLOAD, DEFAULT_MAX_RESPONSE};
pub use connection::{init, init_with_stream, Connection, LifecycleState};
pub use context::{Answer, Context, Decrypted, EncryptOptions, EngineInfo};
pub use correlator::Correlator;
pub use envelope::{Request, RequestEnvelope, ResultEnvelope, ResultStatus, SignMode};
pub use error::{ClientError, ErrorCode, Result};
pub use operation::{OperationId, OperationInfo, OperationKind, OperationState};
pub use pending::PendingOperation;
