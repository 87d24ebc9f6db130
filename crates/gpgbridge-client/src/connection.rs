use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use gpgbridge_frame::{FrameError, MessageConfig};
use gpgbridge_transport::IpcStream;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::channel::{ChannelEvent, TransportChannel};
use crate::config::ClientConfig;
use crate::context::Context;
use crate::correlator::Correlator;
use crate::error::{ClientError, Result};
use crate::operation::{OperationId, OperationInfo, OperationKind, Settlement};

/// Where a connection is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Open,
    Closing,
    Closed,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// State reachable from both callers and the channel's reader thread.
#[derive(Debug)]
struct Shared {
    correlator: Correlator,
    state: Mutex<LifecycleState>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, LifecycleState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn transport_lost(&self, reason: Option<FrameError>) {
        let previous = std::mem::replace(&mut *self.state(), LifecycleState::Closed);
        let failed = self.correlator.close();
        if previous != LifecycleState::Open {
            return;
        }
        match reason {
            None => info!(failed, "engine closed the connection"),
            Some(err) => warn!(error = %err, failed, "connection lost"),
        }
    }
}

/// One logical connection to an engine.
///
/// Owns the transport channel and the correlator. Closing it, or losing the
/// transport, fails every pending operation with `CONNECTION_CLOSED`.
pub struct Connection {
    shared: Arc<Shared>,
    channel: TransportChannel,
}

impl Connection {
    pub(crate) fn open(stream: IpcStream, config: &ClientConfig) -> Result<Self> {
        let shared = Arc::new(Shared {
            correlator: Correlator::new(config.max_response_size),
            state: Mutex::new(LifecycleState::Open),
        });

        let events = Arc::clone(&shared);
        let channel = TransportChannel::open(
            stream,
            MessageConfig {
                max_message_size: config.max_message_size,
            },
            move |event| match event {
                ChannelEvent::Message(message) => events.correlator.on_message(message),
                ChannelEvent::Closed(reason) => events.transport_lost(reason),
            },
        )?;

        Ok(Self { shared, channel })
    }

    pub(crate) fn submit(
        &self,
        kind: OperationKind,
        payload: Bytes,
    ) -> Result<(OperationId, oneshot::Receiver<Settlement>)> {
        let (id, rx) = self.shared.correlator.begin(kind)?;
        self.shared.correlator.dispatch(&self.channel, id, payload);
        Ok((id, rx))
    }

    /// Close the connection. Idempotent.
    ///
    /// Pending operations are failed before the transport is torn down.
    pub fn disconnect(&self) {
        let previous = {
            let mut state = self.shared.state();
            let previous = *state;
            if previous == LifecycleState::Open {
                *state = LifecycleState::Closing;
            }
            previous
        };

        let failed = self.shared.correlator.close();
        self.channel.disconnect();
        *self.shared.state() = LifecycleState::Closed;

        if previous == LifecycleState::Open {
            info!(failed, transport = self.channel.transport_name(), "disconnected");
        } else {
            debug!(state = %previous, "disconnect on inactive connection");
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.shared.state()
    }

    pub fn is_open(&self) -> bool {
        self.state() == LifecycleState::Open
    }

    /// Operations dispatched and not yet settled.
    pub fn pending_count(&self) -> usize {
        self.shared.correlator.pending_count()
    }

    /// Snapshot of unsettled operations, oldest first.
    pub fn pending_operations(&self) -> Vec<OperationInfo> {
        self.shared.correlator.snapshot()
    }

    pub fn transport_name(&self) -> &'static str {
        self.channel.transport_name()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("transport", &self.transport_name())
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Connect to the configured engine and return a ready [`Context`].
///
/// Any failure, including an invalid configuration, is reported as
/// `CONNECTION_ERROR` and leaves nothing running.
pub async fn init(config: ClientConfig) -> Result<Context> {
    config.validate()?;
    debug!(endpoint = %config.endpoint, "connecting");
    let stream = config.endpoint.connect().map_err(|err| {
        warn!(endpoint = %config.endpoint, error = %err, "engine unreachable");
        ClientError::Connection(err.to_string())
    })?;
    init_with_stream(stream, config).await
}

/// Like [`init`], over a stream that is already connected.
pub async fn init_with_stream(stream: IpcStream, config: ClientConfig) -> Result<Context> {
    config.validate()?;
    let connection = Connection::open(stream, &config).map_err(|err| match err {
        ClientError::Connection(_) => err,
        other => ClientError::Connection(other.to_string()),
    })?;
    let connection = Arc::new(connection);
    let context = Context::new(Arc::clone(&connection), config);

    if context.config().probe_on_init {
        let timeout = context.config().connect_timeout();
        match tokio::time::timeout(timeout, context.version()).await {
            Ok(Ok(engine)) => {
                info!(engine = %engine.name, version = %engine.version, "engine ready");
            }
            Ok(Err(err)) => {
                connection.disconnect();
                return Err(ClientError::Connection(format!("engine probe failed: {err}")));
            }
            Err(_) => {
                connection.disconnect();
                return Err(ClientError::Connection(format!(
                    "engine did not answer within {}ms",
                    timeout.as_millis()
                )));
            }
        }
    } else {
        info!(transport = connection.transport_name(), "connection open");
    }

    Ok(context)
}
