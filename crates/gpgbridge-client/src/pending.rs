use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::error::{ClientError, Result};
use crate::operation::{OperationId, Settlement};

/// Handle to an operation that has already been validated and dispatched.
///
/// Awaiting it yields the decoded result. A handle for a request that failed
/// validation is rejected from the start and never touched the transport.
#[must_use = "an operation's outcome is only observed by awaiting its handle"]
pub struct PendingOperation<T> {
    id: Option<OperationId>,
    inner: Inner,
    decode: fn(Bytes) -> Result<T>,
}

enum Inner {
    Failed(Option<ClientError>),
    Waiting(oneshot::Receiver<Settlement>),
}

impl<T> PendingOperation<T> {
    pub(crate) fn waiting(
        id: OperationId,
        rx: oneshot::Receiver<Settlement>,
        decode: fn(Bytes) -> Result<T>,
    ) -> Self {
        Self {
            id: Some(id),
            inner: Inner::Waiting(rx),
            decode,
        }
    }

    pub(crate) fn rejected(err: ClientError, decode: fn(Bytes) -> Result<T>) -> Self {
        Self {
            id: None,
            inner: Inner::Failed(Some(err)),
            decode,
        }
    }

    /// Id of the dispatched operation. `None` if the request was rejected
    /// before an id was assigned.
    pub fn operation_id(&self) -> Option<OperationId> {
        self.id
    }

    /// Whether the handle was rejected before reaching the transport.
    pub fn is_rejected(&self) -> bool {
        matches!(self.inner, Inner::Failed(_))
    }
}

impl<T> Future for PendingOperation<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.inner {
            // A second poll after completion reports the handle as closed.
            Inner::Failed(err) => {
                Poll::Ready(Err(err.take().unwrap_or(ClientError::ConnectionClosed)))
            }
            Inner::Waiting(rx) => {
                let settled = ready!(Pin::new(rx).poll(cx));
                Poll::Ready(match settled {
                    Ok(Ok(payload)) => (this.decode)(payload),
                    Ok(Err(err)) => Err(err),
                    Err(_) => Err(ClientError::ConnectionClosed),
                })
            }
        }
    }
}

impl<T> std::fmt::Debug for PendingOperation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingOperation")
            .field("id", &self.id)
            .field("rejected", &self.is_rejected())
            .finish()
    }
}
