use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use bytes::Bytes;
use gpgbridge_frame::{FrameError, MessageConfig, MessageReader, MessageWriter};
use gpgbridge_transport::{CloseHandle, IpcStream};
use tracing::{debug, warn};

use crate::error::{ClientError, Result};

/// Messages the outbound queue holds before `send` blocks. Bounds queued
/// memory to this many times the maximum message size.
pub const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// Something that happened on the inbound side of a channel.
#[derive(Debug)]
pub enum ChannelEvent {
    /// One complete transport message.
    Message(Bytes),
    /// The stream ended. `None` is a clean EOF.
    Closed(Option<FrameError>),
}

/// Outbound half of a message pipe.
pub trait MessageSink: Send + Sync {
    /// Queue one message for delivery.
    fn send_message(&self, message: Bytes) -> Result<()>;

    /// Largest message the pipe accepts.
    fn max_message_size(&self) -> usize;
}

/// A bidirectional message pipe over an [`IpcStream`].
///
/// A reader thread turns blocking reads into [`ChannelEvent`]s for the
/// handler; a writer thread drains the bounded outbound queue. Neither waits
/// on the other. A full queue makes [`send`](Self::send) wait for the writer.
pub struct TransportChannel {
    transport: &'static str,
    config: MessageConfig,
    outbound: Mutex<Option<mpsc::SyncSender<Bytes>>>,
    closed: Arc<AtomicBool>,
    close: CloseHandle,
}

impl TransportChannel {
    /// Split `stream` and start the reader and writer threads.
    ///
    /// `handler` runs on the reader thread for every inbound event and sees
    /// exactly one [`ChannelEvent::Closed`], last.
    pub fn open<F>(stream: IpcStream, config: MessageConfig, handler: F) -> Result<Self>
    where
        F: Fn(ChannelEvent) + Send + Sync + 'static,
    {
        let transport = stream.transport_name();
        let (read_half, write_half, close) = stream
            .into_split()
            .map_err(|err| ClientError::Connection(err.to_string()))?;

        let closed = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::sync_channel::<Bytes>(OUTBOUND_QUEUE_DEPTH);

        let mut reader = MessageReader::with_config(read_half, config.clone());
        let reader_closed = Arc::clone(&closed);
        thread::Builder::new()
            .name("gpgbridge-reader".to_string())
            .spawn(move || loop {
                match reader.read_message() {
                    Ok(message) => handler(ChannelEvent::Message(message)),
                    Err(FrameError::ConnectionClosed) => {
                        debug!("channel reached end of stream");
                        reader_closed.store(true, Ordering::SeqCst);
                        handler(ChannelEvent::Closed(None));
                        break;
                    }
                    Err(err) => {
                        warn!(error = %err, "channel read failed");
                        reader_closed.store(true, Ordering::SeqCst);
                        handler(ChannelEvent::Closed(Some(err)));
                        break;
                    }
                }
            })
            .map_err(|err| ClientError::Connection(format!("failed to start reader: {err}")))?;

        let mut writer = MessageWriter::with_config(write_half, config.clone());
        let writer_closed = Arc::clone(&closed);
        let writer_close = close.clone();
        thread::Builder::new()
            .name("gpgbridge-writer".to_string())
            .spawn(move || {
                for message in rx {
                    if let Err(err) = writer.send(&message) {
                        warn!(error = %err, "channel write failed, closing");
                        writer_closed.store(true, Ordering::SeqCst);
                        if let Err(err) = writer_close.close() {
                            debug!(error = %err, "close after write failure");
                        }
                        break;
                    }
                }
            })
            .map_err(|err| {
                if let Err(close_err) = close.close() {
                    debug!(error = %close_err, "close after failed writer start");
                }
                ClientError::Connection(format!("failed to start writer: {err}"))
            })?;

        debug!(
            transport,
            max_message_size = config.max_message_size,
            "channel open"
        );

        Ok(Self {
            transport,
            config,
            outbound: Mutex::new(Some(tx)),
            closed,
            close,
        })
    }

    /// Queue one message, waiting while the queue is full. Fails once the
    /// channel is closed, including while waiting.
    pub fn send(&self, message: Bytes) -> Result<()> {
        if message.len() > self.config.max_message_size {
            return Err(ClientError::OversizedPayload {
                size: message.len(),
                max: self.config.max_message_size,
            });
        }
        if self.is_closed() {
            return Err(ClientError::ConnectionClosed);
        }

        // Clone out so a blocked send never holds the lock `disconnect` needs.
        let tx = self
            .outbound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        let Some(tx) = tx else {
            return Err(ClientError::ConnectionClosed);
        };
        tx.send(message).map_err(|_| ClientError::ConnectionClosed)
    }

    /// Whether either side has shut the channel down.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        self.transport
    }

    /// Stop accepting messages and tear the stream down. Idempotent.
    ///
    /// The reader thread observes the teardown and emits its final
    /// [`ChannelEvent::Closed`].
    pub fn disconnect(&self) {
        let was_closed = self.closed.swap(true, Ordering::SeqCst);
        let sender = self
            .outbound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if was_closed && sender.is_none() {
            return;
        }
        drop(sender);
        if let Err(err) = self.close.close() {
            debug!(error = %err, "channel close");
        }
        debug!(transport = self.transport, "channel disconnected");
    }
}

impl MessageSink for TransportChannel {
    fn send_message(&self, message: Bytes) -> Result<()> {
        self.send(message)
    }

    fn max_message_size(&self) -> usize {
        self.config.max_message_size
    }
}

impl Drop for TransportChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for TransportChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportChannel")
            .field("transport", &self.transport)
            .field("max_message_size", &self.config.max_message_size)
            .field("closed", &self.is_closed())
            .finish()
    }
}
