use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};

use crate::codec::{decode_message, MessageConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Reads complete length-prefixed messages from any `Read` stream.
///
/// Handles partial reads internally; callers always get whole messages.
pub struct MessageReader<T> {
    inner: T,
    buf: BytesMut,
    scratch: Box<[u8]>,
    config: MessageConfig,
}

impl<T: Read> MessageReader<T> {
    /// Create a new message reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, MessageConfig::default())
    }

    /// Create a new message reader with explicit configuration.
    pub fn with_config(inner: T, config: MessageConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            scratch: vec![0u8; READ_CHUNK_SIZE].into_boxed_slice(),
            config,
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_message(&mut self) -> Result<Bytes> {
        loop {
            if let Some(message) = decode_message(&mut self.buf, self.config.max_message_size)? {
                return Ok(message);
            }

            let read = match self.inner.read(&mut self.scratch) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&self.scratch[..read]);
        }
    }

    /// Current message reader configuration.
    pub fn config(&self) -> &MessageConfig {
        &self.config
    }
}
