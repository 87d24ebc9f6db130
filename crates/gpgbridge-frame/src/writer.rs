use std::io::{ErrorKind, Write};

use bytes::{Bytes, BytesMut};

use crate::chunk::{encode_chunk, max_chunk_body, split, PayloadChunk};
use crate::codec::{encode_message, MessageConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete length-prefixed messages to any `Write` stream.
pub struct MessageWriter<T> {
    inner: T,
    buf: BytesMut,
    chunk_buf: BytesMut,
    config: MessageConfig,
}

impl<T: Write> MessageWriter<T> {
    /// Create a new message writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, MessageConfig::default())
    }

    /// Create a new message writer with explicit configuration.
    pub fn with_config(inner: T, config: MessageConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            chunk_buf: BytesMut::new(),
            config,
        }
    }

    /// Encode and send one message.
    pub fn send(&mut self, message: &[u8]) -> Result<()> {
        if message.len() > self.config.max_message_size {
            return Err(FrameError::MessageTooLarge {
                size: message.len(),
                max: self.config.max_message_size,
            });
        }

        self.buf.clear();
        encode_message(message, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Send one chunk as its own message.
    pub fn send_chunk(&mut self, chunk: &PayloadChunk) -> Result<()> {
        let mut encoded = std::mem::take(&mut self.chunk_buf);
        encoded.clear();
        encode_chunk(chunk, &mut encoded);
        let result = self.send(&encoded);
        self.chunk_buf = encoded;
        result
    }

    /// Split `payload` into chunks sized for this writer and send them in order.
    ///
    /// Nothing is sent if the payload needs more chunks than the sequence
    /// number can count. Stops at the first failed chunk; the peer then never
    /// sees a final chunk for `operation_id`.
    pub fn send_payload(&mut self, operation_id: u64, payload: &Bytes) -> Result<usize> {
        let body = max_chunk_body(self.config.max_message_size);
        let mut sent = 0;
        for chunk in split(operation_id, payload, body)? {
            self.send_chunk(&chunk)?;
            sent += 1;
        }
        Ok(sent)
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current message writer configuration.
    pub fn config(&self) -> &MessageConfig {
        &self.config
    }
}
