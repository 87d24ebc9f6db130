use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Message header: a 4-byte little-endian length.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum message size: 1 MiB, the smallest per-message ceiling
/// browsers impose on native-messaging hosts.
pub const DEFAULT_MAX_MESSAGE: usize = 1024 * 1024;

/// Encode one message into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬─────────────────┐
/// │ Length       │ Message          │
/// │ (4B LE)      │ (Length bytes)   │
/// └──────────────┴─────────────────┘
/// ```
pub fn encode_message(message: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = u32::try_from(message.len()).map_err(|_| FrameError::MessageTooLarge {
        size: message.len(),
        max: u32::MAX as usize,
    })?;
    dst.reserve(LENGTH_PREFIX_SIZE + message.len());
    dst.put_u32_le(len);
    dst.put_slice(message);
    Ok(())
}

/// Decode one message from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete message yet.
/// On success, consumes the message bytes from the buffer.
pub fn decode_message(src: &mut BytesMut, max_message: usize) -> Result<Option<Bytes>> {
    if src.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }

    let len = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
    if len > max_message {
        return Err(FrameError::MessageTooLarge {
            size: len,
            max: max_message,
        });
    }

    let total = LENGTH_PREFIX_SIZE + len;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    src.advance(LENGTH_PREFIX_SIZE);
    Ok(Some(src.split_to(len).freeze()))
}

/// Configuration for the message codec.
#[derive(Debug, Clone)]
pub struct MessageConfig {
    /// Maximum size of a single message in bytes. Default: 1 MiB.
    pub max_message_size: usize,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE,
        }
    }
}
