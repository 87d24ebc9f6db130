//! Splitting payloads into chunks and reassembling them.
//!
//! Each chunk travels as one message:
//!
//! ```text
//! ┌────────────┬────────┬────────────────┬──────────────┬──────────────┐
//! │ Magic (2B) │ Flags  │ Operation id   │ Sequence     │ Bytes         │
//! │ "GB"       │ (1B)   │ (8B LE)        │ (4B LE)      │ (rest)        │
//! └────────────┴────────┴────────────────┴──────────────┴──────────────┘
//! ```
//!
//! Sequence numbers start at 0 and grow by one. Exactly one chunk, the last,
//! carries [`FLAG_FINAL`].

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Chunk header: magic (2) + flags (1) + operation id (8) + sequence (4).
pub const CHUNK_HEADER_SIZE: usize = 15;

/// Magic bytes: "GB" (0x47 0x42).
pub const CHUNK_MAGIC: [u8; 2] = [0x47, 0x42];

/// Flag bit marking the last chunk of a payload.
pub const FLAG_FINAL: u8 = 0x01;

/// One bounded fragment of a larger payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadChunk {
    /// Operation this chunk belongs to.
    pub operation_id: u64,
    /// Position in the stream, 0-based and contiguous.
    pub sequence: u32,
    /// Whether this is the last chunk of the stream.
    pub is_final: bool,
    /// The fragment itself.
    pub bytes: Bytes,
}

impl PayloadChunk {
    /// The total wire size of this chunk (header + bytes).
    pub fn wire_size(&self) -> usize {
        CHUNK_HEADER_SIZE + self.bytes.len()
    }
}

/// Largest chunk body that fits into a message of `max_message_size` bytes.
pub fn max_chunk_body(max_message_size: usize) -> usize {
    max_message_size.saturating_sub(CHUNK_HEADER_SIZE)
}

/// Encode a chunk into one message body.
pub fn encode_chunk(chunk: &PayloadChunk, dst: &mut BytesMut) {
    dst.reserve(chunk.wire_size());
    dst.put_slice(&CHUNK_MAGIC);
    dst.put_u8(if chunk.is_final { FLAG_FINAL } else { 0 });
    dst.put_u64_le(chunk.operation_id);
    dst.put_u32_le(chunk.sequence);
    dst.put_slice(&chunk.bytes);
}

/// Decode a chunk from one message body.
///
/// The returned chunk's bytes share the message's allocation.
pub fn decode_chunk(mut message: Bytes) -> Result<PayloadChunk> {
    if message.len() < CHUNK_HEADER_SIZE {
        return Err(FrameError::ShortChunk { len: message.len() });
    }
    if message[0..2] != CHUNK_MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    message.advance(2);
    let flags = message.get_u8();
    if flags & !FLAG_FINAL != 0 {
        return Err(FrameError::UnknownFlags(flags));
    }
    let operation_id = message.get_u64_le();
    let sequence = message.get_u32_le();

    Ok(PayloadChunk {
        operation_id,
        sequence,
        is_final: flags & FLAG_FINAL != 0,
        bytes: message,
    })
}

/// Split `payload` into chunks of at most `max_chunk_size` bytes.
///
/// An empty payload yields a single empty final chunk. A `max_chunk_size`
/// of zero is treated as one. Fails if the chunk count does not fit the
/// 32-bit sequence space.
pub fn split(
    operation_id: u64,
    payload: &Bytes,
    max_chunk_size: usize,
) -> Result<Vec<PayloadChunk>> {
    let size = max_chunk_size.max(1);
    if payload.is_empty() {
        return Ok(vec![PayloadChunk {
            operation_id,
            sequence: 0,
            is_final: true,
            bytes: Bytes::new(),
        }]);
    }

    let count = chunk_count(operation_id, payload.len(), size)?;
    let mut chunks = Vec::with_capacity(count as usize);
    let mut start = 0;
    for sequence in 0..count {
        let end = (start + size).min(payload.len());
        chunks.push(PayloadChunk {
            operation_id,
            sequence,
            is_final: sequence + 1 == count,
            bytes: payload.slice(start..end),
        });
        start = end;
    }
    Ok(chunks)
}

/// Chunks needed for `len` bytes. The last usable sequence is `u32::MAX - 1`
/// so the next expected sequence always fits.
fn chunk_count(operation_id: u64, len: usize, size: usize) -> Result<u32> {
    u32::try_from(len.div_ceil(size))
        .ok()
        .filter(|&count| count < u32::MAX)
        .ok_or(FrameError::SequenceOverflow { operation_id })
}

/// Incremental reassembly of one operation's chunk stream.
#[derive(Debug)]
pub struct Reassembler {
    operation_id: u64,
    next_sequence: u32,
    finished: bool,
    max_payload: usize,
    buf: BytesMut,
}

impl Reassembler {
    /// Start reassembling the stream of `operation_id`, refusing payloads
    /// larger than `max_payload` bytes.
    pub fn new(operation_id: u64, max_payload: usize) -> Self {
        Self {
            operation_id,
            next_sequence: 0,
            finished: false,
            max_payload,
            buf: BytesMut::new(),
        }
    }

    /// Feed the next chunk.
    ///
    /// Returns `Ok(Some(payload))` once the final chunk arrives and
    /// `Ok(None)` while more chunks are expected.
    pub fn push(&mut self, chunk: PayloadChunk) -> Result<Option<Bytes>> {
        if chunk.operation_id != self.operation_id {
            return Err(FrameError::OperationMismatch {
                expected: self.operation_id,
                actual: chunk.operation_id,
            });
        }
        if self.finished {
            return Err(FrameError::ChunkAfterFinal {
                sequence: chunk.sequence,
            });
        }
        if chunk.sequence != self.next_sequence {
            return Err(FrameError::SequenceViolation {
                expected: self.next_sequence,
                actual: chunk.sequence,
            });
        }

        let next_sequence = self
            .next_sequence
            .checked_add(1)
            .ok_or(FrameError::SequenceOverflow {
                operation_id: self.operation_id,
            })?;

        let size = self.buf.len() + chunk.bytes.len();
        if size > self.max_payload {
            return Err(FrameError::PayloadTooLarge {
                size,
                max: self.max_payload,
            });
        }

        self.buf.extend_from_slice(&chunk.bytes);
        self.next_sequence = next_sequence;

        if chunk.is_final {
            self.finished = true;
            return Ok(Some(self.buf.split().freeze()));
        }
        Ok(None)
    }

    /// Signal end-of-stream. Fails unless the final chunk has been seen.
    pub fn finish(&self) -> Result<()> {
        if self.finished {
            Ok(())
        } else {
            Err(FrameError::Truncated {
                received: self.next_sequence,
            })
        }
    }

    /// Whether the final chunk has been received.
    pub fn is_complete(&self) -> bool {
        self.finished
    }

    /// Number of chunks accepted so far.
    pub fn received(&self) -> u32 {
        self.next_sequence
    }

    /// Bytes buffered and not yet handed out.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }
}

/// Reassemble a complete chunk sequence into its payload.
///
/// The operation id is taken from the first chunk. An empty sequence is a
/// truncated stream.
pub fn reassemble<I>(chunks: I) -> Result<Bytes>
where
    I: IntoIterator<Item = PayloadChunk>,
{
    let mut chunks = chunks.into_iter();
    let Some(first) = chunks.next() else {
        return Err(FrameError::Truncated { received: 0 });
    };

    let mut reassembler = Reassembler::new(first.operation_id, usize::MAX);
    let mut payload = reassembler.push(first)?;
    for chunk in chunks {
        if payload.is_some() {
            return Err(FrameError::ChunkAfterFinal {
                sequence: chunk.sequence,
            });
        }
        payload = reassembler.push(chunk)?;
    }

    reassembler.finish()?;
    Ok(payload.unwrap_or_default())
}
