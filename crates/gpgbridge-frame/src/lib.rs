//! Message framing and payload chunking for size-limited message pipes.
//!
//! Two layers live here:
//! - messages: every transport message is a 4-byte little-endian length
//!   followed by that many bytes, bounded by a configured maximum
//! - chunks: a payload larger than one message is split into a contiguous,
//!   0-based sequence of chunks tagged with an operation id, the last one
//!   carrying the final flag, and reassembled on the other side
//!
//! Framing only. Nothing here looks at what the bytes mean.

pub mod chunk;
pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use chunk::{
    decode_chunk, encode_chunk, max_chunk_body, reassemble, split, PayloadChunk, Reassembler,
    CHUNK_HEADER_SIZE, CHUNK_MAGIC, FLAG_FINAL,
};
pub use codec::{
    decode_message, encode_message, MessageConfig, DEFAULT_MAX_MESSAGE, LENGTH_PREFIX_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::MessageReader;
pub use writer::MessageWriter;
