/// Errors that can occur while framing messages or chunking payloads.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A single message exceeds the configured maximum message size.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// A reassembled payload exceeds the configured maximum payload size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The chunk header contains an invalid magic number.
    #[error("invalid chunk magic (expected 0x4742 \"GB\")")]
    InvalidMagic,

    /// The message is too short to hold a chunk header.
    #[error("chunk header truncated ({len} bytes)")]
    ShortChunk { len: usize },

    /// The chunk header sets flag bits this codec does not understand.
    #[error("unknown chunk flags {0:#04x}")]
    UnknownFlags(u8),

    /// A chunk arrived out of order, was duplicated, or left a gap.
    #[error("chunk sequence violation (expected {expected}, got {actual})")]
    SequenceViolation { expected: u32, actual: u32 },

    /// A chunk arrived after the final chunk of its stream.
    #[error("chunk {sequence} received after final chunk")]
    ChunkAfterFinal { sequence: u32 },

    /// A chunk for another operation was fed to this stream.
    #[error("chunk for operation {actual} fed to stream of operation {expected}")]
    OperationMismatch { expected: u64, actual: u64 },

    /// The stream needs more chunks than the sequence number can count.
    #[error("chunk sequence exhausted for operation {operation_id}")]
    SequenceOverflow { operation_id: u64 },

    /// The chunk stream ended without a final chunk.
    #[error("chunk stream truncated after {received} chunks")]
    Truncated { received: u32 },

    /// An I/O error occurred while reading or writing messages.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete message was received.
    #[error("connection closed (incomplete message)")]
    ConnectionClosed,
}

impl FrameError {
    /// Returns true if the error describes a malformed chunk stream rather
    /// than a size limit or an I/O condition.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidMagic
                | Self::ShortChunk { .. }
                | Self::UnknownFlags(_)
                | Self::SequenceViolation { .. }
                | Self::ChunkAfterFinal { .. }
                | Self::SequenceOverflow { .. }
                | Self::OperationMismatch { .. }
                | Self::Truncated { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
