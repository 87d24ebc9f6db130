//! Logical payloads exchanged with the engine.
//!
//! Both directions use the same layout, which is then chunked for transport:
//!
//! ```text
//! ┌──────────────────┬──────────────────────┬──────────────┐
//! │ Header length    │ JSON header          │ Data         │
//! │ (4B LE)          │ (header length B)    │ (rest)       │
//! └──────────────────┴──────────────────────┴──────────────┘
//! ```
//!
//! The data bytes are carried raw so binary ciphertext never needs escaping.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{ClientError, Result};
use crate::operation::OperationKind;

const HEADER_LENGTH_SIZE: usize = 4;

fn default_armor() -> bool {
    true
}

/// How a signature is attached to the signed data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignMode {
    /// Readable text wrapped in a signature block.
    #[default]
    Clearsign,
    /// Signature returned alone.
    Detached,
}

/// Operation header of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Request {
    Encrypt {
        keys: Vec<String>,
        #[serde(default = "default_armor")]
        armor: bool,
        #[serde(default)]
        always_trust: bool,
        #[serde(default)]
        wildcard: bool,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        signing_keys: Vec<String>,
    },
    Decrypt,
    Sign {
        keys: Vec<String>,
        #[serde(default)]
        mode: SignMode,
    },
    Version,
}

impl Request {
    /// Which operation this request starts. Its name is the wire `op` tag.
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Encrypt { .. } => OperationKind::Encrypt,
            Self::Decrypt => OperationKind::Decrypt,
            Self::Sign { .. } => OperationKind::Sign,
            Self::Version => OperationKind::Version,
        }
    }
}

/// A request header plus its data.
#[derive(Clone, PartialEq, Eq)]
pub struct RequestEnvelope {
    pub request: Request,
    pub data: Bytes,
}

impl RequestEnvelope {
    pub fn new(request: Request, data: impl Into<Bytes>) -> Self {
        Self {
            request,
            data: data.into(),
        }
    }

    /// Serialize into one logical payload.
    pub fn encode(&self) -> Result<Bytes> {
        encode_parts(&self.request, &self.data)
    }

    /// Parse a logical payload.
    pub fn decode(payload: Bytes) -> Result<Self> {
        let (request, data) = decode_parts(payload)?;
        Ok(Self { request, data })
    }
}

impl std::fmt::Debug for RequestEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestEnvelope")
            .field("request", &self.request)
            .field("data_len", &self.data.len())
            .finish()
    }
}

/// Outcome header of a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ResultStatus {
    Ok,
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<u32>,
        message: String,
    },
}

/// A result header plus its data.
#[derive(Clone, PartialEq, Eq)]
pub struct ResultEnvelope {
    pub status: ResultStatus,
    pub data: Bytes,
}

impl ResultEnvelope {
    /// Successful result carrying `data`.
    pub fn ok(data: impl Into<Bytes>) -> Self {
        Self {
            status: ResultStatus::Ok,
            data: data.into(),
        }
    }

    /// Failed result.
    pub fn error(code: Option<u32>, message: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Error {
                code,
                message: message.into(),
            },
            data: Bytes::new(),
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        encode_parts(&self.status, &self.data)
    }

    pub fn decode(payload: Bytes) -> Result<Self> {
        let (status, data) = decode_parts(payload)?;
        Ok(Self { status, data })
    }

    /// The data on success, or the engine's error.
    pub fn into_result(self) -> Result<Bytes> {
        match self.status {
            ResultStatus::Ok => Ok(self.data),
            ResultStatus::Error { code, message } => Err(ClientError::Gnupg { code, message }),
        }
    }
}

impl std::fmt::Debug for ResultEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultEnvelope")
            .field("status", &self.status)
            .field("data_len", &self.data.len())
            .finish()
    }
}

fn encode_parts<H: Serialize>(header: &H, data: &[u8]) -> Result<Bytes> {
    let header = serde_json::to_vec(header)
        .map_err(|err| ClientError::ProtocolViolation(format!("unencodable header: {err}")))?;
    let header_len = u32::try_from(header.len()).map_err(|_| ClientError::OversizedPayload {
        size: header.len(),
        max: u32::MAX as usize,
    })?;

    let mut buf = BytesMut::with_capacity(HEADER_LENGTH_SIZE + header.len() + data.len());
    buf.put_u32_le(header_len);
    buf.put_slice(&header);
    buf.put_slice(data);
    Ok(buf.freeze())
}

fn decode_parts<H: DeserializeOwned>(mut payload: Bytes) -> Result<(H, Bytes)> {
    if payload.len() < HEADER_LENGTH_SIZE {
        return Err(ClientError::ProtocolViolation(format!(
            "envelope truncated ({} bytes)",
            payload.len()
        )));
    }
    let header_len = payload.get_u32_le() as usize;
    if header_len > payload.len() {
        return Err(ClientError::ProtocolViolation(format!(
            "envelope header length {header_len} exceeds remaining {} bytes",
            payload.len()
        )));
    }

    let header_bytes = payload.split_to(header_len);
    let header = serde_json::from_slice(&header_bytes)
        .map_err(|err| ClientError::ProtocolViolation(format!("invalid envelope header: {err}")))?;
    Ok((header, payload))
}
