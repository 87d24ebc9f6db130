use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::debug;

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::envelope::{Request, RequestEnvelope, ResultEnvelope, SignMode};
use crate::error::{ClientError, Result};
use crate::operation::{OperationId, Settlement};
use crate::pending::PendingOperation;

/// Text produced by the engine, such as armored ciphertext or a signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub data: String,
}

/// Plaintext recovered by a decryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decrypted {
    pub data: Bytes,
}

impl Decrypted {
    /// The plaintext as UTF-8, if it is.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

/// Identity of the engine on the other end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineInfo {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub protocols: Vec<String>,
}

/// Knobs for [`Context::encrypt_with`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncryptOptions {
    /// Skip the trust check on recipient keys.
    pub always_trust: bool,
    /// Hide recipient key ids in the ciphertext.
    pub wildcard: bool,
    /// Also sign with these keys.
    pub signing_keys: Vec<String>,
}

impl EncryptOptions {
    pub fn always_trust(mut self, always_trust: bool) -> Self {
        self.always_trust = always_trust;
        self
    }

    pub fn wildcard(mut self, wildcard: bool) -> Self {
        self.wildcard = wildcard;
        self
    }

    pub fn sign_with(mut self, key: impl Into<String>) -> Self {
        self.signing_keys.push(key.into());
        self
    }
}

/// Entry point for cryptographic operations on one connection.
///
/// Every method validates its arguments and dispatches the request before
/// returning. Argument and size errors are reported through the returned
/// handle without any transport activity, and no failure of a single call
/// closes the connection.
#[derive(Debug, Clone)]
pub struct Context {
    connection: Arc<Connection>,
    config: ClientConfig,
}

impl Context {
    pub(crate) fn new(connection: Arc<Connection>, config: ClientConfig) -> Self {
        Self { connection, config }
    }

    /// The connection all operations run on.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Configuration this context was created with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Encrypt `data` to one recipient, returning armored ciphertext.
    pub fn encrypt(&self, data: impl AsRef<[u8]>, recipient: &str) -> PendingOperation<Answer> {
        self.encrypt_with(data, &[recipient], &EncryptOptions::default())
    }

    /// Encrypt `data` to every key in `recipients`, returning armored ciphertext.
    pub fn encrypt_with<S: AsRef<str>>(
        &self,
        data: impl AsRef<[u8]>,
        recipients: &[S],
        options: &EncryptOptions,
    ) -> PendingOperation<Answer> {
        self.encrypt_request(data.as_ref(), recipients, options, true, decode_answer)
    }

    /// Encrypt `data` without armor, returning binary ciphertext.
    pub fn encrypt_binary<S: AsRef<str>>(
        &self,
        data: impl AsRef<[u8]>,
        recipients: &[S],
        options: &EncryptOptions,
    ) -> PendingOperation<Bytes> {
        self.encrypt_request(data.as_ref(), recipients, options, false, decode_bytes)
    }

    fn encrypt_request<S: AsRef<str>, T>(
        &self,
        data: &[u8],
        recipients: &[S],
        options: &EncryptOptions,
        armor: bool,
        decode: fn(Bytes) -> Result<T>,
    ) -> PendingOperation<T> {
        let keys = match key_list(recipients, "recipient") {
            Ok(keys) => keys,
            Err(err) => return PendingOperation::rejected(err, decode),
        };
        let request = Request::Encrypt {
            keys,
            armor,
            always_trust: options.always_trust,
            wildcard: options.wildcard,
            signing_keys: options.signing_keys.clone(),
        };
        self.submit(request, data, decode)
    }

    /// Decrypt `data`.
    pub fn decrypt(&self, data: impl AsRef<[u8]>) -> PendingOperation<Decrypted> {
        self.submit(Request::Decrypt, data.as_ref(), decode_decrypted)
    }

    /// Sign `data` with `key`.
    pub fn sign(
        &self,
        data: impl AsRef<[u8]>,
        key: &str,
        mode: SignMode,
    ) -> PendingOperation<Answer> {
        let keys = match key_list(&[key], "key") {
            Ok(keys) => keys,
            Err(err) => return PendingOperation::rejected(err, decode_answer),
        };
        self.submit(Request::Sign { keys, mode }, data.as_ref(), decode_answer)
    }

    /// Ask the engine who it is.
    pub fn version(&self) -> PendingOperation<EngineInfo> {
        match self.dispatch(Request::Version, Bytes::new()) {
            Ok((id, rx)) => PendingOperation::waiting(id, rx, decode_engine_info),
            Err(err) => PendingOperation::rejected(err, decode_engine_info),
        }
    }

    fn submit<T>(
        &self,
        request: Request,
        data: &[u8],
        decode: fn(Bytes) -> Result<T>,
    ) -> PendingOperation<T> {
        if data.is_empty() {
            return PendingOperation::rejected(ClientError::IncompleteRequest("data"), decode);
        }
        if data.len() > self.config.max_payload_size {
            debug!(
                kind = %request.kind(),
                size = data.len(),
                max = self.config.max_payload_size,
                "payload over ceiling"
            );
            return PendingOperation::rejected(
                ClientError::OversizedPayload {
                    size: data.len(),
                    max: self.config.max_payload_size,
                },
                decode,
            );
        }

        match self.dispatch(request, Bytes::copy_from_slice(data)) {
            Ok((id, rx)) => PendingOperation::waiting(id, rx, decode),
            Err(err) => PendingOperation::rejected(err, decode),
        }
    }

    fn dispatch(
        &self,
        request: Request,
        data: Bytes,
    ) -> Result<(OperationId, oneshot::Receiver<Settlement>)> {
        let kind = request.kind();
        let payload = RequestEnvelope::new(request, data).encode()?;
        self.connection.submit(kind, payload)
    }
}

fn key_list<S: AsRef<str>>(keys: &[S], what: &'static str) -> Result<Vec<String>> {
    if keys.is_empty() || keys.iter().any(|key| key.as_ref().trim().is_empty()) {
        return Err(ClientError::IncompleteRequest(what));
    }
    Ok(keys.iter().map(|key| key.as_ref().trim().to_string()).collect())
}

fn result_data(payload: Bytes) -> Result<Bytes> {
    ResultEnvelope::decode(payload)?.into_result()
}

fn decode_answer(payload: Bytes) -> Result<Answer> {
    let data = result_data(payload)?;
    String::from_utf8(data.to_vec())
        .map(|data| Answer { data })
        .map_err(|err| ClientError::ProtocolViolation(format!("engine answer is not UTF-8: {err}")))
}

fn decode_bytes(payload: Bytes) -> Result<Bytes> {
    result_data(payload)
}

fn decode_decrypted(payload: Bytes) -> Result<Decrypted> {
    result_data(payload).map(|data| Decrypted { data })
}

fn decode_engine_info(payload: Bytes) -> Result<EngineInfo> {
    let data = result_data(payload)?;
    serde_json::from_slice(&data)
        .map_err(|err| ClientError::ProtocolViolation(format!("invalid engine info: {err}")))
}
