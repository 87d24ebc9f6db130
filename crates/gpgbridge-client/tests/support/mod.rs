//! In-process stand-in for a native crypto engine.
//!
//! Speaks the real wire protocol (length-prefixed messages, chunk headers,
//! envelopes) but fakes the cryptography: "ciphertext" is the hex of the
//! plaintext wrapped in armor lines.

#![allow(dead_code)]

use std::collections::HashMap;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use gpgbridge_client::{Request, RequestEnvelope, ResultEnvelope, SignMode};
use gpgbridge_frame::{
    decode_chunk, MessageConfig, MessageReader, MessageWriter, PayloadChunk, Reassembler,
};

pub const GOOD_KEY: &str = "D41735B91236FDB882048C5A2301635EEFF0CB05";
pub const OTHER_KEY: &str = "262FB8A84E0D2D59A14A1F3F6E28F52D6F4A0B12";
/// Keys the engine has never heard of.
pub const BAD_KEY: &str = "0000000000000000000000000000000000000000";
/// Requests naming this key are never answered.
pub const SILENT_KEY: &str = "SILENT";

pub const UNUSABLE_KEY_CODE: u32 = 117_440_565;
pub const NO_DATA_CODE: u32 = 117_440_570;

const ARMOR_BEGIN: &str = "-----BEGIN PGP MESSAGE-----";
const ARMOR_END: &str = "-----END PGP MESSAGE-----";
const SIGNATURE_BEGIN: &str = "-----BEGIN PGP SIGNATURE-----";
const SIGNATURE_END: &str = "-----END PGP SIGNATURE-----";
const BINARY_MASK: u8 = 0x5a;

pub fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/gpgbridge-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

/// A running mock engine.
pub struct MockEngine {
    requests: Arc<AtomicUsize>,
    handle: Option<JoinHandle<()>>,
}

impl MockEngine {
    /// Serve one connection on `stream` until the client hangs up.
    pub fn spawn(stream: UnixStream, max_message_size: usize) -> Self {
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&requests);
        let handle = thread::Builder::new()
            .name("mock-engine".to_string())
            .spawn(move || serve(stream, max_message_size, &counter))
            .expect("mock engine should start");
        Self {
            requests,
            handle: Some(handle),
        }
    }

    /// Listen on `path` and serve the first client that connects.
    pub fn listen(path: &Path, max_message_size: usize) -> Self {
        let listener = UnixListener::bind(path).expect("mock socket should bind");
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&requests);
        let handle = thread::Builder::new()
            .name("mock-engine-listener".to_string())
            .spawn(move || {
                if let Ok((stream, _)) = listener.accept() {
                    serve(stream, max_message_size, &counter);
                }
            })
            .expect("mock engine should start");
        Self {
            requests,
            handle: Some(handle),
        }
    }

    /// Complete requests received so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Wait for the engine thread to finish.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.join().expect("mock engine should not panic");
        }
    }
}

fn serve(stream: UnixStream, max_message_size: usize, requests: &AtomicUsize) {
    let config = MessageConfig { max_message_size };
    let read_half = stream.try_clone().expect("stream should clone");
    let mut reader = MessageReader::with_config(read_half, config.clone());
    let mut writer = MessageWriter::with_config(stream, config);
    let mut streams: HashMap<u64, Reassembler> = HashMap::new();

    while let Ok(message) = reader.read_message() {
        let Ok(chunk) = decode_chunk(message) else {
            continue;
        };
        let op_id = chunk.operation_id;
        let reassembler = streams
            .entry(op_id)
            .or_insert_with(|| Reassembler::new(op_id, usize::MAX));
        let payload = match reassembler.push(chunk) {
            Ok(Some(payload)) => payload,
            Ok(None) => continue,
            Err(_) => {
                streams.remove(&op_id);
                continue;
            }
        };
        streams.remove(&op_id);
        requests.fetch_add(1, Ordering::SeqCst);

        let Some(result) = answer(payload) else {
            continue;
        };
        if send_result(&mut writer, op_id, &result).is_err() {
            break;
        }
    }
}

/// Send `result` as the response to operation `op_id`.
pub fn send_result(
    writer: &mut MessageWriter<UnixStream>,
    op_id: u64,
    result: &ResultEnvelope,
) -> gpgbridge_frame::Result<()> {
    let payload = result.encode().expect("result should encode");
    writer.send_payload(op_id, &payload).map(|_| ())
}

fn answer(payload: Bytes) -> Option<ResultEnvelope> {
    let envelope = match RequestEnvelope::decode(payload) {
        Ok(envelope) => envelope,
        Err(err) => return Some(ResultEnvelope::error(None, err.to_string())),
    };

    match envelope.request {
        Request::Encrypt { keys, armor, .. } => {
            if keys.iter().any(|key| key == SILENT_KEY) {
                return None;
            }
            if let Some(result) = unusable_key(&keys) {
                return Some(result);
            }
            if armor {
                Some(ResultEnvelope::ok(armored(ARMOR_BEGIN, &envelope.data, ARMOR_END)))
            } else {
                Some(ResultEnvelope::ok(mask(&envelope.data)))
            }
        }
        Request::Decrypt => Some(decrypt(&envelope.data)),
        Request::Sign { keys, mode } => {
            if let Some(result) = unusable_key(&keys) {
                return Some(result);
            }
            let signature = armored(SIGNATURE_BEGIN, keys[0].as_bytes(), SIGNATURE_END);
            let text = match mode {
                SignMode::Detached => signature,
                SignMode::Clearsign => format!(
                    "-----BEGIN PGP SIGNED MESSAGE-----\nHash: SHA256\n\n{}\n{signature}",
                    String::from_utf8_lossy(&envelope.data)
                ),
            };
            Some(ResultEnvelope::ok(text))
        }
        Request::Version => Some(ResultEnvelope::ok(
            r#"{"name":"mock-engine","version":"1.0.0","protocols":["OpenPGP"]}"#,
        )),
    }
}

fn unusable_key(keys: &[String]) -> Option<ResultEnvelope> {
    keys.iter()
        .find(|key| key.as_str() != GOOD_KEY && key.as_str() != OTHER_KEY)
        .map(|key| {
            ResultEnvelope::error(
                Some(UNUSABLE_KEY_CODE),
                format!("Unusable public key: {key}"),
            )
        })
}

fn decrypt(data: &[u8]) -> ResultEnvelope {
    let Ok(text) = std::str::from_utf8(data) else {
        return ResultEnvelope::ok(mask(data));
    };
    if !text.starts_with(ARMOR_BEGIN) {
        return ResultEnvelope::ok(mask(data));
    }

    let body: String = text
        .lines()
        .filter(|line| !line.is_empty() && !line.starts_with("-----"))
        .collect();
    match unhex(&body) {
        Some(plain) => ResultEnvelope::ok(plain),
        None => ResultEnvelope::error(Some(NO_DATA_CODE), "No data"),
    }
}

fn armored(begin: &str, data: &[u8], end: &str) -> String {
    let encoded = hex(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / 64 + 64);
    out.push_str(begin);
    out.push_str("\n\n");
    for line in encoded.as_bytes().chunks(64) {
        out.push_str(std::str::from_utf8(line).expect("hex is ascii"));
        out.push('\n');
    }
    out.push_str(end);
    out.push('\n');
    out
}

fn mask(data: &[u8]) -> Vec<u8> {
    data.iter().map(|b| b ^ BINARY_MASK).collect()
}

fn hex(data: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        out.push(DIGITS[(byte >> 4) as usize] as char);
        out.push(DIGITS[(byte & 0x0f) as usize] as char);
    }
    out
}

fn unhex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect()
}

/// The remote end of a connection, driven by hand from a test.
pub struct ScriptedEngine {
    reader: MessageReader<UnixStream>,
    writer: MessageWriter<UnixStream>,
}

impl ScriptedEngine {
    pub fn new(stream: UnixStream) -> Self {
        let read_half = stream.try_clone().expect("stream should clone");
        Self {
            reader: MessageReader::new(read_half),
            writer: MessageWriter::new(stream),
        }
    }

    /// Read one complete request.
    pub fn read_request(&mut self) -> (u64, RequestEnvelope) {
        let first = decode_chunk(self.reader.read_message().expect("request chunk"))
            .expect("valid chunk");
        let op_id = first.operation_id;
        let mut reassembler = Reassembler::new(op_id, usize::MAX);
        let mut payload = reassembler.push(first).expect("in-order chunk");
        while payload.is_none() {
            let chunk = decode_chunk(self.reader.read_message().expect("request chunk"))
                .expect("valid chunk");
            payload = reassembler.push(chunk).expect("in-order chunk");
        }
        let envelope = RequestEnvelope::decode(payload.expect("complete payload"))
            .expect("valid envelope");
        (op_id, envelope)
    }

    /// Send one raw chunk.
    pub fn send_chunk(&mut self, operation_id: u64, sequence: u32, is_final: bool, bytes: &[u8]) {
        self.writer
            .send_chunk(&PayloadChunk {
                operation_id,
                sequence,
                is_final,
                bytes: Bytes::copy_from_slice(bytes),
            })
            .expect("chunk should send");
    }

    /// Send a raw transport message that is not a chunk.
    pub fn send_raw(&mut self, message: &[u8]) {
        self.writer.send(message).expect("message should send");
    }

    /// Send a complete result for `op_id`.
    pub fn respond(&mut self, op_id: u64, result: &ResultEnvelope) {
        send_result(&mut self.writer, op_id, result).expect("result should send");
    }
}
