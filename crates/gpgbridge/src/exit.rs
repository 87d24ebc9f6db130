use std::fmt;
use std::io;

use gpgbridge_client::{ClientError, ConfigError};

// Exit codes follow sysexits where one fits.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const ENGINE_ERROR: i32 = 2;
pub const CONNECTION_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const PROTOCOL_VIOLATION: i32 = 76;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::NotFound | io::ErrorKind::InvalidInput => USAGE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn config_error(context: &str, err: ConfigError) -> CliError {
    match err {
        ConfigError::Io { source, .. } => io_error(context, source),
        other => CliError::new(USAGE, format!("{context}: {other}")),
    }
}

/// Map a client failure to an exit code, prefixing the error code name.
pub fn client_error(context: &str, err: ClientError) -> CliError {
    let code = match &err {
        ClientError::IncompleteRequest(_) => USAGE,
        ClientError::OversizedPayload { .. } => DATA_INVALID,
        ClientError::Gnupg { .. } => ENGINE_ERROR,
        ClientError::ConnectionClosed => FAILURE,
        ClientError::Connection(_) => CONNECTION_ERROR,
        ClientError::ProtocolViolation(_) => PROTOCOL_VIOLATION,
    };
    CliError::new(code, format!("{context} [{}]: {err}", err.code()))
}
