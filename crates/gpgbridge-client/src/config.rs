use std::path::{Path, PathBuf};
use std::time::Duration;

use gpgbridge_frame::{max_chunk_body, CHUNK_HEADER_SIZE, DEFAULT_MAX_MESSAGE};
use gpgbridge_transport::{IpcStream, NativeHost};
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Default ceiling for a caller-supplied payload: 32 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 32 * 1024 * 1024;

/// Default ceiling for a reassembled engine response: 64 MiB.
///
/// Armoring and signatures make responses larger than their requests.
pub const DEFAULT_MAX_RESPONSE: usize = 64 * 1024 * 1024;

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_HOST_PROGRAM: &str = "gpgme-json";

/// Where the engine lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Endpoint {
    /// Spawn a native host and talk over its stdin/stdout.
    NativeHost {
        program: PathBuf,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Connect to an engine already listening on a Unix domain socket.
    Socket { path: PathBuf },
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::NativeHost {
            program: PathBuf::from(DEFAULT_HOST_PROGRAM),
            args: Vec::new(),
        }
    }
}

impl Endpoint {
    /// Native host endpoint without arguments.
    pub fn native_host(program: impl Into<PathBuf>) -> Self {
        Self::NativeHost {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Unix domain socket endpoint.
    pub fn socket(path: impl Into<PathBuf>) -> Self {
        Self::Socket { path: path.into() }
    }

    /// Open a stream to the endpoint.
    pub fn connect(&self) -> gpgbridge_transport::Result<IpcStream> {
        match self {
            Self::NativeHost { program, args } => NativeHost::new(program).args(args).spawn(),
            #[cfg(unix)]
            Self::Socket { path } => gpgbridge_transport::UnixDomainSocket::connect(path),
            #[cfg(not(unix))]
            Self::Socket { path } => Err(gpgbridge_transport::TransportError::Connect {
                path: path.clone(),
                source: std::io::Error::from(std::io::ErrorKind::Unsupported),
            }),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NativeHost { program, .. } => write!(f, "native-host:{}", program.display()),
            Self::Socket { path } => write!(f, "socket:{}", path.display()),
        }
    }
}

/// Connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Engine endpoint.
    pub endpoint: Endpoint,
    /// Largest single transport message, chunk header included. Default: 1 MiB.
    pub max_message_size: usize,
    /// Largest payload a caller may submit. Default: 32 MiB.
    pub max_payload_size: usize,
    /// Largest reassembled response accepted from the engine. Default: 64 MiB.
    pub max_response_size: usize,
    /// Bound on the engine probe during `init`, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Run a `version` round-trip during `init`.
    pub probe_on_init: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            max_message_size: DEFAULT_MAX_MESSAGE,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            max_response_size: DEFAULT_MAX_RESPONSE,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            probe_on_init: true,
        }
    }
}

impl ClientConfig {
    /// Default configuration for the given endpoint.
    pub fn with_endpoint(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            ..Self::default()
        }
    }

    /// Set the maximum transport message size.
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the maximum caller payload size.
    pub fn with_max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Set the maximum response size.
    pub fn with_max_response_size(mut self, size: usize) -> Self {
        self.max_response_size = size;
        self
    }

    /// Set the probe timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Enable or disable the `version` probe during `init`.
    pub fn with_probe(mut self, probe: bool) -> Self {
        self.probe_on_init = probe;
        self
    }

    /// Probe timeout as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Chunk body size implied by `max_message_size`.
    pub fn chunk_size(&self) -> usize {
        max_chunk_body(self.max_message_size)
    }

    /// Check that the sizes describe a usable connection.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_message_size <= CHUNK_HEADER_SIZE {
            return Err(ConfigError::Invalid(format!(
                "max_message_size must exceed the {CHUNK_HEADER_SIZE}-byte chunk header (got {})",
                self.max_message_size
            )));
        }
        if u32::try_from(self.max_message_size).is_err() {
            return Err(ConfigError::Invalid(format!(
                "max_message_size must fit in a u32 length prefix (got {})",
                self.max_message_size
            )));
        }
        if self.max_payload_size == 0 {
            return Err(ConfigError::Invalid(
                "max_payload_size must be greater than zero".to_string(),
            ));
        }
        if self.max_response_size == 0 {
            return Err(ConfigError::Invalid(
                "max_response_size must be greater than zero".to_string(),
            ));
        }
        if let Endpoint::NativeHost { program, .. } = &self.endpoint {
            if program.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(
                    "native host program must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration document is not valid JSON for this schema.
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<ConfigError> for ClientError {
    fn from(err: ConfigError) -> Self {
        Self::Connection(format!("invalid configuration: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.max_message_size, 1024 * 1024);
        assert_eq!(config.max_payload_size, DEFAULT_MAX_PAYLOAD);
        assert_eq!(config.max_response_size, DEFAULT_MAX_RESPONSE);
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert!(config.probe_on_init);
        assert_eq!(config.endpoint, Endpoint::native_host("gpgme-json"));
        config.validate().unwrap();
    }

    #[test]
    fn chunk_size_leaves_room_for_header() {
        let config = ClientConfig::default().with_max_message_size(100);
        assert_eq!(config.chunk_size(), 100 - CHUNK_HEADER_SIZE);
    }

    #[test]
    fn rejects_message_size_without_room_for_data() {
        let config = ClientConfig::default().with_max_message_size(CHUNK_HEADER_SIZE);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_zero_ceilings() {
        let config = ClientConfig::default().with_max_payload_size(0);
        assert!(config.validate().is_err());
        let config = ClientConfig::default().with_max_response_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_program() {
        let config = ClientConfig::with_endpoint(Endpoint::native_host(""));
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_partial_json_with_defaults() {
        let config = ClientConfig::from_json_str(
            r#"{"endpoint":{"type":"socket","path":"/run/engine.sock"},"max_message_size":4096}"#,
        )
        .unwrap();
        assert_eq!(config.endpoint, Endpoint::socket("/run/engine.sock"));
        assert_eq!(config.max_message_size, 4096);
        assert_eq!(config.max_payload_size, DEFAULT_MAX_PAYLOAD);
    }

    #[test]
    fn parses_native_host_with_args() {
        let config = ClientConfig::from_json_str(
            r#"{"endpoint":{"type":"native_host","program":"/usr/bin/gpgme-json","args":["--debug"]}}"#,
        )
        .unwrap();
        assert_eq!(
            config.endpoint,
            Endpoint::NativeHost {
                program: PathBuf::from("/usr/bin/gpgme-json"),
                args: vec!["--debug".to_string()],
            }
        );
    }

    #[test]
    fn invalid_json_is_reported() {
        let err = ClientConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn invalid_values_fail_after_parse() {
        let err = ClientConfig::from_json_str(r#"{"max_message_size":4}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ClientConfig::from_json_file("/nonexistent/gpgbridge.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn config_errors_surface_as_connection_errors() {
        let err: ClientError = ConfigError::Invalid("bad".to_string()).into();
        assert_eq!(err.code(), ErrorCode::ConnectionError);
    }

    #[test]
    fn endpoint_display() {
        assert_eq!(
            Endpoint::socket("/tmp/e.sock").to_string(),
            "socket:/tmp/e.sock"
        );
        assert_eq!(
            Endpoint::native_host("gpgme-json").to_string(),
            "native-host:gpgme-json"
        );
    }

    #[test]
    fn connect_missing_host_fails() {
        let endpoint = Endpoint::native_host("/nonexistent/gpgbridge-engine");
        assert!(endpoint.connect().is_err());
    }
}
