//! Client for native cryptographic engines reached over a size-limited
//! message pipe.
//!
//! gpgbridge relays `encrypt`, `decrypt`, `sign` and `version` requests to an
//! engine such as `gpgme-json`, either spawned as a native-messaging host or
//! listening on a Unix domain socket. Payloads larger than one transport
//! message are chunked, responses are correlated by operation id, and every
//! failure is reported with one of six error codes.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte streams to the engine (spawned host, Unix sockets)
//! - [`frame`]: length-prefixed messages and payload chunking
//! - [`client`]: correlation, operations and connection lifecycle (behind the
//!   `client` feature, on by default)
//!
//! # Example
//!
//! ```no_run
//! # async fn run() -> Result<(), gpgbridge::ClientError> {
//! use gpgbridge::{ClientConfig, Endpoint};
//!
//! let context = gpgbridge::init(ClientConfig::with_endpoint(Endpoint::native_host("gpgme-json"))).await?;
//! let answer = context.encrypt("hello", "D41735B91236FDB882048C5A2301635EEFF0CB05").await?;
//! println!("{}", answer.data);
//! context.connection().disconnect();
//! # Ok(())
//! # }
//! ```

/// Re-export transport types.
pub mod transport {
    pub use gpgbridge_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use gpgbridge_frame::*;
}

/// Re-export client types (requires `client` feature).
#[cfg(feature = "client")]
pub mod client {
    pub use gpgbridge_client::*;
}

#[cfg(feature = "client")]
pub use gpgbridge_client::{
    init, init_with_stream, ClientConfig, ClientError, Context, Endpoint, ErrorCode,
};
