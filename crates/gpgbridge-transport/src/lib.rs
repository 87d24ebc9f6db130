//! Byte-stream transports to a native cryptographic engine.
//!
//! Two ways to reach an engine are supported:
//! - a spawned native-messaging host speaking over its stdin/stdout
//! - a Unix domain socket (Linux/macOS)
//!
//! This is the lowest layer of gpgbridge. Everything else builds on the
//! [`IpcStream`] type provided here, usually after splitting it into
//! independent read and write halves.

pub mod error;
pub mod process;
pub mod stream;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use process::NativeHost;
pub use stream::{CloseHandle, IpcStream, ReadHalf, WriteHalf};

#[cfg(unix)]
pub use uds::UnixDomainSocket;
