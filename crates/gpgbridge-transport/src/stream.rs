use std::io::{ErrorKind, Read, Write};
use std::process::{Child, ChildStdin, ChildStdout};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::Result;

/// A connected byte stream to an engine. Implements `Read` + `Write`.
///
/// This is the fundamental I/O type returned by transport operations.
/// On Unix it may wrap a Unix domain socket stream; on every platform it may
/// wrap the stdin/stdout pipes of a spawned native host.
pub struct IpcStream {
    inner: IpcStreamInner,
}

enum IpcStreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    Process(ProcessPipes),
}

struct ProcessPipes {
    stdin: ChildStdin,
    stdout: ChildStdout,
    child: Child,
}

impl Read for IpcStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.read(buf),
            IpcStreamInner::Process(pipes) => pipes.stdout.read(buf),
        }
    }
}

impl Write for IpcStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.write(buf),
            IpcStreamInner::Process(pipes) => pipes.stdin.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.flush(),
            IpcStreamInner::Process(pipes) => pipes.stdin.flush(),
        }
    }
}

impl IpcStream {
    /// Create an IpcStream from a Unix domain socket stream.
    #[cfg(unix)]
    pub(crate) fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: IpcStreamInner::Unix(stream),
        }
    }

    /// Create an IpcStream from the piped stdio of a spawned child.
    pub(crate) fn from_child(stdin: ChildStdin, stdout: ChildStdout, child: Child) -> Self {
        Self {
            inner: IpcStreamInner::Process(ProcessPipes {
                stdin,
                stdout,
                child,
            }),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(_) => "unix-domain-socket",
            IpcStreamInner::Process(_) => "native-host",
        }
    }

    /// Split into independently owned read and write halves plus a handle
    /// that tears the stream down and unblocks a reader parked in `read`.
    pub fn into_split(self) -> Result<(ReadHalf, WriteHalf, CloseHandle)> {
        match self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => {
                let reader = stream.try_clone()?;
                let closer = stream.try_clone()?;
                Ok((
                    ReadHalf {
                        inner: ReadHalfInner::Unix(reader),
                    },
                    WriteHalf {
                        inner: WriteHalfInner::Unix(stream),
                    },
                    CloseHandle {
                        inner: Arc::new(CloseInner::Unix(closer)),
                    },
                ))
            }
            IpcStreamInner::Process(pipes) => Ok((
                ReadHalf {
                    inner: ReadHalfInner::Process(pipes.stdout),
                },
                WriteHalf {
                    inner: WriteHalfInner::Process(pipes.stdin),
                },
                CloseHandle {
                    inner: Arc::new(CloseInner::Process(Mutex::new(pipes.child))),
                },
            )),
        }
    }
}

#[cfg(unix)]
impl From<std::os::unix::net::UnixStream> for IpcStream {
    fn from(stream: std::os::unix::net::UnixStream) -> Self {
        Self::from_unix(stream)
    }
}

impl std::fmt::Debug for IpcStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(_) => f.debug_struct("IpcStream").field("type", &"unix").finish(),
            IpcStreamInner::Process(pipes) => f
                .debug_struct("IpcStream")
                .field("type", &"native-host")
                .field("pid", &pipes.child.id())
                .finish(),
        }
    }
}

/// Read half of a split [`IpcStream`].
pub struct ReadHalf {
    inner: ReadHalfInner,
}

enum ReadHalfInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    Process(ChildStdout),
}

impl Read for ReadHalf {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            ReadHalfInner::Unix(stream) => stream.read(buf),
            ReadHalfInner::Process(stdout) => stdout.read(buf),
        }
    }
}

impl std::fmt::Debug for ReadHalf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadHalf").finish_non_exhaustive()
    }
}

/// Write half of a split [`IpcStream`].
pub struct WriteHalf {
    inner: WriteHalfInner,
}

enum WriteHalfInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    Process(ChildStdin),
}

impl Write for WriteHalf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            WriteHalfInner::Unix(stream) => stream.write(buf),
            WriteHalfInner::Process(stdin) => stdin.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            WriteHalfInner::Unix(stream) => stream.flush(),
            WriteHalfInner::Process(stdin) => stdin.flush(),
        }
    }
}

impl std::fmt::Debug for WriteHalf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteHalf").finish_non_exhaustive()
    }
}

/// Tears down a split stream.
///
/// Closing is idempotent. For sockets both directions are shut down, which
/// wakes a blocked reader with EOF. For native hosts the child is killed and
/// reaped, which closes its stdout.
#[derive(Clone)]
pub struct CloseHandle {
    inner: Arc<CloseInner>,
}

enum CloseInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    Process(Mutex<Child>),
}

impl CloseHandle {
    /// Close the underlying stream.
    pub fn close(&self) -> Result<()> {
        match self.inner.as_ref() {
            #[cfg(unix)]
            CloseInner::Unix(stream) => match stream.shutdown(std::net::Shutdown::Both) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
                Err(err) => Err(err.into()),
            },
            CloseInner::Process(child) => {
                let mut child = child.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                if child.try_wait()?.is_some() {
                    return Ok(());
                }
                match child.kill() {
                    Ok(()) => {}
                    // Already exited between try_wait and kill.
                    Err(err) if err.kind() == ErrorKind::InvalidInput => {}
                    Err(err) => return Err(err.into()),
                }
                let status = child.wait()?;
                debug!(pid = child.id(), ?status, "native host reaped");
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for CloseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.as_ref() {
            #[cfg(unix)]
            CloseInner::Unix(_) => f.debug_struct("CloseHandle").field("type", &"unix").finish(),
            CloseInner::Process(_) => f
                .debug_struct("CloseHandle")
                .field("type", &"native-host")
                .finish(),
        }
    }
}
