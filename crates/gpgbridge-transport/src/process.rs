use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::IpcStream;

/// A native-messaging host launched as a child process.
///
/// The host reads requests from its stdin and writes responses to its
/// stdout; stderr is inherited so engine diagnostics reach the terminal.
#[derive(Debug, Clone)]
pub struct NativeHost {
    program: PathBuf,
    args: Vec<OsString>,
}

impl NativeHost {
    /// Describe a host program with no extra arguments.
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
        }
    }

    /// Append an argument passed to the host on launch.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments passed to the host on launch.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The program that will be launched.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Launch the host and connect to its stdio.
    pub fn spawn(&self) -> Result<IpcStream> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| TransportError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(TransportError::Spawn {
                program: self.program.clone(),
                source: std::io::Error::other("native host stdio was not captured"),
            });
        };

        info!(program = ?self.program, pid = child.id(), "native host started");
        debug!(args = ?self.args, "native host arguments");
        Ok(IpcStream::from_child(stdin, stdout, child))
    }
}
