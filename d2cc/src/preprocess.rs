//! Local preprocessor run whose output is streamed to the daemon.

use d2cc_common::errors::SubprocessError;
use d2cc_common::protocol::MAX_DATA_CHUNK;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::debug;

/// Exit status and diagnostics of a finished preprocessor.
#[derive(Debug)]
pub struct PreprocessOutput {
    pub status: ExitStatus,
    pub stderr: Vec<u8>,
}

/// A running preprocessor. The child is killed if this is dropped early.
#[derive(Debug)]
pub struct Preprocessor {
    program: PathBuf,
    child: Child,
    stdout: Option<ChildStdout>,
    stderr_task: Option<JoinHandle<io::Result<Vec<u8>>>>,
    buf: Box<[u8; MAX_DATA_CHUNK]>,
}

impl Preprocessor {
    /// Spawn `program` with `args` (argv[0] excluded).
    ///
    /// stderr is collected in the background so it never interleaves with the
    /// output of a later local compile, and a chatty child never blocks on it.
    pub fn spawn(program: &Path, args: &[OsString]) -> Result<Self, SubprocessError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SubprocessError::SpawnFailed {
                program: program.to_path_buf(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut captured = Vec::new();
                stderr.read_to_end(&mut captured).await?;
                Ok(captured)
            })
        });
        debug!(program = %program.display(), pid = ?child.id(), "preprocessor started");

        Ok(Self {
            program: program.to_path_buf(),
            child,
            stdout,
            stderr_task,
            buf: Box::new([0u8; MAX_DATA_CHUNK]),
        })
    }

    /// Next chunk of output, at most [`MAX_DATA_CHUNK`] bytes; `None` at EOF.
    pub async fn read_chunk(&mut self) -> Result<Option<&[u8]>, SubprocessError> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };
        let n = loop {
            match stdout.read(&mut self.buf[..]).await {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(SubprocessError::ReadFailed(e)),
            }
        };
        if n == 0 {
            self.stdout = None;
            return Ok(None);
        }
        Ok(Some(&self.buf[..n]))
    }

    /// Reap the child. Call after [`read_chunk`](Self::read_chunk) returned `None`.
    pub async fn wait(mut self) -> Result<PreprocessOutput, SubprocessError> {
        // Unread output would keep the child blocked on a full pipe.
        drop(self.stdout.take());
        let status = self
            .child
            .wait()
            .await
            .map_err(SubprocessError::ReadFailed)?;
        let stderr = match self.stderr_task.take() {
            Some(task) => task
                .await
                .map_err(|e| SubprocessError::ReadFailed(io::Error::other(e)))?
                .map_err(SubprocessError::ReadFailed)?,
            None => Vec::new(),
        };
        debug!(program = %self.program.display(), %status, "preprocessor finished");
        if !status.success() {
            return Err(SubprocessError::NonZeroExit { status, stderr });
        }
        Ok(PreprocessOutput { status, stderr })
    }
}
