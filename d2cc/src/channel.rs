//! Client end of a session with the d2cc daemon.

use d2cc_common::errors::ChannelError;
use d2cc_common::protocol::{
    MAX_DATA_CHUNK, PROTOCOL_FLAGS, PROTOCOL_VERSION, encode_argv, encode_compile_request,
    encode_data, encode_discard, encode_hello,
};
use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::debug;

/// Write all of `buf`, retrying writes interrupted by a signal.
pub async fn write_all_retrying<W: AsyncWrite + Unpin>(writer: &mut W, buf: &[u8]) -> io::Result<()> {
    let mut written = 0;
    while written < buf.len() {
        match writer.write(&buf[written..]).await {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    writer.flush().await
}

/// An open session: connected, Hello sent.
///
/// Dropping a channel with an open request makes one non-blocking attempt to
/// send Discard.
///
/// A write that failed, timed out or was cancelled may have left part of a
/// frame on the wire. The channel is then torn: nothing more is written and
/// close only shuts the socket down.
#[derive(Debug)]
pub struct SessionChannel {
    stream: Option<UnixStream>,
    io_timeout: Duration,
    in_request: bool,
    torn: bool,
    discarded_count: u64,
}

impl SessionChannel {
    pub async fn connect(
        path: &Path,
        connect_timeout: Duration,
        io_timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let stream = match timeout(connect_timeout, UnixStream::connect(path)).await {
            Err(_) => {
                return Err(ChannelError::TimedOut {
                    operation: "connect",
                    timeout_ms: connect_timeout.as_millis() as u64,
                });
            }
            Ok(Err(source)) => {
                return Err(ChannelError::ConnectFailed {
                    path: path.to_path_buf(),
                    source,
                });
            }
            Ok(Ok(stream)) => stream,
        };

        let mut channel = Self {
            stream: Some(stream),
            io_timeout,
            in_request: false,
            torn: false,
            discarded_count: 0,
        };
        channel
            .write_frame(&encode_hello(PROTOCOL_VERSION, PROTOCOL_FLAGS))
            .await
            .map_err(|e| match e {
                ChannelError::WriteFailed(source) => ChannelError::HandshakeFailed(source),
                other => other,
            })?;
        debug!(path = %path.display(), "session established");
        Ok(channel)
    }

    pub fn in_request(&self) -> bool {
        self.in_request
    }

    pub fn discarded_count(&self) -> u64 {
        self.discarded_count
    }

    pub fn is_torn(&self) -> bool {
        self.torn
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), ChannelError> {
        if self.torn {
            return Err(ChannelError::WriteFailed(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "session channel is torn mid-frame",
            )));
        }
        let stream = self.stream.as_mut().ok_or_else(|| {
            ChannelError::WriteFailed(io::Error::new(
                io::ErrorKind::NotConnected,
                "session channel is closed",
            ))
        })?;
        // Cleared only once the whole frame is out; stays set if this future
        // is dropped mid-write.
        self.torn = true;
        match timeout(self.io_timeout, write_all_retrying(stream, frame)).await {
            Err(_) => Err(ChannelError::TimedOut {
                operation: "write",
                timeout_ms: self.io_timeout.as_millis() as u64,
            }),
            Ok(Err(e)) => Err(ChannelError::WriteFailed(e)),
            Ok(Ok(())) => {
                self.torn = false;
                Ok(())
            }
        }
    }

    /// Send one ArgV message, opening a request.
    pub async fn send_argv<I, S>(&mut self, args: I) -> Result<(), ChannelError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let frame = encode_argv(args)?;
        self.in_request = true;
        self.write_frame(&frame).await
    }

    /// Send `bytes` as one or more Data messages.
    pub async fn send_data(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        self.in_request = true;
        for chunk in bytes.chunks(MAX_DATA_CHUNK) {
            let frame = encode_data(chunk)?;
            self.write_frame(&frame).await?;
        }
        Ok(())
    }

    /// Commit the open request.
    pub async fn finish_request(&mut self) -> Result<(), ChannelError> {
        self.write_frame(&encode_compile_request()).await?;
        self.in_request = false;
        Ok(())
    }

    /// Abandon the open request. No-op when no request is open or the
    /// channel is torn.
    pub async fn discard_request(&mut self) -> Result<(), ChannelError> {
        if !self.in_request {
            return Ok(());
        }
        self.in_request = false;
        if self.torn {
            debug!("channel torn mid-frame, not sending discard");
            return Ok(());
        }
        self.discarded_count += 1;
        self.write_frame(&encode_discard()).await
    }

    /// Discard any open request and shut the socket down. Idempotent.
    pub async fn close(&mut self) -> Result<(), ChannelError> {
        if self.stream.is_none() {
            return Ok(());
        }
        let discarded = self.discard_request().await;
        if let Some(mut stream) = self.stream.take() {
            // Peer may already be gone; nothing left to report.
            let _ = stream.shutdown().await;
        }
        discarded
    }
}

impl Drop for SessionChannel {
    fn drop(&mut self) {
        if !self.in_request || self.torn {
            return;
        }
        if let Some(stream) = &self.stream {
            let frame = encode_discard();
            match stream.try_write(&frame) {
                Ok(n) if n == frame.len() => debug!("discarded open request on drop"),
                Ok(_) | Err(_) => debug!("could not discard open request on drop"),
            }
        }
    }
}
