//! Client request state machine.
//!
//! ```text
//! Disconnected -> Connected -> RequestOpen -> Committed
//!                                  |
//!                                  +-------> Discarded
//! ```
//!
//! Reaching Committed is not a successful build: until the daemon can return
//! results, every committed request ends in [`RemoteUnimplemented`] and the
//! wrapper compiles locally.

use crate::channel::SessionChannel;
use crate::preprocess::Preprocessor;
use d2cc_common::argv::{preprocess_args, remote_args};
use d2cc_common::errors::{ChannelError, ErrorCode, RemoteUnimplemented, SubprocessError};
use d2cc_common::types::ClientConfig;
use std::ffi::OsString;
use std::path::Path;
use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Disconnected,
    Connected,
    RequestOpen,
    Committed,
    Discarded,
}

/// Why the remote path was abandoned.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Subprocess(#[from] SubprocessError),
    #[error(transparent)]
    Unimplemented(#[from] RemoteUnimplemented),
}

impl RemoteError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Channel(e) => e.code(),
            Self::Subprocess(e) => e.code(),
            Self::Unimplemented(e) => e.code(),
        }
    }

    /// Pipeline stage the failure belongs to, for diagnostics.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Channel(_) => "channel",
            Self::Subprocess(_) => "preprocess",
            Self::Unimplemented(_) => "result",
        }
    }
}

/// One attempt to hand a compile to the daemon.
pub struct RemoteRequest<'a> {
    config: &'a ClientConfig,
    socket_path: &'a Path,
    compiler: &'a Path,
    argv: &'a [OsString],
    state: RequestState,
}

impl<'a> RemoteRequest<'a> {
    pub fn new(
        config: &'a ClientConfig,
        socket_path: &'a Path,
        compiler: &'a Path,
        argv: &'a [OsString],
    ) -> Self {
        Self {
            config,
            socket_path,
            compiler,
            argv,
            state: RequestState::Disconnected,
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    fn transition(&mut self, next: RequestState) {
        debug!(from = ?self.state, to = ?next, "request state");
        self.state = next;
    }

    /// Drive the request to a terminal state.
    ///
    /// On failure after the request opened, Discard is sent before returning.
    pub async fn run(&mut self) -> Result<(), RemoteError> {
        let mut channel = SessionChannel::connect(
            self.socket_path,
            self.config.connect_timeout(),
            self.config.io_timeout(),
        )
        .await?;
        self.transition(RequestState::Connected);

        let streamed = self.stream_request(&mut channel).await;
        let committed = match streamed {
            Ok(()) => channel.finish_request().await.map_err(RemoteError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = committed {
            debug!(open = channel.in_request(), "abandoning request");
            let before = channel.discarded_count();
            match channel.close().await {
                Ok(()) if channel.discarded_count() > before => {
                    debug!(discarded = channel.discarded_count(), "request discarded")
                }
                Ok(()) if channel.is_torn() => debug!("channel torn, closed without discard"),
                Ok(()) => {}
                Err(discard) => debug!(error = %discard, "discard not delivered"),
            }
            if self.state == RequestState::RequestOpen {
                self.transition(RequestState::Discarded);
            }
            return Err(e);
        }
        self.transition(RequestState::Committed);

        let outcome = self.await_result(&mut channel).await;
        let _ = channel.close().await;
        outcome
    }

    async fn stream_request(&mut self, channel: &mut SessionChannel) -> Result<(), RemoteError> {
        channel.send_argv(remote_args(self.argv)).await?;
        self.transition(RequestState::RequestOpen);

        let pre_argv = preprocess_args(self.argv);
        let pre_args = pre_argv.get(1..).unwrap_or_default();
        let compiler = self.compiler;
        let limit = self.config.preprocess_timeout();

        let pipeline = async {
            let mut pre = Preprocessor::spawn(compiler, pre_args)?;
            while let Some(chunk) = pre.read_chunk().await? {
                channel.send_data(chunk).await?;
            }
            let output = pre.wait().await?;
            debug!(
                status = %output.status,
                stderr_bytes = output.stderr.len(),
                "preprocessing complete"
            );
            Ok::<(), RemoteError>(())
        };
        match timeout(limit, pipeline).await {
            Ok(result) => result,
            Err(_) => Err(SubprocessError::TimedOut {
                timeout_secs: limit.as_secs(),
            }
            .into()),
        }
    }

    async fn await_result(&mut self, _channel: &mut SessionChannel) -> Result<(), RemoteError> {
        Err(RemoteUnimplemented.into())
    }
}
