//! Error taxonomy for d2cc.
//!
//! Library code reports failures through the enums below. Every variant maps
//! onto a stable [`ErrorCode`] so diagnostics carry the same `D2CC-Ennn` code
//! no matter which binary emits them. None of these is fatal to a build: the
//! wrapper recovers from all of them by compiling locally.

pub mod catalog;

pub use catalog::{ErrorCategory, ErrorCode, ErrorEntry};

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Wire decode and session sequencing failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("truncated message: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("unknown message tag {0:?}")]
    UnknownTag([u8; 4]),

    #[error("unexpected {got} message while {state}")]
    UnexpectedMessage { got: &'static str, state: &'static str },

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u16),

    #[error("request of {size} bytes exceeds limit of {limit} bytes")]
    RequestTooLarge { size: usize, limit: usize },
}

impl ProtocolError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Malformed(_) => ErrorCode::ProtocolMalformed,
            Self::Truncated { .. } => ErrorCode::ProtocolTruncated,
            Self::UnknownTag(_) => ErrorCode::ProtocolUnknownTag,
            Self::UnexpectedMessage { .. } => ErrorCode::ProtocolUnexpectedMessage,
            Self::UnsupportedVersion(_) => ErrorCode::ProtocolUnsupportedVersion,
            Self::RequestTooLarge { .. } => ErrorCode::ProtocolRequestTooLarge,
        }
    }
}

/// Local socket failures on the client side.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("connect to {path} failed: {source}")]
    ConnectFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("hello handshake failed: {0}")]
    HandshakeFailed(#[source] io::Error),

    #[error("write failed: {0}")]
    WriteFailed(#[source] io::Error),

    #[error("read failed: {0}")]
    ReadFailed(#[source] io::Error),

    #[error("{operation} timed out after {timeout_ms}ms")]
    TimedOut {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("invalid message: {0}")]
    Encode(#[from] ProtocolError),
}

impl ChannelError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ConnectFailed { .. } => ErrorCode::ChannelConnectFailed,
            Self::HandshakeFailed(_) => ErrorCode::ChannelHandshakeFailed,
            Self::WriteFailed(_) => ErrorCode::ChannelWriteFailed,
            Self::ReadFailed(_) => ErrorCode::ChannelReadFailed,
            Self::TimedOut { .. } => ErrorCode::ChannelTimedOut,
            Self::Encode(e) => e.code(),
        }
    }
}

/// Preprocessor pipeline failures.
#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("spawn {program} failed: {source}")]
    SpawnFailed {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("preprocessor exited with {status}")]
    NonZeroExit { status: ExitStatus, stderr: Vec<u8> },

    #[error("reading preprocessor output failed: {0}")]
    ReadFailed(#[source] io::Error),

    #[error("preprocessing timed out after {timeout_secs}s")]
    TimedOut { timeout_secs: u64 },
}

impl SubprocessError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::SpawnFailed { .. } => ErrorCode::SubprocessSpawnFailed,
            Self::NonZeroExit { .. } => ErrorCode::SubprocessNonZeroExit,
            Self::ReadFailed(_) => ErrorCode::SubprocessReadFailed,
            Self::TimedOut { .. } => ErrorCode::SubprocessTimedOut,
        }
    }
}

/// A request was committed, but there is no way to receive its result yet.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("remote protocol not implemented")]
pub struct RemoteUnimplemented;

impl RemoteUnimplemented {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::RemoteUnimplemented
    }
}
