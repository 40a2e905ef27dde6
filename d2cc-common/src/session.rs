//! Receiving half of a compile-request session.
//!
//! [`SessionReconstructor`] consumes decoded messages for one channel and
//! rebuilds the requests the client sent. A channel starts with exactly one
//! Hello, then carries any number of sequential requests, each built from
//! ArgV and Data messages and closed by CompileRequest or Discard.

use crate::errors::ProtocolError;
use crate::protocol::{Message, PROTOCOL_VERSION};
use std::ffi::OsString;
use std::os::unix::ffi::OsStrExt;
use tracing::{debug, trace};

/// Default cap on argv plus data bytes for a single request.
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 256 * 1024 * 1024;

/// A request closed by CompileRequest, ready for an executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedRequest {
    pub version: u16,
    pub flags: u16,
    pub argv: Vec<OsString>,
    /// Every Data body, concatenated in arrival order.
    pub data: Vec<u8>,
}

/// Terminal transition of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Committed(CommittedRequest),
    Discarded,
}

#[derive(Debug)]
pub struct SessionReconstructor {
    hello: Option<(u16, u16)>,
    argv: Vec<OsString>,
    data: Vec<u8>,
    pending: bool,
    request_bytes: usize,
    max_request_bytes: usize,
    committed_count: u64,
    discarded_count: u64,
}

impl Default for SessionReconstructor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUEST_BYTES)
    }
}

impl SessionReconstructor {
    pub fn new(max_request_bytes: usize) -> Self {
        Self {
            hello: None,
            argv: Vec::new(),
            data: Vec::new(),
            pending: false,
            request_bytes: 0,
            max_request_bytes,
            committed_count: 0,
            discarded_count: 0,
        }
    }

    /// Protocol version and flags from the Hello, once received.
    pub fn hello(&self) -> Option<(u16, u16)> {
        self.hello
    }

    /// True while ArgV or Data has arrived without a terminal message.
    pub fn has_pending_request(&self) -> bool {
        self.pending
    }

    pub fn committed_count(&self) -> u64 {
        self.committed_count
    }

    pub fn discarded_count(&self) -> u64 {
        self.discarded_count
    }

    fn account(&mut self, added: usize) -> Result<(), ProtocolError> {
        let size = self.request_bytes.saturating_add(added);
        if size > self.max_request_bytes {
            return Err(ProtocolError::RequestTooLarge {
                size,
                limit: self.max_request_bytes,
            });
        }
        self.request_bytes = size;
        self.pending = true;
        Ok(())
    }

    fn reset(&mut self) {
        self.argv.clear();
        self.data = Vec::new();
        self.pending = false;
        self.request_bytes = 0;
    }

    /// Apply one message.
    ///
    /// Returns an event when a request reaches a terminal state. Any error
    /// means the channel should be closed.
    pub fn feed(&mut self, message: Message) -> Result<Option<SessionEvent>, ProtocolError> {
        let Some((version, flags)) = self.hello else {
            return match message {
                Message::Hello { version, flags } => {
                    if version != PROTOCOL_VERSION {
                        return Err(ProtocolError::UnsupportedVersion(version));
                    }
                    debug!(version, flags, "session hello");
                    self.hello = Some((version, flags));
                    Ok(None)
                }
                other => Err(ProtocolError::UnexpectedMessage {
                    got: other.kind().name(),
                    state: "awaiting hello",
                }),
            };
        };

        match message {
            Message::Hello { .. } => Err(ProtocolError::UnexpectedMessage {
                got: "hello",
                state: "session already established",
            }),
            Message::ArgV(args) => {
                let added = args.iter().map(|a| a.as_bytes().len() + 1).sum();
                self.account(added)?;
                trace!(count = args.len(), "argv received");
                self.argv.extend(args);
                Ok(None)
            }
            Message::Data(chunk) => {
                self.account(chunk.len())?;
                self.data.extend_from_slice(&chunk);
                Ok(None)
            }
            Message::CompileRequest => {
                let request = CommittedRequest {
                    version,
                    flags,
                    argv: std::mem::take(&mut self.argv),
                    data: std::mem::take(&mut self.data),
                };
                self.reset();
                self.committed_count += 1;
                debug!(
                    args = request.argv.len(),
                    bytes = request.data.len(),
                    "request committed"
                );
                Ok(Some(SessionEvent::Committed(request)))
            }
            Message::Discard => {
                self.reset();
                self.discarded_count += 1;
                debug!(discarded = self.discarded_count, "request discarded");
                Ok(Some(SessionEvent::Discarded))
            }
        }
    }

    /// The channel reached end of stream. A pending request is discarded.
    pub fn finish(&mut self) -> Option<SessionEvent> {
        if !self.pending {
            return None;
        }
        self.reset();
        self.discarded_count += 1;
        debug!("channel closed with a pending request, discarding");
        Some(SessionEvent::Discarded)
    }
}
