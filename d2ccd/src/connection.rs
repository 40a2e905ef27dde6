//! One client channel: frames in, committed requests out.

use std::sync::Arc;

use d2cc_common::protocol::{ReadError, read_message};
use d2cc_common::session::{SessionEvent, SessionReconstructor};
use tokio::io::AsyncRead;
use tracing::{debug, warn};

use crate::events::{
    CommittedEvent, EventBus, PROTOCOL_ERROR, ProtocolErrorEvent, REQUEST_COMMITTED,
    REQUEST_DISCARDED, SESSION_CLOSED, SESSION_OPENED, SessionEventData,
};
use crate::executor::CompileExecutor;

/// Shared by every connection task.
#[derive(Clone)]
pub struct ConnectionContext {
    pub events: EventBus,
    pub executor: Arc<dyn CompileExecutor>,
    pub max_request_bytes: usize,
}

/// Request totals for a finished channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSummary {
    pub committed: u64,
    pub discarded: u64,
}

/// Serve one channel until the peer closes it or sends something invalid.
///
/// A request still open at end of stream counts as discarded. On a protocol
/// error the pending request is dropped without being reported and the error
/// is returned so the caller can close the stream.
pub async fn handle_connection<S>(
    mut stream: S,
    id: u64,
    ctx: &ConnectionContext,
) -> Result<ConnectionSummary, ReadError>
where
    S: AsyncRead + Unpin,
{
    let mut session = SessionReconstructor::new(ctx.max_request_bytes);
    ctx.events.emit(
        SESSION_OPENED,
        &SessionEventData {
            connection: id,
            committed: 0,
            discarded: 0,
        },
    );

    let result = loop {
        let message = match read_message(&mut stream).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                if let Some(event) = session.finish() {
                    dispatch(id, event, ctx);
                }
                break Ok(());
            }
            Err(err) => break Err(err),
        };
        debug!(connection = id, kind = message.kind().name(), "frame");
        match session.feed(message) {
            Ok(Some(event)) => dispatch(id, event, ctx),
            Ok(None) => {}
            Err(err) => break Err(ReadError::Protocol(err)),
        }
    };

    if let Err(ReadError::Protocol(err)) = &result {
        warn!(connection = id, code = %err.code(), "closing channel: {}", err);
        ctx.events.emit(
            PROTOCOL_ERROR,
            &ProtocolErrorEvent {
                connection: id,
                code: err.code().code_string(),
                error: err.to_string(),
            },
        );
    }

    let summary = ConnectionSummary {
        committed: session.committed_count(),
        discarded: session.discarded_count(),
    };
    ctx.events.emit(
        SESSION_CLOSED,
        &SessionEventData {
            connection: id,
            committed: summary.committed,
            discarded: summary.discarded,
        },
    );
    result.map(|()| summary)
}

fn dispatch(id: u64, event: SessionEvent, ctx: &ConnectionContext) {
    match event {
        SessionEvent::Committed(request) => {
            ctx.events.emit(
                REQUEST_COMMITTED,
                &CommittedEvent {
                    connection: id,
                    version: request.version,
                    flags: request.flags,
                    argv: request
                        .argv
                        .iter()
                        .map(|arg| arg.to_string_lossy().into_owned())
                        .collect(),
                    data_bytes: request.data.len(),
                },
            );
            ctx.executor.submit(id, request);
        }
        SessionEvent::Discarded => {
            debug!(connection = id, "request discarded");
            ctx.events.emit(
                REQUEST_DISCARDED,
                &SessionEventData {
                    connection: id,
                    committed: 0,
                    discarded: 1,
                },
            );
        }
    }
}
