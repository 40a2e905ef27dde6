//! Hand-off point for committed compile requests.

use d2cc_common::session::CommittedRequest;
use d2cc_common::util::display_args;
use tracing::info;

/// Receives every request a client commits.
///
/// Called from connection tasks, so implementations must not block.
pub trait CompileExecutor: Send + Sync + 'static {
    fn submit(&self, connection: u64, request: CommittedRequest);
}

/// Logs each request and drops it. No compile backend exists yet.
#[derive(Debug, Default)]
pub struct LoggingExecutor;

impl CompileExecutor for LoggingExecutor {
    fn submit(&self, connection: u64, request: CommittedRequest) {
        info!(
            connection,
            version = request.version,
            data_bytes = request.data.len(),
            argv = %display_args(&request.argv),
            "compile request received, no executor available"
        );
    }
}
