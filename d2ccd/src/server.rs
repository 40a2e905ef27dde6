//! Unix socket listener and accept loop.

use std::fs;
use std::future::Future;
use std::io;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result, bail};
use tokio::net::UnixListener;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionContext, handle_connection};

/// Bind `path`, replacing a stale socket left by a previous run.
///
/// Refuses to remove anything that is not a socket.
pub fn bind(path: &Path) -> Result<UnixListener> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            debug!(path = %path.display(), "removing stale socket");
            fs::remove_file(path)
                .with_context(|| format!("failed to remove stale socket {}", path.display()))?;
        }
        Ok(_) => bail!("{} exists and is not a socket", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("failed to inspect {}", path.display()));
        }
    }

    let listener = UnixListener::bind(path)
        .with_context(|| format!("failed to bind {}", path.display()))?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("failed to restrict permissions on {}", path.display()))?;
    Ok(listener)
}

/// Accept connections until `shutdown` resolves.
///
/// At most `max_connections` channels are served at once; further clients
/// wait in the listen backlog.
pub async fn serve<F>(
    listener: UnixListener,
    ctx: ConnectionContext,
    max_connections: usize,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let limiter = Arc::new(Semaphore::new(max_connections.max(1)));
    let next_id = AtomicU64::new(1);
    tokio::pin!(shutdown);

    loop {
        let permit = tokio::select! {
            _ = &mut shutdown => break,
            permit = limiter.clone().acquire_owned() => permit?,
        };
        let stream = tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => stream,
                Err(e) => {
                    warn!("Accept error: {}", e);
                    continue;
                }
            },
        };

        let id = next_id.fetch_add(1, Ordering::Relaxed);
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let _permit = permit;
            match handle_connection(stream, id, &ctx).await {
                Ok(summary) => debug!(
                    connection = id,
                    committed = summary.committed,
                    discarded = summary.discarded,
                    "channel closed"
                ),
                Err(e) => debug!(connection = id, "channel error: {}", e),
            }
        });
    }

    info!("Shutting down");
    Ok(())
}
