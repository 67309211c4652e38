//! # IPC Server Module
//!
//! Unix domain socket server for the model container.
//!
//! ## Architecture
//!
//! - One persistent socket per container at
//!   `<sockdir>/vas_model_<model_id>.sock`, owner-only permissions
//! - Accept loop never blocks on handler work: each connection runs in
//!   its own task, and the CPU-bound handler runs on the blocking pool
//! - Pipelined requests on one connection are served in order until EOF;
//!   each request produces exactly one response
//!
//! ## Failure Semantics
//!
//! - Framing violation, oversize message, I/O deadline, or write failure:
//!   the connection is closed without a response
//! - Handler-level failures are already in-band responses by the time
//!   they reach this module
//! - No retries anywhere; the caller owns reconnection

use crate::handler::InferenceHandler;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use vas_shared::error::{Result, VasError};
use vas_shared::protocol::{decode_length, encode_message, LENGTH_PREFIX_SIZE};

/// Deadline applied to each socket read and write phase
pub const IO_TIMEOUT: Duration = Duration::from_secs(30);

/// How long in-flight handlers may run after shutdown begins
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Deterministic socket path for a model id
pub fn socket_path(socket_dir: &Path, model_id: &str) -> PathBuf {
    socket_dir.join(format!("vas_model_{model_id}.sock"))
}

/// Unix domain socket server bound to one model's endpoint
pub struct IpcServer {
    listener: UnixListener,
    path: PathBuf,
    handler: Arc<InferenceHandler>,
}

impl IpcServer {
    /// Binds the model's socket, replacing a stale one if present
    ///
    /// Permissions are restricted to the owner (0600) before the first
    /// connection can be accepted.
    pub fn bind(
        socket_dir: &Path,
        model_id: &str,
        handler: Arc<InferenceHandler>,
    ) -> Result<Self> {
        let path = socket_path(socket_dir, model_id);

        if path.exists() {
            std::fs::remove_file(&path).map_err(|err| {
                VasError::configuration(
                    format!("failed to remove stale socket {}", path.display()),
                    Some(Box::new(err)),
                )
            })?;
        }

        let listener = UnixListener::bind(&path).map_err(|err| {
            VasError::configuration(
                format!("failed to bind {}", path.display()),
                Some(Box::new(err)),
            )
        })?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).map_err(
            |err| {
                VasError::configuration(
                    format!("failed to restrict permissions on {}", path.display()),
                    Some(Box::new(err)),
                )
            },
        )?;

        info!(socket = %path.display(), "IPC server listening");

        Ok(Self {
            listener,
            path,
            handler,
        })
    }

    /// Path of the bound socket
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accepts connections until `shutdown` flips, then drains
    ///
    /// Draining stops the accept loop, gives in-flight connections
    /// [`SHUTDOWN_GRACE`] to finish, aborts the rest, and unlinks the
    /// socket.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut connections: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            let handler = Arc::clone(&self.handler);
                            connections.spawn(handle_connection(stream, handler));
                        }
                        Err(err) => {
                            warn!(error = %err, "failed to accept connection");
                        }
                    }
                }
                _ = shutdown.changed() => break,
            }

            // Reap connection tasks that already finished so the set does
            // not grow for the container's lifetime.
            while connections.try_join_next().is_some() {}
        }

        info!(in_flight = connections.len(), "draining connections");
        let drained = timeout(SHUTDOWN_GRACE, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = connections.len(),
                "grace period expired, dropping in-flight connections"
            );
            connections.shutdown().await;
        }

        if let Err(err) = std::fs::remove_file(&self.path) {
            warn!(
                socket = %self.path.display(),
                error = %err,
                "failed to unlink socket"
            );
        }
        info!("IPC server stopped");
        Ok(())
    }
}

/// Serves one connection: framed request in, framed response out,
/// repeated until EOF or a violation closes the stream
async fn handle_connection(mut stream: UnixStream, handler: Arc<InferenceHandler>) {
    loop {
        // Length prefix. EOF here is the clean between-requests close.
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        match timeout(IO_TIMEOUT, stream.read_exact(&mut prefix)).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("connection closed by peer");
                return;
            }
            Ok(Err(err)) => {
                warn!(error = %err, "failed to read length prefix");
                return;
            }
            Err(_) => {
                debug!("connection idle past deadline, closing");
                return;
            }
        }

        let length = match decode_length(prefix) {
            Ok(length) => length,
            Err(err) => {
                warn!(error = %err, "closing connection on framing violation");
                return;
            }
        };

        let mut payload = vec![0u8; length];
        match timeout(IO_TIMEOUT, stream.read_exact(&mut payload)).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                warn!(error = %err, "failed to read request payload");
                return;
            }
            Err(_) => {
                warn!("request read exceeded deadline, closing");
                return;
            }
        }

        // The pipeline is CPU-bound (frame copy, preprocess, forward
        // pass); keep it off the async workers.
        let request_handler = Arc::clone(&handler);
        let outcome =
            tokio::task::spawn_blocking(move || request_handler.handle_bytes(&payload)).await;

        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                warn!(error = %err, "closing connection");
                return;
            }
            Err(join_err) => {
                error!(error = %join_err, "handler task failed");
                return;
            }
        };

        let framed = match encode_message(&response) {
            Ok(framed) => framed,
            Err(err) => {
                warn!(error = %err, "response exceeds frame limit, closing");
                return;
            }
        };
        match timeout(IO_TIMEOUT, stream.write_all(&framed)).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                // The caller may have dropped the connection mid-inference;
                // the failure is theirs to observe.
                debug!(error = %err, "failed to write response");
                return;
            }
            Err(_) => {
                warn!("response write exceeded deadline, closing");
                return;
            }
        }
    }
}
