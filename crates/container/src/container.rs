//! # Container Orchestrator Module
//!
//! Process lifecycle for one model container: discovery → device
//! selection → model load → serve → graceful shutdown.
//!
//! ## Cardinality
//!
//! Exactly one container per model type. Containers are not per camera:
//! one long-lived, pre-loaded process serves every camera concurrently
//! and runs until explicitly stopped.
//!
//! ## Lifecycle
//!
//! States progress strictly forward:
//!
//! ```text
//! init -> discovering -> loading -> serving -> draining -> stopped
//! ```
//!
//! SIGINT or SIGTERM during `serving` starts draining: the listener stops
//! accepting, in-flight handlers get a bounded grace period, then the
//! socket is closed and unlinked. Startup failures (unavailable model,
//! required accelerator absent, engine load failure) terminate the
//! process before the socket ever appears.

use crate::discovery;
use crate::handler::InferenceHandler;
use crate::inference;
use crate::server::IpcServer;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use vas_shared::error::{Result, VasError};
use vas_shared::metrics::MetricsCollector;

/// Lifecycle states of a model container, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ContainerState {
    Init,
    Discovering,
    Loading,
    Serving,
    Draining,
    Stopped,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Discovering => "discovering",
            Self::Loading => "loading",
            Self::Serving => "serving",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        write!(f, "{name}")
    }
}

/// Long-lived inference runtime for one model
pub struct ModelContainer {
    model_id: String,
    models_root: PathBuf,
    socket_dir: PathBuf,
    state: ContainerState,
    metrics: Arc<MetricsCollector>,
}

impl ModelContainer {
    /// Creates a container that will serve `model_id` from `models_root`
    pub fn new(model_id: String, models_root: PathBuf, socket_dir: PathBuf) -> Self {
        Self {
            model_id,
            models_root,
            socket_dir,
            state: ContainerState::Init,
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ContainerState {
        self.state
    }

    /// Handle to the container's metrics collector
    pub fn metrics(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.metrics)
    }

    fn transition(&mut self, next: ContainerState) {
        debug_assert!(next > self.state, "container states only move forward");
        info!(from = %self.state, to = %next, "container state transition");
        self.state = next;
    }

    /// Runs the container until its work is done or a signal stops it
    ///
    /// Blocking in the async sense: returns only after `stopped`.
    pub async fn run(&mut self) -> Result<()> {
        info!(model_id = %self.model_id, "starting model container");

        self.transition(ContainerState::Discovering);
        let registry = discovery::discover(&self.models_root);
        let descriptor = match registry.get(&self.model_id) {
            Some(descriptor) => Arc::new(descriptor.clone()),
            None => {
                let detail = registry
                    .unavailable_reason(&self.model_id)
                    .map(|reason| format!(" ({reason})"))
                    .unwrap_or_default();
                return Err(VasError::configuration(
                    format!("model {:?} is not available{detail}", self.model_id),
                    None,
                ));
            }
        };

        self.transition(ContainerState::Loading);
        let device = inference::select_device(&descriptor)?;
        let runtime = inference::load_runtime(&descriptor, device)?;
        let handler = Arc::new(InferenceHandler::new(
            Arc::clone(&descriptor),
            runtime,
            Arc::clone(&self.metrics),
        ));

        let server = IpcServer::bind(&self.socket_dir, &self.model_id, handler)?;
        info!(
            model_id = %self.model_id,
            socket = %server.path().display(),
            device = %device,
            "model container ready to serve requests"
        );

        self.transition(ContainerState::Serving);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut serve_task = tokio::spawn(server.serve(shutdown_rx));

        tokio::select! {
            signal = shutdown_signal() => {
                info!(signal, "received shutdown signal");
                self.transition(ContainerState::Draining);
                let _ = shutdown_tx.send(true);
                join_serve(&mut serve_task).await?;
            }
            outcome = &mut serve_task => {
                flatten_join(outcome)?;
            }
        }

        self.transition(ContainerState::Stopped);
        let snapshot = self.metrics.snapshot();
        info!(
            model_id = %self.model_id,
            total_requests = snapshot.total_requests,
            total_errors = snapshot.total_errors,
            avg_inference_time_ms = snapshot.avg_inference_time_ms,
            "model container stopped"
        );
        Ok(())
    }
}

async fn join_serve(task: &mut tokio::task::JoinHandle<Result<()>>) -> Result<()> {
    flatten_join(task.await)
}

fn flatten_join(
    outcome: std::result::Result<Result<()>, tokio::task::JoinError>,
) -> Result<()> {
    match outcome {
        Ok(result) => result,
        Err(join_err) => Err(VasError::internal(
            format!("server task failed: {join_err}"),
            None,
        )),
    }
}

/// Resolves when SIGINT or SIGTERM arrives
async fn shutdown_signal() -> &'static str {
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            debug!("SIGINT received");
            "SIGINT"
        }
        _ = sigterm => {
            debug!("SIGTERM received");
            "SIGTERM"
        }
    }
}
