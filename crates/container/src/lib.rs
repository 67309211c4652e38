//! # VAS Model Container
//!
//! Long-lived inference runtime on the serving edge of a video analytics
//! platform. The container owns one loaded model, speaks the IPC contract
//! over a local socket, reads referenced frames from shared memory,
//! preprocesses, executes inference, post-processes, and replies.
//!
//! ## Component Map
//!
//! - [`config`]: `model.yaml` descriptor parsing and validation
//! - [`discovery`]: one-shot filesystem scan into a frozen registry
//! - [`frame`]: read-only, copy-then-release shared-memory access
//! - [`preprocess`]: NV12 → RGB → model input tensor
//! - [`inference`]: runtime families behind one capability trait
//! - [`handler`]: stateless per-request pipeline
//! - [`server`]: unix-socket IPC with length-prefixed JSON framing
//! - [`container`]: lifecycle orchestration and signal handling
//!
//! ## Hard Constraints
//!
//! - Stateless per request: no per-camera context, no temporal state,
//!   no frame buffering, no retries
//! - Shared memory is read-only and never referenced past the copy step
//! - Model weights load exactly once per process lifetime
//! - One request, one response; failures inside a request degrade to an
//!   in-band error response without touching other in-flight requests

pub mod config;
pub mod container;
pub mod discovery;
pub mod frame;
pub mod handler;
pub mod inference;
pub mod preprocess;
pub mod server;

pub use config::{ModelDescriptor, RuntimeKind};
pub use container::{ContainerState, ModelContainer};
pub use discovery::{discover, DiscoveryRegistry, UnavailableReason};
pub use handler::InferenceHandler;
pub use inference::{Device, EngineError, ModelRuntime, RawDetection};
pub use server::IpcServer;
