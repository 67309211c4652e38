//! # VAS Shared Library
//!
//! Shared types for the VAS model container runtime: the IPC wire contract
//! spoken between the control plane and model containers, the error types
//! used across all container components, and the in-process metrics
//! collector.
//!
//! ## Features
//!
//! - **Wire Protocol**: length-prefixed JSON request/response schema
//! - **Error Handling**: classified error types with exit-code mapping
//! - **Metrics Collection**: lock-free, best-effort request counters
//!
//! ## Design Principles
//!
//! - **Contract First**: the wire types are the hard boundary between the
//!   control plane and containers; nothing else crosses the socket
//! - **Fail Closed**: every error is classified as either request-scoped
//!   (answered in-band), connection-scoped (socket closed), or
//!   process-scoped (startup-fatal)
//! - **Thread Safety**: all shared types are safe for concurrent access

pub mod error;
pub mod metrics;
pub mod protocol;

// Re-export commonly used types for convenience
pub use error::{Result, VasError};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use protocol::{
    Detection, FrameMetadata, InferenceRequest, InferenceResponse, RequestEnvelope,
    RequestOverrides, ResponseMetadata, MAX_MESSAGE_SIZE,
};
