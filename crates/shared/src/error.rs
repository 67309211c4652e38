//! # Shared Error Handling Module
//!
//! Classified error handling for VAS model containers with context
//! preservation and a fixed propagation policy.
//!
//! ## Error Categories
//!
//! - **Configuration Errors**: invalid descriptors, CLI options, bad paths
//! - **Protocol Errors**: framing violations, undecodable payloads
//! - **Validation Errors**: well-framed but invalid inference requests
//! - **Frame Errors**: shared-memory regions that cannot be read
//! - **Preprocess / Inference Errors**: pipeline failures inside a request
//! - **Resource Errors**: required accelerator absent at startup
//!
//! ## Propagation Policy
//!
//! Every error is scoped. Request-scoped errors become in-band error
//! responses with empty detections; they never cross the IPC boundary as
//! anything else. Protocol errors close the connection without a response,
//! because the framing is the only thing an in-band error could rely on.
//! Configuration and resource errors are startup-fatal and map to distinct
//! process exit codes.

use thiserror::Error;

/// Result type alias for VAS container operations
///
/// This is the standard Result type used throughout the container codebase.
/// It provides a consistent interface for error handling and makes error
/// propagation more ergonomic.
pub type Result<T> = std::result::Result<T, VasError>;

/// Classified error types for VAS model container operations
///
/// Each variant carries enough context to produce an actionable log line
/// and, where applicable, an in-band error response. Variants map onto the
/// container's failure taxonomy rather than onto the modules that raise
/// them: a size-mismatched shared-memory region is a `Frame` error whether
/// the reader or the preprocessor noticed it first.
#[derive(Error, Debug)]
pub enum VasError {
    /// Configuration validation errors
    ///
    /// Raised during startup when a descriptor, CLI option, or filesystem
    /// path fails validation. Never observed at request time.
    ///
    /// **Recovery Strategy**: fix the configuration and restart
    #[error("Configuration error: {message}")]
    Configuration {
        /// Human-readable description of the configuration issue
        message: String,
        /// Optional source error for additional context
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Wire protocol errors
    ///
    /// Raised when a connection violates the framing contract: oversize
    /// messages, truncated length prefixes, or payloads that are not valid
    /// JSON. The connection is closed without a response because no
    /// well-formed reply can be correlated with the offending message.
    ///
    /// **Recovery Strategy**: caller reconnects with a fresh request
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the framing or decoding violation
        message: String,
    },

    /// Request validation errors
    ///
    /// Raised when a well-framed request is missing fields, carries wrong
    /// types, or targets a model this container does not serve. Answered
    /// in-band with an error response and empty detections.
    ///
    /// **Recovery Strategy**: caller corrects the request
    #[error("Invalid request: {reason}")]
    RequestValidation {
        /// Reason the request was rejected
        reason: String,
    },

    /// Shared-memory frame access errors
    ///
    /// Raised when the referenced region is missing, unreadable, smaller
    /// than the declared frame, or in an unsupported pixel format.
    /// Answered in-band; the frame is gone and is never retried.
    ///
    /// **Recovery Strategy**: caller sends a fresh frame reference
    #[error("Frame error for {reference}: {message}")]
    Frame {
        /// Frame reference path that failed
        reference: String,
        /// Description of the failure
        message: String,
        /// Underlying I/O error, when one exists
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Preprocessing errors
    ///
    /// Raised when a copied frame cannot be converted into the model's
    /// input tensor (zero dimensions, plane-size mismatch, allocation
    /// failure). Answered in-band.
    #[error("Preprocess error: {message}")]
    Preprocess {
        /// Description of the failure
        message: String,
    },

    /// Inference execution errors
    ///
    /// Raised when the model forward pass fails at request time. Answered
    /// in-band; a persistent device fault keeps producing these until an
    /// external supervisor restarts the process.
    ///
    /// **Recovery Strategy**: none in-process; no retries
    #[error("Inference error: {message}")]
    Inference {
        /// Description of the runtime failure
        message: String,
    },

    /// Required resource absent at startup
    ///
    /// Raised when the descriptor requires an accelerator that is not
    /// present and CPU fallback is not allowed. Startup-fatal: the process
    /// exits non-zero and the socket never appears.
    ///
    /// **Recovery Strategy**: schedule the container on capable hardware
    #[error("Resource unavailable: {resource} - {message}")]
    ResourceUnavailable {
        /// The resource that is missing (e.g. "cuda")
        resource: String,
        /// Additional context
        message: String,
    },

    /// Internal errors
    ///
    /// Unexpected failures that indicate bugs or OS-level problems rather
    /// than bad input.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal failure
        message: String,
        /// Source error for debugging
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl VasError {
    /// Creates a configuration error with optional source context
    pub fn configuration(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Configuration {
            message: message.into(),
            source,
        }
    }

    /// Creates a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a request validation error
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::RequestValidation {
            reason: reason.into(),
        }
    }

    /// Creates a frame access error with optional source context
    pub fn frame(
        reference: impl Into<String>,
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Frame {
            reference: reference.into(),
            message: message.into(),
            source,
        }
    }

    /// Creates a preprocessing error
    pub fn preprocess(message: impl Into<String>) -> Self {
        Self::Preprocess {
            message: message.into(),
        }
    }

    /// Creates an inference execution error
    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference {
            message: message.into(),
        }
    }

    /// Creates a resource unavailability error
    pub fn resource_unavailable(
        resource: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ResourceUnavailable {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Creates an internal error with optional source context
    pub fn internal(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source,
        }
    }

    /// Returns true when this error is answered in-band
    ///
    /// Request-scoped errors produce a well-formed response with `error`
    /// set and empty detections. Everything else either closes the
    /// connection (protocol) or terminates startup (configuration,
    /// resource).
    pub fn is_request_scoped(&self) -> bool {
        matches!(
            self,
            Self::RequestValidation { .. }
                | Self::Frame { .. }
                | Self::Preprocess { .. }
                | Self::Inference { .. }
        )
    }

    /// Maps startup errors to process exit codes
    ///
    /// - Configuration errors exit with 1
    /// - Resource errors (accelerator required but absent) exit with 2
    /// - Anything else that escapes to `main` exits with 3
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration { .. } => 1,
            Self::ResourceUnavailable { .. } => 2,
            _ => 3,
        }
    }
}

impl From<std::io::Error> for VasError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal {
            message: format!("I/O error: {err}"),
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_json::Error> for VasError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol {
            message: format!("invalid JSON payload: {err}"),
        }
    }
}
