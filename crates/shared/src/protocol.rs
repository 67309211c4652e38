//! # IPC Wire Protocol Module
//!
//! The hard boundary contract between the control plane (caller) and AI
//! model containers (callees).
//!
//! ## Transport
//!
//! Requests and responses travel over a Unix stream socket as
//! length-prefixed JSON messages:
//!
//! ```text
//! [4-byte big-endian length][UTF-8 JSON payload]
//! ```
//!
//! Messages larger than [`MAX_MESSAGE_SIZE`] are rejected at the framing
//! layer; the connection is closed without a response because malformed
//! framing cannot be answered safely.
//!
//! ## Contract
//!
//! - Exactly ONE request produces exactly ONE response
//! - No streaming, no partial results, no out-of-band messages
//! - Binary frame data never crosses the socket; only frame references do
//! - Containers treat each request independently and assume nothing about
//!   ordering across connections or cameras

use crate::error::{Result, VasError};
use serde::{Deserialize, Serialize};

/// Maximum size of a single framed message (10 MiB)
///
/// Requests and responses are small JSON documents; anything near this
/// limit indicates a protocol violation rather than a legitimate payload.
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Size of the big-endian length prefix preceding every message
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Frame header describing the bytes behind a frame reference
///
/// The shared-memory region itself carries no header; this metadata is the
/// complete description of the frame layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMetadata {
    /// Frame identifier, echoed back for correlation
    pub frame_id: i64,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format of the region (e.g. "NV12")
    pub format: String,
    /// Capture timestamp (seconds since epoch)
    pub timestamp: f64,
}

/// Optional per-request configuration overrides
///
/// Overrides are additive and non-persistent: unspecified fields inherit
/// the container defaults and nothing outlives the request. Unknown keys
/// are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOverrides {
    /// Temporary confidence threshold for this request only
    #[serde(default)]
    pub confidence_threshold: Option<f32>,
    /// Temporary NMS IOU threshold for this request only
    #[serde(default)]
    pub nms_iou_threshold: Option<f32>,
}

/// Single inference request sent to an AI model container
///
/// Immutable after decode; scoped to one response cycle. The frame
/// reference is READ-ONLY and must not be retained beyond the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    /// Path identifying a shared-memory region containing one decoded frame
    pub frame_reference: String,
    /// Description of the bytes at `frame_reference`
    pub frame_metadata: FrameMetadata,
    /// Source camera identifier, echoed back
    pub camera_id: String,
    /// Target model identifier; must match the container's loaded model
    pub model_id: String,
    /// Request send time (seconds since epoch)
    pub timestamp: f64,
    /// Optional per-request overrides
    #[serde(default)]
    pub config: Option<RequestOverrides>,
}

/// Lenient view of a request used to salvage identity fields
///
/// A request that is valid JSON but fails strict decoding still deserves a
/// well-formed in-band error response. This envelope decodes whatever
/// identity fields are present so the response can echo them; absent
/// fields default to empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestEnvelope {
    /// Camera identifier, if present
    #[serde(default)]
    pub camera_id: String,
    /// Model identifier, if present
    #[serde(default)]
    pub model_id: String,
    /// Raw frame metadata, if present
    #[serde(default)]
    pub frame_metadata: serde_json::Value,
}

impl RequestEnvelope {
    /// Extracts the frame id from the raw metadata, defaulting to 0
    pub fn frame_id(&self) -> i64 {
        self.frame_metadata
            .get("frame_id")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(0)
    }
}

/// Single detection result from an object-detection model
///
/// Other model families define their own detection-shaped payloads; the
/// IPC is polymorphic in this field. For object detection the invariants
/// are: `class_id >= 0`, `confidence` in [0,1], and a normalized bbox with
/// `bbox[0] <= bbox[2]` and `bbox[1] <= bbox[3]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Integer class identifier
    pub class_id: i64,
    /// Human-readable class name
    pub class_name: String,
    /// Confidence score in [0, 1]
    pub confidence: f32,
    /// Bounding box [x_min, y_min, x_max, y_max], normalized to [0, 1]
    /// relative to the original frame, top-left origin
    pub bbox: [f32; 4],
    /// Tracking id for multi-object tracking models; null otherwise
    pub track_id: Option<i64>,
}

/// Inference metadata attached to successful responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Wall-clock duration of the model forward pass, milliseconds
    pub inference_time_ms: f64,
    /// Device the forward pass ran on ("cuda" or "cpu")
    pub device: String,
    /// Runtime family of the loaded model ("pytorch" or "onnx")
    pub model_type: String,
    /// Width of the original frame in pixels
    pub frame_width: u32,
    /// Height of the original frame in pixels
    pub frame_height: u32,
}

/// Single inference response returned from an AI model container
///
/// Invariants: `model_id` and `camera_id` always echo the request; if
/// `error` is non-null then `detections` is empty. An empty detections
/// list with a null error is a valid "nothing detected" response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResponse {
    /// Echo of the request's model id
    pub model_id: String,
    /// Echo of the request's camera id
    pub camera_id: String,
    /// Echo of the request's frame id, for correlation
    pub frame_id: i64,
    /// Ordered detections; may be empty
    pub detections: Vec<Detection>,
    /// Inference metadata; absent on error responses
    pub metadata: Option<ResponseMetadata>,
    /// Error description when inference failed; null on success
    pub error: Option<String>,
}

impl InferenceResponse {
    /// Builds a successful response
    pub fn success(
        model_id: impl Into<String>,
        camera_id: impl Into<String>,
        frame_id: i64,
        detections: Vec<Detection>,
        metadata: ResponseMetadata,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            camera_id: camera_id.into(),
            frame_id,
            detections,
            metadata: Some(metadata),
            error: None,
        }
    }

    /// Builds an in-band error response
    ///
    /// The detections list is empty by construction, which is what keeps
    /// the `error != null => detections == []` invariant true everywhere.
    pub fn failure(
        model_id: impl Into<String>,
        camera_id: impl Into<String>,
        frame_id: i64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            camera_id: camera_id.into(),
            frame_id,
            detections: Vec::new(),
            metadata: None,
            error: Some(error.into()),
        }
    }
}

/// Frames a payload with its big-endian length prefix
///
/// Returns a protocol error instead of framing a payload the peer would
/// be required to reject.
pub fn encode_message(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(VasError::protocol(format!(
            "message too large: {} bytes (max {})",
            payload.len(),
            MAX_MESSAGE_SIZE
        )));
    }
    let mut framed = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    framed.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    framed.extend_from_slice(payload);
    Ok(framed)
}

/// Decodes a length prefix, rejecting oversize declarations
pub fn decode_length(prefix: [u8; LENGTH_PREFIX_SIZE]) -> Result<usize> {
    let length = u32::from_be_bytes(prefix) as usize;
    if length > MAX_MESSAGE_SIZE {
        return Err(VasError::protocol(format!(
            "declared message length {length} exceeds maximum {MAX_MESSAGE_SIZE}"
        )));
    }
    Ok(length)
}
