//! # Inference Handler Module
//!
//! Stateless per-request pipeline: validate → read frame → preprocess →
//! forward pass → post-process → build response.
//!
//! ## Contract
//!
//! - Exactly one request produces exactly one response
//! - The handler holds no state between invocations beyond the immutable
//!   descriptor and the device-resident model
//! - No per-camera context, no temporal aggregation, no retries
//! - Request-scoped failures never escape as errors: they become in-band
//!   responses with `error` set and empty detections
//!
//! ## Thread Safety
//!
//! Safe to invoke from any number of concurrent workers. The only shared
//! mutable state is the model itself, protected by a single mutex held
//! strictly for the duration of the forward pass; frame I/O and
//! preprocessing run outside the lock so concurrency stays useful.

use crate::config::ModelDescriptor;
use crate::frame;
use crate::inference::{Device, ModelRuntime, RawDetection};
use crate::preprocess;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use vas_shared::error::{Result, VasError};
use vas_shared::metrics::MetricsCollector;
use vas_shared::protocol::{
    Detection, InferenceRequest, InferenceResponse, RequestEnvelope, RequestOverrides,
    ResponseMetadata,
};

/// Upper bound on detections per response, to bound reply size
pub const MAX_DETECTIONS: usize = 1000;

/// Stateless inference handler for one loaded model
pub struct InferenceHandler {
    descriptor: Arc<ModelDescriptor>,
    runtime: Mutex<Box<dyn ModelRuntime>>,
    device: Device,
    class_names: Vec<String>,
    metrics: Arc<MetricsCollector>,
}

impl InferenceHandler {
    /// Wires a loaded runtime to its descriptor
    ///
    /// Loads the optional class-name sidecar once; a missing or unreadable
    /// file downgrades to generated `class_<id>` names.
    pub fn new(
        descriptor: Arc<ModelDescriptor>,
        runtime: Box<dyn ModelRuntime>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let device = runtime.device();
        let class_names = load_class_names(&descriptor);

        Self {
            descriptor,
            runtime: Mutex::new(runtime),
            device,
            class_names,
            metrics,
        }
    }

    /// The descriptor this handler serves
    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    /// Decodes a framed payload, runs the pipeline, and encodes the reply
    ///
    /// Returns `Err` only for protocol-level failures (payloads that are
    /// not JSON objects); the caller closes the connection for those. Any
    /// other failure is answered in-band.
    pub fn handle_bytes(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let response = match serde_json::from_slice::<InferenceRequest>(payload) {
            Ok(request) => self.handle(request),
            Err(decode_err) => {
                // Valid JSON that fails strict decoding still gets an
                // in-band answer; salvage whatever identity fields exist.
                let envelope: RequestEnvelope = serde_json::from_slice(payload)?;
                self.metrics.record_request();
                self.metrics.record_error();
                warn!(error = %decode_err, "rejecting malformed inference request");
                let frame_id = envelope.frame_id();
                InferenceResponse::failure(
                    envelope.model_id,
                    envelope.camera_id,
                    frame_id,
                    format!("invalid request: {decode_err}"),
                )
            }
        };

        Ok(serde_json::to_vec(&response)?)
    }

    /// Processes one decoded request into exactly one response
    pub fn handle(&self, request: InferenceRequest) -> InferenceResponse {
        self.metrics.record_request();

        let frame_id = request.frame_metadata.frame_id;
        match self.run_pipeline(&request) {
            Ok((detections, inference_time)) => {
                self.metrics.record_inference_time(inference_time);
                debug!(
                    camera_id = %request.camera_id,
                    frame_id,
                    detections = detections.len(),
                    inference_time_ms = inference_time.as_secs_f64() * 1000.0,
                    "inference complete"
                );
                InferenceResponse::success(
                    request.model_id,
                    request.camera_id,
                    frame_id,
                    detections,
                    ResponseMetadata {
                        inference_time_ms: inference_time.as_secs_f64() * 1000.0,
                        device: self.device.to_string(),
                        model_type: self.descriptor.model_type.to_string(),
                        frame_width: request.frame_metadata.width,
                        frame_height: request.frame_metadata.height,
                    },
                )
            }
            Err(err) => {
                self.metrics.record_error();
                warn!(
                    camera_id = %request.camera_id,
                    frame_id,
                    error = %err,
                    "inference request failed"
                );
                InferenceResponse::failure(
                    request.model_id,
                    request.camera_id,
                    frame_id,
                    err.to_string(),
                )
            }
        }
    }

    fn run_pipeline(&self, request: &InferenceRequest) -> Result<(Vec<Detection>, Duration)> {
        self.validate(request)?;

        let frame = frame::read_frame(&request.frame_reference, &request.frame_metadata)?;
        let input = preprocess::prepare_input(
            &frame,
            &request.frame_metadata,
            self.descriptor.expected_resolution,
        )?;
        // The private frame copy is no longer needed once the tensor exists.
        drop(frame);

        let (raw, inference_time) = {
            let mut runtime = self
                .runtime
                .lock()
                .map_err(|_| VasError::internal("inference lock poisoned", None))?;
            let started = Instant::now();
            let raw = runtime.infer(&input).map_err(VasError::from)?;
            (raw, started.elapsed())
        };

        let detections = self.post_process(raw, request.config.as_ref());
        Ok((detections, inference_time))
    }

    fn validate(&self, request: &InferenceRequest) -> Result<()> {
        if request.frame_reference.is_empty() {
            return Err(VasError::validation(
                "frame_reference must be a non-empty path",
            ));
        }
        if request.camera_id.is_empty() {
            return Err(VasError::validation("camera_id must be non-empty"));
        }
        if request.model_id != self.descriptor.model_id {
            return Err(VasError::validation(format!(
                "model_id mismatch: this container serves {:?}, request targets {:?}",
                self.descriptor.model_id, request.model_id
            )));
        }
        if !request.timestamp.is_finite() {
            return Err(VasError::validation("timestamp must be a finite number"));
        }
        if let Some(config) = &request.config {
            if let Some(threshold) = config.confidence_threshold {
                if !(0.0..=1.0).contains(&threshold) {
                    return Err(VasError::validation(format!(
                        "confidence_threshold override must be between 0.0 and 1.0, got {threshold}"
                    )));
                }
            }
            if let Some(iou) = config.nms_iou_threshold {
                if !(0.0..=1.0).contains(&iou) {
                    return Err(VasError::validation(format!(
                        "nms_iou_threshold override must be between 0.0 and 1.0, got {iou}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Filters, normalizes, and clips raw detections
    ///
    /// Model output order is preserved; the NMS pass (run only when an
    /// IOU threshold is in effect) removes suppressed entries without
    /// reordering the survivors.
    fn post_process(
        &self,
        raw: Vec<RawDetection>,
        overrides: Option<&RequestOverrides>,
    ) -> Vec<Detection> {
        let confidence_threshold = overrides
            .and_then(|config| config.confidence_threshold)
            .unwrap_or(self.descriptor.confidence_threshold);
        let iou_threshold = overrides
            .and_then(|config| config.nms_iou_threshold)
            .or(self.descriptor.nms_iou_threshold);

        let [input_width, input_height] = self.descriptor.expected_resolution;
        let (scale_x, scale_y) = if self.descriptor.output_coords_normalized() {
            (1.0, 1.0)
        } else {
            (input_width as f32, input_height as f32)
        };

        let mut detections: Vec<Detection> = raw
            .into_iter()
            .filter(|detection| detection.confidence >= confidence_threshold)
            .map(|detection| {
                let x_min = (detection.x_min.min(detection.x_max) / scale_x).clamp(0.0, 1.0);
                let y_min = (detection.y_min.min(detection.y_max) / scale_y).clamp(0.0, 1.0);
                let x_max = (detection.x_min.max(detection.x_max) / scale_x).clamp(0.0, 1.0);
                let y_max = (detection.y_min.max(detection.y_max) / scale_y).clamp(0.0, 1.0);
                let class_id = detection.class_id.max(0);

                Detection {
                    class_id,
                    class_name: self.class_name(class_id),
                    confidence: detection.confidence.clamp(0.0, 1.0),
                    bbox: [x_min, y_min, x_max, y_max],
                    track_id: None,
                }
            })
            .collect();

        if let Some(iou) = iou_threshold {
            detections = greedy_nms(detections, iou);
        }
        detections.truncate(MAX_DETECTIONS);
        detections
    }

    fn class_name(&self, class_id: i64) -> String {
        usize::try_from(class_id)
            .ok()
            .and_then(|index| self.class_names.get(index))
            .cloned()
            .unwrap_or_else(|| format!("class_{class_id}"))
    }
}

fn load_class_names(descriptor: &ModelDescriptor) -> Vec<String> {
    let Some(path) = descriptor.class_names_path() else {
        return Vec::new();
    };
    match std::fs::read_to_string(&path) {
        Ok(contents) => contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect(),
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "class names file unreadable, using generated names"
            );
            Vec::new()
        }
    }
}

/// Greedy non-maximum suppression that preserves input order
///
/// Candidates are considered in descending confidence; a candidate
/// suppresses every lower-confidence box it overlaps past the IOU
/// threshold. Survivors are emitted in their original positions.
fn greedy_nms(detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    let mut order: Vec<usize> = (0..detections.len()).collect();
    order.sort_by(|&a, &b| {
        detections[b]
            .confidence
            .partial_cmp(&detections[a].confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut suppressed = vec![false; detections.len()];
    for (rank, &index) in order.iter().enumerate() {
        if suppressed[index] {
            continue;
        }
        for &other in &order[rank + 1..] {
            if !suppressed[other]
                && bbox_iou(&detections[index].bbox, &detections[other].bbox) > iou_threshold
            {
                suppressed[other] = true;
            }
        }
    }

    detections
        .into_iter()
        .enumerate()
        .filter(|(index, _)| !suppressed[*index])
        .map(|(_, detection)| detection)
        .collect()
}

/// Intersection-over-union of two [x_min, y_min, x_max, y_max] boxes
fn bbox_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let intersection = inter_w * inter_h;

    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    let union = area_a + area_b - intersection;

    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}
