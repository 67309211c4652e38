//! # Model Descriptor Module
//!
//! Parses and validates `model.yaml` descriptors, the single source of
//! truth for a model's identity, input contract, resource policy, and
//! runtime configuration.
//!
//! ## Validation Rules
//!
//! - All required fields present and well-typed
//! - `model_type` is a known runtime family
//! - `confidence_threshold` and `nms_iou_threshold` lie in [0, 1]
//! - `expected_resolution` is exactly two positive integers
//! - `gpu_required` together with `cpu_fallback_allowed` is contradictory
//! - `model_weights` resolves (relative to the descriptor's directory or
//!   absolute) to an existing file
//!
//! A violation never escapes as a panic or an unclassified error: the
//! loader returns a [`DescriptorError`] that discovery folds into an
//! unavailability reason. Descriptors are immutable after construction.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the descriptor file inside each model directory
pub const DESCRIPTOR_FILE: &str = "model.yaml";

/// Classified descriptor loading failures
///
/// Discovery maps these onto the three unavailability reasons; the
/// variants carry the detail needed for the startup log.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// The model directory has no `model.yaml`
    #[error("no {DESCRIPTOR_FILE} in {}", .0.display())]
    Missing(PathBuf),

    /// The descriptor file exists but could not be read
    #[error("failed to read {DESCRIPTOR_FILE}: {0}")]
    Io(#[from] std::io::Error),

    /// The descriptor is not valid YAML or has wrongly-typed fields
    #[error("failed to parse {DESCRIPTOR_FILE}: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The descriptor parsed but violates a validation rule
    #[error("invalid {DESCRIPTOR_FILE}: {0}")]
    Invalid(String),

    /// The descriptor references a weights file that does not exist
    #[error("model weights not found: {}", .0.display())]
    MissingWeights(PathBuf),
}

/// Supported model runtime families
///
/// The serialized tags match the descriptor's `model_type` field; any
/// other tag fails deserialization and marks the descriptor invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RuntimeKind {
    /// TorchScript module executed through libtorch
    #[serde(rename = "pytorch")]
    Torch,
    /// ONNX graph executed through ONNX Runtime
    #[serde(rename = "onnx")]
    Onnx,
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Torch => write!(f, "pytorch"),
            Self::Onnx => write!(f, "onnx"),
        }
    }
}

/// Resource policy declared by a descriptor
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceRequirements {
    /// Model refuses to run without an accelerator
    #[serde(default)]
    pub gpu_required: bool,
    /// Minimum device memory hint in MiB; informational only
    #[serde(default)]
    pub gpu_memory_mb: Option<u64>,
    /// Model may run on CPU when no accelerator is present
    #[serde(default = "default_cpu_fallback")]
    pub cpu_fallback_allowed: bool,
}

impl Default for ResourceRequirements {
    fn default() -> Self {
        Self {
            gpu_required: false,
            gpu_memory_mb: None,
            cpu_fallback_allowed: true,
        }
    }
}

fn default_cpu_fallback() -> bool {
    true
}

fn default_input_format() -> String {
    "NV12".to_string()
}

fn default_resolution() -> [u32; 2] {
    [640, 640]
}

fn default_confidence() -> f32 {
    0.5
}

/// Parsed and validated model descriptor
///
/// Immutable after [`ModelDescriptor::load`] returns. The raw
/// `model_weights` value is kept as written; `weights_path` holds the
/// resolved, existence-checked location.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelDescriptor {
    /// Unique model identifier; keys the discovery registry and the socket name
    pub model_id: String,
    /// Human-readable model name
    pub model_name: String,
    /// Model version string
    pub model_version: String,

    /// Tasks this model supports (e.g. "object_detection")
    #[serde(default)]
    pub supported_tasks: Vec<String>,

    /// Pixel format the model container expects to read
    #[serde(default = "default_input_format")]
    pub input_format: String,
    /// Model input spatial size as [width, height]
    #[serde(default = "default_resolution")]
    pub expected_resolution: [u32; 2],

    /// Resource policy
    #[serde(default)]
    pub resource_requirements: ResourceRequirements,

    /// Runtime family used to execute the weights
    pub model_type: RuntimeKind,
    /// Weights location as written in the descriptor
    pub model_weights: PathBuf,
    /// Default confidence threshold applied at post-processing
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,
    /// IOU threshold for the greedy NMS pass; absent for models with
    /// built-in NMS
    #[serde(default)]
    pub nms_iou_threshold: Option<f32>,

    /// Opaque description of the model's raw output
    #[serde(default)]
    pub output_schema: serde_yaml::Mapping,

    /// Optional free-form metadata, logged at discovery time
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub license: Option<String>,

    /// Directory the descriptor was loaded from
    #[serde(skip)]
    pub model_dir: PathBuf,
    /// Resolved, existence-checked weights location
    #[serde(skip)]
    pub weights_path: PathBuf,
}

impl ModelDescriptor {
    /// Loads and validates the descriptor inside `model_dir`
    ///
    /// Returns a classified error instead of a partially-valid descriptor;
    /// callers never observe a descriptor that failed any rule.
    pub fn load(model_dir: &Path) -> Result<Self, DescriptorError> {
        let yaml_path = model_dir.join(DESCRIPTOR_FILE);
        if !yaml_path.is_file() {
            return Err(DescriptorError::Missing(model_dir.to_path_buf()));
        }

        let raw = std::fs::read_to_string(&yaml_path)?;
        let mut descriptor: Self = serde_yaml::from_str(&raw)?;
        descriptor.validate()?;

        descriptor.model_dir = model_dir.to_path_buf();
        descriptor.weights_path = if descriptor.model_weights.is_absolute() {
            descriptor.model_weights.clone()
        } else {
            model_dir.join(&descriptor.model_weights)
        };
        if !descriptor.weights_path.is_file() {
            return Err(DescriptorError::MissingWeights(descriptor.weights_path));
        }

        Ok(descriptor)
    }

    fn validate(&self) -> Result<(), DescriptorError> {
        if self.model_id.is_empty() {
            return Err(DescriptorError::Invalid("model_id must be non-empty".into()));
        }
        if self.model_name.is_empty() {
            return Err(DescriptorError::Invalid(
                "model_name must be non-empty".into(),
            ));
        }
        if self.model_version.is_empty() {
            return Err(DescriptorError::Invalid(
                "model_version must be non-empty".into(),
            ));
        }

        let [width, height] = self.expected_resolution;
        if width == 0 || height == 0 {
            return Err(DescriptorError::Invalid(format!(
                "expected_resolution must be two positive integers, got [{width}, {height}]"
            )));
        }

        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(DescriptorError::Invalid(format!(
                "confidence_threshold must be between 0.0 and 1.0, got {}",
                self.confidence_threshold
            )));
        }
        if let Some(iou) = self.nms_iou_threshold {
            if !(0.0..=1.0).contains(&iou) {
                return Err(DescriptorError::Invalid(format!(
                    "nms_iou_threshold must be between 0.0 and 1.0, got {iou}"
                )));
            }
        }

        if self.resource_requirements.gpu_required
            && self.resource_requirements.cpu_fallback_allowed
        {
            return Err(DescriptorError::Invalid(
                "gpu_required and cpu_fallback_allowed are contradictory".into(),
            ));
        }

        Ok(())
    }

    /// True when the model's raw outputs are already normalized to [0, 1]
    ///
    /// Declared via `coords: normalized` in `output_schema`; the default
    /// is model-input pixel coordinates.
    pub fn output_coords_normalized(&self) -> bool {
        self.output_schema
            .get("coords")
            .and_then(serde_yaml::Value::as_str)
            .map(|coords| coords == "normalized")
            .unwrap_or(false)
    }

    /// Resolved path of the optional class-name sidecar file
    pub fn class_names_path(&self) -> Option<PathBuf> {
        self.output_schema
            .get("class_names_file")
            .and_then(serde_yaml::Value::as_str)
            .map(|name| self.model_dir.join(name))
    }
}
