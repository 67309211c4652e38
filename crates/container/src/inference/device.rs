//! Device selection policy
//!
//! Accelerator absence is decided once at startup and never revisited:
//! if the descriptor allows CPU, take it; if not, fail fast. The probe is
//! runtime-family specific because each framework reports availability
//! through its own API.

use crate::config::{ModelDescriptor, ResourceRequirements, RuntimeKind};
use std::fmt;
use tracing::{debug, warn};
use vas_shared::error::{Result, VasError};

/// Compute device a model runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    /// Host CPU
    Cpu,
    /// CUDA device with ordinal
    Cuda(i32),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(_) => write!(f, "cuda"),
        }
    }
}

/// Selects the device for a descriptor, probing the accelerator
///
/// | `gpu_required` | accelerator | `cpu_fallback_allowed` | outcome          |
/// |:--------------:|:-----------:|:----------------------:|:-----------------|
/// | true           | yes         | any                    | accelerator      |
/// | true           | no          | any                    | startup-fatal    |
/// | false          | yes         | any                    | accelerator      |
/// | false          | no          | true                   | CPU (warning)    |
/// | false          | no          | false                  | CPU              |
pub fn select_device(descriptor: &ModelDescriptor) -> Result<Device> {
    let present = accelerator_present(descriptor.model_type);
    select_with_accelerator(
        &descriptor.model_id,
        &descriptor.resource_requirements,
        present,
    )
}

/// Pure decision half of [`select_device`], split out so the policy table
/// is testable without hardware
fn select_with_accelerator(
    model_id: &str,
    resources: &ResourceRequirements,
    accelerator_present: bool,
) -> Result<Device> {
    if accelerator_present {
        if let Some(memory) = resources.gpu_memory_mb {
            debug!(model_id, gpu_memory_mb = memory, "selecting accelerator");
        }
        return Ok(Device::Cuda(0));
    }

    if resources.gpu_required {
        return Err(VasError::resource_unavailable(
            "cuda",
            format!("model {model_id:?} requires a GPU and no accelerator is present"),
        ));
    }

    if resources.cpu_fallback_allowed {
        warn!(model_id, "no accelerator present, falling back to CPU");
    }
    Ok(Device::Cpu)
}

/// Probes accelerator availability for a runtime family
pub fn accelerator_present(kind: RuntimeKind) -> bool {
    match kind {
        RuntimeKind::Torch => torch_cuda_available(),
        RuntimeKind::Onnx => onnx_cuda_available(),
    }
}

#[cfg(feature = "torch")]
fn torch_cuda_available() -> bool {
    tch::Cuda::is_available()
}

#[cfg(not(feature = "torch"))]
fn torch_cuda_available() -> bool {
    false
}

#[cfg(feature = "onnx")]
fn onnx_cuda_available() -> bool {
    use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};

    CUDAExecutionProvider::default()
        .is_available()
        .unwrap_or(false)
}

#[cfg(not(feature = "onnx"))]
fn onnx_cuda_available() -> bool {
    false
}
