//! # Model Runtime Module
//!
//! Two runtime families coexist behind one capability trait: a tensor
//! framework executing TorchScript modules (`pytorch`) and a graph
//! execution library running ONNX sessions (`onnx`). The family is
//! selected once at startup from the descriptor's `model_type`; weights
//! stay device-resident for the container's lifetime.
//!
//! Each family is gated behind a cargo feature so containers only link
//! the framework they serve; a descriptor requesting a family that was
//! not compiled in fails at load time with an initialization error.

pub mod device;
pub mod onnx_engine;
pub mod torch_engine;
pub mod traits;

pub use device::{accelerator_present, select_device, Device};
pub use onnx_engine::OnnxEngine;
pub use torch_engine::TorchEngine;
pub use traits::{EngineError, ModelRuntime, RawDetection};

use crate::config::{ModelDescriptor, RuntimeKind};
use tracing::info;

/// Loads the runtime family named by the descriptor
///
/// This is the only place the concrete engine types appear; everything
/// downstream holds a `Box<dyn ModelRuntime>`.
pub fn load_runtime(
    descriptor: &ModelDescriptor,
    device: Device,
) -> Result<Box<dyn ModelRuntime>, EngineError> {
    info!(
        model_id = %descriptor.model_id,
        model_type = %descriptor.model_type,
        device = %device,
        weights = %descriptor.weights_path.display(),
        "loading model weights"
    );

    match descriptor.model_type {
        RuntimeKind::Torch => Ok(Box::new(TorchEngine::load(descriptor, device)?)),
        RuntimeKind::Onnx => Ok(Box::new(OnnxEngine::load(descriptor, device)?)),
    }
}
