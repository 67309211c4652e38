//! ONNX Runtime inference engine
//!
//! Executes ONNX graphs through `ort`. Execution providers are chosen at
//! load time from the selected device; when CUDA is requested the CPU
//! provider is registered after it so session creation matches the
//! device-selection decision instead of second-guessing it at request
//! time.

use crate::config::{ModelDescriptor, RuntimeKind};
use crate::inference::device::Device;
use crate::inference::traits::{EngineError, ModelRuntime, RawDetection};
use ndarray::Array4;

#[cfg(feature = "onnx")]
mod imp {
    use super::*;
    use crate::inference::traits::parse_rows;
    use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::Session;
    use tracing::info;

    /// ONNX Runtime session with resolved input/output names
    pub struct OnnxEngine {
        session: Session,
        input_name: String,
        output_name: String,
        device: Device,
    }

    impl OnnxEngine {
        /// Builds a session for the descriptor's graph on `device`
        pub fn load(descriptor: &ModelDescriptor, device: Device) -> Result<Self, EngineError> {
            let builder = Session::builder()
                .and_then(|builder| {
                    builder.with_optimization_level(GraphOptimizationLevel::Level3)
                })
                .and_then(|builder| match device {
                    Device::Cpu => builder
                        .with_execution_providers([CPUExecutionProvider::default().build()]),
                    Device::Cuda(ordinal) => builder.with_execution_providers([
                        CUDAExecutionProvider::default()
                            .with_device_id(ordinal)
                            .build(),
                        CPUExecutionProvider::default().build(),
                    ]),
                })
                .map_err(|err| {
                    EngineError::Initialization(format!("failed to configure session: {err}"))
                })?;

            let session = builder
                .commit_from_file(&descriptor.weights_path)
                .map_err(|err| {
                    EngineError::Initialization(format!(
                        "failed to load ONNX model from {}: {err}",
                        descriptor.weights_path.display()
                    ))
                })?;

            let input_name = session
                .inputs
                .first()
                .map(|input| input.name.clone())
                .ok_or_else(|| EngineError::Initialization("model has no inputs".into()))?;
            let output_name = session
                .outputs
                .first()
                .map(|output| output.name.clone())
                .ok_or_else(|| EngineError::Initialization("model has no outputs".into()))?;

            info!(
                model_id = %descriptor.model_id,
                device = %device,
                input = %input_name,
                output = %output_name,
                "ONNX session created"
            );

            Ok(Self {
                session,
                input_name,
                output_name,
                device,
            })
        }
    }

    impl ModelRuntime for OnnxEngine {
        fn infer(&mut self, input: &Array4<f32>) -> Result<Vec<RawDetection>, EngineError> {
            let tensor = ort::value::Tensor::from_array(input.clone()).map_err(|err| {
                EngineError::Processing(format!("failed to build input tensor: {err}"))
            })?;

            let outputs = self
                .session
                .run(ort::inputs![self.input_name.as_str() => tensor])
                .map_err(|err| EngineError::Processing(format!("forward pass failed: {err}")))?;

            let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
                EngineError::Processing(format!("output {:?} not found", self.output_name))
            })?;
            let view = output.try_extract_array::<f32>().map_err(|err| {
                EngineError::Processing(format!("failed to extract output tensor: {err}"))
            })?;

            let row_len = view.shape().last().copied().unwrap_or(0);
            let flat: Vec<f32> = view.iter().copied().collect();

            Ok(parse_rows(&flat, row_len))
        }

        fn device(&self) -> Device {
            self.device
        }

        fn kind(&self) -> RuntimeKind {
            RuntimeKind::Onnx
        }
    }
}

#[cfg(not(feature = "onnx"))]
mod imp {
    use super::*;

    /// Stub used when onnx support is not compiled in
    pub struct OnnxEngine;

    impl OnnxEngine {
        pub fn load(_descriptor: &ModelDescriptor, _device: Device) -> Result<Self, EngineError> {
            Err(EngineError::Initialization(
                "onnx models are not supported by this build; rebuild with --features onnx"
                    .to_string(),
            ))
        }
    }

    impl ModelRuntime for OnnxEngine {
        fn infer(&mut self, _input: &Array4<f32>) -> Result<Vec<RawDetection>, EngineError> {
            Err(EngineError::Processing(
                "onnx support not compiled in".to_string(),
            ))
        }

        fn device(&self) -> Device {
            Device::Cpu
        }

        fn kind(&self) -> RuntimeKind {
            RuntimeKind::Onnx
        }
    }
}

pub use imp::OnnxEngine;
