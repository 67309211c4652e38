//! TorchScript inference engine
//!
//! Executes exported TorchScript modules through libtorch. The module is
//! loaded directly onto the selected device once at startup; the forward
//! pass surfaces TorchScript exceptions as [`EngineError::Processing`].

use crate::config::{ModelDescriptor, RuntimeKind};
use crate::inference::device::Device;
use crate::inference::traits::{EngineError, ModelRuntime, RawDetection};
use ndarray::Array4;

#[cfg(feature = "torch")]
mod imp {
    use super::*;
    use crate::inference::traits::parse_rows;
    use tracing::info;

    /// TorchScript runtime with device-resident weights
    pub struct TorchEngine {
        module: tch::CModule,
        device: Device,
        tch_device: tch::Device,
    }

    impl TorchEngine {
        /// Loads the descriptor's TorchScript module onto `device`
        pub fn load(descriptor: &ModelDescriptor, device: Device) -> Result<Self, EngineError> {
            let tch_device = match device {
                Device::Cpu => tch::Device::Cpu,
                Device::Cuda(ordinal) => tch::Device::Cuda(ordinal as usize),
            };

            let mut module = tch::CModule::load_on_device(&descriptor.weights_path, tch_device)
                .map_err(|err| {
                    EngineError::Initialization(format!(
                        "failed to load TorchScript module from {}: {err}",
                        descriptor.weights_path.display()
                    ))
                })?;
            module.set_eval();

            info!(
                model_id = %descriptor.model_id,
                device = %device,
                "TorchScript module loaded"
            );

            Ok(Self {
                module,
                device,
                tch_device,
            })
        }
    }

    impl ModelRuntime for TorchEngine {
        fn infer(&mut self, input: &Array4<f32>) -> Result<Vec<RawDetection>, EngineError> {
            let (batch, channels, height, width) = input.dim();
            let slice = input
                .as_slice()
                .ok_or_else(|| EngineError::Processing("input tensor is not contiguous".into()))?;

            let tensor = tch::Tensor::from_slice(slice)
                .view([batch as i64, channels as i64, height as i64, width as i64])
                .to_device(self.tch_device);

            let output = tch::no_grad(|| self.module.forward_ts(&[tensor]))
                .map_err(|err| EngineError::Processing(format!("forward pass failed: {err}")))?;

            let output = output.to_device(tch::Device::Cpu).to_kind(tch::Kind::Float);
            let row_len = output.size().last().copied().unwrap_or(0) as usize;
            let flat: Vec<f32> = Vec::<f32>::try_from(output.flatten(0, -1)).map_err(|err| {
                EngineError::Processing(format!("failed to extract output tensor: {err}"))
            })?;

            Ok(parse_rows(&flat, row_len))
        }

        fn device(&self) -> Device {
            self.device
        }

        fn kind(&self) -> RuntimeKind {
            RuntimeKind::Torch
        }
    }
}

#[cfg(not(feature = "torch"))]
mod imp {
    use super::*;

    /// Stub used when torch support is not compiled in
    pub struct TorchEngine;

    impl TorchEngine {
        pub fn load(_descriptor: &ModelDescriptor, _device: Device) -> Result<Self, EngineError> {
            Err(EngineError::Initialization(
                "pytorch models are not supported by this build; rebuild with --features torch"
                    .to_string(),
            ))
        }
    }

    impl ModelRuntime for TorchEngine {
        fn infer(&mut self, _input: &Array4<f32>) -> Result<Vec<RawDetection>, EngineError> {
            Err(EngineError::Processing(
                "torch support not compiled in".to_string(),
            ))
        }

        fn device(&self) -> Device {
            Device::Cpu
        }

        fn kind(&self) -> RuntimeKind {
            RuntimeKind::Torch
        }
    }
}

pub use imp::TorchEngine;
