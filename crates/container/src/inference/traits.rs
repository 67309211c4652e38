//! Common inference runtime traits and types
//!
//! The handler depends on a single capability: given a prepared input
//! tensor, produce raw detections. The concrete runtime family is
//! resolved once at startup; everything after that goes through
//! [`ModelRuntime`].

use crate::config::RuntimeKind;
use crate::inference::device::Device;
use ndarray::Array4;
use thiserror::Error;
use vas_shared::error::VasError;

/// Inference engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine or weights initialization failed
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// Forward pass failed at request time
    #[error("Processing error: {0}")]
    Processing(String),
}

impl From<EngineError> for VasError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Initialization(message) => VasError::configuration(message, None),
            EngineError::Processing(message) => VasError::inference(message),
        }
    }
}

/// One raw detection row as emitted by a model
///
/// Coordinates are in whatever space the model emits (model-input pixels
/// unless the descriptor declares normalized output); post-processing
/// owns normalization, clipping, and thresholding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
    pub confidence: f32,
    pub class_id: i64,
}

/// Capability contract for loaded model runtimes
///
/// Implementations hold device-resident weights for the container's
/// lifetime and are called under a single mutex: `infer` takes `&mut
/// self` and never needs internal locking. Implementations must not
/// retain the input tensor or any per-request state.
pub trait ModelRuntime: Send {
    /// Runs one forward pass over a batch-of-one input tensor
    fn infer(&mut self, input: &Array4<f32>) -> Result<Vec<RawDetection>, EngineError>;

    /// Device the weights are resident on
    fn device(&self) -> Device;

    /// Runtime family of this engine
    fn kind(&self) -> RuntimeKind;
}

/// Interprets a flat output buffer as detection rows
///
/// Rows are `[x_min, y_min, x_max, y_max, confidence, class, ...]`;
/// trailing columns are ignored. Outputs with fewer than six columns
/// carry no detections this container understands.
pub(crate) fn parse_rows(data: &[f32], row_len: usize) -> Vec<RawDetection> {
    if row_len < 6 {
        return Vec::new();
    }
    data.chunks_exact(row_len)
        .map(|row| RawDetection {
            x_min: row[0],
            y_min: row[1],
            x_max: row[2],
            y_max: row[3],
            confidence: row[4],
            class_id: row[5] as i64,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_six_column_rows() {
        let data = [
            10.0, 20.0, 110.0, 220.0, 0.9, 1.0, //
            5.0, 5.0, 50.0, 50.0, 0.4, 7.0,
        ];
        let rows = parse_rows(&data, 6);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].class_id, 1);
        assert_eq!(rows[1].confidence, 0.4);
        assert_eq!(rows[1].x_max, 50.0);
    }

    #[test]
    fn ignores_trailing_columns() {
        let data = [10.0, 20.0, 110.0, 220.0, 0.9, 2.0, 0.1, 0.2];
        let rows = parse_rows(&data, 8);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].class_id, 2);
    }

    #[test]
    fn narrow_rows_yield_nothing() {
        let data = [1.0, 2.0, 3.0, 4.0];
        assert!(parse_rows(&data, 4).is_empty());
        assert!(parse_rows(&data, 0).is_empty());
    }
}
