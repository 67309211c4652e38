//! # Preprocessing Module
//!
//! Converts a container-owned NV12 frame into the tensor shape the model
//! expects: NV12 → RGB (BT.601), bilinear resize to the descriptor's
//! resolution, [0, 1] scaling, HWC → CHW reorder, batch of one.
//!
//! Failures here are request-scoped preprocess errors; they never carry a
//! reference to the shared region, which was released by the frame reader
//! before this module runs.

use crate::frame::{nv12_frame_size, FrameBytes};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use vas_shared::error::{Result, VasError};
use vas_shared::protocol::FrameMetadata;

/// Converts an NV12 byte buffer into an RGB image
///
/// BT.601 coefficients, UV centered by subtracting 128, channels clipped
/// to [0, 255]:
///
/// ```text
/// R = Y + 1.402 * V
/// G = Y - 0.344136 * U - 0.714136 * V
/// B = Y + 1.772 * U
/// ```
pub fn nv12_to_rgb(frame: &[u8], width: u32, height: u32) -> Result<RgbImage> {
    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
        return Err(VasError::preprocess(format!(
            "invalid NV12 dimensions {width}x{height}"
        )));
    }
    let expected = nv12_frame_size(width, height);
    if frame.len() != expected {
        return Err(VasError::preprocess(format!(
            "frame size mismatch: got {} bytes, NV12 {width}x{height} needs {expected}",
            frame.len()
        )));
    }

    let w = width as usize;
    let y_plane = &frame[..w * height as usize];
    let uv_plane = &frame[w * height as usize..];

    let mut rgb = vec![0u8; w * height as usize * 3];
    for row in 0..height as usize {
        let uv_row = &uv_plane[(row / 2) * w..];
        for col in 0..w {
            let y = y_plane[row * w + col] as f32;
            // UV pairs cover 2x2 luma blocks; the pair index is the even
            // column at half horizontal resolution.
            let uv_index = col & !1;
            let u = uv_row[uv_index] as f32 - 128.0;
            let v = uv_row[uv_index + 1] as f32 - 128.0;

            let r = y + 1.402 * v;
            let g = y - 0.344_136 * u - 0.714_136 * v;
            let b = y + 1.772 * u;

            let out = (row * w + col) * 3;
            rgb[out] = r.clamp(0.0, 255.0) as u8;
            rgb[out + 1] = g.clamp(0.0, 255.0) as u8;
            rgb[out + 2] = b.clamp(0.0, 255.0) as u8;
        }
    }

    RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| VasError::preprocess("failed to allocate RGB image"))
}

/// Resizes, scales, and reorders an RGB image into a CHW float tensor
/// with a batch dimension of one
pub fn tensor_from_rgb(rgb: &RgbImage, target_width: u32, target_height: u32) -> Result<Array4<f32>> {
    if target_width == 0 || target_height == 0 {
        return Err(VasError::preprocess(format!(
            "invalid model input size {target_width}x{target_height}"
        )));
    }

    let resized = if rgb.dimensions() == (target_width, target_height) {
        rgb.clone()
    } else {
        imageops::resize(rgb, target_width, target_height, FilterType::Triangle)
    };

    let mut tensor = Array4::<f32>::zeros((
        1,
        3,
        target_height as usize,
        target_width as usize,
    ));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let x = x as usize;
        let y = y as usize;
        tensor[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
        tensor[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
        tensor[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
    }

    Ok(tensor)
}

/// Full preprocessing pipeline: frame bytes to model input tensor
pub fn prepare_input(
    frame: &FrameBytes,
    metadata: &FrameMetadata,
    model_resolution: [u32; 2],
) -> Result<Array4<f32>> {
    let rgb = nv12_to_rgb(frame.as_slice(), metadata.width, metadata.height)?;
    tensor_from_rgb(&rgb, model_resolution[0], model_resolution[1])
}
