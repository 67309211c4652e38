//! # Frame Reader Module
//!
//! READ-ONLY access to decoded frames in shared memory.
//!
//! The container must be indistinguishable from a reader that took a
//! snapshot at an instant: the region is opened read-only, mapped
//! read-only, copied into a private buffer, and both the mapping and the
//! file descriptor are released before the function returns. No handle to
//! the region survives the call, nothing is cached across requests, and
//! shared memory is never written.
//!
//! The region carries no header; `FrameMetadata` is the complete
//! description of the bytes.

use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use vas_shared::error::{Result, VasError};
use vas_shared::protocol::FrameMetadata;

/// Pixel format accepted by the reader
pub const SUPPORTED_FORMAT: &str = "NV12";

/// A private, container-owned copy of one frame
///
/// Lifetime: one request. The buffer is independent of the shared region
/// it was copied from by the time the constructor returns.
#[derive(Debug)]
pub struct FrameBytes {
    data: Vec<u8>,
}

impl FrameBytes {
    /// The frame bytes: full Y plane followed by the interleaved UV plane
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Number of bytes in the frame
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the frame holds no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Byte size of an NV12 frame: full-resolution Y plane plus interleaved
/// half-resolution UV plane
pub fn nv12_frame_size(width: u32, height: u32) -> usize {
    let pixels = width as usize * height as usize;
    pixels + pixels / 2
}

/// Validates the metadata and returns the byte size the region must hold
fn expected_frame_size(reference: &str, metadata: &FrameMetadata) -> Result<usize> {
    if metadata.format != SUPPORTED_FORMAT {
        return Err(VasError::frame(
            reference,
            format!(
                "unsupported format {:?} (only {SUPPORTED_FORMAT} is supported)",
                metadata.format
            ),
            None,
        ));
    }
    if metadata.width == 0 || metadata.height == 0 {
        return Err(VasError::frame(
            reference,
            format!("invalid dimensions {}x{}", metadata.width, metadata.height),
            None,
        ));
    }
    // NV12 subsamples chroma 2x in both directions
    if metadata.width % 2 != 0 || metadata.height % 2 != 0 {
        return Err(VasError::frame(
            reference,
            format!(
                "NV12 requires even dimensions, got {}x{}",
                metadata.width, metadata.height
            ),
            None,
        ));
    }
    Ok(nv12_frame_size(metadata.width, metadata.height))
}

/// Copies the referenced frame into container-owned memory
///
/// The mapping is read-only and dropped before this function returns; the
/// returned buffer aliases nothing. A region smaller than the declared
/// frame fails rather than producing a short read; regions may be larger
/// than the payload because shared-memory files are page-rounded.
pub fn read_frame(reference: &str, metadata: &FrameMetadata) -> Result<FrameBytes> {
    let expected = expected_frame_size(reference, metadata)?;

    let path = Path::new(reference);
    let file = File::open(path).map_err(|err| {
        let message = match err.kind() {
            std::io::ErrorKind::NotFound => "shared memory region does not exist".to_string(),
            std::io::ErrorKind::PermissionDenied => "permission denied".to_string(),
            _ => format!("failed to open region: {err}"),
        };
        VasError::frame(reference, message, Some(Box::new(err)))
    })?;

    // Read-only mapping; the file was opened without write intent, so the
    // kernel enforces what the contract requires.
    let mapping = unsafe { Mmap::map(&file) }.map_err(|err| {
        VasError::frame(
            reference,
            format!("failed to map region: {err}"),
            Some(Box::new(err)),
        )
    })?;

    if mapping.len() < expected {
        return Err(VasError::frame(
            reference,
            format!(
                "size mismatch: region holds {} bytes, frame needs {expected}",
                mapping.len()
            ),
            None,
        ));
    }

    let data = mapping[..expected].to_vec();
    drop(mapping);
    drop(file);

    Ok(FrameBytes { data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn metadata(width: u32, height: u32, format: &str) -> FrameMetadata {
        FrameMetadata {
            frame_id: 1,
            width,
            height,
            format: format.to_string(),
            timestamp: 1.0,
        }
    }

    fn write_region(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn copies_exactly_the_declared_frame() {
        let frame: Vec<u8> = (0..nv12_frame_size(16, 8)).map(|i| i as u8).collect();
        let region = write_region(&frame);
        let reference = region.path().to_string_lossy().into_owned();

        let bytes = read_frame(&reference, &metadata(16, 8, "NV12")).unwrap();

        assert_eq!(bytes.len(), frame.len());
        assert_eq!(bytes.as_slice(), frame.as_slice());
    }

    #[test]
    fn page_rounded_region_is_accepted() {
        // Producers allocate page-aligned regions; trailing bytes are not
        // part of the frame.
        let expected = nv12_frame_size(16, 8);
        let mut padded = vec![7u8; expected];
        padded.extend_from_slice(&[0xFF; 100]);
        let region = write_region(&padded);
        let reference = region.path().to_string_lossy().into_owned();

        let bytes = read_frame(&reference, &metadata(16, 8, "NV12")).unwrap();

        assert_eq!(bytes.len(), expected);
        assert!(bytes.as_slice().iter().all(|&b| b == 7));
    }

    #[test]
    fn short_region_fails_instead_of_short_read() {
        let expected = nv12_frame_size(16, 8);
        let region = write_region(&vec![0u8; expected - 1]);
        let reference = region.path().to_string_lossy().into_owned();

        let err = read_frame(&reference, &metadata(16, 8, "NV12")).unwrap_err();

        assert!(matches!(err, VasError::Frame { .. }));
        assert!(err.to_string().contains("size mismatch"));
    }

    #[test]
    fn missing_region_fails() {
        let err = read_frame("/dev/shm/vas_frames_does_not_exist", &metadata(16, 8, "NV12"))
            .unwrap_err();

        assert!(matches!(err, VasError::Frame { .. }));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn unsupported_format_fails_before_touching_the_region() {
        let err = read_frame("/dev/shm/irrelevant", &metadata(16, 8, "RGB24")).unwrap_err();

        assert!(matches!(err, VasError::Frame { .. }));
        assert!(err.to_string().contains("unsupported format"));
    }

    #[test]
    fn zero_dimensions_fail() {
        let err = read_frame("/dev/shm/irrelevant", &metadata(0, 8, "NV12")).unwrap_err();
        assert!(matches!(err, VasError::Frame { .. }));
    }

    #[test]
    fn odd_dimensions_fail() {
        let err = read_frame("/dev/shm/irrelevant", &metadata(15, 8, "NV12")).unwrap_err();
        assert!(err.to_string().contains("even dimensions"));
    }

    #[test]
    fn buffer_is_independent_of_the_region() {
        let expected = nv12_frame_size(16, 8);
        let region = write_region(&vec![1u8; expected]);
        let reference = region.path().to_string_lossy().into_owned();

        let bytes = read_frame(&reference, &metadata(16, 8, "NV12")).unwrap();

        // Rewrite the region after the read; the copy must not change.
        std::fs::write(region.path(), vec![9u8; expected]).unwrap();
        assert!(bytes.as_slice().iter().all(|&b| b == 1));
    }
}
