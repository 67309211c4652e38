//! Error Tests
//!
//! Tests for error types, classification, and conversion.

use vas_shared::error::VasError;

#[test]
fn test_error_construction() {
    let config_err = VasError::configuration("bad descriptor", None);
    assert!(matches!(config_err, VasError::Configuration { .. }));

    let protocol_err = VasError::protocol("oversize message");
    assert!(matches!(protocol_err, VasError::Protocol { .. }));

    let validation_err = VasError::validation("model_id mismatch");
    assert!(matches!(validation_err, VasError::RequestValidation { .. }));

    let frame_err = VasError::frame("/dev/shm/vas_frames_cam1", "region missing", None);
    assert!(matches!(frame_err, VasError::Frame { .. }));

    let inference_err = VasError::inference("forward pass failed");
    assert!(matches!(inference_err, VasError::Inference { .. }));
}

#[test]
fn test_request_scoped_classification() {
    // Request-scoped errors become in-band responses with empty detections.
    assert!(VasError::validation("bad").is_request_scoped());
    assert!(VasError::frame("/dev/shm/x", "gone", None).is_request_scoped());
    assert!(VasError::preprocess("zero dimensions").is_request_scoped());
    assert!(VasError::inference("device fault").is_request_scoped());

    // Everything else closes the connection or the process.
    assert!(!VasError::protocol("bad framing").is_request_scoped());
    assert!(!VasError::configuration("bad yaml", None).is_request_scoped());
    assert!(!VasError::resource_unavailable("cuda", "absent").is_request_scoped());
    assert!(!VasError::internal("bug", None).is_request_scoped());
}

#[test]
fn test_exit_code_mapping() {
    assert_eq!(VasError::configuration("bad", None).exit_code(), 1);
    assert_eq!(VasError::resource_unavailable("cuda", "absent").exit_code(), 2);
    assert_eq!(VasError::internal("bug", None).exit_code(), 3);
    assert_eq!(VasError::inference("fault").exit_code(), 3);
}

#[test]
fn test_error_display_includes_context() {
    let err = VasError::frame("/dev/shm/vas_frames_cam1", "size mismatch", None);
    let message = err.to_string();

    assert!(message.contains("/dev/shm/vas_frames_cam1"));
    assert!(message.contains("size mismatch"));
}

#[test]
fn test_json_error_is_protocol_scoped() {
    let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
    let converted: VasError = json_err.into();

    assert!(matches!(converted, VasError::Protocol { .. }));
    assert!(!converted.is_request_scoped());
}

#[test]
fn test_io_error_conversion() {
    let io_err = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
    let converted: VasError = io_err.into();

    assert!(matches!(converted, VasError::Internal { .. }));
}
