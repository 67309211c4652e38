//! Protocol Tests
//!
//! Tests for the wire contract: schema round-trips, response invariants,
//! and message framing.

use vas_shared::protocol::{
    decode_length, encode_message, Detection, FrameMetadata, InferenceRequest, InferenceResponse,
    RequestEnvelope, RequestOverrides, ResponseMetadata, LENGTH_PREFIX_SIZE, MAX_MESSAGE_SIZE,
};

fn sample_request() -> InferenceRequest {
    InferenceRequest {
        frame_reference: "/dev/shm/vas_frames_cam1".to_string(),
        frame_metadata: FrameMetadata {
            frame_id: 42,
            width: 1920,
            height: 1080,
            format: "NV12".to_string(),
            timestamp: 1_700_000_000.25,
        },
        camera_id: "cam1".to_string(),
        model_id: "yolov8n".to_string(),
        timestamp: 1_700_000_000.5,
        config: None,
    }
}

fn sample_detection() -> Detection {
    Detection {
        class_id: 0,
        class_name: "person".to_string(),
        confidence: 0.91,
        bbox: [0.1, 0.2, 0.4, 0.8],
        track_id: None,
    }
}

#[test]
fn test_request_round_trip() {
    let request = sample_request();
    let json = serde_json::to_string(&request).unwrap();
    let decoded: InferenceRequest = serde_json::from_str(&json).unwrap();

    assert_eq!(decoded, request);
}

#[test]
fn test_request_round_trip_with_overrides() {
    let mut request = sample_request();
    request.config = Some(RequestOverrides {
        confidence_threshold: Some(0.7),
        nms_iou_threshold: None,
    });

    let json = serde_json::to_string(&request).unwrap();
    let decoded: InferenceRequest = serde_json::from_str(&json).unwrap();

    assert_eq!(decoded, request);
}

#[test]
fn test_request_config_defaults_to_none() {
    // A request without the optional config key must still decode.
    let json = r#"{
        "frame_reference": "/dev/shm/vas_frames_cam1",
        "frame_metadata": {"frame_id": 1, "width": 640, "height": 480,
                           "format": "NV12", "timestamp": 1.0},
        "camera_id": "cam1",
        "model_id": "yolov8n",
        "timestamp": 2.0
    }"#;
    let decoded: InferenceRequest = serde_json::from_str(json).unwrap();

    assert!(decoded.config.is_none());
}

#[test]
fn test_request_overrides_ignore_unknown_keys() {
    let json = r#"{"confidence_threshold": 0.6, "batch_hint": 4}"#;
    let overrides: RequestOverrides = serde_json::from_str(json).unwrap();

    assert_eq!(overrides.confidence_threshold, Some(0.6));
    assert_eq!(overrides.nms_iou_threshold, None);
}

#[test]
fn test_response_round_trip() {
    let response = InferenceResponse::success(
        "yolov8n",
        "cam1",
        42,
        vec![sample_detection()],
        ResponseMetadata {
            inference_time_ms: 12.5,
            device: "cpu".to_string(),
            model_type: "onnx".to_string(),
            frame_width: 1920,
            frame_height: 1080,
        },
    );

    let json = serde_json::to_string(&response).unwrap();
    let decoded: InferenceResponse = serde_json::from_str(&json).unwrap();

    assert_eq!(decoded, response);
}

#[test]
fn test_response_echoes_identity() {
    let response = InferenceResponse::success(
        "yolov8n",
        "cam1",
        7,
        Vec::new(),
        ResponseMetadata {
            inference_time_ms: 3.0,
            device: "cuda".to_string(),
            model_type: "pytorch".to_string(),
            frame_width: 640,
            frame_height: 480,
        },
    );

    assert_eq!(response.model_id, "yolov8n");
    assert_eq!(response.camera_id, "cam1");
    assert_eq!(response.frame_id, 7);
    assert!(response.error.is_none());
}

#[test]
fn test_failure_response_has_empty_detections() {
    let response = InferenceResponse::failure("yolov8n", "cam1", 42, "frame missing");

    assert!(response.detections.is_empty());
    assert!(response.metadata.is_none());
    assert_eq!(response.error.as_deref(), Some("frame missing"));
}

#[test]
fn test_track_id_serializes_as_null() {
    // The control plane expects the track_id key to always be present.
    let json = serde_json::to_value(sample_detection()).unwrap();

    assert!(json.get("track_id").is_some());
    assert!(json["track_id"].is_null());
}

#[test]
fn test_framing_round_trip() {
    let payload = serde_json::to_vec(&sample_request()).unwrap();
    let framed = encode_message(&payload).unwrap();

    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    prefix.copy_from_slice(&framed[..LENGTH_PREFIX_SIZE]);
    let length = decode_length(prefix).unwrap();

    assert_eq!(length, payload.len());
    assert_eq!(&framed[LENGTH_PREFIX_SIZE..], payload.as_slice());
}

#[test]
fn test_oversize_declaration_rejected() {
    let prefix = ((MAX_MESSAGE_SIZE + 1) as u32).to_be_bytes();
    assert!(decode_length(prefix).is_err());
}

#[test]
fn test_envelope_defaults_for_missing_fields() {
    let envelope: RequestEnvelope = serde_json::from_str("{}").unwrap();

    assert_eq!(envelope.camera_id, "");
    assert_eq!(envelope.model_id, "");
    assert_eq!(envelope.frame_id(), 0);
}
