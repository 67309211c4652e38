//! Container Integration Tests
//!
//! Full request/response cycles over a real unix socket, with a stub
//! runtime standing in for the model so the pipeline around it (framing,
//! validation, frame access, preprocessing, post-processing, draining)
//! is exercised end to end.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::watch;
use vas_container::config::{ModelDescriptor, ResourceRequirements, RuntimeKind};
use vas_container::frame::nv12_frame_size;
use vas_container::inference::{Device, EngineError, ModelRuntime, RawDetection};
use vas_container::server::{socket_path, IpcServer};
use vas_container::InferenceHandler;
use vas_shared::metrics::MetricsCollector;
use vas_shared::protocol::{
    encode_message, FrameMetadata, InferenceRequest, InferenceResponse, MAX_MESSAGE_SIZE,
};

const FRAME_WIDTH: u32 = 64;
const FRAME_HEIGHT: u32 = 48;

struct StubRuntime {
    raw: Vec<RawDetection>,
}

impl ModelRuntime for StubRuntime {
    fn infer(&mut self, _input: &ndarray::Array4<f32>) -> Result<Vec<RawDetection>, EngineError> {
        Ok(self.raw.clone())
    }

    fn device(&self) -> Device {
        Device::Cpu
    }

    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Onnx
    }
}

fn test_descriptor() -> ModelDescriptor {
    ModelDescriptor {
        model_id: "yolov8n".to_string(),
        model_name: "YOLOv8 Nano".to_string(),
        model_version: "8.0.0".to_string(),
        supported_tasks: vec!["object_detection".to_string()],
        input_format: "NV12".to_string(),
        expected_resolution: [640, 640],
        resource_requirements: ResourceRequirements::default(),
        model_type: RuntimeKind::Onnx,
        model_weights: PathBuf::from("weights/model.onnx"),
        confidence_threshold: 0.5,
        nms_iou_threshold: None,
        output_schema: serde_yaml::Mapping::new(),
        description: None,
        author: None,
        license: None,
        model_dir: PathBuf::new(),
        weights_path: PathBuf::new(),
    }
}

/// Starts a server with the given raw detections; returns the socket path
/// and the shutdown sender.
fn start_server(
    socket_dir: &Path,
    raw: Vec<RawDetection>,
) -> (PathBuf, watch::Sender<bool>, tokio::task::JoinHandle<()>) {
    let handler = Arc::new(InferenceHandler::new(
        Arc::new(test_descriptor()),
        Box::new(StubRuntime { raw }),
        Arc::new(MetricsCollector::new()),
    ));
    let server = IpcServer::bind(socket_dir, "yolov8n", handler).expect("bind failed");
    let path = server.path().to_path_buf();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        server.serve(shutdown_rx).await.expect("serve failed");
    });
    (path, shutdown_tx, task)
}

/// Writes an NV12 test frame and returns its path
fn write_frame(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let frame = vec![128u8; nv12_frame_size(FRAME_WIDTH, FRAME_HEIGHT)];
    std::fs::write(&path, frame).expect("failed to write frame");
    path
}

fn request_for(frame_path: &Path, camera_id: &str, frame_id: i64) -> InferenceRequest {
    InferenceRequest {
        frame_reference: frame_path.to_string_lossy().into_owned(),
        frame_metadata: FrameMetadata {
            frame_id,
            width: FRAME_WIDTH,
            height: FRAME_HEIGHT,
            format: "NV12".to_string(),
            timestamp: 1_700_000_000.0,
        },
        camera_id: camera_id.to_string(),
        model_id: "yolov8n".to_string(),
        timestamp: 1_700_000_000.5,
        config: None,
    }
}

async fn send_framed(stream: &mut UnixStream, payload: &[u8]) {
    let framed = encode_message(payload).expect("framing failed");
    stream.write_all(&framed).await.expect("write failed");
}

async fn read_response(stream: &mut UnixStream) -> InferenceResponse {
    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix).await.expect("read prefix failed");
    let length = u32::from_be_bytes(prefix) as usize;
    let mut payload = vec![0u8; length];
    stream.read_exact(&mut payload).await.expect("read payload failed");
    serde_json::from_slice(&payload).expect("response decode failed")
}

async fn round_trip(socket: &Path, request: &InferenceRequest) -> InferenceResponse {
    let mut stream = UnixStream::connect(socket).await.expect("connect failed");
    let payload = serde_json::to_vec(request).unwrap();
    send_framed(&mut stream, &payload).await;
    read_response(&mut stream).await
}

#[tokio::test]
async fn happy_path_detection() {
    let dir = tempfile::TempDir::new().unwrap();
    let (socket, _shutdown, _task) = start_server(
        dir.path(),
        vec![RawDetection {
            x_min: 64.0,
            y_min: 64.0,
            x_max: 320.0,
            y_max: 320.0,
            confidence: 0.9,
            class_id: 0,
        }],
    );
    let frame = write_frame(dir.path(), "vas_frames_cam1");

    let response = round_trip(&socket, &request_for(&frame, "cam1", 42)).await;

    assert_eq!(response.model_id, "yolov8n");
    assert_eq!(response.camera_id, "cam1");
    assert_eq!(response.frame_id, 42);
    assert!(response.error.is_none());
    assert_eq!(response.detections.len(), 1);

    let bbox = response.detections[0].bbox;
    assert!((bbox[0] - 0.1).abs() < 1e-6);
    assert!((bbox[2] - 0.5).abs() < 1e-6);
    for coordinate in bbox {
        assert!((0.0..=1.0).contains(&coordinate));
    }

    let metadata = response.metadata.expect("metadata missing");
    assert_eq!(metadata.device, "cpu");
    assert_eq!(metadata.model_type, "onnx");
    assert_eq!(metadata.frame_width, FRAME_WIDTH);
    assert!(metadata.inference_time_ms >= 0.0);
}

#[tokio::test]
async fn epoch_zero_timestamps_are_accepted() {
    // Callers may legitimately send timestamp 0.0 in both the frame
    // metadata and the request itself; only non-finite values are invalid.
    let dir = tempfile::TempDir::new().unwrap();
    let (socket, _shutdown, _task) = start_server(
        dir.path(),
        vec![RawDetection {
            x_min: 64.0,
            y_min: 64.0,
            x_max: 320.0,
            y_max: 320.0,
            confidence: 0.9,
            class_id: 0,
        }],
    );
    let frame = write_frame(dir.path(), "vas_frames_cam1");

    let mut request = request_for(&frame, "cam1", 42);
    request.frame_metadata.timestamp = 0.0;
    request.timestamp = 0.0;

    let response = round_trip(&socket, &request).await;

    assert!(response.error.is_none());
    assert_eq!(response.frame_id, 42);
    assert_eq!(response.detections.len(), 1);
    for coordinate in response.detections[0].bbox {
        assert!((0.0..=1.0).contains(&coordinate));
    }
}

#[tokio::test]
async fn model_mismatch_is_answered_in_band() {
    let dir = tempfile::TempDir::new().unwrap();
    let (socket, _shutdown, _task) = start_server(dir.path(), Vec::new());
    let frame = write_frame(dir.path(), "vas_frames_cam1");

    let mut request = request_for(&frame, "cam1", 1);
    request.model_id = "resnet50".to_string();

    let response = round_trip(&socket, &request).await;

    assert_eq!(response.model_id, "resnet50");
    assert!(response.detections.is_empty());
    assert!(response.error.unwrap().contains("mismatch"));
}

#[tokio::test]
async fn missing_shared_memory_keeps_container_serving() {
    let dir = tempfile::TempDir::new().unwrap();
    let (socket, _shutdown, _task) = start_server(dir.path(), Vec::new());

    let missing = dir.path().join("vas_frames_gone");
    let response = round_trip(&socket, &request_for(&missing, "cam1", 7)).await;
    assert!(response.error.is_some());
    assert!(response.detections.is_empty());

    // The container still answers further requests.
    let frame = write_frame(dir.path(), "vas_frames_cam1");
    let response = round_trip(&socket, &request_for(&frame, "cam1", 8)).await;
    assert!(response.error.is_none());
    assert_eq!(response.frame_id, 8);
}

#[tokio::test]
async fn oversize_message_closes_connection() {
    let dir = tempfile::TempDir::new().unwrap();
    let (socket, _shutdown, _task) = start_server(dir.path(), Vec::new());

    let mut stream = UnixStream::connect(&socket).await.unwrap();
    let oversize = ((MAX_MESSAGE_SIZE + 1) as u32).to_be_bytes();
    stream.write_all(&oversize).await.unwrap();

    // No response; the server closes without writing anything.
    let mut buffer = [0u8; 1];
    let read = stream.read(&mut buffer).await.unwrap();
    assert_eq!(read, 0);
}

#[tokio::test]
async fn undecodable_payload_closes_connection() {
    let dir = tempfile::TempDir::new().unwrap();
    let (socket, _shutdown, _task) = start_server(dir.path(), Vec::new());

    let mut stream = UnixStream::connect(&socket).await.unwrap();
    send_framed(&mut stream, b"this is not json").await;

    let mut buffer = [0u8; 1];
    let read = stream.read(&mut buffer).await.unwrap();
    assert_eq!(read, 0);
}

#[tokio::test]
async fn pipelined_requests_get_one_response_each() {
    let dir = tempfile::TempDir::new().unwrap();
    let (socket, _shutdown, _task) = start_server(dir.path(), Vec::new());
    let frame = write_frame(dir.path(), "vas_frames_cam1");

    let mut stream = UnixStream::connect(&socket).await.unwrap();
    for frame_id in [1, 2, 3] {
        let payload = serde_json::to_vec(&request_for(&frame, "cam1", frame_id)).unwrap();
        send_framed(&mut stream, &payload).await;
    }
    for frame_id in [1, 2, 3] {
        let response = read_response(&mut stream).await;
        assert_eq!(response.frame_id, frame_id);
        assert!(response.error.is_none());
    }
}

#[tokio::test]
async fn concurrent_callers_see_no_cross_talk() {
    let dir = tempfile::TempDir::new().unwrap();
    let (socket, _shutdown, _task) = start_server(dir.path(), Vec::new());
    let cam1_frame = write_frame(dir.path(), "vas_frames_cam1");
    let cam2_frame = write_frame(dir.path(), "vas_frames_cam2");

    let mut callers = Vec::new();
    for (camera, frame_path, base) in [
        ("cam1", cam1_frame, 0i64),
        ("cam2", cam2_frame, 1i64),
    ] {
        let socket = socket.clone();
        callers.push(tokio::spawn(async move {
            for step in 0..25i64 {
                // cam1 sends even frame ids, cam2 odd ones
                let frame_id = base + step * 2;
                let response =
                    round_trip(&socket, &request_for(&frame_path, camera, frame_id)).await;
                assert_eq!(response.camera_id, camera);
                assert_eq!(response.frame_id, frame_id);
                assert!(response.error.is_none());
            }
        }));
    }
    for caller in callers {
        caller.await.expect("caller task failed");
    }
}

#[tokio::test]
async fn repeated_requests_are_deterministic_modulo_latency() {
    let dir = tempfile::TempDir::new().unwrap();
    let (socket, _shutdown, _task) = start_server(
        dir.path(),
        vec![RawDetection {
            x_min: 100.0,
            y_min: 100.0,
            x_max: 200.0,
            y_max: 200.0,
            confidence: 0.8,
            class_id: 3,
        }],
    );
    let frame = write_frame(dir.path(), "vas_frames_cam1");
    let request = request_for(&frame, "cam1", 5);

    let mut first = round_trip(&socket, &request).await;
    let mut second = round_trip(&socket, &request).await;

    // Only the measured latency may differ between identical requests.
    if let Some(metadata) = first.metadata.as_mut() {
        metadata.inference_time_ms = 0.0;
    }
    if let Some(metadata) = second.metadata.as_mut() {
        metadata.inference_time_ms = 0.0;
    }
    assert_eq!(first, second);
}

#[tokio::test]
async fn shutdown_drains_and_unlinks_socket() {
    let dir = tempfile::TempDir::new().unwrap();
    let (socket, shutdown, task) = start_server(dir.path(), Vec::new());
    let frame = write_frame(dir.path(), "vas_frames_cam1");

    // Prove the server is up, then stop it.
    let response = round_trip(&socket, &request_for(&frame, "cam1", 1)).await;
    assert!(response.error.is_none());

    shutdown.send(true).unwrap();
    task.await.expect("serve task failed");

    assert!(!socket.exists());
    assert_eq!(socket, socket_path(dir.path(), "yolov8n"));
    assert!(UnixStream::connect(&socket).await.is_err());
}
