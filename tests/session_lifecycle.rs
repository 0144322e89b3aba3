//! End-to-end session scenarios against the mock camera.

use camera_session::device::{
    CameraDescriptor, DriverCapabilities, DriverError, Frame, InMemoryRenderTargets,
    LensDirection, MockBackend, MockConfig, MockControl, Resolution, ResolutionPreset,
};
use camera_session::permission::{PermissionGate, ScriptedPermissionHost};
use camera_session::session::{
    CameraSession, CameraSessionController, ControllerFault, ErrorClass, ErrorKind,
    OperationKind, RecordingState, SessionEvent, SessionState, StreamingState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct Harness {
    session: CameraSession,
    control: MockControl,
    targets: InMemoryRenderTargets,
    task: JoinHandle<Result<(), ControllerFault>>,
}

fn harness_with(host: ScriptedPermissionHost, backend: MockBackend) -> Harness {
    let control = backend.control();
    let targets = InMemoryRenderTargets::new();
    let gate = Arc::new(PermissionGate::new(Arc::new(host)));
    let (controller, session) = CameraSessionController::new(backend, targets.clone(), gate);
    Harness {
        session,
        control,
        targets,
        task: controller.spawn(),
    }
}

fn harness() -> Harness {
    harness_with(ScriptedPermissionHost::granted(), MockBackend::new())
}

fn back_camera() -> CameraDescriptor {
    CameraDescriptor::new(
        "back",
        LensDirection::Back,
        vec![
            Resolution::new(320, 240),
            Resolution::new(640, 480),
            Resolution::new(1280, 720),
        ],
    )
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_still_capture_refuses_to_overwrite() {
    let h = harness();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("new.jpg");

    let opened = h
        .session
        .open(back_camera(), ResolutionPreset::High, false)
        .await
        .unwrap();
    assert_eq!((opened.preview_width, opened.preview_height), (1280, 720));

    h.session.capture_still(&path).await.unwrap();
    assert!(path.exists());

    let err = h.session.capture_still(&path).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileExists);
    assert_eq!(err.code(), "fileExists");
    assert_eq!(
        err.description(),
        format!("File at path '{}' already exists. Cannot overwrite.", path.display())
    );
    assert_eq!(h.control.writes(), vec![path]);
}

#[tokio::test]
async fn test_existing_file_never_reaches_driver() {
    let h = harness();
    let dir = tempfile::tempdir().unwrap();
    let taken = dir.path().join("taken.mp4");
    std::fs::write(&taken, b"keep me").unwrap();

    h.session
        .open(back_camera(), ResolutionPreset::Low, false)
        .await
        .unwrap();

    let err = h.session.start_recording(&taken).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileExists);
    assert_eq!(err.class(), ErrorClass::ResourceConflict);
    let err = h.session.capture_still(&taken).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileExists);

    assert!(h.control.writes().is_empty());
    assert_eq!(std::fs::read(&taken).unwrap(), b"keep me");
    assert_eq!(h.session.state().await, SessionState::opened());
}

#[tokio::test]
async fn test_recording_pause_stop_then_resume_fails() {
    let h = harness();
    let dir = tempfile::tempdir().unwrap();
    let clip = dir.path().join("v.mp4");

    h.session
        .open(back_camera(), ResolutionPreset::Medium, false)
        .await
        .unwrap();
    h.session.prepare_for_video_recording().await.unwrap();
    h.session.start_recording(&clip).await.unwrap();
    assert_eq!(h.control.recording(), Some(clip.clone()));

    h.session.pause_recording().await.unwrap();
    assert!(h.control.is_paused());

    // Stream is off; stopping it is a no-op and leaves the recording alone.
    h.session.stop_image_stream().await.unwrap();
    assert_eq!(
        h.session.state().await.recording(),
        Some(RecordingState::Paused)
    );

    h.session.stop_recording().await.unwrap();
    assert!(clip.exists());
    assert_eq!(h.control.recording(), None);

    let err = h.session.resume_recording().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VideoRecordingFailed);
    assert_eq!(err.class(), ErrorClass::Precondition);

    let stats = h.session.stats().await.unwrap();
    assert_eq!(stats.recordings_completed, 1);
}

#[tokio::test]
async fn test_recording_and_streaming_together() {
    let h = harness();
    let dir = tempfile::tempdir().unwrap();
    let clip = dir.path().join("both.mp4");
    let still = dir.path().join("both.jpg");

    h.session
        .open(back_camera(), ResolutionPreset::Low, false)
        .await
        .unwrap();
    h.session.start_recording(&clip).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
    h.session.start_image_stream(tx).await.unwrap();
    assert_eq!(
        h.session.state().await,
        SessionState::Open {
            recording: RecordingState::Recording,
            streaming: StreamingState::On,
        }
    );

    assert_eq!(h.control.emit_frames(2), 2);
    assert_eq!(rx.recv().await.unwrap().sequence(), 1);
    assert_eq!(rx.recv().await.unwrap().sequence(), 2);

    h.session.capture_still(&still).await.unwrap();
    assert!(still.exists());

    h.session.stop_image_stream().await.unwrap();
    assert!(rx.recv().await.is_none());
    let state = h.session.state().await;
    assert_eq!(state.recording(), Some(RecordingState::Recording));
    assert_eq!(state.streaming(), Some(StreamingState::Off));
    assert_eq!(h.control.recording(), Some(clip.clone()));

    h.session.stop_recording().await.unwrap();
    assert!(clip.exists());
    assert_eq!(h.session.state().await, SessionState::opened());
}

#[tokio::test]
async fn test_pause_unsupported_keeps_recording() {
    let backend = MockBackend::with_config(MockConfig {
        capabilities: DriverCapabilities {
            pause_resume: false,
            still_during_recording: true,
        },
        ..MockConfig::default()
    });
    let h = harness_with(ScriptedPermissionHost::granted(), backend);
    let dir = tempfile::tempdir().unwrap();

    h.session
        .open(back_camera(), ResolutionPreset::Low, false)
        .await
        .unwrap();
    h.session
        .start_recording(dir.path().join("clip.mp4"))
        .await
        .unwrap();

    let err = h.session.pause_recording().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
    assert_eq!(err.class(), ErrorClass::Capability);
    assert_eq!(
        h.session.state().await.recording(),
        Some(RecordingState::Recording)
    );
}

#[tokio::test]
async fn test_failed_still_during_recording_keeps_recording() {
    let h = harness();
    let dir = tempfile::tempdir().unwrap();

    h.session
        .open(back_camera(), ResolutionPreset::Low, false)
        .await
        .unwrap();
    h.session
        .start_recording(dir.path().join("clip.mp4"))
        .await
        .unwrap();

    h.control
        .fail_next_still(DriverError::Io("sensor readout failed".into()));
    let err = h
        .session
        .capture_still(dir.path().join("still.jpg"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IoFailure);

    assert_eq!(
        h.session.state().await.recording(),
        Some(RecordingState::Recording)
    );
    h.session.stop_recording().await.unwrap();
}

#[tokio::test]
async fn test_overlapping_still_is_rejected() {
    let h = harness();
    let dir = tempfile::tempdir().unwrap();
    h.session
        .open(back_camera(), ResolutionPreset::Low, false)
        .await
        .unwrap();

    h.control.defer_stills(true);
    let first = tokio::spawn({
        let session = h.session.clone();
        let path = dir.path().join("first.jpg");
        async move { session.capture_still(path).await }
    });
    wait_until(|| h.control.deferred_stills() == 1).await;

    let err = h
        .session
        .capture_still(dir.path().join("second.jpg"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccessFailure);
    assert_eq!(err.class(), ErrorClass::Precondition);

    assert_eq!(h.control.complete_deferred_stills(), 1);
    first.await.unwrap().unwrap();
    assert!(!dir.path().join("second.jpg").exists());
}

#[tokio::test]
async fn test_close_is_idempotent_and_fails_pending_still() {
    let h = harness();
    let dir = tempfile::tempdir().unwrap();
    h.session
        .open(back_camera(), ResolutionPreset::Low, false)
        .await
        .unwrap();

    h.control.defer_stills(true);
    let pending = tokio::spawn({
        let session = h.session.clone();
        let path = dir.path().join("late.jpg");
        async move { session.capture_still(path).await }
    });
    wait_until(|| h.control.deferred_stills() == 1).await;

    h.session.close().await.unwrap();
    h.session.close().await.unwrap();

    let err = pending.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CaptureFailure);
    assert_eq!(h.session.state().await, SessionState::Closed);
    assert!(!h.control.is_device_open());
    assert_eq!(h.control.close_count(), 1);
    assert_eq!(h.targets.live_count(), 0);

    // The driver finishing late must not resurrect anything.
    h.control.complete_deferred_stills();
    assert_eq!(h.session.state().await, SessionState::Closed);
    assert_eq!(h.session.stats().await.unwrap().stills_captured, 0);
}

#[tokio::test]
async fn test_close_before_any_open() {
    let h = harness();
    h.session.close().await.unwrap();
    h.session.dispose().await.unwrap();
    assert_eq!(h.session.state().await, SessionState::Closed);
    assert_eq!(h.control.open_count(), 0);
}

#[tokio::test]
async fn test_reopen_releases_previous_session() {
    let h = harness();
    let first = h
        .session
        .open(back_camera(), ResolutionPreset::Low, false)
        .await
        .unwrap();
    let front = CameraDescriptor::new(
        "front",
        LensDirection::Front,
        vec![Resolution::new(640, 480)],
    );
    let second = h
        .session
        .open(front, ResolutionPreset::Max, false)
        .await
        .unwrap();

    assert_ne!(first.handle.session, second.handle.session);
    assert_eq!(h.control.open_count(), 2);
    assert_eq!(h.control.close_count(), 1);
    assert!(!h.targets.is_live(first.handle.texture_id));
    assert!(h.targets.is_live(second.handle.texture_id));
    assert_eq!(h.targets.live_count(), 1);
    assert_eq!((second.preview_width, second.preview_height), (640, 480));
}

#[tokio::test]
async fn test_no_frames_after_stop_image_stream() {
    let h = harness();
    h.session
        .open(back_camera(), ResolutionPreset::Low, false)
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
    h.session.start_image_stream(tx).await.unwrap();
    assert_eq!(
        h.session.state().await.streaming(),
        Some(StreamingState::On)
    );

    assert_eq!(h.control.emit_frames(3), 3);
    for expected in 1..=3 {
        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.sequence(), expected);
        assert_eq!((frame.width(), frame.height()), (320, 240));
    }

    h.session.stop_image_stream().await.unwrap();
    assert!(!h.control.is_streaming());
    assert_eq!(h.control.emit_frames(3), 0);
    assert!(rx.recv().await.is_none());
    assert_eq!(h.session.stats().await.unwrap().frames_delivered, 3);
}

#[tokio::test]
async fn test_second_stream_is_rejected() {
    let h = harness();
    h.session
        .open(back_camera(), ResolutionPreset::Low, false)
        .await
        .unwrap();

    let (first, _rx1) = mpsc::unbounded_channel::<Frame>();
    let (second, _rx2) = mpsc::unbounded_channel::<Frame>();
    h.session.start_image_stream(first).await.unwrap();
    let err = h.session.start_image_stream(second).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccessFailure);
}

#[tokio::test]
async fn test_observer_sees_device_events() {
    let h = harness();
    h.session
        .open(back_camera(), ResolutionPreset::Low, false)
        .await
        .unwrap();
    let mut events = h.session.observe().await.unwrap();

    assert!(h.control.raise_error("sensor overheating"));
    assert_eq!(
        events.recv().await,
        Some(SessionEvent::Error {
            description: "sensor overheating".into()
        })
    );

    assert!(h.control.disconnect());
    assert_eq!(events.recv().await, Some(SessionEvent::CameraClosed));
    assert_eq!(events.recv().await, None);

    assert_eq!(h.session.state().await, SessionState::Closed);
    assert!(!h.control.is_device_open());
    assert_eq!(h.targets.live_count(), 0);
    let stats = h.session.stats().await.unwrap();
    assert_eq!(stats.external_closures, 1);
    assert_eq!(stats.driver_errors, 1);
}

#[tokio::test]
async fn test_caller_close_sends_no_closing_event() {
    let h = harness();
    h.session
        .open(back_camera(), ResolutionPreset::Low, false)
        .await
        .unwrap();
    let mut events = h.session.observe().await.unwrap();

    h.session.close().await.unwrap();
    assert_eq!(events.recv().await, None);
}

#[tokio::test]
async fn test_denied_camera_permission() {
    let host = ScriptedPermissionHost::new(false, false);
    host.answer_with(false, false);
    let h = harness_with(host.clone(), MockBackend::new());

    let err = h
        .session
        .open(back_camera(), ResolutionPreset::Low, false)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccessDenied);
    assert_eq!(err.code(), "cameraPermission");
    assert_eq!(err.description(), "MediaRecorderCamera permission not granted");
    assert_eq!(host.prompt_count(), 1);
    assert_eq!(h.control.open_count(), 0);
    assert_eq!(h.targets.live_count(), 0);
}

#[tokio::test]
async fn test_denied_audio_permission() {
    let host = ScriptedPermissionHost::new(true, false);
    host.answer_with(true, false);
    let h = harness_with(host, MockBackend::new());

    let err = h
        .session
        .open(back_camera(), ResolutionPreset::Low, true)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccessDenied);
    assert_eq!(err.description(), "MediaRecorderAudio permission not granted");
    assert_eq!(h.control.open_count(), 0);
}

#[tokio::test]
async fn test_revoked_permission_is_requested_again() {
    let host = ScriptedPermissionHost::granted();
    let h = harness_with(host.clone(), MockBackend::new());

    h.session
        .open(back_camera(), ResolutionPreset::Low, false)
        .await
        .unwrap();
    assert!(h.session.state().await.is_open());
    assert_eq!(host.prompt_count(), 0);

    host.revoke_camera();
    host.answer_with(false, false);
    let err = h
        .session
        .open(back_camera(), ResolutionPreset::Low, false)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccessDenied);
    assert_eq!(host.prompt_count(), 1);

    // The first session was released before the second was attempted.
    assert!(!h.session.state().await.is_open());
    assert_eq!(h.control.close_count(), 1);
    assert_eq!(h.targets.live_count(), 0);
}

#[tokio::test]
async fn test_close_while_permission_prompt_is_open() {
    let host = ScriptedPermissionHost::new(false, false);
    host.hold_prompts(true);
    let h = harness_with(host.clone(), MockBackend::new());

    let opening = tokio::spawn({
        let session = h.session.clone();
        async move {
            session
                .open(back_camera(), ResolutionPreset::Low, false)
                .await
        }
    });
    wait_until(|| host.prompt_count() == 1).await;
    assert_eq!(h.session.state().await, SessionState::Opening);

    h.session.close().await.unwrap();
    let err = opening.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceUnavailable);

    host.release(1);
    assert_eq!(h.session.state().await, SessionState::Closed);
    assert_eq!(h.control.open_count(), 0);
}

#[tokio::test]
async fn test_camera_without_resolutions_cannot_open() {
    let h = harness();
    let bare = CameraDescriptor::new("external", LensDirection::External, Vec::new());

    let err = h
        .session
        .open(bare, ResolutionPreset::High, false)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceUnavailable);
    assert_eq!(err.class(), ErrorClass::Capability);
    assert_eq!(h.control.open_count(), 0);
}

#[tokio::test]
async fn test_device_open_failure() {
    let h = harness();
    h.control
        .fail_next_open_async(DriverError::Access("camera in use".into()));

    let err = h
        .session
        .open(back_camera(), ResolutionPreset::Low, false)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceUnavailable);
    assert_eq!(err.code(), "CameraAccess");
    assert_eq!(h.session.state().await, SessionState::Closed);
    assert_eq!(h.targets.live_count(), 0);

    // The controller keeps serving after an ordinary failure.
    h.session
        .open(back_camera(), ResolutionPreset::Low, false)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_driver_fault_stops_controller() {
    let h = harness();
    let dir = tempfile::tempdir().unwrap();
    h.session
        .open(back_camera(), ResolutionPreset::Low, false)
        .await
        .unwrap();

    h.control
        .fail_next_still(DriverError::Fault("vendor blob crashed".into()));
    let err = h
        .session
        .capture_still(dir.path().join("boom.jpg"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Fault);
    assert!(err.is_fatal());

    let fault = h.task.await.unwrap().unwrap_err();
    assert_eq!(fault.operation, OperationKind::CaptureStill);
    assert_eq!(fault.description, "vendor blob crashed");
    assert!(!h.control.is_device_open());
    assert_eq!(h.targets.live_count(), 0);

    let err = h.session.stop_recording().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Fault);
    h.session.close().await.unwrap();
    assert_eq!(h.session.state().await, SessionState::Closed);
}

#[tokio::test]
async fn test_dropping_every_handle_shuts_down() {
    let h = harness();
    h.session
        .open(back_camera(), ResolutionPreset::Low, false)
        .await
        .unwrap();

    let Harness {
        session,
        control,
        targets,
        task,
    } = h;
    drop(session);
    task.await.unwrap().unwrap();
    assert!(!control.is_device_open());
    assert_eq!(targets.live_count(), 0);
}
