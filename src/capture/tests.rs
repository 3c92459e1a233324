use super::*;
use crate::config::CamcaptureConfig;
use crate::device::{synthetic_frame, DeviceInfo, FailurePoint, MockCameraBackend};
use crate::error::ErrorKind;
use crate::events::CameraEvent;
use crate::frame::{ChromaOrder, Facing, Quality, RawFrame, Resolution, Rotation};
use crate::host::{FixedRotation, PermissionResponse, ScriptedPermission};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout, Duration};

fn sizes() -> Vec<Resolution> {
    vec![
        Resolution::new(64, 48),
        Resolution::new(16, 12),
        Resolution::new(128, 96),
        Resolution::new(32, 24),
    ]
}

struct Harness {
    controller: CaptureController,
    backend: MockCameraBackend,
    permissions: Arc<ScriptedPermission>,
    events: broadcast::Receiver<CameraEvent>,
}

fn harness_with(
    backend: MockCameraBackend,
    permissions: ScriptedPermission,
    rotation: Rotation,
) -> Harness {
    let mut config = CamcaptureConfig::default();
    config.system.event_bus_capacity = 1024;

    let permissions = permissions.into_shared();
    let controller = CaptureControllerBuilder::new()
        .backend(backend.clone())
        .permissions(permissions.clone())
        .rotation(Arc::new(FixedRotation(rotation)))
        .config(config)
        .build()
        .unwrap();
    let events = controller.subscribe();

    Harness {
        controller,
        backend,
        permissions,
        events,
    }
}

fn harness() -> Harness {
    harness_with(
        MockCameraBackend::new(sizes()),
        ScriptedPermission::always(PermissionResponse::Granted),
        Rotation::Rotate0,
    )
}

async fn next_event(events: &mut broadcast::Receiver<CameraEvent>) -> CameraEvent {
    timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("timed out waiting for event")
        .unwrap()
}

async fn next_lifecycle(events: &mut broadcast::Receiver<CameraEvent>) -> CameraEvent {
    loop {
        let event = next_event(events).await;
        if !event.is_frame() {
            return event;
        }
    }
}

fn assert_no_pending(events: &mut broadcast::Receiver<CameraEvent>) {
    assert!(matches!(
        events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn test_start_opens_requested_camera() {
    let mut h = harness();

    let outcome = h.controller.start(Facing::Back, Quality::Medium).await.unwrap();

    // Ascending by area: 16x12, 32x24, 64x48, 128x96; medium is index 2
    let expected = CaptureInfo {
        width: 64,
        height: 48,
        bytes_per_pixel: 4,
        facing: Some(Facing::Back),
    };
    assert_eq!(outcome, StartOutcome::Started(expected));
    assert_eq!(h.controller.state(), CaptureState::Capturing);
    assert_eq!(h.controller.permission_state(), PermissionState::Granted);
    assert_eq!((h.controller.width(), h.controller.height()), (64, 48));
    assert_eq!(h.controller.info(), expected);

    let params = h.backend.last_parameters().unwrap();
    assert_eq!(params.preview_size, Resolution::new(64, 48));
    assert_eq!(params.picture_size, Resolution::new(64, 48));
    assert_eq!(params.focus_mode, "continuous-picture");
    assert_eq!(h.backend.handles_in_use(), 1);
    assert_eq!(h.permissions.request_count(), 1);

    let session = h.controller.session().unwrap();
    assert_eq!(session.device_id, 0);
    match next_event(&mut h.events).await {
        CameraEvent::Started {
            session_id,
            width,
            height,
            facing,
        } => {
            assert_eq!(session_id, session.id);
            assert_eq!((width, height), (64, 48));
            assert_eq!(facing, Facing::Back);
        }
        other => panic!("Unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_quality_tiers_pick_smallest_and_largest() {
    let h = harness();
    h.controller.start(Facing::Front, Quality::Low).await.unwrap();
    assert_eq!(h.controller.info().facing, Some(Facing::Front));
    assert_eq!((h.controller.width(), h.controller.height()), (16, 12));
    assert!(h.controller.stop());

    h.controller.start(Facing::Front, Quality::High).await.unwrap();
    assert_eq!((h.controller.width(), h.controller.height()), (128, 96));
}

#[tokio::test]
async fn test_start_while_capturing_is_idempotent() {
    let mut h = harness();

    h.controller.start(Facing::Back, Quality::Low).await.unwrap();
    let outcome = h.controller.start(Facing::Back, Quality::High).await.unwrap();

    assert!(matches!(outcome, StartOutcome::AlreadyCapturing(info) if info.width == 16));
    assert_eq!(h.backend.open_count(), 1);
    assert_eq!(h.controller.stats().sessions_opened, 1);

    let first = next_lifecycle(&mut h.events).await;
    let second = next_lifecycle(&mut h.events).await;
    match (first, second) {
        (
            CameraEvent::Started { session_id: a, .. },
            CameraEvent::Started { session_id: b, .. },
        ) => assert_eq!(a, b),
        other => panic!("Unexpected events: {:?}", other),
    }
}

#[tokio::test]
async fn test_stop_when_idle_is_noop() {
    let mut h = harness();

    assert!(!h.controller.stop());
    assert_eq!(h.controller.state(), CaptureState::Idle);
    assert_eq!(h.controller.stats().sessions_released, 0);
    assert_no_pending(&mut h.events);
}

#[tokio::test]
async fn test_stop_releases_and_notifies() {
    let mut h = harness();

    h.controller.start(Facing::Back, Quality::Low).await.unwrap();
    let session = h.controller.session().unwrap();
    assert!(h.backend.deliver_synthetic_frame());

    assert!(h.controller.stop());
    assert_eq!(h.controller.state(), CaptureState::Idle);
    assert_eq!(h.backend.handles_in_use(), 0);
    assert_eq!((h.controller.width(), h.controller.height()), (0, 0));
    assert!(h.controller.session().is_none());
    assert!(h.controller.latest_frame().is_none());
    assert_eq!(h.controller.stats().sessions_released, 1);

    assert!(matches!(
        next_lifecycle(&mut h.events).await,
        CameraEvent::Started { .. }
    ));
    match next_lifecycle(&mut h.events).await {
        CameraEvent::Stopped { session_id } => assert_eq!(session_id, session.id),
        other => panic!("Unexpected event: {:?}", other),
    }

    // Second stop does nothing
    assert!(!h.controller.stop());
    assert_no_pending(&mut h.events);
}

#[tokio::test]
async fn test_frames_are_converted_and_published() {
    let mut h = harness();
    h.controller.start(Facing::Back, Quality::Low).await.unwrap();
    next_lifecycle(&mut h.events).await;

    assert!(h.backend.deliver_synthetic_frame());

    match next_event(&mut h.events).await {
        CameraEvent::FrameUpdate { frame } => {
            assert_eq!((frame.width, frame.height), (16, 12));
            assert_eq!(frame.len(), 16 * 12);
            assert!(!frame.flipped);
            assert!(frame.pixels().iter().all(|p| p >> 24 == 0xFF));
        }
        other => panic!("Unexpected event: {:?}", other),
    }

    let latest = h.controller.latest_frame().unwrap();
    assert_eq!(latest.len(), 16 * 12);

    let stats = h.controller.stats();
    assert_eq!(stats.frames_received, 1);
    assert_eq!(stats.frames_converted, 1);
    assert!(stats.last_frame_time.is_some());
}

#[tokio::test]
async fn test_malformed_frame_is_dropped_without_ending_session() {
    let mut h = harness();
    h.controller.start(Facing::Back, Quality::Low).await.unwrap();
    next_lifecycle(&mut h.events).await;

    assert!(h.backend.deliver_frame(RawFrame::new(7, vec![0u8; 10], 16, 12)));
    assert!(h.backend.deliver_frame(RawFrame::new(8, vec![0u8; 15], 5, 2)));

    assert_eq!(h.controller.state(), CaptureState::Capturing);
    assert_eq!(h.controller.stats().frames_malformed, 2);
    assert!(h.controller.latest_frame().is_none());
    assert_no_pending(&mut h.events);

    // The session keeps going
    assert!(h.backend.deliver_synthetic_frame());
    assert!(next_event(&mut h.events).await.is_frame());
}

#[tokio::test]
async fn test_upside_down_rotation_flips_output() {
    let mut h = harness_with(
        MockCameraBackend::new(sizes()),
        ScriptedPermission::always(PermissionResponse::Granted),
        Rotation::Rotate180,
    );
    h.controller.start(Facing::Back, Quality::Low).await.unwrap();
    next_lifecycle(&mut h.events).await;

    // One white luma sample at the top-left, neutral chroma
    let mut data = vec![0u8; 16 * 12];
    data[0] = 255;
    data.extend(std::iter::repeat(128u8).take(16 * 12 / 2));
    assert!(h.backend.deliver_frame(RawFrame::new(1, data, 16, 12)));

    let frame = h.controller.latest_frame().unwrap();
    assert!(frame.flipped);
    assert_eq!(frame.pixels()[frame.len() - 1], 0xFFFFFFFF);
    assert_eq!(frame.pixels()[0], 0xFF000000);
    assert_eq!(frame.get(15, 11), Some(0xFFFFFFFF));
}

#[tokio::test]
async fn test_late_frame_after_stop_is_discarded() {
    let mut h = harness();
    h.controller.start(Facing::Back, Quality::Low).await.unwrap();
    let callback = h.backend.active_callback().unwrap();

    assert!(h.controller.stop());
    callback(synthetic_frame(99, Resolution::new(16, 12), ChromaOrder::Vu));

    assert!(matches!(
        next_event(&mut h.events).await,
        CameraEvent::Started { .. }
    ));
    assert!(matches!(
        next_event(&mut h.events).await,
        CameraEvent::Stopped { .. }
    ));
    assert_no_pending(&mut h.events);
    assert!(h.controller.latest_frame().is_none());
    assert_eq!(h.controller.stats().frames_discarded, 1);
}

#[tokio::test]
async fn test_late_frame_is_not_attributed_to_next_session() {
    let mut h = harness();
    h.controller.start(Facing::Back, Quality::Low).await.unwrap();
    let stale = h.backend.active_callback().unwrap();
    h.controller.stop();
    h.controller.start(Facing::Back, Quality::Low).await.unwrap();

    stale(synthetic_frame(1, Resolution::new(16, 12), ChromaOrder::Vu));
    assert!(h.controller.latest_frame().is_none());

    while let Ok(event) = h.events.try_recv() {
        assert!(!event.is_frame());
    }
}

#[tokio::test]
async fn test_no_frame_updates_after_stopped() {
    let mut h = harness_with(
        MockCameraBackend::new(sizes()).with_frame_rate(500),
        ScriptedPermission::always(PermissionResponse::Granted),
        Rotation::Rotate0,
    );

    h.controller.start(Facing::Back, Quality::Low).await.unwrap();
    sleep(Duration::from_millis(50)).await;
    assert!(h.controller.stop());

    let mut stopped = false;
    while let Ok(event) = h.events.try_recv() {
        if stopped {
            assert!(!event.is_frame(), "frame update after stop");
        }
        if matches!(event, CameraEvent::Stopped { .. }) {
            stopped = true;
        }
    }
    assert!(stopped);
    assert!(h.controller.stats().frames_converted > 0);
    assert_eq!(h.backend.handles_in_use(), 0);
}

#[tokio::test]
async fn test_denied_then_granted_on_retry() {
    let mut h = harness_with(
        MockCameraBackend::new(sizes()),
        ScriptedPermission::new(vec![PermissionResponse::Denied], PermissionResponse::Granted),
        Rotation::Rotate0,
    );

    let err = h
        .controller
        .start(Facing::Back, Quality::Low)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotPermitted);
    assert_eq!(
        h.controller.state(),
        CaptureState::Error(ErrorKind::NotPermitted)
    );
    assert_eq!(h.controller.permission_state(), PermissionState::Denied);
    assert_eq!(h.backend.open_count(), 0);
    match next_event(&mut h.events).await {
        CameraEvent::Error { kind, .. } => assert_eq!(kind, ErrorKind::NotPermitted),
        other => panic!("Unexpected event: {:?}", other),
    }

    let outcome = h.controller.start(Facing::Back, Quality::Low).await.unwrap();
    assert!(matches!(outcome, StartOutcome::Started(_)));
    assert_eq!(h.permissions.request_count(), 2);
    assert_eq!(h.controller.permission_state(), PermissionState::Granted);
}

#[tokio::test]
async fn test_rationale_is_requested_before_error() {
    let mut h = harness_with(
        MockCameraBackend::new(sizes()),
        ScriptedPermission::always(PermissionResponse::ShowRationale),
        Rotation::Rotate0,
    );

    assert!(h.controller.start(Facing::Back, Quality::Low).await.is_err());

    assert!(matches!(
        next_event(&mut h.events).await,
        CameraEvent::ShowPermissionRationale
    ));
    assert!(matches!(
        next_event(&mut h.events).await,
        CameraEvent::Error {
            kind: ErrorKind::NotPermitted,
            ..
        }
    ));
}

#[tokio::test]
async fn test_granted_permission_is_not_requested_again() {
    let h = harness();

    h.controller.start(Facing::Back, Quality::Low).await.unwrap();
    h.controller.stop();
    h.controller.start(Facing::Front, Quality::Low).await.unwrap();

    assert_eq!(h.permissions.request_count(), 1);
}

#[tokio::test]
async fn test_missing_camera_reports_no_matching_device() {
    let backend = MockCameraBackend::with_devices(
        vec![DeviceInfo {
            id: 0,
            facing: Facing::Back,
        }],
        sizes(),
    );
    let mut h = harness_with(
        backend,
        ScriptedPermission::always(PermissionResponse::Granted),
        Rotation::Rotate0,
    );

    let err = h
        .controller
        .start(Facing::Front, Quality::Low)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoMatchingDevice);
    assert_eq!(
        h.controller.state(),
        CaptureState::Error(ErrorKind::NoMatchingDevice)
    );
    assert_eq!(h.backend.open_count(), 0);
    assert!(matches!(
        next_event(&mut h.events).await,
        CameraEvent::Error {
            kind: ErrorKind::NoMatchingDevice,
            ..
        }
    ));
}

#[tokio::test]
async fn test_configuration_failure_releases_handle() {
    for point in [
        FailurePoint::QuerySizes,
        FailurePoint::Configure,
        FailurePoint::PreviewTarget,
    ] {
        let mut h = harness();
        h.backend.fail_at(point);

        let err = h
            .controller
            .start(Facing::Back, Quality::Low)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceConfigurationFailure, "{:?}", point);
        assert_eq!(h.backend.open_count(), 1, "{:?}", point);
        assert_eq!(h.backend.handles_in_use(), 0, "{:?}", point);
        assert_eq!(
            h.controller.state(),
            CaptureState::Error(ErrorKind::DeviceConfigurationFailure)
        );
        assert!(matches!(
            next_event(&mut h.events).await,
            CameraEvent::Error {
                kind: ErrorKind::DeviceConfigurationFailure,
                ..
            }
        ));

        // Failures are one-shot, so a retry succeeds
        h.controller.start(Facing::Back, Quality::Low).await.unwrap();
        assert_eq!(h.backend.handles_in_use(), 1);
    }
}

#[tokio::test]
async fn test_open_failure_reports_configuration_error() {
    let h = harness();
    h.backend.fail_at(FailurePoint::Open);

    let err = h
        .controller
        .start(Facing::Back, Quality::Low)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceConfigurationFailure);
    assert_eq!(h.backend.open_count(), 0);
}

#[tokio::test]
async fn test_device_without_sizes_fails_cleanly() {
    let h = harness_with(
        MockCameraBackend::new(Vec::new()),
        ScriptedPermission::always(PermissionResponse::Granted),
        Rotation::Rotate0,
    );

    let err = h
        .controller
        .start(Facing::Back, Quality::Medium)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceConfigurationFailure);
    assert_eq!(h.backend.handles_in_use(), 0);
}

#[tokio::test]
async fn test_start_during_permission_request_is_pending() {
    let h = harness_with(
        MockCameraBackend::new(sizes()),
        ScriptedPermission::always(PermissionResponse::Granted)
            .with_delay(Duration::from_millis(100)),
        Rotation::Rotate0,
    );

    let task = h.controller.start_capture(Facing::Back, Quality::Low);
    sleep(Duration::from_millis(20)).await;
    assert_eq!(h.controller.state(), CaptureState::AwaitingPermission);

    let outcome = h.controller.start(Facing::Back, Quality::Low).await.unwrap();
    assert_eq!(outcome, StartOutcome::Pending);
    assert!(!h.controller.stop());

    task.await.unwrap();
    assert_eq!(h.controller.state(), CaptureState::Capturing);
    assert_eq!(h.backend.open_count(), 1);
    assert_eq!(h.permissions.request_count(), 1);
}

#[tokio::test]
async fn test_shutdown_during_permission_request_abandons_start() {
    let mut h = harness_with(
        MockCameraBackend::new(sizes()),
        ScriptedPermission::always(PermissionResponse::Granted)
            .with_delay(Duration::from_millis(50)),
        Rotation::Rotate0,
    );

    let task = h.controller.start_capture(Facing::Back, Quality::Low);
    sleep(Duration::from_millis(10)).await;
    h.controller.shutdown();
    task.await.unwrap();

    assert_eq!(h.controller.state(), CaptureState::Idle);
    assert_eq!(h.backend.open_count(), 0);
    assert_no_pending(&mut h.events);
}

#[tokio::test]
async fn test_shutdown_releases_without_notification() {
    let mut h = harness();
    h.controller.start(Facing::Back, Quality::Low).await.unwrap();
    next_lifecycle(&mut h.events).await;

    h.controller.shutdown();

    assert_eq!(h.backend.handles_in_use(), 0);
    assert_eq!(h.controller.state(), CaptureState::Idle);
    assert_no_pending(&mut h.events);
}

#[tokio::test]
async fn test_drop_releases_device() {
    let h = harness();
    h.controller.start(Facing::Back, Quality::Low).await.unwrap();
    let backend = h.backend.clone();
    assert_eq!(backend.handles_in_use(), 1);

    drop(h);

    assert_eq!(backend.handles_in_use(), 0);
    assert!(!backend.deliver_synthetic_frame());
}

#[tokio::test]
async fn test_permission_revoked_while_capturing() {
    let mut h = harness();
    h.controller.start(Facing::Back, Quality::Low).await.unwrap();
    next_lifecycle(&mut h.events).await;

    assert!(h.controller.on_permission_revoked());
    assert_eq!(
        h.controller.state(),
        CaptureState::Error(ErrorKind::NotPermitted)
    );
    assert_eq!(h.backend.handles_in_use(), 0);
    assert!(matches!(
        next_lifecycle(&mut h.events).await,
        CameraEvent::Error {
            kind: ErrorKind::NotPermitted,
            ..
        }
    ));

    // Permission is asked for again on the next start
    h.controller.start(Facing::Back, Quality::Low).await.unwrap();
    assert_eq!(h.permissions.request_count(), 2);
}

#[tokio::test]
async fn test_builder_validation() {
    let result = CaptureControllerBuilder::new().build();
    match result {
        Err(e) => assert!(e.to_string().contains("must be specified")),
        Ok(_) => panic!("Builder should require a backend"),
    }

    let result = CaptureControllerBuilder::new()
        .backend(MockCameraBackend::new(sizes()))
        .build();
    assert!(result.is_err());
}

#[test]
fn test_builder_requires_runtime() {
    let result = CaptureControllerBuilder::new()
        .backend(MockCameraBackend::new(sizes()))
        .permissions(ScriptedPermission::always(PermissionResponse::Granted).into_shared())
        .build();
    assert!(result.is_err());
}

#[tokio::test]
async fn test_cancelled_start_returns_to_idle() {
    let h = harness_with(
        MockCameraBackend::new(sizes()),
        ScriptedPermission::always(PermissionResponse::Granted)
            .with_delay(Duration::from_millis(200)),
        Rotation::Rotate0,
    );

    let result = timeout(
        Duration::from_millis(20),
        h.controller.start(Facing::Back, Quality::Low),
    )
    .await;
    assert!(result.is_err());
    assert_eq!(h.controller.state(), CaptureState::Idle);
    assert_eq!(h.backend.open_count(), 0);

    let outcome = h.controller.start(Facing::Back, Quality::Low).await.unwrap();
    assert!(matches!(outcome, StartOutcome::Started(_)));
    assert_eq!(h.permissions.request_count(), 2);
    assert_eq!(h.backend.handles_in_use(), 1);
}

#[tokio::test]
async fn test_aborted_background_start_returns_to_idle() {
    let h = harness_with(
        MockCameraBackend::new(sizes()),
        ScriptedPermission::always(PermissionResponse::Granted)
            .with_delay(Duration::from_millis(200)),
        Rotation::Rotate0,
    );

    let task = h.controller.start_capture(Facing::Back, Quality::Low);
    sleep(Duration::from_millis(20)).await;
    assert_eq!(h.controller.state(), CaptureState::AwaitingPermission);

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    assert_eq!(h.controller.state(), CaptureState::Idle);
    assert!(!h.controller.stop());

    h.controller.start(Facing::Back, Quality::Low).await.unwrap();
    assert_eq!(h.controller.state(), CaptureState::Capturing);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_starts_open_one_device() {
    let h = harness();

    let (first, second) = tokio::join!(
        h.controller.start(Facing::Back, Quality::Low),
        h.controller.start(Facing::Back, Quality::Low),
    );

    let outcomes = [first.unwrap(), second.unwrap()];
    assert_eq!(
        outcomes
            .iter()
            .filter(|outcome| matches!(outcome, StartOutcome::Started(_)))
            .count(),
        1
    );
    assert_eq!(h.backend.open_count(), 1);
    assert_eq!(h.controller.state(), CaptureState::Capturing);
}
