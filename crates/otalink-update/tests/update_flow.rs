// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end update session scenarios driven through mock transports.
//!
//! Timer scenarios run with paused time and the in-process storage, so the
//! 60 second prepare and health check timers expire instantly once every
//! task is idle.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use otalink_bus::{BusEvent, EventSubscription};
use otalink_core::{
    DeviceMessage, DeviceReportStatus, HealthCheckResult, MessagePriority, MessageType,
    OtalinkError, StorageAdapter, UpdateOptions, UpdateSession, UpdateStatus, UpdateStatusReport,
};
use otalink_test_utils::{
    EVENT_WAIT, MockChannel, SendBehavior, TestHarness, artifact, device, wait_for_event,
};

const DEVICE: &str = "dev-1";
const DEVICE_TYPE: &str = "sensor-v2";
const FIRMWARE: &str = "fw-2";

async fn harness(data: Vec<u8>) -> (TestHarness, Arc<MockChannel>) {
    let h = TestHarness::builder()
        .with_artifact(artifact(FIRMWARE, DEVICE_TYPE, "2.0.0", data))
        .build()
        .await
        .unwrap();
    let channel = h.add_channel("mqtt", "mqtt-primary");
    (h, channel)
}

fn options(chunk_size: usize) -> UpdateOptions {
    UpdateOptions {
        chunk_size: Some(chunk_size),
        ..UpdateOptions::default()
    }
}

async fn start(h: &TestHarness, options: UpdateOptions) -> UpdateSession {
    h.engine
        .start_firmware_update(&device(DEVICE, DEVICE_TYPE, "1.0.0"), FIRMWARE, options)
        .await
        .unwrap()
}

async fn wait_status(events: &mut EventSubscription, session_id: &str, status: UpdateStatus) {
    wait_for_event(events, |e| {
        matches!(
            e,
            BusEvent::UpdateStatusChanged { session_id: id, status: s, .. }
                if id == session_id && *s == status
        )
    })
    .await;
}

async fn sent(channel: &MockChannel, message_type: MessageType, count: usize) -> Vec<DeviceMessage> {
    tokio::time::timeout(EVENT_WAIT, channel.wait_for_sent(message_type, count))
        .await
        .expect("message was never sent")
}

/// Lets every spawned task run until idle.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

fn report(status: DeviceReportStatus) -> UpdateStatusReport {
    UpdateStatusReport::new(status)
}

/// Drives a session from PREPARING to RESTARTING.
async fn drive_to_restarting(
    h: &TestHarness,
    channel: &MockChannel,
    events: &mut EventSubscription,
    session: &UpdateSession,
) {
    sent(channel, MessageType::UpdatePrepare, 1).await;
    h.device_reports(DEVICE, report(DeviceReportStatus::Ready));
    for chunk in 0..session.total_chunks {
        sent(channel, MessageType::UpdateChunk, chunk as usize + 1).await;
        h.device_reports(DEVICE, UpdateStatusReport::chunk_received(chunk));
    }
    wait_status(events, &session.id, UpdateStatus::Validating).await;
    h.device_reports(DEVICE, report(DeviceReportStatus::ValidationComplete));
    wait_status(events, &session.id, UpdateStatus::Applying).await;
    h.device_reports(DEVICE, report(DeviceReportStatus::UpdateApplied));
    wait_status(events, &session.id, UpdateStatus::Restarting).await;
}

fn statuses(h: &TestHarness, session_id: &str) -> Vec<UpdateStatus> {
    let mut out: Vec<UpdateStatus> = Vec::new();
    for snapshot in h.memory.as_ref().unwrap().session_history(session_id) {
        if out.last() != Some(&snapshot.status) {
            out.push(snapshot.status);
        }
    }
    out
}

#[tokio::test(start_paused = true)]
async fn three_chunk_transfer_finalizes_after_last_ack() {
    let (h, channel) = harness(vec![7u8; 9000]).await;
    let mut events = h.events();
    let session = start(&h, options(4096)).await;

    assert_eq!(session.status, UpdateStatus::Initiated);
    assert_eq!(session.total_chunks, 3);
    assert_eq!(session.expected_duration_ms, 33_000);

    let prepare = sent(&channel, MessageType::UpdatePrepare, 1).await;
    assert_eq!(prepare[0].message_id, format!("prepare_{}", session.id));
    assert_eq!(prepare[0].priority, MessagePriority::High);
    assert_eq!(prepare[0].payload["totalSize"], 9000);
    assert_eq!(prepare[0].payload["totalChunks"], 3);

    h.device_reports(DEVICE, report(DeviceReportStatus::Ready));
    for chunk in 0..3u32 {
        sent(&channel, MessageType::UpdateChunk, chunk as usize + 1).await;
        h.device_reports(DEVICE, UpdateStatusReport::chunk_received(chunk));
    }

    let finalize = sent(&channel, MessageType::UpdateFinalize, 1).await;
    assert_eq!(finalize[0].payload["checksum"], session.checksum.as_str());
    wait_status(&mut events, &session.id, UpdateStatus::Validating).await;

    let stored = h.engine.session(&session.id).await.unwrap().unwrap();
    assert_eq!(stored.acknowledged_chunks, 3);
    assert_eq!(stored.sent_chunks, 3);
    assert_eq!(stored.status, UpdateStatus::Validating);

    let sizes: Vec<usize> = channel
        .sent_of_type(MessageType::UpdateChunk)
        .await
        .iter()
        .map(|m| {
            BASE64
                .decode(m.payload["data"].as_str().unwrap())
                .unwrap()
                .len()
        })
        .collect();
    assert_eq!(sizes, vec![4096, 4096, 808]);
}

#[tokio::test(start_paused = true)]
async fn progress_events_follow_acknowledgements() {
    let (h, channel) = harness(vec![1u8; 10]).await;
    let mut events = h.events();
    let session = start(&h, options(5)).await;

    sent(&channel, MessageType::UpdatePrepare, 1).await;
    h.device_reports(DEVICE, report(DeviceReportStatus::Ready));
    sent(&channel, MessageType::UpdateChunk, 1).await;
    h.device_reports(DEVICE, UpdateStatusReport::chunk_received(0));

    let event = wait_for_event(&mut events, |e| matches!(e, BusEvent::UpdateProgress { .. })).await;
    match event {
        BusEvent::UpdateProgress {
            session_id,
            progress,
            chunk_id,
            ..
        } => {
            assert_eq!(session_id, session.id);
            assert_eq!(chunk_id, 0);
            assert!((progress - 0.5).abs() < f64::EPSILON);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn next_chunk_waits_for_acknowledgement() {
    let (h, channel) = harness(vec![3u8; 30]).await;
    let session = start(&h, options(10)).await;

    sent(&channel, MessageType::UpdatePrepare, 1).await;
    h.device_reports(DEVICE, report(DeviceReportStatus::Ready));
    sent(&channel, MessageType::UpdateChunk, 1).await;
    settle().await;
    assert_eq!(channel.sent_of_type(MessageType::UpdateChunk).await.len(), 1);

    h.device_reports(DEVICE, UpdateStatusReport::chunk_received(0));
    let chunks = sent(&channel, MessageType::UpdateChunk, 2).await;
    assert_eq!(chunks[1].message_id, format!("chunk_{}_1", session.id));
    assert_eq!(chunks[1].payload["chunkIndex"], 1);
}

#[tokio::test(start_paused = true)]
async fn duplicate_or_unsent_acknowledgements_cause_no_resend() {
    let (h, channel) = harness(vec![3u8; 30]).await;
    let session = start(&h, options(10)).await;

    sent(&channel, MessageType::UpdatePrepare, 1).await;
    h.device_reports(DEVICE, report(DeviceReportStatus::Ready));
    sent(&channel, MessageType::UpdateChunk, 1).await;
    h.device_reports(DEVICE, UpdateStatusReport::chunk_received(0));
    sent(&channel, MessageType::UpdateChunk, 2).await;

    // Replay of chunk 0 and an ack for chunk 2 that was never sent.
    h.device_reports(DEVICE, UpdateStatusReport::chunk_received(0));
    h.device_reports(DEVICE, UpdateStatusReport::chunk_received(2));
    settle().await;

    assert_eq!(channel.sent_of_type(MessageType::UpdateChunk).await.len(), 2);
    let stored = h.engine.session(&session.id).await.unwrap().unwrap();
    assert_eq!(stored.acknowledged_chunks, 1);
    assert_eq!(stored.sent_chunks, 2);
}

#[tokio::test(start_paused = true)]
async fn counters_never_break_their_ordering() {
    let (h, channel) = harness(vec![9u8; 25]).await;
    let mut events = h.events();
    let session = start(&h, options(4)).await;

    h.device_reports(DEVICE, UpdateStatusReport::chunk_received(0));
    drive_to_restarting(&h, &channel, &mut events, &session).await;

    let history = h.memory.as_ref().unwrap().session_history(&session.id);
    assert!(history.iter().all(UpdateSession::counters_consistent));
    for pair in history.windows(2) {
        assert!(pair[1].acknowledged_chunks >= pair[0].acknowledged_chunks);
        assert!(pair[1].sent_chunks >= pair[0].sent_chunks);
    }
}

#[tokio::test(start_paused = true)]
async fn missing_ready_fails_session_after_prepare_timeout() {
    let (h, channel) = harness(vec![1u8; 100]).await;
    let mut events = h.events();
    let session = start(&h, UpdateOptions::default()).await;

    sent(&channel, MessageType::UpdatePrepare, 1).await;
    let event = wait_for_event(&mut events, |e| matches!(e, BusEvent::UpdateError { .. })).await;
    match event {
        BusEvent::UpdateError {
            session_id, error, ..
        } => {
            assert_eq!(session_id, session.id);
            assert_eq!(error, "Prepare timeout");
        }
        other => panic!("unexpected event {other:?}"),
    }

    let stored = h.engine.session(&session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, UpdateStatus::Failed);
    assert!(stored.completed_at.is_some());
    assert_eq!(
        statuses(&h, &session.id),
        vec![
            UpdateStatus::Initiated,
            UpdateStatus::Preparing,
            UpdateStatus::Failed
        ]
    );
    assert!(channel.sent_of_type(MessageType::UpdateChunk).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn skip_verification_completes_without_health_check() {
    let (h, channel) = harness(vec![5u8; 8]).await;
    let mut events = h.events();
    let mut health_requests = h.bus.subscribe_filtered(
        Some(DEVICE),
        &[otalink_bus::EventKind::DeviceHealthCheckRequested],
    );
    let session = start(
        &h,
        UpdateOptions {
            chunk_size: Some(4),
            skip_verification: Some(true),
            ..UpdateOptions::default()
        },
    )
    .await;

    drive_to_restarting(&h, &channel, &mut events, &session).await;
    h.device_reports(DEVICE, report(DeviceReportStatus::RestartComplete));

    let event = wait_for_event(&mut events, |e| matches!(e, BusEvent::UpdateCompleted { .. })).await;
    match event {
        BusEvent::UpdateCompleted {
            session_id,
            version,
            new_firmware_version,
            ..
        } => {
            assert_eq!(session_id, session.id);
            assert_eq!(version, "2.0.0");
            assert_eq!(new_firmware_version.as_deref(), Some("2.0.0"));
        }
        other => panic!("unexpected event {other:?}"),
    }

    assert!(health_requests.try_recv().is_none());
    assert_eq!(
        statuses(&h, &session.id),
        vec![
            UpdateStatus::Initiated,
            UpdateStatus::Preparing,
            UpdateStatus::Transferring,
            UpdateStatus::Validating,
            UpdateStatus::Applying,
            UpdateStatus::Restarting,
            UpdateStatus::Verifying,
            UpdateStatus::Completed,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn unhealthy_device_is_rolled_back() {
    let (h, channel) = harness(vec![5u8; 8]).await;
    let mut events = h.events();
    let session = start(&h, options(4)).await;

    drive_to_restarting(&h, &channel, &mut events, &session).await;
    h.device_reports(DEVICE, report(DeviceReportStatus::RestartComplete));

    wait_for_event(&mut events, |e| {
        matches!(e, BusEvent::DeviceHealthCheckRequested { session_id, .. } if *session_id == session.id)
    })
    .await;
    h.bus.publish(BusEvent::DeviceHealthCheckCompleted {
        device_id: DEVICE.to_string(),
        result: HealthCheckResult {
            healthy: false,
            error: Some("sensor offline".to_string()),
        },
    });

    wait_for_event(&mut events, |e| matches!(e, BusEvent::UpdateVerificationFailed { .. })).await;
    let rollback = sent(&channel, MessageType::UpdateRollback, 1).await;
    assert_eq!(rollback[0].priority, MessagePriority::Critical);
    assert_eq!(rollback[0].ttl_ms, 300_000);
    assert_eq!(rollback[0].message_id, format!("rollback_{}", session.id));

    h.device_reports(DEVICE, report(DeviceReportStatus::RollbackComplete));
    let event = wait_for_event(&mut events, |e| matches!(e, BusEvent::UpdateRolledBack { .. })).await;
    match event {
        BusEvent::UpdateRolledBack { reason, .. } => assert_eq!(reason, "Rollback completed"),
        other => panic!("unexpected event {other:?}"),
    }

    let stored = h.engine.session(&session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, UpdateStatus::RolledBack);
    assert_eq!(stored.error.as_deref(), Some("sensor offline"));
    let seen = statuses(&h, &session.id);
    assert_eq!(
        &seen[seen.len() - 3..],
        &[
            UpdateStatus::Verifying,
            UpdateStatus::RollingBack,
            UpdateStatus::RolledBack
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn missing_health_result_rolls_back_after_timeout() {
    let (h, channel) = harness(vec![5u8; 4]).await;
    let mut events = h.events();
    let session = start(&h, options(4)).await;

    drive_to_restarting(&h, &channel, &mut events, &session).await;
    h.device_reports(DEVICE, report(DeviceReportStatus::RestartComplete));

    let event =
        wait_for_event(&mut events, |e| matches!(e, BusEvent::UpdateVerificationFailed { .. })).await;
    match event {
        BusEvent::UpdateVerificationFailed { error, .. } => {
            assert_eq!(error.as_deref(), Some("Health check timeout"));
        }
        other => panic!("unexpected event {other:?}"),
    }
    sent(&channel, MessageType::UpdateRollback, 1).await;
}

#[tokio::test(start_paused = true)]
async fn verification_passed_report_completes() {
    let (h, channel) = harness(vec![5u8; 4]).await;
    let mut events = h.events();
    let session = start(&h, options(4)).await;

    drive_to_restarting(&h, &channel, &mut events, &session).await;
    h.device_reports(DEVICE, report(DeviceReportStatus::RestartComplete));
    wait_status(&mut events, &session.id, UpdateStatus::Verifying).await;
    h.device_reports(DEVICE, report(DeviceReportStatus::VerificationPassed));
    wait_status(&mut events, &session.id, UpdateStatus::Completed).await;

    assert!(h.engine.active_session_for_device(DEVICE).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn healthy_result_completes() {
    let (h, channel) = harness(vec![5u8; 4]).await;
    let mut events = h.events();
    let session = start(&h, options(4)).await;

    drive_to_restarting(&h, &channel, &mut events, &session).await;
    h.device_reports(DEVICE, report(DeviceReportStatus::RestartComplete));
    wait_for_event(&mut events, |e| matches!(e, BusEvent::DeviceHealthCheckRequested { .. })).await;
    assert!(h.engine.handle_health_check_result(
        DEVICE,
        HealthCheckResult {
            healthy: true,
            error: None
        }
    ));
    wait_status(&mut events, &session.id, UpdateStatus::Completed).await;
}

#[tokio::test(start_paused = true)]
async fn device_failure_is_recorded_verbatim() {
    let (h, channel) = harness(vec![5u8; 40]).await;
    let mut events = h.events();
    let session = start(&h, options(10)).await;

    sent(&channel, MessageType::UpdatePrepare, 1).await;
    h.device_reports(DEVICE, report(DeviceReportStatus::Ready));
    sent(&channel, MessageType::UpdateChunk, 1).await;
    h.device_reports(
        DEVICE,
        UpdateStatusReport {
            error: Some("flash write error at 0x4000".to_string()),
            ..report(DeviceReportStatus::UpdateFailed)
        },
    );

    let event = wait_for_event(&mut events, |e| matches!(e, BusEvent::UpdateFailed { .. })).await;
    match event {
        BusEvent::UpdateFailed { error, .. } => assert_eq!(error, "flash write error at 0x4000"),
        other => panic!("unexpected event {other:?}"),
    }
    let stored = h.engine.session(&session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, UpdateStatus::Failed);
    assert_eq!(stored.error.as_deref(), Some("flash write error at 0x4000"));
}

/// Drives a session into ROLLING_BACK through an unhealthy health check.
async fn drive_to_rolling_back(
    h: &TestHarness,
    channel: &MockChannel,
    events: &mut EventSubscription,
    session: &UpdateSession,
) {
    drive_to_restarting(h, channel, events, session).await;
    h.device_reports(DEVICE, report(DeviceReportStatus::RestartComplete));
    wait_for_event(events, |e| matches!(e, BusEvent::DeviceHealthCheckRequested { .. })).await;
    h.engine.handle_health_check_result(
        DEVICE,
        HealthCheckResult {
            healthy: false,
            error: None,
        },
    );
    wait_status(events, &session.id, UpdateStatus::RollingBack).await;
}

#[tokio::test(start_paused = true)]
async fn device_failure_during_rollback_fails_the_session() {
    let (h, channel) = harness(vec![5u8; 4]).await;
    let mut events = h.events();
    let session = start(&h, options(4)).await;

    drive_to_rolling_back(&h, &channel, &mut events, &session).await;
    sent(&channel, MessageType::UpdateRollback, 1).await;
    h.device_reports(
        DEVICE,
        UpdateStatusReport {
            error: Some("boom".to_string()),
            ..report(DeviceReportStatus::UpdateFailed)
        },
    );

    let event = wait_for_event(&mut events, |e| matches!(e, BusEvent::UpdateFailed { .. })).await;
    match event {
        BusEvent::UpdateFailed { error, .. } => assert_eq!(error, "boom"),
        other => panic!("unexpected event {other:?}"),
    }
    let stored = h.engine.session(&session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, UpdateStatus::Failed);
    assert_eq!(stored.error.as_deref(), Some("boom"));
}

#[tokio::test(start_paused = true)]
async fn undispatchable_rollback_fails_through_the_error_path() {
    let (h, channel) = harness(vec![5u8; 4]).await;
    let mut events = h.events();
    let session = start(&h, options(4)).await;

    drive_to_restarting(&h, &channel, &mut events, &session).await;
    h.device_reports(DEVICE, report(DeviceReportStatus::RestartComplete));
    wait_for_event(&mut events, |e| matches!(e, BusEvent::DeviceHealthCheckRequested { .. })).await;

    // Neither the transport nor the queue takes the rollback.
    channel.set_behavior(SendBehavior::Reject("link down".into()));
    h.memory.as_ref().unwrap().set_enqueue_failing(true);
    h.engine.handle_health_check_result(
        DEVICE,
        HealthCheckResult {
            healthy: false,
            error: None,
        },
    );

    let event = wait_for_event(&mut events, |e| matches!(e, BusEvent::UpdateError { .. })).await;
    match event {
        BusEvent::UpdateError { error, .. } => {
            assert!(error.starts_with("Failed to send rollback"), "{error}");
        }
        other => panic!("unexpected event {other:?}"),
    }
    let stored = h.engine.session(&session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, UpdateStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn failed_session_write_fails_the_session() {
    let (h, channel) = harness(vec![5u8; 8]).await;
    let mut events = h.events();
    let session = start(&h, options(4)).await;

    sent(&channel, MessageType::UpdatePrepare, 1).await;
    let memory = h.memory.as_ref().unwrap();
    memory.set_session_writes_failing(true);
    h.device_reports(DEVICE, report(DeviceReportStatus::Ready));

    let event = wait_for_event(&mut events, |e| matches!(e, BusEvent::UpdateError { .. })).await;
    match event {
        BusEvent::UpdateError { error, .. } => {
            assert!(error.starts_with("Failed to persist session"), "{error}");
        }
        other => panic!("unexpected event {other:?}"),
    }
    settle().await;
    // The transfer never started on top of an unwritten state.
    assert!(channel.sent_of_type(MessageType::UpdateChunk).await.is_empty());
    assert_eq!(h.engine.running_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn out_of_state_reports_are_ignored() {
    let (h, channel) = harness(vec![5u8; 8]).await;
    let session = start(&h, options(4)).await;

    sent(&channel, MessageType::UpdatePrepare, 1).await;
    h.device_reports(DEVICE, report(DeviceReportStatus::ValidationComplete));
    h.device_reports(DEVICE, report(DeviceReportStatus::RollbackComplete));
    h.device_reports(DEVICE, UpdateStatusReport::chunk_received(0));
    settle().await;

    let stored = h.engine.session(&session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, UpdateStatus::Preparing);
    assert_eq!(stored.acknowledged_chunks, 0);
}

#[tokio::test(start_paused = true)]
async fn empty_artifact_goes_straight_to_finalize() {
    let (h, channel) = harness(Vec::new()).await;
    let mut events = h.events();
    let session = start(&h, UpdateOptions::default()).await;
    assert_eq!(session.total_chunks, 0);

    sent(&channel, MessageType::UpdatePrepare, 1).await;
    h.device_reports(DEVICE, report(DeviceReportStatus::Ready));
    sent(&channel, MessageType::UpdateFinalize, 1).await;
    wait_status(&mut events, &session.id, UpdateStatus::Validating).await;
    assert!(channel.sent_of_type(MessageType::UpdateChunk).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn queued_prepare_keeps_session_alive() {
    let h = TestHarness::builder()
        .with_artifact(artifact(FIRMWARE, DEVICE_TYPE, "2.0.0", vec![1, 2, 3]))
        .build()
        .await
        .unwrap();
    let mut events = h.events();
    let session = start(&h, UpdateOptions::default()).await;

    let expected = format!("prepare_{}", session.id);
    wait_for_event(&mut events, |e| {
        matches!(e, BusEvent::MessageQueued { message_id, .. } if *message_id == expected)
    })
    .await;
    settle().await;

    let stored = h.engine.session(&session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, UpdateStatus::Preparing);
    assert_eq!(h.storage.list_queued(Some(DEVICE), None).await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn reports_go_to_newest_session_for_device() {
    let (h, channel) = harness(vec![1u8; 4]).await;
    let mut events = h.events();
    let first = start(&h, options(4)).await;
    let second = start(&h, options(4)).await;

    sent(&channel, MessageType::UpdatePrepare, 2).await;
    h.device_reports(DEVICE, report(DeviceReportStatus::Ready));
    wait_status(&mut events, &second.id, UpdateStatus::Transferring).await;

    let first = h.engine.session(&first.id).await.unwrap().unwrap();
    assert_eq!(first.status, UpdateStatus::Preparing);
    assert_eq!(h.engine.running_sessions(), 2);
}

#[tokio::test]
async fn validation_errors_create_no_session() {
    let (h, _channel) = harness(vec![1u8; 4]).await;

    let err = h
        .engine
        .start_firmware_update(&device(DEVICE, DEVICE_TYPE, "1.0.0"), "missing", UpdateOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, OtalinkError::FirmwareNotFound { ref id } if id == "missing"));

    let err = h
        .engine
        .start_firmware_update(&device(DEVICE, "gateway", "1.0.0"), FIRMWARE, UpdateOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, OtalinkError::IncompatibleFirmware { .. }));

    let err = h
        .engine
        .start_firmware_update(&device(DEVICE, DEVICE_TYPE, "1.0.0"), FIRMWARE, options(0))
        .await
        .unwrap_err();
    assert!(matches!(err, OtalinkError::InvalidOptions(_)));

    assert!(h.engine.list_sessions(None).await.unwrap().is_empty());
    assert_eq!(h.engine.running_sessions(), 0);
}

#[tokio::test]
async fn options_are_resolved_onto_the_session() {
    let (h, _channel) = harness(vec![1u8; 4]).await;
    let session = start(
        &h,
        UpdateOptions {
            force_update: Some(true),
            update_timeout_ms: Some(90_000),
            ..UpdateOptions::default()
        },
    )
    .await;

    assert_eq!(session.chunk_size, 4096);
    assert!(session.options.force_update);
    assert!(!session.options.skip_verification);
    assert_eq!(session.options.update_timeout_ms, 90_000);
    h.engine.shutdown();
}

#[tokio::test]
async fn sqlite_backed_transfer_persists_progress() {
    let h = TestHarness::builder()
        .with_artifact(artifact(FIRMWARE, DEVICE_TYPE, "2.0.0", vec![2u8; 12]))
        .with_sqlite_storage()
        .build()
        .await
        .unwrap();
    let channel = h.add_channel("mqtt", "mqtt-primary");
    let mut events = h.events();
    let session = start(&h, options(6)).await;

    sent(&channel, MessageType::UpdatePrepare, 1).await;
    h.device_reports(DEVICE, report(DeviceReportStatus::Ready));
    sent(&channel, MessageType::UpdateChunk, 1).await;
    h.device_reports(DEVICE, UpdateStatusReport::chunk_received(0));
    sent(&channel, MessageType::UpdateChunk, 2).await;
    h.device_reports(DEVICE, UpdateStatusReport::chunk_received(1));
    wait_status(&mut events, &session.id, UpdateStatus::Validating).await;

    let stored = h.engine.session(&session.id).await.unwrap().unwrap();
    assert_eq!(stored.acknowledged_chunks, 2);
    assert_eq!(stored.status, UpdateStatus::Validating);
    let active = h.engine.active_session_for_device(DEVICE).await.unwrap().unwrap();
    assert_eq!(active.id, session.id);
    h.engine.shutdown();
}
