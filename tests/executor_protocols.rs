//! End-to-end protocol execution through the executor service

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tempfile::tempdir;

use deskpilot::broker::{BrokerMessage, Channel, FsBroker, MessageBus, MessageType};
use deskpilot::driver::{DriverCall, RecordingDriver};
use deskpilot::errors::ErrorKind;
use deskpilot::executor::{ExecutionResult, ExecutionStatus, ExecutorService};

use common::test_config;

async fn run_protocol(protocol: serde_json::Value, request_id: &str) -> (ExecutionResult, Arc<RecordingDriver>) {
    let dir = tempdir().unwrap();
    let config = test_config(&dir.path().join("messages"));
    let bus = Arc::new(FsBroker::new(&config.broker.root_dir, config.broker.poll_interval_ms).unwrap());
    let driver = Arc::new(RecordingDriver::new());
    let service = ExecutorService::new(config, driver.clone(), bus.clone());

    bus.send(BrokerMessage::new(MessageType::Protocol, request_id, protocol))
        .await
        .unwrap();
    assert!(service.poll_once().await.unwrap());

    let status = bus
        .receive(Channel::Status, Duration::from_secs(2), Some(request_id))
        .await
        .unwrap()
        .expect("status message");
    (status.payload_as().unwrap(), driver)
}

#[tokio::test]
async fn test_smoke_protocol() {
    let protocol = json!({
        "version": "1.0",
        "metadata": {"description": "smoke", "complexity": "simple", "uses_vision": false},
        "actions": [{"action": "press_key", "params": {"key": "enter"}, "wait_after_ms": 50}]
    });

    let (result, driver) = run_protocol(protocol, "smoke-1").await;
    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.actions_completed, 1);
    assert_eq!(result.actions_total, 1);
    assert_eq!(driver.calls(), vec![DriverCall::KeyPress { key: "enter".into() }]);
}

#[tokio::test]
async fn test_macro_with_variables() {
    let protocol = json!({
        "version": "1.0",
        "metadata": {"description": "macro search", "complexity": "simple", "uses_vision": false},
        "macros": {
            "search": [
                {"action": "type", "params": {"text": "{{query}}"}},
                {"action": "press_key", "params": {"key": "enter"}}
            ]
        },
        "actions": [{"action": "macro", "params": {"name": "search", "vars": {"query": "hello"}}}]
    });

    let (result, driver) = run_protocol(protocol, "macro-1").await;
    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.actions_completed, 1);
    assert_eq!(
        driver.calls(),
        vec![
            DriverCall::TypeText { text: "hello".into() },
            DriverCall::KeyPress { key: "enter".into() },
        ]
    );
}

#[tokio::test]
async fn test_output_variables_preserve_types() {
    // mouse_position writes integer outputs; the whole-token references in
    // mouse_move must arrive as integers, not strings
    let protocol = json!({
        "version": "1.0",
        "metadata": {"description": "reuse position", "complexity": "simple", "uses_vision": false},
        "actions": [
            {"action": "mouse_position", "params": {}},
            {"action": "mouse_move", "params": {"x": "{{mouse_x}}", "y": "{{mouse_y}}", "smooth": false}}
        ]
    });

    let (result, driver) = run_protocol(protocol, "typed-1").await;
    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.actions_completed, 2);
    // RecordingDriver starts the pointer at screen center (960, 540)
    assert_eq!(driver.calls(), vec![DriverCall::MouseMove { x: 960, y: 540 }]);
}

#[tokio::test]
async fn test_missing_variable_fails_at_the_right_action() {
    let protocol = json!({
        "version": "1.0",
        "metadata": {"description": "missing vars", "complexity": "simple", "uses_vision": false},
        "actions": [
            {"action": "mouse_move", "params": {"x": "{{verified_x}}", "y": "{{verified_y}}"}}
        ]
    });

    let (result, driver) = run_protocol(protocol, "missing-1").await;
    assert_eq!(result.status, ExecutionStatus::Failed);
    let details = result.error_details.unwrap();
    assert_eq!(details.kind, ErrorKind::VariableMissing);
    assert_eq!(details.action_index, 0);
    assert!(result.error.unwrap().contains("available"));
    assert!(driver.calls().is_empty());
}

#[tokio::test]
async fn test_dry_run_completes_everything() {
    let dir = tempdir().unwrap();
    let mut config = test_config(&dir.path().join("messages"));
    config.execution.dry_run = true;
    let bus = Arc::new(FsBroker::new(&config.broker.root_dir, config.broker.poll_interval_ms).unwrap());
    let driver = Arc::new(RecordingDriver::new());
    let service = ExecutorService::new(config, driver.clone(), bus.clone());

    let protocol = json!({
        "version": "1.0",
        "metadata": {"description": "dry", "complexity": "simple", "uses_vision": false},
        "actions": [
            {"action": "press_key", "params": {"key": "a"}},
            {"action": "type", "params": {"text": "hello"}},
            {"action": "mouse_click", "params": {}}
        ]
    });
    bus.send(BrokerMessage::new(MessageType::Protocol, "dry-1", protocol)).await.unwrap();
    service.poll_once().await.unwrap();

    let result: ExecutionResult = bus
        .receive(Channel::Status, Duration::from_secs(2), Some("dry-1"))
        .await
        .unwrap()
        .unwrap()
        .payload_as()
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.actions_completed, 3);
    assert!(driver.calls().is_empty());
}

#[tokio::test]
async fn test_inter_action_delay_lower_bound() {
    let protocol = json!({
        "version": "1.0",
        "metadata": {"description": "delayed", "complexity": "simple", "uses_vision": false},
        "actions": [
            {"action": "press_key", "params": {"key": "a"}, "wait_after_ms": 120},
            {"action": "press_key", "params": {"key": "b"}}
        ]
    });

    let start = Instant::now();
    let (result, _) = run_protocol(protocol, "delay-1").await;
    assert_eq!(result.status, ExecutionStatus::Success);
    assert!(start.elapsed() >= Duration::from_millis(120));
    assert!(result.duration_ms >= 120);
}

#[tokio::test]
async fn test_stop_is_idempotent_and_ends_service() {
    let dir = tempdir().unwrap();
    let config = test_config(&dir.path().join("messages"));
    let bus = Arc::new(FsBroker::new(&config.broker.root_dir, config.broker.poll_interval_ms).unwrap());
    let driver = Arc::new(RecordingDriver::new());
    let service = ExecutorService::new(config, driver, bus);

    let control = service.control();
    control.stop();
    control.stop(); // second call is a no-op

    // run() observes the flag and returns promptly
    tokio::time::timeout(Duration::from_secs(1), service.run()).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_validation_rejection_reaches_the_planner_side() {
    let protocol = json!({
        "version": "0.9",
        "metadata": {"description": "old", "complexity": "simple", "uses_vision": false},
        "actions": [{"action": "press_key", "params": {"key": "a"}}]
    });

    let (result, driver) = run_protocol(protocol, "reject-1").await;
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.actions_completed, 0);
    assert_eq!(result.error_details.unwrap().kind, ErrorKind::VersionMismatch);
    assert!(driver.calls().is_empty());
}
