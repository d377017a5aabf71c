//! Filesystem broker delivery semantics

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::tempdir;

use deskpilot::broker::{BrokerMessage, Channel, FsBroker, MessageBus, MessageType, sanitize_request_id};

fn fs_broker(dir: &tempfile::TempDir) -> FsBroker {
    FsBroker::new(dir.path().join("messages"), 10).unwrap()
}

#[tokio::test]
async fn test_send_receive_preserves_serialized_bytes() {
    let dir = tempdir().unwrap();
    let broker = fs_broker(&dir);

    let message = BrokerMessage::new(
        MessageType::VisualStateResponse,
        "req-1",
        json!({"screenshot_b64": "aGVsbG8=", "mouse_xy": [10, 20], "screen_wh": [1920, 1080]}),
    );
    let sent_bytes = serde_json::to_string(&message).unwrap();

    broker.send(message).await.unwrap();
    let received = broker
        .receive(Channel::VisualStateResponse, Duration::from_secs(1), Some("req-1"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(serde_json::to_string(&received).unwrap(), sent_bytes);
}

#[tokio::test]
async fn test_fifo_order_across_many_messages() {
    let dir = tempdir().unwrap();
    let broker = fs_broker(&dir);

    for i in 0..20 {
        let mut message = BrokerMessage::new(MessageType::ProtocolStatus, format!("req-{:02}", i), json!(i));
        message.timestamp = 1_000_000 + i as i64;
        broker.send(message).await.unwrap();
    }

    for i in 0..20 {
        let message = broker.try_receive(Channel::Status, None).await.unwrap().unwrap();
        assert_eq!(message.payload, json!(i), "message {} out of order", i);
    }
}

#[tokio::test]
async fn test_at_most_once_delivery() {
    let dir = tempdir().unwrap();
    let broker = fs_broker(&dir);

    broker
        .send(BrokerMessage::new(MessageType::Protocol, "once", json!("payload")))
        .await
        .unwrap();

    assert!(broker.try_receive(Channel::Protocols, None).await.unwrap().is_some());
    assert!(broker.try_receive(Channel::Protocols, None).await.unwrap().is_none());

    // The channel directory is empty again
    let channel_dir = dir.path().join("messages").join("protocols");
    assert_eq!(std::fs::read_dir(channel_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn test_request_id_sanitization_matches_both_sides() {
    let dir = tempdir().unwrap();
    let broker = fs_broker(&dir);

    // A messy id: the writer sanitizes the filename, the reader applies the
    // identical rule when filtering
    let messy = "Open Firefox & go to mail!";
    broker
        .send(BrokerMessage::new(MessageType::ProtocolStatus, messy, json!("ok")))
        .await
        .unwrap();

    let received = broker
        .receive(Channel::Status, Duration::from_secs(1), Some(messy))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.request_id, messy);

    // The sanitize rule itself
    assert_eq!(sanitize_request_id(messy), "open_firefox___go_to_mail_");
    assert_eq!(sanitize_request_id(&"a".repeat(300)).len(), 128);
}

#[tokio::test]
async fn test_filtered_receive_skips_other_requests() {
    let dir = tempdir().unwrap();
    let broker = fs_broker(&dir);

    for id in ["alpha", "beta", "gamma"] {
        broker
            .send(BrokerMessage::new(MessageType::VisualActionResult, id, json!(id)))
            .await
            .unwrap();
    }

    let beta = broker
        .receive(Channel::VisualActionResult, Duration::from_secs(1), Some("beta"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(beta.payload, json!("beta"));

    // alpha and gamma still wait in FIFO order
    let first = broker.try_receive(Channel::VisualActionResult, None).await.unwrap().unwrap();
    let second = broker.try_receive(Channel::VisualActionResult, None).await.unwrap().unwrap();
    assert_eq!(first.request_id, "alpha");
    assert_eq!(second.request_id, "gamma");
}

#[tokio::test]
async fn test_tmp_files_never_delivered() {
    let dir = tempdir().unwrap();
    let broker = fs_broker(&dir);

    let channel_dir = dir.path().join("messages").join("protocols");
    std::fs::write(channel_dir.join("123_partial.tmp"), "{\"half\":").unwrap();

    assert!(broker.try_receive(Channel::Protocols, None).await.unwrap().is_none());
    assert!(channel_dir.join("123_partial.tmp").exists());
}

#[tokio::test]
async fn test_two_broker_handles_share_the_directory() {
    // The real deployment: two processes, one directory
    let dir = tempdir().unwrap();
    let root = dir.path().join("messages");
    let sender = FsBroker::new(&root, 10).unwrap();
    let receiver = FsBroker::new(&root, 10).unwrap();

    let receiver = Arc::new(receiver);
    let waiter = {
        let receiver = receiver.clone();
        tokio::spawn(async move {
            receiver
                .receive(Channel::Protocols, Duration::from_secs(2), None)
                .await
                .unwrap()
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    sender
        .send(BrokerMessage::new(MessageType::Protocol, "cross", json!(1)))
        .await
        .unwrap();

    let message = waiter.await.unwrap().expect("delivered across handles");
    assert_eq!(message.request_id, "cross");
}
