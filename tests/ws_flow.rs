//! Integration tests for the WebSocket session: peer messaging, error
//! frames, and disconnect cleanup.

mod common;

use common::{TestClient, TestServer};
use std::time::Duration;

const RECV: Duration = Duration::from_secs(5);

/// Poll until the peer conversation between two users reaches the
/// expected length; persistence runs server-side after the send.
async fn wait_for_stored(server: &TestServer, a: i64, b: i64, count: usize) {
    for _ in 0..100 {
        let stored = server.db.messages().peer_conversation(a, b).await.unwrap();
        if stored.len() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("message never persisted");
}

#[tokio::test]
async fn peer_message_reaches_receiver_but_not_sender() {
    let server = TestServer::spawn().await.expect("spawn server");

    let mut alice = TestClient::connect(&server.ws_url(1)).await.expect("alice");
    let mut bob = TestClient::connect(&server.ws_url(2)).await.expect("bob");

    alice
        .send_raw(r#"{"type":"peer","peer_message":{"receiver_id":2,"content":"hello bob"}}"#)
        .await
        .expect("send");

    let frame = bob.recv_json(RECV).await.expect("bob receives");
    assert_eq!(frame["type"], "peer");
    assert_eq!(frame["peer_message"]["sender_id"], 1);
    assert_eq!(frame["peer_message"]["receiver_id"], 2);
    assert_eq!(frame["peer_message"]["content"], "hello bob");
    assert!(frame["peer_message"]["id"].as_i64().unwrap() > 0);

    // No echo back to the sender on the peer path
    assert!(alice.expect_silence(Duration::from_millis(300)).await);

    // Message persisted
    let stored = server.db.messages().peer_conversation(1, 2).await.unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn peer_message_to_offline_user_is_stored_not_delivered() {
    let server = TestServer::spawn().await.expect("spawn server");

    let mut alice = TestClient::connect(&server.ws_url(1)).await.expect("alice");
    alice
        .send_raw(r#"{"type":"peer","peer_message":{"receiver_id":9,"content":"are you there"}}"#)
        .await
        .expect("send");

    wait_for_stored(&server, 1, 9, 1).await;

    // Nobody connected as user 9, and the sender hears nothing either
    assert!(alice.expect_silence(Duration::from_millis(300)).await);
}

#[tokio::test]
async fn empty_content_returns_error_frame_only_to_sender() {
    let server = TestServer::spawn().await.expect("spawn server");

    let mut alice = TestClient::connect(&server.ws_url(1)).await.expect("alice");
    let mut bob = TestClient::connect(&server.ws_url(2)).await.expect("bob");

    alice
        .send_raw(r#"{"type":"peer","peer_message":{"receiver_id":2,"content":""}}"#)
        .await
        .expect("send");

    let frame = alice.recv_json(RECV).await.expect("error frame");
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["error"]["code"], "empty_content");

    assert!(bob.expect_silence(Duration::from_millis(300)).await);
    assert!(
        server
            .db
            .messages()
            .peer_conversation(1, 2)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn unknown_frame_type_returns_error() {
    let server = TestServer::spawn().await.expect("spawn server");

    let mut alice = TestClient::connect(&server.ws_url(1)).await.expect("alice");
    alice
        .send_raw(r#"{"type":"typing_indicator"}"#)
        .await
        .expect("send");

    let frame = alice.recv_json(RECV).await.expect("error frame");
    assert_eq!(frame["error"]["code"], "unknown_type");
}

#[tokio::test]
async fn disconnected_client_no_longer_receives_broadcasts() {
    let server = TestServer::spawn().await.expect("spawn server");

    let mut alice = TestClient::connect(&server.ws_url(1)).await.expect("alice");
    let bob = TestClient::connect(&server.ws_url(2)).await.expect("bob");
    bob.close().await.expect("close bob");

    // Give the read pump a moment to unregister
    tokio::time::sleep(Duration::from_millis(100)).await;

    alice
        .send_raw(r#"{"type":"peer","peer_message":{"receiver_id":2,"content":"late"}}"#)
        .await
        .expect("send");

    // Still persisted for bob to fetch later; nothing live reaches anyone
    wait_for_stored(&server, 1, 2, 1).await;
    assert!(alice.expect_silence(Duration::from_millis(300)).await);
}

#[tokio::test]
async fn multiple_devices_of_one_user_all_receive() {
    let server = TestServer::spawn().await.expect("spawn server");

    let mut alice = TestClient::connect(&server.ws_url(1)).await.expect("alice");
    let mut bob_phone = TestClient::connect(&server.ws_url(2)).await.expect("bob phone");
    let mut bob_laptop = TestClient::connect(&server.ws_url(2)).await.expect("bob laptop");

    alice
        .send_raw(r#"{"type":"peer","peer_message":{"receiver_id":2,"content":"ping"}}"#)
        .await
        .expect("send");

    let a = bob_phone.recv_json(RECV).await.expect("phone");
    let b = bob_laptop.recv_json(RECV).await.expect("laptop");
    assert_eq!(a["peer_message"]["content"], "ping");
    assert_eq!(b["peer_message"]["content"], "ping");
}

#[tokio::test]
async fn no_confirmation_frame_when_subscription_preload_fails() {
    use futures_util::StreamExt;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message;

    let server = TestServer::spawn().await.expect("spawn server");
    // Closing the pool makes the membership preload query fail
    server.db.pool().close().await;

    let (mut stream, _) = connect_async(server.ws_url(1)).await.expect("connect");

    let got = tokio::time::timeout(Duration::from_millis(500), stream.next()).await;
    match got {
        Err(_) => {} // no frame at all
        Ok(Some(Ok(Message::Text(text)))) => {
            panic!("expected no confirmation, got frame: {text}");
        }
        Ok(other) => panic!("unexpected socket event: {other:?}"),
    }
}
