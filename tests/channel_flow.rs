//! Integration tests for channel flows: admin-only posting, live
//! broadcasts to subscribed members, and subscription preload.

mod common;

use common::{TestClient, TestServer};
use std::time::Duration;

const RECV: Duration = Duration::from_secs(5);

#[tokio::test]
async fn admin_message_broadcasts_to_all_connected_members() {
    let server = TestServer::spawn().await.expect("spawn server");
    // Admin (user 1) creates the channel before anyone connects, so the
    // subscription preload picks it up at connect time.
    let channel = server.db.channels().create("announcements", Some("team news"), 1)
        .await
        .expect("create channel");
    server.db.channels().add_member(channel.id, 2).await.expect("add member");
    server.db.channels().add_member(channel.id, 3).await.expect("add member");

    let mut admin = TestClient::connect(&server.ws_url(1)).await.expect("admin");
    let mut member_a = TestClient::connect(&server.ws_url(2)).await.expect("member a");
    let mut member_b = TestClient::connect(&server.ws_url(3)).await.expect("member b");

    admin
        .send_raw(&format!(
            r#"{{"type":"channel","channel_message":{{"channel_id":{},"content":"release shipped"}}}}"#,
            channel.id
        ))
        .await
        .expect("send");

    for client in [&mut admin, &mut member_a, &mut member_b] {
        let frame = client.recv_json(RECV).await.expect("broadcast");
        assert_eq!(frame["type"], "channel");
        assert_eq!(frame["channel_message"]["channel_id"], channel.id);
        assert_eq!(frame["channel_message"]["sender_id"], 1);
        assert_eq!(frame["channel_message"]["content"], "release shipped");
    }

    let page = server.db.messages().channel_page(channel.id, 1).await.unwrap();
    assert_eq!(page.total, 1);
}

#[tokio::test]
async fn non_admin_channel_message_is_rejected_and_not_stored() {
    let server = TestServer::spawn().await.expect("spawn server");
    let channel = server.db.channels().create("announcements", None, 1)
        .await
        .expect("create channel");
    server.db.channels().add_member(channel.id, 2).await.expect("add member");

    let mut admin = TestClient::connect(&server.ws_url(1)).await.expect("admin");
    let mut member = TestClient::connect(&server.ws_url(2)).await.expect("member");

    member
        .send_raw(&format!(
            r#"{{"type":"channel","channel_message":{{"channel_id":{},"content":"can I post?"}}}}"#,
            channel.id
        ))
        .await
        .expect("send");

    let frame = member.recv_json(RECV).await.expect("error frame");
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["error"]["code"], "not_channel_admin");

    // No broadcast reached the admin, nothing was persisted
    assert!(admin.expect_silence(Duration::from_millis(300)).await);
    let page = server.db.messages().channel_page(channel.id, 1).await.unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn non_member_does_not_receive_channel_broadcasts() {
    let server = TestServer::spawn().await.expect("spawn server");
    let channel = server.db.channels().create("private", None, 1)
        .await
        .expect("create channel");

    let mut admin = TestClient::connect(&server.ws_url(1)).await.expect("admin");
    let mut outsider = TestClient::connect(&server.ws_url(5)).await.expect("outsider");

    admin
        .send_raw(&format!(
            r#"{{"type":"channel","channel_message":{{"channel_id":{},"content":"secret"}}}}"#,
            channel.id
        ))
        .await
        .expect("send");

    let frame = admin.recv_json(RECV).await.expect("echo");
    assert_eq!(frame["channel_message"]["content"], "secret");
    assert!(outsider.expect_silence(Duration::from_millis(300)).await);
}

#[tokio::test]
async fn invalid_channel_id_is_rejected() {
    let server = TestServer::spawn().await.expect("spawn server");
    let mut client = TestClient::connect(&server.ws_url(1)).await.expect("client");

    client
        .send_raw(r#"{"type":"channel","channel_message":{"channel_id":0,"content":"x"}}"#)
        .await
        .expect("send");

    let frame = client.recv_json(RECV).await.expect("error frame");
    assert_eq!(frame["error"]["code"], "invalid_channel");
}
