//! WebSocket end-to-end against a server bound to an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use domains::{MediaStore, Result};
use futures_util::{SinkExt, StreamExt};
use integration_tests::{png_data_uri, TestBoard};
use mime::Mime;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.expect("connect");
    ws
}

async fn send(ws: &mut Client, event: Value) {
    ws.send(Message::text(event.to_string())).await.expect("send");
}

async fn next_event(ws: &mut Client) -> Value {
    next_event_within(ws, Duration::from_secs(5)).await
}

async fn next_event_within(ws: &mut Client, wait: Duration) -> Value {
    loop {
        let frame = tokio::time::timeout(wait, ws.next())
            .await
            .expect("timed out waiting for an event")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("server sent JSON");
        }
    }
}

/// Asserts nothing arrives within a short grace period.
async fn assert_quiet(ws: &mut Client) {
    let outcome = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
    assert!(outcome.is_err(), "unexpected frame: {outcome:?}");
}

async fn join(ws: &mut Client, thread_id: impl ToString) {
    let thread_id = thread_id.to_string();
    send(ws, json!({ "type": "joinThread", "threadId": thread_id })).await;
    let joined = next_event(ws).await;
    assert_eq!(joined, json!({ "type": "joined", "threadId": thread_id }));
}

#[tokio::test]
async fn joined_client_receives_its_own_post_numbered_one() {
    let board = TestBoard::new();
    let thread = board.seed_thread("T1");
    let addr = board.spawn().await;
    let mut ws = connect(addr).await;

    join(&mut ws, thread.id).await;
    send(
        &mut ws,
        json!({ "type": "newPost", "threadId": thread.id, "content": "hello", "name": "Fox_a1b2c" }),
    )
    .await;

    let event = next_event(&mut ws).await;
    assert_eq!(event["type"], "newPost");
    assert_eq!(event["post"]["number"], 1);
    assert_eq!(event["post"]["content"], "hello");
    assert_eq!(event["post"]["name"], "Fox_a1b2c");

    let stored = board.services.threads.get_thread(thread.id).await.unwrap();
    assert_eq!(stored.post_count, 1);
}

#[tokio::test]
async fn post_error_goes_only_to_the_sender() {
    let board = TestBoard::new();
    let thread = board.seed_thread("errors");
    let addr = board.spawn().await;
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;
    join(&mut alice, thread.id).await;
    join(&mut bob, thread.id).await;

    send(
        &mut alice,
        json!({ "type": "newPost", "threadId": thread.id, "content": "<script>x</script>" }),
    )
    .await;
    let error = next_event(&mut alice).await;
    assert_eq!(error["type"], "postError");
    assert!(error["message"].as_str().unwrap().contains("HTML"));
    assert_quiet(&mut bob).await;

    // Alice's connection survives the error.
    send(
        &mut alice,
        json!({ "type": "newPost", "threadId": thread.id, "content": "sorry" }),
    )
    .await;
    assert_eq!(next_event(&mut alice).await["post"]["number"], 1);
    assert_eq!(next_event(&mut bob).await["post"]["content"], "sorry");
}

#[tokio::test]
async fn subscribers_of_other_threads_see_nothing() {
    let board = TestBoard::new();
    let here = board.seed_thread("here");
    let there = board.seed_thread("there");
    let addr = board.spawn().await;
    let mut poster = connect(addr).await;
    let mut elsewhere = connect(addr).await;
    join(&mut poster, here.id).await;
    join(&mut elsewhere, there.id).await;

    send(&mut poster, json!({ "type": "newPost", "threadId": here.id, "content": "hi" })).await;
    assert_eq!(next_event(&mut poster).await["type"], "newPost");
    assert_quiet(&mut elsewhere).await;
}

#[tokio::test]
async fn left_thread_stops_delivery() {
    let board = TestBoard::new();
    let thread = board.seed_thread("leaving");
    let addr = board.spawn().await;
    let mut poster = connect(addr).await;
    let mut leaver = connect(addr).await;
    join(&mut poster, thread.id).await;
    join(&mut leaver, thread.id).await;

    send(&mut leaver, json!({ "type": "leaveThread", "threadId": thread.id })).await;
    // Round-trip something so the leave has been processed.
    send(&mut leaver, json!({ "type": "requestNickname", "threadId": thread.id })).await;
    assert_eq!(next_event(&mut leaver).await["type"], "nicknameProposed");

    send(&mut poster, json!({ "type": "newPost", "threadId": thread.id, "content": "bye" })).await;
    assert_eq!(next_event(&mut poster).await["type"], "newPost");
    assert_quiet(&mut leaver).await;
}

#[tokio::test]
async fn nickname_handshake_binds_name_for_later_posts() {
    let board = TestBoard::new();
    let thread = board.seed_thread("names");
    let addr = board.spawn().await;
    let mut ws = connect(addr).await;
    join(&mut ws, thread.id).await;

    send(&mut ws, json!({ "type": "requestNickname", "threadId": thread.id })).await;
    let proposed = next_event(&mut ws).await;
    assert_eq!(proposed["type"], "nicknameProposed");
    let nickname = proposed["nickname"].as_str().unwrap().to_owned();

    send(
        &mut ws,
        json!({ "type": "confirmNickname", "threadId": thread.id, "nickname": nickname, "firstAttempt": true }),
    )
    .await;
    let accepted = next_event(&mut ws).await;
    assert_eq!(accepted["type"], "nicknameAccepted");
    assert_eq!(accepted["nickname"], nickname.as_str());

    send(&mut ws, json!({ "type": "newPost", "threadId": thread.id, "content": "named" })).await;
    assert_eq!(next_event(&mut ws).await["post"]["name"], nickname.as_str());

    // Asking again keeps the bound name.
    send(&mut ws, json!({ "type": "requestNickname", "threadId": thread.id })).await;
    let again = next_event(&mut ws).await;
    assert_eq!(again["type"], "nicknameAccepted");
    assert_eq!(again["nickname"], nickname.as_str());
}

#[tokio::test]
async fn taken_nickname_is_rejected() {
    let board = TestBoard::new();
    let thread = board.seed_thread("names");
    board.services.nicknames.claim(thread.id, "BoldOwl_zz999").await.unwrap();
    let addr = board.spawn().await;
    let mut ws = connect(addr).await;
    join(&mut ws, thread.id).await;

    // First attempt: the client is told to regenerate and given a candidate.
    send(
        &mut ws,
        json!({ "type": "confirmNickname", "threadId": thread.id, "nickname": "BoldOwl_zz999", "firstAttempt": true }),
    )
    .await;
    let rejected = next_event(&mut ws).await;
    assert_eq!(rejected["type"], "nicknameRejected");
    assert_eq!(rejected["regenerate"], true);
    assert!(rejected["suggestion"].is_string());

    // A user-chosen retry is rejected and surfaced as an error too.
    send(
        &mut ws,
        json!({ "type": "confirmNickname", "threadId": thread.id, "nickname": "BoldOwl_zz999", "firstAttempt": false }),
    )
    .await;
    let rejected = next_event(&mut ws).await;
    assert_eq!(rejected["type"], "nicknameRejected");
    assert_eq!(rejected["regenerate"], false);
    assert!(rejected.get("suggestion").is_none());
    assert_eq!(next_event(&mut ws).await["type"], "postError");
}

#[tokio::test]
async fn malformed_and_unknown_thread_messages_do_not_close_the_socket() {
    let board = TestBoard::new();
    let thread = board.seed_thread("robust");
    let addr = board.spawn().await;
    let mut ws = connect(addr).await;

    ws.send(Message::text("{not json")).await.unwrap();
    let error = next_event(&mut ws).await;
    assert_eq!(error, json!({ "type": "postError", "message": "malformed message" }));

    send(
        &mut ws,
        json!({ "type": "joinThread", "threadId": domains::ThreadId::new() }),
    )
    .await;
    let error = next_event(&mut ws).await;
    assert_eq!(error["type"], "postError");
    assert!(error["message"].as_str().unwrap().contains("thread not found"));

    join(&mut ws, thread.id).await;
}

#[tokio::test]
async fn authenticated_data_uri_image_is_attached() {
    let board = TestBoard::new();
    let thread = board.seed_thread("pictures");
    let token = board.token("photographer");
    let addr = board.spawn().await;
    let mut ws = connect(addr).await;
    join(&mut ws, thread.id).await;

    send(
        &mut ws,
        json!({ "type": "newPost", "threadId": thread.id, "content": "pic", "image": png_data_uri(64) }),
    )
    .await;
    let error = next_event(&mut ws).await;
    assert_eq!(error["type"], "postError");

    send(
        &mut ws,
        json!({
            "type": "newPost",
            "threadId": thread.id,
            "content": "pic",
            "image": png_data_uri(64),
            "credential": token,
        }),
    )
    .await;
    let event = next_event(&mut ws).await;
    assert_eq!(event["type"], "newPost");
    assert!(event["post"]["imageUrl"].as_str().unwrap().ends_with(".png"));
    assert_eq!(event["post"]["userId"], "photographer");
}

#[tokio::test]
async fn report_notifies_joined_sockets() {
    let board = TestBoard::new();
    let thread = board.seed_thread("reports");
    let addr = board.spawn().await;
    let mut ws = connect(addr).await;
    join(&mut ws, thread.id).await;

    send(&mut ws, json!({ "type": "newPost", "threadId": thread.id, "content": "bad" })).await;
    let post = next_event(&mut ws).await;
    let post_id: domains::PostId = serde_json::from_value(post["post"]["id"].clone()).unwrap();

    board
        .services
        .moderation
        .report(thread.id, post_id, Some("殺人予告"))
        .await
        .unwrap();
    let deleted = next_event(&mut ws).await;
    assert_eq!(
        deleted,
        json!({ "type": "postDeleted", "threadId": thread.id, "postId": post_id })
    );
}

const MIB: usize = 1024 * 1024;

#[tokio::test]
async fn large_images_are_ingested_or_refused_without_dropping_the_socket() {
    let board = TestBoard::new();
    let thread = board.seed_thread("big pictures");
    let token = board.token("photographer");
    let addr = board.spawn().await;
    let mut ws = connect(addr).await;
    join(&mut ws, thread.id).await;

    send(
        &mut ws,
        json!({
            "type": "newPost",
            "threadId": thread.id,
            "content": "within the ceiling",
            "image": png_data_uri(14 * MIB),
            "credential": token,
        }),
    )
    .await;
    let event = next_event_within(&mut ws, Duration::from_secs(60)).await;
    assert_eq!(event["type"], "newPost", "{event}");
    assert!(event["post"]["imageUrl"].is_string());

    send(
        &mut ws,
        json!({
            "type": "newPost",
            "threadId": thread.id,
            "content": "over the ceiling",
            "image": png_data_uri(20 * MIB),
            "credential": token,
        }),
    )
    .await;
    let error = next_event_within(&mut ws, Duration::from_secs(60)).await;
    assert_eq!(error["type"], "postError");
    assert!(error["message"].as_str().unwrap().contains("too large"));

    send(&mut ws, json!({ "type": "newPost", "threadId": thread.id, "content": "still here" })).await;
    assert_eq!(next_event(&mut ws).await["post"]["number"], 2);
}

#[tokio::test]
async fn posting_under_someone_elses_nickname_is_refused() {
    let board = TestBoard::new();
    let thread = board.seed_thread("names");
    let addr = board.spawn().await;
    let mut owner = connect(addr).await;
    let mut other = connect(addr).await;
    join(&mut owner, thread.id).await;
    join(&mut other, thread.id).await;

    send(
        &mut owner,
        json!({ "type": "confirmNickname", "threadId": thread.id, "nickname": "Fox_a1b2c", "firstAttempt": true }),
    )
    .await;
    assert_eq!(next_event(&mut owner).await["type"], "nicknameAccepted");

    send(
        &mut other,
        json!({ "type": "newPost", "threadId": thread.id, "content": "it's me", "name": "Fox_a1b2c" }),
    )
    .await;
    let error = next_event(&mut other).await;
    assert_eq!(error["type"], "postError");
    assert!(error["message"].as_str().unwrap().contains("nickname unavailable"));
    assert_quiet(&mut owner).await;

    send(
        &mut owner,
        json!({ "type": "newPost", "threadId": thread.id, "content": "the real one", "name": "Fox_a1b2c" }),
    )
    .await;
    assert_eq!(next_event(&mut owner).await["post"]["name"], "Fox_a1b2c");
    assert_eq!(next_event(&mut other).await["post"]["name"], "Fox_a1b2c");
}

/// Holds every upload until a permit is released.
struct GatedMedia {
    gate: Semaphore,
}

#[async_trait]
impl MediaStore for GatedMedia {
    async fn save_upload(&self, _data: Bytes, _content_type: &Mime) -> Result<String> {
        let _permit = self.gate.acquire().await.expect("gate open");
        Ok("/uploads/gated.png".into())
    }
}

#[tokio::test]
async fn slow_upload_does_not_hold_up_the_connection() {
    let media = Arc::new(GatedMedia {
        gate: Semaphore::new(0),
    });
    let board = TestBoard::with_media(media.clone());
    let thread = board.seed_thread("slow");
    let token = board.token("photographer");
    let addr = board.spawn().await;
    let mut ws = connect(addr).await;
    join(&mut ws, thread.id).await;

    send(
        &mut ws,
        json!({
            "type": "newPost",
            "threadId": thread.id,
            "content": "pic",
            "image": png_data_uri(64),
            "credential": token,
        }),
    )
    .await;
    send(&mut ws, json!({ "type": "newPost", "threadId": thread.id, "content": "text" })).await;
    let text = next_event(&mut ws).await;
    assert_eq!(text["post"]["content"], "text");
    assert_eq!(text["post"]["number"], 1);

    media.gate.add_permits(1);
    let pic = next_event(&mut ws).await;
    assert_eq!(pic["post"]["content"], "pic");
    assert_eq!(pic["post"]["number"], 2);
    assert_eq!(pic["post"]["imageUrl"], "/uploads/gated.png");
}
