//! Thread and category routes over HTTP with real tokens and media.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use domains::ServerEvent;
use integration_tests::{png_data_uri, TestBoard, URL_PREFIX};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn create(body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::post("/api/threads").header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn thread_with_image_sets_both_urls_and_creator() {
    let board = TestBoard::new();
    let app = board.router();
    let token = board.token("op");

    let (status, thread) = call(
        &app,
        create(
            json!({ "title": "画像スレ", "content": "貼ります", "image": png_data_uri(128) }),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let image_url = thread["imageUrl"].as_str().unwrap().to_owned();
    assert!(image_url.starts_with(URL_PREFIX));
    assert_eq!(thread["creator"], "op");
    assert_eq!(thread["category"], "general");

    let id = thread["id"].as_str().unwrap();
    let (_, posts) = call(&app, get(&format!("/api/threads/{id}/posts"))).await;
    assert_eq!(posts[0]["imageUrl"], image_url.as_str());
    assert_eq!(posts[0]["userId"], "op");
}

#[tokio::test]
async fn thread_image_without_token_is_rejected_and_nothing_created() {
    let board = TestBoard::new();
    let app = board.router();

    let (status, _) = call(
        &app,
        create(
            json!({ "title": "画像スレ", "content": "貼ります", "image": png_data_uri(128) }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, threads) = call(&app, get("/api/threads")).await;
    assert_eq!(threads, json!([]));
}

#[tokio::test]
async fn category_listing_counts_searches_and_sorts() {
    let board = TestBoard::new();
    let app = board.router();

    for title in ["Rust 入門", "Go 入門", "Rust 上級"] {
        let (status, _) = call(
            &app,
            create(json!({ "title": title, "content": "本文", "category": "news" }), None),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, category) = call(&app, get("/api/categories/news")).await;
    assert_eq!(category["threadCount"], 3);

    let (_, found) = call(&app, get("/api/categories/news/threads?search=rust&sort=oldest")).await;
    let titles: Vec<&str> = found
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Rust 入門", "Rust 上級"]);

    let (_, newest) = call(&app, get("/api/categories/news/threads")).await;
    assert_eq!(newest[0]["title"], "Rust 上級");

    let (status, unknown) = call(&app, get("/api/categories/nowhere")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unknown["threadCount"], 0);
}

#[tokio::test]
async fn deleting_a_thread_updates_its_category() {
    let board = TestBoard::new();
    let app = board.router();
    let token = board.token("mod");

    let (_, thread) = call(
        &app,
        create(json!({ "title": "消えるスレ", "content": "x", "category": "news" }), None),
    )
    .await;
    let id = thread["id"].as_str().unwrap();

    let anonymous = Request::delete(format!("/api/threads/{id}")).body(Body::empty()).unwrap();
    assert_eq!(call(&app, anonymous).await.0, StatusCode::UNAUTHORIZED);

    let request = Request::delete(format!("/api/threads/{id}"))
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(call(&app, request).await.0, StatusCode::OK);

    let (_, category) = call(&app, get("/api/categories/news")).await;
    assert_eq!(category["threadCount"], 0);
    assert_eq!(call(&app, get(&format!("/api/threads/{id}"))).await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn http_post_is_broadcast_to_realtime_subscribers() {
    let board = TestBoard::new();
    let app = board.router();
    let thread = board.seed_thread("mixed transports");
    let (conn, mut rx) = board.services.hub.connect();
    board.services.hub.subscribe(conn, thread.id);

    let boundary = "xyz";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"content\"\r\n\r\nfrom http\r\n--{boundary}--\r\n"
    );
    let request = Request::post(format!("/api/threads/{}/posts", thread.id))
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap();
    let (status, post) = call(&app, request).await;
    assert_eq!(status, StatusCode::CREATED);

    match rx.try_recv() {
        Ok(ServerEvent::NewPost { post: broadcast }) => {
            assert_eq!(broadcast.content, "from http");
            assert_eq!(post["id"], broadcast.id.to_string());
        }
        other => panic!("expected newPost, got {other:?}"),
    }
}
