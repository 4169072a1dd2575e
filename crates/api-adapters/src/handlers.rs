//! # HTTP Handlers
//!
//! Thin adapters from axum extractors to the services in `Services`. No
//! business rule lives here: each handler unpacks the request, calls one
//! service operation and shapes the JSON answer.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use domains::{AppError, Category, LikeOutcome, Post, PostId, Thread, ThreadId, ThreadQuery, ThreadSort};
use serde::Deserialize;
use serde_json::{json, Value};
use services::{ImagePayload, NewThread, Submission};
use tracing::error;

use crate::error::{ApiError, ApiResult};
use crate::extract::{Bearer, ClientAddr};
use crate::state::AppState;

const OPENMETRICS: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort: Option<ThreadSort>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateThreadBody {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub name: Option<String>,
    /// `data:image/...;base64,` payload.
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportBody {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NicknameBody {
    #[serde(default)]
    pub nickname: String,
}

pub async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => ([(CONTENT_TYPE, OPENMETRICS)], body).into_response(),
        Err(err) => {
            error!(%err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// ── Categories ──────────────────────────────────────────────────────────────

pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(state.services.threads.list_categories().await?))
}

pub async fn get_category(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Category>> {
    Ok(Json(state.services.threads.get_category(&name).await?))
}

pub async fn category_threads(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Thread>>> {
    let query = ThreadQuery {
        category: Some(name),
        search: params.search.filter(|s| !s.trim().is_empty()),
        sort: params.sort.unwrap_or(ThreadSort::Newest),
    };
    Ok(Json(state.services.threads.list_threads(&query).await?))
}

// ── Threads ─────────────────────────────────────────────────────────────────

pub async fn list_threads(State(state): State<AppState>) -> ApiResult<Json<Vec<Thread>>> {
    Ok(Json(
        state
            .services
            .threads
            .list_threads(&ThreadQuery::default())
            .await?,
    ))
}

/// Creates a thread together with post #1.
pub async fn create_thread(
    State(state): State<AppState>,
    ClientAddr(source): ClientAddr,
    bearer: Bearer,
    payload: Result<Json<CreateThreadBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Thread>)> {
    let Json(body) = payload?;
    let (thread, _first) = state
        .services
        .threads
        .create_thread(NewThread {
            source: &source,
            title: &body.title,
            category: body.category.as_deref(),
            content: &body.content,
            name: body.name.as_deref(),
            image: body.image.as_deref(),
            credential: bearer.as_deref(),
        })
        .await?;
    state.metrics.thread_created();
    Ok((StatusCode::CREATED, Json(thread)))
}

pub async fn get_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<ThreadId>,
) -> ApiResult<Json<Thread>> {
    Ok(Json(state.services.threads.get_thread(thread_id).await?))
}

pub async fn delete_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<ThreadId>,
    ClientAddr(source): ClientAddr,
    bearer: Bearer,
) -> ApiResult<Json<Thread>> {
    let actor = state.services.auth.require(&source, bearer.as_deref()).await?;
    Ok(Json(
        state.services.threads.delete_thread(thread_id, &actor).await?,
    ))
}

pub async fn like_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<ThreadId>,
    ClientAddr(source): ClientAddr,
    bearer: Bearer,
) -> ApiResult<Json<LikeOutcome>> {
    let actor = state.services.auth.require(&source, bearer.as_deref()).await?;
    Ok(Json(state.services.threads.like(thread_id, &actor).await?))
}

pub async fn check_nickname(
    State(state): State<AppState>,
    Path(thread_id): Path<ThreadId>,
    payload: Result<Json<NicknameBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = payload?;
    let check = match state
        .services
        .threads
        .check_nickname(thread_id, &body.nickname)
        .await
    {
        Ok(check) => check,
        // A malformed name is simply not available.
        Err(AppError::Validation(message)) => services::NicknameCheck {
            available: false,
            message: Some(message),
        },
        Err(err) => return Err(err.into()),
    };
    let mut answer = json!({ "available": check.available });
    if let Some(message) = check.message {
        answer["message"] = Value::String(message);
    }
    Ok(Json(answer))
}

// ── Posts ───────────────────────────────────────────────────────────────────

pub async fn list_posts(
    State(state): State<AppState>,
    Path(thread_id): Path<ThreadId>,
) -> ApiResult<Json<Vec<Post>>> {
    Ok(Json(state.services.threads.list_posts(thread_id).await?))
}

/// Multipart posting path: `content`, optional `name`, optional `image` file.
pub async fn create_post(
    State(state): State<AppState>,
    Path(thread_id): Path<ThreadId>,
    ClientAddr(source): ClientAddr,
    bearer: Bearer,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Post>)> {
    let limit = state.services.images.policy().multipart_max_bytes;
    let mut content = String::new();
    let mut name: Option<String> = None;
    let mut image_type: Option<String> = None;
    let mut image: Option<Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::from_multipart(err, limit))?
    {
        let field_name = field.name().unwrap_or_default().to_owned();
        match field_name.as_str() {
            "content" => {
                content = field
                    .text()
                    .await
                    .map_err(|err| ApiError::from_multipart(err, limit))?;
            }
            "name" => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| ApiError::from_multipart(err, limit))?;
                name = Some(value).filter(|v| !v.trim().is_empty());
            }
            "image" => {
                image_type = field.content_type().map(str::to_owned);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| ApiError::from_multipart(err, limit))?;
                // Browsers send an empty part when no file was picked.
                if !bytes.is_empty() {
                    image = Some(bytes);
                }
            }
            _ => {}
        }
    }

    let mut submission = Submission::new(&source, thread_id, &content);
    submission.name = name.as_deref();
    submission.credential = bearer.as_deref();
    submission.image = image.map(|bytes| ImagePayload::Multipart {
        content_type: image_type.as_deref(),
        bytes,
    });

    match state.services.posting.submit(submission).await {
        Ok(post) => {
            state.metrics.post_accepted();
            Ok((StatusCode::CREATED, Json(post)))
        }
        Err(err) => {
            state.metrics.post_rejected(&err);
            Err(err.into())
        }
    }
}

pub async fn report_post(
    State(state): State<AppState>,
    Path((thread_id, post_id)): Path<(ThreadId, PostId)>,
    ClientAddr(source): ClientAddr,
    payload: Result<Json<ReportBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    if let Err(err) = state.services.post_gate.admit(&source) {
        state.metrics.rate_limited("post");
        return Err(err.into());
    }
    let Json(body) = payload?;
    state
        .services
        .moderation
        .report(thread_id, post_id, body.content.as_deref())
        .await?;
    state.metrics.post_deleted();
    Ok(Json(json!({ "message": "the post was removed" })))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Path((thread_id, post_id)): Path<(ThreadId, PostId)>,
    ClientAddr(source): ClientAddr,
    bearer: Bearer,
) -> ApiResult<Json<Post>> {
    let actor = state.services.auth.require(&source, bearer.as_deref()).await?;
    let removed = state
        .services
        .moderation
        .delete_post(thread_id, post_id, &actor)
        .await?;
    state.metrics.post_deleted();
    Ok(Json(removed))
}
