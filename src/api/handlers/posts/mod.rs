//! Post endpoints: publish, feed, detail, like, report, delete.

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::api::fanout::{dispatch, Fanout};
use crate::api::handlers::notifications::storage::NotificationKind;
use crate::api::handlers::{comments, users};
use crate::api::hub::NotificationHub;
use crate::auth::RequestGate;

use super::{error_response, require_auth, ErrorBody, Paging};

pub(crate) mod storage;
pub(crate) mod types;

use types::{
    CreatePostRequest, CreatePostResponse, FeedResponse, LikeResponse, PostBody, PostDetailBody,
    PostDetailResponse, ReportPostRequest, POST_MAX_CHARS,
};

fn post_not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "NotFound", "Post not found")
}

/// Publish a post with text and/or image URLs.
#[utoipa::path(
    post,
    path = "/posts",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Post created", body = CreatePostResponse),
        (status = 400, description = "Neither content nor images, or content too long", body = ErrorBody)
    ),
    tag = "posts"
)]
pub async fn create(
    headers: HeaderMap,
    gate: Extension<Arc<RequestGate>>,
    pool: Extension<PgPool>,
    payload: Option<Json<CreatePostRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &gate).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    let Some(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "MissingPayload", "Missing payload");
    };

    let content = request.content.as_deref().map(str::trim).unwrap_or_default();
    let images: Vec<String> = request
        .images
        .into_iter()
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .collect();

    if content.is_empty() && images.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "MissingContent",
            "Post must have content or images",
        );
    }
    if content.chars().count() > POST_MAX_CHARS {
        return error_response(
            StatusCode::BAD_REQUEST,
            "ContentTooLong",
            "Post must be at most 500 characters",
        );
    }

    let post_id = match storage::insert_post(&pool, principal.account_id, content, &images).await {
        Ok(id) => id,
        Err(err) => {
            error!("Failed to insert post: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match storage::post_by_id(&pool, principal.account_id, post_id).await {
        Ok(Some(row)) => (
            StatusCode::CREATED,
            Json(CreatePostResponse {
                message: "Post created successfully".to_string(),
                post: PostBody::from(row),
            }),
        )
            .into_response(),
        Ok(None) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        Err(err) => {
            error!("Failed to reload post: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Paginated feed, newest first; blocked authors never appear.
#[utoipa::path(
    get,
    path = "/posts",
    responses(
        (status = 200, description = "One page of the feed", body = FeedResponse),
        (status = 401, description = "Token required or account disabled", body = ErrorBody)
    ),
    tag = "posts"
)]
pub async fn feed(
    headers: HeaderMap,
    gate: Extension<Arc<RequestGate>>,
    pool: Extension<PgPool>,
    Query(paging): Query<Paging>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &gate).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    let (limit, offset) = paging.clamp();
    match storage::feed(&pool, principal.account_id, limit, offset).await {
        Ok(rows) => {
            let has_more = rows.len() as i64 == limit;
            (
                StatusCode::OK,
                Json(FeedResponse {
                    posts: rows.into_iter().map(PostBody::from).collect(),
                    current_page: paging.page.max(1),
                    has_more,
                }),
            )
                .into_response()
        }
        Err(err) => {
            error!("Failed to load feed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Single post with its comment thread.
#[utoipa::path(
    get,
    path = "/posts/{id}",
    params(("id" = String, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post with comments", body = PostDetailResponse),
        (status = 403, description = "Author is blocked by the viewer", body = ErrorBody),
        (status = 404, description = "No such post", body = ErrorBody)
    ),
    tag = "posts"
)]
pub async fn detail(
    headers: HeaderMap,
    gate: Extension<Arc<RequestGate>>,
    pool: Extension<PgPool>,
    Path(post_id): Path<Uuid>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &gate).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    let row = match storage::post_by_id(&pool, principal.account_id, post_id).await {
        Ok(Some(row)) => row,
        Ok(None) => return post_not_found(),
        Err(err) => {
            error!("Failed to load post: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match users::storage::is_blocked(&pool, principal.account_id, row.author_id).await {
        Ok(true) => {
            return error_response(
                StatusCode::FORBIDDEN,
                "Blocked",
                "You have blocked this user and cannot view their post",
            );
        }
        Ok(false) => {}
        Err(err) => {
            error!("Failed to check block edge: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    match comments::thread_for_post(&pool, principal.account_id, post_id, 50, 0).await {
        Ok(thread) => (
            StatusCode::OK,
            Json(PostDetailResponse {
                post: PostDetailBody {
                    post: PostBody::from(row),
                    comments: thread,
                },
            }),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to load comment thread: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Like or unlike a post; liking notifies the author.
#[utoipa::path(
    post,
    path = "/posts/{id}/like",
    params(("id" = String, Path, description = "Post id")),
    responses(
        (status = 200, description = "Toggled", body = LikeResponse),
        (status = 400, description = "Cannot like your own post", body = ErrorBody),
        (status = 403, description = "Author is blocked by the viewer", body = ErrorBody),
        (status = 404, description = "No such post", body = ErrorBody)
    ),
    tag = "posts"
)]
pub async fn toggle_like(
    headers: HeaderMap,
    gate: Extension<Arc<RequestGate>>,
    pool: Extension<PgPool>,
    hub: Extension<Arc<NotificationHub>>,
    Path(post_id): Path<Uuid>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &gate).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    let post = match storage::post_by_id(&pool, principal.account_id, post_id).await {
        Ok(Some(post)) => post,
        Ok(None) => return post_not_found(),
        Err(err) => {
            error!("Failed to load post: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if post.author_id == principal.account_id {
        return error_response(
            StatusCode::BAD_REQUEST,
            "SelfLike",
            "Cannot like your own post",
        );
    }

    match users::storage::is_blocked(&pool, principal.account_id, post.author_id).await {
        Ok(true) => {
            return error_response(
                StatusCode::FORBIDDEN,
                "Blocked",
                "You cannot like posts from a blocked user",
            );
        }
        Ok(false) => {}
        Err(err) => {
            error!("Failed to check block edge: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let liked = match storage::is_liked(&pool, post_id, principal.account_id).await {
        Ok(liked) => liked,
        Err(err) => {
            error!("Failed to check post like: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let outcome = if liked {
        storage::delete_like(&pool, post_id, principal.account_id).await
    } else {
        storage::insert_like(&pool, post_id, principal.account_id).await
    };
    if let Err(err) = outcome {
        error!("Failed to toggle post like: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    if !liked {
        let fanout = Fanout {
            recipient: post.author_id,
            kind: NotificationKind::Like,
            message: format!("{} liked your post", principal.handle),
            post_id: Some(post_id),
            comment_id: None,
            sender: &principal,
        };
        if let Err(err) = dispatch(&pool, &hub, fanout).await {
            error!("Failed to dispatch like notification: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    match storage::like_count(&pool, post_id).await {
        Ok(likes_count) => (
            StatusCode::OK,
            Json(LikeResponse {
                message: if liked {
                    "Post unliked".to_string()
                } else {
                    "Post liked".to_string()
                },
                is_liked: !liked,
                likes_count,
            }),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to count post likes: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Delete one's own post together with its thread.
#[utoipa::path(
    delete,
    path = "/posts/{id}",
    params(("id" = String, Path, description = "Post id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the post author", body = ErrorBody),
        (status = 404, description = "No such post", body = ErrorBody)
    ),
    tag = "posts"
)]
pub async fn delete(
    headers: HeaderMap,
    gate: Extension<Arc<RequestGate>>,
    pool: Extension<PgPool>,
    Path(post_id): Path<Uuid>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &gate).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    let post = match storage::post_by_id(&pool, principal.account_id, post_id).await {
        Ok(Some(post)) => post,
        Ok(None) => return post_not_found(),
        Err(err) => {
            error!("Failed to load post: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if post.author_id != principal.account_id {
        return error_response(
            StatusCode::FORBIDDEN,
            "NotAuthor",
            "Not authorized to delete this post",
        );
    }

    match storage::delete_post(&pool, post_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("Failed to delete post: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Report a post; one report per account, never one's own post.
#[utoipa::path(
    post,
    path = "/posts/{id}/report",
    params(("id" = String, Path, description = "Post id")),
    request_body = ReportPostRequest,
    responses(
        (status = 200, description = "Reported"),
        (status = 400, description = "Already reported or own post", body = ErrorBody),
        (status = 404, description = "No such post", body = ErrorBody)
    ),
    tag = "posts"
)]
pub async fn report(
    headers: HeaderMap,
    gate: Extension<Arc<RequestGate>>,
    pool: Extension<PgPool>,
    Path(post_id): Path<Uuid>,
    payload: Option<Json<ReportPostRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &gate).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    let post = match storage::post_by_id(&pool, principal.account_id, post_id).await {
        Ok(Some(post)) => post,
        Ok(None) => return post_not_found(),
        Err(err) => {
            error!("Failed to load post: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if post.author_id == principal.account_id {
        return error_response(
            StatusCode::BAD_REQUEST,
            "SelfReport",
            "Cannot report your own post",
        );
    }

    match storage::has_reported(&pool, post_id, principal.account_id).await {
        Ok(true) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "AlreadyReported",
                "You have already reported this post",
            );
        }
        Ok(false) => {}
        Err(err) => {
            error!("Failed to check post report: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let reason = payload
        .and_then(|Json(request)| request.reason)
        .unwrap_or_else(|| "Inappropriate content".to_string());

    match storage::insert_report(&pool, post_id, principal.account_id, &reason).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "message": "Post reported successfully" })),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to insert post report: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Posts by a given author, paginated.
#[utoipa::path(
    get,
    path = "/posts/user/{id}",
    params(("id" = String, Path, description = "Author account id")),
    responses(
        (status = 200, description = "One page of the author's posts", body = FeedResponse),
        (status = 401, description = "Token required or account disabled", body = ErrorBody)
    ),
    tag = "posts"
)]
pub async fn by_author(
    headers: HeaderMap,
    gate: Extension<Arc<RequestGate>>,
    pool: Extension<PgPool>,
    Path(author): Path<Uuid>,
    Query(paging): Query<Paging>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &gate).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    let (limit, offset) = paging.clamp();
    match storage::posts_by_author(&pool, principal.account_id, author, limit, offset).await {
        Ok(rows) => {
            let has_more = rows.len() as i64 == limit;
            (
                StatusCode::OK,
                Json(FeedResponse {
                    posts: rows.into_iter().map(PostBody::from).collect(),
                    current_page: paging.page.max(1),
                    has_more,
                }),
            )
                .into_response()
        }
        Err(err) => {
            error!("Failed to load author posts: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
