//! Comment and reply endpoints.

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::fanout::{dispatch, Fanout};
use crate::api::handlers::notifications::storage::NotificationKind;
use crate::api::handlers::{posts, users};
use crate::api::hub::NotificationHub;
use crate::auth::{Principal, RequestGate};

use super::{error_response, require_auth, ErrorBody, Paging};

pub(crate) mod storage;

/// Maximum length of a comment or reply body.
pub(crate) const COMMENT_MAX_CHARS: usize = 200;

#[derive(ToSchema, Serialize, Debug)]
pub struct CommentAuthor {
    pub id: String,
    pub handle: String,
    pub avatar: Option<String>,
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CommentBody {
    pub id: String,
    pub post_id: String,
    pub author: CommentAuthor,
    pub content: String,
    pub created_at: String,
    pub is_liked: bool,
    pub likes_count: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<CommentBody>,
}

impl CommentBody {
    fn from_row(row: storage::CommentRow) -> Self {
        Self {
            id: row.id.to_string(),
            post_id: row.post_id.to_string(),
            author: CommentAuthor {
                id: row.author_id.to_string(),
                handle: row.author_handle,
                avatar: row.author_avatar,
            },
            content: row.content,
            created_at: row.created_at.to_rfc3339(),
            is_liked: row.is_liked,
            likes_count: row.likes_count,
            replies: Vec::new(),
        }
    }
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct CreateCommentRequest {
    pub content: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct CreateCommentResponse {
    pub message: String,
    pub comment: CommentBody,
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CommentPage {
    pub comments: Vec<CommentBody>,
    pub current_page: i64,
    pub has_more: bool,
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CommentLikeResponse {
    pub message: String,
    pub is_liked: bool,
    pub likes_count: i64,
}

/// One page of a post's thread: top-level comments with replies attached.
pub(crate) async fn thread_for_post(
    pool: &PgPool,
    viewer: Uuid,
    post: Uuid,
    limit: i64,
    offset: i64,
) -> anyhow::Result<Vec<CommentBody>> {
    let top_level = storage::comments_for_post(pool, viewer, post, limit, offset).await?;
    let parents: Vec<Uuid> = top_level.iter().map(|row| row.id).collect();
    let replies = storage::replies_for(pool, viewer, &parents).await?;

    let mut bodies: Vec<CommentBody> = top_level.into_iter().map(CommentBody::from_row).collect();
    for reply in replies {
        let parent = reply.parent_id;
        let body = CommentBody::from_row(reply);
        if let Some(parent) = parent {
            if let Some(slot) = bodies.iter_mut().find(|b| b.id == parent.to_string()) {
                slot.replies.push(body);
            }
        }
    }
    Ok(bodies)
}

fn validated_content(content: &str) -> Result<&str, Response> {
    let content = content.trim();
    if content.is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "MissingContent",
            "Comment content is required",
        ));
    }
    if content.chars().count() > COMMENT_MAX_CHARS {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "ContentTooLong",
            "Comment must be at most 200 characters",
        ));
    }
    Ok(content)
}

async fn blocked_author_guard(
    pool: &PgPool,
    principal: &Principal,
    author: Uuid,
    message: &str,
) -> Option<Response> {
    match users::storage::is_blocked(pool, principal.account_id, author).await {
        Ok(true) => Some(error_response(StatusCode::FORBIDDEN, "Blocked", message)),
        Ok(false) => None,
        Err(err) => {
            error!("Failed to check block edge: {err}");
            Some(StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
    }
}

/// Comment on a post; notifies the post author unless commenting on one's own.
#[utoipa::path(
    post,
    path = "/comments/post/{id}",
    params(("id" = String, Path, description = "Post id")),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment created", body = CreateCommentResponse),
        (status = 400, description = "Missing or over-long content", body = ErrorBody),
        (status = 403, description = "Post author is blocked", body = ErrorBody),
        (status = 404, description = "No such post", body = ErrorBody)
    ),
    tag = "comments"
)]
pub async fn create(
    headers: HeaderMap,
    gate: Extension<Arc<RequestGate>>,
    pool: Extension<PgPool>,
    hub: Extension<Arc<NotificationHub>>,
    Path(post_id): Path<Uuid>,
    payload: Option<Json<CreateCommentRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &gate).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    let Some(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "MissingPayload", "Missing payload");
    };
    let content = match validated_content(&request.content) {
        Ok(content) => content,
        Err(response) => return response,
    };

    let post = match posts::storage::post_by_id(&pool, principal.account_id, post_id).await {
        Ok(Some(post)) => post,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "NotFound", "Post not found"),
        Err(err) => {
            error!("Failed to load post for comment: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if let Some(response) = blocked_author_guard(
        &pool,
        &principal,
        post.author_id,
        "You cannot comment on posts from a blocked user",
    )
    .await
    {
        return response;
    }

    let comment_id =
        match storage::insert_comment(&pool, post_id, principal.account_id, None, content).await {
            Ok(id) => id,
            Err(err) => {
                error!("Failed to insert comment: {err}");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

    if post.author_id != principal.account_id {
        let fanout = Fanout {
            recipient: post.author_id,
            kind: NotificationKind::Comment,
            message: format!("{} commented on your post", principal.handle),
            post_id: Some(post_id),
            comment_id: Some(comment_id),
            sender: &principal,
        };
        if let Err(err) = dispatch(&pool, &hub, fanout).await {
            error!("Failed to dispatch comment notification: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    match storage::load_comment(&pool, principal.account_id, comment_id).await {
        Ok(Some(row)) => (
            StatusCode::CREATED,
            Json(CreateCommentResponse {
                message: "Comment created successfully".to_string(),
                comment: CommentBody::from_row(row),
            }),
        )
            .into_response(),
        Ok(None) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        Err(err) => {
            error!("Failed to reload comment: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// List a post's comments, newest first, replies nested.
#[utoipa::path(
    get,
    path = "/comments/post/{id}",
    params(("id" = String, Path, description = "Post id")),
    responses(
        (status = 200, description = "One page of the thread", body = CommentPage),
        (status = 401, description = "Token required or account disabled", body = ErrorBody)
    ),
    tag = "comments"
)]
pub async fn list(
    headers: HeaderMap,
    gate: Extension<Arc<RequestGate>>,
    pool: Extension<PgPool>,
    Path(post_id): Path<Uuid>,
    Query(paging): Query<Paging>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &gate).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    let (limit, offset) = paging.clamp();
    match thread_for_post(&pool, principal.account_id, post_id, limit, offset).await {
        Ok(comments) => {
            let has_more = comments.len() as i64 == limit;
            (
                StatusCode::OK,
                Json(CommentPage {
                    comments,
                    current_page: paging.page.max(1),
                    has_more,
                }),
            )
                .into_response()
        }
        Err(err) => {
            error!("Failed to list comments: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Like or unlike a comment.
#[utoipa::path(
    post,
    path = "/comments/{id}/like",
    params(("id" = String, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Toggled", body = CommentLikeResponse),
        (status = 404, description = "No such comment", body = ErrorBody)
    ),
    tag = "comments"
)]
pub async fn toggle_like(
    headers: HeaderMap,
    gate: Extension<Arc<RequestGate>>,
    pool: Extension<PgPool>,
    Path(comment_id): Path<Uuid>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &gate).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    match storage::comment_meta(&pool, comment_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "NotFound", "Comment not found"),
        Err(err) => {
            error!("Failed to load comment: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let liked = match storage::is_liked(&pool, comment_id, principal.account_id).await {
        Ok(liked) => liked,
        Err(err) => {
            error!("Failed to check comment like: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let outcome = if liked {
        storage::delete_like(&pool, comment_id, principal.account_id).await
    } else {
        storage::insert_like(&pool, comment_id, principal.account_id).await
    };
    if let Err(err) = outcome {
        error!("Failed to toggle comment like: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    match storage::like_count(&pool, comment_id).await {
        Ok(likes_count) => (
            StatusCode::OK,
            Json(CommentLikeResponse {
                message: if liked {
                    "Comment unliked".to_string()
                } else {
                    "Comment liked".to_string()
                },
                is_liked: !liked,
                likes_count,
            }),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to count comment likes: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Reply to a comment; notifies the comment author unless replying to oneself.
#[utoipa::path(
    post,
    path = "/comments/{id}/reply",
    params(("id" = String, Path, description = "Parent comment id")),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Reply created", body = CreateCommentResponse),
        (status = 400, description = "Missing or over-long content", body = ErrorBody),
        (status = 404, description = "No such comment", body = ErrorBody)
    ),
    tag = "comments"
)]
pub async fn reply(
    headers: HeaderMap,
    gate: Extension<Arc<RequestGate>>,
    pool: Extension<PgPool>,
    hub: Extension<Arc<NotificationHub>>,
    Path(comment_id): Path<Uuid>,
    payload: Option<Json<CreateCommentRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &gate).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    let Some(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "MissingPayload", "Missing payload");
    };
    let content = match validated_content(&request.content) {
        Ok(content) => content,
        Err(response) => return response,
    };

    let parent = match storage::comment_meta(&pool, comment_id).await {
        Ok(Some(parent)) => parent,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "NotFound", "Comment not found"),
        Err(err) => {
            error!("Failed to load parent comment: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if let Some(response) = blocked_author_guard(
        &pool,
        &principal,
        parent.author_id,
        "You cannot reply to a blocked user",
    )
    .await
    {
        return response;
    }

    // Replies always attach to the top-level comment so threads stay one
    // level deep.
    let thread_root = parent.parent_id.unwrap_or(comment_id);
    let reply_id = match storage::insert_comment(
        &pool,
        parent.post_id,
        principal.account_id,
        Some(thread_root),
        content,
    )
    .await
    {
        Ok(id) => id,
        Err(err) => {
            error!("Failed to insert reply: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if parent.author_id != principal.account_id {
        let fanout = Fanout {
            recipient: parent.author_id,
            kind: NotificationKind::Reply,
            message: format!("{} replied to your comment", principal.handle),
            post_id: Some(parent.post_id),
            comment_id: Some(reply_id),
            sender: &principal,
        };
        if let Err(err) = dispatch(&pool, &hub, fanout).await {
            error!("Failed to dispatch reply notification: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    match storage::load_comment(&pool, principal.account_id, reply_id).await {
        Ok(Some(row)) => (
            StatusCode::CREATED,
            Json(CreateCommentResponse {
                message: "Reply created successfully".to_string(),
                comment: CommentBody::from_row(row),
            }),
        )
            .into_response(),
        Ok(None) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        Err(err) => {
            error!("Failed to reload reply: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Delete one's own comment (replies go with it).
#[utoipa::path(
    delete,
    path = "/comments/{id}",
    params(("id" = String, Path, description = "Comment id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the comment author", body = ErrorBody),
        (status = 404, description = "No such comment", body = ErrorBody)
    ),
    tag = "comments"
)]
pub async fn delete(
    headers: HeaderMap,
    gate: Extension<Arc<RequestGate>>,
    pool: Extension<PgPool>,
    Path(comment_id): Path<Uuid>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &gate).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    let meta = match storage::comment_meta(&pool, comment_id).await {
        Ok(Some(meta)) => meta,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "NotFound", "Comment not found"),
        Err(err) => {
            error!("Failed to load comment: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if meta.author_id != principal.account_id {
        return error_response(
            StatusCode::FORBIDDEN,
            "NotAuthor",
            "Not authorized to delete this comment",
        );
    }

    match storage::delete_comment(&pool, comment_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("Failed to delete comment: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
