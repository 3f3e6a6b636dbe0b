//! Notification endpoints for the authenticated recipient.

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::RequestGate;

use super::{error_response, require_auth, ErrorBody, Paging};

pub(crate) mod storage;

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NotificationBody {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: String,
    pub sender: SenderBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<String>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct SenderBody {
    pub handle: String,
    pub avatar: Option<String>,
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    pub notifications: Vec<NotificationBody>,
    pub current_page: i64,
    pub has_more: bool,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct UnreadCount {
    pub count: i64,
}

fn not_found() -> axum::response::Response {
    error_response(
        StatusCode::NOT_FOUND,
        "NotFound",
        "Notification not found",
    )
}

/// List the recipient's notifications, newest first.
#[utoipa::path(
    get,
    path = "/notifications",
    responses(
        (status = 200, description = "One page of notifications", body = NotificationPage),
        (status = 401, description = "Token required or account disabled", body = ErrorBody)
    ),
    tag = "notifications"
)]
pub async fn list(
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
    match storage::list_notifications(&pool, principal.account_id, limit, offset).await {
        Ok(rows) => {
            let has_more = rows.len() as i64 == limit;
            let notifications = rows
                .into_iter()
                .map(|row| NotificationBody {
                    id: row.id.to_string(),
                    kind: row.kind,
                    message: row.message,
                    is_read: row.read,
                    created_at: row.created_at.to_rfc3339(),
                    sender: SenderBody {
                        handle: row.sender_handle,
                        avatar: row.sender_avatar,
                    },
                    post_id: row.post_id.map(|id| id.to_string()),
                    comment_id: row.comment_id.map(|id| id.to_string()),
                })
                .collect();
            (
                StatusCode::OK,
                Json(NotificationPage {
                    notifications,
                    current_page: paging.page.max(1),
                    has_more,
                }),
            )
                .into_response()
        }
        Err(err) => {
            error!("Failed to list notifications: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Count unread notifications.
#[utoipa::path(
    get,
    path = "/notifications/unread-count",
    responses(
        (status = 200, description = "Unread notification count", body = UnreadCount),
        (status = 401, description = "Token required or account disabled", body = ErrorBody)
    ),
    tag = "notifications"
)]
pub async fn unread_count(
    headers: HeaderMap,
    gate: Extension<Arc<RequestGate>>,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &gate).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    match storage::unread_count(&pool, principal.account_id).await {
        Ok(count) => (StatusCode::OK, Json(UnreadCount { count })).into_response(),
        Err(err) => {
            error!("Failed to count notifications: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Mark one notification as read.
#[utoipa::path(
    put,
    path = "/notifications/{id}/read",
    params(("id" = String, Path, description = "Notification id")),
    responses(
        (status = 204, description = "Marked read"),
        (status = 404, description = "Not the recipient's notification", body = ErrorBody)
    ),
    tag = "notifications"
)]
pub async fn mark_read(
    headers: HeaderMap,
    gate: Extension<Arc<RequestGate>>,
    pool: Extension<PgPool>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &gate).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    match storage::mark_read(&pool, principal.account_id, id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => not_found(),
        Err(err) => {
            error!("Failed to mark notification read: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Mark every unread notification as read.
#[utoipa::path(
    put,
    path = "/notifications/mark-all-read",
    responses(
        (status = 204, description = "All marked read"),
        (status = 401, description = "Token required or account disabled", body = ErrorBody)
    ),
    tag = "notifications"
)]
pub async fn mark_all_read(
    headers: HeaderMap,
    gate: Extension<Arc<RequestGate>>,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &gate).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    match storage::mark_all_read(&pool, principal.account_id).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("Failed to mark notifications read: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Delete one notification.
#[utoipa::path(
    delete,
    path = "/notifications/{id}",
    params(("id" = String, Path, description = "Notification id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not the recipient's notification", body = ErrorBody)
    ),
    tag = "notifications"
)]
pub async fn delete(
    headers: HeaderMap,
    gate: Extension<Arc<RequestGate>>,
    pool: Extension<PgPool>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &gate).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    match storage::delete_notification(&pool, principal.account_id, id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => not_found(),
        Err(err) => {
            error!("Failed to delete notification: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
