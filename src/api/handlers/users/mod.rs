//! Profile and social-graph endpoints.

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
use crate::api::hub::NotificationHub;
use crate::auth::models::HANDLE_MAX_CHARS;
use crate::auth::RequestGate;

use super::{error_response, require_auth, ErrorBody};

pub(crate) mod storage;

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProfileBody {
    pub id: String,
    pub handle: String,
    pub avatar: Option<String>,
    pub post_count: i64,
    pub follower_count: i64,
    pub following_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_following: Option<bool>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct ProfileResponse {
    pub user: ProfileBody,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct UpdateProfileRequest {
    #[serde(rename = "anonymousName", default)]
    pub anonymous_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FollowResponse {
    pub message: String,
    pub is_following: bool,
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BlockResponse {
    pub message: String,
    pub is_blocked: bool,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct SearchHit {
    pub handle: String,
    pub avatar: Option<String>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct SearchResponse {
    pub users: Vec<SearchHit>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct SearchParams {
    #[serde(default)]
    query: String,
}

fn user_not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "NotFound", "User not found")
}

fn profile_response(row: storage::ProfileRow, is_following: Option<bool>) -> Response {
    (
        StatusCode::OK,
        Json(ProfileResponse {
            user: ProfileBody {
                id: row.id.to_string(),
                handle: row.handle,
                avatar: row.avatar,
                post_count: row.post_count,
                follower_count: row.follower_count,
                following_count: row.following_count,
                is_following,
            },
        }),
    )
        .into_response()
}

/// Own profile with graph counts; the email stays private to `/auth/me`.
#[utoipa::path(
    get,
    path = "/users/profile",
    responses(
        (status = 200, description = "Profile of the authenticated account", body = ProfileResponse),
        (status = 401, description = "Token required or account disabled", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn get_profile(
    headers: HeaderMap,
    gate: Extension<Arc<RequestGate>>,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &gate).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    match storage::profile_by_id(&pool, principal.account_id).await {
        Ok(Some(row)) => profile_response(row, None),
        Ok(None) => user_not_found(),
        Err(err) => {
            error!("Failed to load profile: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Update handle and/or avatar URL.
#[utoipa::path(
    put,
    path = "/users/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = ProfileResponse),
        (status = 400, description = "Invalid or taken handle", body = ErrorBody),
        (status = 401, description = "Token required or account disabled", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn update_profile(
    headers: HeaderMap,
    gate: Extension<Arc<RequestGate>>,
    pool: Extension<PgPool>,
    payload: Option<Json<UpdateProfileRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &gate).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    let Some(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "MissingPayload", "Missing payload");
    };

    let handle = request
        .anonymous_name
        .as_deref()
        .map(str::trim)
        .filter(|h| !h.is_empty() && *h != principal.handle);
    if let Some(handle) = handle {
        if handle.chars().count() > HANDLE_MAX_CHARS {
            return error_response(
                StatusCode::BAD_REQUEST,
                "InvalidHandle",
                "Anonymous name must be 1-20 characters",
            );
        }
        match storage::handle_taken(&pool, handle, principal.account_id).await {
            Ok(true) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "HandleTaken",
                    "Anonymous name already taken",
                );
            }
            Ok(false) => {}
            Err(err) => {
                error!("Failed to check handle: {err}");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    }

    let avatar = request.avatar.as_deref().map(str::trim).filter(|a| !a.is_empty());
    if let Err(err) = storage::update_profile(&pool, principal.account_id, handle, avatar).await {
        error!("Failed to update profile: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    match storage::profile_by_id(&pool, principal.account_id).await {
        Ok(Some(row)) => profile_response(row, None),
        Ok(None) => user_not_found(),
        Err(err) => {
            error!("Failed to reload profile: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Follow or unfollow another account; following notifies the target.
#[utoipa::path(
    post,
    path = "/users/{id}/follow",
    params(("id" = String, Path, description = "Account id to toggle")),
    responses(
        (status = 200, description = "Toggled", body = FollowResponse),
        (status = 400, description = "Cannot follow yourself", body = ErrorBody),
        (status = 404, description = "No such account", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn toggle_follow(
    headers: HeaderMap,
    gate: Extension<Arc<RequestGate>>,
    pool: Extension<PgPool>,
    hub: Extension<Arc<NotificationHub>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &gate).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    if id == principal.account_id {
        return error_response(
            StatusCode::BAD_REQUEST,
            "SelfFollow",
            "Cannot follow yourself",
        );
    }

    match storage::account_exists(&pool, id).await {
        Ok(true) => {}
        Ok(false) => return user_not_found(),
        Err(err) => {
            error!("Failed to check follow target: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let following = match storage::is_following(&pool, principal.account_id, id).await {
        Ok(following) => following,
        Err(err) => {
            error!("Failed to check follow edge: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let outcome = if following {
        storage::delete_follow(&pool, principal.account_id, id).await
    } else {
        storage::insert_follow(&pool, principal.account_id, id).await
    };
    if let Err(err) = outcome {
        error!("Failed to toggle follow: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    if !following {
        let fanout = Fanout {
            recipient: id,
            kind: NotificationKind::Follow,
            message: format!("{} started following you", principal.handle),
            post_id: None,
            comment_id: None,
            sender: &principal,
        };
        if let Err(err) = dispatch(&pool, &hub, fanout).await {
            error!("Failed to dispatch follow notification: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    (
        StatusCode::OK,
        Json(FollowResponse {
            message: if following {
                "Unfollowed successfully".to_string()
            } else {
                "Followed successfully".to_string()
            },
            is_following: !following,
        }),
    )
        .into_response()
}

/// Block or unblock another account; blocking severs the follow edges.
#[utoipa::path(
    post,
    path = "/users/{id}/block",
    params(("id" = String, Path, description = "Account id to toggle")),
    responses(
        (status = 200, description = "Toggled", body = BlockResponse),
        (status = 400, description = "Cannot block yourself", body = ErrorBody),
        (status = 404, description = "No such account", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn toggle_block(
    headers: HeaderMap,
    gate: Extension<Arc<RequestGate>>,
    pool: Extension<PgPool>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &gate).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    if id == principal.account_id {
        return error_response(StatusCode::BAD_REQUEST, "SelfBlock", "Cannot block yourself");
    }

    match storage::account_exists(&pool, id).await {
        Ok(true) => {}
        Ok(false) => return user_not_found(),
        Err(err) => {
            error!("Failed to check block target: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let blocked = match storage::is_blocked(&pool, principal.account_id, id).await {
        Ok(blocked) => blocked,
        Err(err) => {
            error!("Failed to check block edge: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let outcome = if blocked {
        storage::delete_block(&pool, principal.account_id, id).await
    } else {
        storage::insert_block(&pool, principal.account_id, id).await
    };
    if let Err(err) = outcome {
        error!("Failed to toggle block: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        Json(BlockResponse {
            message: if blocked {
                "User unblocked successfully".to_string()
            } else {
                "User blocked successfully".to_string()
            },
            is_blocked: !blocked,
        }),
    )
        .into_response()
}

/// Public profile by handle, with the viewer's follow state.
#[utoipa::path(
    get,
    path = "/users/name/{handle}",
    params(("handle" = String, Path, description = "Anonymous handle")),
    responses(
        (status = 200, description = "Public profile", body = ProfileResponse),
        (status = 404, description = "No such handle", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn get_by_handle(
    headers: HeaderMap,
    gate: Extension<Arc<RequestGate>>,
    pool: Extension<PgPool>,
    Path(handle): Path<String>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &gate).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    let row = match storage::profile_by_handle(&pool, &handle).await {
        Ok(Some(row)) => row,
        Ok(None) => return user_not_found(),
        Err(err) => {
            error!("Failed to load profile by handle: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let is_following = match storage::is_following(&pool, principal.account_id, row.id).await {
        Ok(is_following) => is_following,
        Err(err) => {
            error!("Failed to check follow edge: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    profile_response(row, Some(is_following))
}

/// Case-insensitive handle search over verified accounts.
#[utoipa::path(
    get,
    path = "/users/search",
    params(("query" = String, Query, description = "Substring to match")),
    responses(
        (status = 200, description = "Up to ten matching handles", body = SearchResponse),
        (status = 401, description = "Token required or account disabled", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn search(
    headers: HeaderMap,
    gate: Extension<Arc<RequestGate>>,
    pool: Extension<PgPool>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    if let Err(response) = require_auth(&headers, &gate).await {
        return response;
    }

    let needle = params.query.trim();
    if needle.is_empty() {
        return (StatusCode::OK, Json(SearchResponse { users: Vec::new() })).into_response();
    }

    match storage::search_handles(&pool, needle, 10).await {
        Ok(hits) => (
            StatusCode::OK,
            Json(SearchResponse {
                users: hits
                    .into_iter()
                    .map(|(handle, avatar)| SearchHit { handle, avatar })
                    .collect(),
            }),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to search handles: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_body_uses_wire_field_names() {
        let body = ProfileBody {
            id: "u1".to_string(),
            handle: "BraveFox42".to_string(),
            avatar: None,
            post_count: 3,
            follower_count: 2,
            following_count: 1,
            is_following: Some(true),
        };
        let value = serde_json::to_value(&body).expect("serialize");
        assert_eq!(value["postCount"], 3);
        assert_eq!(value["followerCount"], 2);
        assert_eq!(value["isFollowing"], true);
    }

    #[test]
    fn update_request_accepts_camel_case() {
        let value = serde_json::json!({ "anonymousName": "QuickHawk7" });
        let request: UpdateProfileRequest = serde_json::from_value(value).expect("decode");
        assert_eq!(request.anonymous_name.as_deref(), Some("QuickHawk7"));
        assert!(request.avatar.is_none());
    }
}
