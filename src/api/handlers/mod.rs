//! HTTP handlers and the shared error/auth plumbing they build on.

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use crate::auth::{AuthError, GateError, Principal, RequestGate};

pub(crate) mod auth;
pub(crate) mod comments;
pub(crate) mod health;
pub(crate) mod notifications;
pub(crate) mod posts;
pub(crate) mod users;
pub(crate) mod ws;

/// Error envelope returned for every non-2xx reply.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    /// Stable machine-readable code, e.g. `InvalidCode`.
    pub code: String,
    pub message: String,
}

pub(crate) fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            code: code.to_string(),
            message: message.to_string(),
        }),
    )
        .into_response()
}

/// Map a core auth failure to its wire shape.
///
/// Infrastructure failures are logged with their source chain and surface as
/// bare 500s; the chain never reaches the client.
pub(crate) fn auth_error_response(err: &AuthError) -> Response {
    if err.is_infrastructure() {
        error!("auth operation failed: {err:?}");
    }
    let status = if err.is_infrastructure() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::BAD_REQUEST
    };
    error_response(status, err.code(), &err.to_string())
}

pub(crate) fn gate_error_response(err: &GateError) -> Response {
    let status = match err {
        GateError::TokenRequired | GateError::AccountDisabled => StatusCode::UNAUTHORIZED,
        GateError::TokenRejected => StatusCode::FORBIDDEN,
        GateError::Store(_) => {
            error!("request gate store failure: {err:?}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(status, err.code(), &err.to_string())
}

/// Run the request gate; handlers early-return the mapped response on refusal.
pub(crate) async fn require_auth(
    headers: &HeaderMap,
    gate: &Arc<RequestGate>,
) -> Result<Principal, Response> {
    gate.authorize(headers)
        .await
        .map_err(|err| gate_error_response(&err))
}

/// Paging parameters shared by feed-style endpoints (1-based page).
#[derive(Deserialize, Debug)]
pub(crate) struct Paging {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

const fn default_page() -> i64 {
    1
}

const fn default_limit() -> i64 {
    10
}

impl Paging {
    pub(crate) fn clamp(&self) -> (i64, i64) {
        let limit = self.limit.clamp(1, 50);
        let page = self.page.max(1);
        (limit, (page - 1) * limit)
    }
}

/// Service banner for `/`.
pub async fn root() -> impl IntoResponse {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_clamps_limit_and_offset() {
        let paging = Paging { page: 0, limit: 500 };
        assert_eq!(paging.clamp(), (50, 0));

        let paging = Paging { page: 3, limit: 10 };
        assert_eq!(paging.clamp(), (10, 20));

        let paging = Paging { page: -2, limit: 0 };
        assert_eq!(paging.clamp(), (1, 0));
    }

    #[test]
    fn auth_errors_map_to_their_status_codes() {
        let response = auth_error_response(&AuthError::DomainNotAllowed);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = auth_error_response(&AuthError::MailDeliveryFailed(anyhow::anyhow!("smtp")));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = auth_error_response(&AuthError::Store(anyhow::anyhow!("db")));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn gate_errors_map_to_their_status_codes() {
        assert_eq!(
            gate_error_response(&GateError::TokenRequired).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            gate_error_response(&GateError::TokenRejected).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            gate_error_response(&GateError::AccountDisabled).status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
