//! Auth endpoints: code issuance, code redemption, and the identity echo.
//!
//! These are the only routes outside the request gate (besides `/health`);
//! every failure maps to the fixed external codes of the auth core.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;

use crate::auth::{AuthEngine, RequestGate, UserBody};

use super::{auth_error_response, error_response, require_auth, ErrorBody};

pub(crate) mod types;

use types::{
    AuthResponse, LoginRequest, MeResponse, SendOtpRequest, SendOtpResponse, VerifyLoginOtpRequest,
    VerifyOtpRequest,
};

fn missing_payload() -> Response {
    error_response(StatusCode::BAD_REQUEST, "MissingPayload", "Missing payload")
}

/// Request an enrollment code for a campus address.
#[utoipa::path(
    post,
    path = "/auth/send-otp",
    request_body = SendOtpRequest,
    responses(
        (status = 200, description = "Code generated and mailed", body = SendOtpResponse),
        (status = 400, description = "Email domain not allowed", body = ErrorBody),
        (status = 500, description = "Mail delivery failed; retry with the same request", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn send_otp(
    engine: Extension<Arc<AuthEngine>>,
    payload: Option<Json<SendOtpRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    match engine.request_enrollment_code(&request.email).await {
        Ok(sent) => (StatusCode::OK, Json(SendOtpResponse { email: sent.email })).into_response(),
        Err(err) => auth_error_response(&err),
    }
}

/// Redeem an enrollment code, choosing the anonymous handle on first use.
#[utoipa::path(
    post,
    path = "/auth/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Account verified; bearer token issued", body = AuthResponse),
        (status = 400, description = "Unknown account, bad/expired code, or handle problem", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn verify_otp(
    engine: Extension<Arc<AuthEngine>>,
    payload: Option<Json<VerifyOtpRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    let outcome = engine
        .verify_enrollment_code(
            &request.email,
            &request.otp,
            request.anonymous_name.as_deref(),
        )
        .await;

    match outcome {
        Ok(auth) => (
            StatusCode::OK,
            Json(AuthResponse {
                token: auth.token,
                user: UserBody::from(&auth.account),
            }),
        )
            .into_response(),
        Err(err) => auth_error_response(&err),
    }
}

/// Request a login code for an existing verified account.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Code generated and mailed", body = SendOtpResponse),
        (status = 400, description = "No verified account for this email", body = ErrorBody),
        (status = 500, description = "Mail delivery failed; retry with the same request", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    engine: Extension<Arc<AuthEngine>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    match engine.request_login_code(&request.email).await {
        Ok(sent) => (StatusCode::OK, Json(SendOtpResponse { email: sent.email })).into_response(),
        Err(err) => auth_error_response(&err),
    }
}

/// Redeem a login code.
#[utoipa::path(
    post,
    path = "/auth/verify-login-otp",
    request_body = VerifyLoginOtpRequest,
    responses(
        (status = 200, description = "Login complete; bearer token issued", body = AuthResponse),
        (status = 400, description = "Unknown account or bad/expired code", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn verify_login_otp(
    engine: Extension<Arc<AuthEngine>>,
    payload: Option<Json<VerifyLoginOtpRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    match engine.verify_login_code(&request.email, &request.otp).await {
        Ok(auth) => (
            StatusCode::OK,
            Json(AuthResponse {
                token: auth.token,
                user: UserBody::from(&auth.account),
            }),
        )
            .into_response(),
        Err(err) => auth_error_response(&err),
    }
}

/// Echo the authenticated account.
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "The authenticated account", body = MeResponse),
        (status = 401, description = "Token required or account disabled", body = ErrorBody),
        (status = 403, description = "Token rejected", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn me(headers: HeaderMap, gate: Extension<Arc<RequestGate>>) -> impl IntoResponse {
    let principal = match require_auth(&headers, &gate).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    let user = UserBody {
        id: principal.account_id.to_string(),
        email: principal.email,
        handle: principal.handle,
        avatar: principal.avatar,
        verified: principal.verified,
    };
    (StatusCode::OK, Json(MeResponse { user })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        AuthConfig, IdentityStore, LogMailer, MemoryStore, OsRngCodes, SystemClock, TokenCodec,
    };
    use anyhow::Result;
    use axum::http::header::AUTHORIZATION;
    use axum::http::HeaderValue;
    use chrono::Duration;
    use secrecy::SecretString;

    struct Fixture {
        engine: Extension<Arc<AuthEngine>>,
        gate: Extension<Arc<RequestGate>>,
        store: Arc<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(SystemClock);
        let tokens = TokenCodec::new(&SecretString::from("handler-test-secret"), Duration::days(7));
        let engine = AuthEngine::new(
            store.clone(),
            Arc::new(LogMailer),
            Arc::new(OsRngCodes::new(Duration::minutes(10))),
            clock.clone(),
            tokens.clone(),
            AuthConfig::new(),
        );
        let gate = RequestGate::new(store.clone(), tokens, clock);
        Fixture {
            engine: Extension(Arc::new(engine)),
            gate: Extension(Arc::new(gate)),
            store,
        }
    }

    async fn stored_code(store: &MemoryStore, email: &str) -> String {
        store
            .load_by_email(email)
            .await
            .expect("load")
            .and_then(|a| a.pending)
            .map(|p| p.code)
            .expect("pending code")
    }

    #[tokio::test]
    async fn send_otp_missing_payload_is_400() {
        let f = fixture();
        let response = send_otp(f.engine, None).await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn send_otp_rejects_foreign_domain() {
        let f = fixture();
        let response = send_otp(
            f.engine,
            Some(Json(SendOtpRequest {
                email: "user@other.edu".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn full_enrollment_and_me_round_trip() -> Result<()> {
        let f = fixture();

        let response = send_otp(
            f.engine.clone(),
            Some(Json(SendOtpRequest {
                email: "alice@pec.edu.in".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let code = stored_code(&f.store, "alice@pec.edu.in").await;
        let response = verify_otp(
            f.engine.clone(),
            Some(Json(VerifyOtpRequest {
                email: "alice@pec.edu.in".to_string(),
                otp: code,
                anonymous_name: Some("BraveFox42".to_string()),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let auth: serde_json::Value = serde_json::from_slice(&body)?;
        let token = auth["token"].as_str().expect("token").to_string();
        assert_eq!(auth["user"]["handle"], "BraveFox42");

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))?,
        );
        let response = me(headers, f.gate.clone()).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        // Tampered token trips the gate with 403.
        let mut tampered = token.clone().into_bytes();
        let middle = tampered.len() / 2;
        tampered[middle] = if tampered[middle] == b'a' { b'b' } else { b'a' };
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!(
                "Bearer {}",
                String::from_utf8(tampered).expect("ascii")
            ))?,
        );
        let response = me(headers, f.gate).await.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        Ok(())
    }

    #[tokio::test]
    async fn login_for_unverified_account_is_400() {
        let f = fixture();
        let response = login(
            f.engine,
            Some(Json(LoginRequest {
                email: "ghost@pec.edu.in".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn me_without_token_is_401() {
        let f = fixture();
        let response = me(HeaderMap::new(), f.gate).await.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
