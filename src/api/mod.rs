//! HTTP+WebSocket surface: router assembly, middleware stack, and serving.

use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::get,
    Extension,
};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;
use utoipa_axum::router::OpenApiRouter;

use crate::auth::{
    AuthConfig, AuthEngine, Clock, IdentityStore, LogMailer, Mailer, OsRngCodes, PgIdentityStore,
    RequestGate, SmtpConfig, SmtpMailer, SystemClock, TokenCodec,
};

pub(crate) mod fanout;
pub(crate) mod handlers;
pub(crate) mod hub;
mod openapi;

pub use openapi::openapi;

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Everything the server needs besides port and DSN.
pub struct ServerConfig {
    pub jwt_secret: SecretString,
    pub token_ttl_seconds: i64,
    pub auth: AuthConfig,
    pub smtp: Option<SmtpConfig>,
    pub frontend_origin: String,
}

/// Start the server.
/// # Errors
/// Returns an error if the database, mail transport, or listener cannot be
/// set up, or the server fails while serving.
pub async fn new(port: u16, dsn: String, config: ServerConfig) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let store: Arc<dyn IdentityStore> = Arc::new(PgIdentityStore::new(pool.clone()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let tokens = TokenCodec::new(
        &config.jwt_secret,
        chrono::Duration::seconds(config.token_ttl_seconds),
    );

    // Without SMTP settings codes are only logged, which is what local dev
    // wants.
    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpMailer::new(smtp).context("Failed to build SMTP mailer")?),
        None => Arc::new(LogMailer),
    };

    let codes = Arc::new(OsRngCodes::new(config.auth.code_ttl()));
    let engine = Arc::new(AuthEngine::new(
        store.clone(),
        mailer,
        codes,
        clock.clone(),
        tokens.clone(),
        config.auth,
    ));
    let gate = Arc::new(RequestGate::new(store, tokens, clock));
    let hub = Arc::new(hub::NotificationHub::new());

    let origin = frontend_origin(&config.frontend_origin)?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(AllowOrigin::exact(origin))
        .allow_credentials(true);

    // Documented routes come from the OpenAPI wiring; `/` and `/ws` stay
    // out of the generated document.
    let (router, _openapi) = router().split_for_parts();
    let app = router
        .route("/", get(handlers::root))
        .route("/ws", get(handlers::ws::upgrade))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(engine))
                .layer(Extension(gate))
                .layer(Extension(hub))
                .layer(Extension(pool.clone())),
        )
        .layer(Extension(pool));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}
