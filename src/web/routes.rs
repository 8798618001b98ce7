use crate::admission::AdmissionController;
use crate::config::ServerConfig;
use crate::error::AppResult;
use crate::lifecycle::{Ciphertext, Lifecycle, Retrieval};
use crate::store::AttachOutcome;
use crate::web::middleware::{
    admit, request_span, strip_client_request_id, MakeTraceId, REQUEST_ID_HEADER,
};
use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Application state for web handlers
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<Lifecycle>,
}

/// Body of a successful reservation
#[derive(Debug, Serialize)]
pub struct CodeResponse {
    pub code: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub redis: &'static str,
}

/// POST /code
///
/// Reserves a fresh code and points at the message resource.
pub async fn create_code(State(state): State<AppState>) -> AppResult<Response> {
    let code = state.lifecycle.request_new_code().await?;
    debug!("Code reserved");

    let location = format!("/message/{code}");
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(CodeResponse {
            code: code.to_string(),
        }),
    )
        .into_response())
}

/// PUT /message/{code}
///
/// Attaches base64 ciphertext to a reserved code. Malformed bodies and
/// unknown codes both answer 400 so the endpoint cannot be used to probe for
/// live codes.
pub async fn put_message(
    Path(code): Path<String>,
    State(state): State<AppState>,
    body: String,
) -> AppResult<StatusCode> {
    let blob = Ciphertext::parse(&body)?;

    match state.lifecycle.attach_secret(&code, &blob).await? {
        AttachOutcome::Attached => {
            info!("Secret attached");
            Ok(StatusCode::NO_CONTENT)
        }
        AttachOutcome::Conflict => {
            warn!("Attach conflict");
            Ok(StatusCode::CONFLICT)
        }
        AttachOutcome::NotFound => {
            debug!("Attach to absent code");
            Ok(StatusCode::BAD_REQUEST)
        }
    }
}

/// GET /message/{code}
///
/// Returns the ciphertext once and destroys it.
pub async fn get_message(
    Path(code): Path<String>,
    State(state): State<AppState>,
) -> AppResult<Response> {
    match state.lifecycle.retrieve_secret(&code).await? {
        Retrieval::Secret(blob) => {
            info!("Secret burned");
            Ok((
                [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))],
                blob,
            )
                .into_response())
        }
        Retrieval::NotFound => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

/// GET /health
///
/// Always 200; only the backend field reflects the store.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let redis = if state.lifecycle.health_check().await.is_ok() {
        "ok"
    } else {
        "error"
    };
    Json(HealthResponse { status: "ok", redis })
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }

    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|origin| {
            HeaderValue::from_str(origin)
                .inspect_err(|_| warn!("Ignoring unparsable CORS origin: {}", origin))
                .ok()
        }))
    };

    Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::PUT, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, REQUEST_ID_HEADER])
            .expose_headers([header::LOCATION, REQUEST_ID_HEADER]),
    )
}

/// Create the web router
pub fn create_router(
    state: AppState,
    admission: Arc<AdmissionController>,
    config: &ServerConfig,
) -> Router {
    let layers = ServiceBuilder::new()
        .layer(middleware::from_fn(strip_client_request_id))
        .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeTraceId))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::PRAGMA,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(middleware::from_fn_with_state(admission, admit));

    let router = Router::new()
        .route("/code", post(create_code))
        .route("/message/{code}", get(get_message).put(put_message))
        .route("/health", get(health))
        .with_state(state)
        .layer(layers);

    // Outermost, so preflights are answered without spending a token
    match cors_layer(&config.allowed_origins) {
        Some(cors) => router.layer(cors),
        None => router,
    }
}
