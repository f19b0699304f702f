//! HTTP routes
//!
//! The service surface: the authorization redirect and callback, the
//! listening-data and playback endpoints backed by the resource gateway,
//! sign-out, and the operational health/metrics endpoints. Handlers
//! translate the typed credential and gateway failures into JSON error
//! responses; they never perform token work themselves.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use spotify_auth::{AUTHORIZE_PATH, AuthError, SCOPES};
use spotify_session::{RemoteResult, ResourceGateway, SessionManager};

const TOP_TRACKS_PATH: &str = "/v1/me/top/tracks?limit=10";
const CURRENTLY_PLAYING_PATH: &str = "/v1/me/player/currently-playing";
const PLAY_PATH: &str = "/v1/me/player/play";
const PAUSE_PATH: &str = "/v1/me/player/pause";

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SessionManager>,
    pub gateway: Arc<ResourceGateway>,
    pub client_id: String,
    pub redirect_uri: String,
    pub accounts_url: String,
    /// CSRF state issued by the last /login redirect, consumed by /callback
    pub pending_state: Arc<RwLock<Option<String>>>,
    pub started_at: Instant,
    pub requests_total: Arc<AtomicU64>,
    pub prometheus: PrometheusHandle,
}

impl AppState {
    fn track(&self, endpoint: &str, response: &Response, started: Instant) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_request(
            endpoint,
            response.status().as_u16(),
            started.elapsed().as_secs_f64(),
        );
    }
}

/// Build the axum router with all routes and shared state.
///
/// A concurrency limit layer enforces the configured max concurrent
/// request bound.
pub fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/login", get(login_handler))
        .route("/callback", get(callback_handler))
        .route("/spotify", get(listening_handler))
        .route("/spotify/play", post(play_handler))
        .route("/spotify/pause", post(pause_handler))
        .route("/logout", post(logout_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

fn new_request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// JSON error shape: {"error":{"type":..,"message":..,"request_id":..}}
fn error_response(status: StatusCode, kind: &str, message: &str, request_id: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": kind,
            "message": message,
            "request_id": request_id,
        }
    });
    json_response(status, body)
}

fn unauthenticated_response(request_id: &str) -> Response {
    error_response(
        StatusCode::UNAUTHORIZED,
        "unauthenticated",
        "no valid credential — visit /login to authorize",
        request_id,
    )
}

fn upstream_error_response(status: u16, body: &str, request_id: &str) -> Response {
    error_response(
        StatusCode::BAD_GATEWAY,
        "upstream_error",
        &format!("spotify returned {status}: {body}"),
        request_id,
    )
}

fn auth_error_response(err: &AuthError, request_id: &str) -> Response {
    match err {
        AuthError::Unauthenticated
        | AuthError::ReauthorizationRequired
        | AuthError::RefreshRevoked(_) => error_response(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            &format!("{err} — visit /login to authorize"),
            request_id,
        ),
        AuthError::NetworkTimeout(_) => error_response(
            StatusCode::GATEWAY_TIMEOUT,
            "upstream_timeout",
            &err.to_string(),
            request_id,
        ),
        AuthError::RemoteRejected { .. } | AuthError::Transport(_) => error_response(
            StatusCode::BAD_GATEWAY,
            "upstream_error",
            &err.to_string(),
            request_id,
        ),
    }
}

/// Redirect the user to the accounts authorization page.
async fn login_handler(State(state): State<AppState>) -> Response {
    let csrf = uuid::Uuid::new_v4().as_simple().to_string();
    *state.pending_state.write().await = Some(csrf.clone());

    let url = authorize_url(
        &state.accounts_url,
        &state.client_id,
        &state.redirect_uri,
        &csrf,
    );
    info!("redirecting to authorization endpoint");
    Redirect::temporary(&url).into_response()
}

/// Build the user-approval URL on the accounts service.
fn authorize_url(accounts_url: &str, client_id: &str, redirect_uri: &str, csrf: &str) -> String {
    format!(
        "{}{AUTHORIZE_PATH}?client_id={client_id}&response_type=code&redirect_uri={}&scope={}&state={csrf}",
        accounts_url.trim_end_matches('/'),
        urlencoded(redirect_uri),
        urlencoded(SCOPES),
    )
}

/// Minimal URL encoding for parameter values.
/// Only encodes characters that would break URL parameter parsing.
fn urlencoded(s: &str) -> String {
    s.replace(' ', "%20")
        .replace(':', "%3A")
        .replace('/', "%2F")
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Authorization callback: verify the CSRF state, exchange the code.
async fn callback_handler(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let started = Instant::now();
    let response = handle_callback(&state, params).await;
    state.track("callback", &response, started);
    response
}

async fn handle_callback(state: &AppState, params: CallbackParams) -> Response {
    let request_id = new_request_id();

    if let Some(reason) = params.error {
        warn!(reason = %reason, "authorization denied");
        return error_response(
            StatusCode::BAD_REQUEST,
            "authorization_denied",
            &format!("authorization failed: {reason}"),
            &request_id,
        );
    }

    // The state a /login redirect issued must come back unchanged
    if let Some(expected) = state.pending_state.write().await.take() {
        if params.state.as_deref() != Some(expected.as_str()) {
            warn!("callback state mismatch");
            return error_response(
                StatusCode::BAD_REQUEST,
                "state_mismatch",
                "authorization state did not match the issued value",
                &request_id,
            );
        }
    }

    let Some(code) = params.code else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "missing_code",
            "callback carried no authorization code",
            &request_id,
        );
    };

    match state.session.complete_authorization(&code).await {
        Ok(()) => json_response(StatusCode::OK, serde_json::json!({"status": "authorized"})),
        Err(err) => {
            warn!(error = %err, "authorization code exchange failed");
            auth_error_response(&err, &request_id)
        }
    }
}

/// Aggregate listening data: top tracks plus whatever is playing now.
async fn listening_handler(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let response = fetch_listening(&state).await;
    state.track("spotify", &response, started);
    response
}

async fn fetch_listening(state: &AppState) -> Response {
    let request_id = new_request_id();

    let top_tracks = match state.gateway.get(TOP_TRACKS_PATH).await {
        RemoteResult::Ok(value) => value,
        RemoteResult::OkEmpty => serde_json::Value::Null,
        RemoteResult::Unauthenticated => return unauthenticated_response(&request_id),
        RemoteResult::RemoteError { status, body } => {
            return upstream_error_response(status, &body, &request_id);
        }
    };

    let currently_playing = match state.gateway.get(CURRENTLY_PLAYING_PATH).await {
        RemoteResult::Ok(value) => value,
        // The player endpoint answers 204 when nothing is playing
        RemoteResult::OkEmpty => serde_json::json!("No track is currently playing."),
        RemoteResult::Unauthenticated => return unauthenticated_response(&request_id),
        RemoteResult::RemoteError { status, body } => {
            return upstream_error_response(status, &body, &request_id);
        }
    };

    json_response(
        StatusCode::OK,
        serde_json::json!({
            "top_tracks": top_tracks,
            "currently_playing": currently_playing,
        }),
    )
}

#[derive(Debug, Deserialize)]
pub struct PlayParams {
    track_uri: String,
}

/// Start playback of a single track on the user's active device.
async fn play_handler(
    State(state): State<AppState>,
    Query(params): Query<PlayParams>,
) -> Response {
    let started = Instant::now();
    let response = start_playback(&state, &params.track_uri).await;
    state.track("spotify/play", &response, started);
    response
}

async fn start_playback(state: &AppState, track_uri: &str) -> Response {
    let request_id = new_request_id();
    let body = serde_json::json!({"uris": [track_uri]});

    match state.gateway.put(PLAY_PATH, Some(body)).await {
        RemoteResult::Ok(_) | RemoteResult::OkEmpty => json_response(
            StatusCode::OK,
            serde_json::json!({"status": "playing", "track_uri": track_uri}),
        ),
        RemoteResult::Unauthenticated => unauthenticated_response(&request_id),
        RemoteResult::RemoteError { status, body } => {
            upstream_error_response(status, &body, &request_id)
        }
    }
}

/// Pause playback on the user's active device.
async fn pause_handler(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let request_id = new_request_id();

    let response = match state.gateway.put(PAUSE_PATH, None).await {
        RemoteResult::Ok(_) | RemoteResult::OkEmpty => {
            json_response(StatusCode::OK, serde_json::json!({"status": "paused"}))
        }
        RemoteResult::Unauthenticated => unauthenticated_response(&request_id),
        RemoteResult::RemoteError { status, body } => {
            upstream_error_response(status, &body, &request_id)
        }
    };
    state.track("spotify/pause", &response, started);
    response
}

/// Sign out: discard the credential. Safe to call repeatedly.
async fn logout_handler(State(state): State<AppState>) -> Response {
    state.session.invalidate().await;
    json_response(StatusCode::OK, serde_json::json!({"status": "signed_out"}))
}

/// Health: always 200. The service is up whether or not a user has
/// authorized yet; the session field says which.
async fn health_handler(State(state): State<AppState>) -> Response {
    let session_state = if state.session.is_authorized().await {
        "authorized"
    } else {
        "unauthenticated"
    };
    json_response(
        StatusCode::OK,
        serde_json::json!({
            "status": "healthy",
            "session": session_state,
            "uptime_seconds": state.started_at.elapsed().as_secs(),
            "requests_served": state.requests_total.load(Ordering::Relaxed),
        }),
    )
}

/// Prometheus metrics in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
        .into_response()
}
