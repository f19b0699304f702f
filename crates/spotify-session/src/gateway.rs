//! Authenticated resource gateway
//!
//! Thin wrapper over the Web API: obtains a valid token from the session
//! manager, attaches it as a bearer header, and classifies every response
//! into a [`RemoteResult`]. A 401/403 triggers exactly one forced refresh
//! and one retry; a second rejection is surfaced as unauthenticated, never
//! retried again, so a genuinely revoked credential cannot masquerade as a
//! transient failure.

use std::sync::Arc;

use reqwest::Method;
use tracing::{debug, warn};

use crate::session::SessionManager;

/// Classified outcome of a resource call.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteResult {
    /// 2xx with a JSON body
    Ok(serde_json::Value),
    /// 2xx with an empty body (e.g. nothing currently playing, or a
    /// playback command acknowledged with 204)
    OkEmpty,
    /// No usable credential, or the endpoint rejected the token even after
    /// the one-shot forced refresh
    Unauthenticated,
    /// Any other upstream failure, carrying the remote status and body for
    /// diagnosability. Transport failures use synthetic statuses 504
    /// (timeout) and 502 (other).
    RemoteError { status: u16, body: String },
}

/// Issues bearer-authenticated calls against the Web API base URL.
pub struct ResourceGateway {
    client: reqwest::Client,
    api_url: String,
    session: Arc<SessionManager>,
}

impl ResourceGateway {
    pub fn new(client: reqwest::Client, api_url: &str, session: Arc<SessionManager>) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_owned(),
            session,
        }
    }

    pub async fn get(&self, path: &str) -> RemoteResult {
        self.call(Method::GET, path, None).await
    }

    pub async fn put(&self, path: &str, body: Option<serde_json::Value>) -> RemoteResult {
        self.call(Method::PUT, path, body).await
    }

    /// Perform an authenticated call to `path` (absolute path + query under
    /// the API base).
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> RemoteResult {
        let token = match self.session.access_token().await {
            Ok(token) => token,
            Err(err) => {
                warn!(error = %err, path, "no usable credential for resource call");
                return RemoteResult::Unauthenticated;
            }
        };

        let (status, text) = match self.send(&method, path, &token, body.as_ref()).await {
            Ok(response) => response,
            Err(failure) => return failure,
        };

        // One forced refresh + one retry: the 401 may be an expiry the
        // local skew margin missed.
        if status == 401 || status == 403 {
            debug!(status, path, "token rejected upstream, forcing one refresh");
            let fresh = match self.session.refresh_after_rejection(&token).await {
                Ok(token) => token,
                Err(err) => {
                    warn!(error = %err, path, "forced refresh failed");
                    return RemoteResult::Unauthenticated;
                }
            };
            let (status, text) = match self.send(&method, path, &fresh, body.as_ref()).await {
                Ok(response) => response,
                Err(failure) => return failure,
            };
            return classify(status, text);
        }

        classify(status, text)
    }

    /// Send one HTTP request; transport failures come back pre-classified.
    async fn send(
        &self,
        method: &Method,
        path: &str,
        token: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<(u16, String), RemoteResult> {
        let url = format!("{}{path}", self.api_url);
        let mut request = self.client.request(method.clone(), &url).bearer_auth(token);
        if let Some(json) = body {
            request = request.json(json);
        }

        let response = request.send().await.map_err(|e| transport_failure(&e))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| transport_failure(&e))?;
        Ok((status, text))
    }
}

fn transport_failure(err: &reqwest::Error) -> RemoteResult {
    if err.is_timeout() {
        RemoteResult::RemoteError {
            status: 504,
            body: format!("resource call timed out: {err}"),
        }
    } else {
        RemoteResult::RemoteError {
            status: 502,
            body: format!("resource call failed: {err}"),
        }
    }
}

/// Uniform response classification.
fn classify(status: u16, body: String) -> RemoteResult {
    match status {
        200..=299 if body.trim().is_empty() => RemoteResult::OkEmpty,
        200..=299 => match serde_json::from_str(&body) {
            Ok(value) => RemoteResult::Ok(value),
            // A 2xx that is not JSON is a protocol violation worth surfacing
            Err(_) => RemoteResult::RemoteError { status, body },
        },
        401 | 403 => RemoteResult::Unauthenticated,
        _ => RemoteResult::RemoteError { status, body },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::{get, post, put};
    use common::SecretString;
    use spotify_auth::{CredentialRecord, TokenExchanger, now_millis};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    async fn serve(app: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// Token endpoint that always answers with `access` and counts hits.
    async fn spawn_token_server(access: &str) -> (String, Arc<AtomicU32>) {
        let hits = Arc::new(AtomicU32::new(0));
        let handler_hits = hits.clone();
        let body = serde_json::json!({
            "access_token": access,
            "refresh_token": "RT2",
            "expires_in": 3600
        });
        let app = axum::Router::new().route(
            "/api/token",
            post(move || {
                let hits = handler_hits.clone();
                let body = body.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    axum::Json(body)
                }
            }),
        );
        (serve(app).await, hits)
    }

    fn session(accounts_url: &str) -> Arc<SessionManager> {
        Arc::new(SessionManager::new(TokenExchanger::new(
            reqwest::Client::new(),
            accounts_url,
            "client-id".into(),
            SecretString::new("client-secret"),
            "http://localhost:8080/callback".into(),
        )))
    }

    async fn seeded_session(accounts_url: &str, access: &str) -> Arc<SessionManager> {
        let session = session(accounts_url);
        session
            .store()
            .set(CredentialRecord {
                access_token: access.into(),
                refresh_token: "RT1".into(),
                expires_at: now_millis() + 3_600_000,
                scope: vec![],
            })
            .await;
        session
    }

    fn bearer(headers: &HeaderMap) -> String {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned()
    }

    #[tokio::test]
    async fn json_response_is_ok() {
        let (accounts, _) = spawn_token_server("AT2").await;
        let api = serve(axum::Router::new().route(
            "/v1/me/top/tracks",
            get(|| async { axum::Json(serde_json::json!({"items": [{"name": "Track"}]})) }),
        ))
        .await;

        let gateway = ResourceGateway::new(
            reqwest::Client::new(),
            &api,
            seeded_session(&accounts, "AT1").await,
        );
        let result = gateway.get("/v1/me/top/tracks?limit=10").await;
        assert_eq!(
            result,
            RemoteResult::Ok(serde_json::json!({"items": [{"name": "Track"}]}))
        );
    }

    #[tokio::test]
    async fn empty_body_is_ok_empty() {
        let (accounts, _) = spawn_token_server("AT2").await;
        let api = serve(axum::Router::new().route(
            "/v1/me/player/currently-playing",
            get(|| async { StatusCode::NO_CONTENT }),
        ))
        .await;

        let gateway = ResourceGateway::new(
            reqwest::Client::new(),
            &api,
            seeded_session(&accounts, "AT1").await,
        );
        let result = gateway.get("/v1/me/player/currently-playing").await;
        assert_eq!(result, RemoteResult::OkEmpty);
    }

    #[tokio::test]
    async fn upstream_failure_carries_status_and_body() {
        let (accounts, _) = spawn_token_server("AT2").await;
        let api = serve(axum::Router::new().route(
            "/v1/me/top/tracks",
            get(|| async { (StatusCode::BAD_GATEWAY, "spotify is down") }),
        ))
        .await;

        let gateway = ResourceGateway::new(
            reqwest::Client::new(),
            &api,
            seeded_session(&accounts, "AT1").await,
        );
        match gateway.get("/v1/me/top/tracks?limit=10").await {
            RemoteResult::RemoteError { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body, "spotify is down");
            }
            other => panic!("expected RemoteError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_credential_short_circuits_without_network_call() {
        let (accounts, _) = spawn_token_server("AT2").await;
        let api_hits = Arc::new(AtomicU32::new(0));
        let handler_hits = api_hits.clone();
        let api = serve(axum::Router::new().route(
            "/v1/me/top/tracks",
            get(move || {
                let hits = handler_hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    axum::Json(serde_json::json!({}))
                }
            }),
        ))
        .await;

        let gateway = ResourceGateway::new(reqwest::Client::new(), &api, session(&accounts));
        let result = gateway.get("/v1/me/top/tracks?limit=10").await;
        assert_eq!(result, RemoteResult::Unauthenticated);
        assert_eq!(api_hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_token_is_refreshed_once_and_retried() {
        let (accounts, token_hits) = spawn_token_server("AT2").await;
        let api_hits = Arc::new(AtomicU32::new(0));
        let handler_hits = api_hits.clone();
        // Accepts only the refreshed token
        let api = serve(axum::Router::new().route(
            "/v1/me/top/tracks",
            get(move |headers: HeaderMap| {
                let hits = handler_hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    if bearer(&headers) == "Bearer AT2" {
                        (StatusCode::OK, axum::Json(serde_json::json!({"items": []})))
                            .into_response()
                    } else {
                        StatusCode::UNAUTHORIZED.into_response()
                    }
                }
            }),
        ))
        .await;

        let gateway = ResourceGateway::new(
            reqwest::Client::new(),
            &api,
            seeded_session(&accounts, "AT1").await,
        );
        let result = gateway.get("/v1/me/top/tracks?limit=10").await;
        assert_eq!(result, RemoteResult::Ok(serde_json::json!({"items": []})));
        assert_eq!(token_hits.load(Ordering::SeqCst), 1);
        assert_eq!(api_hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_rejection_is_not_retried_again() {
        let (accounts, token_hits) = spawn_token_server("AT2").await;
        let api_hits = Arc::new(AtomicU32::new(0));
        let handler_hits = api_hits.clone();
        let api = serve(axum::Router::new().route(
            "/v1/me/top/tracks",
            get(move || {
                let hits = handler_hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    StatusCode::UNAUTHORIZED
                }
            }),
        ))
        .await;

        let gateway = ResourceGateway::new(
            reqwest::Client::new(),
            &api,
            seeded_session(&accounts, "AT1").await,
        );
        let result = gateway.get("/v1/me/top/tracks?limit=10").await;
        assert_eq!(result, RemoteResult::Unauthenticated);
        assert_eq!(token_hits.load(Ordering::SeqCst), 1, "one forced refresh");
        assert_eq!(api_hits.load(Ordering::SeqCst), 2, "one retry, no loop");
    }

    #[tokio::test]
    async fn put_forwards_json_body_and_bearer_token() {
        let (accounts, _) = spawn_token_server("AT2").await;
        let captured: Arc<StdMutex<Vec<(String, serde_json::Value)>>> =
            Arc::new(StdMutex::new(Vec::new()));
        let handler_captured = captured.clone();
        let api = serve(axum::Router::new().route(
            "/v1/me/player/play",
            put(
                move |headers: HeaderMap, axum::Json(body): axum::Json<serde_json::Value>| {
                    let captured = handler_captured.clone();
                    async move {
                        captured.lock().unwrap().push((bearer(&headers), body));
                        StatusCode::NO_CONTENT
                    }
                },
            ),
        ))
        .await;

        let gateway = ResourceGateway::new(
            reqwest::Client::new(),
            &api,
            seeded_session(&accounts, "AT1").await,
        );
        let result = gateway
            .put(
                "/v1/me/player/play",
                Some(serde_json::json!({"uris": ["spotify:track:abc"]})),
            )
            .await;
        assert_eq!(result, RemoteResult::OkEmpty);

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].0, "Bearer AT1");
        assert_eq!(captured[0].1, serde_json::json!({"uris": ["spotify:track:abc"]}));
    }

    #[tokio::test]
    async fn resource_timeout_maps_to_gateway_timeout_status() {
        let (accounts, _) = spawn_token_server("AT2").await;
        let api = serve(axum::Router::new().route(
            "/v1/me/top/tracks",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                axum::Json(serde_json::json!({}))
            }),
        ))
        .await;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        let gateway =
            ResourceGateway::new(client, &api, seeded_session(&accounts, "AT1").await);
        match gateway.get("/v1/me/top/tracks?limit=10").await {
            RemoteResult::RemoteError { status, .. } => assert_eq!(status, 504),
            other => panic!("expected RemoteError, got {other:?}"),
        }
    }

    #[test]
    fn classification_table() {
        assert_eq!(
            classify(200, r#"{"a":1}"#.into()),
            RemoteResult::Ok(serde_json::json!({"a": 1}))
        );
        assert_eq!(classify(200, String::new()), RemoteResult::OkEmpty);
        assert_eq!(classify(204, "  ".into()), RemoteResult::OkEmpty);
        assert_eq!(classify(401, String::new()), RemoteResult::Unauthenticated);
        assert_eq!(classify(403, String::new()), RemoteResult::Unauthenticated);
        assert_eq!(
            classify(503, "unavailable".into()),
            RemoteResult::RemoteError {
                status: 503,
                body: "unavailable".into()
            }
        );
        // 2xx that is not JSON is surfaced, not silently wrapped
        assert!(matches!(
            classify(200, "<html>".into()),
            RemoteResult::RemoteError { status: 200, .. }
        ));
    }
}
