//! HTTP endpoint the provider redirects browsers back to.
//!
//! This is the only part of the agent reached by end users directly. It
//! serves the callback path taken from the configured redirect URL plus
//! `GET /health`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router as AxumRouter,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::engine::OidcEngine;
use crate::error::OidcError;

/// Query parameters of the provider's redirect.
#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Serves the OIDC callback.
pub struct CallbackServer {
    engine: Arc<OidcEngine>,
    bind_addr: SocketAddr,
}

impl CallbackServer {
    pub fn new(engine: Arc<OidcEngine>, bind_addr: SocketAddr) -> Self {
        Self { engine, bind_addr }
    }

    /// Build the axum router.
    pub fn router(&self) -> AxumRouter {
        AxumRouter::new()
            .route(self.engine.callback_path(), get(handle_callback))
            .route("/health", get(handle_health))
            .layer(TraceLayer::new_for_http())
            .with_state(self.engine.clone())
    }

    /// Serve on `listener` until `shutdown` resolves.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        tracing::info!(
            addr = %listener.local_addr()?,
            path = %self.engine.callback_path(),
            "Starting OIDC callback server"
        );
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }

    /// Bind, serve in the background, and return the bound address.
    pub async fn run_with_shutdown(
        self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Err(e) = self.serve(listener, shutdown).await {
                tracing::error!(error = %e, "OIDC callback server failed");
            }
        });
        Ok(local_addr)
    }
}

/// Handle GET {callback path}
async fn handle_callback(
    State(engine): State<Arc<OidcEngine>>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> Result<Response, CallbackError> {
    if let Some(error) = params.error {
        return Err(OidcError::Provider(format!(
            "{}: {}",
            error,
            params.error_description.unwrap_or_default()
        ))
        .into());
    }
    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| OidcError::Provider("callback without code".to_string()))?;
    let state = params
        .state
        .filter(|s| !s.is_empty())
        .ok_or_else(|| OidcError::InvalidState("callback without state".to_string()))?;

    // HTTP/2 clients may split cookies over several headers.
    let cookie_header = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join("; ");
    let cookie_header = Some(cookie_header.as_str()).filter(|h| !h.is_empty());

    let outcome = engine
        .complete_callback(&code, &state, cookie_header, chrono::Utc::now().timestamp())
        .await?;

    let mut response = Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, outcome.destination.as_str())
        .header(header::CACHE_CONTROL, "no-store");
    for cookie in &outcome.cookies {
        response = response.header(header::SET_COOKIE, cookie.to_string());
    }
    response
        .body(Body::empty())
        .map_err(|e| OidcError::Config(format!("failed to build redirect: {}", e)).into())
}

/// Handle GET /health
async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "spoa-auth-oidc-callback"
    }))
}

/// Callback failure; details are logged, clients see a generic message.
#[derive(Debug)]
pub struct CallbackError(OidcError);

impl From<OidcError> for CallbackError {
    fn from(err: OidcError) -> Self {
        Self(err)
    }
}

impl IntoResponse for CallbackError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            OidcError::InvalidState(_) | OidcError::Provider(_) => {
                (StatusCode::BAD_REQUEST, "Login could not be completed.")
            }
            OidcError::TokenExchangeFailed(_) | OidcError::InvalidIdToken(_) => {
                (StatusCode::BAD_GATEWAY, "Identity provider error.")
            }
            OidcError::Discovery(_) | OidcError::Config(_) | OidcError::Cookie(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error.")
            }
        };
        tracing::warn!(status = %status, error = %self.0, "OIDC callback failed");
        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenewalPolicy;
    use crate::engine::tests::{engine_for, mock_provider, state_param};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn server() -> (wiremock::MockServer, CallbackServer) {
        let provider = mock_provider("user-7").await;
        let engine = Arc::new(engine_for(&provider, RenewalPolicy::Disabled));
        let server = CallbackServer::new(engine, "127.0.0.1:0".parse().unwrap());
        (provider, server)
    }

    fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (_provider, server) = server().await;
        let response = server
            .router()
            .oneshot(get("/health", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_callback_sets_cookie_and_redirects() {
        let (_provider, server) = server().await;
        // The handler checks the state against the wall clock.
        let now = chrono::Utc::now().timestamp();
        let login = server
            .engine
            .begin("https://app.example.com/private", now)
            .unwrap();
        let uri = format!(
            "/oauth2/callback?code=abc&state={}",
            urlencoding::encode(&state_param(&login.url))
        );
        let cookie = format!(
            "theme=dark; {}={}",
            login.state_cookie.name, login.state_cookie.value
        );

        let response = server
            .router()
            .oneshot(get(&uri, Some(&cookie)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "https://app.example.com/private"
        );
        let set_cookies: Vec<_> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(set_cookies.len(), 2);
        assert!(set_cookies[0].starts_with("sess="));
        assert!(set_cookies[0].contains("HttpOnly"));
        assert!(set_cookies[1].starts_with(&format!("{}=;", login.state_cookie.name)));
        assert!(set_cookies[1].contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_callback_without_binding_cookie() {
        let (_provider, server) = server().await;
        let login = server.engine.begin("/", chrono::Utc::now().timestamp()).unwrap();
        let uri = format!(
            "/oauth2/callback?code=abc&state={}",
            urlencoding::encode(&state_param(&login.url))
        );
        let response = server.router().oneshot(get(&uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_callback_bad_requests() {
        let (_provider, server) = server().await;
        for uri in [
            "/oauth2/callback",
            "/oauth2/callback?code=abc",
            "/oauth2/callback?state=x",
            "/oauth2/callback?error=access_denied&error_description=nope",
            "/oauth2/callback?code=abc&state=not-a-state",
        ] {
            let response = server.router().oneshot(get(uri, None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_token_exchange_failure_is_bad_gateway() {
        let provider = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&provider)
            .await;
        let engine = Arc::new(engine_for(&provider, RenewalPolicy::Disabled));
        let server = CallbackServer::new(engine, "127.0.0.1:0".parse().unwrap());

        let login = server.engine.begin("/", chrono::Utc::now().timestamp()).unwrap();
        let uri = format!(
            "/oauth2/callback?code=abc&state={}",
            urlencoding::encode(&state_param(&login.url))
        );
        let cookie = format!("{}={}", login.state_cookie.name, login.state_cookie.value);
        let response = server
            .router()
            .oneshot(get(&uri, Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
