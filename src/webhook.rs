//! Webhook HTTP server
//!
//! Serves the platform callback, the thumbnail proxy used by carousel
//! columns and a health check. The proxy only fetches URLs carrying a
//! signature minted by the carousel composer.

use crate::bot::EventRouter;
use crate::crypto::ThumbnailSigner;
use crate::platform::events::{parse_request, SIGNATURE_HEADER};
use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, HeaderMap, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use reqwest::{Client as HttpClient, Url};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shared handler state
#[derive(Clone)]
pub struct WebhookState {
    /// Secret used to verify request signatures
    pub channel_secret: Arc<str>,
    /// Event dispatcher
    pub router: Arc<EventRouter>,
    /// Client used by the thumbnail proxy
    pub http: HttpClient,
    /// Checks thumbnail URL signatures
    pub thumbnail_signer: ThumbnailSigner,
}

/// Query of the thumbnail proxy
#[derive(Debug, Deserialize)]
pub struct ThumbnailParams {
    /// Image to fetch
    pub image_url: Option<String>,
    /// Signature of `image_url`
    pub sig: Option<String>,
}

/// Build the application router.
pub fn build_router(state: WebhookState, callback_path: &str) -> Router {
    Router::new()
        .route(callback_path, post(callback))
        .route("/thumbnail", get(thumbnail))
        .route("/health", get(health_check))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

/// Serve `app` on `addr` until the process stops.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn run_server(addr: SocketAddr, app: Router) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn log_request(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    info!("HTTP {} {} -> {}", method, path, response.status());
    response
}

/// Verify, parse and dispatch a webhook batch.
///
/// Answers before the events are processed. Bad signatures and malformed
/// bodies get 500, matching what the platform expects from a failed callback.
pub async fn callback(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let events = match parse_request(&state.channel_secret, signature, &body) {
        Ok(events) => events,
        Err(e) => {
            warn!("Rejected webhook request: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    debug!("Dispatching {} event(s)", events.len());
    // Handles are dropped; tasks keep running detached
    state.router.dispatch(events);
    StatusCode::OK
}

/// Proxy a face image so the platform can fetch it over our public URL.
///
/// Requests without a valid `sig` for `image_url` get 403.
pub async fn thumbnail(
    State(state): State<WebhookState>,
    Query(params): Query<ThumbnailParams>,
) -> Response {
    let Some(image_url) = params.image_url.filter(|u| !u.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing image_url").into_response();
    };
    let signed = params
        .sig
        .is_some_and(|sig| state.thumbnail_signer.verify(&image_url, &sig));
    if !signed {
        warn!("Refused unsigned thumbnail request");
        return StatusCode::FORBIDDEN.into_response();
    }
    let url = match Url::parse(&image_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url,
        _ => return (StatusCode::BAD_REQUEST, "invalid image_url").into_response(),
    };

    let response = match state.http.get(url).send().await {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            warn!("Thumbnail upstream answered {}", response.status());
            return StatusCode::BAD_GATEWAY.into_response();
        }
        Err(e) => {
            error!("Thumbnail fetch failed: {}", e);
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
    match response.bytes().await {
        Ok(bytes) => match content_type {
            Some(content_type) => ([(header::CONTENT_TYPE, content_type)], bytes).into_response(),
            None => bytes.into_response(),
        },
        Err(e) => {
            error!("Thumbnail body read failed: {}", e);
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}
