//! # Proxy Server
//!
//! The interception runtime: an HTTP server that accepts every route and
//! method, runs each request through the intercept hook, and forwards
//! cache misses to the upstream origin. Runs until SIGINT or SIGTERM.
//!
//! The serving side and the upstream client disagree on `http` crate
//! versions, so headers and methods cross that boundary as raw bytes.

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::core::config::AnycacheConfig;
use crate::core::error::{AnycacheError, AnycacheResult};
use crate::core::types::{InterceptedRequest, UpstreamResponse};
use crate::proxy::hook::{InterceptHook, RequestPhase};

/// Largest request body the server will buffer
const MAX_REQUEST_BODY: usize = 64 * 1024 * 1024;

/// Headers that describe the connection, not the payload; never forwarded
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

#[derive(Clone)]
struct AppState {
    hook: Arc<InterceptHook>,
    client: reqwest::Client,
}

/// The caching proxy server
pub struct ProxyServer {
    listen_addr: SocketAddr,
    state: AppState,
}

impl ProxyServer {
    /// Build the server from validated configuration and a wired hook
    pub fn new(config: &AnycacheConfig, hook: Arc<InterceptHook>) -> AnycacheResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AnycacheError::internal(format!("http client: {}", e)))?;

        Ok(Self {
            listen_addr: config.listen_addr()?,
            state: AppState { hook, client },
        })
    }

    /// Serve until SIGINT or SIGTERM
    pub async fn run(self) -> AnycacheResult<()> {
        let app = Router::new()
            .fallback(handle)
            .with_state(self.state);

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| {
                AnycacheError::config(format!("cannot bind {}: {}", self.listen_addr, e))
            })?;
        info!(addr = %self.listen_addr, "proxy listening");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AnycacheError::internal(format!("server: {}", e)))?;

        info!("proxy stopped");
        Ok(())
    }
}

async fn handle(
    State(state): State<AppState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, MAX_REQUEST_BODY).await {
        Ok(bytes) => bytes.to_vec(),
        Err(e) if is_length_limit(&e) => {
            warn!(error = %e, "request body exceeds buffer limit");
            return plain_response(StatusCode::PAYLOAD_TOO_LARGE, "request body too large");
        }
        Err(e) => {
            warn!(error = %e, "failed to read request body");
            return plain_response(StatusCode::BAD_REQUEST, "invalid request body");
        }
    };

    let mut intercepted = InterceptedRequest::new(
        parts.method,
        parts.uri,
        parts.version,
        parts.headers,
        body,
        remote_addr,
    );

    match state.hook.on_request(&mut intercepted).await {
        RequestPhase::Respond(response) => {
            debug!(request_id = %intercepted.id, "serving from cache");
            into_response(response)
        }
        RequestPhase::Forward(key) => {
            match forward_upstream(&state.client, &intercepted).await {
                Ok(response) => {
                    state.hook.on_response(key.as_ref(), &response).await;
                    into_response(response)
                }
                Err(e) => {
                    error!(request_id = %intercepted.id, error = %e, "upstream fetch failed");
                    plain_response(StatusCode::BAD_GATEWAY, "upstream unavailable")
                }
            }
        }
    }
}

/// Forward an intercepted request to its origin and capture the full
/// response body
pub async fn forward_upstream(
    client: &reqwest::Client,
    request: &InterceptedRequest,
) -> AnycacheResult<UpstreamResponse> {
    let url = request.target_url()?;
    let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
        .map_err(|e| AnycacheError::malformed(format!("method: {}", e)))?;

    let mut builder = client
        .request(method, url)
        .headers(outbound_headers(&request.headers));
    if !request.body.is_empty() {
        builder = builder.body(request.body.as_ref().clone());
    }

    let response = builder.send().await?;

    let status = StatusCode::from_u16(response.status().as_u16())
        .map_err(|e| AnycacheError::internal(format!("upstream status: {}", e)))?;
    let headers = inbound_headers(response.headers());
    let body = response.bytes().await?;

    Ok(UpstreamResponse::new(status, headers, body))
}

/// Request headers for the upstream client, hop-by-hop headers dropped
fn outbound_headers(headers: &HeaderMap) -> reqwest::header::HeaderMap {
    let mut out = reqwest::header::HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            out.append(name, value);
        }
    }
    out
}

/// Response headers from the upstream client, hop-by-hop headers dropped
fn inbound_headers(headers: &reqwest::header::HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            axum::http::HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            out.append(name, value);
        }
    }
    out
}

fn into_response(response: UpstreamResponse) -> Response {
    let mut out = Response::new(Body::from(response.body));
    *out.status_mut() = response.status;
    *out.headers_mut() = response.headers;
    out
}

/// Whether a body-read failure was the buffer limit rather than a client
/// I/O problem; the limit error sits somewhere in the source chain
fn is_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<http_body_util::LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

fn plain_response(status: StatusCode, message: &'static str) -> Response {
    into_response(UpstreamResponse::new(
        status,
        HeaderMap::new(),
        Bytes::from_static(message.as_bytes()),
    ))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => error!(error = %e, "cannot install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
