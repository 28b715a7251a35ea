//! Client role: local reverse proxy into a remote HTTP session.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use super::pending::PendingRequests;
use super::types::{header_fields, header_map, RelayedRequest, RelayedResponse};
use crate::config::Config;
use crate::relay::{RelayChannel, SessionChannels, Subscription};
use crate::session::new_request_id;
use crate::tunnel::{consume_later, payload, SessionStatus};
use crate::Result;

/// Tunables of the local proxy.
#[derive(Debug, Clone)]
pub struct ProxySettings {
    /// Send every request to this port instead of reading it from the path.
    pub target_port: Option<u16>,
    /// How long to wait for a relayed response.
    pub timeout: Duration,
    /// Largest request body accepted.
    pub max_body_bytes: usize,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            target_port: None,
            timeout: Duration::from_secs(30),
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

impl ProxySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            target_port: config.proxy.target_port,
            timeout: config.proxy_timeout(),
            max_body_bytes: config.proxy.max_body_bytes,
        }
    }
}

/// Work out the remote port and the uri to relay for a local request.
///
/// Without a fixed port, the first path segment must be the port and is
/// stripped from the relayed uri. The query string is kept.
pub fn resolve_target(fixed: Option<u16>, uri: &Uri) -> Option<(u16, String)> {
    let query = uri.query().map(|q| format!("?{}", q)).unwrap_or_default();

    if let Some(port) = fixed {
        return Some((port, format!("{}{}", uri.path(), query)));
    }

    let path = uri.path().trim_start_matches('/');
    let (segment, rest) = path.split_once('/').unwrap_or((path, ""));
    let port = segment.parse::<u16>().ok().filter(|port| *port != 0)?;
    Some((port, format!("/{}{}", rest, query)))
}

#[derive(Clone)]
struct ProxyState {
    input: RelayChannel,
    pending: Arc<PendingRequests>,
    settings: Arc<ProxySettings>,
}

/// Local reverse proxy relaying every request through one HTTP session.
pub struct ProxyClient {
    channels: SessionChannels,
    pending: Arc<PendingRequests>,
    settings: ProxySettings,
}

impl ProxyClient {
    pub fn new(channels: SessionChannels, settings: ProxySettings) -> Self {
        Self {
            channels,
            pending: Arc::new(PendingRequests::new()),
            settings,
        }
    }

    /// Requests currently waiting for a response.
    pub fn pending(&self) -> &Arc<PendingRequests> {
        &self.pending
    }

    /// Announce the client, start routing `output` items to waiting
    /// requests, and return the proxy router.
    pub async fn start(&self) -> Result<Router> {
        self.channels
            .state
            .set_record(&SessionStatus::ClientConnected)
            .await?;
        let output = self.channels.output.subscribe().await?;
        tokio::spawn(dispatch_responses(
            output,
            self.channels.output.clone(),
            Arc::clone(&self.pending),
        ));
        Ok(self.router())
    }

    /// Proxy router without the response dispatcher.
    pub fn router(&self) -> Router {
        let state = ProxyState {
            input: self.channels.input.clone(),
            pending: Arc::clone(&self.pending),
            settings: Arc::new(self.settings.clone()),
        };
        Router::new()
            .fallback(proxy)
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Serve on `listener` until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.start().await?;
        info!(addr = ?listener.local_addr().ok(), "HTTP proxy listening");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

/// Complete waiting requests from `output` items. Everything is consumed.
async fn dispatch_responses(
    mut output: Subscription,
    channel: RelayChannel,
    pending: Arc<PendingRequests>,
) {
    while let Some(item) = output.next().await {
        match RelayedResponse::from_fields(item.fields) {
            Some(response) => {
                let req_id = response.req_id.clone();
                if !pending.complete(response) {
                    debug!(req_id = %req_id, "response for unknown request discarded");
                }
            }
            None => debug!(id = %item.id, "discarding malformed response item"),
        }
        consume_later(&channel, item.id);
    }
    debug!("response subscription ended");
}

async fn proxy(State(state): State<ProxyState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let Some((port, uri)) = resolve_target(state.settings.target_port, &parts.uri) else {
        return (StatusCode::BAD_REQUEST, "Target port missing in path\n").into_response();
    };

    let body = match axum::body::to_bytes(body, state.settings.max_body_bytes).await {
        Ok(body) => body,
        Err(e) => {
            debug!(error = %e, "request body rejected");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large\n").into_response();
        }
    };

    let request = RelayedRequest {
        req_id: new_request_id(),
        port,
        method: parts.method.to_string(),
        uri,
        headers: header_fields(&parts.headers),
        body: payload::encode(&body),
    };

    let slot = match state.pending.register(request.req_id.clone()) {
        Ok(slot) => slot,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };

    debug!(
        req_id = %request.req_id,
        port,
        method = %request.method,
        uri = %request.uri,
        "relaying request"
    );
    if let Err(e) = state.input.append_record(&request).await {
        // Lost on the relay; the deadline answers the caller.
        warn!(req_id = %request.req_id, error = %e, "failed to relay request");
    }

    replay(state.pending.wait(slot, state.settings.timeout).await)
}

/// Turn a relayed response into the local HTTP response.
fn replay(response: RelayedResponse) -> Response {
    let Ok(status) = StatusCode::from_u16(response.status) else {
        return (
            StatusCode::BAD_GATEWAY,
            format!("Error: invalid status {}", response.status),
        )
            .into_response();
    };

    let mut reply = Response::new(Body::from(response.body_bytes()));
    *reply.status_mut() = status;
    *reply.headers_mut() = header_map(&response.headers);
    reply
}
