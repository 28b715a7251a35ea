//! Server role: performs relayed requests against local ports.

use axum::http::Method;
use tracing::{debug, info, warn};

use super::types::{header_fields, header_map, RelayedRequest, RelayedResponse};
use crate::error::TunnelError;
use crate::relay::SessionChannels;
use crate::tunnel::{consume_later, SessionStatus};
use crate::Result;

/// Answers relayed HTTP requests for one session.
#[derive(Clone)]
pub struct HttpForwarder {
    channels: SessionChannels,
    client: reqwest::Client,
    host: String,
    port: Option<u16>,
}

impl HttpForwarder {
    /// Create a forwarder calling `host` (usually `localhost`).
    pub fn new(channels: SessionChannels, host: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            channels,
            client,
            host: host.into(),
            port: None,
        })
    }

    /// Port this session was started for, published in the `connected`
    /// state.
    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    /// Serve relayed requests until the `input` subscription ends.
    ///
    /// Each request runs on its own task, so a slow target never holds up
    /// the others.
    pub async fn run(self) -> Result<()> {
        self.channels
            .state
            .set_record(&SessionStatus::Connected { port: self.port })
            .await?;
        let mut input = self.channels.input.subscribe().await?;
        info!(host = %self.host, "HTTP forwarder waiting for requests");

        while let Some(item) = input.next().await {
            match RelayedRequest::from_fields(item.fields) {
                Some(request) => {
                    let forwarder = self.clone();
                    tokio::spawn(async move { forwarder.handle(request).await });
                }
                None => debug!(id = %item.id, "discarding malformed request item"),
            }
            consume_later(&self.channels.input, item.id);
        }

        debug!("request subscription ended");
        Ok(())
    }

    async fn handle(&self, request: RelayedRequest) {
        let response = match self.forward(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(req_id = %request.req_id, error = %e, "local call failed");
                RelayedResponse::bad_gateway(request.req_id.clone(), &e.to_string())
            }
        };

        debug!(req_id = %response.req_id, status = response.status, "relaying response");
        if let Err(e) = self.channels.output.append_record(&response).await {
            warn!(req_id = %response.req_id, error = %e, "failed to relay response");
        }
    }

    /// Perform the local call for one relayed request.
    pub async fn forward(&self, request: &RelayedRequest) -> Result<RelayedResponse> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| TunnelError::InvalidRequest(format!("method {:?}", request.method)))?;
        let url = self.target_url(request);

        let response = self
            .client
            .request(method, url)
            .headers(header_map(&request.headers))
            .body(request.body_bytes())
            .send()
            .await?;

        let status = response.status().as_u16();
        let headers = header_fields(response.headers());
        let body = response.bytes().await?;

        Ok(RelayedResponse::new(
            request.req_id.clone(),
            status,
            headers,
            &body,
        ))
    }

    fn target_url(&self, request: &RelayedRequest) -> String {
        let slash = if request.uri.starts_with('/') { "" } else { "/" };
        format!("http://{}:{}{}{}", self.host, request.port, slash, request.uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{MemoryStore, RelayStore};
    use crate::session::Feature;
    use crate::tunnel::http::HeaderFields;
    use crate::tunnel::payload;
    use std::sync::Arc;

    fn forwarder() -> HttpForwarder {
        let store: Arc<dyn RelayStore> = Arc::new(MemoryStore::new());
        let channels = SessionChannels::new(store, Feature::Http, &"f".parse().unwrap());
        HttpForwarder::new(channels, "127.0.0.1").unwrap()
    }

    fn request(port: u16, method: &str, uri: &str) -> RelayedRequest {
        RelayedRequest {
            req_id: "r1".into(),
            port,
            method: method.into(),
            uri: uri.into(),
            headers: HeaderFields::new(),
            body: payload::encode(b""),
        }
    }

    #[test]
    fn test_target_url() {
        let forwarder = forwarder();
        assert_eq!(
            forwarder.target_url(&request(8080, "GET", "/a?b=1")),
            "http://127.0.0.1:8080/a?b=1"
        );
        assert_eq!(
            forwarder.target_url(&request(8080, "GET", "a")),
            "http://127.0.0.1:8080/a"
        );
    }

    #[tokio::test]
    async fn test_invalid_method_is_an_error() {
        let result = forwarder().forward(&request(8080, "BAD METHOD", "/")).await;
        assert!(matches!(result, Err(TunnelError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_connection_refused_becomes_502() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let forwarder = forwarder();
        forwarder.handle(request(port, "GET", "/")).await;

        let mut sub = forwarder.channels.output.subscribe().await.unwrap();
        let item = sub.next().await.unwrap();
        let response = RelayedResponse::from_fields(item.fields).unwrap();
        assert_eq!(response.req_id, "r1");
        assert_eq!(response.status, 502);
        assert!(String::from_utf8_lossy(&response.body_bytes()).starts_with("Error: "));
    }

    #[tokio::test]
    async fn test_connected_state_carries_port() {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn RelayStore> = store.clone();
        let channels = SessionChannels::new(dyn_store, Feature::Http, &"web".parse().unwrap());
        let state_path = channels.state.path().to_string();
        let forwarder = HttpForwarder::new(channels, "127.0.0.1")
            .unwrap()
            .with_port(Some(8080));
        let task = tokio::spawn(forwarder.run());

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        while store.value(&state_path).is_none() {
            assert!(tokio::time::Instant::now() < deadline, "state never published");
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(
            store.value(&state_path).unwrap(),
            crate::relay::to_fields(&serde_json::json!({"status": "connected", "port": 8080}))
                .unwrap()
        );
        task.abort();
    }
}
