//! Request/response HTTP transport.
//!
//! There is no persistent connection: "connect" is a GET liveness probe and
//! every frame is an independent POST whose body is the response frame.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use std::time::Duration;
use switchyard_types::TransportKind;

use super::{BoxFuture, Transport, TransportError, bearer};
use crate::error::ConnectError;

/// Stateless HTTP transport for one server endpoint.
pub struct HttpTransport {
    http: reqwest::Client,
    url: String,
    headers: HeaderMap,
}

impl HttpTransport {
    /// Build the client and probe the endpoint. Any non-5xx answer counts as alive.
    pub async fn connect(
        server: &str,
        url: &str,
        token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ConnectError> {
        let refused = |reason: String| ConnectError::Refused {
            server: server.to_string(),
            reason,
        };

        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let value = HeaderValue::from_str(&bearer(token))
                .map_err(|_| refused("token is not a valid header value".into()))?;
            headers.insert(AUTHORIZATION, value);
        }

        // POSTs are bounded by the call deadline; only the probe has its own.
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| refused(e.to_string()))?;

        tracing::debug!(server, "GET {url} (liveness probe)");
        let response = http
            .get(url)
            .headers(headers.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| refused(e.to_string()))?;
        let status = response.status();
        if status.is_server_error() {
            return Err(refused(format!("liveness probe returned {status}")));
        }

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(Self {
            http,
            url: url.to_string(),
            headers,
        })
    }
}

impl Transport for HttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    fn send(&self, frame: String) -> BoxFuture<'_, Result<Option<String>, TransportError>> {
        Box::pin(async move {
            tracing::debug!("POST {}", self.url);
            let response = self
                .http
                .post(&self.url)
                .headers(self.headers.clone())
                .body(frame)
                .send()
                .await
                .map_err(|e| TransportError(e.to_string()))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| TransportError(format!("failed to read response body: {e}")))?;
            if !status.is_success() {
                return Err(TransportError(format!("HTTP {status}: {}", body.trim())));
            }
            if body.trim().is_empty() {
                Ok(None)
            } else {
                Ok(Some(body))
            }
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}
