//! HTTP transport wrapper client
//!
//! Some servers are fronted by an HTTP endpoint that accepts one JSON-RPC
//! body per POST. The payload-rejection probes send raw bodies to it and
//! judge the status code and body, so non-2xx statuses are data here, not
//! errors.

use std::time::Duration;
use tracing::debug;
use url::Url;

use super::ChannelError;

/// Status and body returned by the wrapper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    #[inline]
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// `error.code` from a JSON body, if the body is JSON and carries one
    #[inline]
    pub fn error_code(&self) -> Option<i64> {
        let body: serde_json::Value = serde_json::from_str(&self.body).ok()?;
        body.get("error")?.get("code")?.as_i64()
    }
}

#[derive(Debug, Clone)]
pub struct HttpWrapper {
    endpoint: Url,
    agent: ureq::Agent,
}

impl HttpWrapper {
    #[inline]
    pub fn new(endpoint: Url, timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();

        Self { endpoint, agent }
    }

    #[inline]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// POST `body` verbatim as `application/json`
    #[inline]
    pub async fn post_raw(&self, body: String) -> Result<HttpReply, ChannelError> {
        let agent = self.agent.clone();
        let url = self.endpoint.to_string();

        tokio::task::spawn_blocking(move || {
            debug!("Posting {} bytes to {}", body.len(), url);

            let mut response = agent
                .post(&url)
                .header("Content-Type", "application/json")
                .send(body)
                .map_err(|e| ChannelError::Http {
                    url: url.clone(),
                    message: e.to_string(),
                })?;

            let status = response.status().as_u16();
            let body = response
                .body_mut()
                .read_to_string()
                .map_err(|e| ChannelError::Http {
                    url: url.clone(),
                    message: format!("failed to read response body: {}", e),
                })?;
            debug!("HTTP wrapper replied {} with {} bytes", status, body.len());

            Ok(HttpReply { status, body })
        })
        .await?
    }
}
