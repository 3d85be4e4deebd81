use crate::error::{Result, ScanError};
use crate::render::{RenderClient, RenderRequest, RenderedPage, resolved_links};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Extra time allowed on top of the page timeout for the service round trip.
const TRANSPORT_SLACK: Duration = Duration::from_secs(10);

/// Client for an out-of-process headless browser service.
///
/// `POST {endpoint}/render` renders a page (optionally inside a named
/// session, optionally running a script) and `DELETE {endpoint}/sessions/{id}`
/// tears a session down.
pub struct RemoteRenderClient {
    client: Client,
    endpoint: Url,
}

#[derive(Debug, Serialize)]
struct RenderPayload<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    js_code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    wait_for: Option<&'a str>,
    js_only: bool,
    page_timeout: u64,
}

#[derive(Debug, Deserialize)]
struct RenderReply {
    success: bool,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    html: String,
    #[serde(default)]
    links: Vec<String>,
    #[serde(default)]
    js_result: Option<Value>,
    #[serde(default)]
    error_message: Option<String>,
}

impl RemoteRenderClient {
    pub fn new(endpoint: &str) -> Result<Self> {
        let mut endpoint = Url::parse(endpoint)
            .map_err(|e| ScanError::InvalidUrl(format!("render endpoint {}: {}", endpoint, e)))?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        let client = Client::builder()
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self { client, endpoint })
    }

    fn route(&self, path: &str) -> Result<Url> {
        self.endpoint
            .join(path)
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", path, e)))
    }
}

#[async_trait]
impl RenderClient for RemoteRenderClient {
    async fn render(&self, request: RenderRequest) -> Result<RenderedPage> {
        let payload = RenderPayload {
            url: &request.url,
            session_id: request.session_id.as_deref(),
            js_code: request.script.as_deref(),
            wait_for: request.wait_for.as_deref(),
            js_only: request.script_only,
            page_timeout: request.timeout_ms,
        };

        debug!("Remote render {} (session {:?})", request.url, request.session_id);
        let response = self
            .client
            .post(self.route("render")?)
            .timeout(Duration::from_millis(request.timeout_ms) + TRANSPORT_SLACK)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::RenderFailed {
                url: request.url,
                reason: format!("render service returned HTTP {}", status.as_u16()),
            });
        }

        let reply: RenderReply = response.json().await?;
        if !reply.success {
            return Err(ScanError::RenderFailed {
                url: request.url,
                reason: reply
                    .error_message
                    .unwrap_or_else(|| "unknown render error".to_string()),
            });
        }

        let url = reply.url.unwrap_or(request.url);
        let links = if reply.links.is_empty() {
            resolved_links(&reply.html, &url)
        } else {
            reply.links
        };

        Ok(RenderedPage {
            url,
            markup: reply.html,
            links,
            script_result: reply.js_result,
        })
    }

    async fn close_session(&self, session_id: &str) {
        let route = match self.route(&format!("sessions/{}", session_id)) {
            Ok(route) => route,
            Err(e) => {
                warn!("Cannot close session {}: {}", session_id, e);
                return;
            }
        };
        match self.client.delete(route).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("Closed remote session {}", session_id);
            }
            Ok(response) => warn!(
                "Render service refused to close session {}: HTTP {}",
                session_id,
                response.status().as_u16()
            ),
            Err(e) => warn!("Failed to close remote session {}: {}", session_id, e),
        }
    }
}
