use crate::error::{Result, ScanError};
use crate::render::{RenderClient, RenderRequest, RenderedPage, resolved_links};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = "harvest/0.1 (https://github.com/trapdoorsec/harvest)";

/// Static renderer: plain HTTP GET, no script execution.
///
/// Each session id gets its own cookie-jar client so session state never
/// crosses between sessions. Requests without a session share a cookieless
/// client.
pub struct HttpRenderClient {
    stateless: Client,
    sessions: Mutex<HashMap<String, Client>>,
    timeout_secs: u64,
}

impl HttpRenderClient {
    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            stateless: Self::build_client(timeout_secs, false)?,
            sessions: Mutex::new(HashMap::new()),
            timeout_secs,
        })
    }

    fn build_client(timeout_secs: u64, cookies: bool) -> Result<Client> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs((timeout_secs / 2).max(1)))
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5))
            .cookie_store(cookies)
            .build()?;
        Ok(client)
    }

    fn client_for(&self, session_id: Option<&str>) -> Result<Client> {
        let Some(session_id) = session_id else {
            return Ok(self.stateless.clone());
        };

        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = sessions.get(session_id) {
            return Ok(client.clone());
        }
        debug!("Opening HTTP session {}", session_id);
        let client = Self::build_client(self.timeout_secs, true)?;
        sessions.insert(session_id.to_string(), client.clone());
        Ok(client)
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl RenderClient for HttpRenderClient {
    async fn render(&self, request: RenderRequest) -> Result<RenderedPage> {
        if request.script_only {
            return Err(ScanError::Unsupported(
                "in-page scripts need a browser renderer".to_string(),
            ));
        }
        if request.script.is_some() {
            debug!("Static renderer ignoring script for {}", request.url);
        }

        let client = self.client_for(request.session_id.as_deref())?;
        let response = client
            .get(&request.url)
            .timeout(Duration::from_millis(request.timeout_ms))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::RenderFailed {
                url: request.url,
                reason: format!("HTTP {}", status.as_u16()),
            });
        }

        let final_url = response.url().to_string();
        let markup = response.text().await?;
        let links = resolved_links(&markup, &final_url);

        Ok(RenderedPage {
            url: final_url,
            markup,
            links,
            script_result: None,
        })
    }

    async fn close_session(&self, session_id: &str) {
        let removed = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
        if removed.is_some() {
            debug!("Closed HTTP session {}", session_id);
        }
    }
}
