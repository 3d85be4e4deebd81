//! The seam between the harvester and whatever actually renders pages.
//!
//! A [`RenderClient`] turns a [`RenderRequest`] into the markup of the page
//! after its scripts have run. Requests that carry a session id share client
//! state (cookies, storage, the live DOM) with every other request of that
//! session and with nothing else.

use crate::error::Result;
use crate::listing::ListingUrl;
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub url: String,
    pub session_id: Option<String>,
    pub script: Option<String>,
    /// Condition the renderer waits for before returning, e.g. `css:#iframe`
    /// or `js:() => ...`.
    pub wait_for: Option<String>,
    pub timeout_ms: u64,
    /// Run `script` against the page already open in the session instead of
    /// navigating to `url`. Without a script this re-reads that page's DOM.
    pub script_only: bool,
}

impl RenderRequest {
    pub fn navigate(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            session_id: None,
            script: None,
            wait_for: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            script_only: false,
        }
    }

    pub fn in_session(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    pub fn with_script(mut self, script: Option<String>) -> Self {
        self.script = script;
        self
    }

    pub fn with_wait_for(mut self, wait_for: Option<String>) -> Self {
        self.wait_for = wait_for;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn script_only(mut self) -> Self {
        self.script_only = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedPage {
    /// Final URL after redirects.
    pub url: String,
    pub markup: String,
    /// Absolute link targets the renderer found on the page.
    pub links: Vec<String>,
    /// Value returned by the request's script, if the renderer ran one.
    pub script_result: Option<Value>,
}

impl RenderedPage {
    /// Advance scripts return `false` when the page has no control to act on.
    pub fn reported_no_control(&self) -> bool {
        matches!(self.script_result, Some(Value::Bool(false)))
    }
}

#[async_trait]
pub trait RenderClient: Send + Sync {
    /// Render one page. A page the renderer could not load is an error.
    async fn render(&self, request: RenderRequest) -> Result<RenderedPage>;

    /// Release everything held for `session_id`.
    async fn close_session(&self, _session_id: &str) {}
}

/// Raw `href` values of every anchor in `markup`, in document order.
pub fn anchor_hrefs(markup: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let document = Html::parse_document(markup);
    document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
        .map(|href| href.to_string())
        .collect()
}

/// Anchors of `markup` resolved against `page_url`, deduplicated.
pub fn resolved_links(markup: &str, page_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let mut links: Vec<String> = anchor_hrefs(markup)
        .iter()
        .filter_map(|href| ListingUrl::resolve(&base, href))
        .map(|url| url.to_string())
        .collect();
    links.sort();
    links.dedup();
    links
}

/// `src` of the first element matching `selector`, resolved against `page_url`.
pub fn frame_source(markup: &str, page_url: &str, selector: &str) -> Option<ListingUrl> {
    let selector = Selector::parse(selector).ok()?;
    let base = Url::parse(page_url).ok()?;
    let document = Html::parse_document(markup);
    let src = document
        .select(&selector)
        .find_map(|element| element.value().attr("src"))?;
    ListingUrl::resolve(&base, src)
}
