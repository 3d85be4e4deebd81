#![allow(dead_code)]

use async_trait::async_trait;
use harvest_scanner::{RenderClient, RenderRequest, RenderedPage, Result, ScanError};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// What the scripted client answers for one request.
#[derive(Debug, Clone)]
pub enum Reply {
    Page { markup: String, links: Vec<String> },
    NoControl,
    Fail(String),
}

impl Reply {
    pub fn page(markup: &str) -> Self {
        Reply::Page {
            markup: markup.to_string(),
            links: Vec::new(),
        }
    }

    pub fn fail(reason: &str) -> Self {
        Reply::Fail(reason.to_string())
    }
}

/// Render client that replays queued replies in request order. Per-URL
/// replies take precedence over the shared queue. Once everything is used
/// up, `fallback` answers.
#[derive(Default)]
pub struct ScriptedClient {
    queue: Mutex<VecDeque<Reply>>,
    by_url: Mutex<HashMap<String, VecDeque<Reply>>>,
    fallback: Mutex<Option<Reply>>,
    requests: Mutex<Vec<RenderRequest>>,
    closed: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, reply: Reply) -> Self {
        self.queue.lock().unwrap().push_back(reply);
        self
    }

    pub fn on(self, url: &str, reply: Reply) -> Self {
        self.by_url
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn otherwise(self, reply: Reply) -> Self {
        *self.fallback.lock().unwrap() = Some(reply);
        self
    }

    pub fn requests(&self) -> Vec<RenderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn closed_sessions(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }

    fn next_reply(&self, url: &str) -> Reply {
        if let Some(reply) = self
            .by_url
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(|queue| queue.pop_front())
        {
            return reply;
        }
        if let Some(reply) = self.queue.lock().unwrap().pop_front() {
            return reply;
        }
        self.fallback
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Reply::fail("no scripted reply"))
    }
}

#[async_trait]
impl RenderClient for ScriptedClient {
    async fn render(&self, request: RenderRequest) -> Result<RenderedPage> {
        self.requests.lock().unwrap().push(request.clone());

        match self.next_reply(&request.url) {
            Reply::Page { markup, links } => Ok(RenderedPage {
                url: request.url,
                markup,
                links,
                script_result: None,
            }),
            Reply::NoControl => Ok(RenderedPage {
                url: request.url,
                markup: String::new(),
                links: Vec::new(),
                script_result: Some(Value::Bool(false)),
            }),
            Reply::Fail(reason) => Err(ScanError::RenderFailed {
                url: request.url,
                reason,
            }),
        }
    }

    async fn close_session(&self, session_id: &str) {
        self.closed.lock().unwrap().push(session_id.to_string());
    }
}

/// A results page with one anchor per listing id and an optional end marker.
pub fn results_page(ids: &[&str], last: bool) -> String {
    let mut markup = String::from("<html><body><ul>");
    for id in ids {
        markup.push_str(&format!(
            r#"<li><a href="/listing/{id}">Listing {id}</a></li>"#
        ));
    }
    markup.push_str(r#"</ul><a href="/about">About</a>"#);
    if last {
        markup.push_str(r#"<span class="pager-next disabled">Next</span>"#);
    } else {
        markup.push_str(r#"<span class="pager-next">Next</span>"#);
    }
    markup.push_str("</body></html>");
    markup
}

/// Client that behaves like a live browser tab: navigating opens the first
/// page, every advance script moves the tab forward one page, and a
/// script-only request without a script reads whatever page is showing.
/// Advances listed with `failing_advance` still move the tab but report a
/// failure, the way a click whose wait condition timed out does.
pub struct PagedBrowser {
    pages: Vec<String>,
    failing: Vec<usize>,
    current: Mutex<usize>,
    advances: Mutex<usize>,
    requests: Mutex<Vec<RenderRequest>>,
}

impl PagedBrowser {
    pub fn new(pages: Vec<String>) -> Self {
        Self {
            pages,
            failing: Vec::new(),
            current: Mutex::new(0),
            advances: Mutex::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Make the `n`th advance (1-based) fail after moving the tab.
    pub fn failing_advance(mut self, n: usize) -> Self {
        self.failing.push(n);
        self
    }

    pub fn requests(&self) -> Vec<RenderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RenderClient for PagedBrowser {
    async fn render(&self, request: RenderRequest) -> Result<RenderedPage> {
        self.requests.lock().unwrap().push(request.clone());
        let mut current = self.current.lock().unwrap();

        if !request.script_only {
            *current = 0;
        } else if request.script.is_some() {
            let mut advances = self.advances.lock().unwrap();
            *advances += 1;
            if *current + 1 >= self.pages.len() {
                return Ok(RenderedPage {
                    url: request.url,
                    script_result: Some(Value::Bool(false)),
                    ..RenderedPage::default()
                });
            }
            *current += 1;
            if self.failing.contains(&*advances) {
                return Err(ScanError::RenderFailed {
                    url: request.url,
                    reason: "wait_for timeout".to_string(),
                });
            }
        }

        Ok(RenderedPage {
            url: request.url,
            markup: self.pages[*current].clone(),
            links: Vec::new(),
            script_result: None,
        })
    }
}
