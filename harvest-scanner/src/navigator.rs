//! Session-scoped discovery of listing URLs across paginated search results.
//!
//! One [`SessionNavigator::discover_all`] call owns one render session from
//! start to finish. Pages are visited strictly in sequence because every
//! advance acts on the previous page's live state (filters, scroll, pager).
//!
//! The loop ends on exactly one of:
//! - the site's end predicate reporting the current page as the last one,
//! - the advance script reporting that no next-page control exists,
//! - the page bound, so a site whose end signal never fires still halts,
//! - a page that still fails to render after the retry budget (partial result).
//!
//! A page that contributes no new links never ends the loop by itself.

use crate::error::{Result, ScanError};
use crate::listing::ListingUrl;
use crate::render::{
    DEFAULT_TIMEOUT_MS, RenderClient, RenderRequest, RenderedPage, anchor_hrefs, frame_source,
};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// True when the rendered markup is the last page of results.
pub type EndPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// True when a link on a results page points at a listing detail page.
pub type LinkPredicate = Arc<dyn Fn(&ListingUrl) -> bool + Send + Sync>;

/// Called after every visited page with (page index, new links, known links).
pub type PageCallback = Arc<dyn Fn(usize, usize, usize) + Send + Sync>;

/// Where the search UI lives.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Direct(String),
    /// The search UI is an iframe inside `landing`; the session starts at the
    /// frame's `src`.
    Embedded {
        landing: String,
        frame_selector: String,
    },
}

/// How to get from one results page to the next.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// Run `code` against the live page. The script returns `false` when it
    /// finds no next-page control.
    Script {
        code: String,
        wait_for: Option<String>,
    },
    /// Navigate the session to `template` with `{page}` (1-based) and
    /// `{offset}` (`(page - 1) * page_size`) filled in.
    PageUrl {
        template: String,
        page_size: usize,
        wait_for: Option<String>,
    },
}

impl Advance {
    fn request(
        &self,
        start_url: &str,
        page: usize,
        session_id: &str,
        timeout_ms: u64,
    ) -> RenderRequest {
        match self {
            Advance::Script { code, wait_for } => RenderRequest::navigate(start_url)
                .in_session(session_id)
                .with_script(Some(code.clone()))
                .with_wait_for(wait_for.clone())
                .with_timeout_ms(timeout_ms)
                .script_only(),
            Advance::PageUrl {
                template,
                page_size,
                wait_for,
            } => RenderRequest::navigate(Self::page_url(template, *page_size, page))
                .in_session(session_id)
                .with_wait_for(wait_for.clone())
                .with_timeout_ms(timeout_ms),
        }
    }

    /// What to send when `first` failed. A click may already have moved the
    /// live page, so a script advance re-reads the session's current page
    /// instead of running the script again. URL advances repeat as-is.
    fn retry_request(&self, first: &RenderRequest) -> RenderRequest {
        match self {
            Advance::Script { .. } => RenderRequest {
                script: None,
                ..first.clone()
            },
            Advance::PageUrl { .. } => first.clone(),
        }
    }

    pub fn page_url(template: &str, page_size: usize, page: usize) -> String {
        let offset = page.saturating_sub(1) * page_size;
        template
            .replace("{page}", &page.to_string())
            .replace("{offset}", &offset.to_string())
    }
}

#[derive(Clone)]
pub struct DiscoveryPlan {
    pub entry: Entry,
    /// Run on the first page, e.g. to apply search filters.
    pub setup_script: Option<String>,
    pub wait_for: Option<String>,
    /// `None` for sites that list everything on one page.
    pub advance: Option<Advance>,
    pub end: EndPredicate,
    pub links: LinkPredicate,
    /// Base for relative hrefs when it differs from the rendered page's URL.
    pub link_base: Option<Url>,
}

impl DiscoveryPlan {
    pub fn new(entry: Entry, links: LinkPredicate, end: EndPredicate) -> Self {
        Self {
            entry,
            setup_script: None,
            wait_for: None,
            advance: None,
            end,
            links,
            link_base: None,
        }
    }

    pub fn with_setup_script(mut self, script: &str) -> Self {
        self.setup_script = Some(script.to_string());
        self
    }

    pub fn with_wait_for(mut self, condition: &str) -> Self {
        self.wait_for = Some(condition.to_string());
        self
    }

    pub fn with_advance(mut self, advance: Advance) -> Self {
        self.advance = Some(advance);
        self
    }

    pub fn with_link_base(mut self, base: Url) -> Self {
        self.link_base = Some(base);
        self
    }

    /// Listing links on one rendered page, per this plan's link predicate.
    pub fn page_links(&self, page: &RenderedPage) -> BTreeSet<ListingUrl> {
        let base = match &self.link_base {
            Some(base) => base.clone(),
            None => match Url::parse(&page.url) {
                Ok(url) => url,
                Err(_) => return BTreeSet::new(),
            },
        };

        anchor_hrefs(&page.markup)
            .iter()
            .chain(page.links.iter())
            .filter_map(|href| ListingUrl::resolve(&base, href))
            .filter(|url| (self.links)(url))
            .collect()
    }
}

impl fmt::Debug for DiscoveryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryPlan")
            .field("entry", &self.entry)
            .field("setup_script", &self.setup_script.is_some())
            .field("wait_for", &self.wait_for)
            .field("advance", &self.advance)
            .field("link_base", &self.link_base)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    EndOfResults,
    NoNextControl,
    SinglePage,
    PageLimit,
    RenderFailed(String),
}

impl Termination {
    /// Discovery stopped early and the URL set may be incomplete.
    pub fn is_partial(&self) -> bool {
        matches!(self, Termination::RenderFailed(_) | Termination::PageLimit)
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::EndOfResults => write!(f, "end of results"),
            Termination::NoNextControl => write!(f, "no next-page control"),
            Termination::SinglePage => write!(f, "single page"),
            Termination::PageLimit => write!(f, "page limit reached"),
            Termination::RenderFailed(reason) => write!(f, "render failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Discovery {
    pub urls: BTreeSet<ListingUrl>,
    pub pages_visited: usize,
    pub termination: Termination,
}

/// Navigation progress for one session. Lives only as long as the walk.
#[derive(Debug)]
pub struct SessionState {
    pub session_id: String,
    pub current_page_index: usize,
    pub known_urls: BTreeSet<ListingUrl>,
    pub previous_page_urls: BTreeSet<ListingUrl>,
}

impl SessionState {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            current_page_index: 0,
            known_urls: BTreeSet::new(),
            previous_page_urls: BTreeSet::new(),
        }
    }

    /// Record the links of a newly visited page; returns how many were new.
    pub fn absorb(&mut self, page_urls: BTreeSet<ListingUrl>) -> usize {
        let before = self.known_urls.len();
        self.known_urls.extend(page_urls.iter().cloned());
        self.previous_page_urls = page_urls;
        self.known_urls.len() - before
    }

    fn finish(self, termination: Termination) -> Discovery {
        Discovery {
            urls: self.known_urls,
            pages_visited: self.current_page_index,
            termination,
        }
    }
}

pub struct SessionNavigator {
    client: Arc<dyn RenderClient>,
    max_pages: usize,
    render_retries: usize,
    retry_backoff: Duration,
    timeout_ms: u64,
    page_callback: Option<PageCallback>,
}

impl SessionNavigator {
    pub const DEFAULT_MAX_PAGES: usize = 100;
    pub const DEFAULT_RENDER_RETRIES: usize = 3;
    pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(2);

    pub fn new(client: Arc<dyn RenderClient>) -> Self {
        Self {
            client,
            max_pages: Self::DEFAULT_MAX_PAGES,
            render_retries: Self::DEFAULT_RENDER_RETRIES,
            retry_backoff: Self::DEFAULT_RETRY_BACKOFF,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            page_callback: None,
        }
    }

    /// Upper bound on pages rendered per session, including the first.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Extra attempts after a failed render.
    pub fn with_render_retries(mut self, retries: usize) -> Self {
        self.render_retries = retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_page_callback(mut self, callback: PageCallback) -> Self {
        self.page_callback = Some(callback);
        self
    }

    /// Walk every results page of `plan` inside `session_id` and return the
    /// union of listing links seen. The session is released afterwards.
    ///
    /// Fails only when the first page (or the landing page holding the search
    /// frame) cannot be rendered at all.
    pub async fn discover_all(&self, plan: &DiscoveryPlan, session_id: &str) -> Result<Discovery> {
        let discovery = self.walk(plan, session_id).await;
        self.client.close_session(session_id).await;

        if let Ok(ref discovery) = discovery {
            info!(
                "Session {} discovered {} listings over {} pages ({})",
                session_id,
                discovery.urls.len(),
                discovery.pages_visited,
                discovery.termination
            );
        }
        discovery
    }

    async fn walk(&self, plan: &DiscoveryPlan, session_id: &str) -> Result<Discovery> {
        let start_url = self.resolve_entry(&plan.entry).await?;
        info!("Session {} starting at {}", session_id, start_url);

        let mut state = SessionState::new(session_id);

        let first = RenderRequest::navigate(&start_url)
            .in_session(session_id)
            .with_script(plan.setup_script.clone())
            .with_wait_for(plan.wait_for.clone())
            .with_timeout_ms(self.timeout_ms);
        let page = self
            .render_with_retry(first, None)
            .await
            .map_err(|reason| ScanError::SessionStart {
                url: start_url.clone(),
                reason,
            })?;

        state.current_page_index = 1;
        self.record_page(&mut state, plan, &page);
        if (plan.end)(&page.markup) {
            return Ok(state.finish(Termination::EndOfResults));
        }

        let Some(advance) = &plan.advance else {
            return Ok(state.finish(Termination::SinglePage));
        };

        loop {
            if state.current_page_index >= self.max_pages {
                warn!(
                    "Session {} hit the {} page limit without an end signal",
                    session_id, self.max_pages
                );
                return Ok(state.finish(Termination::PageLimit));
            }

            let next_page = state.current_page_index + 1;
            let request = advance.request(&start_url, next_page, session_id, self.timeout_ms);
            let retry = advance.retry_request(&request);
            let page = match self.render_with_retry(request, Some(retry)).await {
                Ok(page) => page,
                Err(reason) => {
                    warn!(
                        "Session {} abandoned at page {} with {} listings: {}",
                        session_id,
                        next_page,
                        state.known_urls.len(),
                        reason
                    );
                    return Ok(state.finish(Termination::RenderFailed(reason)));
                }
            };

            if page.reported_no_control() {
                debug!(
                    "Session {} found no next-page control after page {}",
                    session_id, state.current_page_index
                );
                return Ok(state.finish(Termination::NoNextControl));
            }

            state.current_page_index = next_page;
            self.record_page(&mut state, plan, &page);

            if (plan.end)(&page.markup) {
                return Ok(state.finish(Termination::EndOfResults));
            }
        }
    }

    fn record_page(&self, state: &mut SessionState, plan: &DiscoveryPlan, page: &RenderedPage) {
        let page_urls = plan.page_links(page);
        let found = page_urls.len();
        let new = state.absorb(page_urls);

        if new == 0 {
            debug!(
                "Page {} of session {} added no new listings ({} links)",
                state.current_page_index, state.session_id, found
            );
        } else {
            debug!(
                "Page {} of session {}: {} links, {} new, {} total",
                state.current_page_index,
                state.session_id,
                found,
                new,
                state.known_urls.len()
            );
        }

        if let Some(ref callback) = self.page_callback {
            callback(state.current_page_index, new, state.known_urls.len());
        }
    }

    async fn resolve_entry(&self, entry: &Entry) -> Result<String> {
        match entry {
            Entry::Direct(url) => Ok(url.clone()),
            Entry::Embedded {
                landing,
                frame_selector,
            } => {
                let request = RenderRequest::navigate(landing)
                    .with_wait_for(Some(format!("css:{}", frame_selector)))
                    .with_timeout_ms(self.timeout_ms);
                let page = self
                    .render_with_retry(request, None)
                    .await
                    .map_err(|reason| ScanError::SessionStart {
                        url: landing.clone(),
                        reason,
                    })?;

                let src = frame_source(&page.markup, &page.url, frame_selector).ok_or_else(|| {
                    ScanError::SessionStart {
                        url: landing.clone(),
                        reason: format!("no frame matching '{}'", frame_selector),
                    }
                })?;
                debug!("Search frame for {} is {}", landing, src);
                Ok(src.to_string())
            }
        }
    }

    /// Render with a fixed number of retries and a fixed pause between them.
    /// Attempts after the first send `retry` when given, else `first` again.
    /// Returns the last failure reason once the attempts are used up.
    async fn render_with_retry(
        &self,
        first: RenderRequest,
        retry: Option<RenderRequest>,
    ) -> std::result::Result<RenderedPage, String> {
        let attempts = self.render_retries + 1;
        let retry = retry.unwrap_or_else(|| first.clone());
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let request = if attempt == 1 { &first } else { &retry };
            match self.client.render(request.clone()).await {
                Ok(page) => return Ok(page),
                Err(ScanError::Unsupported(reason)) => return Err(reason),
                Err(e) => {
                    warn!(
                        "Render attempt {}/{} for {} failed: {}",
                        attempt, attempts, request.url, e
                    );
                    last_error = e.to_string();
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.retry_backoff).await;
            }
        }

        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_url_fills_page_and_offset() {
        let template = "https://cw.com/search#first={offset}&page={page}";
        assert_eq!(Advance::page_url(template, 12, 1), "https://cw.com/search#first=0&page=1");
        assert_eq!(Advance::page_url(template, 12, 3), "https://cw.com/search#first=24&page=3");
    }

    #[test]
    fn test_script_retry_rereads_without_clicking() {
        let advance = Advance::Script {
            code: "next()".into(),
            wait_for: Some("css:.results".into()),
        };
        let first = advance.request("https://s.example/search", 2, "s-1", 1_000);
        let retry = advance.retry_request(&first);

        assert_eq!(first.script.as_deref(), Some("next()"));
        assert!(retry.script.is_none());
        assert!(retry.script_only);
        assert_eq!(retry.session_id.as_deref(), Some("s-1"));
        assert_eq!(retry.wait_for.as_deref(), Some("css:.results"));
    }

    #[test]
    fn test_page_url_retry_repeats_navigation() {
        let advance = Advance::PageUrl {
            template: "https://s.example/search?page={page}".into(),
            page_size: 10,
            wait_for: None,
        };
        let first = advance.request("https://s.example/search", 3, "s-1", 1_000);
        assert_eq!(advance.retry_request(&first), first);
    }

    #[test]
    fn test_absorb_counts_new_links_only() {
        let a = ListingUrl::parse("https://x.com/a").unwrap();
        let b = ListingUrl::parse("https://x.com/b").unwrap();
        let c = ListingUrl::parse("https://x.com/c").unwrap();

        let mut state = SessionState::new("s");
        assert_eq!(state.absorb([a.clone(), b.clone()].into_iter().collect()), 2);
        assert_eq!(state.absorb([b.clone(), c.clone()].into_iter().collect()), 1);
        assert_eq!(state.absorb([a, b.clone()].into_iter().collect()), 0);
        assert_eq!(state.known_urls.len(), 3);
        assert!(state.previous_page_urls.contains(&b));
    }

    #[test]
    fn test_page_links_uses_link_base_and_predicate() {
        let plan = DiscoveryPlan::new(
            Entry::Direct("https://search.example/".into()),
            Arc::new(|url: &ListingUrl| url.contains("US-SMPL")),
            Arc::new(|_: &str| false),
        )
        .with_link_base(Url::parse("https://www.cbre.com").unwrap());

        let page = RenderedPage {
            url: "https://search.example/results".into(),
            markup: r#"<a href="/properties/US-SMPL-1">1</a><a href="/about">about</a>"#.into(),
            links: vec!["https://www.cbre.com/properties/US-SMPL-2".into()],
            script_result: None,
        };

        let links: Vec<String> = plan.page_links(&page).iter().map(|u| u.to_string()).collect();
        assert_eq!(
            links,
            vec![
                "https://www.cbre.com/properties/US-SMPL-1".to_string(),
                "https://www.cbre.com/properties/US-SMPL-2".to_string(),
            ]
        );
    }
}
