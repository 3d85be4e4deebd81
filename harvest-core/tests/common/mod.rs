#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use harvest_core::UnitRecord;
use harvest_core::extract::{LayoutAttempt, PropertyHeader, SiteStrategy, UnitFields};
use harvest_core::markup::{Document, text_in};
use harvest_scanner::render::frame_source;
use harvest_scanner::{
    Advance, DiscoveryPlan, DispatcherBudget, Entry, ListingUrl, NoPressure, RenderClient,
    RenderRequest, RenderedPage, Result, ScanError,
};
use harvest_core::pipeline::{NavigationSettings, Pipeline};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SEARCH_URL: &str = "https://demo.example/search";

/// Session requests replay `search_pages`; everything else is looked up by
/// URL. Each URL has a queue of replies whose last entry repeats.
#[derive(Default)]
pub struct StubClient {
    search_pages: Mutex<VecDeque<std::result::Result<String, String>>>,
    pages: Mutex<HashMap<String, VecDeque<std::result::Result<String, String>>>>,
    requests: Mutex<Vec<RenderRequest>>,
}

impl StubClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(self, markup: &str) -> Self {
        self.search_pages.lock().unwrap().push_back(Ok(markup.to_string()));
        self
    }

    pub fn search_fails(self, reason: &str) -> Self {
        self.search_pages.lock().unwrap().push_back(Err(reason.to_string()));
        self
    }

    pub fn page(self, url: &str, markup: &str) -> Self {
        self.push(url, Ok(markup.to_string()))
    }

    pub fn failing(self, url: &str, reason: &str) -> Self {
        self.push(url, Err(reason.to_string()))
    }

    fn push(self, url: &str, reply: std::result::Result<String, String>) -> Self {
        self.pages
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn requests_for(&self, url: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|r| r.url == url).count()
    }

    pub fn requests(&self) -> Vec<RenderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RenderClient for StubClient {
    async fn render(&self, request: RenderRequest) -> Result<RenderedPage> {
        self.requests.lock().unwrap().push(request.clone());

        let reply = if request.session_id.is_some() {
            self.search_pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err("search exhausted".to_string()))
        } else {
            let mut pages = self.pages.lock().unwrap();
            match pages.get_mut(&request.url) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some(queue) => queue.front().cloned().unwrap(),
                None => Err("404".to_string()),
            }
        };

        match reply {
            Ok(markup) => Ok(RenderedPage {
                url: request.url,
                markup,
                links: Vec::new(),
                script_result: None,
            }),
            Err(reason) => Err(ScanError::RenderFailed {
                url: request.url,
                reason,
            }),
        }
    }
}

/// A results page linking to `/listing/{id}` for each id.
pub fn search_page(ids: &[&str], last: bool) -> String {
    let links: String = ids
        .iter()
        .map(|id| format!(r#"<a href="/listing/{id}">{id}</a>"#))
        .collect();
    let marker = if last { r#"<span class="last-page"></span>"# } else { "" };
    format!("<html><body>{links}{marker}</body></html>")
}

pub fn listing_url(id: &str) -> String {
    format!("https://demo.example/listing/{}", id)
}

/// A detail page with one unit row per `(suite, size, rate)`.
pub fn detail_page(name: &str, units: &[(&str, &str, &str)]) -> String {
    let rows: String = units
        .iter()
        .map(|(suite, size, rate)| {
            format!(
                r#"<tr class="unit"><td class="suite">{suite}</td><td class="size">{size}</td><td class="rate">{rate}</td></tr>"#
            )
        })
        .collect();
    format!(
        r#"<html><body><h1>{name}</h1><p class="street">1 Demo Way</p><p class="city">Austin, TX</p><table>{rows}</table></body></html>"#
    )
}

fn unit_rows(doc: &Document) -> Vec<UnitFields> {
    doc.select("tr.unit")
        .into_iter()
        .map(|row| {
            UnitFields::new(
                text_in(row, "td.suite"),
                text_in(row, "td.size"),
                text_in(row, "td.rate"),
            )
        })
        .collect()
}

fn summary_block(doc: &Document) -> Vec<UnitFields> {
    let space = doc.text_of(".summary .size");
    let price = doc.text_of(".summary .rate");
    if space.is_none() && price.is_none() {
        return Vec::new();
    }
    vec![UnitFields::new(None, space, price)]
}

/// Paginated demo site; with `embedded` its unit data lives in a `#detail`
/// frame of each listing page.
pub struct DemoSite {
    pub id: &'static str,
    pub embedded: bool,
}

impl DemoSite {
    pub fn direct(id: &'static str) -> Self {
        Self { id, embedded: false }
    }

    pub fn embedded(id: &'static str) -> Self {
        Self { id, embedded: true }
    }
}

impl SiteStrategy for DemoSite {
    fn id(&self) -> &'static str {
        self.id
    }

    fn display_name(&self) -> &'static str {
        "Demo"
    }

    fn discovery_plan(&self) -> DiscoveryPlan {
        DiscoveryPlan::new(
            Entry::Direct(SEARCH_URL.to_string()),
            Arc::new(|url: &ListingUrl| url.contains("/listing/")),
            Arc::new(|markup: &str| markup.contains("last-page")),
        )
        .with_advance(Advance::Script {
            code: "next()".to_string(),
            wait_for: None,
        })
    }

    fn header(&self, doc: &Document) -> PropertyHeader {
        PropertyHeader {
            name: doc.text_of("h1"),
            street: doc.text_of(".street"),
            locality: doc.text_of(".city"),
        }
    }

    fn layouts(&self) -> Vec<LayoutAttempt> {
        vec![
            LayoutAttempt { name: "rows", parse: unit_rows },
            LayoutAttempt { name: "summary", parse: summary_block },
        ]
    }

    fn requires_resolution(&self) -> bool {
        self.embedded
    }

    fn resolve_detail_url(&self, markup: &str, page_url: &ListingUrl) -> Option<ListingUrl> {
        frame_source(markup, page_url.as_str(), "#detail")
    }
}

pub fn pipeline(client: Arc<StubClient>) -> Pipeline {
    let budget = DispatcherBudget::new(4, 0.9, Duration::from_millis(10)).unwrap();
    Pipeline::new(client, budget)
        .with_gauge(Arc::new(NoPressure))
        .with_navigation(NavigationSettings {
            max_pages: 20,
            render_retries: 0,
            retry_backoff: Duration::from_millis(1),
            timeout_ms: 5_000,
        })
        .with_fetch_retries(0)
}

pub fn record(url: &str, suite: &str) -> UnitRecord {
    UnitRecord {
        property_name: "Demo Tower".into(),
        address: "1 Demo Way, Austin, TX".into(),
        listing_url: ListingUrl::parse(url).unwrap(),
        floor_or_suite: suite.into(),
        space_available: "1,000 SF".into(),
        price: "$20/SF".into(),
        observed_at: Utc::now(),
    }
}
