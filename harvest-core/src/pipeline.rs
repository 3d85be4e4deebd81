//! Per-site orchestration: discover listing URLs in one session, fetch them
//! under the dispatcher's budget, and extract records as fetches complete.
//!
//! Two-stage sites fetch each property page first, resolve the embedded
//! document that carries the unit data, fetch that, and attribute the records
//! to the property page.

use crate::extract::{SiteStrategy, extract_records};
use crate::model::UnitRecord;
use crate::sink::{RecordSink, SinkError};
use futures::StreamExt;
use harvest_scanner::{
    Dispatcher, DispatcherBudget, FetchConfig, FetchOutcome, ListingUrl, MemoryPressure,
    PressureGauge, RenderClient, ScanError, SessionNavigator, Termination,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{site}: {source}")]
    SessionStart {
        site: String,
        #[source]
        source: ScanError,
    },

    #[error("{site}: could not store records: {source}")]
    Sink {
        site: String,
        #[source]
        source: SinkError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    Discovering,
    Dispatching,
    Extracting,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Discovering => "discovering",
            RunState::Dispatching => "dispatching",
            RunState::Extracting => "extracting",
            RunState::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    State {
        site: String,
        state: RunState,
    },
    Page {
        site: String,
        page: usize,
        new_urls: usize,
        total_urls: usize,
    },
    Fetched {
        site: String,
        url: ListingUrl,
        success: bool,
    },
    Extracted {
        site: String,
        url: ListingUrl,
        records: usize,
    },
}

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavigationSettings {
    pub max_pages: usize,
    pub render_retries: usize,
    pub retry_backoff: Duration,
    pub timeout_ms: u64,
}

impl Default for NavigationSettings {
    fn default() -> Self {
        Self {
            max_pages: SessionNavigator::DEFAULT_MAX_PAGES,
            render_retries: SessionNavigator::DEFAULT_RENDER_RETRIES,
            retry_backoff: SessionNavigator::DEFAULT_RETRY_BACKOFF,
            timeout_ms: harvest_scanner::render::DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub urls_discovered: usize,
    pub pages_visited: usize,
    pub fetch_successes: usize,
    pub fetch_failures: usize,
    /// Property pages whose embedded detail document could not be located.
    pub resolver_gaps: usize,
    /// Fetched pages where no unit layout matched.
    pub extraction_gaps: usize,
    pub records_extracted: usize,
}

#[derive(Debug, Clone)]
pub struct SiteReport {
    pub site: String,
    pub session_id: String,
    pub records: Vec<UnitRecord>,
    pub stats: RunStats,
    pub termination: Termination,
    /// URLs still failing after every retry pass, with the last reason.
    pub failures: Vec<(ListingUrl, String)>,
}

#[derive(Debug)]
pub struct SiteRunResult {
    pub site: String,
    pub outcome: Result<SiteReport, PipelineError>,
    /// Where the sink put the records.
    pub output: Option<String>,
}

/// Final fetch counts of one dispatch, retries included.
#[derive(Debug, Default)]
struct FetchTally {
    successes: usize,
    failed: Vec<(ListingUrl, String)>,
}

impl FetchTally {
    fn add_to(&self, stats: &mut RunStats) {
        stats.fetch_successes += self.successes;
        stats.fetch_failures += self.failed.len();
    }
}

pub struct Pipeline {
    client: Arc<dyn RenderClient>,
    navigation: NavigationSettings,
    budget: DispatcherBudget,
    gauge: Arc<dyn PressureGauge>,
    fetch_retries: usize,
    progress: Option<ProgressCallback>,
}

impl Pipeline {
    pub fn new(client: Arc<dyn RenderClient>, budget: DispatcherBudget) -> Self {
        Self {
            client,
            navigation: NavigationSettings::default(),
            budget,
            gauge: Arc::new(MemoryPressure::new()),
            fetch_retries: 1,
            progress: None,
        }
    }

    pub fn with_navigation(mut self, navigation: NavigationSettings) -> Self {
        self.navigation = navigation;
        self
    }

    pub fn with_gauge(mut self, gauge: Arc<dyn PressureGauge>) -> Self {
        self.gauge = gauge;
        self
    }

    /// Extra dispatch passes over URLs whose fetch failed.
    pub fn with_fetch_retries(mut self, retries: usize) -> Self {
        self.fetch_retries = retries;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(ref callback) = self.progress {
            callback(event);
        }
    }

    fn enter(&self, site: &str, state: RunState) {
        debug!("{} -> {}", site, state);
        self.emit(ProgressEvent::State {
            site: site.to_string(),
            state,
        });
    }

    fn navigator(&self, site: &str) -> SessionNavigator {
        let mut navigator = SessionNavigator::new(self.client.clone())
            .with_max_pages(self.navigation.max_pages)
            .with_render_retries(self.navigation.render_retries)
            .with_retry_backoff(self.navigation.retry_backoff)
            .with_timeout_ms(self.navigation.timeout_ms);

        if let Some(progress) = self.progress.clone() {
            let site = site.to_string();
            navigator = navigator.with_page_callback(Arc::new(move |page, new_urls, total_urls| {
                progress(ProgressEvent::Page {
                    site: site.clone(),
                    page,
                    new_urls,
                    total_urls,
                })
            }));
        }
        navigator
    }

    /// Harvest one site. Fails only when its discovery session cannot start;
    /// everything else is counted in the report.
    pub async fn run_site(&self, strategy: &dyn SiteStrategy) -> Result<SiteReport, PipelineError> {
        let site = strategy.id().to_string();
        let session_id = format!("{}-{}", site, Uuid::new_v4());
        self.enter(&site, RunState::Idle);

        self.enter(&site, RunState::Discovering);
        let plan = strategy.discovery_plan();
        let discovery = self
            .navigator(&site)
            .discover_all(&plan, &session_id)
            .await
            .map_err(|source| {
                error!("{}: discovery failed: {}", site, source);
                PipelineError::SessionStart {
                    site: site.clone(),
                    source,
                }
            })?;

        if discovery.termination.is_partial() {
            warn!(
                "{}: discovery incomplete ({}), continuing with {} URLs",
                site,
                discovery.termination,
                discovery.urls.len()
            );
        }

        let mut stats = RunStats {
            urls_discovered: discovery.urls.len(),
            pages_visited: discovery.pages_visited,
            ..RunStats::default()
        };
        let mut records = Vec::new();
        let mut failures = Vec::new();

        if !discovery.urls.is_empty() {
            let dispatcher =
                Dispatcher::new(self.client.clone(), self.budget).with_gauge(self.gauge.clone());
            let urls: Vec<ListingUrl> = discovery.urls.into_iter().collect();

            if strategy.requires_resolution() {
                self.fetch_two_stage(
                    strategy,
                    &dispatcher,
                    urls,
                    &mut stats,
                    &mut records,
                    &mut failures,
                )
                .await;
            } else {
                self.enter(&site, RunState::Dispatching);
                let mut extracting = false;
                let config = strategy.fetch_config();
                let tally = self
                    .fetch_with_retries(&site, &dispatcher, urls, &config, |url, markup| {
                        if !extracting {
                            self.enter(&site, RunState::Extracting);
                            extracting = true;
                        }
                        self.extract_into(strategy, &markup, &url, &mut stats, &mut records);
                    })
                    .await;
                tally.add_to(&mut stats);
                failures = tally.failed;
            }
        }

        self.enter(&site, RunState::Done);
        info!(
            "{}: {} records from {} URLs ({} fetched, {} failed)",
            site,
            stats.records_extracted,
            stats.urls_discovered,
            stats.fetch_successes,
            stats.fetch_failures
        );

        Ok(SiteReport {
            site,
            session_id,
            records,
            stats,
            termination: discovery.termination,
            failures,
        })
    }

    async fn fetch_two_stage(
        &self,
        strategy: &dyn SiteStrategy,
        dispatcher: &Dispatcher,
        property_urls: Vec<ListingUrl>,
        stats: &mut RunStats,
        records: &mut Vec<UnitRecord>,
        failures: &mut Vec<(ListingUrl, String)>,
    ) {
        let site = strategy.id().to_string();
        self.enter(&site, RunState::Dispatching);

        // Several property pages may embed the same document.
        let mut origins: BTreeMap<ListingUrl, Vec<ListingUrl>> = BTreeMap::new();
        let mut gaps = 0;
        let property_config = strategy.fetch_config();
        let properties = self
            .fetch_with_retries(&site, dispatcher, property_urls, &property_config, |url, markup| {
                match strategy.resolve_detail_url(&markup, &url) {
                    Some(detail) => origins.entry(detail).or_default().push(url),
                    None => {
                        warn!("{}: no detail document on {}, skipping", site, url);
                        gaps += 1;
                    }
                }
            })
            .await;
        stats.resolver_gaps += gaps;
        properties.add_to(stats);
        failures.extend(properties.failed);

        if origins.is_empty() {
            return;
        }

        let detail_urls: Vec<ListingUrl> = origins.keys().cloned().collect();
        let mut extracting = false;
        let detail_config = strategy.detail_fetch_config();
        let details = self
            .fetch_with_retries(&site, dispatcher, detail_urls, &detail_config, |detail, markup| {
                if !extracting {
                    self.enter(&site, RunState::Extracting);
                    extracting = true;
                }
                for origin in origins.get(&detail).into_iter().flatten() {
                    self.extract_into(strategy, &markup, origin, stats, records);
                }
            })
            .await;
        details.add_to(stats);
        // Report lost detail documents under the property pages that embed them.
        for (detail, reason) in details.failed {
            for origin in origins.get(&detail).into_iter().flatten() {
                failures.push((
                    origin.clone(),
                    format!("detail document {} failed: {}", detail, reason),
                ));
            }
        }
    }

    fn extract_into(
        &self,
        strategy: &dyn SiteStrategy,
        markup: &str,
        url: &ListingUrl,
        stats: &mut RunStats,
        records: &mut Vec<UnitRecord>,
    ) {
        let extraction = extract_records(strategy, markup, url);
        if extraction.is_gap() {
            stats.extraction_gaps += 1;
        }
        stats.records_extracted += extraction.records.len();
        self.emit(ProgressEvent::Extracted {
            site: strategy.id().to_string(),
            url: url.clone(),
            records: extraction.records.len(),
        });
        records.extend(extraction.records);
    }

    /// Dispatch `urls`, handing each successful page to `on_success` as it
    /// arrives. Failed URLs get up to `fetch_retries` further passes.
    async fn fetch_with_retries<F>(
        &self,
        site: &str,
        dispatcher: &Dispatcher,
        urls: Vec<ListingUrl>,
        config: &FetchConfig,
        mut on_success: F,
    ) -> FetchTally
    where
        F: FnMut(ListingUrl, String),
    {
        let mut pending = urls;
        let mut tally = FetchTally::default();

        for pass in 0..=self.fetch_retries {
            if pending.is_empty() {
                break;
            }
            if pass > 0 {
                info!("{}: retrying {} failed fetches (pass {})", site, pending.len(), pass + 1);
            }

            tally.failed.clear();
            let mut outcomes = std::pin::pin!(dispatcher.dispatch(pending, config));
            while let Some(outcome) = outcomes.next().await {
                self.emit(ProgressEvent::Fetched {
                    site: site.to_string(),
                    url: outcome.url().clone(),
                    success: outcome.is_success(),
                });
                match outcome {
                    FetchOutcome::Success { url, markup, .. } => {
                        tally.successes += 1;
                        on_success(url, markup);
                    }
                    FetchOutcome::Failure { url, reason } => tally.failed.push((url, reason)),
                }
            }
            pending = tally.failed.iter().map(|(url, _)| url.clone()).collect();
        }

        for (url, reason) in &tally.failed {
            warn!("{}: giving up on {}: {}", site, url, reason);
        }
        tally
    }

    /// Harvest several sites at once, each with its own session and
    /// dispatcher, and hand every finished collection to `sink`.
    pub async fn run_sites(
        &self,
        strategies: &[Arc<dyn SiteStrategy>],
        sink: &dyn RecordSink,
    ) -> Vec<SiteRunResult> {
        let runs = strategies.iter().map(|strategy| async move {
            let outcome = self.run_site(strategy.as_ref()).await;
            (strategy.id().to_string(), outcome)
        });
        let finished = futures::future::join_all(runs).await;

        finished
            .into_iter()
            .map(|(site, outcome)| match outcome {
                Ok(report) => match sink.persist(&site, &report.records) {
                    Ok(output) => SiteRunResult {
                        site,
                        outcome: Ok(report),
                        output: Some(output),
                    },
                    Err(source) => {
                        error!("{}: could not store records: {}", site, source);
                        SiteRunResult {
                            outcome: Err(PipelineError::Sink {
                                site: site.clone(),
                                source,
                            }),
                            site,
                            output: None,
                        }
                    }
                },
                Err(e) => SiteRunResult {
                    site,
                    outcome: Err(e),
                    output: None,
                },
            })
            .collect()
    }
}
