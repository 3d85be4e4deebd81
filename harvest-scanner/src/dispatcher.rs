//! Bounded fetch dispatch.
//!
//! [`Dispatcher::dispatch`] turns a set of listing URLs into a lazy stream of
//! [`FetchOutcome`]s. At most `max_concurrent` fetches are in flight, and a
//! fetch is only admitted while the pressure gauge reads at or below the
//! ceiling. Outcomes arrive in completion order, one per URL. Nothing is
//! retried here.

use crate::error::{Result, ScanError};
use crate::listing::ListingUrl;
use crate::pressure::{MemoryPressure, PressureGauge};
use crate::render::{DEFAULT_TIMEOUT_MS, RenderClient, RenderRequest};
use crate::result::FetchOutcome;
use futures::stream::{self, Stream, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Grace period past the render timeout before a fetch is declared dead.
const TIMEOUT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatcherBudget {
    max_concurrent: usize,
    pressure_ceiling: f64,
    poll_interval: Duration,
}

impl DispatcherBudget {
    pub fn new(
        max_concurrent: usize,
        pressure_ceiling: f64,
        poll_interval: Duration,
    ) -> Result<Self> {
        if max_concurrent == 0 {
            return Err(ScanError::InvalidBudget(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        if !(pressure_ceiling > 0.0 && pressure_ceiling <= 1.0) {
            return Err(ScanError::InvalidBudget(format!(
                "pressure_ceiling must be in (0, 1], got {}",
                pressure_ceiling
            )));
        }
        if poll_interval.is_zero() {
            return Err(ScanError::InvalidBudget(
                "poll_interval must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            max_concurrent,
            pressure_ceiling,
            poll_interval,
        })
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn pressure_ceiling(&self) -> f64 {
        self.pressure_ceiling
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

impl Default for DispatcherBudget {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            pressure_ceiling: 0.70,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// How each URL of one dispatch is rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    pub script: Option<String>,
    pub wait_for: Option<String>,
    pub timeout_ms: u64,
}

impl FetchConfig {
    pub fn wait_for(mut self, condition: &str) -> Self {
        self.wait_for = Some(condition.to_string());
        self
    }

    pub fn script(mut self, script: &str) -> Self {
        self.script = Some(script.to_string());
        self
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            script: None,
            wait_for: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

pub struct Dispatcher {
    client: Arc<dyn RenderClient>,
    budget: DispatcherBudget,
    gauge: Arc<dyn PressureGauge>,
    in_flight: AtomicUsize,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn RenderClient>, budget: DispatcherBudget) -> Self {
        Self {
            client,
            budget,
            gauge: Arc::new(MemoryPressure::new()),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_gauge(mut self, gauge: Arc<dyn PressureGauge>) -> Self {
        self.gauge = gauge;
        self
    }

    pub fn budget(&self) -> &DispatcherBudget {
        &self.budget
    }

    /// Fetches currently inside the render client.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Lazily fetch every URL. Nothing starts until the stream is polled.
    pub fn dispatch<'a, I>(
        &'a self,
        urls: I,
        config: &'a FetchConfig,
    ) -> impl Stream<Item = FetchOutcome> + Send + 'a
    where
        I: IntoIterator<Item = ListingUrl>,
        I::IntoIter: Send + 'a,
    {
        stream::iter(urls)
            .map(move |url| self.fetch_one(url, config))
            .buffer_unordered(self.budget.max_concurrent)
    }

    async fn fetch_one(&self, url: ListingUrl, config: &FetchConfig) -> FetchOutcome {
        self.wait_for_headroom(&url).await;

        let _slot = InFlight::enter(&self.in_flight);
        debug!("Fetching {} ({} in flight)", url, self.in_flight());

        let request = RenderRequest::navigate(url.as_str())
            .with_script(config.script.clone())
            .with_wait_for(config.wait_for.clone())
            .with_timeout_ms(config.timeout_ms);
        let deadline = Duration::from_millis(config.timeout_ms) + TIMEOUT_GRACE;

        match tokio::time::timeout(deadline, self.client.render(request)).await {
            Ok(Ok(page)) => FetchOutcome::success(url, page.markup, page.links),
            Ok(Err(e)) => {
                warn!("Fetch failed for {}: {}", url, e);
                FetchOutcome::failure(url, e.to_string())
            }
            Err(_) => {
                warn!("Fetch timed out for {}", url);
                FetchOutcome::failure(url, format!("timed out after {:?}", deadline))
            }
        }
    }

    /// Hold admission while the gauge reads above the ceiling. In-flight
    /// fetches are unaffected.
    async fn wait_for_headroom(&self, url: &ListingUrl) {
        let mut held = false;
        loop {
            match self.gauge.sample() {
                Some(pressure) if pressure > self.budget.pressure_ceiling => {
                    if !held {
                        warn!(
                            "Pressure {:.0}% above ceiling {:.0}%, holding {}",
                            pressure * 100.0,
                            self.budget.pressure_ceiling * 100.0,
                            url
                        );
                        held = true;
                    }
                    tokio::time::sleep(self.budget.poll_interval).await;
                }
                _ => {
                    if held {
                        info!("Pressure subsided, admitting {}", url);
                    }
                    return;
                }
            }
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
