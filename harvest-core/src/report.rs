// Run summaries

use crate::pipeline::{RunStats, SiteRunResult};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteSummary {
    pub site: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<RunStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_urls: Vec<FailedUrl>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedUrl {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub sites: Vec<SiteSummary>,
    pub totals: RunStats,
}

pub fn gather_report_data(results: &[SiteRunResult]) -> RunReport {
    let mut totals = RunStats::default();
    let sites = results
        .iter()
        .map(|result| match &result.outcome {
            Ok(report) => {
                let stats = &report.stats;
                totals.urls_discovered += stats.urls_discovered;
                totals.pages_visited += stats.pages_visited;
                totals.fetch_successes += stats.fetch_successes;
                totals.fetch_failures += stats.fetch_failures;
                totals.resolver_gaps += stats.resolver_gaps;
                totals.extraction_gaps += stats.extraction_gaps;
                totals.records_extracted += stats.records_extracted;

                let status = if report.termination.is_partial() || stats.fetch_failures > 0 {
                    "partial"
                } else {
                    "completed"
                };
                SiteSummary {
                    site: result.site.clone(),
                    status: status.to_string(),
                    termination: Some(report.termination.to_string()),
                    stats: Some(stats.clone()),
                    output: result.output.clone(),
                    error: None,
                    failed_urls: report
                        .failures
                        .iter()
                        .map(|(url, reason)| FailedUrl {
                            url: url.to_string(),
                            reason: reason.clone(),
                        })
                        .collect(),
                }
            }
            Err(e) => SiteSummary {
                site: result.site.clone(),
                status: "failed".to_string(),
                termination: None,
                stats: None,
                output: None,
                error: Some(e.to_string()),
                failed_urls: Vec::new(),
            },
        })
        .collect();

    RunReport { sites, totals }
}

pub fn generate_run_report(results: &[SiteRunResult], format: ReportFormat) -> String {
    let data = gather_report_data(results);
    match format {
        ReportFormat::Text => generate_text_report(&data),
        ReportFormat::Json => serde_json::to_string_pretty(&data).unwrap_or_else(|e| {
            format!("{{\"error\": \"could not serialize report: {}\"}}", e)
        }),
    }
}

fn generate_text_report(data: &RunReport) -> String {
    let mut out = String::new();
    out.push_str("=== Harvest Summary ===\n\n");

    for site in &data.sites {
        out.push_str(&format!("[{}] {}\n", site.status.to_uppercase(), site.site));

        if let Some(ref error) = site.error {
            out.push_str(&format!("  error: {}\n\n", error));
            continue;
        }
        if let Some(ref termination) = site.termination {
            out.push_str(&format!("  discovery ended: {}\n", termination));
        }
        if let Some(ref stats) = site.stats {
            out.push_str(&format!(
                "  URLs discovered: {} over {} pages\n",
                stats.urls_discovered, stats.pages_visited
            ));
            out.push_str(&format!(
                "  fetches: {} ok, {} failed\n",
                stats.fetch_successes, stats.fetch_failures
            ));
            if stats.resolver_gaps > 0 {
                out.push_str(&format!("  detail documents not found: {}\n", stats.resolver_gaps));
            }
            out.push_str(&format!(
                "  records: {} ({} pages without unit data)\n",
                stats.records_extracted, stats.extraction_gaps
            ));
        }
        for failed in &site.failed_urls {
            out.push_str(&format!("  ! {} ({})\n", failed.url, failed.reason));
        }
        if let Some(ref output) = site.output {
            out.push_str(&format!("  saved to {}\n", output));
        }
        out.push('\n');
    }

    out.push_str(&format!(
        "Total: {} records from {} URLs across {} sites\n",
        data.totals.records_extracted,
        data.totals.urls_discovered,
        data.sites.len()
    ));
    out
}
