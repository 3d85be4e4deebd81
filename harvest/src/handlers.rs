use anyhow::{Context, Result, anyhow, bail};
use clap::ArgMatches;
use colored::Colorize;
use harvest_core::config::{HarvestConfig, OutputConfig, OutputFormat, RendererConfig, RendererKind};
use harvest_core::data::Database;
use harvest_core::pipeline::{ProgressCallback, ProgressEvent, RunState};
use harvest_core::report::{ReportFormat, generate_run_report};
use harvest_core::{JsonFileSink, Pipeline, RecordSink, SiteStrategy, StrategyRegistry};
use harvest_scanner::{HttpRenderClient, RemoteRenderClient, RenderClient};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub const DATABASE_FILE: &str = "harvest.db";

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOverrides {
    pub renderer: Option<String>,
    pub endpoint: Option<String>,
    pub max_concurrent: Option<usize>,
    pub pressure_ceiling: Option<f64>,
    pub max_pages: Option<usize>,
    pub output: Option<String>,
    pub format: Option<String>,
}

impl RunOverrides {
    pub fn from_matches(args: &ArgMatches) -> Self {
        Self {
            renderer: args.get_one::<String>("renderer").cloned(),
            endpoint: args.get_one::<String>("endpoint").cloned(),
            max_concurrent: args.get_one::<usize>("max-concurrent").copied(),
            pressure_ceiling: args.get_one::<f64>("pressure-ceiling").copied(),
            max_pages: args.get_one::<usize>("max-pages").copied(),
            output: args.get_one::<String>("output").cloned(),
            format: args.get_one::<String>("format").cloned(),
        }
    }
}

/// Install the log subscriber. `RUST_LOG` wins; otherwise `info`, or `warn`
/// when running quietly.
pub fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn print_banner() {
    println!("{}", "═".repeat(60).bright_blue().bold());
    println!(
        "{}  {}",
        "  HARVEST".bright_white().bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).bright_black()
    );
    println!("{}", "  commercial listing harvester".bright_black());
    println!("{}", "═".repeat(60).bright_blue().bold());
    println!();
}

/// Read the config file if one was given, otherwise start from defaults.
pub fn load_config(path: Option<&str>) -> Result<HarvestConfig> {
    match path {
        Some(path) => Ok(HarvestConfig::load(path)?),
        None => Ok(HarvestConfig::default()),
    }
}

pub fn apply_overrides(config: &mut HarvestConfig, overrides: &RunOverrides) -> Result<()> {
    if let Some(ref renderer) = overrides.renderer {
        config.renderer.kind = RendererKind::parse(renderer)
            .ok_or_else(|| anyhow!("Unknown renderer '{}'", renderer))?;
    }
    if let Some(ref endpoint) = overrides.endpoint {
        config.renderer.endpoint = Some(endpoint.clone());
    }
    if let Some(max_concurrent) = overrides.max_concurrent {
        config.budget.max_concurrent = max_concurrent;
    }
    if let Some(ceiling) = overrides.pressure_ceiling {
        config.budget.pressure_ceiling = ceiling;
    }
    if let Some(max_pages) = overrides.max_pages {
        config.navigation.max_pages = max_pages;
    }
    if let Some(ref output) = overrides.output {
        config.output.dir = output.clone();
    }
    if let Some(ref format) = overrides.format {
        config.output.format = OutputFormat::parse(format)
            .ok_or_else(|| anyhow!("Unknown output format '{}'", format))?;
    }
    Ok(())
}

/// Resolve `--site` names (or `--all`) against the registry, keeping the
/// order given and dropping repeats.
pub fn select_strategies(
    registry: &StrategyRegistry,
    sites: &[String],
    all: bool,
) -> Result<Vec<Arc<dyn SiteStrategy>>> {
    if all {
        return Ok(registry.all());
    }
    if sites.is_empty() {
        bail!("Either --site or --all must be provided");
    }

    let mut selected: Vec<Arc<dyn SiteStrategy>> = Vec::new();
    for name in sites {
        let strategy = registry.get(&name.to_lowercase()).ok_or_else(|| {
            anyhow!(
                "Unknown site '{}' (known: {})",
                name,
                registry.ids().join(", ")
            )
        })?;
        if !selected.iter().any(|s| s.id() == strategy.id()) {
            selected.push(strategy);
        }
    }
    Ok(selected)
}

pub fn build_render_client(config: &RendererConfig) -> Result<Arc<dyn RenderClient>> {
    match config.kind {
        RendererKind::Http => {
            let timeout_secs = (config.timeout_ms / 1000).max(1);
            let client = HttpRenderClient::with_timeout(timeout_secs)
                .context("Could not build HTTP client")?;
            Ok(Arc::new(client))
        }
        RendererKind::Remote => {
            let endpoint = config
                .endpoint
                .as_deref()
                .ok_or_else(|| anyhow!("The remote renderer needs an endpoint (--endpoint)"))?;
            let client = RemoteRenderClient::new(endpoint)
                .with_context(|| format!("Could not use render service at {}", endpoint))?;
            Ok(Arc::new(client))
        }
    }
}

/// Create the output directory and the sink that writes into it.
pub fn build_sink(config: &OutputConfig) -> Result<Box<dyn RecordSink>> {
    let dir = config.expanded_dir();
    fs::create_dir_all(&dir)
        .with_context(|| format!("Could not create output directory {}", dir.display()))?;

    match config.format {
        OutputFormat::Json => Ok(Box::new(JsonFileSink::new(dir))),
        OutputFormat::Sqlite => {
            let db_path = dir.join(DATABASE_FILE);
            let db = Database::new(&db_path)
                .with_context(|| format!("Could not open database {}", db_path.display()))?;
            Ok(Box::new(db))
        }
    }
}

pub fn list_sites(registry: &StrategyRegistry) -> String {
    let width = registry.ids().iter().map(|id| id.len()).max().unwrap_or(0);
    registry
        .all()
        .iter()
        .map(|s| format!("  {:width$}  {}\n", s.id(), s.display_name(), width = width))
        .collect()
}

pub fn handle_sites() {
    let registry = StrategyRegistry::with_defaults();
    println!("{}", "KNOWN SITES".bright_blue().bold());
    print!("{}", list_sites(&registry));
}

fn progress_message(event: &ProgressEvent) -> Option<String> {
    match event {
        ProgressEvent::State { site, state } if *state != RunState::Idle => {
            Some(format!("{}: {}", site, state))
        }
        ProgressEvent::Page {
            site,
            page,
            total_urls,
            ..
        } => Some(format!(
            "{}: results page {} ({} listings so far)",
            site, page, total_urls
        )),
        ProgressEvent::Fetched { site, url, .. } => {
            Some(format!("{}: fetched {}", site, url_path(url.as_str())))
        }
        _ => None,
    }
}

fn url_path(url: &str) -> &str {
    url.split_once("://")
        .and_then(|(_, rest)| rest.find('/').map(|i| &rest[i..]))
        .unwrap_or("/")
}

pub async fn handle_run(args: &ArgMatches, quiet: bool) -> Result<()> {
    let mut config = load_config(args.get_one::<String>("config").map(String::as_str))?;
    apply_overrides(&mut config, &RunOverrides::from_matches(args))?;

    let registry = StrategyRegistry::with_defaults();
    let sites: Vec<String> = args
        .get_many::<String>("site")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let strategies = select_strategies(&registry, &sites, args.get_flag("all"))?;

    let report_format = args
        .get_one::<String>("report-format")
        .and_then(|f| ReportFormat::parse(f))
        .unwrap_or(ReportFormat::Text);

    let client = build_render_client(&config.renderer)?;
    let sink = build_sink(&config.output)?;
    let budget = config.dispatcher_budget()?;

    if !quiet {
        let names: Vec<&str> = strategies.iter().map(|s| s.display_name()).collect();
        println!("{} Sites: {}", "→".blue(), names.join(", ").bright_white());
        println!(
            "{} Renderer: {:?}, up to {} fetches in flight",
            "→".blue(),
            config.renderer.kind,
            budget.max_concurrent()
        );
        println!(
            "{} Output: {}",
            "→".blue(),
            config.output.expanded_dir().display().to_string().bright_white()
        );
        println!();
    }

    let spinner = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message("starting");

    let bar = spinner.clone();
    let progress: ProgressCallback = Arc::new(move |event: ProgressEvent| {
        if let Some(message) = progress_message(&event) {
            bar.set_message(message);
        }
    });

    let pipeline = Pipeline::new(client, budget)
        .with_navigation(config.navigation_settings())
        .with_fetch_retries(config.pipeline.fetch_retries)
        .with_progress_callback(progress);

    info!("Harvesting {} site(s)", strategies.len());
    let results = pipeline.run_sites(&strategies, sink.as_ref()).await;
    spinner.finish_and_clear();

    print!("{}", generate_run_report(&results, report_format));

    let failed = results.iter().filter(|r| r.outcome.is_err()).count();
    if failed == results.len() && !results.is_empty() {
        bail!("No site could be harvested");
    }
    if !quiet && failed == 0 {
        println!("{} Harvest complete", "✓".green().bold());
    }
    Ok(())
}
