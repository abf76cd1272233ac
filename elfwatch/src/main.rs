// elfwatch/src/main.rs
//
// elfwatch — workshop risk dashboard
//
// Three operational modes:
//   serve    — HTTP dashboard and JSON API over the data directory
//   explore  — print columns, sample rows and column types for every CSV
//   probe    — send one trivial prompt through the insight client
//
// Usage:
//   elfwatch --mode serve --data-dir data --template-dir templates
//   elfwatch --mode serve --reload startup --insight
//   elfwatch --mode explore --data-dir data
//   elfwatch --mode probe

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use elfwatch::config::{InsightSettings, ReloadPolicy, Settings, DEFAULT_API_BASE, DEFAULT_MODEL};
use elfwatch::insight::{InsightProvider, OpenAiInsight};
use elfwatch::loader::TableSource;
use elfwatch::summary;
use elfwatch::{AppState, DashboardServer};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name    = "elfwatch",
    about   = "Workshop risk dashboard for elf behavior logs",
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    #[arg(long, value_enum, default_value = "serve")]
    mode: Mode,

    #[arg(long, default_value = "data", help = "Directory holding the workshop CSV files")]
    data_dir: PathBuf,

    #[arg(long, default_value = "templates", help = "Directory holding index.html")]
    template_dir: PathBuf,

    #[arg(long, default_value = "127.0.0.1:5000", help = "Dashboard listen address")]
    bind: SocketAddr,

    #[arg(long, value_enum, default_value_t = ReloadPolicy::PerRequest,
          help = "When the data directory is re-read")]
    reload: ReloadPolicy,

    #[arg(long, help = "Enable the external insight provider (needs OPENAI_API_KEY)")]
    insight: bool,

    #[arg(long, default_value = DEFAULT_MODEL, help = "Insight model name")]
    model: String,

    #[arg(long, default_value = "10", help = "Insight request timeout in seconds")]
    insight_timeout_secs: u64,

    #[arg(long, default_value = DEFAULT_API_BASE, help = "Insight API base URL")]
    api_base: String,
}

#[derive(Clone, ValueEnum)]
enum Mode {
    Serve,    // HTTP dashboard
    Explore,  // one-shot data exploration report
    Probe,    // insight connectivity check
}

impl Cli {
    fn settings(&self) -> Settings {
        let mut settings = Settings::new(&self.data_dir, &self.template_dir);
        settings.bind    = self.bind;
        settings.reload  = self.reload;
        settings.insight = InsightSettings {
            enabled:  self.insight,
            model:    self.model.clone(),
            api_base: self.api_base.trim_end_matches('/').to_string(),
            timeout:  Duration::from_secs(self.insight_timeout_secs),
            ..InsightSettings::default()
        };
        settings
    }
}

// ── Terminal output ───────────────────────────────────────────────────────────

fn print_banner(settings: &Settings) {
    println!("\x1b[1m");
    println!("  elfwatch  \x1b[90m· workshop risk dashboard\x1b[0m");
    println!("\x1b[0m");
    println!("  \x1b[90mdata     : {}\x1b[0m", settings.data_dir.display());
    println!("  \x1b[90mtemplates: {}\x1b[0m", settings.template_dir.display());
    println!("  \x1b[90mreload   : {}\x1b[0m", settings.reload);
    println!(
        "  \x1b[90minsight  : {}\x1b[0m\n",
        if settings.insight.enabled { settings.insight.model.as_str() } else { "off" }
    );
}

// ── Modes ─────────────────────────────────────────────────────────────────────

async fn run_serve(settings: Settings) -> Result<()> {
    let source = TableSource::open(&settings.data_dir, settings.reload)
        .with_context(|| format!("loading data directory {}", settings.data_dir.display()))?;

    let mut state = AppState::new(Arc::new(source), &settings.template_dir);

    if settings.insight.enabled {
        let client = OpenAiInsight::from_env(settings.insight.clone())
            .context("insight provider requested with --insight")?;
        info!("Insight provider enabled (model={}, timeout={:?})", client.model(), client.timeout());
        state = state.with_insight(Arc::new(client));
    }

    if !settings.template_dir.join("index.html").is_file() {
        warn!(
            "Dashboard template missing under {}; / will serve a debug page",
            settings.template_dir.display()
        );
    }

    let server = Arc::new(DashboardServer::new(state, settings.bind));
    server.serve().await
}

fn run_explore(settings: &Settings) -> Result<()> {
    let files = summary::csv_files(&settings.data_dir)
        .with_context(|| format!("listing {}", settings.data_dir.display()))?;

    println!("Available data files:");
    for f in &files {
        println!("- {}", f.file_name().map(|n| n.to_string_lossy()).unwrap_or_default());
    }

    for path in &files {
        match summary::profile_file(path) {
            Ok(profile) => print!("{}", summary::render_profile(&profile)),
            Err(e)      => warn!("Skipping {}: {}", path.display(), e),
        }
    }
    Ok(())
}

async fn run_probe(settings: Settings) -> Result<()> {
    let client = OpenAiInsight::from_env(settings.insight)
        .context("probe needs an API key")?;
    info!("Probing {} with model {}", client.name(), client.model());

    let reply = client.probe().await.context("insight probe failed")?;
    println!("Success! Response: {}", reply);
    Ok(())
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env()
            .add_directive("elfwatch=info".parse()?))
        .compact().init();

    let cli      = Cli::parse();
    let settings = cli.settings();

    match cli.mode {
        Mode::Serve => {
            print_banner(&settings);
            run_serve(settings).await
        }
        Mode::Explore => run_explore(&settings),
        Mode::Probe   => run_probe(settings).await,
    }
}
