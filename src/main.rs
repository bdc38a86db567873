use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tokio::sync::mpsc;

use feedsift::config::Config;
use feedsift::feed::{
    build_http_client, Aggregator, Article, HttpTransport, Source, SourceFetcher,
};
use feedsift::selection::{AlertKind, DigestGenerator, Orchestrator, Report, SelectionEvent};
use feedsift::util::{strip_control_chars, truncate_to_width};

type App = Orchestrator<HttpTransport, DigestGenerator>;

const TITLE_WIDTH: usize = 80;

#[derive(Parser, Debug)]
#[command(name = "feedsift", about = "Security news feed aggregator and briefing tool")]
struct Args {
    /// Config file (default: ~/.config/feedsift/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Print articles and reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List configured sources
    Sources,
    /// Fetch one source
    Fetch { source: String },
    /// Fetch every source and merge the newest articles
    All,
    /// Fetch and merge the given sources
    Custom {
        #[arg(required = true)]
        sources: Vec<String>,
    },
    /// Generate a report
    Report {
        kind: ReportArg,
        /// Source the working set comes from (default: All Sources)
        #[arg(long, conflicts_with = "custom")]
        source: Option<String>,
        /// Sources to aggregate for a custom report
        #[arg(long, num_args = 1..)]
        custom: Vec<String>,
        /// Article guids for a selection report
        #[arg(long = "pick", value_name = "GUID")]
        picks: Vec<String>,
        /// Focus area for a focused report
        #[arg(long, value_enum, default_value = "key-security-alerts")]
        alert: AlertKind,
    },
    /// Load a source and keep refreshing it until Ctrl-C
    Watch { source: String },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ReportArg {
    Executive,
    Focused,
    Full,
    Custom,
    Selection,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config.clone() {
        Some(path) => path,
        None => Config::default_path().context("HOME environment variable not set")?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let client =
        build_http_client(config.request_timeout()).context("Failed to build HTTP client")?;
    let transport = HttpTransport::new(client).with_timeout(config.request_timeout());
    let fetcher = SourceFetcher::new(transport).with_max_items(config.max_items_per_feed);
    let (mut app, mut events) = Orchestrator::new(
        config.sources.clone(),
        fetcher.clone(),
        config.aggregate_limits(),
        DigestGenerator,
        config.selection_settings(),
    );

    match args.command {
        Command::Sources => {
            for source in app.sources() {
                println!("{:<28} {}", source.name, source.url);
            }
        }
        Command::Fetch { source } => {
            let source = resolve(&config, &source)?;
            load(&mut app, &mut events, source).await?;
            print_articles(app.state().articles(), args.json)?;
        }
        Command::All => {
            load(&mut app, &mut events, Source::all_sources()).await?;
            print_articles(app.state().articles(), args.json)?;
        }
        Command::Custom { sources } => {
            let sources = sources
                .iter()
                .map(|name| resolve(&config, name))
                .collect::<Result<Vec<_>>>()?;
            let aggregator = Aggregator::new(fetcher, config.aggregate_limits());
            let aggregation = aggregator.aggregate_subset(&sources).await;
            for failure in &aggregation.failures {
                eprintln!("warning: {}: {}", failure.source.name, failure.message);
            }
            if aggregation.is_total_failure() {
                bail!("Failed to load selected feeds: {}", aggregation.summary());
            }
            print_articles(&aggregation.articles, args.json)?;
        }
        Command::Report {
            kind,
            source,
            custom,
            picks,
            alert,
        } => {
            let report = match kind {
                ReportArg::Custom => {
                    if custom.is_empty() {
                        bail!("A custom report needs at least one --custom source");
                    }
                    for name in &custom {
                        app.toggle_custom_source(resolve(&config, name)?);
                    }
                    app.custom_report().await?
                }
                ReportArg::Selection => {
                    let name = source.context("A selection report needs --source")?;
                    load(&mut app, &mut events, resolve(&config, &name)?).await?;
                    app.toggle_pick_mode()?;
                    for guid in &picks {
                        app.toggle_pick(guid)?;
                    }
                    app.selection_report().await?
                }
                ReportArg::Executive | ReportArg::Focused | ReportArg::Full => {
                    let target = match source {
                        Some(name) => resolve(&config, &name)?,
                        None => Source::all_sources(),
                    };
                    load(&mut app, &mut events, target).await?;
                    match kind {
                        ReportArg::Executive => app.executive_report().await?,
                        ReportArg::Focused => app.focused_report(alert).await?,
                        _ => app.full_report().await?,
                    }
                }
            };
            print_report(&report, args.json)?;
        }
        Command::Watch { source } => {
            let source = resolve(&config, &source)?;
            if source.is_sentinel() {
                bail!("Only a single source can be watched");
            }
            let Some(interval) = config.refresh_interval() else {
                bail!("Auto-refresh is disabled (refresh_interval_minutes = 0)");
            };
            watch(&mut app, &mut events, source, interval, args.json).await?;
        }
    }

    Ok(())
}

fn resolve(config: &Config, name: &str) -> Result<Source> {
    config
        .find_source(name)
        .with_context(|| format!("Unknown source '{}'; run `feedsift sources` to list them", name))
}

/// Selects `source` and waits for its (non-stale) result.
async fn load(
    app: &mut App,
    events: &mut mpsc::Receiver<SelectionEvent>,
    source: Source,
) -> Result<()> {
    tracing::info!(source = %source.name, "Loading");
    app.select_source(source);
    loop {
        let event = events
            .recv()
            .await
            .context("Background fetch channel closed")?;
        if app.handle_event(event) {
            break;
        }
    }
    if let Some(message) = app.state().error() {
        if app.state().articles().is_empty() {
            bail!("{}", message);
        }
        eprintln!("warning: {}", message);
    }
    Ok(())
}

async fn watch(
    app: &mut App,
    events: &mut mpsc::Receiver<SelectionEvent>,
    source: Source,
    interval: std::time::Duration,
    json: bool,
) -> Result<()> {
    load(app, events, source).await?;
    print_articles(app.state().articles(), json)?;

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                app.auto_refresh();
            }
            Some(event) = events.recv() => {
                if app.handle_event(event) {
                    if let Some(message) = app.state().error() {
                        eprintln!("warning: {}", message);
                    } else {
                        print_articles(app.state().articles(), json)?;
                    }
                }
            }
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted, stopping watch");
                break;
            }
        }
    }
    Ok(())
}

fn print_articles(articles: &[Article], json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(articles).context("Failed to encode articles")?;
        println!("{}", out);
        return Ok(());
    }
    if articles.is_empty() {
        println!("No articles.");
        return Ok(());
    }
    for (i, article) in articles.iter().enumerate() {
        // SEC-001: Feed text is untrusted; never echo raw control sequences.
        let title = strip_control_chars(&article.title);
        let date = strip_control_chars(&article.pub_date);
        println!("{:>3}. {}", i + 1, truncate_to_width(&title, TITLE_WIDTH));
        println!("     {}  {}", date, strip_control_chars(&article.link));
        println!("     guid: {}", strip_control_chars(&article.guid));
    }
    Ok(())
}

fn print_report(report: &Report, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(report).context("Failed to encode report")?;
        println!("{}", out);
        return Ok(());
    }
    println!("{}", strip_control_chars(&report.text));
    println!();
    println!("Sources:");
    for cited in &report.sources {
        println!(
            "  [Article {}] {} <{}>",
            cited.index,
            truncate_to_width(&strip_control_chars(&cited.article.title), TITLE_WIDTH),
            strip_control_chars(&cited.article.link)
        );
    }
    Ok(())
}
