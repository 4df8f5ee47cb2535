//! Kynos - fuzzy-find S&P 500 companies and chart their price history.

mod api;
mod app;
mod bitap;
mod cache;
mod catalog;
mod cli;
mod config;
mod error;
mod export;
mod flow;
mod intent;
mod models;
mod resolver;
mod search;
mod ui;

use anyhow::{Context, Result};
use api::{MarketData, PolygonClient, RetryPolicy};
use app::{Action, App};
use cache::{CacheStatus, ClientCache};
use catalog::CatalogSource;
use cli::{Args, CacheAction, Command, ExportFormat};
use config::Config;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use error::{CatalogError, FlowError};
use flow::IntentFlow;
use intent::{IntentResolver, OpenAiClient};
use models::{Catalog, MatchCandidate, ResolvedSelection, StockChart};
use ratatui::{Terminal, backend::CrosstermBackend};
use reqwest::Client;
use resolver::TickerResolver;
use search::SearchService;
use std::io;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use ui::UiColors;

#[tokio::main]
async fn main() -> Result<()> {
    // API keys may live in a .env next to the binary's working directory
    let _ = dotenvy::dotenv();

    let args = Args::parse_args();
    init_logging(args.verbose);

    let mut config = Config::resolve(args.config.as_deref())?;
    apply_overrides(&mut config, &args);

    let cache = if args.no_cache {
        None
    } else {
        open_cache(&config)?
    };

    match args.command.clone() {
        Some(Command::Config) => {
            print_config();
            Ok(())
        }
        Some(Command::Cache {
            action: CacheAction::Clear,
        }) => clear_cache(&config, cache.as_ref()),
        Some(command) => {
            let services = Services::new(&config)?;
            match run_command(&command, &config, cache.as_ref(), &services).await {
                Ok(output) => {
                    print!("{}", render_output(&output, args.export)?);
                    Ok(())
                }
                Err(e) => {
                    tracing::debug!(error = ?e, "command failed");
                    print!("{}", export::export_error(&e.envelope(), args.export));
                    std::process::exit(1);
                }
            }
        }
        None => {
            let services = Services::new(&config)?;
            run_interactive(&config, cache.as_ref(), &services).await
        }
    }
}

/// Logs go to stderr; RUST_LOG wins over --verbose.
fn init_logging(verbose: bool) {
    let default = if verbose { "kynos=info" } else { "kynos=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(timeout) = args.timeout {
        config.general.timeout = timeout;
    }
    if let Some(ref source) = args.catalog {
        config.catalog.source = source.clone();
    }
}

fn open_cache(config: &Config) -> Result<Option<ClientCache>> {
    let ttl = config.catalog.ttl()?;
    match config.catalog.cache_dir() {
        Some(dir) => Ok(Some(ClientCache::new(dir, ttl))),
        None => {
            tracing::warn!("no cache directory available, catalog cache disabled");
            Ok(None)
        }
    }
}

fn print_config() {
    match Config::default_config_path() {
        Some(path) => println!("# Default config path: {}", path.display()),
        None => println!("# No default config path on this platform"),
    }
    println!();
    print!("{}", config::sample_config());
}

fn clear_cache(config: &Config, cache: Option<&ClientCache>) -> Result<()> {
    let Some(cache) = cache else {
        println!("Catalog cache is disabled");
        return Ok(());
    };

    cache.invalidate(&config.catalog.cache_key)?;
    println!(
        "Cleared cached catalog \"{}\" in {}",
        config.catalog.cache_key,
        cache.dir().display()
    );
    Ok(())
}

/// External clients shared by the commands and the TUI.
struct Services {
    client: Client,
    retry: RetryPolicy,
    market: PolygonClient,
    intent: OpenAiClient,
}

impl Services {
    fn new(config: &Config) -> Result<Self> {
        let client = api::http_client(config.timeout()).context("Failed to build HTTP client")?;
        let retry = RetryPolicy::new(config.general.retries);

        let market = PolygonClient::new(
            client.clone(),
            &config.market_data.base_url,
            env_key(&config.market_data.api_key_env),
            &config.market_data.api_key_env,
            retry,
        );
        let intent = OpenAiClient::new(
            client.clone(),
            &config.intent.base_url,
            &config.intent.model,
            env_key(&config.intent.api_key_env),
            &config.intent.api_key_env,
            retry,
        )
        .include_catalog(config.intent.include_catalog);

        Ok(Self {
            client,
            retry,
            market,
            intent,
        })
    }
}

fn env_key(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// How the catalog was obtained, for the `catalog` command.
fn cache_label(refreshed: bool, status: Option<CacheStatus>) -> String {
    match status {
        None => "disabled".to_string(),
        Some(_) if refreshed => "refreshed".to_string(),
        Some(status) => status.to_string(),
    }
}

async fn load_catalog(
    config: &Config,
    cache: Option<&ClientCache>,
    services: &Services,
    refresh: bool,
) -> Result<(Catalog, Option<CacheStatus>), CatalogError> {
    let source = CatalogSource::parse(&config.catalog.source);
    let key = &config.catalog.cache_key;

    match cache {
        None => {
            let catalog = source.load(&services.client, services.retry).await?;
            Ok((catalog, None))
        }
        Some(cache) => {
            if refresh {
                if let Err(e) = cache.invalidate(key) {
                    tracing::warn!(error = %e, "failed to invalidate catalog cache");
                }
            }
            let (catalog, status) = cache
                .get_or_load(key, &source, &services.client, services.retry)
                .await?;
            Ok((catalog, Some(status)))
        }
    }
}

/// Result of a one-shot command, rendered by [`render_output`].
enum Output {
    Candidates(Vec<MatchCandidate>),
    Chart(StockChart),
    Catalog(export::CatalogSummary),
}

fn render_output(output: &Output, format: ExportFormat) -> Result<String> {
    let rendered = match output {
        Output::Candidates(candidates) => export::export_candidates(candidates, format),
        Output::Chart(chart) => export::export_chart(chart, format),
        Output::Catalog(summary) => export::export_catalog(summary, format),
    };
    rendered.context("Failed to render output")
}

async fn run_command(
    command: &Command,
    config: &Config,
    cache: Option<&ClientCache>,
    services: &Services,
) -> Result<Output, FlowError> {
    if !command.needs_catalog() {
        return Err(FlowError::Unprocessable);
    }
    let refresh = matches!(command, Command::Catalog { refresh: true });
    let (catalog, status) = load_catalog(config, cache, services, refresh).await?;

    match command {
        Command::Ask { prompt } => {
            let prompt = prompt.join(" ");
            let chart = ask(&services.intent, &services.market, &catalog, &prompt).await?;
            Ok(Output::Chart(chart))
        }
        Command::Search { query, limit } => {
            let search = SearchService::init(&catalog, config.search.threshold, config.search.limit);
            let limit = limit.unwrap_or(config.search.limit);
            Ok(Output::Candidates(search.search_with_limit(query, limit)))
        }
        Command::History { symbol, days } => {
            let resolver = TickerResolver::new(&catalog);
            let name = resolver
                .resolve_by_symbol(symbol)
                .ok_or_else(|| FlowError::CompanyNotFound(symbol.clone()))?;
            let selection = ResolvedSelection {
                symbol: symbol.trim().to_uppercase(),
                name: name.to_string(),
            };
            let days = days.unwrap_or(config.search.days).max(1);
            let chart = flow::history(&services.market, &selection, days).await?;
            Ok(Output::Chart(chart))
        }
        Command::Catalog { refresh } => Ok(Output::Catalog(export::CatalogSummary {
            source: config.catalog.source.clone(),
            records: catalog.len(),
            cache: cache_label(*refresh, status),
        })),
        Command::Cache { .. } | Command::Config => Err(FlowError::Unprocessable),
    }
}

async fn ask<I: IntentResolver, M: MarketData>(
    intent: &I,
    market: &M,
    catalog: &Catalog,
    prompt: &str,
) -> Result<StockChart, FlowError> {
    let resolver = TickerResolver::new(catalog);
    let names = catalog.names();
    IntentFlow::new(intent, market, &resolver, &names)
        .run(prompt)
        .await
}

/// Run in interactive mode with TUI.
async fn run_interactive(
    config: &Config,
    cache: Option<&ClientCache>,
    services: &Services,
) -> Result<()> {
    let (mut catalog, _) = load_catalog(config, cache, services, false)
        .await
        .map_err(FlowError::from)?;
    if catalog.is_empty() {
        tracing::warn!(source = %config.catalog.source, "ticker catalog is empty");
    }

    let search = SearchService::init(&catalog, config.search.threshold, config.search.limit);
    let mut app = App::new(search, catalog.len(), config.search.clear_on_focus);
    let colors = UiColors::from_config(&config.colors);

    // Setup terminal
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Main loop
    let result = run_app(
        &mut terminal,
        &mut app,
        &colors,
        &mut catalog,
        Session {
            config,
            cache,
            services,
        },
    )
    .await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

/// Everything the event loop needs to run an [`Action`].
struct Session<'a> {
    config: &'a Config,
    cache: Option<&'a ClientCache>,
    services: &'a Services,
}

/// Main application loop.
async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    colors: &UiColors,
    catalog: &mut Catalog,
    session: Session<'_>,
) -> Result<()> {
    let Session {
        config,
        cache,
        services,
    } = session;
    let tick_rate = Duration::from_millis(100);

    loop {
        // Draw UI
        terminal.draw(|f| ui::render(f, app, colors))?;

        let mut action = Action::None;
        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    action = handle_key_event(app, key.code, key.modifiers);
                }
            }
        }

        if app.should_quit() {
            break;
        }

        match action {
            Action::None => {}
            Action::FetchHistory(selection) => {
                terminal.draw(|f| ui::render(f, app, colors))?;
                let result = flow::history(&services.market, &selection, config.search.days).await;
                app.finish(result);
            }
            Action::Ask(prompt) => {
                terminal.draw(|f| ui::render(f, app, colors))?;
                let result = ask(&services.intent, &services.market, catalog, &prompt).await;
                app.finish(result);
            }
            Action::ReloadCatalog => {
                terminal.draw(|f| ui::render(f, app, colors))?;
                match load_catalog(config, cache, services, true).await {
                    Ok((reloaded, _)) => {
                        *catalog = reloaded;
                        app.reload(catalog);
                    }
                    Err(e) => app.fail(FlowError::from(e)),
                }
            }
        }
    }

    Ok(())
}

/// Handle keyboard input.
fn handle_key_event(app: &mut App, code: KeyCode, modifiers: KeyModifiers) -> Action {
    // Close help overlay on any key
    if app.show_help {
        app.show_help = false;
        return Action::None;
    }

    // Clear error on any key
    if app.error.is_some() {
        app.error = None;
        return Action::None;
    }

    let ctrl = modifiers.contains(KeyModifiers::CONTROL);

    match code {
        KeyCode::Esc => app.quit(),
        KeyCode::Char('c') if ctrl => app.quit(),
        KeyCode::Char('u') if ctrl => app.clear_input(),
        KeyCode::Char('r') if ctrl => return app.request_reload(),
        KeyCode::Char('?') if app.input.is_empty() => app.toggle_help(),

        KeyCode::Up => app.select_up(),
        KeyCode::Down => app.select_down(),
        KeyCode::Tab => app.toggle_mode(),
        KeyCode::Enter => return app.submit(),
        KeyCode::Backspace => app.backspace(),
        KeyCode::Char(c) if !ctrl => app.push_char(c),

        _ => {}
    }

    Action::None
}
