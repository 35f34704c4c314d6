//! quizcache - command-line driver for the quiz data layer.
//!
//! Lists the locally held quizzes, refreshes them from the configured
//! source, edits the persisted settings, and can run the refresh scheduler
//! in the foreground to watch updates arrive.

use std::io;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use quizcache_core::config::{ENV_REFRESH_INTERVAL, ENV_SOURCE_URL};
use quizcache_core::{
    ApiClient, CacheManager, Config, QuizEvent, QuizFetcher, QuizRepository, QuizStore,
    RefreshOutcome, RefreshScheduler, Settings,
};

const USAGE: &str = "\
Usage: quizcache [COMMAND]

Commands:
  list                      List the quizzes currently held (default)
  show <number>             Show the questions of one quiz
  refresh                   Fetch quizzes from the configured source now
  watch                     Run the refresh scheduler; type r (refresh),
                            f (foreground) or q (quit) and press enter
  config                    Print the effective configuration
  config set-url <url>      Set and persist the quiz source URL
  config set-interval <s>   Set and persist the refresh interval (0 disables)
  clear-cache               Delete the local quiz cache

Environment:
  RUST_LOG                  Log filter (default: warn)";

/// Initialize the tracing subscriber for logging.
/// Logs go to stderr through a non-blocking writer; keep the guard alive.
fn init_tracing() -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();
    guard
}

/// Services shared by every command
struct Services {
    settings: Arc<Settings>,
    cache: Arc<CacheManager>,
    repository: Arc<QuizRepository>,
}

impl Services {
    /// Load the held collection from cache or seed without touching the network
    fn new(settings: Arc<Settings>) -> Result<Self> {
        Self::build(settings, QuizRepository::initialize)
    }

    /// Like `new`, plus the silent startup refresh
    fn started(settings: Arc<Settings>) -> Result<Self> {
        Self::build(settings, QuizRepository::start)
    }

    fn build(
        settings: Arc<Settings>,
        construct: fn(Arc<dyn QuizFetcher>, Arc<dyn QuizStore>, Arc<Settings>) -> Arc<QuizRepository>,
    ) -> Result<Self> {
        let cache = Arc::new(CacheManager::new(Config::cache_dir()?)?);
        let api = Arc::new(ApiClient::new().context("Failed to create HTTP client")?);
        let repository = construct(api, cache.clone(), Arc::clone(&settings));
        Ok(Self {
            settings,
            cache,
            repository,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let settings = Arc::new(Settings::load(None)?);

    match args.as_slice() {
        [] | ["list"] => list(&Services::new(settings)?).await,
        ["show", number] => show(&Services::new(settings)?, number).await,
        ["refresh"] => refresh(&Services::new(settings)?).await,
        ["watch"] => watch(Services::started(settings)?).await,
        ["config"] => {
            print_config(&settings);
            Ok(())
        }
        ["config", "set-url", url] => {
            settings.set_source_url(url)?;
            print_config(&settings);
            Ok(())
        }
        ["config", "set-interval", secs] => {
            let secs: f64 = secs
                .parse()
                .with_context(|| format!("Not a number of seconds: {}", secs))?;
            settings.set_refresh_interval(secs)?;
            print_config(&settings);
            Ok(())
        }
        ["clear-cache"] => {
            CacheManager::new(Config::cache_dir()?)?.clear()?;
            println!("Cache cleared.");
            Ok(())
        }
        ["help"] | ["--help"] | ["-h"] => {
            println!("{}", USAGE);
            Ok(())
        }
        _ => {
            eprintln!("{}", USAGE);
            bail!("Unknown command: {}", args.join(" "))
        }
    }
}

async fn list(services: &Services) -> Result<()> {
    let snapshot = services.repository.snapshot().await;
    println!(
        "{} quizzes (source: {}, cache updated {})",
        snapshot.quizzes.len(),
        snapshot.source,
        services.cache.age_display()
    );
    for (i, quiz) in snapshot.quizzes.iter().enumerate() {
        println!("{:>3}. {} {}", i + 1, quiz.icon(), quiz.title());
        println!("       {}", quiz.description_display());
    }
    Ok(())
}

async fn show(services: &Services, number: &str) -> Result<()> {
    let index = number
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .with_context(|| format!("Not a quiz number: {}", number))?;
    let quiz = services
        .repository
        .quiz(index)
        .await
        .with_context(|| format!("No quiz numbered {}", number))?;

    println!("{} {}", quiz.icon(), quiz.title());
    println!("{}\n", quiz.description_display());
    for (qi, question) in quiz.questions().iter().enumerate() {
        println!("Q{}. {}", qi + 1, question.text());
        for (ai, answer) in question.answers().iter().enumerate() {
            let marker = if ai == question.correct_answer_index() { '*' } else { ' ' };
            println!("   {} {}) {}", marker, ai + 1, answer);
        }
    }
    Ok(())
}

async fn refresh(services: &Services) -> Result<()> {
    let url = services.settings.source_url();
    println!("Refreshing from {} ...", url);
    let outcome = services.repository.refresh(false).await;
    report(&outcome);
    match outcome {
        RefreshOutcome::Unchanged(err) => Err(anyhow::Error::new(err).context("Refresh failed")),
        _ => list(services).await,
    }
}

fn report(outcome: &RefreshOutcome) {
    match outcome {
        RefreshOutcome::Remote => println!("Quizzes updated from the remote source."),
        RefreshOutcome::CacheFallback(err) => {
            println!("Refresh failed ({}); using cached quizzes.", err)
        }
        RefreshOutcome::Unchanged(err) => println!("Refresh failed: {}", err),
    }
}

async fn watch(services: Services) -> Result<()> {
    let Services {
        settings,
        repository,
        ..
    } = services;
    let scheduler = RefreshScheduler::new(Arc::clone(&repository), Arc::clone(&settings));
    let mut events = repository.subscribe();

    match scheduler.start() {
        Some(period) => println!("Refreshing every {:.0}s.", period.as_secs_f64()),
        None => println!("Periodic refresh disabled; set an interval with `config set-interval`."),
    }
    info!("Watch mode started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(QuizEvent::QuizzesUpdated) => {
                    let snapshot = repository.snapshot().await;
                    println!("Updated: {} quizzes from {}", snapshot.quizzes.len(), snapshot.source);
                }
                Ok(QuizEvent::NetworkError(err)) => println!("Error: {}", err),
                Err(RecvError::Lagged(skipped)) => info!(skipped, "Event receiver lagged"),
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => match line?.as_deref().map(str::trim) {
                Some("r") => report(&scheduler.pull_to_refresh().await),
                Some("f") => report(&scheduler.on_foreground().await),
                Some("q") | None => break,
                Some(_) => println!("Type r, f or q."),
            },
        }
    }

    scheduler.stop();
    info!("Watch mode stopped");
    Ok(())
}

fn print_config(settings: &Settings) {
    let config = settings.effective();
    println!("source_url       = {}", config.source_url());
    match config.refresh_interval() {
        Some(period) => println!("refresh_interval = {}s", period.as_secs_f64()),
        None => println!("refresh_interval = disabled"),
    }
    if let Ok(path) = Config::config_path() {
        println!("config file      = {}", path.display());
    }
    for key in [ENV_SOURCE_URL, ENV_REFRESH_INTERVAL] {
        if std::env::var(key).is_ok() {
            println!("(overridden by ${})", key);
        }
    }
}
