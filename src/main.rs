use anyhow::{Context, Result};
use clap::Parser;
use newswire::util::sanitize_line;
use newswire::{Article, Config, FeedSession};
use std::collections::HashSet;
use std::path::PathBuf;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Default config file path (~/.config/newswire/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("newswire")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(name = "newswire", about = "Live financial news feed over WebSocket")]
struct Args {
    /// Config file (defaults to ~/.config/newswire/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Push endpoint, ws:// or wss://
    #[arg(long, value_name = "URL")]
    ws_endpoint: Option<String>,

    /// REST API base URL, http:// or https://
    #[arg(long, value_name = "URL")]
    api_endpoint: Option<String>,

    /// Number of articles requested by the startup snapshot
    #[arg(long)]
    limit: Option<u32>,
}

fn load_config(args: &Args) -> Result<Config> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let mut config = Config::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    config.apply_env();
    if let Some(ws) = &args.ws_endpoint {
        config.ws_endpoint = ws.clone();
    }
    if let Some(api) = &args.api_endpoint {
        config.api_endpoint = api.clone();
    }
    if let Some(limit) = args.limit {
        config.snapshot_limit = limit;
    }
    Ok(config)
}

fn print_article(article: &Article) {
    let tickers: Vec<&str> = article.affected_tickers.keys().map(String::as_str).collect();
    let time = article
        .published_at
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string());

    print!(
        "[{}] {:<7} {}",
        time,
        article.sentiment.as_str(),
        sanitize_line(&article.title)
    );
    if !tickers.is_empty() {
        print!(" ({})", sanitize_line(&tickers.join(", ")));
    }
    if let Some(source) = &article.source {
        print!(" - {}", sanitize_line(source));
    }
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let session = FeedSession::start(&config);
    let mut feed_rx = session.subscribe_feed();
    let mut status_rx = session
        .subscribe_status()
        .context("Connection driver did not start")?;

    // Headlines already printed, so a replace only prints what is new
    let mut seen: HashSet<String> = HashSet::new();
    println!("{}", session.status());

    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate())?;
    #[cfg(unix)]
    let mut sigint = signal(SignalKind::interrupt())?;

    loop {
        #[cfg(unix)]
        let sigterm_fut = sigterm.recv();
        #[cfg(not(unix))]
        let sigterm_fut = std::future::pending::<Option<()>>();

        #[cfg(unix)]
        let sigint_fut = sigint.recv();
        #[cfg(not(unix))]
        let sigint_fut = tokio::signal::ctrl_c();

        tokio::select! {
            biased;

            _ = sigterm_fut => {
                tracing::info!("Received SIGTERM, shutting down gracefully");
                break;
            }

            _ = sigint_fut => {
                tracing::info!("Received SIGINT, shutting down gracefully");
                break;
            }

            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = status_rx.borrow_and_update().display().into_owned();
                println!("{}", status);
            }

            changed = feed_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let feed = feed_rx.borrow_and_update().clone();
                // Oldest first so the newest headline ends up at the bottom
                for article in feed.articles().iter().rev() {
                    if seen.insert(article.article_id.clone()) {
                        print_article(article);
                    }
                }
                seen.retain(|id| feed.contains(id));
            }
        }
    }

    session.stop().await;
    println!("Goodbye!");
    Ok(())
}
