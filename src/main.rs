mod caption;
mod config;
mod extract;
mod fetch;
mod filter;
mod http_client;
mod location;
mod models;
mod runner;
mod server;
mod store;
mod telegram;

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use fetch::{HttpFetcher, PageFetcher};
use runner::Runner;
use server::AppState;
use std::sync::Arc;
use store::SeenStore;
use telegram::TelegramClient;
use tokio::sync::Mutex;

#[derive(Parser, Debug)]
#[command(name = "lalafowatch")]
#[command(about = "Telegram watcher for lalafo.kg apartment listings", long_about = None)]
struct Args {
    /// Test URL fetching - fetch and print HTML from a URL
    #[arg(long)]
    test_url: Option<String>,

    /// Save HTML to file when using --test-url
    #[arg(long)]
    save_html: Option<String>,

    /// Fetch one detail page, print the extracted ad and the filter verdict
    #[arg(long)]
    test_ad: Option<String>,

    /// Execute a single run and exit (no HTTP listener, no timer)
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle test-url command before config/logging setup
    if let Some(url) = args.test_url {
        return test_url_fetch(&url, args.save_html.as_deref()).await;
    }

    if !Config::config_file_exists() {
        eprintln!("No config file found, creating default data/config.yaml");
        Config::create_default()?;
        eprintln!("Credentials can be set there or via TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID");
    }

    let config = Config::load()?;

    // Initialize logging - use RUST_LOG env var if set, otherwise use config
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
        tracing::info!("Logging level set from RUST_LOG environment variable");
    } else {
        let level = config.tracing_level.to_lowercase();
        let max_level = match level.as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "info" => tracing::Level::INFO,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => {
                eprintln!("Invalid tracing level '{}', using 'info'", level);
                tracing::Level::INFO
            }
        };

        tracing_subscriber::fmt().with_max_level(max_level).init();

        tracing::info!("Logging level set to: {} (from data/config.yaml)", level);
    }

    let client = http_client::create_http_client(&config.user_agent)?;

    if let Some(url) = args.test_ad {
        return test_ad_fetch(&url, client, &config).await;
    }

    tracing::info!("Starting lalafowatch for {} ({})", config.city_slug, config.city_name);

    if !config.has_credentials() {
        tracing::warn!(
            "bot_token/chat_id not set; matches will be logged but nothing gets delivered"
        );
    }

    if let Some(parent) = std::path::Path::new(&config.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Creating {}", parent.display()))?;
        }
    }
    let store = SeenStore::open(&config.db_path, &config.seen_namespace)?;
    tracing::info!(
        "Seen store at {} (namespace {}, {} ids)",
        config.db_path,
        config.seen_namespace,
        store.count()?
    );

    let fetcher: Box<dyn PageFetcher> = Box::new(HttpFetcher::new(client.clone()));
    let deliverer = Box::new(TelegramClient::new(client, &config.bot_token, &config.chat_id));
    let runner = Runner::new(fetcher, deliverer, store, config.clone());

    if args.once {
        let summary = runner.run_once().await?;
        tracing::info!("{:?}", summary);
        return Ok(());
    }

    let runner = Arc::new(Mutex::new(runner));

    // Timer-triggered runs share the run guard with the HTTP trigger; a
    // tick that finds a run in progress is skipped, not queued.
    let interval_runner = runner.clone();
    let interval_seconds = config.check_interval_seconds;
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(interval_seconds));

        loop {
            interval.tick().await;

            let Ok(guard) = interval_runner.try_lock() else {
                tracing::debug!("Previous run still in progress, skipping timer tick");
                continue;
            };

            tracing::info!("Timer tick, starting run");
            if let Err(e) = guard.run_once().await {
                tracing::error!("Timer-triggered run failed: {:#}", e);
            }
        }
    });

    server::serve(AppState { runner }, &config.listen_addr).await
}

/// Test URL fetching - downloads and prints the HTML response
async fn test_url_fetch(url: &str, save_path: Option<&str>) -> Result<()> {
    println!("Testing URL fetch: {}", url);
    println!("{}", "=".repeat(80));

    // Try to load config for the user agent, otherwise use defaults
    let user_agent = Config::load()
        .map(|config| config.user_agent)
        .unwrap_or_else(|_| Config::default_values().user_agent);

    println!("User-Agent: {}", user_agent);

    let client = http_client::create_http_client(&user_agent)?;

    println!("Sending request...");
    let response = client.get(url).send().await?;

    println!("Status: {}", response.status());
    println!("\nResponse Headers:");
    for (name, value) in response.headers() {
        println!("  {}: {:?}", name, value);
    }

    println!("{}", "=".repeat(80));

    let body = response.text().await?;

    if let Some(path) = save_path {
        std::fs::write(path, &body)?;
        println!("HTML saved to: {}", path);
    } else {
        println!("Response body:");
        println!("{}", "=".repeat(80));
        println!("{}", body);
    }
    println!("{}", "=".repeat(80));
    println!("Total length: {} bytes", body.len());

    // Check for common CAPTCHA indicators
    let lower_body = body.to_lowercase();
    if lower_body.contains("captcha") || lower_body.contains("cloudflare") {
        println!("\n⚠️  WARNING: Response may contain CAPTCHA or anti-bot protection!");
        println!("Consider:");
        println!("  - Increasing page_delay_ms in config");
        println!("  - Changing user_agent in config");
        println!("  - Using a different IP/proxy");
    }

    Ok(())
}

/// Fetch one detail page and show what the extractors and filters make of it
async fn test_ad_fetch(url: &str, client: reqwest::Client, config: &Config) -> Result<()> {
    let fetcher = HttpFetcher::new(client);

    match fetcher.fetch_page(url).await? {
        None => println!("Page gone (404/403), nothing to parse: {}", url),
        Some(html) => {
            let mut rng = rand::rng();
            let ad = extract::parse_ad(&html, url, config, &mut rng);
            println!("{:#?}", ad);
            println!("{}", "=".repeat(80));
            match filter::check(&ad, config) {
                Ok(()) => println!("Filter verdict: PASS"),
                Err(rejection) => println!("Filter verdict: rejected ({:?})", rejection),
            }
            println!("{}", "=".repeat(80));
            println!("Caption preview:\n{}", caption::build(&ad));
        }
    }

    Ok(())
}
