use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use page_driver::{BrowserSession, DeepSeekPage, LaunchOptions, PageDriver};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chatrelay::config::Config;
use chatrelay::generation::GenerationTracker;
use chatrelay::monitor::{spawn_session_monitor, SESSION_PROBE_INTERVAL};
use chatrelay::orchestrator::OrchestratorSettings;
use chatrelay::server::{build_router, AppState};

#[derive(Parser)]
#[command(
    name = "chatrelay",
    about = "OpenAI-compatible chat-completion endpoint backed by a live DeepSeek web-chat tab",
    version
)]
struct Cli {
    /// Configuration file (defaults to <config dir>/chatrelay/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind address for the HTTP server
    #[arg(long)]
    host: Option<String>,

    /// Port for the HTTP server
    #[arg(long)]
    port: Option<u16>,

    /// Attach to an existing browser's DevTools websocket instead of
    /// launching one
    #[arg(long)]
    ws_url: Option<String>,

    /// Chrome/Chromium executable path
    #[arg(long)]
    chrome_path: Option<PathBuf>,

    /// Browser profile directory (keeps the chat login across restarts)
    #[arg(long)]
    profile_dir: Option<PathBuf>,

    /// Run the browser without a visible window
    #[arg(long)]
    headless: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Shorthand for --log-level debug
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.debug)?;

    let mut config = Config::load(cli.config.as_ref()).await?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(ws_url) = cli.ws_url {
        config.browser.ws_url = Some(ws_url);
    }
    if let Some(path) = cli.chrome_path {
        config.browser.chrome_path = Some(path);
    }
    if let Some(dir) = cli.profile_dir {
        config.browser.profile_dir = Some(dir);
    }
    if cli.headless {
        config.browser.headless = true;
    }

    let launch = LaunchOptions {
        chrome_path: config.browser.chrome_path.clone(),
        ws_url: config.browser.ws_url.clone(),
        profile_dir: config.browser.profile_dir.clone(),
        headless: config.browser.headless,
    };
    let session = BrowserSession::establish(&launch)
        .await
        .context("Failed to start a browser session")?;
    let page = session
        .open_chat_page()
        .await
        .context("Failed to open the chat page")?;
    let driver = DeepSeekPage::new(page);

    if config.chat.auto_login {
        driver.login(&config.chat.email, &config.chat.password).await;
    }

    let driver: Arc<dyn PageDriver> = Arc::new(driver);
    let tracker = Arc::new(GenerationTracker::new());
    let epoch = tracker.reinitialize();
    info!(epoch, "browser session established");

    let _session_monitor =
        spawn_session_monitor(tracker.clone(), driver.clone(), SESSION_PROBE_INTERVAL);

    let orchestrator_settings = OrchestratorSettings {
        poll_interval: Duration::from_millis(config.polling.interval_ms),
        max_poll: Duration::from_secs(config.polling.max_secs),
        ..OrchestratorSettings::default()
    };
    let state = AppState::new(
        tracker,
        driver,
        config.chat.clone(),
        orchestrator_settings,
    );
    let router = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid bind address")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("chatrelay listening on http://{addr}");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await
        .context("HTTP server error")?;

    session.shutdown().await;
    Ok(())
}

fn init_logging(level: &str, debug: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
