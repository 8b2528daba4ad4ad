//! Browser launch and attach plumbing.

use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::selectors::SIGN_IN_URL;
use crate::DriverError;

/// How the browser side of the relay is brought up.
#[derive(Clone, Debug, Default)]
pub struct LaunchOptions {
    /// Explicit Chrome/Chromium executable. Auto-detected when absent.
    pub chrome_path: Option<PathBuf>,
    /// Attach to an already-running browser over its DevTools websocket
    /// instead of launching one.
    pub ws_url: Option<String>,
    /// Profile directory; keeping it stable preserves the login session
    /// across restarts.
    pub profile_dir: Option<PathBuf>,
    /// Launch without a visible window.
    pub headless: bool,
}

/// An established browser connection plus the background task that pumps
/// its CDP event stream.
pub struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl BrowserSession {
    /// Attach to `ws_url` when configured, otherwise launch a browser with
    /// the hardened argument set.
    pub async fn establish(opts: &LaunchOptions) -> Result<Self, DriverError> {
        let (browser, mut handler) = if let Some(ws_url) = &opts.ws_url {
            info!(target: "page-driver", url = %ws_url, "attaching to existing browser");
            Browser::connect(ws_url.clone())
                .await
                .map_err(|err| DriverError::Launch(err.to_string()))?
        } else {
            let config = build_config(opts)?;
            info!(target: "page-driver", headless = opts.headless, "launching browser");
            Browser::launch(config)
                .await
                .map_err(|err| DriverError::Launch(err.to_string()))?
        };

        // The handler stream must be polled for the connection to make
        // progress; it ends when the browser goes away.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    warn!(target: "page-driver", %err, "browser event stream error");
                    break;
                }
            }
            debug!(target: "page-driver", "browser event stream ended");
        });

        Ok(Self {
            browser,
            handler_task,
        })
    }

    /// Open the chat tab, parked on the sign-in page the way a fresh
    /// session starts out.
    pub async fn open_chat_page(&self) -> Result<Page, DriverError> {
        self.browser
            .new_page(SIGN_IN_URL)
            .await
            .map_err(|err| DriverError::Launch(err.to_string()))
    }

    /// Close the browser and stop the event pump.
    pub async fn shutdown(mut self) {
        if let Err(err) = self.browser.close().await {
            warn!(target: "page-driver", %err, "browser close failed");
        }
        self.handler_task.abort();
        let _ = self.handler_task.await;
    }
}

fn build_config(opts: &LaunchOptions) -> Result<BrowserConfig, DriverError> {
    let mut builder = BrowserConfig::builder()
        .request_timeout(Duration::from_secs(30))
        .launch_timeout(Duration::from_secs(20));

    if !opts.headless {
        builder = builder.with_head();
    }

    let mut args = vec![
        "--disable-background-networking",
        "--disable-background-timer-throttling",
        "--disable-breakpad",
        "--disable-client-side-phishing-detection",
        "--disable-component-update",
        "--disable-default-apps",
        "--disable-dev-shm-usage",
        "--disable-hang-monitor",
        "--disable-popup-blocking",
        "--disable-prompt-on-repost",
        "--disable-sync",
        "--disable-session-crashed-bubble",
        "--metrics-recording-only",
        "--no-first-run",
        "--no-default-browser-check",
        "--password-store=basic",
        "--remote-allow-origins=*",
        "--use-mock-keychain",
    ];
    if opts.headless {
        args.push("--headless=new");
        args.push("--hide-scrollbars");
        args.push("--mute-audio");
    }
    builder = builder.args(args);

    if let Some(path) = &opts.chrome_path {
        builder = builder.chrome_executable(path.clone());
    }
    if let Some(dir) = &opts.profile_dir {
        builder = builder.user_data_dir(dir.clone());
    }

    builder
        .build()
        .map_err(|err| DriverError::Launch(format!("browser config error: {err}")))
}
