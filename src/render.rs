use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};
use tracing::{debug, info, warn};

/// Produces fully rendered markup for pages whose content is built by JS.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String>;
}

enum Launch {
    Idle,
    Ready(Browser),
    Failed(String),
}

/// Headless Chrome, launched on first use and kept for the rest of the run.
///
/// The browser process is killed when the session is shut down or dropped,
/// so every exit path of the driver releases it. A failed launch is
/// remembered and later renders fail fast instead of relaunching.
pub struct ChromeSession {
    state: Mutex<Launch>,
    settle: Duration,
}

impl ChromeSession {
    pub fn new(settle: Duration) -> Self {
        Self {
            state: Mutex::new(Launch::Idle),
            settle,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Launch>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("browser session lock poisoned"))
    }

    async fn acquire(&self) -> Result<Browser> {
        {
            let state = self.lock()?;
            match &*state {
                Launch::Ready(browser) => return Ok(browser.clone()),
                Launch::Failed(reason) => bail!("headless browser unavailable: {}", reason),
                Launch::Idle => {}
            }
        }

        info!("Launching headless browser");
        let launched = tokio::task::spawn_blocking(launch)
            .await
            .map_err(|e| anyhow!("Browser launch task panicked: {}", e))
            .and_then(|r| r);
        self.record(launched)
    }

    fn record(&self, launched: Result<Browser>) -> Result<Browser> {
        let mut state = self.lock()?;
        match launched {
            Ok(browser) => {
                *state = Launch::Ready(browser.clone());
                Ok(browser)
            }
            Err(e) => {
                warn!("Headless browser launch failed, rendering disabled: {:#}", e);
                *state = Launch::Failed(format!("{:#}", e));
                Err(e)
            }
        }
    }

    /// Release the browser now. Safe to call more than once.
    pub fn shutdown(&self) {
        if let Ok(mut state) = self.state.lock() {
            if let Launch::Ready(_) = *state {
                *state = Launch::Idle;
                info!("Headless browser released");
            }
        }
    }
}

fn launch() -> Result<Browser> {
    let options = LaunchOptions::default_builder()
        .headless(true)
        .build()
        .map_err(|e| anyhow!("Invalid browser launch options: {}", e))?;
    Browser::new(options).context("Failed to launch headless browser")
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[async_trait]
impl Renderer for ChromeSession {
    async fn render(&self, url: &str) -> Result<String> {
        let browser = self.acquire().await?;
        let url = url.to_string();
        let settle = self.settle;

        tokio::task::spawn_blocking(move || render_blocking(&browser, &url, settle))
            .await
            .map_err(|e| anyhow!("Render task panicked: {}", e))?
    }
}

fn render_blocking(browser: &Browser, url: &str, settle: Duration) -> Result<String> {
    let tab = browser
        .new_tab()
        .map_err(|e| anyhow!("Failed to create new browser tab: {}", e))?;

    debug!("Rendering {}", url);
    tab.navigate_to(url)
        .map_err(|e| anyhow!("Failed to navigate to {}: {}", url, e))?;
    tab.wait_until_navigated()
        .map_err(|e| anyhow!("Page failed to load: {}", e))?;

    // Client-side widgets keep filling in after the load event.
    std::thread::sleep(settle);

    let html = tab
        .get_content()
        .map_err(|e| anyhow!("Failed to get page content: {}", e));

    if let Err(e) = tab.close(true) {
        warn!("Failed to close tab for {}: {}", url, e);
    }

    let html = html?;
    debug!("Rendered {} chars for {}", html.len(), url);
    Ok(html)
}
