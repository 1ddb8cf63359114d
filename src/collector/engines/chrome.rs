// Headless Chrome sessions driven over the DevTools protocol

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::extract::{READ_MORE_SELECTORS, REPLY_EXPANDER_SELECTORS, THREAD_SELECTORS};
use crate::collector::config::DomOptions;
use crate::collector::errors::CollectError;
use crate::collector::traits::{BrowserLauncher, PageSession};

const BINARY_NAMES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// Wait for expanded replies to render
const EXPAND_WAIT: Duration = Duration::from_millis(500);

pub struct ChromeLauncher;

impl ChromeLauncher {
    pub fn new() -> Self {
        Self
    }

    /// Locate a Chrome/Chromium executable
    pub fn detect_executable(&self, options: &DomOptions) -> Option<PathBuf> {
        // 1. Explicit path
        if let Some(path) = &options.automation_driver_path {
            return path.exists().then(|| path.clone());
        }
        if let Ok(path) = std::env::var("YT_COMMENTS_CHROME") {
            let path = PathBuf::from(path.trim());
            if path.exists() {
                return Some(path);
            }
        }

        // 2. Common install locations
        let mut common_paths = vec![
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
            PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
        ];
        for name in BINARY_NAMES {
            common_paths.push(Path::new("/usr/bin").join(name));
            common_paths.push(Path::new("/usr/local/bin").join(name));
            common_paths.push(Path::new("/opt/homebrew/bin").join(name));
        }
        if let Some(path) = common_paths.into_iter().find(|p| p.exists()) {
            return Some(path);
        }

        // 3. PATH
        BINARY_NAMES.iter().find_map(|name| {
            let output = Command::new("which").arg(name).output().ok()?;
            if !output.status.success() {
                return None;
            }
            let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
            (!path.is_empty()).then(|| PathBuf::from(path))
        })
    }
}

impl Default for ChromeLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    fn name(&self) -> &'static str {
        "chrome"
    }

    fn check_available(&self, options: &DomOptions) -> Result<(), CollectError> {
        match self.detect_executable(options) {
            Some(_) => Ok(()),
            None => Err(CollectError::EnvironmentUnavailable(
                "no Chrome or Chromium executable found (set YT_COMMENTS_CHROME)".to_string(),
            )),
        }
    }

    async fn launch(&self, options: &DomOptions) -> Result<Box<dyn PageSession>, CollectError> {
        let executable = self.detect_executable(options).ok_or_else(|| {
            CollectError::EnvironmentUnavailable("no Chrome or Chromium executable found".to_string())
        })?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(&executable)
            .window_size(1920, 1080)
            .request_timeout(Duration::from_secs(options.timeout_seconds as u64))
            .arg("--mute-audio")
            .arg("--lang=en-US");
        if !options.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| CollectError::EnvironmentUnavailable(format!("invalid browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
            CollectError::EnvironmentUnavailable(format!(
                "failed to start {}: {}",
                executable.display(),
                e
            ))
        })?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let mut session = ChromeSession::detached(browser, handler_task);
                let _ = session.shutdown().await;
                return Err(CollectError::EnvironmentUnavailable(format!("failed to open page: {}", e)));
            }
        };

        info!(executable = %executable.display(), headless = options.headless, "browser started");
        Ok(Box::new(ChromeSession {
            browser,
            handler: handler_task,
            page: Some(page),
            closed: false,
        }))
    }
}

pub struct ChromeSession {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Option<Page>,
    closed: bool,
}

impl ChromeSession {
    fn detached(browser: Browser, handler: JoinHandle<()>) -> Self {
        Self {
            browser,
            handler,
            page: None,
            closed: false,
        }
    }

    fn page(&self) -> Result<&Page, CollectError> {
        self.page
            .as_ref()
            .ok_or_else(|| CollectError::CollectionFailed("browser page is closed".to_string()))
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T, CollectError> {
        let result = self
            .page()?
            .evaluate(script)
            .await
            .map_err(|e| CollectError::CollectionFailed(format!("script failed: {}", e)))?;
        result
            .into_value::<T>()
            .map_err(|e| CollectError::Parse(format!("unexpected script result: {}", e)))
    }

    async fn run(&self, script: String) -> Result<(), CollectError> {
        self.eval::<serde_json::Value>(script).await.map(|_| ())
    }

    async fn shutdown(&mut self) -> Result<(), CollectError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.page = None;
        let result = self.browser.close().await;
        if let Err(e) = self.browser.wait().await {
            debug!(error = %e, "browser process wait failed");
        }
        self.handler.abort();
        result
            .map(|_| ())
            .map_err(|e| CollectError::CollectionFailed(format!("failed to close browser: {}", e)))
    }
}

/// JS expression evaluating to the thread elements, first matching selector wins
fn threads_js() -> String {
    let selectors = serde_json::to_string(THREAD_SELECTORS).unwrap_or_else(|_| "[]".to_string());
    format!(
        "(() => {{ for (const s of {selectors}) {{ const found = document.querySelectorAll(s); \
         if (found.length) return Array.from(found); }} return []; }})()"
    )
}

fn expand_js(index: usize) -> String {
    let expanders = serde_json::to_string(REPLY_EXPANDER_SELECTORS).unwrap_or_else(|_| "[]".to_string());
    let read_more = serde_json::to_string(READ_MORE_SELECTORS).unwrap_or_else(|_| "[]".to_string());
    format!(
        "(() => {{ const thread = {threads}[{index}]; if (!thread) return false; \
         for (const s of {expanders}.concat({read_more})) {{ \
           thread.querySelectorAll(s).forEach(b => {{ try {{ b.click(); }} catch (e) {{}} }}); \
         }} return true; }})()",
        threads = threads_js(),
    )
}

#[async_trait]
impl PageSession for ChromeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), CollectError> {
        self.page()?
            .goto(url)
            .await
            .map_err(|e| CollectError::CollectionFailed(format!("navigation to {} failed: {}", url, e)))?;
        Ok(())
    }

    async fn scroll_to(&mut self, y: u64) -> Result<(), CollectError> {
        self.run(format!("window.scrollTo(0, {y}); true")).await
    }

    async fn page_down(&mut self) -> Result<(), CollectError> {
        self.run("window.scrollBy(0, window.innerHeight); true".to_string()).await
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), CollectError> {
        self.run("window.scrollTo(0, document.documentElement.scrollHeight); true".to_string())
            .await
    }

    async fn content_height(&mut self) -> Result<u64, CollectError> {
        let height: f64 = self
            .eval("document.documentElement.scrollHeight".to_string())
            .await?;
        Ok(height.max(0.0) as u64)
    }

    async fn thread_fragments(&mut self) -> Result<Vec<String>, CollectError> {
        self.eval(format!("{}.map(e => e.outerHTML)", threads_js())).await
    }

    async fn expand_thread(&mut self, index: usize) -> Result<Option<String>, CollectError> {
        let found: bool = self.eval(expand_js(index)).await?;
        if !found {
            return Ok(None);
        }
        tokio::time::sleep(EXPAND_WAIT).await;
        self.eval(format!(
            "(() => {{ const t = {}[{index}]; return t ? t.outerHTML : null; }})()",
            threads_js()
        ))
        .await
    }

    async fn close(&mut self) -> Result<(), CollectError> {
        self.shutdown().await
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if !self.closed {
            warn!("browser session dropped without close");
            self.handler.abort();
        }
    }
}
