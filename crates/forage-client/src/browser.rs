use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig};
use forage_core::error::AppError;
use forage_core::traits::{Resource, ResourceFactory};
use futures::StreamExt;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// User agent presented by every session and by the media downloader.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Builds headless Chromium sessions.
///
/// Each [`BrowserSession`] is one dedicated Chromium process: expensive
/// to launch, cheap to reuse.
#[derive(Debug, Clone)]
pub struct BrowserFactory {
    navigation_timeout: Duration,
    user_agent: String,
    window: (u32, u32),
    user_data_dir: Option<PathBuf>,
}

impl Default for BrowserFactory {
    /// 8 s navigation timeout, 1920×1080 window, realistic user agent.
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(8),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            window: (1920, 1080),
            user_data_dir: None,
        }
    }
}

impl BrowserFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Reuse an existing Chrome profile (cookies, logged-in sessions).
    pub fn with_user_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_data_dir = Some(dir.into());
        self
    }

    pub fn with_window(mut self, width: u32, height: u32) -> Self {
        self.window = (width, height);
        self
    }
}

impl ResourceFactory for BrowserFactory {
    type Resource = BrowserSession;

    async fn create(&self) -> Result<BrowserSession, AppError> {
        let mut builder = BrowserConfig::builder();
        builder = builder.no_sandbox().disable_default_args();

        if let Some(bin) = find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }
        if let Some(dir) = &self.user_data_dir {
            builder = builder.user_data_dir(dir);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-notifications")
            .arg("--disable-infobars")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg(format!("--window-size={},{}", self.window.0, self.window.1))
            .arg(format!("--user-agent={}", self.user_agent))
            .build()
            .map_err(|e| AppError::ResourceCreation(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::ResourceCreation(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        let id = Uuid::new_v4();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        tracing::debug!(session_id = %id, "Browser session launched");
        Ok(BrowserSession {
            id,
            browser,
            handler_task,
            navigation_timeout: self.navigation_timeout,
        })
    }
}

/// One live Chromium process, checked out of the pool by at most one
/// worker at a time.
pub struct BrowserSession {
    id: Uuid,
    browser: Browser,
    handler_task: JoinHandle<()>,
    navigation_timeout: Duration,
}

impl BrowserSession {
    pub fn navigation_timeout(&self) -> Duration {
        self.navigation_timeout
    }

    pub(crate) fn browser(&self) -> &Browser {
        &self.browser
    }
}

impl Resource for BrowserSession {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn is_healthy(&self) -> bool {
        // One cheap CDP round-trip; an error means the process died or
        // the connection hung.
        self.browser.pages().await.is_ok()
    }

    async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::warn!(session_id = %self.id, error = %e, "Browser did not close cleanly");
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        tracing::debug!(session_id = %self.id, "Browser session closed");
    }
}

/// Tries to locate the real Chrome/Chromium binary.
///
/// On systems where Chromium is installed via snap, the wrapper at
/// `/snap/bin/chromium` strips unknown CLI flags, breaking headless mode.
/// We look for the real binary inside the snap first, then fall back to
/// well-known system paths. If nothing is found we return `None` and let
/// `chromiumoxide` do its own lookup.
fn find_chrome_binary() -> Option<PathBuf> {
    // Explicit override wins.
    if let Ok(p) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    let candidates: &[&str] = &[
        // Snap (Ubuntu default)
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        // Flatpak
        "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
        // Common apt / manual installs
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ];

    candidates.iter().map(PathBuf::from).find(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_builder_accumulates_settings() {
        let factory = BrowserFactory::new()
            .with_navigation_timeout(Duration::from_secs(20))
            .with_user_agent("test-agent")
            .with_window(800, 600)
            .with_user_data_dir("/tmp/profile");

        assert_eq!(factory.navigation_timeout, Duration::from_secs(20));
        assert_eq!(factory.user_agent, "test-agent");
        assert_eq!(factory.window, (800, 600));
        assert_eq!(factory.user_data_dir.as_deref(), Some("/tmp/profile".as_ref()));
    }

    #[test]
    fn test_default_factory_uses_realistic_agent() {
        let factory = BrowserFactory::default();
        assert!(factory.user_agent.contains("Mozilla/5.0"));
        assert!(factory.user_data_dir.is_none());
    }
}
