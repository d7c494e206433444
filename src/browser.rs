//! Browser abstraction used by the session manager.
//!
//! The production implementation lives in [`crate::webdriver`]; tests plug in
//! their own launchers to count launches and navigations without a real browser.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Starts a browser process. Called at most once per session lifetime.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn Browser>>;
}

/// A running browser process.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Open a new page and navigate it to `url`.
    async fn open_page(&self, url: &str) -> Result<Box<dyn Page>>;

    /// Cheap liveness probe; false once the process has crashed or gone away.
    async fn is_alive(&self) -> bool;

    /// Terminate the browser process. Pages become unusable afterwards.
    async fn close(&self) -> Result<()>;
}

/// One tab/document context within a browser.
#[async_trait]
pub trait Page: Send + Sync {
    fn id(&self) -> &str;

    async fn navigate(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Run `script` as a function body with `args` bound to `arguments`; returns its JSON result.
    async fn evaluate(&self, script: &str, args: Vec<Value>) -> Result<Value>;

    /// PNG-encoded screenshot of the current viewport.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    async fn set_viewport(&self, width: u32, height: u32) -> Result<()>;

    async fn close(&self) -> Result<()>;
}
