//! Browser session lifecycle.
//!
//! [`SessionManager`] is the only owner of the browser process. It launches it
//! lazily, hands out pages keyed by an identifier, and tears everything down on
//! reset or cleanup. A reused page is navigated when the requested url changes
//! and reopened when its window has gone away. State moves through
//! `Uninitialized -> Initializing -> Ready -> ShuttingDown -> Terminated`;
//! once shutdown begins the session can never become ready again.

use std::{collections::HashMap, fmt, sync::Arc};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    browser::{Browser, BrowserLauncher, Page},
    error::{DiagnosticsError, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    ShuttingDown,
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::ShuttingDown => "shutting down",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

struct OpenPage {
    page: Arc<dyn Page>,
    /// Last url this page was asked to show.
    url: String,
}

struct Inner {
    browser: Option<Box<dyn Browser>>,
    pages: HashMap<String, OpenPage>,
}

pub struct SessionManager {
    launcher: Arc<dyn BrowserLauncher>,
    inner: Mutex<Inner>,
    // Readable without waiting on a launch in progress.
    state: std::sync::Mutex<SessionState>,
}

impl SessionManager {
    pub fn new(launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            launcher,
            inner: Mutex::new(Inner {
                browser: None,
                pages: HashMap::new(),
            }),
            state: std::sync::Mutex::new(SessionState::Uninitialized),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Move `from -> to` only if nobody changed the state in between (e.g. a shutdown).
    fn transition(&self, from: SessionState, to: SessionState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == from {
            *state = to;
        }
    }

    fn is_shutting_down(&self) -> bool {
        matches!(
            self.state(),
            SessionState::ShuttingDown | SessionState::Terminated
        )
    }

    /// Launch the browser if it is not running yet. Cheap no-op when ready.
    pub async fn initialize(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if self.is_shutting_down() {
            return Err(DiagnosticsError::Session(format!(
                "browser session is {}",
                self.state()
            )));
        }
        if inner.browser.is_some() {
            return Ok(());
        }

        self.set_state(SessionState::Initializing);
        info!("Launching browser session");

        match self.launcher.launch().await {
            Ok(browser) => {
                inner.browser = Some(browser);
                self.transition(SessionState::Initializing, SessionState::Ready);
                info!("Browser session ready");
                Ok(())
            }
            Err(e) => {
                self.transition(SessionState::Initializing, SessionState::Uninitialized);
                Err(match e {
                    DiagnosticsError::Session(_) => e,
                    other => {
                        DiagnosticsError::Session(format!("failed to launch browser: {other}"))
                    }
                })
            }
        }
    }

    /// Return the open page for `identifier` showing `url`, or open one and remember it.
    pub async fn page(&self, identifier: &str, url: &str) -> Result<Arc<dyn Page>> {
        let mut inner = self.inner.lock().await;

        let alive = match inner.browser.as_ref() {
            Some(browser) => browser.is_alive().await,
            None => {
                return Err(DiagnosticsError::Session(
                    "browser session is not initialized".to_string(),
                ));
            }
        };

        if !alive {
            warn!("Browser stopped responding; dropping session");
            inner.pages.clear();
            inner.browser = None;
            self.transition(SessionState::Ready, SessionState::Uninitialized);
            return Err(DiagnosticsError::Session(
                "browser process is no longer responding".to_string(),
            ));
        }

        if let Some(open) = inner.pages.get_mut(identifier) {
            match open.page.current_url().await {
                Ok(_) if same_url(&open.url, url) => {
                    debug!("Reusing page '{}'", identifier);
                    return Ok(open.page.clone());
                }
                Ok(_) => {
                    debug!("Navigating page '{}' from {} to {}", identifier, open.url, url);
                    open.page.navigate(url).await?;
                    open.url = url.to_string();
                    return Ok(open.page.clone());
                }
                Err(e) => {
                    warn!("Page '{}' is gone ({}); opening a new one", identifier, e);
                    inner.pages.remove(identifier);
                }
            }
        }

        let browser = inner.browser.as_ref().ok_or_else(|| {
            DiagnosticsError::Session("browser session is not initialized".to_string())
        })?;
        let page: Arc<dyn Page> = Arc::from(browser.open_page(url).await?);
        debug!("Opened page '{}' at {}", identifier, url);

        inner.pages.insert(
            identifier.to_string(),
            OpenPage {
                page: page.clone(),
                url: url.to_string(),
            },
        );
        Ok(page)
    }

    /// Identifiers of pages currently open, sorted.
    pub async fn open_pages(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        let mut ids: Vec<String> = inner.pages.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Close and forget one page. Returns whether it was open.
    pub async fn close_page(&self, identifier: &str) -> Result<bool> {
        let page = self.inner.lock().await.pages.remove(identifier);
        match page {
            Some(open) => {
                open.page.close().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Close every page and the browser, returning to `Uninitialized`.
    pub async fn reset(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if self.is_shutting_down() {
            return Ok(());
        }
        Self::teardown(&mut inner).await;
        self.set_state(SessionState::Uninitialized);
        Ok(())
    }

    /// Close every page and terminate the browser. Idempotent, safe before `initialize`.
    pub async fn cleanup(&self) -> Result<()> {
        if self.state() == SessionState::Terminated {
            return Ok(());
        }
        // Flag shutdown before waiting on the lock so no new launch can start.
        self.set_state(SessionState::ShuttingDown);

        let mut inner = self.inner.lock().await;
        if inner.browser.is_some() {
            info!("Shutting down browser session");
        }
        Self::teardown(&mut inner).await;
        self.set_state(SessionState::Terminated);
        Ok(())
    }

    async fn teardown(inner: &mut Inner) {
        for (id, open) in inner.pages.drain() {
            if let Err(e) = open.page.close().await {
                warn!("Error closing page '{}': {}", id, e);
            }
        }

        if let Some(browser) = inner.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("Error closing browser: {}", e);
            }
        }
    }
}

/// Compare parsed urls so `https://a.test` and `https://a.test/` count as one page.
fn same_url(a: &str, b: &str) -> bool {
    match (url::Url::parse(a), url::Url::parse(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state())
            .finish()
    }
}
