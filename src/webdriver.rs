//! WebDriver-backed browser: one `fantoccini` session, one window per page.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder, wd::WindowHandle};
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    browser::{Browser, BrowserLauncher, Page},
    config::Config,
    driver::{DriverManager, DriverType, ManagedDriver},
    error::{DiagnosticsError, Result},
};

pub struct WebDriverLauncher {
    config: Config,
    drivers: DriverManager,
}

impl WebDriverLauncher {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            drivers: DriverManager::new(),
        }
    }

    async fn resolve_endpoint(&self) -> Result<(String, Option<ManagedDriver>)> {
        if self.config.webdriver_endpoint == "auto" {
            let timeout = Duration::from_millis(self.config.driver_startup_timeout_ms);
            self.drivers
                .ensure_driver(self.config.preferred_driver, timeout)
                .await
        } else {
            Ok((self.config.webdriver_endpoint.clone(), None))
        }
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self) -> Result<Box<dyn Browser>> {
        let (endpoint, mut driver) = self.resolve_endpoint().await?;
        info!("Connecting to WebDriver at {}", endpoint);

        let client = match ClientBuilder::native()
            .capabilities(capabilities(&self.config))
            .connect(&endpoint)
            .await
        {
            Ok(client) => client,
            Err(e) => {
                if let Some(driver) = driver.as_mut() {
                    let _ = driver.stop().await;
                }
                return Err(DiagnosticsError::Session(format!(
                    "Failed to connect to WebDriver at '{endpoint}': {e}"
                )));
            }
        };

        let (width, height) = self.config.window_size;
        if let Err(e) = client.set_window_size(width, height).await {
            warn!("Could not resize browser window: {}", e);
        }

        let initial = client.window().await?;
        Ok(Box::new(WebDriverBrowser {
            client,
            windows: Arc::new(Mutex::new(WindowState {
                spare: Some(initial),
            })),
            driver: Mutex::new(driver),
        }))
    }
}

/// The session starts with one window; it is handed to the first page instead of opening another.
struct WindowState {
    spare: Option<WindowHandle>,
}

pub struct WebDriverBrowser {
    client: Client,
    // Held across switch_to_window + command so each page drives its own window.
    windows: Arc<Mutex<WindowState>>,
    driver: Mutex<Option<ManagedDriver>>,
}

#[async_trait]
impl Browser for WebDriverBrowser {
    async fn open_page(&self, url: &str) -> Result<Box<dyn Page>> {
        let mut windows = self.windows.lock().await;

        let handle = match windows.spare.take() {
            Some(handle) => handle,
            None => self.client.new_window(true).await?.handle,
        };
        self.client.switch_to_window(handle.clone()).await?;

        if let Err(e) = self.client.goto(url).await {
            // Keep the window around for the next page rather than leaking it.
            windows.spare = Some(handle);
            return Err(e.into());
        }

        let id = String::from(handle.clone());
        debug!("Opened window {} at {}", id, url);

        Ok(Box::new(WebDriverPage {
            client: self.client.clone(),
            handle,
            id,
            windows: self.windows.clone(),
        }))
    }

    async fn is_alive(&self) -> bool {
        let _windows = self.windows.lock().await;
        self.client.windows().await.is_ok()
    }

    async fn close(&self) -> Result<()> {
        let session_result = self.client.clone().close().await;

        if let Some(mut driver) = self.driver.lock().await.take() {
            driver.stop().await?;
        }

        session_result.map_err(Into::into)
    }
}

pub struct WebDriverPage {
    client: Client,
    handle: WindowHandle,
    id: String,
    windows: Arc<Mutex<WindowState>>,
}

impl WebDriverPage {
    async fn focus(&self) -> Result<tokio::sync::MutexGuard<'_, WindowState>> {
        let guard = self.windows.lock().await;
        self.client.switch_to_window(self.handle.clone()).await?;
        Ok(guard)
    }
}

#[async_trait]
impl Page for WebDriverPage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        let _focus = self.focus().await?;
        self.client.goto(url).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let _focus = self.focus().await?;
        Ok(self.client.current_url().await?.to_string())
    }

    async fn evaluate(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        let _focus = self.focus().await?;
        self.client.execute(script, args).await.map_err(Into::into)
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let _focus = self.focus().await?;
        self.client.screenshot().await.map_err(Into::into)
    }

    async fn set_viewport(&self, width: u32, height: u32) -> Result<()> {
        // WebDriver only exposes the outer window size.
        let _focus = self.focus().await?;
        self.client.set_window_size(width, height).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut windows = self.focus().await?;

        // Closing the last window ends the WebDriver session, so park it instead.
        if self.client.windows().await?.len() <= 1 {
            self.client.goto("about:blank").await?;
            windows.spare = Some(self.handle.clone());
            return Ok(());
        }

        self.client.close_window().await?;
        Ok(())
    }
}

pub(crate) fn capabilities(config: &Config) -> Map<String, Value> {
    let mut caps = Map::new();
    let (width, height) = config.window_size;
    let window_arg = format!("--window-size={width},{height}");

    match config.preferred_driver {
        DriverType::Firefox => {
            caps.insert("browserName".to_string(), json!("firefox"));
            let mut args = vec![
                format!("--width={width}"),
                format!("--height={height}"),
            ];
            if config.headless {
                args.push("--headless".to_string());
            }
            caps.insert("moz:firefoxOptions".to_string(), json!({ "args": args }));
        }
        DriverType::Chrome | DriverType::Edge => {
            let (browser_name, options_key) = if config.preferred_driver == DriverType::Edge {
                ("MicrosoftEdge", "ms:edgeOptions")
            } else {
                ("chrome", "goog:chromeOptions")
            };
            caps.insert("browserName".to_string(), json!(browser_name));

            let mut args = vec![
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
                "--hide-scrollbars".to_string(),
                window_arg,
            ];
            if config.headless {
                args.push("--headless=new".to_string());
                args.push("--disable-gpu".to_string());
            }
            caps.insert(options_key.to_string(), json!({ "args": args }));
        }
    }

    caps
}
