//! Locating, spawning and health-checking local WebDriver servers.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use tokio::{process::Child, time::sleep};
use tracing::{debug, info, warn};

use crate::error::{DiagnosticsError, Result};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);
const STATUS_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverType {
    Chrome,
    Firefox,
    Edge,
}

impl DriverType {
    pub fn from_string(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chrome" | "chromium" | "chromedriver" => Some(Self::Chrome),
            "firefox" | "gecko" | "geckodriver" => Some(Self::Firefox),
            "edge" | "msedge" | "msedgedriver" => Some(Self::Edge),
            _ => None,
        }
    }

    pub fn executable_name(&self) -> String {
        let base = match self {
            Self::Chrome => "chromedriver",
            Self::Firefox => "geckodriver",
            Self::Edge => "msedgedriver",
        };
        format!("{base}{}", std::env::consts::EXE_SUFFIX)
    }

    /// Chrome and Edge drivers differ so both can run side by side.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Chrome => 9515,
            Self::Firefox => 4444,
            Self::Edge => 9516,
        }
    }

    pub fn browser_name(&self) -> &'static str {
        match self {
            Self::Chrome => "Chrome",
            Self::Firefox => "Firefox",
            Self::Edge => "Edge",
        }
    }

    /// Command line that binds the driver to loopback on `port`.
    fn server_args(&self, port: u16) -> Vec<String> {
        match self {
            Self::Chrome | Self::Edge => vec![
                format!("--port={port}"),
                "--allowed-ips=127.0.0.1".to_string(),
            ],
            Self::Firefox => vec![
                "--host".to_string(),
                "127.0.0.1".to_string(),
                "--port".to_string(),
                port.to_string(),
            ],
        }
    }

    fn install_dirs(&self) -> Vec<PathBuf> {
        if cfg!(target_os = "macos") {
            vec!["/opt/homebrew/bin".into(), "/usr/local/bin".into()]
        } else if cfg!(windows) {
            vec![
                PathBuf::from(format!("C:\\Program Files\\{}", self.browser_name())),
                "C:\\WebDrivers".into(),
            ]
        } else {
            vec![
                "/usr/bin".into(),
                "/usr/local/bin".into(),
                "/usr/lib/chromium".into(),
                "/snap/bin".into(),
            ]
        }
    }
}

/// A driver process this server started. Killed by [`ManagedDriver::stop`], or on drop.
#[derive(Debug)]
pub struct ManagedDriver {
    driver_type: DriverType,
    child: Child,
    port: u16,
}

impl ManagedDriver {
    pub fn endpoint(&self) -> String {
        endpoint_for(self.port)
    }

    pub async fn stop(&mut self) -> Result<()> {
        info!(
            "Stopping {} driver on port {}",
            self.driver_type.browser_name(),
            self.port
        );
        self.child.start_kill()?;
        if let Err(e) = self.child.wait().await {
            warn!("Could not reap {} driver: {}", self.driver_type.browser_name(), e);
        }
        Ok(())
    }
}

fn endpoint_for(port: u16) -> String {
    format!("http://localhost:{port}")
}

/// Look in each directory of the `PATH`-style `path_var`, then the usual install locations.
pub fn locate_executable(driver_type: DriverType, path_var: Option<OsString>) -> Option<PathBuf> {
    let name = driver_type.executable_name();
    let from_path = path_var
        .map(|var| std::env::split_paths(&var).collect::<Vec<_>>())
        .unwrap_or_default();

    from_path
        .into_iter()
        .chain(driver_type.install_dirs())
        .map(|dir| dir.join(&name))
        .find(|candidate| candidate.is_file())
}

#[derive(Clone, Debug, Default)]
pub struct DriverManager {
    http: reqwest::Client,
}

impl DriverManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Endpoint of a running `driver_type` server, starting one if nothing answers
    /// on its default port. The spawned process, if any, is handed to the caller.
    pub async fn ensure_driver(
        &self,
        driver_type: DriverType,
        timeout: Duration,
    ) -> Result<(String, Option<ManagedDriver>)> {
        let port = driver_type.default_port();
        let endpoint = endpoint_for(port);

        if self.is_ready(&endpoint).await {
            info!(
                "Using {} driver already listening on port {}",
                driver_type.browser_name(),
                port
            );
            return Ok((endpoint, None));
        }

        let executable = locate_executable(driver_type, std::env::var_os("PATH")).ok_or_else(|| {
            DiagnosticsError::Session(format!(
                "{} not found on PATH or in the usual install locations; install it or set WEBDRIVER_ENDPOINT",
                driver_type.executable_name()
            ))
        })?;

        let mut driver = self.spawn(driver_type, &executable, port)?;
        if let Err(e) = self.wait_until_ready(&endpoint, timeout).await {
            let _ = driver.stop().await;
            return Err(e);
        }

        Ok((driver.endpoint(), Some(driver)))
    }

    async fn is_ready(&self, endpoint: &str) -> bool {
        let request = self
            .http
            .get(format!("{endpoint}/status"))
            .timeout(STATUS_TIMEOUT);
        matches!(request.send().await, Ok(response) if response.status().is_success())
    }

    fn spawn(
        &self,
        driver_type: DriverType,
        executable: &Path,
        port: u16,
    ) -> Result<ManagedDriver> {
        info!(
            "Starting {} driver {} on port {}",
            driver_type.browser_name(),
            executable.display(),
            port
        );

        // Stdout carries the MCP protocol, so the driver gets no inherited stdio.
        let child = tokio::process::Command::new(executable)
            .args(driver_type.server_args(port))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                DiagnosticsError::Session(format!(
                    "could not start {}: {e}",
                    executable.display()
                ))
            })?;

        Ok(ManagedDriver {
            driver_type,
            child,
            port,
        })
    }

    async fn wait_until_ready(&self, endpoint: &str, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_ready(endpoint).await {
                debug!("WebDriver ready at {}", endpoint);
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(DiagnosticsError::Session(format!(
                    "WebDriver at {endpoint} not ready after {}ms",
                    timeout.as_millis()
                )));
            }
            sleep(READY_POLL_INTERVAL).await;
        }
    }
}
