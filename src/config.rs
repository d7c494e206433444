use std::{env, path::PathBuf};

use crate::driver::DriverType;

#[derive(Clone, Debug)]
pub struct Config {
    pub webdriver_endpoint: String,
    pub preferred_driver: DriverType,
    pub headless: bool,
    pub driver_startup_timeout_ms: u64,
    pub window_size: (u32, u32),
    pub baseline_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            webdriver_endpoint: "auto".to_string(),
            preferred_driver: DriverType::Chrome,
            headless: true,
            driver_startup_timeout_ms: 10_000,
            window_size: (1280, 720),
            baseline_dir: PathBuf::from(".visual-baselines"),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source.
    /// Unset or unparsable values keep their defaults.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            webdriver_endpoint: var("WEBDRIVER_ENDPOINT").unwrap_or(defaults.webdriver_endpoint),
            preferred_driver: var("WEBDRIVER_PREFERRED_DRIVER")
                .and_then(|s| DriverType::from_string(&s))
                .unwrap_or(defaults.preferred_driver),
            headless: var("WEBDRIVER_HEADLESS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(defaults.headless),
            driver_startup_timeout_ms: var("WEBDRIVER_STARTUP_TIMEOUT_MS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.driver_startup_timeout_ms),
            window_size: var("DIAGNOSTICS_WINDOW_SIZE")
                .and_then(|s| parse_window_size(&s))
                .unwrap_or(defaults.window_size),
            baseline_dir: var("DIAGNOSTICS_BASELINE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.baseline_dir),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.webdriver_endpoint != "auto"
            && !self.webdriver_endpoint.starts_with("http://")
            && !self.webdriver_endpoint.starts_with("https://")
        {
            return Err(format!(
                "Invalid WebDriver endpoint '{}'. Must be 'auto' or start with http:// or https://",
                self.webdriver_endpoint
            ));
        }

        if self.driver_startup_timeout_ms == 0 {
            return Err("WebDriver startup timeout must be greater than 0".to_string());
        }

        if self.window_size.0 == 0 || self.window_size.1 == 0 {
            return Err(format!(
                "Window size must be non-zero, got {}x{}",
                self.window_size.0, self.window_size.1
            ));
        }

        Ok(())
    }

    pub fn setup_guidance() -> &'static str {
        r#"
Browser Diagnostics MCP Server Setup:

1. Install a WebDriver (choose one):
   - ChromeDriver: brew install chromedriver / apt-get install chromium-chromedriver
   - GeckoDriver:  brew install geckodriver / apt-get install firefox-geckodriver
   - EdgeDriver:   https://developer.microsoft.com/microsoft-edge/tools/webdriver/

2. Environment Variables (all optional):
   - WEBDRIVER_ENDPOINT: 'auto' (default) or a specific URL
   - WEBDRIVER_PREFERRED_DRIVER: chrome (default), firefox, or edge
   - WEBDRIVER_HEADLESS: true (default) or false
   - WEBDRIVER_STARTUP_TIMEOUT_MS: wait for an auto-started driver (default: 10000)
   - DIAGNOSTICS_WINDOW_SIZE: viewport as WIDTHxHEIGHT (default: 1280x720)
   - DIAGNOSTICS_BASELINE_DIR: where visual_diff keeps baselines (default: .visual-baselines)
"#
    }
}

fn parse_window_size(value: &str) -> Option<(u32, u32)> {
    let (w, h) = value.trim().split_once(['x', 'X'])?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}
