use std::path::PathBuf;

use anyhow::Result;
use browser_diagnostics_mcp::{Config, DiagnosticsServer, DriverType};
use clap::{Parser, ValueEnum};

mod servers;
use servers::run_stdio_server;

#[derive(Parser)]
#[command(name = "browser-diagnostics-mcp")]
#[command(about = "Browser diagnostics MCP server - CSS, scroll, DOM mutation and visual diff tools")]
#[command(version)]
struct Cli {
    /// Browser driver to use (overrides WEBDRIVER_PREFERRED_DRIVER)
    #[arg(short, long)]
    browser: Option<BrowserType>,

    /// WebDriver endpoint URL, or 'auto' to find or start a local driver
    #[arg(long)]
    endpoint: Option<String>,

    /// Show the browser window instead of running headless
    #[arg(long)]
    headed: bool,

    /// Directory for visual_diff baselines
    #[arg(long)]
    baseline_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum BrowserType {
    /// Google Chrome browser
    Chrome,
    /// Mozilla Firefox browser
    Firefox,
    /// Microsoft Edge browser
    Edge,
}

impl From<BrowserType> for DriverType {
    fn from(browser: BrowserType) -> Self {
        match browser {
            BrowserType::Chrome => DriverType::Chrome,
            BrowserType::Firefox => DriverType::Firefox,
            BrowserType::Edge => DriverType::Edge,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let mut config = Config::from_env();
    if let Some(browser) = cli.browser {
        config.preferred_driver = browser.into();
    }
    if let Some(endpoint) = cli.endpoint {
        config.webdriver_endpoint = endpoint;
    }
    if cli.headed {
        config.headless = false;
    }
    if let Some(dir) = cli.baseline_dir {
        config.baseline_dir = dir;
    }

    config.validate().map_err(|e| {
        tracing::error!("Invalid configuration: {}", e);
        tracing::info!("{}", Config::setup_guidance());
        anyhow::anyhow!(e)
    })?;

    let server = DiagnosticsServer::new(config);
    tracing::info!(
        "Starting browser diagnostics MCP server with tools: {}",
        server.registry().names().join(", ")
    );
    run_stdio_server(server).await
}
