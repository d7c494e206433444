pub mod browser;
mod config;
mod driver;
mod error;
pub mod pixel_diff;
mod server;
pub mod session;
pub mod specificity;
pub mod tools;
mod webdriver;

pub use browser::{Browser, BrowserLauncher, Page};
pub use config::Config;
pub use driver::{DriverManager, DriverType, ManagedDriver};
pub use error::{DiagnosticsError, Result};
pub use server::DiagnosticsServer;
pub use session::{SessionManager, SessionState};
pub use tools::{DiagnosticTool, ToolRegistry};
pub use webdriver::{WebDriverBrowser, WebDriverLauncher, WebDriverPage};
