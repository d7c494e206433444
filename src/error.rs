use std::fmt;

#[derive(Debug)]
pub enum DiagnosticsError {
    Client(fantoccini::error::CmdError),
    Session(String),
    ElementNotFound { selector: String },
    InvalidArguments(String),
    Script(String),
    Json(serde_json::Error),
    Image(image::ImageError),
    Io(std::io::Error),
    Generic(anyhow::Error),
}

impl DiagnosticsError {
    /// True for failures of the browser session itself rather than of a tool body.
    pub fn is_session(&self) -> bool {
        matches!(self, Self::Session(_))
    }
}

impl fmt::Display for DiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client(e) => write!(f, "WebDriver client error: {e}"),
            Self::Session(msg) => write!(f, "Session error: {msg}"),
            Self::ElementNotFound { selector } => {
                write!(f, "No element matches selector: {selector}")
            }
            Self::InvalidArguments(msg) => write!(f, "Invalid arguments: {msg}"),
            Self::Script(msg) => write!(f, "Page script error: {msg}"),
            Self::Json(e) => write!(f, "JSON error: {e}"),
            Self::Image(e) => write!(f, "Image error: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Generic(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for DiagnosticsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Client(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Image(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<fantoccini::error::CmdError> for DiagnosticsError {
    fn from(err: fantoccini::error::CmdError) -> Self {
        Self::Client(err)
    }
}

impl From<fantoccini::error::NewSessionError> for DiagnosticsError {
    fn from(err: fantoccini::error::NewSessionError) -> Self {
        Self::Session(format!("WebDriver session creation error: {err}"))
    }
}

impl From<image::ImageError> for DiagnosticsError {
    fn from(err: image::ImageError) -> Self {
        Self::Image(err)
    }
}

impl From<std::io::Error> for DiagnosticsError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for DiagnosticsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

impl From<anyhow::Error> for DiagnosticsError {
    fn from(err: anyhow::Error) -> Self {
        Self::Generic(err)
    }
}

pub type Result<T> = std::result::Result<T, DiagnosticsError>;
