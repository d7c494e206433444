use std::sync::Arc;

use rmcp::model::JsonObject;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    browser::Page,
    error::{DiagnosticsError, Result},
    session::SessionManager,
};

/// Which page a tool runs against.
#[derive(Debug, Clone, Deserialize)]
pub struct PageTarget {
    pub url: String,
    #[serde(default)]
    pub page_id: Option<String>,
}

impl PageTarget {
    pub fn identifier(&self) -> &str {
        self.page_id.as_deref().unwrap_or(&self.url)
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.url).map_err(|e| {
            DiagnosticsError::InvalidArguments(format!("invalid url '{}': {}", self.url, e))
        })?;
        if self.page_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(DiagnosticsError::InvalidArguments(
                "page_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate, then fetch (or open) the page through the session.
    pub async fn open(&self, session: &SessionManager) -> Result<Arc<dyn Page>> {
        self.validate()?;
        session.page(self.identifier(), &self.url).await
    }
}

pub fn parse_args<T: DeserializeOwned>(tool: &str, args: &JsonObject) -> Result<T> {
    serde_json::from_value(Value::Object(args.clone()))
        .map_err(|e| DiagnosticsError::InvalidArguments(format!("{tool}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Args {
        #[serde(flatten)]
        target: PageTarget,
        selector: String,
    }

    fn object(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn identifier_defaults_to_url() {
        let args: Args =
            parse_args("t", &object(json!({"url": "https://example.com", "selector": "p"}))).unwrap();
        assert_eq!(args.target.identifier(), "https://example.com");
        assert_eq!(args.selector, "p");

        let args: Args = parse_args(
            "t",
            &object(json!({"url": "https://example.com", "page_id": "home", "selector": "p"})),
        )
        .unwrap();
        assert_eq!(args.target.identifier(), "home");
    }

    #[test]
    fn missing_field_is_invalid_arguments() {
        let err = parse_args::<Args>("inspect", &object(json!({"url": "https://example.com"})))
            .unwrap_err();
        match err {
            DiagnosticsError::InvalidArguments(msg) => {
                assert!(msg.starts_with("inspect:"));
                assert!(msg.contains("selector"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn validation_rejects_relative_urls_and_blank_ids() {
        let target = PageTarget { url: "/relative".to_string(), page_id: None };
        assert!(target.validate().is_err());

        let target = PageTarget { url: "about:blank".to_string(), page_id: Some(" ".to_string()) };
        assert!(target.validate().is_err());

        let target = PageTarget { url: "data:text/html,<p>hi</p>".to_string(), page_id: None };
        assert!(target.validate().is_ok());
    }
}
