//! Diagnostic tool catalog.
//!
//! Every tool implements [`DiagnosticTool`]; the [`ToolRegistry`] holds them in
//! a fixed order built once at startup and never mutated afterwards.

mod args;
mod css_cascade;
mod mutations;
mod scroll;
mod visual_diff;

pub use args::{PageTarget, parse_args};
pub use css_cascade::CssCascadeTool;
pub use mutations::DomMutationTool;
pub use scroll::ScrollInspectorTool;
pub use visual_diff::VisualDiffTool;

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use rmcp::model::{JsonObject, Tool};
use serde::Serialize;
use serde_json::Value;

use crate::{config::Config, error::Result, session::SessionManager};

#[async_trait]
pub trait DiagnosticTool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON Schema for the arguments. Descriptive only; nothing enforces it.
    fn input_schema(&self) -> JsonObject;

    /// Run against the live session. The session is already initialized.
    async fn execute(&self, session: &SessionManager, args: &JsonObject) -> Result<Value>;

    fn descriptor(&self) -> Tool {
        Tool::new(self.name(), self.description(), Arc::new(self.input_schema()))
    }
}

pub struct ToolRegistry {
    tools: Vec<Arc<dyn DiagnosticTool>>,
}

impl ToolRegistry {
    /// Keeps insertion order; a later tool reusing an earlier name is dropped.
    pub fn new(tools: Vec<Arc<dyn DiagnosticTool>>) -> Self {
        let mut seen = HashSet::new();
        let tools = tools
            .into_iter()
            .filter(|tool| {
                let fresh = seen.insert(tool.name());
                if !fresh {
                    tracing::warn!("Duplicate tool name '{}' ignored", tool.name());
                }
                fresh
            })
            .collect();
        Self { tools }
    }

    pub fn with_default_tools(config: &Config) -> Self {
        Self::new(vec![
            Arc::new(CssCascadeTool),
            Arc::new(ScrollInspectorTool),
            Arc::new(DomMutationTool),
            Arc::new(VisualDiffTool::new(config.baseline_dir.clone())),
        ])
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn DiagnosticTool>> {
        self.tools.iter().find(|tool| tool.name() == name).cloned()
    }

    pub fn list(&self) -> Vec<Tool> {
        self.tools.iter().map(|tool| tool.descriptor()).collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

pub(crate) fn schema(value: Value) -> JsonObject {
    match value {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    }
}

pub(crate) fn to_report<T: Serialize>(report: &T) -> Result<Value> {
    Ok(serde_json::to_value(report)?)
}

/// Shared `url` / `page_id` schema properties.
pub(crate) fn target_properties() -> serde_json::Map<String, Value> {
    schema(serde_json::json!({
        "url": {
            "type": "string",
            "description": "Page to inspect. Opened on first use, reused afterwards for the same page_id"
        },
        "page_id": {
            "type": "string",
            "description": "Optional page identifier (defaults to the url). Calls with the same id share one browser page"
        }
    }))
}
