use std::sync::Arc;

use rmcp::{ErrorData as McpError, ServerHandler, model::*};

use crate::{
    config::Config,
    session::SessionManager,
    tools::ToolRegistry,
    webdriver::WebDriverLauncher,
};

/// MCP front end: routes tool calls from the registry onto the shared browser session.
#[derive(Clone)]
pub struct DiagnosticsServer {
    session: Arc<SessionManager>,
    registry: Arc<ToolRegistry>,
}

impl DiagnosticsServer {
    pub fn new(config: Config) -> Self {
        let registry = ToolRegistry::with_default_tools(&config);
        let session = SessionManager::new(Arc::new(WebDriverLauncher::new(config)));
        Self::with_parts(Arc::new(session), Arc::new(registry))
    }

    pub fn with_parts(session: Arc<SessionManager>, registry: Arc<ToolRegistry>) -> Self {
        Self { session, registry }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn list_tools(&self) -> Vec<Tool> {
        self.registry.list()
    }

    /// Look up, launch the browser if needed, run, and serialize the report.
    ///
    /// Unknown names fail with METHOD_NOT_FOUND before the browser is touched.
    /// Every other failure is logged and surfaced as INTERNAL_ERROR.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, McpError> {
        let Some(tool) = self.registry.find(name) else {
            tracing::warn!("Unknown tool requested: {}", name);
            return Err(McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("tool not found: {name}"),
                None,
            ));
        };

        let arguments = arguments.unwrap_or_default();
        tracing::debug!("Calling tool {}", name);

        let result = async {
            self.session.initialize().await?;
            let report = tool.execute(&self.session, &arguments).await?;
            Ok::<_, crate::error::DiagnosticsError>(serde_json::to_string_pretty(&report)?)
        }
        .await;

        match result {
            Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
            Err(e) => {
                tracing::error!(tool = name, "Tool execution failed: {}", e);
                Err(McpError::internal_error(format!("{name} failed: {e}"), None))
            }
        }
    }

    /// Close every page and the browser. Safe to call more than once.
    pub async fn cleanup(&self) -> crate::error::Result<()> {
        self.session.cleanup().await
    }
}

impl ServerHandler for DiagnosticsServer {
    fn get_info(&self) -> InitializeResult {
        InitializeResult {
            protocol_version: ProtocolVersion::V_2024_11_05,
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
                ..Default::default()
            },
            instructions: Some(
                "Browser diagnostics: CSS cascade, scroll/overflow, DOM mutations and visual diffs. \
                 Pass page_id to reuse a page across calls."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: DiagnosticsServer::list_tools(self),
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        DiagnosticsServer::call_tool(self, request.name.as_ref(), request.arguments).await
    }
}
