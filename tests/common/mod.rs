#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet, VecDeque},
    io::Cursor,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use browser_diagnostics_mcp::{
    Browser, BrowserLauncher, Config, DiagnosticTool, DiagnosticsError, DiagnosticsServer, Page,
    SessionManager, ToolRegistry,
};
use image::{ImageFormat, Rgba, RgbaImage};
use rmcp::model::JsonObject;
use serde_json::{Value, json};

/// Counters and canned responses shared by every fake browser a launcher creates.
#[derive(Default)]
pub struct FakeState {
    pub launches: AtomicUsize,
    pub browser_closes: AtomicUsize,
    pub pages_opened: AtomicUsize,
    pub pages_closed: AtomicUsize,
    pub navigations: AtomicUsize,
    pub executions: AtomicUsize,
    pub fail_launch: AtomicBool,
    pub crashed: AtomicBool,
    /// Returned by `evaluate` in order; `null` once drained.
    pub script_results: Mutex<VecDeque<Value>>,
    /// Screenshot per URL; pages without an entry get a plain white image.
    pub screenshots: Mutex<HashMap<String, Vec<u8>>>,
    pub viewports: Mutex<Vec<(u32, u32)>>,
    /// Page ids whose window was closed behind the session's back.
    pub closed_windows: Mutex<HashSet<String>>,
}

impl FakeState {
    pub fn push_script_result(&self, value: Value) {
        self.script_results.lock().unwrap().push_back(value);
    }

    pub fn set_screenshot(&self, url: &str, png: Vec<u8>) {
        self.screenshots.lock().unwrap().insert(url.to_string(), png);
    }

    pub fn close_window(&self, page_id: &str) {
        self.closed_windows.lock().unwrap().insert(page_id.to_string());
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

pub struct FakeLauncher {
    pub state: Arc<FakeState>,
}

impl FakeLauncher {
    pub fn new() -> (Arc<Self>, Arc<FakeState>) {
        let state = Arc::new(FakeState::default());
        (
            Arc::new(Self {
                state: state.clone(),
            }),
            state,
        )
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> browser_diagnostics_mcp::Result<Box<dyn Browser>> {
        self.state.launches.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to pile up on the session lock.
        tokio::task::yield_now().await;
        if self.state.fail_launch.load(Ordering::SeqCst) {
            return Err(DiagnosticsError::Session(
                "chromedriver not found".to_string(),
            ));
        }
        self.state.crashed.store(false, Ordering::SeqCst);
        Ok(Box::new(FakeBrowser {
            state: self.state.clone(),
        }))
    }
}

struct FakeBrowser {
    state: Arc<FakeState>,
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn open_page(&self, url: &str) -> browser_diagnostics_mcp::Result<Box<dyn Page>> {
        let n = self.state.pages_opened.fetch_add(1, Ordering::SeqCst);
        let page = FakePage {
            id: format!("page-{n}"),
            url: Mutex::new(String::new()),
            state: self.state.clone(),
        };
        page.navigate(url).await?;
        Ok(Box::new(page))
    }

    async fn is_alive(&self) -> bool {
        !self.state.crashed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> browser_diagnostics_mcp::Result<()> {
        self.state.browser_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakePage {
    id: String,
    url: Mutex<String>,
    state: Arc<FakeState>,
}

impl FakePage {
    fn window(&self) -> browser_diagnostics_mcp::Result<()> {
        if self.state.closed_windows.lock().unwrap().contains(&self.id) {
            return Err(DiagnosticsError::Script("no such window".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Page for FakePage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn navigate(&self, url: &str) -> browser_diagnostics_mcp::Result<()> {
        self.window()?;
        self.state.navigations.fetch_add(1, Ordering::SeqCst);
        *self.url.lock().unwrap() = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> browser_diagnostics_mcp::Result<String> {
        self.window()?;
        Ok(self.url.lock().unwrap().clone())
    }

    async fn evaluate(
        &self,
        _script: &str,
        _args: Vec<Value>,
    ) -> browser_diagnostics_mcp::Result<Value> {
        self.window()?;
        self.state.executions.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .state
            .script_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Value::Null))
    }

    async fn screenshot(&self) -> browser_diagnostics_mcp::Result<Vec<u8>> {
        self.window()?;
        let url = self.url.lock().unwrap().clone();
        let stored = self.state.screenshots.lock().unwrap().get(&url).cloned();
        Ok(stored.unwrap_or_else(|| solid_png(8, 8, [255, 255, 255, 255])))
    }

    async fn set_viewport(&self, width: u32, height: u32) -> browser_diagnostics_mcp::Result<()> {
        self.state.viewports.lock().unwrap().push((width, height));
        Ok(())
    }

    async fn close(&self) -> browser_diagnostics_mcp::Result<()> {
        self.state.pages_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A tool that always fails after the session is up.
pub struct FailingTool;

#[async_trait]
impl DiagnosticTool for FailingTool {
    fn name(&self) -> &'static str {
        "always_fails"
    }

    fn description(&self) -> &'static str {
        "Fails every call"
    }

    fn input_schema(&self) -> JsonObject {
        json!({ "type": "object" }).as_object().cloned().unwrap()
    }

    async fn execute(
        &self,
        _session: &SessionManager,
        _args: &JsonObject,
    ) -> browser_diagnostics_mcp::Result<Value> {
        Err(DiagnosticsError::Script("boom".to_string()))
    }
}

/// A tool that echoes the page it was given.
pub struct EchoTool;

#[async_trait]
impl DiagnosticTool for EchoTool {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn description(&self) -> &'static str {
        "Opens the requested page and returns its id"
    }

    fn input_schema(&self) -> JsonObject {
        json!({ "type": "object", "properties": { "url": { "type": "string" } } })
            .as_object()
            .cloned()
            .unwrap()
    }

    async fn execute(
        &self,
        session: &SessionManager,
        args: &JsonObject,
    ) -> browser_diagnostics_mcp::Result<Value> {
        let url = args.get("url").and_then(Value::as_str).unwrap_or("about:blank");
        let page = session.page(url, url).await?;
        Ok(json!({ "page": page.id() }))
    }
}

pub fn session() -> (Arc<SessionManager>, Arc<FakeState>) {
    let (launcher, state) = FakeLauncher::new();
    (Arc::new(SessionManager::new(launcher)), state)
}

/// Server with the real diagnostic tools backed by the fake browser.
pub fn default_server(baseline_dir: &std::path::Path) -> (DiagnosticsServer, Arc<FakeState>) {
    let config = Config {
        baseline_dir: baseline_dir.to_path_buf(),
        ..Config::default()
    };
    let (session, state) = session();
    let registry = Arc::new(ToolRegistry::with_default_tools(&config));
    (DiagnosticsServer::with_parts(session, registry), state)
}

/// Server with an arbitrary tool list backed by the fake browser.
pub fn server_with(tools: Vec<Arc<dyn DiagnosticTool>>) -> (DiagnosticsServer, Arc<FakeState>) {
    let (session, state) = session();
    (
        DiagnosticsServer::with_parts(session, Arc::new(ToolRegistry::new(tools))),
        state,
    )
}

pub fn object(value: Value) -> JsonObject {
    value.as_object().cloned().unwrap()
}

pub fn solid_png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba(rgba));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Parse the single text block of a successful tool result.
pub fn report(result: &rmcp::model::CallToolResult) -> Value {
    let text = result
        .content
        .first()
        .and_then(|c| c.raw.as_text())
        .map(|t| t.text.clone())
        .unwrap();
    serde_json::from_str(&text).unwrap()
}
