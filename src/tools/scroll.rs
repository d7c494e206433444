//! `inspect_scroll`: why a page (or element) scrolls, or refuses to.

use async_trait::async_trait;
use rmcp::model::JsonObject;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{DiagnosticTool, PageTarget, parse_args, schema, target_properties, to_report};
use crate::{error::Result, session::SessionManager};

const DEFAULT_MAX_ELEMENTS: usize = 20;

const COLLECT_SCROLL_SCRIPT: &str = r#"
    const [selector] = arguments;
    const SCAN_LIMIT = 500;
    const scrollable = (v) => v === 'auto' || v === 'scroll' || v === 'overlay';
    const clipping = (v) => v === 'hidden' || v === 'clip';

    const describe = (el) => {
        let s = el.tagName.toLowerCase();
        if (el.id) s += '#' + el.id;
        if (el.classList.length) s += '.' + Array.from(el.classList).slice(0, 3).join('.');
        return s;
    };
    const pathOf = (el) => {
        const parts = [];
        let node = el;
        while (node && node.nodeType === 1 && parts.length < 5) {
            parts.unshift(describe(node));
            if (node.id) break;
            node = node.parentElement;
        }
        return parts.join(' > ');
    };
    const hasScrollAncestor = (el) => {
        for (let p = el.parentElement; p && p !== document.body; p = p.parentElement) {
            const cs = getComputedStyle(p);
            if (scrollable(cs.overflowX) || scrollable(cs.overflowY)) return true;
        }
        return false;
    };
    const metrics = (el) => ({
        scroll_width: el.scrollWidth,
        client_width: el.clientWidth,
        scroll_height: el.scrollHeight,
        client_height: el.clientHeight
    });

    const root = document.documentElement;
    const clientWidth = root.clientWidth;
    const containers = [], offenders = [], clipped = [], pinned = [];

    for (const el of document.querySelectorAll('body *')) {
        const cs = getComputedStyle(el);
        if (cs.display === 'none') continue;
        const rect = el.getBoundingClientRect();
        const overflowsX = el.scrollWidth > el.clientWidth + 1;
        const overflowsY = el.scrollHeight > el.clientHeight + 1;

        if ((scrollable(cs.overflowX) || scrollable(cs.overflowY)) && (overflowsX || overflowsY)
            && containers.length < SCAN_LIMIT) {
            containers.push(Object.assign({
                path: pathOf(el),
                overflow_x: cs.overflowX,
                overflow_y: cs.overflowY,
                nested: hasScrollAncestor(el)
            }, metrics(el)));
        }
        if ((clipping(cs.overflowX) && overflowsX || clipping(cs.overflowY) && overflowsY)
            && clipped.length < SCAN_LIMIT) {
            clipped.push(Object.assign({
                path: pathOf(el),
                overflow_x: cs.overflowX,
                overflow_y: cs.overflowY,
                nested: false
            }, metrics(el)));
        }
        if (rect.width > 0 && rect.right > clientWidth + 1 && cs.position !== 'fixed'
            && offenders.length < SCAN_LIMIT) {
            offenders.push({
                path: pathOf(el),
                left: rect.left,
                right: rect.right,
                width: rect.width,
                overflow_px: rect.right - clientWidth
            });
        }
        if ((cs.position === 'fixed' || cs.position === 'sticky') && pinned.length < SCAN_LIMIT) {
            pinned.push({
                path: pathOf(el),
                position: cs.position,
                top: rect.top,
                height: rect.height,
                z_index: cs.zIndex
            });
        }
    }

    let target = null;
    if (selector) {
        const el = document.querySelector(selector);
        if (el) {
            const cs = getComputedStyle(el);
            target = Object.assign({
                path: pathOf(el),
                overflow_x: cs.overflowX,
                overflow_y: cs.overflowY,
                nested: hasScrollAncestor(el)
            }, metrics(el));
        }
    }

    const htmlStyle = getComputedStyle(root);
    const bodyStyle = document.body ? getComputedStyle(document.body) : htmlStyle;
    const scroller = document.scrollingElement || root;

    return {
        viewport: { width: window.innerWidth, height: window.innerHeight, client_width: clientWidth },
        document: {
            scroll_width: scroller.scrollWidth,
            scroll_height: scroller.scrollHeight,
            scroll_x: window.scrollX,
            scroll_y: window.scrollY
        },
        html_overflow: { x: htmlStyle.overflowX, y: htmlStyle.overflowY },
        body_overflow: { x: bodyStyle.overflowX, y: bodyStyle.overflowY },
        scroll_behavior: htmlStyle.scrollBehavior,
        containers: containers,
        clipped: clipped,
        offenders: offenders,
        pinned: pinned,
        target: target
    };
"#;

pub struct ScrollInspectorTool;

#[derive(Debug, Deserialize)]
struct ScrollArgs {
    #[serde(flatten)]
    target: PageTarget,
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    max_elements: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct Viewport {
    width: f64,
    height: f64,
    client_width: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct DocumentScroll {
    scroll_width: f64,
    scroll_height: f64,
    scroll_x: f64,
    scroll_y: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct Overflow {
    x: String,
    y: String,
}

impl Overflow {
    fn locks_vertical(&self) -> bool {
        matches!(self.y.as_str(), "hidden" | "clip")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct ScrollBox {
    path: String,
    overflow_x: String,
    overflow_y: String,
    #[serde(default)]
    nested: bool,
    scroll_width: f64,
    client_width: f64,
    scroll_height: f64,
    client_height: f64,
}

impl ScrollBox {
    fn can_scroll(&self) -> bool {
        let scrollable = |v: &str| matches!(v, "auto" | "scroll" | "overlay");
        (scrollable(&self.overflow_x) && self.scroll_width > self.client_width + 1.0)
            || (scrollable(&self.overflow_y) && self.scroll_height > self.client_height + 1.0)
    }

    fn has_overflowing_content(&self) -> bool {
        self.scroll_width > self.client_width + 1.0 || self.scroll_height > self.client_height + 1.0
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct Offender {
    path: String,
    left: f64,
    right: f64,
    width: f64,
    overflow_px: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct Pinned {
    path: String,
    position: String,
    top: f64,
    height: f64,
    z_index: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawScroll {
    viewport: Viewport,
    document: DocumentScroll,
    html_overflow: Overflow,
    body_overflow: Overflow,
    #[serde(default)]
    scroll_behavior: String,
    #[serde(default)]
    containers: Vec<ScrollBox>,
    #[serde(default)]
    clipped: Vec<ScrollBox>,
    #[serde(default)]
    offenders: Vec<Offender>,
    #[serde(default)]
    pinned: Vec<Pinned>,
    target: Option<ScrollBox>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum IssueKind {
    HorizontalOverflow,
    ScrollLocked,
    NestedScrollContainer,
    ClippedContent,
    LargeFixedElement,
    TargetMissing,
    TargetNotScrollable,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ScrollIssue {
    kind: IssueKind,
    message: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ScrollReport {
    url: String,
    viewport: Viewport,
    document: DocumentScroll,
    html_overflow: Overflow,
    body_overflow: Overflow,
    scroll_behavior: String,
    issues: Vec<ScrollIssue>,
    overflowing_elements: Vec<Offender>,
    scroll_containers: Vec<ScrollBox>,
    clipped_elements: Vec<ScrollBox>,
    pinned_elements: Vec<Pinned>,
    target: Option<ScrollBox>,
    truncated: bool,
}

pub(crate) fn derive_issues(raw: &RawScroll, selector: Option<&str>) -> Vec<ScrollIssue> {
    let mut issues = Vec::new();

    let horizontal_excess = raw.document.scroll_width - raw.viewport.client_width;
    if horizontal_excess > 1.0 {
        issues.push(ScrollIssue {
            kind: IssueKind::HorizontalOverflow,
            message: format!(
                "Page scrolls horizontally by {:.0}px; {} element(s) extend past the right edge of the viewport",
                horizontal_excess,
                raw.offenders.len()
            ),
        });
    }

    let content_taller = raw.document.scroll_height > raw.viewport.height + 1.0;
    let locked = raw.html_overflow.locks_vertical() || raw.body_overflow.locks_vertical();
    if content_taller && locked {
        let which = if raw.html_overflow.locks_vertical() { "html" } else { "body" };
        issues.push(ScrollIssue {
            kind: IssueKind::ScrollLocked,
            message: format!(
                "Vertical page scrolling is disabled by overflow-y: hidden on <{which}> although content is {:.0}px taller than the viewport",
                raw.document.scroll_height - raw.viewport.height
            ),
        });
    }

    for container in raw.containers.iter().filter(|c| c.nested) {
        issues.push(ScrollIssue {
            kind: IssueKind::NestedScrollContainer,
            message: format!(
                "{} scrolls inside another scroll container; wheel and touch scrolling may be trapped",
                container.path
            ),
        });
    }

    for clipped in &raw.clipped {
        issues.push(ScrollIssue {
            kind: IssueKind::ClippedContent,
            message: format!(
                "{} hides overflowing content ({:.0}x{:.0} content in a {:.0}x{:.0} box)",
                clipped.path,
                clipped.scroll_width,
                clipped.scroll_height,
                clipped.client_width,
                clipped.client_height
            ),
        });
    }

    for pinned in raw.pinned.iter().filter(|p| p.position == "fixed") {
        if raw.viewport.height > 0.0 && pinned.height > raw.viewport.height * 0.3 {
            issues.push(ScrollIssue {
                kind: IssueKind::LargeFixedElement,
                message: format!(
                    "{} is position: fixed and covers {:.0}% of the viewport height",
                    pinned.path,
                    pinned.height * 100.0 / raw.viewport.height
                ),
            });
        }
    }

    if let Some(selector) = selector {
        match &raw.target {
            None => issues.push(ScrollIssue {
                kind: IssueKind::TargetMissing,
                message: format!("No element matches selector {selector}"),
            }),
            Some(target) if !target.can_scroll() => {
                let reason = if target.has_overflowing_content() {
                    format!(
                        "content overflows but overflow is {}/{}",
                        target.overflow_x, target.overflow_y
                    )
                } else {
                    "its content fits inside its box".to_string()
                };
                issues.push(ScrollIssue {
                    kind: IssueKind::TargetNotScrollable,
                    message: format!("{} cannot scroll: {}", target.path, reason),
                });
            }
            Some(_) => {}
        }
    }

    issues
}

pub(crate) fn build_report(
    url: &str,
    selector: Option<&str>,
    max_elements: usize,
    raw: RawScroll,
) -> ScrollReport {
    let issues = derive_issues(&raw, selector);

    let mut offenders = raw.offenders;
    offenders.sort_by(|a, b| b.overflow_px.total_cmp(&a.overflow_px));

    let truncated = offenders.len() > max_elements
        || raw.containers.len() > max_elements
        || raw.clipped.len() > max_elements
        || raw.pinned.len() > max_elements;

    offenders.truncate(max_elements);
    let mut containers = raw.containers;
    containers.truncate(max_elements);
    let mut clipped = raw.clipped;
    clipped.truncate(max_elements);
    let mut pinned = raw.pinned;
    pinned.truncate(max_elements);

    ScrollReport {
        url: url.to_string(),
        viewport: raw.viewport,
        document: raw.document,
        html_overflow: raw.html_overflow,
        body_overflow: raw.body_overflow,
        scroll_behavior: raw.scroll_behavior,
        issues,
        overflowing_elements: offenders,
        scroll_containers: containers,
        clipped_elements: clipped,
        pinned_elements: pinned,
        target: raw.target,
        truncated,
    }
}

#[async_trait]
impl DiagnosticTool for ScrollInspectorTool {
    fn name(&self) -> &'static str {
        "inspect_scroll"
    }

    fn description(&self) -> &'static str {
        "Debug scrolling and overflow: finds elements that cause horizontal page overflow, scroll containers, clipped content, fixed/sticky elements and scroll locks, optionally focusing on one element."
    }

    fn input_schema(&self) -> JsonObject {
        let mut properties = target_properties();
        properties.insert(
            "selector".to_string(),
            json!({
                "type": "string",
                "description": "Optional element whose scrollability should be explained"
            }),
        );
        properties.insert(
            "max_elements".to_string(),
            json!({
                "type": "integer",
                "minimum": 1,
                "description": "Maximum elements listed per category (default: 20)"
            }),
        );
        schema(json!({
            "type": "object",
            "properties": properties,
            "required": ["url"]
        }))
    }

    async fn execute(&self, session: &SessionManager, args: &JsonObject) -> Result<Value> {
        let args: ScrollArgs = parse_args(self.name(), args)?;
        let max_elements = args.max_elements.unwrap_or(DEFAULT_MAX_ELEMENTS).max(1);
        let page = args.target.open(session).await?;

        let raw = page
            .evaluate(COLLECT_SCROLL_SCRIPT, vec![json!(args.selector)])
            .await?;
        let raw: RawScroll = serde_json::from_value(raw)?;

        to_report(&build_report(
            &args.target.url,
            args.selector.as_deref(),
            max_elements,
            raw,
        ))
    }
}
