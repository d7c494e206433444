//! `monitor_dom_mutations`: record DOM changes on a page for a fixed window.

use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rmcp::model::JsonObject;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::{DiagnosticTool, PageTarget, parse_args, schema, target_properties, to_report};
use crate::{
    error::{DiagnosticsError, Result},
    session::SessionManager,
};

const DEFAULT_DURATION_MS: u64 = 2_000;
const MAX_DURATION_MS: u64 = 30_000;
const DEFAULT_MAX_RECORDS: usize = 200;
const TOP_TARGETS: usize = 10;

const INSTALL_OBSERVER_SCRIPT: &str = r#"
    const [selector] = arguments;
    const root = document.querySelector(selector);
    if (!root) return false;

    if (window.__diagMutationObserver) {
        window.__diagMutationObserver.disconnect();
    }

    const LIMIT = 5000;
    const describe = (el) => {
        let s = el.tagName.toLowerCase();
        if (el.id) s += '#' + el.id;
        if (el.classList && el.classList.length) s += '.' + Array.from(el.classList).slice(0, 3).join('.');
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

    const start = performance.now();
    window.__diagMutations = [];
    window.__diagMutationsDropped = 0;

    const handle = (records) => {
        for (const r of records) {
            if (window.__diagMutations.length >= LIMIT) {
                window.__diagMutationsDropped++;
                continue;
            }
            const target = r.target.nodeType === 1 ? r.target : r.target.parentElement;
            window.__diagMutations.push({
                type: r.type,
                target: target ? pathOf(target) : '#text',
                timestamp_ms: Math.round((performance.now() - start) * 100) / 100,
                added_nodes: r.addedNodes ? r.addedNodes.length : 0,
                removed_nodes: r.removedNodes ? r.removedNodes.length : 0,
                attribute_name: r.attributeName,
                old_value: r.oldValue === null || r.oldValue === undefined ? null : String(r.oldValue).slice(0, 200)
            });
        }
    };

    window.__diagMutationHandler = handle;
    window.__diagMutationObserver = new MutationObserver(handle);
    window.__diagMutationObserver.observe(root, {
        childList: true,
        subtree: true,
        attributes: true,
        attributeOldValue: true,
        characterData: true,
        characterDataOldValue: true
    });
    return true;
"#;

const COLLECT_MUTATIONS_SCRIPT: &str = r#"
    const observer = window.__diagMutationObserver;
    if (!observer) return null;
    window.__diagMutationHandler(observer.takeRecords());
    observer.disconnect();
    const out = {
        records: window.__diagMutations || [],
        dropped: window.__diagMutationsDropped || 0
    };
    delete window.__diagMutationObserver;
    delete window.__diagMutationHandler;
    delete window.__diagMutations;
    delete window.__diagMutationsDropped;
    return out;
"#;

pub struct DomMutationTool;

#[derive(Debug, Deserialize)]
struct MutationArgs {
    #[serde(flatten)]
    target: PageTarget,
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    duration_ms: Option<u64>,
    #[serde(default)]
    max_records: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct MutationRecord {
    #[serde(rename = "type")]
    kind: String,
    target: String,
    timestamp_ms: f64,
    #[serde(default)]
    added_nodes: u32,
    #[serde(default)]
    removed_nodes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attribute_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    old_value: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CollectedMutations {
    records: Vec<MutationRecord>,
    #[serde(default)]
    dropped: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct TargetCount {
    target: String,
    mutations: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct MutationReport {
    url: String,
    selector: String,
    started_at: DateTime<Utc>,
    duration_ms: u64,
    total_mutations: u64,
    by_type: BTreeMap<String, usize>,
    nodes_added: u64,
    nodes_removed: u64,
    busiest_targets: Vec<TargetCount>,
    first_mutation_ms: Option<f64>,
    last_mutation_ms: Option<f64>,
    records: Vec<MutationRecord>,
    truncated: bool,
}

pub(crate) fn summarize(
    url: &str,
    selector: &str,
    started_at: DateTime<Utc>,
    duration_ms: u64,
    max_records: usize,
    collected: CollectedMutations,
) -> MutationReport {
    let CollectedMutations { mut records, dropped } = collected;
    records.sort_by(|a, b| a.timestamp_ms.total_cmp(&b.timestamp_ms));

    let mut by_type = BTreeMap::new();
    let mut per_target: BTreeMap<&str, usize> = BTreeMap::new();
    let mut nodes_added = 0u64;
    let mut nodes_removed = 0u64;

    for record in &records {
        *by_type.entry(record.kind.clone()).or_insert(0) += 1;
        *per_target.entry(record.target.as_str()).or_insert(0) += 1;
        nodes_added += u64::from(record.added_nodes);
        nodes_removed += u64::from(record.removed_nodes);
    }

    let mut busiest_targets: Vec<TargetCount> = per_target
        .into_iter()
        .map(|(target, mutations)| TargetCount {
            target: target.to_string(),
            mutations,
        })
        .collect();
    // Stable sort keeps ties in path order.
    busiest_targets.sort_by(|a, b| b.mutations.cmp(&a.mutations));
    busiest_targets.truncate(TOP_TARGETS);

    let first_mutation_ms = records.first().map(|r| r.timestamp_ms);
    let last_mutation_ms = records.last().map(|r| r.timestamp_ms);
    let total_mutations = records.len() as u64 + dropped;
    let truncated = dropped > 0 || records.len() > max_records;
    records.truncate(max_records);

    MutationReport {
        url: url.to_string(),
        selector: selector.to_string(),
        started_at,
        duration_ms,
        total_mutations,
        by_type,
        nodes_added,
        nodes_removed,
        busiest_targets,
        first_mutation_ms,
        last_mutation_ms,
        records,
        truncated,
    }
}

#[async_trait]
impl DiagnosticTool for DomMutationTool {
    fn name(&self) -> &'static str {
        "monitor_dom_mutations"
    }

    fn description(&self) -> &'static str {
        "Observe DOM mutations (child list, attribute and text changes) under an element for a time window and report them with timestamps, counts per type and the most frequently mutated elements."
    }

    fn input_schema(&self) -> JsonObject {
        let mut properties = target_properties();
        properties.insert(
            "selector".to_string(),
            json!({
                "type": "string",
                "description": "Root element to observe (default: body)"
            }),
        );
        properties.insert(
            "duration_ms".to_string(),
            json!({
                "type": "integer",
                "minimum": 1,
                "maximum": MAX_DURATION_MS,
                "description": "How long to observe, in milliseconds (default: 2000, max: 30000)"
            }),
        );
        properties.insert(
            "max_records".to_string(),
            json!({
                "type": "integer",
                "minimum": 0,
                "description": "Maximum individual mutation records returned (default: 200)"
            }),
        );
        schema(json!({
            "type": "object",
            "properties": properties,
            "required": ["url"]
        }))
    }

    async fn execute(&self, session: &SessionManager, args: &JsonObject) -> Result<Value> {
        let args: MutationArgs = parse_args(self.name(), args)?;
        let selector = args.selector.unwrap_or_else(|| "body".to_string());
        let duration_ms = args
            .duration_ms
            .unwrap_or(DEFAULT_DURATION_MS)
            .clamp(1, MAX_DURATION_MS);
        let max_records = args.max_records.unwrap_or(DEFAULT_MAX_RECORDS);

        let page = args.target.open(session).await?;

        let installed = page
            .evaluate(INSTALL_OBSERVER_SCRIPT, vec![json!(selector)])
            .await?;
        if installed != Value::Bool(true) {
            return Err(DiagnosticsError::ElementNotFound { selector });
        }

        let started_at = Utc::now();
        debug!("Observing mutations under '{}' for {}ms", selector, duration_ms);
        tokio::time::sleep(Duration::from_millis(duration_ms)).await;

        let collected = page.evaluate(COLLECT_MUTATIONS_SCRIPT, Vec::new()).await?;
        if collected.is_null() {
            return Err(DiagnosticsError::Script(
                "mutation observer disappeared; the page navigated or reloaded while monitoring"
                    .to_string(),
            ));
        }
        let collected: CollectedMutations = serde_json::from_value(collected)?;

        to_report(&summarize(
            &args.target.url,
            &selector,
            started_at,
            duration_ms,
            max_records,
            collected,
        ))
    }
}
