//! `inspect_css_cascade`: which rules hit an element and which declaration wins.

use std::collections::BTreeMap;

use async_trait::async_trait;
use rmcp::model::JsonObject;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{DiagnosticTool, PageTarget, parse_args, schema, target_properties, to_report};
use crate::{
    error::{DiagnosticsError, Result},
    session::SessionManager,
    specificity::{Specificity, specificity},
};

const COLLECT_CASCADE_SCRIPT: &str = r#"
    const [selector, requested] = arguments;
    const el = document.querySelector(selector);
    if (!el) {
        return { found: false };
    }

    const splitList = (text) => {
        const parts = [];
        let depth = 0, quote = null, current = '';
        for (const ch of text) {
            if (quote) {
                if (ch === quote) quote = null;
                current += ch;
                continue;
            }
            if (ch === '"' || ch === "'") quote = ch;
            else if (ch === '(' || ch === '[') depth++;
            else if (ch === ')' || ch === ']') depth--;
            else if (ch === ',' && depth === 0) {
                if (current.trim()) parts.push(current.trim());
                current = '';
                continue;
            }
            current += ch;
        }
        if (current.trim()) parts.push(current.trim());
        return parts;
    };

    const declarationsOf = (style) => {
        const out = [];
        for (let i = 0; i < style.length; i++) {
            const name = style[i];
            out.push({
                property: name,
                value: style.getPropertyValue(name).trim(),
                important: style.getPropertyPriority(name) === 'important'
            });
        }
        return out;
    };

    const applies = (rule) => {
        if (typeof CSSMediaRule !== 'undefined' && rule instanceof CSSMediaRule) {
            return window.matchMedia(rule.media.mediaText).matches;
        }
        if (typeof CSSSupportsRule !== 'undefined' && rule instanceof CSSSupportsRule) {
            return CSS.supports(rule.conditionText);
        }
        // Container queries and @starting-style depend on state this script cannot see.
        if (typeof CSSContainerRule !== 'undefined' && rule instanceof CSSContainerRule) {
            return false;
        }
        if (typeof CSSStartingStyleRule !== 'undefined' && rule instanceof CSSStartingStyleRule) {
            return false;
        }
        return true;
    };

    const rules = [];
    let order = 0;
    let inaccessible = 0;

    const walk = (list, origin, context) => {
        for (const rule of Array.from(list)) {
            if (rule instanceof CSSStyleRule) {
                order++;
                const matched = [];
                for (const part of splitList(rule.selectorText)) {
                    try {
                        if (el.matches(part)) matched.push(part);
                    } catch (e) {}
                }
                if (matched.length === 0) continue;
                rules.push({
                    selector_text: rule.selectorText,
                    matched_selectors: matched,
                    origin: origin,
                    context: context,
                    source_order: order,
                    declarations: declarationsOf(rule.style)
                });
            } else if (rule.cssRules && applies(rule)) {
                walk(rule.cssRules, origin, context.concat([rule.cssText.split('{')[0].trim()]));
            }
        }
    };

    for (const sheet of Array.from(document.styleSheets)) {
        if (sheet.disabled) continue;
        let list;
        try {
            list = sheet.cssRules;
        } catch (e) {
            inaccessible++;
            continue;
        }
        const owner = sheet.ownerNode && sheet.ownerNode.tagName
            ? '<' + sheet.ownerNode.tagName.toLowerCase() + '>'
            : 'constructed';
        walk(list, sheet.href || owner, []);
    }

    const inline = declarationsOf(el.style);
    const names = new Set(Array.isArray(requested) ? requested : []);
    if (names.size === 0) {
        rules.forEach(r => r.declarations.forEach(d => names.add(d.property)));
        inline.forEach(d => names.add(d.property));
    }
    const style = getComputedStyle(el);
    const computed = {};
    names.forEach(n => { computed[n] = style.getPropertyValue(n).trim(); });

    return {
        found: true,
        element: {
            tag: el.tagName.toLowerCase(),
            id: el.id || null,
            classes: Array.from(el.classList)
        },
        rules: rules,
        inline: inline,
        computed: computed,
        inaccessible_stylesheets: inaccessible
    };
"#;

pub struct CssCascadeTool;

#[derive(Debug, Deserialize)]
struct CascadeArgs {
    #[serde(flatten)]
    target: PageTarget,
    selector: String,
    #[serde(default)]
    properties: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawDeclaration {
    property: String,
    value: String,
    #[serde(default)]
    important: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawRule {
    selector_text: String,
    matched_selectors: Vec<String>,
    origin: String,
    #[serde(default)]
    context: Vec<String>,
    source_order: u32,
    declarations: Vec<RawDeclaration>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct ElementInfo {
    tag: String,
    id: Option<String>,
    #[serde(default)]
    classes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawCascade {
    found: bool,
    element: Option<ElementInfo>,
    #[serde(default)]
    rules: Vec<RawRule>,
    #[serde(default)]
    inline: Vec<RawDeclaration>,
    #[serde(default)]
    computed: BTreeMap<String, String>,
    #[serde(default)]
    inaccessible_stylesheets: u32,
}

#[derive(Debug, Serialize)]
struct MatchedRule {
    selector: String,
    matched_selectors: Vec<String>,
    specificity: Specificity,
    origin: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    context: Vec<String>,
    source_order: u32,
    declaration_count: usize,
}

#[derive(Debug, Clone, Serialize)]
struct Declared {
    value: String,
    important: bool,
    source: String,
    origin: String,
    specificity: Option<Specificity>,
    source_order: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    layer: Option<String>,
    #[serde(skip)]
    inline: bool,
}

impl Declared {
    /// Cascade precedence: importance, then inline style, then specificity, then order.
    fn precedence(&self) -> (bool, bool, Specificity, u32) {
        (
            self.important,
            self.inline,
            self.specificity.unwrap_or_default(),
            self.source_order,
        )
    }
}

#[derive(Debug, Serialize)]
struct PropertyCascade {
    property: String,
    computed_value: Option<String>,
    winner: Option<Declared>,
    overridden: Vec<Declared>,
    /// Some candidate sits in an `@layer` block. Layer order is not applied, so
    /// `winner` can disagree with `computed_value`.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    layered: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct CascadeReport {
    url: String,
    selector: String,
    element: ElementInfo,
    matched_rules: Vec<MatchedRule>,
    properties: Vec<PropertyCascade>,
    conflicting_properties: usize,
    layered_rules: usize,
    inaccessible_stylesheets: u32,
}

pub(crate) fn resolve_cascade(
    url: &str,
    selector: &str,
    requested: &[String],
    raw: RawCascade,
) -> Result<CascadeReport> {
    if !raw.found {
        return Err(DiagnosticsError::ElementNotFound {
            selector: selector.to_string(),
        });
    }
    let element = raw.element.ok_or_else(|| {
        DiagnosticsError::Script("cascade script returned no element info".to_string())
    })?;

    let mut by_property: BTreeMap<String, Vec<Declared>> = BTreeMap::new();
    let mut matched_rules = Vec::with_capacity(raw.rules.len());

    for rule in &raw.rules {
        let layer = rule
            .context
            .iter()
            .rev()
            .find(|c| c.starts_with("@layer"))
            .cloned();
        let rule_specificity = rule
            .matched_selectors
            .iter()
            .map(|s| specificity(s))
            .max()
            .unwrap_or_default();

        for decl in &rule.declarations {
            by_property.entry(decl.property.clone()).or_default().push(Declared {
                value: decl.value.clone(),
                important: decl.important,
                source: rule.selector_text.clone(),
                origin: rule.origin.clone(),
                specificity: Some(rule_specificity),
                source_order: rule.source_order,
                layer: layer.clone(),
                inline: false,
            });
        }

        matched_rules.push(MatchedRule {
            selector: rule.selector_text.clone(),
            matched_selectors: rule.matched_selectors.clone(),
            specificity: rule_specificity,
            origin: rule.origin.clone(),
            context: rule.context.clone(),
            source_order: rule.source_order,
            declaration_count: rule.declarations.len(),
        });
    }

    for decl in &raw.inline {
        by_property.entry(decl.property.clone()).or_default().push(Declared {
            value: decl.value.clone(),
            important: decl.important,
            source: "inline style".to_string(),
            origin: "style attribute".to_string(),
            specificity: None,
            source_order: u32::MAX,
            layer: None,
            inline: true,
        });
    }

    let wanted: Vec<String> = if requested.is_empty() {
        by_property.keys().cloned().collect()
    } else {
        let mut wanted = requested.to_vec();
        wanted.sort();
        wanted.dedup();
        wanted
    };

    let properties: Vec<PropertyCascade> = wanted
        .into_iter()
        .map(|property| {
            let mut candidates = by_property.remove(&property).unwrap_or_default();
            let layered = candidates.iter().any(|c| c.layer.is_some());
            candidates.sort_by(|a, b| b.precedence().cmp(&a.precedence()));
            let mut candidates = candidates.into_iter();
            let winner = candidates.next();
            PropertyCascade {
                computed_value: raw.computed.get(&property).cloned(),
                property,
                winner,
                overridden: candidates.collect(),
                layered,
            }
        })
        .collect();

    let conflicting_properties = properties.iter().filter(|p| !p.overridden.is_empty()).count();
    let layered_rules = matched_rules
        .iter()
        .filter(|r| r.context.iter().any(|c| c.starts_with("@layer")))
        .count();

    Ok(CascadeReport {
        url: url.to_string(),
        selector: selector.to_string(),
        element,
        matched_rules,
        properties,
        conflicting_properties,
        layered_rules,
        inaccessible_stylesheets: raw.inaccessible_stylesheets,
    })
}

#[async_trait]
impl DiagnosticTool for CssCascadeTool {
    fn name(&self) -> &'static str {
        "inspect_css_cascade"
    }

    fn description(&self) -> &'static str {
        "Inspect the CSS cascade for the first element matching a selector: every matching rule with its specificity and origin, and per property the winning declaration, the overridden ones and the computed value."
    }

    fn input_schema(&self) -> JsonObject {
        let mut properties = target_properties();
        properties.insert(
            "selector".to_string(),
            json!({
                "type": "string",
                "description": "CSS selector of the element to inspect (first match is used)"
            }),
        );
        properties.insert(
            "properties".to_string(),
            json!({
                "type": "array",
                "items": { "type": "string" },
                "description": "Only report these CSS properties (default: every property declared for the element)"
            }),
        );
        schema(json!({
            "type": "object",
            "properties": properties,
            "required": ["url", "selector"]
        }))
    }

    async fn execute(&self, session: &SessionManager, args: &JsonObject) -> Result<Value> {
        let args: CascadeArgs = parse_args(self.name(), args)?;
        let page = args.target.open(session).await?;

        let raw = page
            .evaluate(
                COLLECT_CASCADE_SCRIPT,
                vec![json!(args.selector), json!(args.properties)],
            )
            .await?;
        let raw: RawCascade = serde_json::from_value(raw)?;

        let report = resolve_cascade(&args.target.url, &args.selector, &args.properties, raw)?;
        to_report(&report)
    }
}
