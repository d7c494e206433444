//! `visual_diff`: compare a page screenshot against another page or a stored baseline.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rmcp::model::JsonObject;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use super::{DiagnosticTool, PageTarget, parse_args, schema, target_properties, to_report};
use crate::{
    browser::Page,
    error::{DiagnosticsError, Result},
    pixel_diff::{self, DiffSummary},
    session::SessionManager,
};

const DEFAULT_THRESHOLD_PERCENT: f64 = 0.1;
const DEFAULT_TOLERANCE: u8 = 16;

pub struct VisualDiffTool {
    baseline_dir: PathBuf,
}

impl VisualDiffTool {
    pub fn new(baseline_dir: PathBuf) -> Self {
        Self { baseline_dir }
    }

    fn baseline_path(&self, name: &str) -> PathBuf {
        self.baseline_dir.join(format!("{name}.png"))
    }

    fn diff_path(&self, name: &str) -> PathBuf {
        self.baseline_dir.join(format!("{name}-diff.png"))
    }
}

#[derive(Debug, Deserialize)]
struct VisualDiffArgs {
    #[serde(flatten)]
    target: PageTarget,
    #[serde(default)]
    compare_url: Option<String>,
    #[serde(default)]
    baseline: Option<String>,
    #[serde(default)]
    update_baseline: bool,
    #[serde(default)]
    threshold: Option<f64>,
    #[serde(default)]
    tolerance: Option<u8>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

enum Reference {
    Page(PageTarget),
    Baseline(String),
}

impl VisualDiffArgs {
    fn reference(&self) -> Result<Reference> {
        match (&self.compare_url, &self.baseline) {
            (Some(url), None) => Ok(Reference::Page(PageTarget {
                url: url.clone(),
                page_id: None,
            })),
            (None, Some(name)) => {
                validate_baseline_name(name)?;
                Ok(Reference::Baseline(name.clone()))
            }
            _ => Err(DiagnosticsError::InvalidArguments(
                "visual_diff needs exactly one of compare_url or baseline".to_string(),
            )),
        }
    }

    fn viewport(&self) -> Result<Option<(u32, u32)>> {
        match (self.width, self.height) {
            (None, None) => Ok(None),
            (Some(w), Some(h)) if w > 0 && h > 0 => Ok(Some((w, h))),
            _ => Err(DiagnosticsError::InvalidArguments(
                "width and height must be given together and be non-zero".to_string(),
            )),
        }
    }
}

fn validate_baseline_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(DiagnosticsError::InvalidArguments(format!(
            "baseline name '{name}' may only contain letters, digits, '-', '_' and '.', and must not start with '.'"
        )))
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct VisualDiffReport {
    url: String,
    compared_against: String,
    captured_at: DateTime<Utc>,
    baseline_created: bool,
    baseline_updated: bool,
    #[serde(flatten)]
    summary: Option<DiffSummary>,
    threshold_percent: f64,
    tolerance: u8,
    passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    diff_image: Option<String>,
}

async fn capture(page: &dyn Page, viewport: Option<(u32, u32)>) -> Result<Vec<u8>> {
    if let Some((width, height)) = viewport {
        page.set_viewport(width, height).await?;
    }
    page.screenshot().await
}

async fn write_png(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

#[async_trait]
impl DiagnosticTool for VisualDiffTool {
    fn name(&self) -> &'static str {
        "visual_diff"
    }

    fn description(&self) -> &'static str {
        "Screenshot a page and diff it pixel by pixel against another page (compare_url) or a named baseline image. A missing baseline is created from the current screenshot."
    }

    fn input_schema(&self) -> JsonObject {
        let mut properties = target_properties();
        properties.insert(
            "compare_url".to_string(),
            json!({
                "type": "string",
                "description": "Second page to compare against (mutually exclusive with baseline)"
            }),
        );
        properties.insert(
            "baseline".to_string(),
            json!({
                "type": "string",
                "description": "Name of the stored baseline image to compare against (mutually exclusive with compare_url)"
            }),
        );
        properties.insert(
            "update_baseline".to_string(),
            json!({
                "type": "boolean",
                "description": "Replace the stored baseline with the new screenshot after comparing (default: false)"
            }),
        );
        properties.insert(
            "threshold".to_string(),
            json!({
                "type": "number",
                "minimum": 0,
                "maximum": 100,
                "description": "Maximum percentage of differing pixels that still passes (default: 0.1)"
            }),
        );
        properties.insert(
            "tolerance".to_string(),
            json!({
                "type": "integer",
                "minimum": 0,
                "maximum": 255,
                "description": "Per-channel difference ignored when comparing pixels (default: 16)"
            }),
        );
        properties.insert(
            "width".to_string(),
            json!({ "type": "integer", "minimum": 1, "description": "Window width before capturing" }),
        );
        properties.insert(
            "height".to_string(),
            json!({ "type": "integer", "minimum": 1, "description": "Window height before capturing" }),
        );
        schema(json!({
            "type": "object",
            "properties": properties,
            "required": ["url"]
        }))
    }

    async fn execute(&self, session: &SessionManager, args: &JsonObject) -> Result<Value> {
        let args: VisualDiffArgs = parse_args(self.name(), args)?;
        let reference = args.reference()?;
        let viewport = args.viewport()?;
        let threshold = args.threshold.unwrap_or(DEFAULT_THRESHOLD_PERCENT);
        if !(0.0..=100.0).contains(&threshold) {
            return Err(DiagnosticsError::InvalidArguments(format!(
                "threshold must be between 0 and 100, got {threshold}"
            )));
        }
        let tolerance = args.tolerance.unwrap_or(DEFAULT_TOLERANCE);

        let page = args.target.open(session).await?;
        let actual_png = capture(page.as_ref(), viewport).await?;
        let captured_at = Utc::now();

        let mut report = VisualDiffReport {
            url: args.target.url.clone(),
            compared_against: String::new(),
            captured_at,
            baseline_created: false,
            baseline_updated: false,
            summary: None,
            threshold_percent: threshold,
            tolerance,
            passed: true,
            diff_image: None,
        };

        let (expected_png, baseline) = match reference {
            Reference::Page(other) => {
                report.compared_against = format!("url:{}", other.url);
                let other_page = other.open(session).await?;
                (capture(other_page.as_ref(), viewport).await?, None)
            }
            Reference::Baseline(name) => {
                let path = self.baseline_path(&name);
                report.compared_against = format!("baseline:{}", path.display());

                match tokio::fs::read(&path).await {
                    Ok(bytes) => (bytes, Some(name)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        write_png(&path, &actual_png).await?;
                        info!("Created visual baseline {}", path.display());
                        report.baseline_created = true;
                        return to_report(&report);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        let actual = pixel_diff::decode_png(&actual_png)?;
        let expected = pixel_diff::decode_png(&expected_png)?;
        let outcome = pixel_diff::compare(&actual, &expected, tolerance);
        report.passed = outcome.summary.diff_percent <= threshold;

        if let Some(name) = baseline {
            if let Some(highlight) = &outcome.highlight {
                let diff_path = self.diff_path(&name);
                write_png(&diff_path, &pixel_diff::encode_png(highlight)?).await?;
                report.diff_image = Some(diff_path.display().to_string());
            }
            if args.update_baseline {
                write_png(&self.baseline_path(&name), &actual_png).await?;
                report.baseline_updated = true;
            }
        }

        report.summary = Some(outcome.summary);
        to_report(&report)
    }
}
