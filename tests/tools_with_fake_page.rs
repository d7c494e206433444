mod common;

use anyhow::Result;
use common::FakeState;
use rmcp::model::ErrorCode;
use serde_json::{Value, json};

fn cascade_fixture() -> Value {
    json!({
        "found": true,
        "element": { "tag": "a", "id": null, "classes": ["nav-link"] },
        "rules": [
            {
                "selector_text": "a",
                "matched_selectors": ["a"],
                "origin": "https://shop.test/reset.css",
                "source_order": 0,
                "declarations": [
                    { "property": "color", "value": "blue", "important": false },
                    { "property": "text-decoration", "value": "underline", "important": false }
                ]
            },
            {
                "selector_text": "nav .nav-link",
                "matched_selectors": ["nav .nav-link"],
                "origin": "https://shop.test/site.css",
                "source_order": 4,
                "declarations": [
                    { "property": "color", "value": "#333", "important": false }
                ]
            }
        ],
        "inline": [],
        "computed": { "color": "rgb(51, 51, 51)", "text-decoration": "underline" },
        "inaccessible_stylesheets": 0
    })
}

fn property<'a>(report: &'a Value, name: &str) -> &'a Value {
    report["properties"]
        .as_array()
        .and_then(|props| props.iter().find(|p| p["property"] == name))
        .unwrap()
}

#[tokio::test]
async fn css_cascade_picks_more_specific_rule() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (server, state) = common::default_server(dir.path());
    state.push_script_result(cascade_fixture());

    let result = server
        .call_tool(
            "inspect_css_cascade",
            Some(common::object(json!({
                "url": "https://shop.test/",
                "selector": "nav a.nav-link"
            }))),
        )
        .await?;
    let report = common::report(&result);

    let color = property(&report, "color");
    assert_eq!(color["winner"]["value"], "#333");
    assert_eq!(color["overridden"].as_array().map(Vec::len), Some(1));
    assert_eq!(property(&report, "text-decoration")["winner"]["value"], "underline");
    assert_eq!(report["conflicting_properties"], 1);
    assert_eq!(FakeState::count(&state.executions), 1);
    Ok(())
}

#[tokio::test]
async fn css_cascade_missing_element_is_internal_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (server, state) = common::default_server(dir.path());
    state.push_script_result(json!({ "found": false }));

    let err = server
        .call_tool(
            "inspect_css_cascade",
            Some(common::object(json!({ "url": "https://shop.test/", "selector": "#ghost" }))),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::INTERNAL_ERROR);
    assert!(err.message.contains("#ghost"));
    Ok(())
}

#[tokio::test]
async fn css_cascade_requires_selector() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (server, state) = common::default_server(dir.path());

    let err = server
        .call_tool(
            "inspect_css_cascade",
            Some(common::object(json!({ "url": "https://shop.test/" }))),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::INTERNAL_ERROR);
    assert!(err.message.contains("selector"));
    assert_eq!(FakeState::count(&state.executions), 0);
    Ok(())
}

#[tokio::test]
async fn scroll_reports_horizontal_overflow() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (server, state) = common::default_server(dir.path());
    state.push_script_result(json!({
        "viewport": { "width": 375.0, "height": 667.0, "client_width": 375.0 },
        "document": { "scroll_width": 520.0, "scroll_height": 2000.0, "scroll_x": 0.0, "scroll_y": 0.0 },
        "html_overflow": { "x": "visible", "y": "visible" },
        "body_overflow": { "x": "visible", "y": "visible" },
        "scroll_behavior": "auto",
        "offenders": [
            { "path": "table.prices", "left": 8.0, "right": 520.0, "width": 512.0, "overflow_px": 145.0 }
        ],
        "target": null
    }));

    let result = server
        .call_tool(
            "inspect_scroll",
            Some(common::object(json!({ "url": "https://shop.test/pricing" }))),
        )
        .await?;
    let report = common::report(&result);

    let kinds: Vec<&str> = report["issues"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|i| i["kind"].as_str())
        .collect();
    assert_eq!(kinds, vec!["horizontal_overflow"]);
    assert_eq!(report["overflowing_elements"][0]["path"], "table.prices");
    assert_eq!(report["truncated"], false);
    Ok(())
}

#[tokio::test]
async fn mutations_are_summarized() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (server, state) = common::default_server(dir.path());
    state.push_script_result(json!(true));
    state.push_script_result(json!({
        "records": [
            { "type": "childList", "target": "ul#feed", "timestamp_ms": 10.0, "added_nodes": 2, "removed_nodes": 0 },
            { "type": "childList", "target": "ul#feed", "timestamp_ms": 20.0, "added_nodes": 1, "removed_nodes": 1 },
            { "type": "attributes", "target": "div.spinner", "timestamp_ms": 5.0,
              "attribute_name": "class", "old_value": "spinner" }
        ],
        "dropped": 0
    }));

    let result = server
        .call_tool(
            "monitor_dom_mutations",
            Some(common::object(json!({
                "url": "https://shop.test/feed",
                "selector": "#feed",
                "duration_ms": 5
            }))),
        )
        .await?;
    let report = common::report(&result);

    assert_eq!(report["total_mutations"], 3);
    assert_eq!(report["by_type"]["childList"], 2);
    assert_eq!(report["nodes_added"], 3);
    assert_eq!(report["nodes_removed"], 1);
    assert_eq!(report["busiest_targets"][0]["target"], "ul#feed");
    assert_eq!(report["first_mutation_ms"], 5.0);
    assert_eq!(report["duration_ms"], 5);
    assert_eq!(FakeState::count(&state.executions), 2);
    Ok(())
}

#[tokio::test]
async fn mutations_on_missing_root_fail() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (server, state) = common::default_server(dir.path());
    state.push_script_result(json!(false));

    let err = server
        .call_tool(
            "monitor_dom_mutations",
            Some(common::object(json!({ "url": "https://shop.test/", "selector": "#nope" }))),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::INTERNAL_ERROR);
    assert!(err.message.contains("#nope"));
    assert_eq!(FakeState::count(&state.executions), 1);
    Ok(())
}

#[tokio::test]
async fn visual_diff_between_two_pages() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (server, state) = common::default_server(dir.path());
    state.set_screenshot("https://shop.test/a", common::solid_png(10, 10, [255, 255, 255, 255]));
    state.set_screenshot("https://shop.test/b", common::solid_png(10, 10, [0, 0, 0, 255]));

    let result = server
        .call_tool(
            "visual_diff",
            Some(common::object(json!({
                "url": "https://shop.test/a",
                "compare_url": "https://shop.test/b",
                "width": 800,
                "height": 600
            }))),
        )
        .await?;
    let report = common::report(&result);

    assert_eq!(report["diff_pixels"], 100);
    assert_eq!(report["total_pixels"], 100);
    assert_eq!(report["passed"], false);
    assert!(report.get("diff_image").is_none());
    assert_eq!(FakeState::count(&state.pages_opened), 2);
    assert_eq!(*state.viewports.lock().unwrap(), vec![(800, 600), (800, 600)]);
    Ok(())
}

#[tokio::test]
async fn visual_diff_creates_then_compares_baseline() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (server, state) = common::default_server(dir.path());
    let url = "https://shop.test/home";
    state.set_screenshot(url, common::solid_png(4, 4, [200, 200, 200, 255]));
    let args = common::object(json!({ "url": url, "baseline": "home" }));

    let created = common::report(&server.call_tool("visual_diff", Some(args.clone())).await?);
    assert_eq!(created["baseline_created"], true);
    assert!(dir.path().join("home.png").exists());

    let same = common::report(&server.call_tool("visual_diff", Some(args.clone())).await?);
    assert_eq!(same["baseline_created"], false);
    assert_eq!(same["diff_pixels"], 0);
    assert_eq!(same["passed"], true);
    assert!(!dir.path().join("home-diff.png").exists());

    state.set_screenshot(url, common::solid_png(4, 4, [10, 10, 10, 255]));
    let changed = common::report(&server.call_tool("visual_diff", Some(args)).await?);
    assert_eq!(changed["passed"], false);
    assert_eq!(changed["diff_pixels"], 16);
    assert!(dir.path().join("home-diff.png").exists());
    Ok(())
}

#[tokio::test]
async fn visual_diff_named_page_moves_to_the_new_url() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (server, state) = common::default_server(dir.path());
    state.set_screenshot("https://a.test/", common::solid_png(8, 8, [255, 255, 255, 255]));
    state.set_screenshot("https://b.test/", common::solid_png(8, 8, [0, 0, 0, 255]));

    let on_a = json!({ "url": "https://a.test/", "page_id": "p", "baseline": "home" });
    let created = common::report(&server.call_tool("visual_diff", Some(common::object(on_a))).await?);
    assert_eq!(created["baseline_created"], true);

    let on_b = json!({ "url": "https://b.test/", "page_id": "p", "baseline": "home" });
    let changed = common::report(&server.call_tool("visual_diff", Some(common::object(on_b))).await?);
    assert_eq!(changed["diff_pixels"], 64);
    assert_eq!(changed["passed"], false);
    assert_eq!(FakeState::count(&state.pages_opened), 1);
    assert_eq!(FakeState::count(&state.navigations), 2);
    Ok(())
}

#[tokio::test]
async fn visual_diff_rejects_path_like_baseline_names() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (server, _state) = common::default_server(dir.path());

    let err = server
        .call_tool(
            "visual_diff",
            Some(common::object(json!({ "url": "https://shop.test/", "baseline": "../escape" }))),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::INTERNAL_ERROR);
    assert!(err.message.contains("baseline name"));
    Ok(())
}
