mod common;

use std::sync::{Arc, atomic::Ordering};

use anyhow::Result;
use browser_diagnostics_mcp::SessionState;
use common::{EchoTool, FailingTool, FakeState};
use rmcp::model::ErrorCode;
use serde_json::json;

#[tokio::test]
async fn unknown_tool_is_method_not_found_without_launch() -> Result<()> {
    let (server, state) = common::server_with(vec![Arc::new(EchoTool)]);

    let err = server
        .call_tool("nonexistent_tool", Some(common::object(json!({}))))
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::METHOD_NOT_FOUND);
    assert_eq!(err.message, "tool not found: nonexistent_tool");
    assert_eq!(FakeState::count(&state.launches), 0);
    assert_eq!(server.session().state(), SessionState::Uninitialized);
    Ok(())
}

#[tokio::test]
async fn tool_names_match_exactly() -> Result<()> {
    let (server, state) = common::server_with(vec![Arc::new(EchoTool)]);

    for name in ["Echo", "echo ", "ech"] {
        let err = server.call_tool(name, None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::METHOD_NOT_FOUND);
    }
    assert_eq!(FakeState::count(&state.launches), 0);
    Ok(())
}

#[tokio::test]
async fn failing_tool_does_not_affect_others() -> Result<()> {
    let (server, state) = common::server_with(vec![Arc::new(FailingTool), Arc::new(EchoTool)]);

    let err = server.call_tool("always_fails", None).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::INTERNAL_ERROR);
    assert!(err.message.contains("boom"));

    let ok = server
        .call_tool("echo", Some(common::object(json!({ "url": "https://a.test" }))))
        .await?;
    assert_eq!(common::report(&ok)["page"], "page-0");

    assert_eq!(FakeState::count(&state.launches), 1);
    assert_eq!(server.session().state(), SessionState::Ready);
    Ok(())
}

#[tokio::test]
async fn launch_failure_is_internal_error_and_retried_next_call() -> Result<()> {
    let (server, state) = common::server_with(vec![Arc::new(EchoTool)]);
    state.fail_launch.store(true, Ordering::SeqCst);

    let err = server.call_tool("echo", None).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::INTERNAL_ERROR);
    assert!(err.message.contains("chromedriver not found"));

    state.fail_launch.store(false, Ordering::SeqCst);
    server.call_tool("echo", None).await?;
    assert_eq!(FakeState::count(&state.launches), 2);
    Ok(())
}

#[tokio::test]
async fn session_is_shared_across_calls() -> Result<()> {
    let (server, state) = common::server_with(vec![Arc::new(EchoTool)]);
    let args = common::object(json!({ "url": "https://a.test" }));

    let first = server.call_tool("echo", Some(args.clone())).await?;
    let second = server.call_tool("echo", Some(args)).await?;

    assert_eq!(common::report(&first), common::report(&second));
    assert_eq!(FakeState::count(&state.launches), 1);
    assert_eq!(FakeState::count(&state.navigations), 1);
    Ok(())
}

#[tokio::test]
async fn catalog_is_stable_and_ordered() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (server, state) = common::default_server(dir.path());

    let first = server.list_tools();
    let names: Vec<String> = first.iter().map(|t| t.name.to_string()).collect();
    assert_eq!(
        names,
        vec![
            "inspect_css_cascade",
            "inspect_scroll",
            "monitor_dom_mutations",
            "visual_diff"
        ]
    );
    for tool in &first {
        let descriptor = serde_json::to_value(tool)?;
        assert!(descriptor["description"].as_str().is_some_and(|d| !d.is_empty()));
        assert_eq!(tool.input_schema.get("type"), Some(&json!("object")));
        let required = tool.input_schema.get("required").cloned().unwrap_or_default();
        assert!(required.as_array().is_some_and(|r| r.contains(&json!("url"))));
    }

    let second = server.list_tools();
    assert_eq!(
        serde_json::to_value(&first)?,
        serde_json::to_value(&second)?
    );
    assert_eq!(FakeState::count(&state.launches), 0);
    Ok(())
}

#[tokio::test]
async fn cleanup_after_calls_closes_browser_once() -> Result<()> {
    let (server, state) = common::server_with(vec![Arc::new(EchoTool)]);
    server
        .call_tool("echo", Some(common::object(json!({ "url": "https://a.test" }))))
        .await?;

    server.cleanup().await?;
    server.cleanup().await?;
    assert_eq!(FakeState::count(&state.browser_closes), 1);

    let err = server.call_tool("echo", None).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::INTERNAL_ERROR);
    assert_eq!(FakeState::count(&state.launches), 1);
    Ok(())
}
