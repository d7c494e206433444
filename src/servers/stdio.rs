use std::future::Future;

use anyhow::Result;
use browser_diagnostics_mcp::DiagnosticsServer;
use rmcp::{ServiceExt, transport::stdio};
use tokio::signal;

/// Register the shutdown signals now; the returned future names the first one received.
#[cfg(unix)]
fn shutdown_signal() -> std::io::Result<impl Future<Output = &'static str>> {
    use signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        }
    })
}

#[cfg(windows)]
fn shutdown_signal() -> std::io::Result<impl Future<Output = &'static str>> {
    let mut ctrl_c = signal::windows::ctrl_c()?;
    Ok(async move {
        ctrl_c.recv().await;
        "Ctrl+C"
    })
}

pub async fn run_stdio_server(server: DiagnosticsServer) -> Result<()> {
    let shutdown = shutdown_signal()?;
    tracing::info!("Browser diagnostics MCP server listening on stdio (Ctrl+C to stop)");

    let outcome: Result<()> = tokio::select! {
        result = serve(server.clone()) => result,
        received = shutdown => {
            tracing::info!("Received {}, shutting down", received);
            Ok(())
        }
    };

    if let Err(e) = server.cleanup().await {
        tracing::warn!("Cleanup finished with errors: {}", e);
    }

    tracing::info!("Browser diagnostics MCP server stopped");
    outcome
}

async fn serve(server: DiagnosticsServer) -> Result<()> {
    match server.serve(stdio()).await {
        Ok(service) => {
            if let Err(e) = service.waiting().await {
                tracing::error!("Service error: {}", e);
                return Err(e.into());
            }
            tracing::info!("Client closed stdin");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Server serve error: {}", e);
            Err(e.into())
        }
    }
}
