pub mod app;
pub mod notify;
pub mod rule;
pub mod scheduled;

use anyhow::{anyhow, Result};
use dots_focus_proto::FocusDaemonProxy;
use zbus::Connection;

pub async fn proxy(system_bus: bool) -> Result<FocusDaemonProxy<'static>> {
    let conn = if system_bus { Connection::system().await? } else { Connection::session().await? };
    Ok(FocusDaemonProxy::new(&conn).await?)
}

/// Parses a daemon reply, turning an `{"error": ...}` reply into an error.
pub fn parse_reply(response: &str) -> Result<serde_json::Value> {
    let result: serde_json::Value = serde_json::from_str(response)?;

    if let Some(error) = result.get("error").and_then(|e| e.as_str()) {
        return Err(anyhow!("{}", error));
    }
    Ok(result)
}

/// One-line rendering of a `ReconcileSummary` reply.
pub fn summary_line(summary: &serde_json::Value) -> String {
    let count = |field: &str| summary.get(field).and_then(|v| v.as_u64()).unwrap_or(0);
    format!(
        "{} pending reports re-armed, {} dropped, {} failed",
        count("rearmed"),
        count("dropped"),
        count("failed")
    )
}
