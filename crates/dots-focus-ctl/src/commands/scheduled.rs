use anyhow::{anyhow, Result};
use dots_focus_common::ScheduleEntry;

use super::{parse_reply, proxy};

pub async fn list(system_bus: bool) -> Result<()> {
    let proxy = proxy(system_bus).await?;

    let response = proxy.list_scheduled().await?;
    let value = parse_reply(&response)?;
    let entries: Vec<ScheduleEntry> =
        serde_json::from_value(value).map_err(|e| anyhow!("Unexpected reply: {}", e))?;

    if entries.is_empty() {
        println!("No pending reports");
        return Ok(());
    }

    println!("Pending reports:");
    for entry in entries {
        match entry.scheduled_at() {
            Some(at) => println!("  {:<40} {}", entry.package_id, at.to_rfc3339()),
            None => println!("  {:<40} ?", entry.package_id),
        }
    }

    Ok(())
}
