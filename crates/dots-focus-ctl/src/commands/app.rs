use anyhow::{Context, Result};

use super::{parse_reply, proxy, summary_line};

pub async fn manage(system_bus: bool, package_id: &str, rule_id: &str) -> Result<()> {
    let proxy = proxy(system_bus).await?;

    let response = proxy.manage_app(package_id, rule_id).await?;
    let summary =
        parse_reply(&response).with_context(|| format!("Failed to manage {}", package_id))?;

    println!("'{}' is now governed by rule {}", package_id, rule_id);
    println!("  {}", summary_line(&summary));
    Ok(())
}

pub async fn unmanage(system_bus: bool, package_id: &str) -> Result<()> {
    let proxy = proxy(system_bus).await?;

    let response = proxy.unmanage_app(package_id).await?;
    let result =
        parse_reply(&response).with_context(|| format!("Failed to unmanage {}", package_id))?;

    println!("'{}' is no longer managed", package_id);
    if result.get("canceled_report").and_then(|c| c.as_bool()).unwrap_or(false) {
        println!("  Pending report canceled");
    }
    Ok(())
}

pub async fn blocked(system_bus: bool, package_id: &str) -> Result<()> {
    let proxy = proxy(system_bus).await?;

    if proxy.check_blocked(package_id).await? {
        println!("✗ Notifications from '{}' are HELD", package_id);
    } else {
        println!("✓ Notifications from '{}' are DELIVERED", package_id);
    }

    Ok(())
}
