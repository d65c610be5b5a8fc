use anyhow::{Context, Result};
use dots_focus_common::{EnforcementDecision, NextTransition};

use super::{parse_reply, proxy};

pub async fn submit(system_bus: bool, package_id: &str, title: &str, content: &str) -> Result<()> {
    let proxy = proxy(system_bus).await?;

    let response = proxy.submit_notification(package_id, title, content).await?;
    let value = parse_reply(&response).context("Failed to submit notification")?;
    let decision: EnforcementDecision =
        serde_json::from_value(value).with_context(|| format!("Unexpected reply: {}", response))?;

    match decision {
        EnforcementDecision::Suppress { next: NextTransition::At(at) } => {
            println!("✗ Notification suppressed");
            println!("  Report scheduled for {}", at.to_rfc3339());
        }
        EnforcementDecision::Suppress { next: NextTransition::Never } => {
            println!("✗ Notification suppressed");
            println!("  Rule never unblocks, no report scheduled");
        }
        EnforcementDecision::Allow => println!("✓ Notification allowed"),
        EnforcementDecision::Unmanaged => {
            println!("✓ '{}' is not managed, notification allowed", package_id)
        }
    }

    Ok(())
}
