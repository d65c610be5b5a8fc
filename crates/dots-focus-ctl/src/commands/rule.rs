use std::fmt::Display;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone};
use dots_focus_common::{BlockDecisionEngine, NextTransition, Rule, TransitionCalculator};

use super::{parse_reply, proxy, summary_line};
use crate::rule_file;

pub fn validate(path: &Path) -> Result<()> {
    let rule = rule_file::load(path)?;

    println!("✓ Rule '{}' ({}) is valid", rule.name, rule.id);
    println!("  Type:   {}", rule.rule_type);
    println!(
        "  Days:   {}",
        rule.days.iter().map(|d| d.as_str()).collect::<Vec<_>>().join(", ")
    );
    for range in &rule.time_ranges {
        println!("  Range:  {}", range);
    }

    Ok(())
}

/// Evaluates a rule file at `at` (RFC 3339) or at the current local time.
pub fn check(path: &Path, at: Option<&str>) -> Result<()> {
    let rule = rule_file::load(path)?;
    let lines = match at {
        Some(raw) => {
            let at = DateTime::parse_from_rfc3339(raw)
                .with_context(|| format!("Invalid RFC 3339 time: {}", raw))?;
            describe(&rule, &at)
        }
        None => describe(&rule, &Local::now()),
    };

    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

fn describe<Tz: TimeZone>(rule: &Rule, at: &DateTime<Tz>) -> Vec<String>
where
    Tz::Offset: Display,
{
    let verdict = BlockDecisionEngine::evaluate(rule, at);
    let state = if verdict.blocked { "BLOCKED" } else { "ALLOWED" };

    let next = match TransitionCalculator::next_transition(rule, at) {
        NextTransition::At(instant) => {
            format!("Next change at {}", instant.with_timezone(&at.timezone()).to_rfc3339())
        }
        NextTransition::Never => "Never changes".to_string(),
    };

    vec![format!("Rule '{}' at {}: {}", rule.name, at.to_rfc3339(), state), format!("  {}", next)]
}

pub async fn put(system_bus: bool, path: &Path) -> Result<()> {
    let rule = rule_file::load(path)?;
    let proxy = proxy(system_bus).await?;

    let response = proxy.put_rule(&serde_json::to_string(&rule)?).await?;
    let summary = parse_reply(&response).context("Failed to store rule")?;

    println!("Stored rule '{}' ({})", rule.name, rule.id);
    println!("  {}", summary_line(&summary));
    Ok(())
}

pub async fn delete(system_bus: bool, rule_id: &str) -> Result<()> {
    let proxy = proxy(system_bus).await?;

    let response = proxy.delete_rule(rule_id).await?;
    let summary = parse_reply(&response).context("Failed to delete rule")?;

    println!("Deleted rule {}", rule_id);
    println!("  {}", summary_line(&summary));
    Ok(())
}
