use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use dots_focus_common::{Rule, RuleValidator};

/// Reads a rule from a TOML file and validates it.
///
/// ```toml
/// name = "Deep work"
/// days = ["MONDAY", "TUESDAY"]
/// rule_type = "RESTRICTIVE"
///
/// [[time_ranges]]
/// start_hour = 8
/// start_minute = 0
/// end_hour = 12
/// end_minute = 0
/// ```
///
/// A missing `id` gets a fresh one, so store the printed id to edit the rule
/// later.
pub fn load(path: &Path) -> Result<Rule> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read rule file: {:?}", path))?;
    parse(&content).with_context(|| format!("Invalid rule in {:?}", path))
}

pub fn parse(content: &str) -> Result<Rule> {
    let rule: Rule = toml::from_str(content).context("Failed to parse rule TOML")?;
    Ok(RuleValidator::validate(&rule)?)
}
