//! The `adaptest validate` command.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;

use adaptest_core::catalog::{load_catalog, validate_catalog};
use adaptest_core::config::load_config_from;

pub fn execute(bank_path: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let catalog = load_catalog(&bank_path, &config)?;

    println!("Bank: {} ({} items)", bank_path.display(), catalog.len());

    let mut by_domain: BTreeMap<&str, usize> = BTreeMap::new();
    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    for item in catalog.items() {
        *by_domain.entry(item.domain.as_str()).or_default() += 1;
        *by_type.entry(item.item_type.to_string()).or_default() += 1;
    }
    for (domain, count) in &by_domain {
        let target = config
            .blueprint
            .target_share(domain)
            .map(|share| format!("target {:.0}%", share * 100.0))
            .unwrap_or_else(|| "not in blueprint".to_string());
        println!("  {domain}: {count} ({target})");
    }
    let types: Vec<String> = by_type.iter().map(|(t, n)| format!("{t}={n}")).collect();
    println!("  types: {}", types.join(", "));

    let warnings = validate_catalog(&catalog, &config.blueprint);
    for w in &warnings {
        let prefix = w
            .item_id
            .as_ref()
            .map(|id| format!("  [{id}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }

    if warnings.is_empty() {
        println!("Bank valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
