//! `chainsync plan` — dry run of configuration reconciliation.
//!
//! Input file:
//! ```json
//! {
//!   "actual": [{ "id": "usdc", "properties": {}, "min_height": 150, "max_height": null }],
//!   "saved":  [{ "id": "usdc", "properties": {}, "min_height": 100, "max_height": null, "current_height": 300 }]
//! }
//! ```

use std::fs;

use anyhow::Context;
use chainsync_core::multi::{diff_configurations, to_ranges, ConfigurationDiff};
use chainsync_core::{Configuration, SavedConfiguration};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct PlanInput {
    actual: Vec<Configuration<serde_json::Value>>,
    #[serde(default)]
    saved: Vec<SavedConfiguration<serde_json::Value>>,
}

pub fn run(path: &str) -> anyhow::Result<()> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let input: PlanInput =
        serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))?;

    let diff = diff_configurations(&input.actual, &input.saved)?;
    print_plan(&input.actual, &diff);
    Ok(())
}

fn print_plan(actual: &[Configuration<serde_json::Value>], diff: &ConfigurationDiff<serde_json::Value>) {
    println!("Ranges:");
    for range in to_ranges(actual) {
        let ids: Vec<&str> = range.configurations.iter().map(|c| c.id.as_str()).collect();
        let from = if range.from == i64::MIN {
            "-inf".to_string()
        } else {
            range.from.to_string()
        };
        println!("  [{from}, {}]  {}", range.to, ids.join(", "));
    }

    println!("Remove:");
    if diff.to_remove.is_empty() {
        println!("  nothing");
    }
    for removal in &diff.to_remove {
        println!(
            "  {}  [{}, {}]",
            removal.id, removal.from_height, removal.to_height
        );
    }

    println!("Progress:");
    for saved in &diff.to_save {
        let progress = saved
            .current_height
            .map_or_else(|| "not synced".to_string(), |h| h.to_string());
        println!("  {}  {progress}", saved.id);
    }

    println!("Resume from: {}", diff.safe_height);
}
