//! The `adaptest init` command.

use std::path::Path;

use anyhow::{Context, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::json;

use adaptest_core::model::Blueprint;

/// Items generated per blueprint domain.
const ITEMS_PER_DOMAIN: usize = 30;

pub fn execute() -> Result<()> {
    if Path::new("adaptest.toml").exists() {
        println!("adaptest.toml already exists, skipping.");
    } else {
        std::fs::write("adaptest.toml", SAMPLE_CONFIG)?;
        println!("Created adaptest.toml");
    }

    std::fs::create_dir_all("banks")?;
    let bank_path = Path::new("banks/sample.json");
    if bank_path.exists() {
        println!("banks/sample.json already exists, skipping.");
    } else {
        let bank = sample_bank(&Blueprint::default());
        let json = serde_json::to_string_pretty(&bank).context("failed to serialize sample bank")?;
        std::fs::write(bank_path, json)
            .with_context(|| format!("failed to write {}", bank_path.display()))?;
        println!("Created banks/sample.json");
    }

    println!("\nNext steps:");
    println!("  1. Run: adaptest validate --bank banks/sample.json");
    println!("  2. Run: adaptest simulate --bank banks/sample.json --true-theta 1.2 --replications 20");
    println!("  3. Replace the sample bank with calibrated items");

    Ok(())
}

/// A synthetic, reproducible bank covering every blueprint domain.
pub fn sample_bank(blueprint: &Blueprint) -> serde_json::Value {
    let mut rng = ChaCha8Rng::seed_from_u64(0x5EED);
    let question_types = ["knowledge", "scenario", "judgment"];
    let mut items = Vec::new();

    for (d, domain) in blueprint.names().enumerate() {
        for k in 0..ITEMS_PER_DOMAIN {
            let n = d * ITEMS_PER_DOMAIN + k + 1;
            let difficulty: f64 = rng.gen_range(-2.6..2.6);
            let discrimination: f64 = rng.gen_range(0.6..1.9);
            let round = |x: f64| (x * 100.0).round() / 100.0;

            let mut item = json!({
                "id": format!("S{n:03}"),
                "domain": domain,
                "stem": format!("Sample item {n}: which response best addresses the scenario?"),
                "choices": ["Option A", "Option B", "Option C", "Option D"],
                "correctIndex": rng.gen_range(0..4),
                "explanation": format!("Synthetic rationale for item {n}."),
                "difficulty": round(difficulty),
                "discrimination": round(discrimination),
                "questionType": question_types[k % question_types.len()],
                "impliedKnowledge": k % 9 == 0,
            });

            match k % 10 {
                3 => {
                    item["type"] = json!("ordering");
                    item["maxScore"] = json!(3);
                    item["thresholds"] =
                        json!([round(difficulty - 0.8), round(difficulty), round(difficulty + 0.8)]);
                }
                6 => item["type"] = json!("dragdrop"),
                8 => item["type"] = json!("hotspot"),
                _ => {
                    item["type"] = json!("mcq");
                    item["guessing"] = json!(round(rng.gen_range(0.18..0.26)));
                }
            }
            items.push(item);
        }
    }

    json!({
        "name": "adaptest sample bank",
        "items": items,
    })
}

const SAMPLE_CONFIG: &str = r#"# adaptest configuration

# Fixes the engine RNG for reproducible sessions. Remove for OS entropy.
# seed = 42

min_catalog_items = 8

[adaptive]
min_questions = 100
max_questions = 150
duration_secs = 10800
pretest_count = 25
pretest_window = 100

[fixed]
default_question_count = 75
max_question_count = 200

[exposure]
recent_capacity = 350
adaptive_min_pool = 90
first_item_min_pool = 110
fixed_min_pool = 60
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use adaptest_core::catalog::Catalog;

    #[test]
    fn sample_bank_is_valid_catalog() {
        let blueprint = Blueprint::default();
        let bank = sample_bank(&blueprint);
        let items = bank["items"].as_array().unwrap();
        assert_eq!(items.len(), 8 * ITEMS_PER_DOMAIN);

        let raw = serde_json::from_value(bank["items"].clone()).unwrap();
        let catalog = Catalog::from_items(raw, &blueprint, 8).unwrap();
        assert_eq!(catalog.len(), 240);
        assert!(catalog.degraded().is_empty());
    }

    #[test]
    fn sample_config_parses() {
        let config =
            adaptest_core::config::parse_config_str(SAMPLE_CONFIG, Path::new("adaptest.toml")).unwrap();
        assert!(config.validate().is_ok());
    }
}
