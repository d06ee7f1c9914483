//! Engine configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::Blueprint;

/// Longest session time budget a config may set (one week).
pub const MAX_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Top-level adaptest configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptestConfig {
    /// Seed for the engine RNG. Absent means OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Banks smaller than this are rejected.
    #[serde(default = "default_min_catalog_items")]
    pub min_catalog_items: usize,
    #[serde(default)]
    pub adaptive: AdaptiveSettings,
    #[serde(default)]
    pub fixed: FixedSettings,
    #[serde(default)]
    pub exposure: ExposureSettings,
    /// Content domains and their target shares.
    #[serde(default)]
    pub blueprint: Blueprint,
}

/// Bounds and timing for adaptive sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveSettings {
    #[serde(default = "default_min_questions")]
    pub min_questions: usize,
    #[serde(default = "default_max_questions")]
    pub max_questions: usize,
    /// Wall-clock budget in seconds.
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,
    /// Unscored positions per session.
    #[serde(default = "default_pretest_count")]
    pub pretest_count: usize,
    /// Positions `1..=pretest_window` are eligible to be unscored.
    #[serde(default = "default_pretest_window")]
    pub pretest_window: usize,
}

/// Length limits for fixed-length sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedSettings {
    #[serde(default = "default_fixed_count")]
    pub default_question_count: usize,
    #[serde(default = "default_fixed_max")]
    pub max_question_count: usize,
}

/// Recent-item exposure control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposureSettings {
    /// Items remembered per test-taker.
    #[serde(default = "default_recent_capacity")]
    pub recent_capacity: usize,
    /// Fresh items needed before the recent filter applies (adaptive).
    #[serde(default = "default_adaptive_min_pool")]
    pub adaptive_min_pool: usize,
    /// Fresh items needed before the recent filter applies to the opening
    /// item of an adaptive session.
    #[serde(default = "default_first_item_min_pool")]
    pub first_item_min_pool: usize,
    /// Fresh items needed before the recent filter applies (fixed-length).
    #[serde(default = "default_fixed_min_pool")]
    pub fixed_min_pool: usize,
}

fn default_min_catalog_items() -> usize {
    8
}
fn default_min_questions() -> usize {
    100
}
fn default_max_questions() -> usize {
    150
}
fn default_duration_secs() -> u64 {
    3 * 60 * 60
}
fn default_pretest_count() -> usize {
    25
}
fn default_pretest_window() -> usize {
    100
}
fn default_fixed_count() -> usize {
    75
}
fn default_fixed_max() -> usize {
    200
}
fn default_recent_capacity() -> usize {
    350
}
fn default_adaptive_min_pool() -> usize {
    90
}
fn default_first_item_min_pool() -> usize {
    110
}
fn default_fixed_min_pool() -> usize {
    60
}

impl Default for AdaptiveSettings {
    fn default() -> Self {
        Self {
            min_questions: default_min_questions(),
            max_questions: default_max_questions(),
            duration_secs: default_duration_secs(),
            pretest_count: default_pretest_count(),
            pretest_window: default_pretest_window(),
        }
    }
}

impl Default for FixedSettings {
    fn default() -> Self {
        Self {
            default_question_count: default_fixed_count(),
            max_question_count: default_fixed_max(),
        }
    }
}

impl Default for ExposureSettings {
    fn default() -> Self {
        Self {
            recent_capacity: default_recent_capacity(),
            adaptive_min_pool: default_adaptive_min_pool(),
            first_item_min_pool: default_first_item_min_pool(),
            fixed_min_pool: default_fixed_min_pool(),
        }
    }
}

impl Default for AdaptestConfig {
    fn default() -> Self {
        Self {
            seed: None,
            min_catalog_items: default_min_catalog_items(),
            adaptive: AdaptiveSettings::default(),
            fixed: FixedSettings::default(),
            exposure: ExposureSettings::default(),
            blueprint: Blueprint::default(),
        }
    }
}

impl AdaptestConfig {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let a = &self.adaptive;
        if a.min_questions == 0 {
            anyhow::bail!("adaptive.min_questions must be at least 1");
        }
        if a.min_questions > a.max_questions {
            anyhow::bail!(
                "adaptive.min_questions ({}) exceeds adaptive.max_questions ({})",
                a.min_questions,
                a.max_questions
            );
        }
        if a.pretest_count >= a.min_questions {
            anyhow::bail!(
                "adaptive.pretest_count ({}) must be below adaptive.min_questions ({})",
                a.pretest_count,
                a.min_questions
            );
        }
        if a.pretest_count > a.pretest_window.min(a.max_questions) {
            anyhow::bail!(
                "adaptive.pretest_count ({}) does not fit in the first {} positions",
                a.pretest_count,
                a.pretest_window.min(a.max_questions)
            );
        }
        if a.duration_secs == 0 || a.duration_secs > MAX_DURATION_SECS {
            anyhow::bail!(
                "adaptive.duration_secs must be in 1..={MAX_DURATION_SECS}, got {}",
                a.duration_secs
            );
        }

        let f = &self.fixed;
        if f.default_question_count == 0 || f.default_question_count > f.max_question_count {
            anyhow::bail!(
                "fixed.default_question_count must be in 1..={}, got {}",
                f.max_question_count,
                f.default_question_count
            );
        }

        if self.min_catalog_items < 2 {
            anyhow::bail!("min_catalog_items must be at least 2");
        }

        self.blueprint
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid blueprint: {e}"))?;
        Ok(())
    }
}

/// Load configuration from `./adaptest.toml` if present, else defaults.
///
/// `ADAPTEST_SEED` overrides the configured seed.
pub fn load_config() -> Result<AdaptestConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default location.
pub fn load_config_from(path: Option<&Path>) -> Result<AdaptestConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("adaptest.toml");
            local.exists().then_some(local)
        }
    };

    let mut config = match config_path {
        Some(path) => parse_config_str(
            &std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?,
            &path,
        )?,
        None => AdaptestConfig::default(),
    };

    if let Ok(seed) = std::env::var("ADAPTEST_SEED") {
        config.seed = Some(
            seed.trim()
                .parse()
                .with_context(|| format!("ADAPTEST_SEED is not an integer: {seed:?}"))?,
        );
    }

    config.validate()?;
    Ok(config)
}

/// Parse a TOML config document.
pub fn parse_config_str(content: &str, source: &Path) -> Result<AdaptestConfig> {
    toml::from_str::<AdaptestConfig>(content)
        .with_context(|| format!("failed to parse config: {}", source.display()))
}
