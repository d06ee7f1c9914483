//! Item bank loading and validation.
//!
//! Loads a JSON bank document, rejects structurally broken banks outright,
//! and normalizes out-of-range psychometric parameters to safe defaults.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::config::AdaptestConfig;
use crate::error::CatalogError;
use crate::model::{
    Blueprint, Item, ItemType, QuestionType, DEFAULT_GUESSING, DISCRIMINATION_RANGE,
    MAX_GUESSING, THETA_MAX, THETA_MIN,
};

/// Intermediate structure for parsing bank files.
#[derive(Debug, Deserialize)]
struct BankFile {
    #[serde(default)]
    items: Option<Vec<RawItem>>,
}

/// An item as it appears in a bank document, before normalization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub stem: Option<String>,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default, alias = "correct_index")]
    pub correct_index: Option<i64>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub difficulty: Option<f64>,
    #[serde(default)]
    pub discrimination: Option<f64>,
    #[serde(default)]
    pub guessing: Option<f64>,
    #[serde(default, rename = "type")]
    pub item_type: Option<String>,
    #[serde(default, alias = "max_score")]
    pub max_score: Option<u32>,
    #[serde(default)]
    pub thresholds: Option<Vec<f64>>,
    #[serde(default, alias = "question_type")]
    pub question_type: Option<String>,
    #[serde(default, alias = "judgment_level")]
    pub judgment_level: Option<i64>,
    #[serde(default, alias = "implied_knowledge")]
    pub implied_knowledge: Option<bool>,
}

/// A non-fatal issue found while loading or auditing a bank.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationWarning {
    /// The item ID (if applicable).
    pub item_id: Option<String>,
    /// Warning message.
    pub message: String,
}

impl ValidationWarning {
    fn item(id: &str, message: impl Into<String>) -> Self {
        Self {
            item_id: Some(id.to_string()),
            message: message.into(),
        }
    }
}

/// Immutable, validated item bank shared by every session.
#[derive(Debug, Clone)]
pub struct Catalog {
    items: Vec<Item>,
    by_id: HashMap<String, usize>,
    degraded: Vec<ValidationWarning>,
}

impl Catalog {
    /// Build a catalog from items that are already normalized.
    pub fn new(items: Vec<Item>, min_items: usize) -> Result<Self, CatalogError> {
        if items.len() < min_items {
            return Err(CatalogError::TooFewItems {
                minimum: min_items,
                found: items.len(),
            });
        }
        let mut by_id = HashMap::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            check_shape(item)?;
            if by_id.insert(item.id.clone(), idx).is_some() {
                return Err(CatalogError::DuplicateId(item.id.clone()));
            }
        }
        Ok(Self {
            items,
            by_id,
            degraded: Vec::new(),
        })
    }

    /// Validate and normalize raw bank items.
    pub fn from_items(
        raw: Vec<RawItem>,
        blueprint: &Blueprint,
        min_items: usize,
    ) -> Result<Self, CatalogError> {
        if raw.len() < min_items {
            return Err(CatalogError::TooFewItems {
                minimum: min_items,
                found: raw.len(),
            });
        }

        let mut degraded = Vec::new();
        let items = raw
            .into_iter()
            .map(|r| normalize_item(r, blueprint, &mut degraded))
            .collect::<Result<Vec<_>, _>>()?;

        for w in &degraded {
            tracing::warn!(
                item = w.item_id.as_deref().unwrap_or("-"),
                "{}",
                w.message
            );
        }

        let mut catalog = Self::new(items, min_items)?;
        catalog.degraded = degraded;
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Option<&Item> {
        self.by_id.get(id).map(|&idx| &self.items[idx])
    }

    /// Like [`get`](Self::get), but a missing item is an error.
    pub fn require(&self, id: &str) -> Result<&Item, CatalogError> {
        self.get(id)
            .ok_or_else(|| CatalogError::UnknownItem(id.to_string()))
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of items whose domain is in `domains`.
    pub fn count_in_domains(&self, domains: &HashSet<&str>) -> usize {
        self.items
            .iter()
            .filter(|item| domains.contains(item.domain.as_str()))
            .count()
    }

    /// Warnings produced while normalizing the raw bank.
    pub fn degraded(&self) -> &[ValidationWarning] {
        &self.degraded
    }
}

fn check_shape(item: &Item) -> Result<(), CatalogError> {
    if item.id.trim().is_empty() {
        return Err(CatalogError::MissingField {
            id: item.id.clone(),
            field: "id",
        });
    }
    if item.choices.len() < 2 {
        return Err(CatalogError::TooFewChoices(item.id.clone()));
    }
    if item.correct_index >= item.choices.len() {
        return Err(CatalogError::InvalidCorrectIndex {
            id: item.id.clone(),
            index: item.correct_index as i64,
            choices: item.choices.len(),
        });
    }
    Ok(())
}

fn required(value: Option<String>, id: &str, field: &'static str) -> Result<String, CatalogError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(CatalogError::MissingField {
            id: id.to_string(),
            field,
        }),
    }
}

fn normalize_item(
    raw: RawItem,
    blueprint: &Blueprint,
    warnings: &mut Vec<ValidationWarning>,
) -> Result<Item, CatalogError> {
    let id = required(raw.id, "", "id")?;
    let domain = blueprint.canonical_name(&required(raw.domain, &id, "domain")?);
    let stem = required(raw.stem, &id, "stem")?;

    if raw.choices.len() < 2 {
        return Err(CatalogError::TooFewChoices(id));
    }
    let correct_index = match raw.correct_index {
        Some(idx) if idx >= 0 && (idx as usize) < raw.choices.len() => idx as usize,
        other => {
            return Err(CatalogError::InvalidCorrectIndex {
                id,
                index: other.unwrap_or(-1),
                choices: raw.choices.len(),
            })
        }
    };

    let difficulty = clamp_param(&id, "difficulty", raw.difficulty, 0.0, (THETA_MIN, THETA_MAX), warnings);
    let discrimination = clamp_param(
        &id,
        "discrimination",
        raw.discrimination,
        1.0,
        DISCRIMINATION_RANGE,
        warnings,
    );

    let item_type = match raw.item_type.as_deref() {
        None => ItemType::MultipleChoice,
        Some(s) => s.parse().unwrap_or_else(|e: String| {
            warnings.push(ValidationWarning::item(&id, format!("{e}; treating as mcq")));
            ItemType::MultipleChoice
        }),
    };

    let (guessing, max_score, thresholds) = if item_type == ItemType::MultipleChoice {
        let guessing = clamp_param(
            &id,
            "guessing",
            raw.guessing,
            DEFAULT_GUESSING,
            (0.0, MAX_GUESSING),
            warnings,
        );
        if raw.max_score.is_some_and(|m| m > 1) {
            warnings.push(ValidationWarning::item(
                &id,
                "multiple-choice items are dichotomous; ignoring max_score",
            ));
        }
        (guessing, 1, Vec::new())
    } else {
        match (raw.max_score, raw.thresholds) {
            (Some(max), Some(thresholds)) if max > 1 && thresholds.len() == max as usize => {
                (0.0, max, thresholds)
            }
            (Some(max), _) if max > 1 => {
                warnings.push(ValidationWarning::item(
                    &id,
                    format!(
                        "graded item (max_score={max}) missing valid thresholds; scoring dichotomously"
                    ),
                ));
                (0.0, 1, Vec::new())
            }
            _ => (0.0, 1, Vec::new()),
        }
    };

    let question_type = raw
        .question_type
        .as_deref()
        .and_then(|s| s.parse().ok())
        .unwrap_or(QuestionType::Scenario);
    let judgment_level = match raw.judgment_level {
        Some(level @ 1..=3) => level as u8,
        _ => question_type.default_judgment_level(),
    };

    Ok(Item {
        id,
        domain,
        stem,
        choices: raw.choices,
        correct_index,
        explanation: raw.explanation.unwrap_or_default(),
        difficulty,
        discrimination,
        guessing,
        item_type,
        max_score,
        thresholds,
        question_type,
        judgment_level,
        implied_knowledge: raw.implied_knowledge.unwrap_or(false),
    })
}

fn clamp_param(
    id: &str,
    name: &str,
    value: Option<f64>,
    default: f64,
    (lo, hi): (f64, f64),
    warnings: &mut Vec<ValidationWarning>,
) -> f64 {
    match value {
        None => default,
        Some(v) if !v.is_finite() => {
            warnings.push(ValidationWarning::item(
                id,
                format!("{name} is not a finite number; using {default}"),
            ));
            default
        }
        Some(v) if v < lo || v > hi => {
            let clamped = v.clamp(lo, hi);
            warnings.push(ValidationWarning::item(
                id,
                format!("{name} {v} outside [{lo}, {hi}]; clamped to {clamped}"),
            ));
            clamped
        }
        Some(v) => v,
    }
}

/// Parse a bank document string (useful for testing).
pub fn parse_catalog_str(
    content: &str,
    source_path: &Path,
    config: &AdaptestConfig,
) -> Result<Catalog> {
    let parsed: BankFile = serde_json::from_str(content)
        .with_context(|| format!("failed to parse bank JSON: {}", source_path.display()))?;
    let items = parsed
        .items
        .ok_or_else(|| anyhow::anyhow!("bank has no `items` array: {}", source_path.display()))?;
    Ok(Catalog::from_items(
        items,
        &config.blueprint,
        config.min_catalog_items,
    )?)
}

/// Load a bank document from disk.
pub fn load_catalog(path: &Path, config: &AdaptestConfig) -> Result<Catalog> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read bank file: {}", path.display()))?;
    parse_catalog_str(&content, path, config)
}

/// Audit a loaded catalog against the blueprint.
pub fn validate_catalog(catalog: &Catalog, blueprint: &Blueprint) -> Vec<ValidationWarning> {
    let mut warnings = catalog.degraded().to_vec();

    let mut unknown: Vec<&str> = catalog
        .items()
        .iter()
        .filter(|item| !blueprint.contains(&item.domain))
        .map(|item| item.domain.as_str())
        .collect();
    unknown.sort_unstable();
    unknown.dedup();
    for domain in unknown {
        warnings.push(ValidationWarning {
            item_id: None,
            message: format!("domain {domain:?} is not in the blueprint"),
        });
    }

    for name in blueprint.names() {
        if !catalog.items().iter().any(|item| item.domain == name) {
            warnings.push(ValidationWarning {
                item_id: None,
                message: format!("blueprint domain {name:?} has no items"),
            });
        }
    }

    warnings
}
