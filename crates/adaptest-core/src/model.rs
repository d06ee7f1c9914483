//! Core data model types for adaptest.
//!
//! Items, the domain blueprint, and the small enums every other module
//! shares (test mode, stop reason, difficulty band).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lower bound of the ability and difficulty scale.
pub const THETA_MIN: f64 = -3.0;
/// Upper bound of the ability and difficulty scale.
pub const THETA_MAX: f64 = 3.0;

/// Default guessing floor for multiple-choice items.
pub const DEFAULT_GUESSING: f64 = 0.25;
/// Largest guessing floor a multiple-choice item may carry.
pub const MAX_GUESSING: f64 = 0.33;
/// Allowed discrimination range.
pub const DISCRIMINATION_RANGE: (f64, f64) = (0.3, 2.5);

/// A single test item, normalized and ready for administration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Unique, stable identifier.
    pub id: String,
    /// Canonical domain name (see [`Blueprint::canonical_name`]).
    pub domain: String,
    /// Question text.
    pub stem: String,
    /// Choices in stored (unshuffled) order.
    pub choices: Vec<String>,
    /// Index of the correct choice in `choices`.
    pub correct_index: usize,
    /// Rationale revealed after the item is answered.
    #[serde(default)]
    pub explanation: String,
    /// Location parameter `b`, in [-3, 3].
    pub difficulty: f64,
    /// Slope parameter `a`, in [0.3, 2.5].
    pub discrimination: f64,
    /// Lower asymptote `c`. Always 0 for non-multiple-choice items.
    pub guessing: f64,
    /// Presentation format.
    pub item_type: ItemType,
    /// Highest attainable score; 1 for dichotomous items.
    pub max_score: u32,
    /// Step parameters for graded items (`len == max_score` when graded).
    #[serde(default)]
    pub thresholds: Vec<f64>,
    /// What kind of reasoning the item targets.
    pub question_type: QuestionType,
    /// Ambiguity level, 1 (one clear answer) to 3 (best-answer judgment).
    pub judgment_level: u8,
    /// Tests consensus or cross-domain insight rather than recall.
    #[serde(default)]
    pub implied_knowledge: bool,
}

impl Item {
    /// Effective guessing parameter used by the response model.
    pub fn guessing_param(&self) -> f64 {
        match self.item_type {
            ItemType::MultipleChoice => self.guessing,
            _ => 0.0,
        }
    }

    /// Coarse difficulty band.
    pub fn band(&self) -> DifficultyBand {
        DifficultyBand::from_difficulty(self.difficulty)
    }

    /// Whether the item awards partial credit.
    pub fn is_graded(&self) -> bool {
        self.max_score > 1
    }
}

/// Item presentation formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    #[serde(rename = "mcq")]
    MultipleChoice,
    #[serde(rename = "dragdrop")]
    DragMatch,
    #[serde(rename = "ordering")]
    Ordering,
    #[serde(rename = "hotspot")]
    Hotspot,
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemType::MultipleChoice => write!(f, "mcq"),
            ItemType::DragMatch => write!(f, "dragdrop"),
            ItemType::Ordering => write!(f, "ordering"),
            ItemType::Hotspot => write!(f, "hotspot"),
        }
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mcq" | "multiple-choice" => Ok(ItemType::MultipleChoice),
            "dragdrop" | "drag-match" => Ok(ItemType::DragMatch),
            "ordering" => Ok(ItemType::Ordering),
            "hotspot" => Ok(ItemType::Hotspot),
            other => Err(format!("unknown item type: {other}")),
        }
    }
}

/// Reasoning style an item targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Knowledge,
    Scenario,
    Judgment,
}

impl QuestionType {
    /// Judgment level assumed when an item does not state one.
    pub fn default_judgment_level(self) -> u8 {
        match self {
            QuestionType::Knowledge => 1,
            QuestionType::Scenario => 2,
            QuestionType::Judgment => 3,
        }
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "knowledge" => Ok(QuestionType::Knowledge),
            "scenario" => Ok(QuestionType::Scenario),
            "judgment" => Ok(QuestionType::Judgment),
            other => Err(format!("unknown question type: {other}")),
        }
    }
}

/// Coarse difficulty bucket used for variety in fixed-length mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyBand {
    Easy,
    Medium,
    Hard,
}

impl DifficultyBand {
    pub fn from_difficulty(difficulty: f64) -> Self {
        if difficulty <= -0.6 {
            DifficultyBand::Easy
        } else if difficulty >= 0.7 {
            DifficultyBand::Hard
        } else {
            DifficultyBand::Medium
        }
    }
}

impl fmt::Display for DifficultyBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DifficultyBand::Easy => write!(f, "easy"),
            DifficultyBand::Medium => write!(f, "medium"),
            DifficultyBand::Hard => write!(f, "hard"),
        }
    }
}

/// How a session chooses items and decides to stop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    #[default]
    Adaptive,
    FixedLength,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Adaptive => write!(f, "adaptive"),
            Mode::FixedLength => write!(f, "fixed-length"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "adaptive" | "cat" => Ok(Mode::Adaptive),
            "fixed-length" | "fixed" => Ok(Mode::FixedLength),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    FixedLengthReached,
    MaxReached,
    ClearPass,
    ClearFail,
    BankExhausted,
    TimeExpired,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StopReason::FixedLengthReached => "fixed length reached",
            StopReason::MaxReached => "max reached",
            StopReason::ClearPass => "clear pass",
            StopReason::ClearFail => "clear fail",
            StopReason::BankExhausted => "bank exhausted",
            StopReason::TimeExpired => "time expired",
        };
        f.write_str(label)
    }
}

/// Target share of one content domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainTarget {
    pub name: String,
    /// Percentage of a full-length adaptive test.
    pub pct: f64,
}

/// Static table of content domains and their target proportions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Blueprint {
    pub domains: Vec<DomainTarget>,
}

impl Blueprint {
    pub fn new(domains: Vec<DomainTarget>) -> Self {
        Self { domains }
    }

    /// Target share in [0, 1] for a canonical domain name.
    pub fn target_share(&self, domain: &str) -> Option<f64> {
        self.domains
            .iter()
            .find(|d| d.name == domain)
            .map(|d| d.pct / 100.0)
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.domains.iter().any(|d| d.name == domain)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.domains.iter().map(|d| d.name.as_str())
    }

    /// Map a raw domain label onto its blueprint name.
    ///
    /// Matches case-insensitively on the full name, then on a leading
    /// numeric prefix (`"3"` or `"3 Security..."` → `"3. ..."`). Labels that
    /// match neither are returned trimmed but otherwise unchanged.
    pub fn canonical_name(&self, raw: &str) -> String {
        let raw = raw.trim();
        if let Some(exact) = self
            .domains
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(raw))
        {
            return exact.name.clone();
        }

        let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();
        let boundary = raw[digits.len()..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if !digits.is_empty() && boundary {
            let prefix = format!("{digits}.");
            if let Some(hit) = self.domains.iter().find(|d| d.name.starts_with(&prefix)) {
                return hit.name.clone();
            }
        }

        raw.to_string()
    }

    /// Check that the table is usable: non-empty, unique names, percentages
    /// summing to 100.
    pub fn validate(&self) -> Result<(), String> {
        if self.domains.is_empty() {
            return Err("blueprint must list at least one domain".into());
        }
        let mut seen = std::collections::HashSet::new();
        for d in &self.domains {
            if !seen.insert(d.name.as_str()) {
                return Err(format!("duplicate blueprint domain: {}", d.name));
            }
            if !(d.pct.is_finite() && d.pct >= 0.0) {
                return Err(format!("domain {} has invalid percentage {}", d.name, d.pct));
            }
        }
        let total: f64 = self.domains.iter().map(|d| d.pct).sum();
        if (total - 100.0).abs() > 1e-6 {
            return Err(format!("blueprint percentages sum to {total}, expected 100"));
        }
        Ok(())
    }
}

impl Default for Blueprint {
    fn default() -> Self {
        let table = [
            ("1. Security and Risk Management", 16.0),
            ("2. Asset Security", 10.0),
            ("3. Security Architecture and Engineering", 13.0),
            ("4. Communication and Network Security", 13.0),
            ("5. Identity and Access Management (IAM)", 13.0),
            ("6. Security Assessment and Testing", 12.0),
            ("7. Security Operations", 13.0),
            ("8. Software Development Security", 10.0),
        ];
        Self {
            domains: table
                .into_iter()
                .map(|(name, pct)| DomainTarget {
                    name: name.to_string(),
                    pct,
                })
                .collect(),
        }
    }
}
