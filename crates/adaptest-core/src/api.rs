//! Request and response shapes for the session operations.
//!
//! These types are transport-agnostic: a web handler, a CLI, or a test
//! harness can serialize them as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{DifficultyBand, ItemType, Mode, StopReason};

/// Caller-supplied configuration for a new session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionRequest {
    /// Adaptive or fixed-length.
    #[serde(default)]
    pub mode: Mode,
    /// Requested length (fixed-length mode only).
    #[serde(default)]
    pub question_count: Option<usize>,
    /// Domains to draw from (fixed-length mode only).
    #[serde(default)]
    pub selected_domains: Vec<String>,
    /// Whether a fixed-length session runs against a clock. Adaptive
    /// sessions always use the configured budget.
    #[serde(default)]
    pub timed: Option<bool>,
    /// Starting ability; defaults to 0.
    #[serde(default)]
    pub start_theta: Option<f64>,
    /// Stable test-taker identifier used for exposure control.
    #[serde(default)]
    pub candidate_id: Option<String>,
}

/// An answer to the session's current item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerSubmission {
    /// Id of the item being answered.
    pub question_id: String,
    /// Index into the choices as presented.
    pub selected_index: i64,
    /// Seconds the candidate spent on the item.
    #[serde(default)]
    pub elapsed_secs: f64,
    /// Raw partial score for graded items, in `0..=max_score`.
    #[serde(default)]
    pub partial_score: Option<f64>,
}

impl AnswerSubmission {
    pub fn new(question_id: impl Into<String>, selected_index: i64) -> Self {
        Self {
            question_id: question_id.into(),
            selected_index,
            elapsed_secs: 0.0,
            partial_score: None,
        }
    }

    pub fn with_elapsed(mut self, secs: f64) -> Self {
        self.elapsed_secs = secs;
        self
    }

    pub fn with_partial_score(mut self, score: f64) -> Self {
        self.partial_score = Some(score);
        self
    }
}

/// An item as shown to the candidate: no answer key, no explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactedQuestion {
    pub id: String,
    pub question_number: usize,
    pub domain: String,
    pub difficulty: f64,
    pub item_type: ItemType,
    pub stem: String,
    /// Choices in presentation order.
    pub choices: Vec<String>,
}

/// Live measurement state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub theta: f64,
    pub se: f64,
    pub scaled: f64,
    pub ci_scaled_low: f64,
    pub ci_scaled_high: f64,
    pub answered: usize,
    pub target: usize,
    pub mode: Mode,
    /// Percentage chance that true ability is above the cut.
    pub pass_probability: f64,
    /// Seconds left on the clock, if the session is timed.
    pub time_remaining_secs: Option<u64>,
}

/// Per-domain line of the final summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainBreakdown {
    pub domain: String,
    pub administered: usize,
    pub scored: usize,
    pub correct: usize,
}

/// Final outcome of a completed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub administered: usize,
    pub scored: usize,
    pub scored_correct: usize,
    pub scaled_score: f64,
    pub pass_cut: f64,
    pub pass_estimate: bool,
    pub pass_probability: f64,
    pub stop_reason: Option<StopReason>,
    pub domains: Vec<DomainBreakdown>,
}

/// Feedback for the item just answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub correct: bool,
    pub scored: bool,
    pub explanation: String,
}

/// Response to a session creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResponse {
    pub session_id: Uuid,
    pub question: RedactedQuestion,
    pub metrics: Metrics,
}

/// Response to an answer submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// The session continues with another item.
    Continue {
        result: AnswerResult,
        next_question: RedactedQuestion,
        metrics: Metrics,
    },
    /// The session reached a terminal state.
    Completed {
        stop_reason: StopReason,
        metrics: Metrics,
        summary: Summary,
    },
}

impl AnswerOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, AnswerOutcome::Completed { .. })
    }

    pub fn metrics(&self) -> &Metrics {
        match self {
            AnswerOutcome::Continue { metrics, .. } | AnswerOutcome::Completed { metrics, .. } => {
                metrics
            }
        }
    }
}

/// Snapshot of a session for read-only callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: Uuid,
    pub completed: bool,
    pub stop_reason: Option<StopReason>,
    pub metrics: Metrics,
    /// The pending item, redacted, while the session is open.
    pub current_question: Option<RedactedQuestion>,
    /// Present once the session is completed.
    pub summary: Option<Summary>,
}

/// One administered item. Immutable once appended to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub question_number: usize,
    pub item_id: String,
    pub domain: String,
    pub item_type: ItemType,
    /// Index the candidate picked, in presentation order.
    pub selected_index: usize,
    /// The same choice as an index into the stored choice list.
    pub choice_index: usize,
    pub correct: bool,
    /// Observed score in [0, 1] fed to the estimator.
    pub observed_score: f64,
    pub scored: bool,
    pub elapsed_secs: f64,
    pub difficulty: f64,
    pub difficulty_band: DifficultyBand,
    /// Ability estimate after this response was processed.
    pub theta_after: f64,
    /// Correct, fast, and well above current ability.
    pub fast_guess: bool,
    pub answered_at: DateTime<Utc>,
}

/// Scaled score after a given question number (0 = before the test).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScorePoint {
    pub question_number: usize,
    pub scaled: f64,
}
