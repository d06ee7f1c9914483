//! Session state machine.
//!
//! A [`Session`] is created with its first item already selected and is
//! mutated once per accepted answer: append the response, update ability if
//! the position is scored, evaluate stopping, then select the next item or
//! finalize. Every error path returns before the first mutation.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Duration, Utc};
use rand::seq::{index, SliceRandom};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{
    AnswerOutcome, AnswerResult, AnswerSubmission, DomainBreakdown, Metrics, RedactedQuestion,
    ResponseRecord, ScorePoint, SessionRequest, SessionState, Summary,
};
use crate::catalog::Catalog;
use crate::config::AdaptestConfig;
use crate::error::EngineError;
use crate::estimator::{self, AbilityEstimate};
use crate::model::{Blueprint, Item, Mode, StopReason, THETA_MAX, THETA_MIN};
use crate::scale::{theta_to_scaled, PASS_CUT_SCALED};
use crate::selector::{select_next_item, SelectionContext};
use crate::statistics::{pass_probability, summarize_domains};
use crate::stopping::{self, StoppingPolicy};

/// Responses faster than this may be flagged as guesses.
pub const FAST_GUESS_SECS: f64 = 8.0;
/// How far above current ability an item must sit for a fast correct
/// answer to be flagged.
pub const FAST_GUESS_MARGIN: f64 = 0.9;
/// Fixed-length tests of this many items get the full time budget.
pub const FULL_LENGTH_ITEMS: usize = 100;

/// Resolved, validated configuration of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub mode: Mode,
    pub stopping: StoppingPolicy,
    /// Included domains (fixed-length mode only).
    pub selected_domains: Vec<String>,
    /// Wall-clock budget, if timed.
    pub time_limit_secs: Option<u64>,
    pub start_theta: f64,
    pub candidate_id: Option<String>,
    /// Number of unscored positions.
    pub pretest_count: usize,
    /// Unscored positions are drawn from `1..=pretest_window`.
    pub pretest_window: usize,
    /// Fresh items required before exposure history is honored.
    pub min_fresh_pool: usize,
    /// The same floor for the opening item of an adaptive session.
    #[serde(default)]
    pub first_item_min_pool: usize,
}

impl SessionConfig {
    /// Validate a request against the engine configuration and catalog.
    pub fn resolve(
        request: &SessionRequest,
        config: &AdaptestConfig,
        catalog: &Catalog,
    ) -> Result<Self, EngineError> {
        let start_theta = match request.start_theta {
            Some(t) if !t.is_finite() => {
                return Err(EngineError::Config(format!(
                    "start_theta must be a finite number, got {t}"
                )))
            }
            Some(t) => t.clamp(THETA_MIN, THETA_MAX),
            None => 0.0,
        };

        match request.mode {
            Mode::Adaptive => {
                let a = &config.adaptive;
                Ok(Self {
                    mode: Mode::Adaptive,
                    stopping: StoppingPolicy::Adaptive {
                        min: a.min_questions,
                        max: a.max_questions,
                    },
                    selected_domains: Vec::new(),
                    time_limit_secs: Some(a.duration_secs),
                    start_theta,
                    candidate_id: request.candidate_id.clone(),
                    pretest_count: a.pretest_count,
                    pretest_window: a.pretest_window.min(a.max_questions),
                    min_fresh_pool: config.exposure.adaptive_min_pool,
                    first_item_min_pool: config.exposure.first_item_min_pool,
                })
            }
            Mode::FixedLength => {
                let f = &config.fixed;
                let count = request.question_count.unwrap_or(f.default_question_count);
                if count == 0 || count > f.max_question_count {
                    return Err(EngineError::Config(format!(
                        "question_count must be in 1..={}, got {count}",
                        f.max_question_count
                    )));
                }

                let mut domains: Vec<String> = Vec::new();
                for raw in &request.selected_domains {
                    let name = config.blueprint.canonical_name(raw);
                    if !domains.contains(&name) {
                        domains.push(name);
                    }
                }
                if domains.is_empty() {
                    return Err(EngineError::Config(
                        "fixed-length mode requires at least one selected domain".into(),
                    ));
                }

                let included: HashSet<&str> = domains.iter().map(String::as_str).collect();
                let available = catalog.count_in_domains(&included);
                if available < count {
                    return Err(EngineError::Config(format!(
                        "selected domains contain {available} items, {count} requested"
                    )));
                }

                let time_limit_secs = request.timed.unwrap_or(false).then(|| {
                    let share = (count as f64 / FULL_LENGTH_ITEMS as f64).min(1.0);
                    (config.adaptive.duration_secs as f64 * share).round() as u64
                });

                Ok(Self {
                    mode: Mode::FixedLength,
                    stopping: StoppingPolicy::Fixed { target: count },
                    selected_domains: domains,
                    time_limit_secs,
                    start_theta,
                    candidate_id: request.candidate_id.clone(),
                    pretest_count: 0,
                    pretest_window: 0,
                    min_fresh_pool: config.exposure.fixed_min_pool,
                    first_item_min_pool: config.exposure.fixed_min_pool,
                })
            }
        }
    }
}

/// The item awaiting a response, with its per-session choice order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentedItem {
    pub item_id: String,
    /// `choice_order[k]` is the stored index of the choice shown at `k`.
    pub choice_order: Vec<usize>,
    pub presented_at: DateTime<Utc>,
}

/// One test attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    config: SessionConfig,
    estimate: AbilityEstimate,
    items_answered: Vec<ResponseRecord>,
    score_history: Vec<ScorePoint>,
    unscored_positions: BTreeSet<usize>,
    current: Option<PresentedItem>,
    completed: bool,
    stop_reason: Option<StopReason>,
    completed_at: Option<DateTime<Utc>>,
    rng: ChaCha8Rng,
}

impl Session {
    /// Create a session and select its first item.
    pub fn start(
        id: Uuid,
        config: SessionConfig,
        catalog: &Catalog,
        blueprint: &Blueprint,
        recently_seen: &HashSet<String>,
        now: DateTime<Utc>,
        mut rng: ChaCha8Rng,
    ) -> Result<Self, EngineError> {
        let estimate = AbilityEstimate::prior(config.start_theta);

        let window = config.pretest_window;
        let unscored_positions: BTreeSet<usize> = if config.pretest_count > 0 && window > 0 {
            index::sample(&mut rng, window, config.pretest_count.min(window))
                .into_iter()
                .map(|i| i + 1)
                .collect()
        } else {
            BTreeSet::new()
        };

        let mut session = Self {
            id,
            created_at: now,
            updated_at: now,
            config,
            estimate,
            items_answered: Vec::new(),
            score_history: vec![ScorePoint {
                question_number: 0,
                scaled: theta_to_scaled(estimate.theta),
            }],
            unscored_positions,
            current: None,
            completed: false,
            stop_reason: None,
            completed_at: None,
            rng,
        };

        let first = session
            .select(catalog, blueprint, recently_seen)
            .ok_or_else(|| EngineError::Config("no items available for this session".into()))?;
        session.present(first, now);

        tracing::info!(
            session = %id,
            mode = %session.config.mode,
            target = session.config.stopping.target(),
            unscored = session.unscored_positions.len(),
            "session created"
        );
        Ok(session)
    }

    /// Apply an answer to the current item.
    pub fn answer(
        &mut self,
        submission: &AnswerSubmission,
        catalog: &Catalog,
        blueprint: &Blueprint,
        recently_seen: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> Result<AnswerOutcome, EngineError> {
        if self.completed {
            return Err(EngineError::AlreadyCompleted(self.id));
        }
        if self.expire_if_due(now) {
            tracing::info!(session = %self.id, "answer arrived after time expired; discarded");
            return Ok(self.completed_outcome(now));
        }

        let current = match &self.current {
            Some(c) if c.item_id == submission.question_id => c,
            other => {
                return Err(EngineError::QuestionMismatch {
                    expected: other.as_ref().map(|c| c.item_id.clone()),
                    received: submission.question_id.clone(),
                })
            }
        };
        let item = catalog.require(&current.item_id)?;

        let selected_index = usize::try_from(submission.selected_index)
            .ok()
            .filter(|&i| i < current.choice_order.len())
            .ok_or_else(|| {
                EngineError::Input(format!(
                    "selected_index {} out of range for {} choices",
                    submission.selected_index,
                    current.choice_order.len()
                ))
            })?;
        if !submission.elapsed_secs.is_finite() || submission.elapsed_secs < 0.0 {
            return Err(EngineError::Input(format!(
                "elapsed_secs must be a non-negative number, got {}",
                submission.elapsed_secs
            )));
        }
        if let Some(partial) = submission.partial_score {
            if !partial.is_finite() || partial < 0.0 || partial > f64::from(item.max_score) {
                return Err(EngineError::Input(format!(
                    "partial_score {partial} outside 0..={}",
                    item.max_score
                )));
            }
        }

        let question_number = self.items_answered.len() + 1;
        let scored = !self.unscored_positions.contains(&question_number);
        let previously_scored: Vec<&Item> = if scored {
            self.items_answered
                .iter()
                .filter(|r| r.scored)
                .map(|r| catalog.require(&r.item_id))
                .collect::<Result<_, _>>()?
        } else {
            Vec::new()
        };

        // Validated; mutation starts here.
        let choice_index = current.choice_order[selected_index];
        let correct = choice_index == item.correct_index;
        let observed = estimator::observed_score(item, correct, submission.partial_score);
        let elapsed_secs = if submission.elapsed_secs > 0.0 {
            submission.elapsed_secs
        } else {
            (now - current.presented_at).num_milliseconds().max(0) as f64 / 1000.0
        };

        let theta_before = self.estimate.theta;
        if scored {
            self.estimate = estimator::update(self.estimate, item, observed, &previously_scored);
        }
        let fast_guess = correct
            && elapsed_secs < FAST_GUESS_SECS
            && item.difficulty > theta_before + FAST_GUESS_MARGIN;

        self.items_answered.push(ResponseRecord {
            question_number,
            item_id: item.id.clone(),
            domain: item.domain.clone(),
            item_type: item.item_type,
            selected_index,
            choice_index,
            correct,
            observed_score: observed,
            scored,
            elapsed_secs,
            difficulty: item.difficulty,
            difficulty_band: item.band(),
            theta_after: self.estimate.theta,
            fast_guess,
            answered_at: now,
        });
        self.score_history.push(ScorePoint {
            question_number,
            scaled: theta_to_scaled(self.estimate.theta),
        });
        self.current = None;
        self.updated_at = now;

        let result = AnswerResult {
            correct,
            scored,
            explanation: item.explanation.clone(),
        };

        let stop = stopping::evaluate(
            self.config.stopping,
            self.items_answered.len(),
            &self.estimate,
            false,
        );
        let next = match stop {
            Some(reason) => Err(reason),
            None => self
                .select(catalog, blueprint, recently_seen)
                .ok_or(StopReason::BankExhausted),
        };

        match next {
            Ok(next_item) => {
                self.present(next_item, now);
                let next_question = self.redact(next_item)?;
                Ok(AnswerOutcome::Continue {
                    result,
                    next_question,
                    metrics: self.metrics(now),
                })
            }
            Err(reason) => {
                self.finalize(reason, now);
                Ok(self.completed_outcome(now))
            }
        }
    }

    /// Finalize the session if its time budget has run out.
    ///
    /// Returns `true` if this call completed the session.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.completed {
            return false;
        }
        match self.deadline() {
            Some(deadline) if now >= deadline => {
                self.finalize(StopReason::TimeExpired, now);
                true
            }
            _ => false,
        }
    }

    /// Live measurement state as of `now`.
    pub fn metrics(&self, now: DateTime<Utc>) -> Metrics {
        let (low, high) = self.estimate.confidence_interval();
        let as_of = self.completed_at.unwrap_or(now);
        let time_remaining_secs = self
            .deadline()
            .map(|deadline| (deadline - as_of).num_seconds().max(0) as u64);

        Metrics {
            theta: self.estimate.theta,
            se: self.estimate.se,
            scaled: theta_to_scaled(self.estimate.theta),
            ci_scaled_low: theta_to_scaled(low),
            ci_scaled_high: theta_to_scaled(high),
            answered: self.items_answered.len(),
            target: self.config.stopping.target(),
            mode: self.config.mode,
            pass_probability: pass_probability(self.estimate.theta, self.estimate.se),
            time_remaining_secs,
        }
    }

    /// Final outcome. Meaningful once the session is completed.
    pub fn summary(&self) -> Summary {
        let scaled_score = theta_to_scaled(self.estimate.theta);
        let scored: Vec<&ResponseRecord> =
            self.items_answered.iter().filter(|r| r.scored).collect();

        Summary {
            administered: self.items_answered.len(),
            scored: scored.len(),
            scored_correct: scored.iter().filter(|r| r.correct).count(),
            scaled_score,
            pass_cut: PASS_CUT_SCALED,
            pass_estimate: scaled_score >= PASS_CUT_SCALED,
            pass_probability: pass_probability(self.estimate.theta, self.estimate.se),
            stop_reason: self.stop_reason,
            domains: summarize_domains(&self.items_answered)
                .into_iter()
                .map(|(domain, stats)| DomainBreakdown {
                    domain,
                    administered: stats.administered,
                    scored: stats.scored,
                    correct: stats.correct,
                })
                .collect(),
        }
    }

    /// The pending item as the candidate sees it.
    pub fn current_question(&self, catalog: &Catalog) -> Result<Option<RedactedQuestion>, EngineError> {
        match &self.current {
            Some(current) => {
                let item = catalog.require(&current.item_id)?;
                Ok(Some(self.redact(item)?))
            }
            None => Ok(None),
        }
    }

    /// Read-only view for callers.
    pub fn state(&self, catalog: &Catalog, now: DateTime<Utc>) -> Result<SessionState, EngineError> {
        Ok(SessionState {
            session_id: self.id,
            completed: self.completed,
            stop_reason: self.stop_reason,
            metrics: self.metrics(now),
            current_question: self.current_question(catalog)?,
            summary: self.completed.then(|| self.summary()),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn estimate(&self) -> &AbilityEstimate {
        &self.estimate
    }

    pub fn items_answered(&self) -> &[ResponseRecord] {
        &self.items_answered
    }

    pub fn score_history(&self) -> &[ScorePoint] {
        &self.score_history
    }

    pub fn unscored_positions(&self) -> &BTreeSet<usize> {
        &self.unscored_positions
    }

    pub fn current(&self) -> Option<&PresentedItem> {
        self.current.as_ref()
    }

    pub fn current_item_id(&self) -> Option<&str> {
        self.current.as_ref().map(|c| c.item_id.as_str())
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// When the time budget runs out, if there is one.
    ///
    /// A budget too large to represent as a timestamp counts as no deadline.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.config.time_limit_secs?).ok()?;
        let budget = Duration::try_seconds(secs)?;
        self.created_at.checked_add_signed(budget)
    }

    fn select<'c>(
        &mut self,
        catalog: &'c Catalog,
        blueprint: &Blueprint,
        recently_seen: &HashSet<String>,
    ) -> Option<&'c Item> {
        let ctx = SelectionContext {
            mode: self.config.mode,
            theta: self.estimate.theta,
            administered: &self.items_answered,
            selected_domains: &self.config.selected_domains,
            recently_seen,
            min_fresh_pool: self.config.min_fresh_pool,
            first_item_min_pool: self.config.first_item_min_pool,
        };
        select_next_item(catalog, blueprint, &ctx, &mut self.rng)
    }

    fn present(&mut self, item: &Item, now: DateTime<Utc>) {
        let mut choice_order: Vec<usize> = (0..item.choices.len()).collect();
        choice_order.shuffle(&mut self.rng);
        self.current = Some(PresentedItem {
            item_id: item.id.clone(),
            choice_order,
            presented_at: now,
        });
    }

    fn redact(&self, item: &Item) -> Result<RedactedQuestion, EngineError> {
        let current = self
            .current
            .as_ref()
            .filter(|c| c.item_id == item.id)
            .ok_or_else(|| EngineError::QuestionMismatch {
                expected: self.current_item_id().map(str::to_string),
                received: item.id.clone(),
            })?;
        Ok(RedactedQuestion {
            id: item.id.clone(),
            question_number: self.items_answered.len() + 1,
            domain: item.domain.clone(),
            difficulty: item.difficulty,
            item_type: item.item_type,
            stem: item.stem.clone(),
            choices: current
                .choice_order
                .iter()
                .map(|&i| item.choices[i].clone())
                .collect(),
        })
    }

    fn finalize(&mut self, reason: StopReason, now: DateTime<Utc>) {
        self.completed = true;
        self.stop_reason = Some(reason);
        self.completed_at = Some(now);
        self.current = None;
        self.updated_at = now;
        tracing::info!(
            session = %self.id,
            reason = %reason,
            administered = self.items_answered.len(),
            theta = self.estimate.theta,
            se = self.estimate.se,
            "session completed"
        );
    }

    fn completed_outcome(&self, now: DateTime<Utc>) -> AnswerOutcome {
        AnswerOutcome::Completed {
            stop_reason: self.stop_reason.unwrap_or(StopReason::TimeExpired),
            metrics: self.metrics(now),
            summary: self.summary(),
        }
    }
}
