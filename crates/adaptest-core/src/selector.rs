//! Next-item selection.
//!
//! Adaptive mode ranks the remaining pool by information at the current
//! ability plus content-balance and judgment-weighting terms. Fixed-length
//! mode ranks by domain spread and difficulty-band variety. Both modes then
//! draw from the top of the ranking with rank-decaying weights rather than
//! always taking the best candidate.

use std::collections::{HashMap, HashSet};

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::api::ResponseRecord;
use crate::catalog::Catalog;
use crate::irt::information;
use crate::model::{Blueprint, DifficultyBand, Item, Mode};
use crate::scale::pass_cut_theta;

/// Per-step weight of the gap between target and actual domain counts.
pub const DOMAIN_BOOST_RATE: f64 = 0.06;
/// Bounds on the domain-balance term.
pub const DOMAIN_BOOST_RANGE: (f64, f64) = (-0.2, 0.35);
/// Judgment weighting at and above the pass cut.
pub const JUDGMENT_WEIGHT: f64 = 0.18;
/// Ability at which judgment weighting starts to ramp up.
pub const JUDGMENT_BASELINE_THETA: f64 = -1.0;
/// Flat bonus for items flagged as testing implied knowledge.
pub const IMPLIED_KNOWLEDGE_BONUS: f64 = 0.04;
/// Width of the uniform tie-breaker in adaptive mode.
pub const ADAPTIVE_JITTER: f64 = 0.02;

/// Width of the uniform term in fixed-length mode.
pub const FIXED_JITTER: f64 = 0.2;
/// Number of trailing items checked for a repeated difficulty band.
pub const BAND_MEMORY: usize = 3;
/// Penalty for repeating a recently seen difficulty band.
pub const BAND_REPEAT_PENALTY: f64 = 0.06;

/// Bounds on the top slice of the ranking that a draw may pick from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankWindow {
    /// Share of the ranked pool to keep.
    pub fraction: f64,
    pub floor: usize,
    pub ceiling: usize,
}

impl RankWindow {
    pub const ADAPTIVE: RankWindow = RankWindow {
        fraction: 0.42,
        floor: 16,
        ceiling: 80,
    };

    /// Opening item of an adaptive session.
    pub const FIRST_ITEM: RankWindow = RankWindow {
        fraction: 0.36,
        floor: 18,
        ceiling: 90,
    };

    pub const FIXED: RankWindow = RankWindow {
        fraction: 0.55,
        floor: 20,
        ceiling: 90,
    };

    /// Number of top-ranked candidates eligible for a pool of `n`.
    pub fn slice_len(&self, n: usize) -> usize {
        let scaled = (n as f64 * self.fraction).ceil() as usize;
        scaled.clamp(self.floor, self.ceiling).min(n).max(1)
    }
}

/// Session state the selector reads.
#[derive(Debug, Clone, Copy)]
pub struct SelectionContext<'a> {
    pub mode: Mode,
    pub theta: f64,
    /// Items already administered, in order.
    pub administered: &'a [ResponseRecord],
    /// Included domains (fixed-length mode only).
    pub selected_domains: &'a [String],
    /// Items this test-taker saw in recent sessions.
    pub recently_seen: &'a HashSet<String>,
    /// Fresh items required before `recently_seen` is honored.
    pub min_fresh_pool: usize,
    /// The same floor for the opening item of an adaptive session.
    pub first_item_min_pool: usize,
}

/// Choose the next item, or `None` if nothing is left to administer.
///
/// The opening item of an adaptive session is ranked on information alone,
/// since there are no domain counts to balance yet.
pub fn select_next_item<'c, R: Rng + ?Sized>(
    catalog: &'c Catalog,
    blueprint: &Blueprint,
    ctx: &SelectionContext<'_>,
    rng: &mut R,
) -> Option<&'c Item> {
    let used: HashSet<&str> = ctx.administered.iter().map(|r| r.item_id.as_str()).collect();
    let included: HashSet<&str> = ctx.selected_domains.iter().map(String::as_str).collect();

    let pool: Vec<&Item> = catalog
        .items()
        .iter()
        .filter(|item| !used.contains(item.id.as_str()))
        .filter(|item| ctx.mode == Mode::Adaptive || included.contains(item.domain.as_str()))
        .collect();

    let opening = ctx.mode == Mode::Adaptive && ctx.administered.is_empty();
    let min_fresh_pool = if opening {
        ctx.first_item_min_pool
    } else {
        ctx.min_fresh_pool
    };
    let pool = filter_recently_seen(pool, ctx.recently_seen, min_fresh_pool);
    if pool.is_empty() {
        tracing::debug!(mode = %ctx.mode, "candidate pool exhausted");
        return None;
    }

    let domain_counts = count_by_domain(ctx.administered);
    let (scored, window) = match ctx.mode {
        Mode::Adaptive if opening => (score_opening(pool, ctx.theta, rng), RankWindow::FIRST_ITEM),
        Mode::Adaptive => (
            score_adaptive(pool, blueprint, ctx, &domain_counts, rng),
            RankWindow::ADAPTIVE,
        ),
        Mode::FixedLength => (
            score_fixed(pool, ctx.administered, &domain_counts, rng),
            RankWindow::FIXED,
        ),
    };

    let picked = pick_rank_weighted(scored, window, rng)?;
    tracing::debug!(
        item = %picked.id,
        domain = %picked.domain,
        difficulty = picked.difficulty,
        theta = ctx.theta,
        "selected next item"
    );
    Some(picked)
}

/// Drop recently seen items when enough fresh ones remain.
///
/// The full pool is kept when fewer than `min(min_pool, pool.len())` items
/// are fresh.
pub fn filter_recently_seen<'c>(
    pool: Vec<&'c Item>,
    recently_seen: &HashSet<String>,
    min_pool: usize,
) -> Vec<&'c Item> {
    if recently_seen.is_empty() {
        return pool;
    }
    let fresh: Vec<&Item> = pool
        .iter()
        .copied()
        .filter(|item| !recently_seen.contains(&item.id))
        .collect();
    if fresh.len() >= min_pool.min(pool.len()) {
        fresh
    } else {
        tracing::warn!(
            fresh = fresh.len(),
            pool = pool.len(),
            min_pool,
            "too few unseen items; ignoring exposure history"
        );
        pool
    }
}

/// Sort candidates by score and draw one from the top slice.
///
/// Slot `k` of a slice of size `s` has weight `sqrt(s - k)`.
pub fn pick_rank_weighted<T, R: Rng + ?Sized>(
    mut scored: Vec<(T, f64)>,
    window: RankWindow,
    rng: &mut R,
) -> Option<T> {
    if scored.is_empty() {
        return None;
    }
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    let size = window.slice_len(scored.len());
    scored.truncate(size);

    let weights = (0..size).map(|rank| ((size - rank) as f64).sqrt());
    let idx = match WeightedIndex::new(weights) {
        Ok(dist) => dist.sample(rng),
        Err(_) => 0,
    };
    scored.into_iter().nth(idx).map(|(item, _)| item)
}

/// Domain-balance term for a candidate at the given question number.
pub fn domain_boost(target_share: f64, next_question: usize, domain_count: usize) -> f64 {
    let expected = target_share * next_question as f64;
    let (lo, hi) = DOMAIN_BOOST_RANGE;
    (DOMAIN_BOOST_RATE * (expected - domain_count as f64)).clamp(lo, hi)
}

/// Weight placed on item ambiguity at ability `theta`.
///
/// Zero at or below the baseline, rising linearly to
/// [`JUDGMENT_WEIGHT`] at the pass cut, flat above.
pub fn judgment_strength(theta: f64) -> f64 {
    let span = pass_cut_theta() - JUDGMENT_BASELINE_THETA;
    ((theta - JUDGMENT_BASELINE_THETA) / span).clamp(0.0, 1.0) * JUDGMENT_WEIGHT
}

fn judgment_boost(theta: f64, item: &Item) -> f64 {
    judgment_strength(theta) * (f64::from(item.judgment_level) - 1.0) * 0.5
}

fn count_by_domain(administered: &[ResponseRecord]) -> HashMap<&str, usize> {
    let mut counts = HashMap::new();
    for r in administered {
        *counts.entry(r.domain.as_str()).or_insert(0) += 1;
    }
    counts
}

fn score_adaptive<'c, R: Rng + ?Sized>(
    pool: Vec<&'c Item>,
    blueprint: &Blueprint,
    ctx: &SelectionContext<'_>,
    domain_counts: &HashMap<&str, usize>,
    rng: &mut R,
) -> Vec<(&'c Item, f64)> {
    let next_question = ctx.administered.len() + 1;
    pool.into_iter()
        .map(|item| {
            let share = blueprint.target_share(&item.domain).unwrap_or(0.0);
            let count = domain_counts.get(item.domain.as_str()).copied().unwrap_or(0);
            let implied = if item.implied_knowledge {
                IMPLIED_KNOWLEDGE_BONUS
            } else {
                0.0
            };
            let score = information(ctx.theta, item)
                + domain_boost(share, next_question, count)
                + judgment_boost(ctx.theta, item)
                + implied
                + rng.gen::<f64>() * ADAPTIVE_JITTER;
            (item, score)
        })
        .collect()
}

fn score_opening<'c, R: Rng + ?Sized>(pool: Vec<&'c Item>, theta: f64, rng: &mut R) -> Vec<(&'c Item, f64)> {
    pool.into_iter()
        .map(|item| (item, information(theta, item) + rng.gen::<f64>() * ADAPTIVE_JITTER))
        .collect()
}

fn score_fixed<'c, R: Rng + ?Sized>(
    pool: Vec<&'c Item>,
    administered: &[ResponseRecord],
    domain_counts: &HashMap<&str, usize>,
    rng: &mut R,
) -> Vec<(&'c Item, f64)> {
    let recent_bands: Vec<DifficultyBand> = administered
        .iter()
        .rev()
        .take(BAND_MEMORY)
        .map(|r| r.difficulty_band)
        .collect();

    pool.into_iter()
        .map(|item| {
            let count = domain_counts.get(item.domain.as_str()).copied().unwrap_or(0);
            let repeat = if recent_bands.contains(&item.band()) {
                BAND_REPEAT_PENALTY
            } else {
                0.0
            };
            let score = 0.15 / (1.0 + count as f64) + 0.25 - repeat
                + rng.gen::<f64>() * FIXED_JITTER;
            (item, score)
        })
        .collect()
}
