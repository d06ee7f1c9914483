//! The `adaptest simulate` command.
//!
//! Drives simulated candidates of known ability through the engine. Each
//! response is drawn from the 3PL model at the true ability, so the run
//! shows how test length, precision and pass/fail calls behave for a bank.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use uuid::Uuid;

use adaptest_core::api::{AnswerOutcome, AnswerSubmission, RedactedQuestion, SessionRequest};
use adaptest_core::catalog::load_catalog;
use adaptest_core::config::load_config_from;
use adaptest_core::irt::probability;
use adaptest_core::model::{Mode, StopReason};
use adaptest_core::scale::theta_to_scaled;
use adaptest_core::CatEngine;

/// Mixed into the engine seed so responses use a separate stream.
const RESPONDER_SALT: u64 = 0xA5A5_5A5A_0F0F_F0F0;

pub struct SimulateArgs {
    pub bank: PathBuf,
    pub true_theta: f64,
    pub mode: String,
    pub count: Option<usize>,
    pub domains: Option<String>,
    pub replications: usize,
    pub seed: Option<u64>,
    pub config: Option<PathBuf>,
    pub format: String,
}

/// Outcome of one simulated session.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationRun {
    pub replication: usize,
    pub session_id: Uuid,
    pub administered: usize,
    pub scored: usize,
    pub scored_correct: usize,
    pub theta: f64,
    pub se: f64,
    pub scaled_score: f64,
    pub pass_estimate: bool,
    pub pass_probability: f64,
    pub stop_reason: Option<StopReason>,
    pub fast_guesses: usize,
}

/// Aggregate over all simulated sessions.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub true_theta: f64,
    pub true_scaled: f64,
    pub mode: Mode,
    pub runs: Vec<SimulationRun>,
    pub mean_length: f64,
    pub pass_rate: f64,
    pub mean_scaled: f64,
    pub theta_bias: f64,
    pub theta_rmse: f64,
}

impl SimulationReport {
    fn new(true_theta: f64, mode: Mode, runs: Vec<SimulationRun>) -> Self {
        Self {
            true_theta,
            true_scaled: theta_to_scaled(true_theta),
            mode,
            mean_length: mean(&runs, |r| r.administered as f64),
            pass_rate: mean(&runs, |r| if r.pass_estimate { 1.0 } else { 0.0 }),
            mean_scaled: mean(&runs, |r| r.scaled_score),
            theta_bias: mean(&runs, |r| r.theta - true_theta),
            theta_rmse: mean(&runs, |r| (r.theta - true_theta).powi(2)).sqrt(),
            runs,
        }
    }
}

fn mean(runs: &[SimulationRun], f: impl Fn(&SimulationRun) -> f64) -> f64 {
    if runs.is_empty() {
        return 0.0;
    }
    runs.iter().map(f).sum::<f64>() / runs.len() as f64
}

pub async fn execute(args: SimulateArgs) -> Result<()> {
    if !args.true_theta.is_finite() {
        anyhow::bail!("--true-theta must be a finite number");
    }
    if args.replications == 0 {
        anyhow::bail!("--replications must be at least 1");
    }
    if !matches!(args.format.as_str(), "text" | "json") {
        anyhow::bail!("unknown format: {} (expected text or json)", args.format);
    }
    let mode: Mode = args.mode.parse().map_err(anyhow::Error::msg)?;

    let mut config = load_config_from(args.config.as_deref())?;
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    let catalog = Arc::new(load_catalog(&args.bank, &config)?);

    let selected_domains = match (mode, &args.domains) {
        (Mode::Adaptive, _) => Vec::new(),
        (Mode::FixedLength, Some(list)) => list
            .split(',')
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect(),
        (Mode::FixedLength, None) => {
            let mut all: Vec<String> = Vec::new();
            for item in catalog.items() {
                if !all.contains(&item.domain) {
                    all.push(item.domain.clone());
                }
            }
            all
        }
    };
    let request = SessionRequest {
        mode,
        question_count: args.count,
        selected_domains,
        timed: Some(false),
        ..Default::default()
    };

    let mut responder = ChaCha8Rng::seed_from_u64(
        config
            .seed
            .map(|s| s ^ RESPONDER_SALT)
            .unwrap_or_else(rand::random),
    );
    let engine = CatEngine::new(catalog, config);

    let mut runs = Vec::with_capacity(args.replications);
    for replication in 1..=args.replications {
        let run = simulate_one(&engine, &request, args.true_theta, &mut responder, replication).await?;
        tracing::debug!(
            replication,
            administered = run.administered,
            theta = run.theta,
            "simulated session finished"
        );
        runs.push(run);
    }

    let report = SimulationReport::new(args.true_theta, mode, runs);
    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_summary(&report),
    }
    Ok(())
}

async fn simulate_one(
    engine: &CatEngine,
    request: &SessionRequest,
    true_theta: f64,
    rng: &mut ChaCha8Rng,
    replication: usize,
) -> Result<SimulationRun> {
    let created = engine.create(request).await?;
    let session_id = created.session_id;
    let mut question = created.question;

    loop {
        let submission = respond(engine, &question, true_theta, rng)?;
        match engine.answer(session_id, &submission).await? {
            AnswerOutcome::Continue { next_question, .. } => question = next_question,
            AnswerOutcome::Completed {
                stop_reason,
                metrics,
                summary,
            } => {
                let session = engine.session(session_id).await?;
                let fast_guesses = session
                    .items_answered()
                    .iter()
                    .filter(|r| r.fast_guess)
                    .count();
                return Ok(SimulationRun {
                    replication,
                    session_id,
                    administered: summary.administered,
                    scored: summary.scored,
                    scored_correct: summary.scored_correct,
                    theta: metrics.theta,
                    se: metrics.se,
                    scaled_score: summary.scaled_score,
                    pass_estimate: summary.pass_estimate,
                    pass_probability: summary.pass_probability,
                    stop_reason: Some(stop_reason),
                    fast_guesses,
                });
            }
        }
    }
}

/// Draw a response to `question` from the model at `true_theta`.
fn respond(
    engine: &CatEngine,
    question: &RedactedQuestion,
    true_theta: f64,
    rng: &mut ChaCha8Rng,
) -> Result<AnswerSubmission> {
    let item = engine.catalog().require(&question.id)?;
    let correct = rng.gen::<f64>() < probability(true_theta, item);

    let key = &item.choices[item.correct_index];
    let key_pos = question
        .choices
        .iter()
        .position(|c| c == key)
        .ok_or_else(|| anyhow::anyhow!("item {} lost its keyed choice", item.id))?;
    let n = question.choices.len();
    let selected = if correct {
        key_pos
    } else {
        (key_pos + rng.gen_range(1..n)) % n
    };

    let mut submission = AnswerSubmission::new(question.id.clone(), selected as i64)
        .with_elapsed(rng.gen_range(20.0..150.0));
    if item.is_graded() {
        let partial = if correct {
            item.max_score
        } else {
            rng.gen_range(0..item.max_score)
        };
        submission = submission.with_partial_score(f64::from(partial));
    }
    Ok(submission)
}

fn print_summary(report: &SimulationReport) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec![
        "Run", "Items", "Scored", "Theta", "SE", "Scaled", "P(pass)", "Result", "Stop",
    ]);

    for run in &report.runs {
        table.add_row(vec![
            Cell::new(run.replication),
            Cell::new(run.administered),
            Cell::new(format!("{}/{}", run.scored_correct, run.scored)),
            Cell::new(format!("{:+.2}", run.theta)),
            Cell::new(format!("{:.3}", run.se)),
            Cell::new(format!("{:.0}", run.scaled_score)),
            Cell::new(format!("{:.1}%", run.pass_probability)),
            Cell::new(if run.pass_estimate { "PASS" } else { "FAIL" }),
            Cell::new(
                run.stop_reason
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }

    println!("{table}");
    println!(
        "\nSimulated {} {} session(s) at true theta {:+.2} (scaled {:.0})",
        report.runs.len(),
        report.mode,
        report.true_theta,
        report.true_scaled
    );
    println!("  mean length: {:.1}", report.mean_length);
    println!("  pass rate:   {:.1}%", report.pass_rate * 100.0);
    println!("  mean scaled: {:.0}", report.mean_scaled);
    println!(
        "  theta bias:  {:+.3}  rmse: {:.3}",
        report.theta_bias, report.theta_rmse
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(theta: f64, pass: bool, administered: usize) -> SimulationRun {
        SimulationRun {
            replication: 1,
            session_id: Uuid::nil(),
            administered,
            scored: administered,
            scored_correct: 0,
            theta,
            se: 0.2,
            scaled_score: theta_to_scaled(theta),
            pass_estimate: pass,
            pass_probability: 50.0,
            stop_reason: Some(StopReason::MaxReached),
            fast_guesses: 0,
        }
    }

    #[test]
    fn report_aggregates() {
        let report = SimulationReport::new(
            1.0,
            Mode::Adaptive,
            vec![run(1.5, true, 100), run(0.5, false, 150)],
        );
        assert!((report.mean_length - 125.0).abs() < 1e-12);
        assert!((report.pass_rate - 0.5).abs() < 1e-12);
        assert!(report.theta_bias.abs() < 1e-12);
        assert!((report.theta_rmse - 0.5).abs() < 1e-12);
        assert!((report.true_scaled - 700.0).abs() < 1e-9);
    }
}
