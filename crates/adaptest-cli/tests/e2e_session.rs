//! End-to-end session tests driving the engine with simulated candidates.
//!
//! These exercise create → answer → stop through the public engine API,
//! with seeded randomness so every run is reproducible.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use adaptest_core::api::{AnswerOutcome, AnswerSubmission, RedactedQuestion, SessionRequest};
use adaptest_core::catalog::Catalog;
use adaptest_core::config::AdaptestConfig;
use adaptest_core::error::{EngineError, SnapshotError};
use adaptest_core::irt::probability;
use adaptest_core::model::{Blueprint, Item, ItemType, Mode, QuestionType, StopReason};
use adaptest_core::traits::{InMemorySessionStore, ManualClock, SessionStore};
use adaptest_core::CatEngine;

// --- Fixtures ---

fn make_catalog(per_domain: usize) -> Arc<Catalog> {
    let blueprint = Blueprint::default();
    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    let mut items = Vec::new();
    for (d, domain) in blueprint.names().enumerate() {
        for k in 0..per_domain {
            let n = d * per_domain + k;
            let item_type = if k % 10 == 4 {
                ItemType::DragMatch
            } else {
                ItemType::MultipleChoice
            };
            items.push(Item {
                id: format!("D{}-{k:02}", d + 1),
                domain: domain.to_string(),
                stem: format!("Stem {n}"),
                choices: (0..4).map(|c| format!("choice {n}.{c}")).collect(),
                correct_index: n % 4,
                explanation: format!("Explanation {n}"),
                difficulty: rng.gen_range(-2.5..2.5),
                discrimination: rng.gen_range(0.7..1.8),
                guessing: if item_type == ItemType::MultipleChoice { 0.2 } else { 0.0 },
                item_type,
                max_score: 1,
                thresholds: vec![],
                question_type: QuestionType::Scenario,
                judgment_level: (k % 3) as u8 + 1,
                implied_knowledge: k % 8 == 0,
            });
        }
    }
    Arc::new(Catalog::new(items, 8).unwrap())
}

fn test_config() -> AdaptestConfig {
    let mut config = AdaptestConfig::default();
    config.seed = Some(42);
    config.adaptive.min_questions = 30;
    config.adaptive.max_questions = 60;
    config.adaptive.pretest_count = 5;
    config.adaptive.pretest_window = 30;
    config
}

/// Index of `question`'s keyed choice in presentation order.
fn key_position(catalog: &Catalog, question: &RedactedQuestion) -> usize {
    let item = catalog.get(&question.id).unwrap();
    let key = &item.choices[item.correct_index];
    question.choices.iter().position(|c| c == key).unwrap()
}

enum Candidate {
    AlwaysRight,
    AlwaysWrong,
    Modeled { theta: f64, rng: ChaCha8Rng },
}

impl Candidate {
    fn modeled(theta: f64, seed: u64) -> Self {
        Candidate::Modeled {
            theta,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    fn respond(&mut self, catalog: &Catalog, question: &RedactedQuestion) -> AnswerSubmission {
        let key = key_position(catalog, question);
        let correct = match self {
            Candidate::AlwaysRight => true,
            Candidate::AlwaysWrong => false,
            Candidate::Modeled { theta, rng } => {
                let item = catalog.get(&question.id).unwrap();
                rng.gen::<f64>() < probability(*theta, item)
            }
        };
        let selected = if correct { key } else { (key + 1) % question.choices.len() };
        AnswerSubmission::new(question.id.clone(), selected as i64).with_elapsed(45.0)
    }
}

struct Finished {
    session_id: Uuid,
    stop_reason: StopReason,
    administered: usize,
    questions: Vec<String>,
}

async fn run_to_completion(
    engine: &CatEngine,
    request: &SessionRequest,
    candidate: &mut Candidate,
) -> Finished {
    let created = engine.create(request).await.unwrap();
    let mut question = created.question;
    let mut questions = vec![question.id.clone()];
    loop {
        let submission = candidate.respond(engine.catalog(), &question);
        match engine.answer(created.session_id, &submission).await.unwrap() {
            AnswerOutcome::Continue { next_question, .. } => {
                questions.push(next_question.id.clone());
                question = next_question;
            }
            AnswerOutcome::Completed {
                stop_reason,
                summary,
                ..
            } => {
                return Finished {
                    session_id: created.session_id,
                    stop_reason,
                    administered: summary.administered,
                    questions,
                }
            }
        }
    }
}

/// A session store writing one JSON file per session.
struct FileStore {
    dir: PathBuf,
}

#[async_trait]
impl SessionStore for FileStore {
    async fn load(&self, id: Uuid) -> anyhow::Result<Option<String>> {
        let path = self.dir.join(format!("{id}.json"));
        match tokio::fs::read_to_string(&path).await {
            Ok(json) => Ok(Some(json)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, id: Uuid, snapshot: String) -> anyhow::Result<()> {
        tokio::fs::write(self.dir.join(format!("{id}.json")), snapshot).await?;
        Ok(())
    }
}

// --- Adaptive flow ---

#[tokio::test]
async fn strong_candidate_passes_within_bounds() {
    let engine = CatEngine::new(make_catalog(25), test_config());
    let done = run_to_completion(&engine, &SessionRequest::default(), &mut Candidate::AlwaysRight).await;

    assert!((30..=60).contains(&done.administered));
    assert!(matches!(done.stop_reason, StopReason::ClearPass | StopReason::MaxReached));

    let session = engine.session(done.session_id).await.unwrap();
    let summary = session.summary();
    assert!(summary.pass_estimate);
    assert_eq!(summary.scored + session.unscored_positions().len(), summary.administered);
    assert_eq!(session.score_history().len(), done.administered + 1);
}

#[tokio::test]
async fn weak_candidate_fails_clearly() {
    let engine = CatEngine::new(make_catalog(25), test_config());
    let done = run_to_completion(&engine, &SessionRequest::default(), &mut Candidate::AlwaysWrong).await;

    assert_eq!(done.stop_reason, StopReason::ClearFail);
    assert!((30..=60).contains(&done.administered));
    let state = engine.get_state(done.session_id).await.unwrap();
    let summary = state.summary.unwrap();
    assert!(!summary.pass_estimate);
    assert_eq!(summary.scored_correct, 0);
    assert!(summary.pass_probability < 50.0);
}

#[tokio::test]
async fn stopping_bounds_hold_across_abilities() {
    let engine = CatEngine::new(make_catalog(25), test_config());
    for (i, theta) in [-2.0, -0.5, 0.6, 1.0, 1.4, 2.5].into_iter().enumerate() {
        let mut candidate = Candidate::modeled(theta, i as u64);
        let done = run_to_completion(&engine, &SessionRequest::default(), &mut candidate).await;
        assert!(
            (30..=60).contains(&done.administered),
            "theta {theta}: administered {}",
            done.administered
        );
        let unique: HashSet<&String> = done.questions.iter().collect();
        assert_eq!(unique.len(), done.questions.len(), "repeated item at theta {theta}");
    }
}

#[tokio::test]
async fn small_bank_exhausts() {
    let engine = CatEngine::new(make_catalog(2), test_config());
    let done = run_to_completion(&engine, &SessionRequest::default(), &mut Candidate::modeled(1.0, 5)).await;
    assert_eq!(done.stop_reason, StopReason::BankExhausted);
    assert_eq!(done.administered, 16);
}

// --- Fixed-length flow ---

#[tokio::test]
async fn fixed_length_session() {
    let engine = CatEngine::new(make_catalog(25), test_config());
    let request = SessionRequest {
        mode: Mode::FixedLength,
        question_count: Some(20),
        selected_domains: vec!["3".into(), "6. security assessment and testing".into()],
        ..Default::default()
    };
    let done = run_to_completion(&engine, &request, &mut Candidate::modeled(0.0, 8)).await;
    assert_eq!(done.stop_reason, StopReason::FixedLengthReached);
    assert_eq!(done.administered, 20);
    assert!(done
        .questions
        .iter()
        .all(|id| id.starts_with("D3-") || id.starts_with("D6-")));
}

#[tokio::test]
async fn fixed_length_beyond_domain_supply_is_rejected() {
    let store = Arc::new(InMemorySessionStore::new());
    let engine = CatEngine::new(make_catalog(6), test_config()).with_store(store.clone());
    let request = SessionRequest {
        mode: Mode::FixedLength,
        question_count: Some(10),
        selected_domains: vec!["2. Asset Security".into()],
        ..Default::default()
    };
    let err = engine.create(&request).await.unwrap_err();
    assert!(matches!(err, EngineError::Config(_)), "{err}");
    assert!(store.is_empty().await);
}

// --- Conflicts and terminal state ---

#[tokio::test]
async fn mismatched_question_is_conflict() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let engine = CatEngine::new(make_catalog(25), test_config()).with_clock(clock);
    let created = engine.create(&SessionRequest::default()).await.unwrap();
    let before = engine.get_state(created.session_id).await.unwrap();

    let other = engine
        .catalog()
        .items()
        .iter()
        .find(|item| item.id != created.question.id)
        .unwrap();
    let err = engine
        .answer(created.session_id, &AnswerSubmission::new(other.id.clone(), 0))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::QuestionMismatch { .. }));

    let after = engine.get_state(created.session_id).await.unwrap();
    assert_eq!(before.metrics, after.metrics);
    assert_eq!(after.metrics.answered, 0);
}

#[tokio::test]
async fn completed_session_rejects_further_answers() {
    let engine = CatEngine::new(make_catalog(25), test_config());
    let request = SessionRequest {
        mode: Mode::FixedLength,
        question_count: Some(3),
        selected_domains: vec!["1".into()],
        ..Default::default()
    };
    let done = run_to_completion(&engine, &request, &mut Candidate::AlwaysRight).await;
    let before = engine.session(done.session_id).await.unwrap();

    let err = engine
        .answer(done.session_id, &AnswerSubmission::new(done.questions[0].clone(), 0))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyCompleted(_)));

    let after = engine.session(done.session_id).await.unwrap();
    assert_eq!(before.items_answered(), after.items_answered());
    assert_eq!(before.estimate(), after.estimate());
}

#[tokio::test]
async fn open_state_never_reveals_answers() {
    let engine = CatEngine::new(make_catalog(25), test_config());
    let created = engine.create(&SessionRequest::default()).await.unwrap();
    let state = engine.get_state(created.session_id).await.unwrap();
    let json = serde_json::to_string(&state).unwrap();
    assert!(!json.contains("correct_index"));
    assert!(!json.contains("Explanation"));
    assert!(state.summary.is_none());
}

#[tokio::test]
async fn answer_after_deadline_expires_session() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let engine = CatEngine::new(make_catalog(25), test_config()).with_clock(clock.clone());
    let created = engine.create(&SessionRequest::default()).await.unwrap();

    clock.advance(Duration::seconds(10_801));
    let submission = AnswerSubmission::new(created.question.id.clone(), 0);
    match engine.answer(created.session_id, &submission).await.unwrap() {
        AnswerOutcome::Completed {
            stop_reason,
            summary,
            ..
        } => {
            assert_eq!(stop_reason, StopReason::TimeExpired);
            assert_eq!(summary.administered, 0);
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

// --- Persistence ---

#[tokio::test]
async fn sessions_survive_engine_restart() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = make_catalog(25);
    let store = || Arc::new(FileStore { dir: dir.path().to_path_buf() });

    let first = CatEngine::new(catalog.clone(), test_config()).with_store(store());
    let created = first.create(&SessionRequest::default()).await.unwrap();
    let mut candidate = Candidate::modeled(0.8, 1);
    let mut question = created.question;
    for _ in 0..5 {
        let submission = candidate.respond(&catalog, &question);
        match first.answer(created.session_id, &submission).await.unwrap() {
            AnswerOutcome::Continue { next_question, .. } => question = next_question,
            other => panic!("unexpected {other:?}"),
        }
    }
    let before = first.get_state(created.session_id).await.unwrap();
    drop(first);

    let second = CatEngine::new(catalog.clone(), test_config()).with_store(store());
    let after = second.get_state(created.session_id).await.unwrap();
    assert_eq!(after.current_question, before.current_question);
    assert_eq!(after.metrics.theta, before.metrics.theta);
    assert_eq!(after.metrics.answered, 5);

    let submission = candidate.respond(&catalog, &question);
    let outcome = second.answer(created.session_id, &submission).await.unwrap();
    assert_eq!(outcome.metrics().answered, 6);
}

#[tokio::test]
async fn unknown_schema_version_is_rejected() {
    let store = Arc::new(InMemorySessionStore::new());
    let engine = CatEngine::new(make_catalog(25), test_config()).with_store(store.clone());
    let created = engine.create(&SessionRequest::default()).await.unwrap();

    let json = store.load(created.session_id).await.unwrap().unwrap();
    let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
    value["schema_version"] = serde_json::json!(0);
    store.save(created.session_id, value.to_string()).await.unwrap();

    let err = engine.get_state(created.session_id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Snapshot(SnapshotError::UnsupportedVersion { found: Some(0), .. })
    ));
}

// --- Reproducibility ---

#[tokio::test]
async fn same_seed_same_sessions() {
    let run = || async {
        let engine = CatEngine::new(make_catalog(25), test_config());
        let mut sequences = Vec::new();
        for seed in 0..3 {
            let mut candidate = Candidate::modeled(0.7, seed);
            let done = run_to_completion(&engine, &SessionRequest::default(), &mut candidate).await;
            let theta = engine.session(done.session_id).await.unwrap().estimate().theta;
            sequences.push((done.questions, done.stop_reason, theta));
        }
        sequences
    };
    assert_eq!(run().await, run().await);
}
