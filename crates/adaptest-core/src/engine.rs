//! Transport-agnostic session service.
//!
//! [`CatEngine`] loads a session snapshot, applies one operation, and saves
//! it back. Operations on the same session id are serialized through a
//! per-session lock; different sessions proceed independently and share
//! only the read-only catalog and the exposure log.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use crate::api::{AnswerOutcome, AnswerSubmission, CreateResponse, SessionRequest, SessionState};
use crate::catalog::Catalog;
use crate::config::AdaptestConfig;
use crate::error::EngineError;
use crate::session::{Session, SessionConfig};
use crate::snapshot::SessionSnapshot;
use crate::traits::{
    Clock, ExposureLog, InMemorySessionStore, RecentItemLog, SessionStore, SystemClock,
};

/// Odd constant used to spread per-session seeds.
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// The adaptive testing engine.
pub struct CatEngine {
    catalog: Arc<Catalog>,
    config: Arc<AdaptestConfig>,
    store: Arc<dyn SessionStore>,
    exposure: Arc<dyn ExposureLog>,
    clock: Arc<dyn Clock>,
    seed_base: u64,
    sessions_started: AtomicU64,
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl CatEngine {
    /// Engine with an in-memory store, an in-memory exposure log and the
    /// system clock.
    ///
    /// `config` is used as given. [`load_config`](crate::config::load_config)
    /// validates; hand-built configs should go through
    /// [`AdaptestConfig::validate`] first.
    pub fn new(catalog: Arc<Catalog>, config: AdaptestConfig) -> Self {
        let seed_base = config.seed.unwrap_or_else(rand::random);
        let exposure: Arc<dyn ExposureLog> =
            Arc::new(RecentItemLog::new(config.exposure.recent_capacity));
        Self {
            catalog,
            config: Arc::new(config),
            store: Arc::new(InMemorySessionStore::new()),
            exposure,
            clock: Arc::new(SystemClock),
            seed_base,
            sessions_started: AtomicU64::new(0),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_exposure_log(mut self, exposure: Arc<dyn ExposureLog>) -> Self {
        self.exposure = exposure;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &AdaptestConfig {
        &self.config
    }

    /// Start a session and return its first question.
    pub async fn create(&self, request: &SessionRequest) -> Result<CreateResponse, EngineError> {
        let resolved = SessionConfig::resolve(request, &self.config, &self.catalog)?;
        let recent = self.recently_seen(resolved.candidate_id.as_deref());
        let now = self.clock.now();
        let id = Uuid::new_v4();

        let session = Session::start(
            id,
            resolved,
            &self.catalog,
            &self.config.blueprint,
            &recent,
            now,
            ChaCha8Rng::seed_from_u64(self.next_seed()),
        )?;
        self.record_exposure(&session);

        let question = session
            .current_question(&self.catalog)?
            .ok_or_else(|| EngineError::Config("session started without a question".into()))?;
        let metrics = session.metrics(now);
        self.save(session).await?;

        Ok(CreateResponse {
            session_id: id,
            question,
            metrics,
        })
    }

    /// Submit an answer to the session's current item.
    pub async fn answer(
        &self,
        id: Uuid,
        submission: &AnswerSubmission,
    ) -> Result<AnswerOutcome, EngineError> {
        let lock = self.session_lock(id);
        let result = {
            let _guard = lock.lock().await;
            self.answer_locked(id, submission).await
        };
        self.prune_lock(id, lock);
        result
    }

    /// Current metrics, the pending question, and the summary once done.
    ///
    /// Finalizes the session first if its time budget ran out.
    pub async fn get_state(&self, id: Uuid) -> Result<SessionState, EngineError> {
        let lock = self.session_lock(id);
        let result = {
            let _guard = lock.lock().await;
            self.get_state_locked(id).await
        };
        self.prune_lock(id, lock);
        result
    }

    /// The full persisted session, for audit and export.
    pub async fn session(&self, id: Uuid) -> Result<Session, EngineError> {
        self.load(id).await
    }

    async fn answer_locked(
        &self,
        id: Uuid,
        submission: &AnswerSubmission,
    ) -> Result<AnswerOutcome, EngineError> {
        let mut session = self.load(id).await?;
        let recent = self.recently_seen(session.config().candidate_id.as_deref());
        let now = self.clock.now();

        let outcome = session.answer(
            submission,
            &self.catalog,
            &self.config.blueprint,
            &recent,
            now,
        )?;
        self.record_exposure(&session);
        self.save(session).await?;
        Ok(outcome)
    }

    async fn get_state_locked(&self, id: Uuid) -> Result<SessionState, EngineError> {
        let mut session = self.load(id).await?;
        let now = self.clock.now();
        let expired = session.expire_if_due(now);
        let state = session.state(&self.catalog, now)?;
        if expired {
            self.save(session).await?;
        }
        Ok(state)
    }

    fn next_seed(&self) -> u64 {
        let n = self.sessions_started.fetch_add(1, Ordering::Relaxed);
        self.seed_base.wrapping_add(n.wrapping_mul(SEED_STRIDE))
    }

    fn recently_seen(&self, candidate: Option<&str>) -> HashSet<String> {
        candidate
            .map(|c| self.exposure.recent(c))
            .unwrap_or_default()
    }

    fn record_exposure(&self, session: &Session) {
        if let (Some(candidate), Some(item)) = (
            session.config().candidate_id.as_deref(),
            session.current_item_id(),
        ) {
            self.exposure.record(candidate, item);
        }
    }

    fn session_lock(&self, id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(id).or_default())
    }

    /// Drop the table entry for `id` once no other caller holds or awaits it.
    fn prune_lock(&self, id: Uuid, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the table, one in `lock`.
        let idle = locks
            .get(&id)
            .is_some_and(|entry| Arc::ptr_eq(entry, &lock) && Arc::strong_count(&lock) == 2);
        if idle {
            locks.remove(&id);
        }
    }

    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    async fn load(&self, id: Uuid) -> Result<Session, EngineError> {
        let json = self
            .store
            .load(id)
            .await
            .map_err(EngineError::Store)?
            .ok_or(EngineError::SessionNotFound(id))?;
        Ok(SessionSnapshot::from_json(&json)?.session)
    }

    async fn save(&self, session: Session) -> Result<(), EngineError> {
        let id = session.id();
        let json = SessionSnapshot::new(session, self.clock.now()).to_json()?;
        self.store.save(id, json).await.map_err(EngineError::Store)
    }
}
