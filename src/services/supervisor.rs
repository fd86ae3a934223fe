use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use super::collectors::Collector;
use super::engine::AssessmentEngine;
use super::notifier::{LogNotifier, Notifier, WebhookNotifier};
use super::orchestrator::{Orchestrator, SnapshotUpdate};
use super::risk_engine::{LlmReasoningClient, ReasoningClient, RiskEngine};
use crate::database::Store;
use crate::error::{EngineError, EngineResult};
use crate::models::{Assessment, HealthSnapshot, LearnedPattern, MigraineEvent, Settings};

const WEBHOOK_TIMEOUT_SECS: u64 = 10;

/// Live state of one owner: the collection tasks plus the evaluation task
/// that turns every merged snapshot into an assessment.
pub struct OwnerSession {
    owner_id: String,
    orchestrator: Orchestrator,
    engine: Arc<Mutex<AssessmentEngine>>,
    assessments: watch::Sender<Option<Assessment>>,
    shutdown: watch::Sender<bool>,
    evaluator: JoinHandle<()>,
}

impl OwnerSession {
    async fn start(
        owner_id: &str,
        collectors: Vec<Box<dyn Collector>>,
        settings: &Settings,
        store: Arc<Store>,
        risk: RiskEngine,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let now = Utc::now();
        let mut engine = AssessmentEngine::new(owner_id, settings, store.clone(), risk, notifier);
        if let Err(e) = engine.restore(now) {
            log::error!("[Supervisor] {}: failed to restore state: {}", owner_id, e);
        }
        let engine = Arc::new(Mutex::new(engine));

        let initial = store.load_snapshot(owner_id).unwrap_or_else(|e| {
            log::error!("[Supervisor] {}: failed to load snapshot: {}", owner_id, e);
            None
        });
        let orchestrator = Orchestrator::start(
            owner_id,
            collectors,
            &settings.collection,
            store,
            initial.unwrap_or_default(),
        );

        let (assessment_tx, _) = watch::channel(None);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let evaluator = tokio::spawn(run_evaluator(
            owner_id.to_string(),
            orchestrator.subscribe(),
            engine.clone(),
            assessment_tx.clone(),
            shutdown_rx,
        ));

        log::info!("[Supervisor] {}: session started", owner_id);
        Self {
            owner_id: owner_id.to_string(),
            orchestrator,
            engine,
            assessments: assessment_tx,
            shutdown: shutdown_tx,
            evaluator,
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn latest_snapshot(&self) -> Option<HealthSnapshot> {
        self.orchestrator.latest().map(|u| u.snapshot)
    }

    pub fn latest_assessment(&self) -> Option<Assessment> {
        self.assessments.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Assessment>> {
        self.assessments.subscribe()
    }

    pub async fn learned_pattern(&self) -> EngineResult<LearnedPattern> {
        let mut engine = self.engine.lock().await;
        engine.learned_pattern(Utc::now()).cloned()
    }

    /// Record an attack against the current merged snapshot and re-evaluate
    /// right away so the headache phase is published without waiting for
    /// the next reading.
    pub async fn confirm_migraine(
        &self,
        severity: u8,
        symptoms: Vec<String>,
    ) -> EngineResult<MigraineEvent> {
        let now = Utc::now();
        let latest = self.orchestrator.latest();
        let mut engine = self.engine.lock().await;
        let event = engine.confirm_migraine(
            severity,
            symptoms,
            latest.as_ref().map(|u| u.snapshot.clone()),
            now,
        )?;
        if let Some(update) = latest {
            let assessment = engine.evaluate(&update, now).await;
            self.assessments.send_replace(Some(assessment));
        }
        Ok(event)
    }

    pub async fn resolve_migraine(
        &self,
        event_id: &str,
        resolved_at: DateTime<Utc>,
    ) -> EngineResult<MigraineEvent> {
        self.engine
            .lock()
            .await
            .resolve_migraine(event_id, resolved_at)
    }

    async fn stop(self) {
        let _ = self.shutdown.send(true);
        self.orchestrator.stop().await;
        if let Err(e) = self.evaluator.await {
            log::error!("[Supervisor] {}: evaluator ended abnormally: {}", self.owner_id, e);
        }
        log::info!("[Supervisor] {}: session stopped", self.owner_id);
    }
}

async fn run_evaluator(
    owner_id: String,
    mut updates: watch::Receiver<Option<SnapshotUpdate>>,
    engine: Arc<Mutex<AssessmentEngine>>,
    assessments: watch::Sender<Option<Assessment>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        // Immutable copy: merges continue while this snapshot is evaluated.
        let update = updates.borrow_and_update().clone();
        let Some(update) = update else {
            continue;
        };
        let assessment = engine.lock().await.evaluate(&update, Utc::now()).await;
        log::debug!(
            "[Supervisor] {}: risk {} phase {:?}",
            owner_id,
            assessment.risk.risk_score,
            assessment.phase.phase
        );
        assessments.send_replace(Some(assessment));
    }
}

/// Owns the shared collaborators and every active owner session.
pub struct Supervisor {
    store: Arc<Store>,
    settings: Settings,
    risk: RiskEngine,
    notifier: Arc<dyn Notifier>,
    sessions: HashMap<String, OwnerSession>,
    suspended: Vec<String>,
}

impl Supervisor {
    pub fn new(
        store: Arc<Store>,
        settings: Settings,
        reasoning: Option<Arc<dyn ReasoningClient>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let risk = RiskEngine::new(reasoning, Duration::from_secs(settings.ai.timeout_secs));
        Self {
            store,
            settings,
            risk,
            notifier,
            sessions: HashMap::new(),
            suspended: Vec::new(),
        }
    }

    /// Build the reasoning client and notifier the settings ask for.
    pub fn from_settings(store: Arc<Store>, settings: Settings) -> EngineResult<Self> {
        settings.validate()?;
        let reasoning = LlmReasoningClient::from_settings(&settings.ai)
            .map(|client| Arc::new(client) as Arc<dyn ReasoningClient>);
        if reasoning.is_none() {
            log::info!("[Supervisor] Reasoning service disabled, using rule-based risk");
        }
        let notifier: Arc<dyn Notifier> = match settings.notifications.webhook_url.as_deref() {
            Some(url) if !url.trim().is_empty() => Arc::new(WebhookNotifier::new(
                url.trim(),
                Duration::from_secs(WEBHOOK_TIMEOUT_SECS),
            )?),
            _ => Arc::new(LogNotifier),
        };
        Ok(Self::new(store, settings, reasoning, notifier))
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn session(&self, owner_id: &str) -> Option<&OwnerSession> {
        self.sessions.get(owner_id)
    }

    pub fn is_suspended(&self, owner_id: &str) -> bool {
        self.suspended.iter().any(|o| o == owner_id)
    }

    pub async fn start_session(
        &mut self,
        owner_id: &str,
        collectors: Vec<Box<dyn Collector>>,
    ) -> EngineResult<&OwnerSession> {
        if owner_id.trim().is_empty() {
            return Err(EngineError::InvalidInput("owner id is empty".to_string()));
        }
        if let Some(previous) = self.sessions.remove(owner_id) {
            log::warn!("[Supervisor] {}: restarting active session", owner_id);
            previous.stop().await;
        }
        self.suspended.retain(|o| o != owner_id);

        let session = OwnerSession::start(
            owner_id,
            collectors,
            &self.settings,
            self.store.clone(),
            self.risk.clone(),
            self.notifier.clone(),
        )
        .await;
        Ok(self.sessions.entry(owner_id.to_string()).or_insert(session))
    }

    pub async fn end_session(&mut self, owner_id: &str) -> bool {
        self.suspended.retain(|o| o != owner_id);
        match self.sessions.remove(owner_id) {
            Some(session) => {
                session.stop().await;
                true
            }
            None => false,
        }
    }

    /// Cancel collection but remember the owner so it can be resumed.
    pub async fn suspend_session(&mut self, owner_id: &str) -> bool {
        match self.sessions.remove(owner_id) {
            Some(session) => {
                session.stop().await;
                self.suspended.push(owner_id.to_string());
                log::info!("[Supervisor] {}: session suspended", owner_id);
                true
            }
            None => false,
        }
    }

    /// Restart a suspended session from scratch with fresh collectors.
    pub async fn resume_session(
        &mut self,
        owner_id: &str,
        collectors: Vec<Box<dyn Collector>>,
    ) -> EngineResult<&OwnerSession> {
        if !self.is_suspended(owner_id) {
            return Err(EngineError::InvalidInput(format!(
                "session {} is not suspended",
                owner_id
            )));
        }
        self.start_session(owner_id, collectors).await
    }

    pub async fn shutdown(&mut self) {
        let sessions: Vec<OwnerSession> = self.sessions.drain().map(|(_, s)| s).collect();
        join_all(sessions.into_iter().map(OwnerSession::stop)).await;
        self.suspended.clear();
        log::info!("[Supervisor] All sessions stopped");
    }
}
