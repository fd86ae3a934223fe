use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use super::alert_gate::AlertGate;
use super::baseline::BaselineTracker;
use super::notifier::{deliver, Notifier};
use super::orchestrator::SnapshotUpdate;
use super::pattern_engine::ThresholdLearner;
use super::phase_classifier::{PhaseClassifier, PhaseContext};
use super::risk_cache::RiskCache;
use super::risk_engine::{ReasoningContext, RiskEngine};
use super::similarity::SimilarityScorer;
use crate::database::Store;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    Assessment, HealthSnapshot, LearnedPattern, MetricSource, MigraineEvent, Settings,
    SimilarityOutcome,
};

/// Evaluates merged snapshots for one owner: phase, similarity to past
/// attacks, cached risk and alerting.
pub struct AssessmentEngine {
    owner_id: String,
    store: Arc<Store>,
    learner: ThresholdLearner,
    scorer: SimilarityScorer,
    baseline: BaselineTracker,
    baseline_window: Duration,
    classifier: PhaseClassifier,
    risk: RiskEngine,
    cache: RiskCache,
    gate: AlertGate,
    notifier: Arc<dyn Notifier>,
    pattern: Option<LearnedPattern>,
}

impl AssessmentEngine {
    pub fn new(
        owner_id: &str,
        settings: &Settings,
        store: Arc<Store>,
        risk: RiskEngine,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            learner: ThresholdLearner::new(settings.learning.clone()),
            scorer: SimilarityScorer::new(&settings.learning),
            baseline: BaselineTracker::new(&settings.phase),
            baseline_window: settings.phase.baseline_window(),
            classifier: PhaseClassifier::new(owner_id, settings.phase.clone()),
            cache: RiskCache::new(owner_id, settings.risk.cache_ttl_secs, store.clone()),
            gate: AlertGate::new(owner_id, settings.notifications.clone(), store.clone()),
            store,
            risk,
            notifier,
            pattern: None,
        }
    }

    /// Reload persisted cache and alert state and rebuild the baseline from
    /// sampled history.
    pub fn restore(&mut self, now: DateTime<Utc>) -> EngineResult<()> {
        self.cache.restore();
        self.gate.restore();
        let history = self.store.history_since(&self.owner_id, now - self.baseline_window)?;
        self.baseline.seed(&history);
        log::info!(
            "[Engine] {}: baseline seeded from {} samples",
            self.owner_id,
            history.len()
        );
        Ok(())
    }

    pub fn baseline(&self) -> &BaselineTracker {
        &self.baseline
    }

    pub fn alert_gate(&self) -> &AlertGate {
        &self.gate
    }

    /// Learned pattern, recomputed only after invalidation.
    pub fn learned_pattern(&mut self, now: DateTime<Utc>) -> EngineResult<&LearnedPattern> {
        let pattern = match self.pattern.take() {
            Some(pattern) => pattern,
            None => self.learner.learn(&self.store, &self.owner_id, now)?,
        };
        Ok(self.pattern.insert(pattern))
    }

    /// Drop everything derived from the event history.
    pub fn invalidate(&mut self) {
        self.pattern = None;
        self.cache.invalidate();
    }

    /// Record a user-confirmed attack against the given snapshot. Only one
    /// attack can be open at a time.
    pub fn confirm_migraine(
        &mut self,
        severity: u8,
        symptoms: Vec<String>,
        snapshot: Option<HealthSnapshot>,
        now: DateTime<Utc>,
    ) -> EngineResult<MigraineEvent> {
        let event = MigraineEvent::new(&self.owner_id, now, severity, symptoms, snapshot)?;
        if let Some(open) = self.store.active_event(&self.owner_id)? {
            return Err(EngineError::InvalidInput(format!(
                "migraine {} is still in progress; resolve it first",
                open.id
            )));
        }
        self.store.append_event(&event)?;
        self.invalidate();
        log::info!(
            "[Engine] {}: migraine confirmed (severity {})",
            self.owner_id,
            severity
        );
        Ok(event)
    }

    pub fn resolve_migraine(
        &mut self,
        event_id: &str,
        resolved_at: DateTime<Utc>,
    ) -> EngineResult<MigraineEvent> {
        let event = self.store.resolve_event(&self.owner_id, event_id, resolved_at)?;
        self.cache.invalidate();
        log::info!(
            "[Engine] {}: migraine {} resolved after {} min",
            self.owner_id,
            event.id,
            event.duration_minutes.unwrap_or(0)
        );
        Ok(event)
    }

    fn similarity(&mut self, snapshot: &HealthSnapshot, now: DateTime<Utc>) -> SimilarityOutcome {
        if let Err(e) = self.learned_pattern(now) {
            log::error!("[Engine] {}: pattern unavailable: {}", self.owner_id, e);
        }
        match &self.pattern {
            Some(pattern) => self.scorer.score(snapshot, pattern),
            None => SimilarityOutcome::InsufficientHistory {
                usable_events: 0,
                required: self.learner.min_events(),
            },
        }
    }

    /// Evaluate one published snapshot. Always yields an assessment: store or
    /// reasoning failures degrade to fallbacks instead of aborting.
    pub async fn evaluate(&mut self, update: &SnapshotUpdate, now: DateTime<Utc>) -> Assessment {
        let snapshot = update.snapshot.clone();

        let active = self.store.active_event(&self.owner_id).unwrap_or_else(|e| {
            log::error!("[Engine] {}: failed to load active event: {}", self.owner_id, e);
            None
        });
        let resolved = self.store.last_resolved_event(&self.owner_id).unwrap_or_else(|e| {
            log::error!("[Engine] {}: failed to load last event: {}", self.owner_id, e);
            None
        });
        let context = PhaseContext {
            active_event: active.as_ref(),
            last_resolved: resolved.as_ref(),
        };
        let phase = self.classifier.classify(
            &snapshot,
            &self.baseline,
            context,
            update.source == MetricSource::Cardio,
            now,
        );
        self.baseline.observe(&snapshot, now);

        let similarity = self.similarity(&snapshot, now);
        let reasoning_context = ReasoningContext::new(
            &self.owner_id,
            self.pattern.as_ref(),
            similarity.clone(),
            phase.clone(),
        );

        let risk_engine = &self.risk;
        let (risk, cached) = self
            .cache
            .get_or_compute(now, || risk_engine.analyze(&snapshot, &reasoning_context, now))
            .await;

        let mut alert_sent = false;
        if !cached {
            if let Some(notification) = self.gate.consider(&risk, now) {
                alert_sent = deliver(self.notifier.as_ref(), &self.owner_id, &notification).await;
            }
        }

        Assessment {
            owner_id: self.owner_id.clone(),
            snapshot,
            phase,
            similarity,
            risk,
            alert_sent,
            evaluated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Phase, RiskLevel};
    use crate::services::notifier::LogNotifier;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 9, 8, 0, 0).unwrap()
    }

    fn engine(store: Arc<Store>) -> AssessmentEngine {
        AssessmentEngine::new(
            "ana",
            &Settings::default(),
            store,
            RiskEngine::new(None, std::time::Duration::from_secs(5)),
            Arc::new(LogNotifier),
        )
    }

    fn update(snapshot: HealthSnapshot, sequence: u64) -> SnapshotUpdate {
        SnapshotUpdate {
            source: MetricSource::Cardio,
            snapshot,
            at: now(),
            sequence,
        }
    }

    fn stormy() -> HealthSnapshot {
        HealthSnapshot {
            hrv: Some(38.0),
            stress_level: Some(75.0),
            sleep_hours: Some(5.0),
            sleep_quality: Some(55.0),
            pressure: Some(1005.0),
            screen_time_minutes: Some(400.0),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn fallback_scenario_without_history() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut engine = engine(store);
        let assessment = engine.evaluate(&update(stormy(), 1), now()).await;

        assert_eq!(assessment.risk.risk_score, 100);
        assert_eq!(assessment.risk.risk_level, RiskLevel::Critical);
        assert!(assessment.risk.is_fallback());
        assert!(!assessment.similarity.match_found());
        assert_eq!(assessment.similarity.reason(), Some("insufficient history"));
        assert!(assessment.alert_sent);
    }

    #[tokio::test]
    async fn cached_risk_does_not_realert() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut engine = engine(store);
        let first = engine.evaluate(&update(stormy(), 1), now()).await;
        let calm = HealthSnapshot {
            hrv: Some(70.0),
            ..Default::default()
        };
        let second = engine
            .evaluate(&update(calm, 2), now() + Duration::minutes(1))
            .await;
        assert_eq!(second.risk, first.risk);
        assert!(!second.alert_sent);
    }

    #[tokio::test]
    async fn confirmation_invalidates_and_forces_headache() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut engine = engine(store.clone());
        engine.evaluate(&update(stormy(), 1), now()).await;
        assert!(engine.learned_pattern(now()).unwrap().usable_events == 0);

        let event = engine
            .confirm_migraine(7, vec!["Throbbing".into()], Some(stormy()), now())
            .unwrap();
        assert!(store.load_risk_entry("ana").unwrap().is_none());
        assert_eq!(engine.learned_pattern(now()).unwrap().usable_events, 1);

        let later = now() + Duration::minutes(1);
        let assessment = engine.evaluate(&update(stormy(), 2), later).await;
        assert_eq!(assessment.phase.phase, Some(Phase::Headache));
        assert_eq!(assessment.phase.symptoms[0], "throbbing");
        assert_eq!(assessment.risk.computed_at, later);

        let resolved = engine
            .resolve_migraine(&event.id, now() + Duration::hours(3))
            .unwrap();
        assert_eq!(resolved.duration_minutes, Some(180));
        assert!(engine.confirm_migraine(11, vec![], None, now()).is_err());
    }

    #[test]
    fn second_confirmation_needs_the_first_resolved() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut engine = engine(store.clone());
        let first = engine.confirm_migraine(5, vec![], None, now()).unwrap();

        let later = now() + Duration::hours(1);
        assert!(matches!(
            engine.confirm_migraine(6, vec![], None, later),
            Err(EngineError::InvalidInput(_))
        ));
        assert_eq!(store.recent_events("ana", 10).unwrap().len(), 1);

        engine.resolve_migraine(&first.id, later).unwrap();
        let second = engine.confirm_migraine(6, vec![], None, later).unwrap();
        assert_eq!(store.active_event("ana").unwrap().map(|e| e.id), Some(second.id));
    }

    #[test]
    fn cannot_resolve_another_owners_event() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let theirs = MigraineEvent::new("bo", now(), 7, vec![], None).unwrap();
        store.append_event(&theirs).unwrap();

        let mut engine = engine(store.clone());
        assert!(matches!(
            engine.resolve_migraine(&theirs.id, now() + Duration::hours(2)),
            Err(EngineError::EventNotFound(_))
        ));
        assert_eq!(
            store.active_event("bo").unwrap().map(|e| e.id),
            Some(theirs.id)
        );
    }
}
