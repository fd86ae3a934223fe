//! Migraine phase state machine.
//!
//! Evaluation order for each new snapshot:
//! 1. an open (user-confirmed) event forces the headache phase;
//! 2. within the postdrome window after a resolution, lingering signals
//!    report postdrome;
//! 3. prodrome and aura are scored and the configured precedence picks one;
//! 4. otherwise the result is inactive with zero confidence.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

use super::baseline::{BaselineMetric, BaselineTracker};
use crate::models::{
    ActivityLevel, EarlyWarningSignal, HealthSnapshot, MigraineEvent, Phase,
    PhaseDetectionResult, PhasePrecedence, PhaseSettings,
};

/// Number of preceding cardio samples aura detection compares against.
const AURA_REFERENCE_SAMPLES: usize = 2;

/// Event context the classifier cannot infer from metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct PhaseContext<'a> {
    pub active_event: Option<&'a MigraineEvent>,
    pub last_resolved: Option<&'a MigraineEvent>,
}

/// Accumulates triggered signals into one phase result.
struct Detection {
    phase: Phase,
    confidence: u32,
    symptoms: Vec<String>,
    signals: Vec<EarlyWarningSignal>,
    at: DateTime<Utc>,
}

impl Detection {
    fn new(phase: Phase, at: DateTime<Utc>) -> Self {
        Self {
            phase,
            confidence: 0,
            symptoms: Vec::new(),
            signals: Vec::new(),
            at,
        }
    }

    fn fire(&mut self, weight: u8, symptom: &str, metric: &str, value: f64, deviation_pct: f64) {
        self.confidence += weight as u32;
        self.add_symptom(symptom);
        self.signals.push(EarlyWarningSignal {
            metric: metric.to_string(),
            value,
            deviation_pct,
            observed_at: self.at,
        });
    }

    fn add_symptom(&mut self, symptom: &str) {
        if !self.symptoms.iter().any(|s| s == symptom) {
            self.symptoms.push(symptom.to_string());
        }
    }

    fn finish(self) -> PhaseDetectionResult {
        let confidence = self.confidence.min(100) as u8;
        if confidence == 0 {
            return PhaseDetectionResult::inactive(self.at);
        }
        PhaseDetectionResult {
            phase: Some(self.phase),
            confidence,
            symptoms: self.symptoms,
            signals: self.signals,
            evaluated_at: self.at,
        }
    }
}

fn is_low_activity(snapshot: &HealthSnapshot, step_cutoff: u32) -> bool {
    match (snapshot.activity_level, snapshot.steps) {
        (Some(level), _) => level == ActivityLevel::Sedentary,
        (None, Some(steps)) => steps < step_cutoff,
        (None, None) => false,
    }
}

fn pct_change(current: f64, reference: f64) -> Option<f64> {
    (reference > 0.0).then(|| (current - reference) / reference * 100.0)
}

/// Pick the reported phase from independently scored prodrome and aura
/// results. Each must strictly exceed its own threshold.
pub fn select_phase(
    prodrome: PhaseDetectionResult,
    aura: PhaseDetectionResult,
    settings: &PhaseSettings,
    at: DateTime<Utc>,
) -> PhaseDetectionResult {
    let prodrome_hit = prodrome.confidence as f64 > settings.prodrome_threshold;
    let aura_hit = aura.confidence as f64 > settings.aura_threshold;

    match settings.precedence {
        PhasePrecedence::ProdromeFirst if prodrome_hit => prodrome,
        PhasePrecedence::ProdromeFirst if aura_hit => aura,
        PhasePrecedence::AuraFirst if aura_hit => aura,
        PhasePrecedence::AuraFirst if prodrome_hit => prodrome,
        _ => PhaseDetectionResult::inactive(at),
    }
}

pub struct PhaseClassifier {
    owner_id: String,
    settings: PhaseSettings,
    recent_cardio: VecDeque<HealthSnapshot>,
    current: Option<Phase>,
}

impl PhaseClassifier {
    pub fn new(owner_id: &str, settings: PhaseSettings) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            settings,
            recent_cardio: VecDeque::with_capacity(AURA_REFERENCE_SAMPLES + 1),
            current: None,
        }
    }

    pub fn current_phase(&self) -> Option<Phase> {
        self.current
    }

    /// Classify a merged snapshot. `cardio_updated` marks snapshots produced
    /// by a fresh cardio reading, which feed the short aura window.
    pub fn classify(
        &mut self,
        snapshot: &HealthSnapshot,
        baseline: &BaselineTracker,
        context: PhaseContext<'_>,
        cardio_updated: bool,
        now: DateTime<Utc>,
    ) -> PhaseDetectionResult {
        let result = if let Some(event) = context.active_event {
            self.headache(snapshot, baseline, event, now)
        } else {
            let postdrome = context
                .last_resolved
                .map(|event| self.postdrome(snapshot, baseline, event, now))
                .filter(PhaseDetectionResult::is_active);

            match postdrome {
                Some(result) => result,
                None => {
                    let prodrome = self.prodrome(snapshot, baseline, now);
                    let aura = self.aura(snapshot, now);
                    select_phase(prodrome, aura, &self.settings, now)
                }
            }
        };

        if cardio_updated {
            self.recent_cardio.push_back(snapshot.clone());
            while self.recent_cardio.len() > AURA_REFERENCE_SAMPLES {
                self.recent_cardio.pop_front();
            }
        }

        if result.phase != self.current {
            log::info!(
                "[PhaseClassifier] {}: {:?} -> {:?} (confidence {})",
                self.owner_id,
                self.current,
                result.phase,
                result.confidence
            );
            self.current = result.phase;
        }
        result
    }

    /// Slow drift away from the personal baseline (6-48h before onset).
    pub fn prodrome(
        &self,
        snapshot: &HealthSnapshot,
        baseline: &BaselineTracker,
        now: DateTime<Utc>,
    ) -> PhaseDetectionResult {
        let s = &self.settings;
        let mut detection = Detection::new(Phase::Prodrome, now);

        if let Some(hrv) = snapshot.hrv {
            if let Some(dev) = baseline.deviation_pct(BaselineMetric::Hrv, hrv) {
                if dev < -s.prodrome_hrv_drop_pct {
                    detection.fire(s.prodrome_hrv_weight, "fatigue", "hrv", hrv, dev);
                }
            }
        }

        if let Some(stress) = snapshot.stress_level {
            if let Some(dev) = baseline.deviation_pct(BaselineMetric::StressLevel, stress) {
                if dev > s.prodrome_stress_rise_pct {
                    detection.fire(s.prodrome_stress_weight, "irritability", "stress_level", stress, dev);
                }
            }
        }

        let quality_drop = snapshot.sleep_quality.and_then(|q| {
            baseline
                .deviation_pct(BaselineMetric::SleepQuality, q)
                .filter(|dev| *dev < -s.prodrome_sleep_quality_drop_pct)
                .map(|dev| (q, dev))
        });
        let short_sleep = snapshot
            .sleep_hours
            .filter(|h| *h < s.prodrome_short_sleep_hours);
        if let Some((quality, dev)) = quality_drop {
            detection.fire(s.prodrome_sleep_weight, "poor_sleep", "sleep_quality", quality, dev);
        } else if let Some(hours) = short_sleep {
            let dev = pct_change(hours, s.prodrome_short_sleep_hours).unwrap_or(0.0);
            detection.fire(s.prodrome_sleep_weight, "poor_sleep", "sleep_hours", hours, dev);
        }

        if let Some(screen) = snapshot.screen_time_minutes {
            if let Some(base) = baseline.average(BaselineMetric::ScreenTime) {
                if base > 0.0 && screen > base * s.prodrome_screen_time_ratio {
                    let dev = pct_change(screen, base).unwrap_or(0.0);
                    detection.fire(
                        s.prodrome_screen_weight,
                        "light_sensitivity",
                        "screen_time_minutes",
                        screen,
                        dev,
                    );
                }
            }
        }

        if is_low_activity(snapshot, s.low_activity_steps) {
            let steps = snapshot.steps.unwrap_or(0) as f64;
            let dev = pct_change(steps, s.low_activity_steps as f64).unwrap_or(0.0);
            detection.fire(s.prodrome_low_activity_weight, "low_energy", "steps", steps, dev);
        }

        detection.finish()
    }

    /// Sudden change against the immediately preceding cardio samples
    /// (20-60 min before onset).
    pub fn aura(&self, snapshot: &HealthSnapshot, now: DateTime<Utc>) -> PhaseDetectionResult {
        let s = &self.settings;
        let mut detection = Detection::new(Phase::Aura, now);

        let reference = |read: fn(&HealthSnapshot) -> Option<f64>| -> Option<f64> {
            let values: Vec<f64> = self.recent_cardio.iter().filter_map(read).collect();
            (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
        };

        if let (Some(hrv), Some(previous)) = (snapshot.hrv, reference(|s| s.hrv)) {
            if let Some(dev) = pct_change(hrv, previous) {
                if dev < -s.aura_hrv_drop_pct {
                    detection.fire(s.aura_hrv_weight, "visual_disturbance", "hrv", hrv, dev);
                }
            }
        }

        if let (Some(hr), Some(previous)) = (snapshot.heart_rate, reference(|s| s.heart_rate)) {
            if let Some(dev) = pct_change(hr, previous) {
                if dev > s.aura_heart_rate_rise_pct {
                    detection.fire(s.aura_heart_rate_weight, "dizziness", "heart_rate", hr, dev);
                }
            }
        }

        if let (Some(stress), Some(previous)) =
            (snapshot.stress_level, reference(|s| s.stress_level))
        {
            if stress - previous >= s.aura_stress_jump_points {
                let dev = pct_change(stress, previous).unwrap_or(100.0);
                detection.fire(s.aura_stress_weight, "tingling", "stress_level", stress, dev);
            }
        }

        detection.finish()
    }

    /// User-confirmed attack. Passive signals only enrich the symptom list.
    pub fn headache(
        &self,
        snapshot: &HealthSnapshot,
        baseline: &BaselineTracker,
        event: &MigraineEvent,
        now: DateTime<Utc>,
    ) -> PhaseDetectionResult {
        let s = &self.settings;
        let mut detection = Detection::new(Phase::Headache, now);
        detection.confidence = 100;
        for symptom in &event.symptoms {
            detection.add_symptom(symptom);
        }

        let stress_elevated = snapshot.stress_level.and_then(|stress| {
            match baseline.deviation_pct(BaselineMetric::StressLevel, stress) {
                Some(dev) => (dev > s.headache_stress_rise_pct).then_some((stress, dev)),
                None => (stress >= s.headache_stress_level).then_some((stress, 0.0)),
            }
        });
        if let Some((stress, dev)) = stress_elevated {
            detection.add_symptom("light_sensitivity");
            detection.add_symptom("sound_sensitivity");
            detection.signals.push(EarlyWarningSignal {
                metric: "stress_level".to_string(),
                value: stress,
                deviation_pct: dev,
                observed_at: now,
            });
        }

        let heart_rate_elevated = snapshot.heart_rate.and_then(|hr| {
            match baseline.deviation_pct(BaselineMetric::HeartRate, hr) {
                Some(dev) => (dev > s.headache_heart_rate_rise_pct).then_some((hr, dev)),
                None => (hr >= s.headache_heart_rate_bpm).then_some((hr, 0.0)),
            }
        });
        if let Some((hr, dev)) = heart_rate_elevated {
            if is_low_activity(snapshot, s.low_activity_steps) {
                detection.add_symptom("nausea");
                detection.signals.push(EarlyWarningSignal {
                    metric: "heart_rate".to_string(),
                    value: hr,
                    deviation_pct: dev,
                    observed_at: now,
                });
            }
        }

        detection.finish()
    }

    /// Recovery signals in the window after a resolved attack.
    pub fn postdrome(
        &self,
        snapshot: &HealthSnapshot,
        baseline: &BaselineTracker,
        event: &MigraineEvent,
        now: DateTime<Utc>,
    ) -> PhaseDetectionResult {
        let s = &self.settings;
        let Some(resolved_at) = event.resolved_at else {
            return PhaseDetectionResult::inactive(now);
        };
        let elapsed = now - resolved_at;
        if elapsed < Duration::zero() || elapsed > s.postdrome_window() {
            return PhaseDetectionResult::inactive(now);
        }

        let mut detection = Detection::new(Phase::Postdrome, now);

        if let Some(hrv) = snapshot.hrv {
            if let Some(dev) = baseline.deviation_pct(BaselineMetric::Hrv, hrv) {
                if dev < -s.postdrome_hrv_drop_pct {
                    detection.fire(s.postdrome_hrv_weight, "fatigue", "hrv", hrv, dev);
                }
            }
        }

        if let Some(stress) = snapshot.stress_level {
            if let Some(dev) = baseline.deviation_pct(BaselineMetric::StressLevel, stress) {
                if dev > s.postdrome_stress_rise_pct {
                    detection.fire(
                        s.postdrome_stress_weight,
                        "difficulty_concentrating",
                        "stress_level",
                        stress,
                        dev,
                    );
                }
            }
        }

        if let Some(screen) = snapshot.screen_time_minutes {
            if let Some(base) = baseline.average(BaselineMetric::ScreenTime) {
                if base > 0.0 && screen > base * s.postdrome_screen_time_ratio {
                    let dev = pct_change(screen, base).unwrap_or(0.0);
                    detection.fire(
                        s.postdrome_screen_weight,
                        "light_sensitivity",
                        "screen_time_minutes",
                        screen,
                        dev,
                    );
                }
            }
        }

        detection.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 3, 14, 0, 0).unwrap()
    }

    fn settings() -> PhaseSettings {
        PhaseSettings {
            baseline_min_samples: 3,
            ..Default::default()
        }
    }

    /// Baseline: HRV 60, HR 65, stress 40, sleep quality 80, screen 200 min.
    fn baseline() -> BaselineTracker {
        let mut tracker = BaselineTracker::new(&settings());
        let normal = HealthSnapshot {
            hrv: Some(60.0),
            heart_rate: Some(65.0),
            stress_level: Some(40.0),
            sleep_quality: Some(80.0),
            screen_time_minutes: Some(200.0),
            ..Default::default()
        };
        for i in 0..5 {
            tracker.observe(&normal, now() - Duration::hours(10 - i));
        }
        tracker
    }

    fn result(phase: Phase, confidence: u8) -> PhaseDetectionResult {
        PhaseDetectionResult {
            phase: Some(phase),
            confidence,
            symptoms: vec![],
            signals: vec![],
            evaluated_at: now(),
        }
    }

    #[test]
    fn prodrome_sums_triggered_weights() {
        let classifier = PhaseClassifier::new("ana", settings());
        let snapshot = HealthSnapshot {
            hrv: Some(45.0),          // -25%
            stress_level: Some(55.0), // +37.5%
            sleep_quality: Some(78.0),
            sleep_hours: Some(7.5),
            screen_time_minutes: Some(320.0), // 1.6x
            activity_level: Some(ActivityLevel::Moderate),
            ..Default::default()
        };
        let result = classifier.prodrome(&snapshot, &baseline(), now());
        assert_eq!(result.phase, Some(Phase::Prodrome));
        assert_eq!(result.confidence, 65);
        assert_eq!(
            result.symptoms,
            vec!["fatigue", "irritability", "light_sensitivity"]
        );
        assert_eq!(result.signals.len(), 3);
        assert!((result.signals[0].deviation_pct + 25.0).abs() < 1e-9);
    }

    #[test]
    fn prodrome_caps_at_hundred_and_counts_short_sleep() {
        let classifier = PhaseClassifier::new("ana", settings());
        let snapshot = HealthSnapshot {
            hrv: Some(40.0),
            stress_level: Some(70.0),
            sleep_quality: Some(75.0),
            sleep_hours: Some(4.0),
            screen_time_minutes: Some(400.0),
            activity_level: Some(ActivityLevel::Sedentary),
            ..Default::default()
        };
        let result = classifier.prodrome(&snapshot, &baseline(), now());
        assert_eq!(result.confidence, 100);
        assert!(result.signals.iter().any(|s| s.metric == "sleep_hours"));
        assert!(result.symptoms.contains(&"low_energy".to_string()));
    }

    #[test]
    fn no_baseline_means_no_relative_signals() {
        let classifier = PhaseClassifier::new("ana", settings());
        let empty = BaselineTracker::new(&settings());
        let snapshot = HealthSnapshot {
            hrv: Some(20.0),
            stress_level: Some(95.0),
            ..Default::default()
        };
        let result = classifier.prodrome(&snapshot, &empty, now());
        assert!(!result.is_active());
        assert_eq!(result.phase, None);
    }

    #[test]
    fn aura_compares_with_preceding_samples() {
        let mut classifier = PhaseClassifier::new("ana", settings());
        let tracker = baseline();
        let steady = HealthSnapshot {
            hrv: Some(60.0),
            heart_rate: Some(66.0),
            stress_level: Some(35.0),
            ..Default::default()
        };
        for i in 0..2 {
            classifier.classify(
                &steady,
                &tracker,
                PhaseContext::default(),
                true,
                now() + Duration::seconds(5 * i),
            );
        }

        let spike = HealthSnapshot {
            hrv: Some(45.0),        // -25%
            heart_rate: Some(80.0), // +21%
            stress_level: Some(70.0),
            ..Default::default()
        };
        let aura = classifier.aura(&spike, now());
        assert_eq!(aura.phase, Some(Phase::Aura));
        assert_eq!(aura.confidence, 90);

        let result = classifier.classify(&spike, &tracker, PhaseContext::default(), true, now());
        // Prodrome also fires (HRV -25%, stress +75%) at 55: below its threshold
        assert_eq!(result.phase, Some(Phase::Aura));
        assert_eq!(classifier.current_phase(), Some(Phase::Aura));
    }

    #[test]
    fn prodrome_wins_when_both_exceed_thresholds() {
        let picked = select_phase(
            result(Phase::Prodrome, 65),
            result(Phase::Aura, 55),
            &settings(),
            now(),
        );
        assert_eq!(picked.phase, Some(Phase::Prodrome));
        assert_eq!(picked.confidence, 65);
    }

    #[test]
    fn precedence_is_tunable() {
        let aura_first = PhaseSettings {
            precedence: PhasePrecedence::AuraFirst,
            ..settings()
        };
        let picked = select_phase(
            result(Phase::Prodrome, 65),
            result(Phase::Aura, 55),
            &aura_first,
            now(),
        );
        assert_eq!(picked.phase, Some(Phase::Aura));
    }

    #[test]
    fn thresholds_are_exclusive() {
        let picked = select_phase(
            result(Phase::Prodrome, 60),
            result(Phase::Aura, 50),
            &settings(),
            now(),
        );
        assert!(!picked.is_active());
        assert_eq!(picked.confidence, 0);
    }

    #[test]
    fn confirmed_event_forces_headache_and_enriches() {
        let mut classifier = PhaseClassifier::new("ana", settings());
        let event =
            MigraineEvent::new("ana", now(), 7, vec!["throbbing".into()], None).unwrap();
        let snapshot = HealthSnapshot {
            hrv: Some(62.0),
            heart_rate: Some(80.0),
            stress_level: Some(60.0),
            activity_level: Some(ActivityLevel::Sedentary),
            ..Default::default()
        };
        let context = PhaseContext {
            active_event: Some(&event),
            last_resolved: None,
        };
        let result = classifier.classify(&snapshot, &baseline(), context, false, now());
        assert_eq!(result.phase, Some(Phase::Headache));
        assert_eq!(result.confidence, 100);
        assert_eq!(
            result.symptoms,
            vec!["throbbing", "light_sensitivity", "sound_sensitivity", "nausea"]
        );
    }

    #[test]
    fn headache_without_passive_signals_keeps_reported_symptoms() {
        let classifier = PhaseClassifier::new("ana", settings());
        let event = MigraineEvent::new("ana", now(), 4, vec!["aura".into()], None).unwrap();
        let result = classifier.headache(&HealthSnapshot::default(), &baseline(), &event, now());
        assert_eq!(result.phase, Some(Phase::Headache));
        assert_eq!(result.symptoms, vec!["aura"]);
    }

    #[test]
    fn headache_enrichment_cutoffs_are_tunable() {
        let event = MigraineEvent::new("ana", now(), 6, vec![], None).unwrap();
        let snapshot = HealthSnapshot {
            heart_rate: Some(85.0),
            stress_level: Some(65.0),
            activity_level: Some(ActivityLevel::Sedentary),
            ..Default::default()
        };
        let empty = BaselineTracker::new(&settings());

        let stock = PhaseClassifier::new("ana", settings());
        assert!(stock.headache(&snapshot, &empty, &event, now()).symptoms.is_empty());

        let tuned = PhaseClassifier::new(
            "ana",
            PhaseSettings {
                headache_stress_level: 60.0,
                headache_heart_rate_bpm: 80.0,
                ..settings()
            },
        );
        assert_eq!(
            tuned.headache(&snapshot, &empty, &event, now()).symptoms,
            vec!["light_sensitivity", "sound_sensitivity", "nausea"]
        );

        // 80 bpm is 23% over the 65 bpm baseline
        let strict = PhaseClassifier::new(
            "ana",
            PhaseSettings {
                headache_heart_rate_rise_pct: 30.0,
                ..settings()
            },
        );
        let elevated = HealthSnapshot {
            heart_rate: Some(80.0),
            ..snapshot
        };
        let result = strict.headache(&elevated, &baseline(), &event, now());
        assert!(!result.symptoms.contains(&"nausea".to_string()));
    }

    #[test]
    fn postdrome_only_inside_window() {
        let mut classifier = PhaseClassifier::new("ana", settings());
        let mut event =
            MigraineEvent::new("ana", now() - Duration::hours(8), 6, vec![], None).unwrap();
        event.resolve(now() - Duration::hours(2)).unwrap();
        let drained = HealthSnapshot {
            hrv: Some(50.0),          // -16.7%
            stress_level: Some(46.0), // +15%
            screen_time_minutes: Some(180.0),
            ..Default::default()
        };
        let context = PhaseContext {
            active_event: None,
            last_resolved: Some(&event),
        };

        let result = classifier.classify(&drained, &baseline(), context, false, now());
        assert_eq!(result.phase, Some(Phase::Postdrome));
        assert_eq!(result.confidence, 75);
        assert_eq!(result.symptoms, vec!["fatigue", "difficulty_concentrating"]);

        let later = now() + Duration::hours(23);
        let result = classifier.classify(&drained, &baseline(), context, false, later);
        assert_ne!(result.phase, Some(Phase::Postdrome));

        let recovered = HealthSnapshot {
            hrv: Some(61.0),
            stress_level: Some(39.0),
            ..Default::default()
        };
        let result = classifier.postdrome(&recovered, &baseline(), &event, now());
        assert_eq!(result.confidence, 0);
        assert!(!result.is_active());
    }
}
