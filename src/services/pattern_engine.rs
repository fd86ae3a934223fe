use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::database::Store;
use crate::error::EngineResult;
use crate::models::{
    Feature, FeatureStats, LearnedPattern, LearningSettings, MigraineEvent, INSUFFICIENT_HISTORY,
};

/// Aggregate onset snapshots into per-feature statistics.
///
/// Events without a snapshot are skipped entirely; a feature missing from a
/// snapshot is skipped for that event only. The result does not depend on
/// event order.
pub fn build_pattern(
    owner_id: &str,
    events: &[MigraineEvent],
    min_events: usize,
    now: DateTime<Utc>,
) -> LearnedPattern {
    let mut features: BTreeMap<Feature, FeatureStats> = BTreeMap::new();
    let mut usable_events = 0;

    for snapshot in events.iter().filter_map(|e| e.snapshot.as_ref()) {
        usable_events += 1;
        for feature in Feature::ALL {
            if let Some(value) = feature.read(snapshot) {
                features
                    .entry(feature)
                    .and_modify(|stats| stats.add(value))
                    .or_insert_with(|| FeatureStats::from_value(value));
            }
        }
    }

    let valid = usable_events >= min_events;
    LearnedPattern {
        owner_id: owner_id.to_string(),
        events_considered: events.len(),
        usable_events,
        features,
        valid,
        reason: (!valid).then(|| INSUFFICIENT_HISTORY.to_string()),
        computed_at: now,
    }
}

/// Loads an owner's recent events and learns their pre-migraine pattern.
pub struct ThresholdLearner {
    settings: LearningSettings,
}

impl ThresholdLearner {
    pub fn new(settings: LearningSettings) -> Self {
        Self { settings }
    }

    pub fn min_events(&self) -> usize {
        self.settings.min_events
    }

    pub fn learn(&self, store: &Store, owner_id: &str, now: DateTime<Utc>) -> EngineResult<LearnedPattern> {
        let events = store.recent_events(owner_id, self.settings.max_events)?;
        let pattern = build_pattern(owner_id, &events, self.settings.min_events, now);
        log::info!(
            "[PatternEngine] {}: learned from {}/{} events (valid: {})",
            owner_id,
            pattern.usable_events,
            pattern.events_considered,
            pattern.valid
        );
        Ok(pattern)
    }
}
