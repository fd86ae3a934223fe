use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::HealthSnapshot;

/// Snapshot metrics tracked by the threshold learner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Hrv,
    HeartRate,
    StressLevel,
    SleepQuality,
    SleepHours,
    ScreenTime,
    Pressure,
    Temperature,
    Humidity,
}

impl Feature {
    pub const ALL: [Feature; 9] = [
        Feature::Hrv,
        Feature::HeartRate,
        Feature::StressLevel,
        Feature::SleepQuality,
        Feature::SleepHours,
        Feature::ScreenTime,
        Feature::Pressure,
        Feature::Temperature,
        Feature::Humidity,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Feature::Hrv => "hrv",
            Feature::HeartRate => "heart_rate",
            Feature::StressLevel => "stress_level",
            Feature::SleepQuality => "sleep_quality",
            Feature::SleepHours => "sleep_hours",
            Feature::ScreenTime => "screen_time_minutes",
            Feature::Pressure => "pressure",
            Feature::Temperature => "temperature",
            Feature::Humidity => "humidity",
        }
    }

    pub fn read(&self, snapshot: &HealthSnapshot) -> Option<f64> {
        match self {
            Feature::Hrv => snapshot.hrv,
            Feature::HeartRate => snapshot.heart_rate,
            Feature::StressLevel => snapshot.stress_level,
            Feature::SleepQuality => snapshot.sleep_quality,
            Feature::SleepHours => snapshot.sleep_hours,
            Feature::ScreenTime => snapshot.screen_time_minutes,
            Feature::Pressure => snapshot.pressure,
            Feature::Temperature => snapshot.temperature,
            Feature::Humidity => snapshot.humidity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureStats {
    pub count: u32,
    pub sum: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl FeatureStats {
    pub fn from_value(value: f64) -> Self {
        Self {
            count: 1,
            sum: value,
            mean: value,
            min: value,
            max: value,
        }
    }

    pub fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.mean = self.sum / self.count as f64;
    }
}

/// Per-owner summary of metrics captured at past migraine onsets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LearnedPattern {
    pub owner_id: String,
    pub events_considered: usize,
    pub usable_events: usize,
    pub features: BTreeMap<Feature, FeatureStats>,
    pub valid: bool,
    pub reason: Option<String>,
    pub computed_at: DateTime<Utc>,
}

impl LearnedPattern {
    pub fn mean(&self, feature: Feature) -> Option<f64> {
        self.features.get(&feature).map(|s| s.mean)
    }
}
