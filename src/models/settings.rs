use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::MetricSource;
use crate::error::{EngineError, EngineResult};

/// Longest baseline or postdrome window accepted.
pub const MAX_WINDOW_HOURS: i64 = 366 * 24;
pub const MAX_COOLDOWN_MINUTES: i64 = 7 * 24 * 60;
pub const MAX_CACHE_TTL_SECS: u64 = 24 * 60 * 60;
pub const MAX_RETENTION_DAYS: i64 = 100 * 365;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub version: String,
    pub collection: CollectionSettings,
    pub learning: LearningSettings,
    pub phase: PhaseSettings,
    pub risk: RiskSettings,
    pub ai: AISettings,
    pub notifications: NotificationSettings,
    pub storage: StorageSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            collection: CollectionSettings::default(),
            learning: LearningSettings::default(),
            phase: PhaseSettings::default(),
            risk: RiskSettings::default(),
            ai: AISettings::default(),
            notifications: NotificationSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> EngineResult<()> {
        for source in MetricSource::ALL {
            if self.collection.interval_for(source).is_zero() {
                return Err(EngineError::Config(format!(
                    "{} interval must be greater than zero",
                    source
                )));
            }
        }
        if self.collection.collector_timeout_secs == 0 {
            return Err(EngineError::Config(
                "collector timeout must be greater than zero".to_string(),
            ));
        }
        if !(1..=MAX_CACHE_TTL_SECS).contains(&self.risk.cache_ttl_secs) {
            return Err(EngineError::Config(format!(
                "risk cache TTL must be within 1-{} seconds",
                MAX_CACHE_TTL_SECS
            )));
        }
        if self.learning.min_events == 0 || self.learning.max_events < self.learning.min_events {
            return Err(EngineError::Config(
                "learning window must hold at least min_events events".to_string(),
            ));
        }
        let percentages = [
            self.learning.match_threshold,
            self.phase.prodrome_threshold,
            self.phase.aura_threshold,
        ];
        if percentages.iter().any(|v| !(0.0..=100.0).contains(v)) {
            return Err(EngineError::Config(
                "thresholds must be within 0-100".to_string(),
            ));
        }
        if self.notifications.thresholds.iter().any(|t| *t > 100) {
            return Err(EngineError::Config(
                "alert thresholds must be within 0-100".to_string(),
            ));
        }
        if !(0..=MAX_COOLDOWN_MINUTES).contains(&self.notifications.cooldown_minutes) {
            return Err(EngineError::Config(format!(
                "alert cooldown must be within 0-{} minutes",
                MAX_COOLDOWN_MINUTES
            )));
        }
        if self.notifications.min_change == 0 {
            return Err(EngineError::Config(
                "alert min_change must be greater than zero".to_string(),
            ));
        }
        if !(0..=MAX_WINDOW_HOURS).contains(&self.phase.postdrome_window_hours) {
            return Err(EngineError::Config(format!(
                "postdrome window must be within 0-{} hours",
                MAX_WINDOW_HOURS
            )));
        }
        if !(1..=MAX_WINDOW_HOURS).contains(&self.phase.baseline_window_hours) {
            return Err(EngineError::Config(format!(
                "baseline window must be within 1-{} hours",
                MAX_WINDOW_HOURS
            )));
        }
        if !(0..=self.phase.baseline_window_hours * 3600)
            .contains(&self.phase.baseline_sample_interval_secs)
        {
            return Err(EngineError::Config(
                "baseline sample interval must be within the baseline window".to_string(),
            ));
        }
        if !(1..=MAX_RETENTION_DAYS).contains(&self.storage.retention_days) {
            return Err(EngineError::Config(format!(
                "retention must be within 1-{} days",
                MAX_RETENTION_DAYS
            )));
        }
        Ok(())
    }
}

fn bounded_hours(hours: i64) -> TimeDelta {
    TimeDelta::try_hours(hours.clamp(0, MAX_WINDOW_HOURS)).unwrap_or_else(TimeDelta::zero)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CollectionSettings {
    pub cardio_interval_secs: u64,
    pub phone_interval_secs: u64,
    pub weather_interval_secs: u64,
    pub sleep_interval_secs: u64,
    pub calendar_interval_secs: u64,
    pub collector_timeout_secs: u64,
    /// Minimum spacing of long-term history samples taken after cardio merges.
    pub cardio_history_interval_secs: u64,
    /// Directory the JSON feed collectors read from, relative to the data dir.
    pub feed_dir: String,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            cardio_interval_secs: 5,
            phone_interval_secs: 10 * 60,
            weather_interval_secs: 60 * 60,
            sleep_interval_secs: 30 * 60,
            calendar_interval_secs: 30 * 60,
            collector_timeout_secs: 20,
            cardio_history_interval_secs: 60,
            feed_dir: "feeds".to_string(),
        }
    }
}

impl CollectionSettings {
    pub fn interval_for(&self, source: MetricSource) -> Duration {
        let secs = match source {
            MetricSource::Cardio => self.cardio_interval_secs,
            MetricSource::Phone => self.phone_interval_secs,
            MetricSource::Weather => self.weather_interval_secs,
            MetricSource::Sleep => self.sleep_interval_secs,
            MetricSource::Calendar => self.calendar_interval_secs,
        };
        Duration::from_secs(secs)
    }

    pub fn collector_timeout(&self) -> Duration {
        Duration::from_secs(self.collector_timeout_secs)
    }

    /// Only the fast cardio channel is rate limited; slower channels are
    /// sampled on every update.
    pub fn history_interval_for(&self, source: MetricSource) -> Duration {
        match source {
            MetricSource::Cardio => Duration::from_secs(self.cardio_history_interval_secs),
            _ => Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LearningSettings {
    pub max_events: usize,
    pub min_events: usize,
    pub match_threshold: f64,
}

impl Default for LearningSettings {
    fn default() -> Self {
        Self {
            max_events: 50,
            min_events: 3,
            match_threshold: 70.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhasePrecedence {
    ProdromeFirst,
    AuraFirst,
}

/// Heuristic weights and cutoffs for phase detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhaseSettings {
    pub precedence: PhasePrecedence,
    pub prodrome_threshold: f64,
    pub aura_threshold: f64,

    pub prodrome_hrv_drop_pct: f64,
    pub prodrome_hrv_weight: u8,
    pub prodrome_stress_rise_pct: f64,
    pub prodrome_stress_weight: u8,
    pub prodrome_sleep_quality_drop_pct: f64,
    pub prodrome_short_sleep_hours: f64,
    pub prodrome_sleep_weight: u8,
    pub prodrome_screen_time_ratio: f64,
    pub prodrome_screen_weight: u8,
    pub prodrome_low_activity_weight: u8,
    /// Step count treated as low activity when no activity level is reported.
    pub low_activity_steps: u32,

    pub aura_hrv_drop_pct: f64,
    pub aura_hrv_weight: u8,
    pub aura_heart_rate_rise_pct: f64,
    pub aura_heart_rate_weight: u8,
    pub aura_stress_jump_points: f64,
    pub aura_stress_weight: u8,

    /// Stress rise over baseline that adds light and sound sensitivity
    /// during an attack.
    pub headache_stress_rise_pct: f64,
    /// Absolute stress level used instead while no baseline exists.
    pub headache_stress_level: f64,
    /// Heart rate rise over baseline that, with low activity, adds nausea.
    pub headache_heart_rate_rise_pct: f64,
    /// Absolute heart rate used instead while no baseline exists.
    pub headache_heart_rate_bpm: f64,

    pub postdrome_window_hours: i64,
    pub postdrome_hrv_drop_pct: f64,
    pub postdrome_hrv_weight: u8,
    pub postdrome_stress_rise_pct: f64,
    pub postdrome_stress_weight: u8,
    pub postdrome_screen_time_ratio: f64,
    pub postdrome_screen_weight: u8,

    pub baseline_window_hours: i64,
    pub baseline_min_samples: usize,
    pub baseline_sample_interval_secs: i64,
}

impl Default for PhaseSettings {
    fn default() -> Self {
        Self {
            precedence: PhasePrecedence::ProdromeFirst,
            prodrome_threshold: 60.0,
            aura_threshold: 50.0,

            prodrome_hrv_drop_pct: 15.0,
            prodrome_hrv_weight: 30,
            prodrome_stress_rise_pct: 20.0,
            prodrome_stress_weight: 25,
            prodrome_sleep_quality_drop_pct: 25.0,
            prodrome_short_sleep_hours: 5.0,
            prodrome_sleep_weight: 20,
            prodrome_screen_time_ratio: 1.5,
            prodrome_screen_weight: 10,
            prodrome_low_activity_weight: 15,
            low_activity_steps: 2_000,

            aura_hrv_drop_pct: 20.0,
            aura_hrv_weight: 35,
            aura_heart_rate_rise_pct: 15.0,
            aura_heart_rate_weight: 30,
            aura_stress_jump_points: 30.0,
            aura_stress_weight: 25,

            headache_stress_rise_pct: 20.0,
            headache_stress_level: 70.0,
            headache_heart_rate_rise_pct: 10.0,
            headache_heart_rate_bpm: 90.0,

            postdrome_window_hours: 24,
            postdrome_hrv_drop_pct: 10.0,
            postdrome_hrv_weight: 40,
            postdrome_stress_rise_pct: 10.0,
            postdrome_stress_weight: 35,
            postdrome_screen_time_ratio: 1.2,
            postdrome_screen_weight: 25,

            baseline_window_hours: 7 * 24,
            baseline_min_samples: 30,
            baseline_sample_interval_secs: 60,
        }
    }
}

impl PhaseSettings {
    pub fn baseline_window(&self) -> TimeDelta {
        bounded_hours(self.baseline_window_hours)
    }

    pub fn postdrome_window(&self) -> TimeDelta {
        bounded_hours(self.postdrome_window_hours)
    }

    pub fn baseline_sample_interval(&self) -> TimeDelta {
        TimeDelta::try_seconds(
            self.baseline_sample_interval_secs
                .clamp(0, MAX_WINDOW_HOURS * 3600),
        )
        .unwrap_or_else(TimeDelta::zero)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskSettings {
    pub cache_ttl_secs: u64,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 5 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AISettings {
    pub enabled: bool,
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for AISettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://integrate.api.nvidia.com/v1/chat/completions".to_string(),
            api_key: String::new(),
            model: "moonshotai/kimi-k2-instruct-0905".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub cooldown_minutes: i64,
    pub min_change: u8,
    pub thresholds: Vec<u8>,
    pub webhook_url: Option<String>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_minutes: 30,
            min_change: 10,
            thresholds: vec![30, 50, 70],
            webhook_url: None,
        }
    }
}

impl NotificationSettings {
    pub fn cooldown(&self) -> TimeDelta {
        TimeDelta::try_minutes(self.cooldown_minutes.clamp(0, MAX_COOLDOWN_MINUTES))
            .unwrap_or_else(TimeDelta::zero)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageSettings {
    pub retention_days: i64,
    pub auto_cleanup: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            retention_days: 365,
            auto_cleanup: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_fills_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "risk": { "cache_ttl_secs": 120 } }"#).unwrap();
        assert_eq!(settings.risk.cache_ttl_secs, 120);
        assert_eq!(settings.collection.cardio_interval_secs, 5);
        assert_eq!(settings.notifications.thresholds, vec![30, 50, 70]);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn rejects_zero_cadence() {
        let mut settings = Settings::default();
        settings.collection.weather_interval_secs = 0;
        assert!(settings.validate().is_err());
    }

    fn rejected(edit: impl FnOnce(&mut Settings)) -> bool {
        let mut settings = Settings::default();
        edit(&mut settings);
        matches!(settings.validate(), Err(EngineError::Config(_)))
    }

    #[test]
    fn rejects_negative_or_huge_cooldown() {
        assert!(rejected(|s| s.notifications.cooldown_minutes = -30));
        assert!(rejected(|s| s.notifications.cooldown_minutes = i64::MAX));
        assert!(!rejected(|s| s.notifications.cooldown_minutes = 0));
    }

    #[test]
    fn rejects_zero_min_change() {
        assert!(rejected(|s| s.notifications.min_change = 0));
    }

    #[test]
    fn rejects_out_of_range_windows() {
        assert!(rejected(|s| s.phase.postdrome_window_hours = -1));
        assert!(rejected(|s| s.phase.postdrome_window_hours = i64::MAX));
        assert!(rejected(|s| s.phase.baseline_window_hours = 0));
        assert!(rejected(|s| s.phase.baseline_window_hours = i64::MAX));
        assert!(rejected(|s| s.phase.baseline_sample_interval_secs = -5));
        assert!(rejected(|s| s.phase.baseline_sample_interval_secs = i64::MAX));
    }

    #[test]
    fn rejects_unbounded_ttl_and_retention() {
        assert!(rejected(|s| s.risk.cache_ttl_secs = u64::MAX));
        assert!(rejected(|s| s.storage.retention_days = 0));
        assert!(rejected(|s| s.storage.retention_days = i64::MAX));
    }

    #[test]
    fn duration_accessors_saturate_instead_of_panicking() {
        let mut settings = Settings::default();
        settings.notifications.cooldown_minutes = i64::MAX;
        settings.phase.baseline_window_hours = i64::MIN;
        settings.phase.postdrome_window_hours = i64::MAX;
        settings.phase.baseline_sample_interval_secs = i64::MAX;

        assert_eq!(
            settings.notifications.cooldown(),
            TimeDelta::minutes(MAX_COOLDOWN_MINUTES)
        );
        assert_eq!(settings.phase.baseline_window(), TimeDelta::zero());
        assert_eq!(
            settings.phase.postdrome_window(),
            TimeDelta::hours(MAX_WINDOW_HOURS)
        );
        assert_eq!(
            settings.phase.baseline_sample_interval(),
            TimeDelta::hours(MAX_WINDOW_HOURS)
        );
    }
}
