//! Personal "normal" baseline.
//!
//! Keeps time-windowed rolling averages of the metrics phase detection
//! compares against. This reflects what is typical for the owner, not what
//! precedes their migraines (that is the learned pattern).

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};

use crate::models::{HealthSnapshot, PhaseSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaselineMetric {
    Hrv,
    HeartRate,
    StressLevel,
    SleepQuality,
    ScreenTime,
}

impl BaselineMetric {
    pub const ALL: [BaselineMetric; 5] = [
        BaselineMetric::Hrv,
        BaselineMetric::HeartRate,
        BaselineMetric::StressLevel,
        BaselineMetric::SleepQuality,
        BaselineMetric::ScreenTime,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BaselineMetric::Hrv => "hrv",
            BaselineMetric::HeartRate => "heart_rate",
            BaselineMetric::StressLevel => "stress_level",
            BaselineMetric::SleepQuality => "sleep_quality",
            BaselineMetric::ScreenTime => "screen_time_minutes",
        }
    }

    pub fn read(&self, snapshot: &HealthSnapshot) -> Option<f64> {
        match self {
            BaselineMetric::Hrv => snapshot.hrv,
            BaselineMetric::HeartRate => snapshot.heart_rate,
            BaselineMetric::StressLevel => snapshot.stress_level,
            BaselineMetric::SleepQuality => snapshot.sleep_quality,
            BaselineMetric::ScreenTime => snapshot.screen_time_minutes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BaselineTracker {
    window: Duration,
    min_samples: usize,
    sample_interval: Duration,
    series: HashMap<BaselineMetric, VecDeque<(DateTime<Utc>, f64)>>,
    last_sample_at: Option<DateTime<Utc>>,
}

impl BaselineTracker {
    pub fn new(settings: &PhaseSettings) -> Self {
        Self {
            window: settings.baseline_window(),
            min_samples: settings.baseline_min_samples.max(1),
            sample_interval: settings.baseline_sample_interval(),
            series: HashMap::new(),
            last_sample_at: None,
        }
    }

    /// Rebuild from persisted history, oldest first.
    pub fn seed(&mut self, history: &[HealthSnapshot]) {
        for snapshot in history {
            if let Some(at) = snapshot.captured_at {
                self.observe(snapshot, at);
            }
        }
    }

    /// Record a sample unless one was taken less than the sample interval ago.
    pub fn observe(&mut self, snapshot: &HealthSnapshot, at: DateTime<Utc>) -> bool {
        if let Some(last) = self.last_sample_at {
            if at - last < self.sample_interval {
                return false;
            }
        }
        self.last_sample_at = Some(at);

        for metric in BaselineMetric::ALL {
            if let Some(value) = metric.read(snapshot) {
                self.series.entry(metric).or_default().push_back((at, value));
            }
        }

        let cutoff = at - self.window;
        for values in self.series.values_mut() {
            while values.front().is_some_and(|(t, _)| *t < cutoff) {
                values.pop_front();
            }
        }
        true
    }

    pub fn sample_count(&self, metric: BaselineMetric) -> usize {
        self.series.get(&metric).map(VecDeque::len).unwrap_or(0)
    }

    /// Rolling average, once enough samples exist to be meaningful.
    pub fn average(&self, metric: BaselineMetric) -> Option<f64> {
        let values = self.series.get(&metric)?;
        if values.len() < self.min_samples {
            return None;
        }
        Some(values.iter().map(|(_, v)| v).sum::<f64>() / values.len() as f64)
    }

    /// Percentage change of `current` relative to the baseline.
    pub fn deviation_pct(&self, metric: BaselineMetric, current: f64) -> Option<f64> {
        let base = self.average(metric)?;
        if base > 0.0 {
            Some((current - base) / base * 100.0)
        } else if current > 0.0 {
            Some(100.0)
        } else {
            Some(0.0)
        }
    }
}
