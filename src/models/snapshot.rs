use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    Active,
}

/// The independent acquisition channels feeding a snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MetricSource {
    Cardio,
    Phone,
    Weather,
    Sleep,
    Calendar,
}

impl MetricSource {
    pub const ALL: [MetricSource; 5] = [
        MetricSource::Cardio,
        MetricSource::Phone,
        MetricSource::Weather,
        MetricSource::Sleep,
        MetricSource::Calendar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricSource::Cardio => "cardio",
            MetricSource::Phone => "phone",
            MetricSource::Weather => "weather",
            MetricSource::Sleep => "sleep",
            MetricSource::Calendar => "calendar",
        }
    }
}

impl fmt::Display for MetricSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time aggregate of every channel. `None` means "never observed",
/// which is distinct from a measured zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HealthSnapshot {
    pub hrv: Option<f64>,
    pub heart_rate: Option<f64>,
    pub stress_level: Option<f64>,
    pub sleep_quality: Option<f64>,
    pub sleep_hours: Option<f64>,
    pub steps: Option<u32>,
    pub screen_time_minutes: Option<f64>,
    pub notification_count: Option<u32>,
    pub activity_level: Option<ActivityLevel>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub uv_index: Option<f64>,
    pub calendar_event_count: Option<u32>,
    pub calendar_stress: Option<f64>,
    pub captured_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CardioReading {
    pub hrv: Option<f64>,
    pub heart_rate: Option<f64>,
    pub stress_level: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhoneReading {
    pub screen_time_minutes: Option<f64>,
    pub notification_count: Option<u32>,
    pub steps: Option<u32>,
    pub activity_level: Option<ActivityLevel>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WeatherReading {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub uv_index: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SleepReading {
    pub sleep_quality: Option<f64>,
    pub sleep_hours: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CalendarReading {
    pub event_count: Option<u32>,
    pub calendar_stress: Option<f64>,
}

/// Output of one collector run. Each variant only carries the fields its
/// source owns, so a merge can never touch another source's fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum PartialSnapshot {
    Cardio(CardioReading),
    Phone(PhoneReading),
    Weather(WeatherReading),
    Sleep(SleepReading),
    Calendar(CalendarReading),
}

impl PartialSnapshot {
    pub fn source(&self) -> MetricSource {
        match self {
            PartialSnapshot::Cardio(_) => MetricSource::Cardio,
            PartialSnapshot::Phone(_) => MetricSource::Phone,
            PartialSnapshot::Weather(_) => MetricSource::Weather,
            PartialSnapshot::Sleep(_) => MetricSource::Sleep,
            PartialSnapshot::Calendar(_) => MetricSource::Calendar,
        }
    }
}

// Accepted physiological / physical ranges.
const HRV_RANGE: (f64, f64) = (1.0, 300.0);
const HEART_RATE_RANGE: (f64, f64) = (25.0, 250.0);
const PERCENT_RANGE: (f64, f64) = (0.0, 100.0);
const SLEEP_HOURS_RANGE: (f64, f64) = (0.0, 24.0);
const SCREEN_TIME_RANGE: (f64, f64) = (0.0, 1440.0);
const TEMPERATURE_RANGE: (f64, f64) = (-90.0, 60.0);
const PRESSURE_RANGE: (f64, f64) = (870.0, 1085.0);
const UV_RANGE: (f64, f64) = (0.0, 20.0);

fn checked(field: &str, value: Option<f64>, range: (f64, f64)) -> Option<f64> {
    match value {
        Some(v) if v.is_finite() && v >= range.0 && v <= range.1 => Some(v),
        Some(v) => {
            log::warn!(
                "[Snapshot] Dropping {} = {} (expected {}..={})",
                field,
                v,
                range.0,
                range.1
            );
            None
        }
        None => None,
    }
}

fn overwrite<T>(slot: &mut Option<T>, value: Option<T>) -> usize {
    match value {
        Some(v) => {
            *slot = Some(v);
            1
        }
        None => 0,
    }
}

impl HealthSnapshot {
    /// Field-level last-write-wins merge of one collector's output.
    ///
    /// Values are validated here; anything non-finite or out of range is
    /// dropped and the previous value retained. Returns the number of fields
    /// written.
    pub fn merge(&mut self, partial: &PartialSnapshot, at: DateTime<Utc>) -> usize {
        let written = match partial {
            PartialSnapshot::Cardio(r) => {
                overwrite(&mut self.hrv, checked("hrv", r.hrv, HRV_RANGE))
                    + overwrite(
                        &mut self.heart_rate,
                        checked("heart_rate", r.heart_rate, HEART_RATE_RANGE),
                    )
                    + overwrite(
                        &mut self.stress_level,
                        checked("stress_level", r.stress_level, PERCENT_RANGE),
                    )
            }
            PartialSnapshot::Phone(r) => {
                overwrite(
                    &mut self.screen_time_minutes,
                    checked("screen_time_minutes", r.screen_time_minutes, SCREEN_TIME_RANGE),
                ) + overwrite(&mut self.notification_count, r.notification_count)
                    + overwrite(&mut self.steps, r.steps)
                    + overwrite(&mut self.activity_level, r.activity_level)
            }
            PartialSnapshot::Weather(r) => {
                overwrite(
                    &mut self.temperature,
                    checked("temperature", r.temperature, TEMPERATURE_RANGE),
                ) + overwrite(
                    &mut self.humidity,
                    checked("humidity", r.humidity, PERCENT_RANGE),
                ) + overwrite(
                    &mut self.pressure,
                    checked("pressure", r.pressure, PRESSURE_RANGE),
                ) + overwrite(&mut self.uv_index, checked("uv_index", r.uv_index, UV_RANGE))
            }
            PartialSnapshot::Sleep(r) => {
                overwrite(
                    &mut self.sleep_quality,
                    checked("sleep_quality", r.sleep_quality, PERCENT_RANGE),
                ) + overwrite(
                    &mut self.sleep_hours,
                    checked("sleep_hours", r.sleep_hours, SLEEP_HOURS_RANGE),
                )
            }
            PartialSnapshot::Calendar(r) => {
                overwrite(&mut self.calendar_event_count, r.event_count)
                    + overwrite(
                        &mut self.calendar_stress,
                        checked("calendar_stress", r.calendar_stress, PERCENT_RANGE),
                    )
            }
        };

        if written > 0 {
            self.captured_at = Some(at);
        }
        written
    }

    /// True when at least one metric has been observed.
    pub fn has_any_metric(&self) -> bool {
        self.hrv.is_some()
            || self.heart_rate.is_some()
            || self.stress_level.is_some()
            || self.sleep_quality.is_some()
            || self.sleep_hours.is_some()
            || self.steps.is_some()
            || self.screen_time_minutes.is_some()
            || self.notification_count.is_some()
            || self.activity_level.is_some()
            || self.temperature.is_some()
            || self.humidity.is_some()
            || self.pressure.is_some()
            || self.uv_index.is_some()
            || self.calendar_event_count.is_some()
            || self.calendar_stress.is_some()
    }

    /// Stable fingerprint of the metric values, used to skip redundant writes.
    pub fn fingerprint(&self) -> u64 {
        use std::hash::Hasher;

        let mut hasher = twox_hash::XxHash64::default();
        for value in [
            self.hrv,
            self.heart_rate,
            self.stress_level,
            self.sleep_quality,
            self.sleep_hours,
            self.screen_time_minutes,
            self.temperature,
            self.humidity,
            self.pressure,
            self.uv_index,
            self.calendar_stress,
        ] {
            hasher.write_u64(value.map(f64::to_bits).unwrap_or(u64::MAX));
        }
        for value in [self.steps, self.notification_count, self.calendar_event_count] {
            hasher.write_u64(value.map(u64::from).unwrap_or(u64::MAX));
        }
        hasher.write_u8(self.activity_level.map(|l| l as u8).unwrap_or(u8::MAX));
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn merge_only_touches_owned_fields() {
        let mut snapshot = HealthSnapshot {
            pressure: Some(1012.0),
            ..Default::default()
        };
        snapshot.merge(
            &PartialSnapshot::Cardio(CardioReading {
                hrv: Some(48.0),
                heart_rate: Some(70.0),
                stress_level: None,
            }),
            at(),
        );

        assert_eq!(snapshot.hrv, Some(48.0));
        assert_eq!(snapshot.pressure, Some(1012.0));
        assert_eq!(snapshot.stress_level, None);
        assert_eq!(snapshot.captured_at, Some(at()));
    }

    #[test]
    fn invalid_values_keep_previous() {
        let mut snapshot = HealthSnapshot {
            hrv: Some(52.0),
            ..Default::default()
        };
        let written = snapshot.merge(
            &PartialSnapshot::Cardio(CardioReading {
                hrv: Some(f64::NAN),
                heart_rate: Some(900.0),
                stress_level: Some(-3.0),
            }),
            at(),
        );

        assert_eq!(written, 0);
        assert_eq!(snapshot.hrv, Some(52.0));
        assert_eq!(snapshot.heart_rate, None);
        assert_eq!(snapshot.captured_at, None);
    }

    #[test]
    fn zero_is_not_absence() {
        let mut snapshot = HealthSnapshot::default();
        snapshot.merge(
            &PartialSnapshot::Phone(PhoneReading {
                screen_time_minutes: Some(0.0),
                ..Default::default()
            }),
            at(),
        );
        assert_eq!(snapshot.screen_time_minutes, Some(0.0));
        assert!(snapshot.has_any_metric());
        assert_eq!(snapshot.notification_count, None);
    }

    #[test]
    fn fingerprint_ignores_timestamp() {
        let a = HealthSnapshot {
            hrv: Some(40.0),
            captured_at: Some(at()),
            ..Default::default()
        };
        let mut b = a.clone();
        b.captured_at = None;
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.hrv = Some(41.0);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    fn opt(range: std::ops::Range<f64>) -> impl Strategy<Value = Option<f64>> {
        proptest::option::of(range)
    }

    fn partial_strategy() -> impl Strategy<Value = PartialSnapshot> {
        prop_oneof![
            (opt(1.0..300.0), opt(25.0..250.0), opt(0.0..100.0)).prop_map(|(hrv, hr, stress)| {
                PartialSnapshot::Cardio(CardioReading {
                    hrv,
                    heart_rate: hr,
                    stress_level: stress,
                })
            }),
            (opt(0.0..1440.0), proptest::option::of(0u32..500)).prop_map(|(screen, n)| {
                PartialSnapshot::Phone(PhoneReading {
                    screen_time_minutes: screen,
                    notification_count: n,
                    ..Default::default()
                })
            }),
            (opt(-20.0..40.0), opt(900.0..1050.0)).prop_map(|(t, p)| {
                PartialSnapshot::Weather(WeatherReading {
                    temperature: t,
                    pressure: p,
                    ..Default::default()
                })
            }),
            (opt(0.0..100.0), opt(0.0..12.0)).prop_map(|(q, h)| {
                PartialSnapshot::Sleep(SleepReading {
                    sleep_quality: q,
                    sleep_hours: h,
                })
            }),
        ]
    }

    proptest! {
        #[test]
        fn merging_twice_equals_merging_once(
            base in partial_strategy(),
            update in partial_strategy(),
        ) {
            let mut start = HealthSnapshot::default();
            start.merge(&base, at());

            let mut once = start.clone();
            once.merge(&update, at());

            let mut twice = start;
            twice.merge(&update, at());
            twice.merge(&update, at());

            prop_assert_eq!(once, twice);
        }
    }
}
