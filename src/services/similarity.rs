use crate::models::{
    Feature, FeatureScore, HealthSnapshot, LearnedPattern, LearningSettings, SimilarityOutcome,
    SimilarityResult, WarningLevel,
};

/// How a feature's distance from the pattern mean maps to a 0-100 score.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Tolerance {
    /// Relative distance: 100 - |current - mean| / mean * 100.
    Ratio,
    /// Fixed band: 100 - |current - mean| * k, so a distance of 100/k scores zero.
    Absolute(f64),
}

fn tolerance_for(feature: Feature) -> Option<Tolerance> {
    match feature {
        Feature::Hrv | Feature::StressLevel | Feature::SleepQuality | Feature::ScreenTime => {
            Some(Tolerance::Ratio)
        }
        // 10 hPa away scores zero
        Feature::Pressure => Some(Tolerance::Absolute(10.0)),
        // 5 °C away scores zero
        Feature::Temperature => Some(Tolerance::Absolute(20.0)),
        _ => None,
    }
}

fn feature_score(current: f64, mean: f64, tolerance: Tolerance) -> f64 {
    let distance = (current - mean).abs();
    let score = match tolerance {
        Tolerance::Ratio if mean.abs() < f64::EPSILON => {
            if distance < f64::EPSILON {
                100.0
            } else {
                0.0
            }
        }
        Tolerance::Ratio => 100.0 - distance / mean.abs() * 100.0,
        Tolerance::Absolute(k) => 100.0 - distance * k,
    };
    score.clamp(0.0, 100.0)
}

/// Warning text fires when the raw value sits on the risky side of the
/// pattern, independent of whether the feature's score matched.
fn feature_warning(feature: Feature, current: f64, mean: f64) -> Option<String> {
    match feature {
        Feature::Hrv if current <= mean + 5.0 => Some(format!(
            "HRV {:.0} ms is at your pre-migraine level ({:.0} ms)",
            current, mean
        )),
        Feature::StressLevel if current >= mean - 5.0 => Some(format!(
            "Stress {:.0} is close to your pre-migraine level ({:.0})",
            current, mean
        )),
        Feature::SleepQuality if current <= mean + 5.0 => Some(format!(
            "Sleep quality {:.0} matches nights before past attacks ({:.0})",
            current, mean
        )),
        Feature::ScreenTime if current >= mean * 0.9 => Some(format!(
            "Screen time {:.0} min is as high as before past attacks ({:.0} min)",
            current, mean
        )),
        Feature::Pressure if current <= mean + 2.0 => Some(format!(
            "Barometric pressure {:.0} hPa is as low as during past attacks ({:.0} hPa)",
            current, mean
        )),
        Feature::Temperature if (current - mean).abs() <= 2.0 => Some(format!(
            "Temperature {:.1} °C is similar to past attack days ({:.1} °C)",
            current, mean
        )),
        _ => None,
    }
}

/// Compares a live snapshot with an owner's learned pre-migraine pattern.
pub struct SimilarityScorer {
    match_threshold: f64,
    min_events: usize,
}

impl SimilarityScorer {
    pub fn new(settings: &LearningSettings) -> Self {
        Self {
            match_threshold: settings.match_threshold,
            min_events: settings.min_events,
        }
    }

    pub fn score(&self, snapshot: &HealthSnapshot, pattern: &LearnedPattern) -> SimilarityOutcome {
        if !pattern.valid || pattern.usable_events < self.min_events {
            return SimilarityOutcome::InsufficientHistory {
                usable_events: pattern.usable_events,
                required: self.min_events,
            };
        }

        let mut features = Vec::new();
        for feature in Feature::ALL {
            let Some(tolerance) = tolerance_for(feature) else {
                continue;
            };
            let (Some(current), Some(mean)) = (feature.read(snapshot), pattern.mean(feature)) else {
                continue;
            };

            let score = feature_score(current, mean, tolerance);
            features.push(FeatureScore {
                feature,
                current,
                pattern_mean: mean,
                score,
                matched: score >= self.match_threshold,
                warning: feature_warning(feature, current, mean),
            });
        }

        let matching: Vec<&FeatureScore> = features.iter().filter(|f| f.matched).collect();
        let aggregate_score = if matching.is_empty() {
            0.0
        } else {
            matching.iter().map(|f| f.score).sum::<f64>() / matching.len() as f64
        };
        let warning_level = WarningLevel::from_score(aggregate_score);

        SimilarityOutcome::Scored(SimilarityResult {
            matching_factors: matching.iter().map(|f| f.feature).collect(),
            features,
            aggregate_score,
            warning_level,
            match_found: warning_level != WarningLevel::None,
        })
    }
}
