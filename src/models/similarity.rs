use serde::{Deserialize, Serialize};

use super::Feature;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum WarningLevel {
    None,
    Moderate,
    High,
    Critical,
}

impl WarningLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            WarningLevel::Critical
        } else if score >= 75.0 {
            WarningLevel::High
        } else if score >= 60.0 {
            WarningLevel::Moderate
        } else {
            WarningLevel::None
        }
    }

    /// Moderate is advisory only; high and critical may raise an alert.
    pub fn is_alertable(&self) -> bool {
        matches!(self, WarningLevel::High | WarningLevel::Critical)
    }
}

/// One feature's comparison against the learned pattern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureScore {
    pub feature: Feature,
    pub current: f64,
    pub pattern_mean: f64,
    pub score: f64,
    pub matched: bool,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityResult {
    /// Every feature that was evaluated, matched or not.
    pub features: Vec<FeatureScore>,
    pub matching_factors: Vec<Feature>,
    pub aggregate_score: f64,
    pub warning_level: WarningLevel,
    pub match_found: bool,
}

impl SimilarityResult {
    pub fn warnings(&self) -> Vec<&str> {
        self.features
            .iter()
            .filter_map(|f| f.warning.as_deref())
            .collect()
    }
}

pub const INSUFFICIENT_HISTORY: &str = "insufficient history";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SimilarityOutcome {
    InsufficientHistory { usable_events: usize, required: usize },
    Scored(SimilarityResult),
}

impl SimilarityOutcome {
    pub fn match_found(&self) -> bool {
        match self {
            SimilarityOutcome::InsufficientHistory { .. } => false,
            SimilarityOutcome::Scored(result) => result.match_found,
        }
    }

    pub fn reason(&self) -> Option<&'static str> {
        match self {
            SimilarityOutcome::InsufficientHistory { .. } => Some(INSUFFICIENT_HISTORY),
            SimilarityOutcome::Scored(_) => None,
        }
    }

    pub fn result(&self) -> Option<&SimilarityResult> {
        match self {
            SimilarityOutcome::InsufficientHistory { .. } => None,
            SimilarityOutcome::Scored(result) => Some(result),
        }
    }
}
