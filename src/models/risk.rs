use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{HealthSnapshot, PhaseDetectionResult, SimilarityOutcome};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=29 => RiskLevel::Low,
            30..=49 => RiskLevel::Moderate,
            50..=69 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "LOW" => Some(RiskLevel::Low),
            "MODERATE" | "MEDIUM" => Some(RiskLevel::Moderate),
            "HIGH" => Some(RiskLevel::High),
            "CRITICAL" | "VERY_HIGH" => Some(RiskLevel::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Moderate => "MODERATE",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiskSource {
    Reasoning,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskAnalysis {
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub triggers: Vec<String>,
    pub reasoning: String,
    pub recommendations: Vec<String>,
    pub source: RiskSource,
    /// Why the reasoning service was not used, when `source` is fallback.
    pub fallback_reason: Option<String>,
    pub computed_at: DateTime<Utc>,
}

impl RiskAnalysis {
    pub fn is_fallback(&self) -> bool {
        self.source == RiskSource::Fallback
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskCacheEntry {
    pub analysis: RiskAnalysis,
    pub computed_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl RiskCacheEntry {
    /// `None` when the TTL reaches past the representable range.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = i64::try_from(self.ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)?;
        self.computed_at.checked_add_signed(ttl)
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map_or(true, |expires_at| now < expires_at)
    }
}

/// Full result of evaluating one merged snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assessment {
    pub owner_id: String,
    pub snapshot: HealthSnapshot,
    pub phase: PhaseDetectionResult,
    pub similarity: SimilarityOutcome,
    pub risk: RiskAnalysis,
    pub alert_sent: bool,
    pub evaluated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(ttl_secs: u64) -> RiskCacheEntry {
        let computed_at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        RiskCacheEntry {
            analysis: RiskAnalysis {
                risk_score: 40,
                risk_level: RiskLevel::from_score(40),
                triggers: vec![],
                reasoning: String::new(),
                recommendations: vec![],
                source: RiskSource::Fallback,
                fallback_reason: None,
                computed_at,
            },
            computed_at,
            ttl_secs,
        }
    }

    #[test]
    fn ttl_beyond_i64_never_wraps_negative() {
        let huge = entry(u64::MAX);
        assert_eq!(huge.expires_at(), None);
        assert!(huge.is_fresh(huge.computed_at + Duration::days(365)));
    }

    #[test]
    fn freshness_is_strict_at_expiry() {
        let entry = entry(300);
        let expiry = entry.computed_at + Duration::seconds(300);
        assert_eq!(entry.expires_at(), Some(expiry));
        assert!(entry.is_fresh(expiry - Duration::seconds(1)));
        assert!(!entry.is_fresh(expiry));
    }
}
