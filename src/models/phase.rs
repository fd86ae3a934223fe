use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Prodrome,
    Aura,
    Headache,
    Postdrome,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Prodrome => "prodrome",
            Phase::Aura => "aura",
            Phase::Headache => "headache",
            Phase::Postdrome => "postdrome",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EarlyWarningSignal {
    pub metric: String,
    pub value: f64,
    pub deviation_pct: f64,
    pub observed_at: DateTime<Utc>,
}

/// `phase == None` with zero confidence means no phase is active.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseDetectionResult {
    pub phase: Option<Phase>,
    pub confidence: u8,
    pub symptoms: Vec<String>,
    pub signals: Vec<EarlyWarningSignal>,
    pub evaluated_at: DateTime<Utc>,
}

impl PhaseDetectionResult {
    pub fn inactive(evaluated_at: DateTime<Utc>) -> Self {
        Self {
            phase: None,
            confidence: 0,
            symptoms: Vec::new(),
            signals: Vec::new(),
            evaluated_at,
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase.is_some() && self.confidence > 0
    }
}
