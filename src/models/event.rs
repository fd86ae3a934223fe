use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::HealthSnapshot;
use crate::error::{EngineError, EngineResult};

/// A user-confirmed migraine attack. Append-only apart from resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MigraineEvent {
    pub id: String,
    pub owner_id: String,
    pub onset_at: DateTime<Utc>,
    pub severity: u8,
    pub symptoms: Vec<String>,
    pub snapshot: Option<HealthSnapshot>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
}

impl MigraineEvent {
    pub fn new(
        owner_id: &str,
        onset_at: DateTime<Utc>,
        severity: u8,
        symptoms: Vec<String>,
        snapshot: Option<HealthSnapshot>,
    ) -> EngineResult<Self> {
        if !(1..=10).contains(&severity) {
            return Err(EngineError::InvalidInput(format!(
                "severity must be 1-10, got {}",
                severity
            )));
        }

        let symptoms = symptoms
            .into_iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            onset_at,
            severity,
            symptoms,
            snapshot,
            resolved_at: None,
            duration_minutes: None,
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }

    /// Attach the resolution time. Only allowed once, and never before onset.
    pub fn resolve(&mut self, resolved_at: DateTime<Utc>) -> EngineResult<()> {
        if self.is_resolved() {
            return Err(EngineError::InvalidInput(format!(
                "event {} is already resolved",
                self.id
            )));
        }
        if resolved_at < self.onset_at {
            return Err(EngineError::InvalidInput(
                "resolution precedes onset".to_string(),
            ));
        }

        self.resolved_at = Some(resolved_at);
        self.duration_minutes = Some((resolved_at - self.onset_at).num_minutes());
        Ok(())
    }
}
