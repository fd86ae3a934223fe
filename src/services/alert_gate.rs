use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;

use crate::database::Store;
use crate::models::{AlertState, Notification, NotificationSettings, RiskAnalysis};

/// Why the gate let a risk update through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertReason {
    ThresholdCrossed(u8),
    Magnitude(i16),
}

/// Hysteresis and cooldown in front of the notifier. Sole writer of the
/// owner's `AlertState`.
pub struct AlertGate {
    owner_id: String,
    settings: NotificationSettings,
    state: AlertState,
    store: Arc<Store>,
}

impl AlertGate {
    pub fn new(owner_id: &str, settings: NotificationSettings, store: Arc<Store>) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            settings,
            state: AlertState::default(),
            store,
        }
    }

    pub fn restore(&mut self) {
        match self.store.load_alert_state(&self.owner_id) {
            Ok(Some(state)) => self.state = state,
            Ok(None) => {}
            Err(e) => log::error!("[AlertGate] {}: failed to restore state: {}", self.owner_id, e),
        }
    }

    pub fn state(&self) -> &AlertState {
        &self.state
    }

    /// Decide whether `score` warrants a notification now.
    ///
    /// Fires when a named threshold was crossed upward since the last
    /// notified score (taken as 0 before any notification), or the score
    /// moved by at least `min_change` from the last notified score, and in
    /// either case the cooldown has elapsed.
    pub fn check(&self, score: u8, now: DateTime<Utc>) -> Option<AlertReason> {
        if !self.settings.enabled {
            return None;
        }
        if let Some(last_at) = self.state.last_notified_at {
            if now - last_at < self.settings.cooldown() {
                return None;
            }
        }

        let previous = self.state.last_notified_score.unwrap_or(0);
        let crossed = self
            .settings
            .thresholds
            .iter()
            .copied()
            .filter(|t| previous < *t && score >= *t)
            .max();
        if let Some(threshold) = crossed {
            return Some(AlertReason::ThresholdCrossed(threshold));
        }

        if let Some(last) = self.state.last_notified_score {
            let change = score as i16 - last as i16;
            if change.unsigned_abs() >= self.settings.min_change as u16 {
                return Some(AlertReason::Magnitude(change));
            }
        }
        None
    }

    /// Run the gate for a new analysis. On success the state is updated and
    /// the notification to deliver is returned.
    pub fn consider(&mut self, analysis: &RiskAnalysis, now: DateTime<Utc>) -> Option<Notification> {
        let reason = self.check(analysis.risk_score, now)?;

        self.state = AlertState {
            last_notified_score: Some(analysis.risk_score),
            last_notified_level: Some(analysis.risk_level),
            last_notified_at: Some(now),
        };
        if let Err(e) = self.store.save_alert_state(&self.owner_id, &self.state) {
            log::error!("[AlertGate] {}: failed to persist state: {}", self.owner_id, e);
        }
        log::info!(
            "[AlertGate] {}: notifying at risk {} ({:?})",
            self.owner_id,
            analysis.risk_score,
            reason
        );

        Some(build_notification(&self.owner_id, analysis, reason))
    }
}

fn build_notification(owner_id: &str, analysis: &RiskAnalysis, reason: AlertReason) -> Notification {
    let direction = match reason {
        AlertReason::Magnitude(change) if change < 0 => "dropped to",
        _ => "is now",
    };
    let mut body = format!("Your migraine risk {} {}%.", direction, analysis.risk_score);
    if !analysis.triggers.is_empty() {
        body.push_str(&format!(" Triggers: {}.", analysis.triggers.join(", ")));
    }
    if let Some(tip) = analysis.recommendations.first() {
        body.push_str(&format!(" {}.", tip.trim_end_matches('.')));
    }

    Notification {
        title: format!("Migraine risk {}", analysis.risk_level),
        body,
        data: json!({
            "ownerId": owner_id,
            "riskScore": analysis.risk_score,
            "riskLevel": analysis.risk_level,
            "triggers": analysis.triggers,
            "fallback": analysis.is_fallback(),
        }),
    }
}
