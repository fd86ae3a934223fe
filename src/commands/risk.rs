use serde::Serialize;

use crate::models::{Assessment, HealthSnapshot};
use crate::services::OwnerSession;

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub owner_id: String,
    pub snapshot: Option<HealthSnapshot>,
    pub assessment: Option<Assessment>,
}

pub fn get_status(session: &OwnerSession) -> Result<StatusReport, String> {
    Ok(StatusReport {
        owner_id: session.owner_id().to_string(),
        snapshot: session.latest_snapshot(),
        assessment: session.latest_assessment(),
    })
}

/// One-line human summary of the latest assessment.
pub fn describe(report: &StatusReport) -> String {
    let Some(assessment) = &report.assessment else {
        return format!("{}: waiting for the first reading", report.owner_id);
    };

    let risk = &assessment.risk;
    let mut line = format!(
        "{}: risk {} ({})",
        report.owner_id, risk.risk_score, risk.risk_level
    );
    if risk.is_fallback() {
        line.push_str(" [rule-based]");
    }
    match assessment.phase.phase {
        Some(phase) => line.push_str(&format!(
            ", phase {} ({}%)",
            phase, assessment.phase.confidence
        )),
        None => line.push_str(", no active phase"),
    }
    match assessment.similarity.result() {
        Some(result) => line.push_str(&format!(
            ", similarity {:.0} ({:?})",
            result.aggregate_score, result.warning_level
        )),
        None => {
            if let Some(reason) = assessment.similarity.reason() {
                line.push_str(&format!(", similarity: {}", reason));
            }
        }
    }
    if !risk.triggers.is_empty() {
        line.push_str(&format!(", triggers: {}", risk.triggers.join(", ")));
    }
    line
}
