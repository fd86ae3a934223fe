use chrono::Utc;

use crate::database::Store;
use crate::models::{LearnedPattern, MigraineEvent};
use crate::services::OwnerSession;

pub async fn confirm_migraine(
    session: &OwnerSession,
    severity: u8,
    symptoms: Vec<String>,
) -> Result<MigraineEvent, String> {
    session
        .confirm_migraine(severity, symptoms)
        .await
        .map_err(|e| e.to_string())
}

/// Resolve the given event, or the owner's open event when no id is passed.
pub async fn resolve_migraine(
    session: &OwnerSession,
    store: &Store,
    event_id: Option<&str>,
) -> Result<MigraineEvent, String> {
    let event_id = match event_id {
        Some(id) => id.to_string(),
        None => store
            .active_event(session.owner_id())
            .map_err(|e| e.to_string())?
            .map(|e| e.id)
            .ok_or_else(|| "no migraine in progress".to_string())?,
    };
    session
        .resolve_migraine(&event_id, Utc::now())
        .await
        .map_err(|e| e.to_string())
}

pub fn get_recent_events(
    store: &Store,
    owner_id: &str,
    limit: usize,
) -> Result<Vec<MigraineEvent>, String> {
    store
        .recent_events(owner_id, limit.max(1))
        .map_err(|e| e.to_string())
}

pub async fn get_learned_pattern(session: &OwnerSession) -> Result<LearnedPattern, String> {
    session.learned_pattern().await.map_err(|e| e.to_string())
}
