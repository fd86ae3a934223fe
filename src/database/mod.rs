use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::{EngineError, EngineResult};
use crate::models::{
    AlertState, HealthSnapshot, MetricSource, MigraineEvent, RiskCacheEntry, StorageStats,
    MAX_RETENTION_DAYS,
};

pub mod queries;
pub mod schema;

pub fn init_database(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;

    // Enable WAL mode
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    schema::create_tables(&conn)?;

    Ok(conn)
}

/// Shared handle to the durable state: event store, persisted snapshots,
/// risk cache entries and alert state.
pub struct Store {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

fn persistence(err: anyhow::Error) -> EngineError {
    EngineError::Persistence(err.to_string())
}

impl Store {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = init_database(db_path)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(db_path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    fn conn(&self) -> EngineResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| EngineError::Persistence("database lock poisoned".to_string()))
    }

    // ── Event store ──

    pub fn append_event(&self, event: &MigraineEvent) -> EngineResult<()> {
        queries::insert_event(&*self.conn()?, event).map_err(persistence)
    }

    /// Attach a resolution to one of the owner's open events and return the
    /// updated record. Another owner's event is reported as not found.
    pub fn resolve_event(
        &self,
        owner_id: &str,
        event_id: &str,
        resolved_at: DateTime<Utc>,
    ) -> EngineResult<MigraineEvent> {
        let conn = self.conn()?;
        let mut event = queries::get_event(&conn, owner_id, event_id)
            .map_err(persistence)?
            .ok_or_else(|| EngineError::EventNotFound(event_id.to_string()))?;

        event.resolve(resolved_at)?;
        let duration = event.duration_minutes.unwrap_or(0);
        let updated =
            queries::resolve_event(&conn, owner_id, event_id, resolved_at, duration).map_err(persistence)?;
        if updated == 0 {
            return Err(EngineError::InvalidInput(format!(
                "event {} is already resolved",
                event_id
            )));
        }
        Ok(event)
    }

    pub fn recent_events(&self, owner_id: &str, limit: usize) -> EngineResult<Vec<MigraineEvent>> {
        queries::recent_events(&*self.conn()?, owner_id, limit).map_err(persistence)
    }

    pub fn active_event(&self, owner_id: &str) -> EngineResult<Option<MigraineEvent>> {
        queries::active_event(&*self.conn()?, owner_id).map_err(persistence)
    }

    pub fn last_resolved_event(&self, owner_id: &str) -> EngineResult<Option<MigraineEvent>> {
        queries::last_resolved_event(&*self.conn()?, owner_id).map_err(persistence)
    }

    // ── Snapshots ──

    pub fn save_snapshot(
        &self,
        owner_id: &str,
        snapshot: &HealthSnapshot,
        at: DateTime<Utc>,
    ) -> EngineResult<()> {
        queries::upsert_owner_snapshot(&*self.conn()?, owner_id, snapshot, at).map_err(persistence)
    }

    pub fn load_snapshot(&self, owner_id: &str) -> EngineResult<Option<HealthSnapshot>> {
        queries::get_owner_snapshot(&*self.conn()?, owner_id).map_err(persistence)
    }

    pub fn append_history(
        &self,
        owner_id: &str,
        source: MetricSource,
        at: DateTime<Utc>,
        snapshot: &HealthSnapshot,
    ) -> EngineResult<()> {
        queries::insert_history_sample(&*self.conn()?, owner_id, source, at, snapshot)
            .map(|_| ())
            .map_err(persistence)
    }

    pub fn history_since(
        &self,
        owner_id: &str,
        since: DateTime<Utc>,
    ) -> EngineResult<Vec<HealthSnapshot>> {
        queries::history_since(&*self.conn()?, owner_id, since).map_err(persistence)
    }

    // ── Risk cache / alert state ──

    pub fn save_risk_entry(&self, owner_id: &str, entry: &RiskCacheEntry) -> EngineResult<()> {
        queries::upsert_risk_cache(&*self.conn()?, owner_id, entry).map_err(persistence)
    }

    pub fn load_risk_entry(&self, owner_id: &str) -> EngineResult<Option<RiskCacheEntry>> {
        queries::get_risk_cache(&*self.conn()?, owner_id).map_err(persistence)
    }

    pub fn clear_risk_entry(&self, owner_id: &str) -> EngineResult<()> {
        queries::delete_risk_cache(&*self.conn()?, owner_id).map_err(persistence)
    }

    pub fn save_alert_state(&self, owner_id: &str, state: &AlertState) -> EngineResult<()> {
        queries::upsert_alert_state(&*self.conn()?, owner_id, state).map_err(persistence)
    }

    pub fn load_alert_state(&self, owner_id: &str) -> EngineResult<Option<AlertState>> {
        queries::get_alert_state(&*self.conn()?, owner_id).map_err(persistence)
    }

    // ── Maintenance ──

    pub fn storage_stats(&self) -> EngineResult<StorageStats> {
        let conn = self.conn()?;
        let total_size_bytes = self
            .path
            .as_ref()
            .and_then(|p| p.metadata().ok())
            .map(|m| m.len() as i64)
            .unwrap_or(0);
        let (oldest_sample, newest_sample) =
            queries::history_bounds(&conn).map_err(persistence)?;

        Ok(StorageStats {
            total_size_bytes,
            events_count: queries::count_rows(&conn, "migraine_events").map_err(persistence)?,
            history_samples_count: queries::count_rows(&conn, "snapshot_history")
                .map_err(persistence)?,
            owners_count: queries::count_rows(&conn, "owner_snapshots").map_err(persistence)?,
            oldest_sample,
            newest_sample,
        })
    }

    /// Delete history samples older than the retention period. Events are kept.
    pub fn cleanup_history(&self, retention_days: i64, now: DateTime<Utc>) -> EngineResult<usize> {
        if !(1..=MAX_RETENTION_DAYS).contains(&retention_days) {
            return Err(EngineError::InvalidInput(format!(
                "retention must be within 1-{} days",
                MAX_RETENTION_DAYS
            )));
        }
        let cutoff = chrono::Duration::try_days(retention_days)
            .and_then(|retention| now.checked_sub_signed(retention))
            .ok_or_else(|| EngineError::InvalidInput("retention is out of range".to_string()))?;
        queries::delete_history_before(&*self.conn()?, cutoff).map_err(persistence)
    }
}
