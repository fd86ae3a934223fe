use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};

use crate::models::{
    AlertState, HealthSnapshot, MetricSource, MigraineEvent, RiskCacheEntry, RiskLevel,
};

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

const EVENT_COLUMNS: &str =
    "id, owner_id, onset_at, severity, symptoms, snapshot, resolved_at, duration_minutes";

fn event_from_row(row: &rusqlite::Row) -> rusqlite::Result<MigraineEvent> {
    let symptoms: String = row.get(4)?;
    let snapshot: Option<Vec<u8>> = row.get(5)?;
    Ok(MigraineEvent {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        onset_at: from_millis(row.get(2)?),
        severity: row.get::<_, i64>(3)?.clamp(1, 10) as u8,
        symptoms: serde_json::from_str(&symptoms).unwrap_or_default(),
        // Corrupt snapshots are skipped by the learner like missing ones.
        snapshot: snapshot.and_then(|b| serde_json::from_slice(&b).ok()),
        resolved_at: row.get::<_, Option<i64>>(6)?.map(from_millis),
        duration_minutes: row.get(7)?,
    })
}

pub fn insert_event(conn: &Connection, event: &MigraineEvent) -> Result<()> {
    let symptoms = serde_json::to_string(&event.symptoms)?;
    let snapshot = event
        .snapshot
        .as_ref()
        .map(serde_json::to_vec)
        .transpose()?;

    conn.execute(
        "INSERT INTO migraine_events
         (id, owner_id, onset_at, severity, symptoms, snapshot, resolved_at, duration_minutes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            &event.id,
            &event.owner_id,
            to_millis(event.onset_at),
            event.severity as i64,
            &symptoms,
            &snapshot,
            event.resolved_at.map(to_millis),
            event.duration_minutes,
        ],
    )?;

    Ok(())
}

/// Attach a resolution. Only rows that are still open are touched.
pub fn resolve_event(
    conn: &Connection,
    owner_id: &str,
    event_id: &str,
    resolved_at: DateTime<Utc>,
    duration_minutes: i64,
) -> Result<usize> {
    let updated = conn.execute(
        "UPDATE migraine_events SET resolved_at = ?1, duration_minutes = ?2
         WHERE id = ?3 AND owner_id = ?4 AND resolved_at IS NULL",
        rusqlite::params![to_millis(resolved_at), duration_minutes, event_id, owner_id],
    )?;
    Ok(updated)
}

pub fn get_event(
    conn: &Connection,
    owner_id: &str,
    event_id: &str,
) -> Result<Option<MigraineEvent>> {
    let event = conn
        .query_row(
            &format!(
                "SELECT {} FROM migraine_events WHERE id = ?1 AND owner_id = ?2",
                EVENT_COLUMNS
            ),
            [event_id, owner_id],
            event_from_row,
        )
        .optional()?;
    Ok(event)
}

pub fn recent_events(conn: &Connection, owner_id: &str, limit: usize) -> Result<Vec<MigraineEvent>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM migraine_events
         WHERE owner_id = ?1
         ORDER BY onset_at DESC
         LIMIT ?2",
        EVENT_COLUMNS
    ))?;

    let events = stmt
        .query_map(rusqlite::params![owner_id, limit as i64], event_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

pub fn active_event(conn: &Connection, owner_id: &str) -> Result<Option<MigraineEvent>> {
    let event = conn
        .query_row(
            &format!(
                "SELECT {} FROM migraine_events
                 WHERE owner_id = ?1 AND resolved_at IS NULL
                 ORDER BY onset_at DESC LIMIT 1",
                EVENT_COLUMNS
            ),
            [owner_id],
            event_from_row,
        )
        .optional()?;
    Ok(event)
}

pub fn last_resolved_event(conn: &Connection, owner_id: &str) -> Result<Option<MigraineEvent>> {
    let event = conn
        .query_row(
            &format!(
                "SELECT {} FROM migraine_events
                 WHERE owner_id = ?1 AND resolved_at IS NOT NULL
                 ORDER BY resolved_at DESC LIMIT 1",
                EVENT_COLUMNS
            ),
            [owner_id],
            event_from_row,
        )
        .optional()?;
    Ok(event)
}

pub fn upsert_owner_snapshot(
    conn: &Connection,
    owner_id: &str,
    snapshot: &HealthSnapshot,
    updated_at: DateTime<Utc>,
) -> Result<()> {
    let blob = serde_json::to_vec(snapshot)?;
    conn.execute(
        "INSERT INTO owner_snapshots (owner_id, snapshot, fingerprint, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(owner_id) DO UPDATE SET
             snapshot = excluded.snapshot,
             fingerprint = excluded.fingerprint,
             updated_at = excluded.updated_at",
        rusqlite::params![
            owner_id,
            &blob,
            snapshot.fingerprint() as i64,
            to_millis(updated_at)
        ],
    )?;
    Ok(())
}

pub fn get_owner_snapshot(conn: &Connection, owner_id: &str) -> Result<Option<HealthSnapshot>> {
    let blob: Option<Vec<u8>> = conn
        .query_row(
            "SELECT snapshot FROM owner_snapshots WHERE owner_id = ?1",
            [owner_id],
            |row| row.get(0),
        )
        .optional()?;

    match blob {
        Some(b) => Ok(Some(serde_json::from_slice(&b)?)),
        None => Ok(None),
    }
}

fn compress_snapshot(snapshot: &HealthSnapshot) -> Result<Vec<u8>> {
    let raw = bincode::serialize(snapshot)?;
    Ok(zstd::encode_all(&raw[..], 3)?)
}

fn decompress_snapshot(payload: &[u8]) -> Result<HealthSnapshot> {
    let raw = zstd::decode_all(payload)?;
    Ok(bincode::deserialize(&raw)?)
}

pub fn insert_history_sample(
    conn: &Connection,
    owner_id: &str,
    source: MetricSource,
    captured_at: DateTime<Utc>,
    snapshot: &HealthSnapshot,
) -> Result<i64> {
    let payload = compress_snapshot(snapshot)?;
    conn.execute(
        "INSERT INTO snapshot_history (owner_id, source, captured_at, payload)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![owner_id, source.as_str(), to_millis(captured_at), &payload],
    )?;
    Ok(conn.last_insert_rowid())
}

/// History samples captured after `since`, oldest first.
pub fn history_since(
    conn: &Connection,
    owner_id: &str,
    since: DateTime<Utc>,
) -> Result<Vec<HealthSnapshot>> {
    let mut stmt = conn.prepare(
        "SELECT payload FROM snapshot_history
         WHERE owner_id = ?1 AND captured_at >= ?2
         ORDER BY captured_at ASC",
    )?;

    let payloads = stmt
        .query_map(rusqlite::params![owner_id, to_millis(since)], |row| {
            row.get::<_, Vec<u8>>(0)
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut samples = Vec::with_capacity(payloads.len());
    for payload in payloads {
        match decompress_snapshot(&payload) {
            Ok(snapshot) => samples.push(snapshot),
            Err(e) => log::warn!("Skipping unreadable history sample: {}", e),
        }
    }
    Ok(samples)
}

pub fn delete_history_before(conn: &Connection, cutoff: DateTime<Utc>) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM snapshot_history WHERE captured_at < ?1",
        [to_millis(cutoff)],
    )?;
    Ok(deleted)
}

pub fn upsert_risk_cache(conn: &Connection, owner_id: &str, entry: &RiskCacheEntry) -> Result<()> {
    let blob = serde_json::to_vec(&entry.analysis)?;
    conn.execute(
        "INSERT INTO risk_cache (owner_id, analysis, computed_at, ttl_secs)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(owner_id) DO UPDATE SET
             analysis = excluded.analysis,
             computed_at = excluded.computed_at,
             ttl_secs = excluded.ttl_secs",
        rusqlite::params![
            owner_id,
            &blob,
            to_millis(entry.computed_at),
            i64::try_from(entry.ttl_secs).unwrap_or(i64::MAX)
        ],
    )?;
    Ok(())
}

pub fn get_risk_cache(conn: &Connection, owner_id: &str) -> Result<Option<RiskCacheEntry>> {
    let row: Option<(Vec<u8>, i64, i64)> = conn
        .query_row(
            "SELECT analysis, computed_at, ttl_secs FROM risk_cache WHERE owner_id = ?1",
            [owner_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    match row {
        Some((blob, computed_at, ttl_secs)) => Ok(Some(RiskCacheEntry {
            analysis: serde_json::from_slice(&blob)?,
            computed_at: from_millis(computed_at),
            ttl_secs: ttl_secs.max(0) as u64,
        })),
        None => Ok(None),
    }
}

pub fn delete_risk_cache(conn: &Connection, owner_id: &str) -> Result<()> {
    conn.execute("DELETE FROM risk_cache WHERE owner_id = ?1", [owner_id])?;
    Ok(())
}

pub fn upsert_alert_state(conn: &Connection, owner_id: &str, state: &AlertState) -> Result<()> {
    conn.execute(
        "INSERT INTO alert_state (owner_id, last_score, last_level, last_notified_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(owner_id) DO UPDATE SET
             last_score = excluded.last_score,
             last_level = excluded.last_level,
             last_notified_at = excluded.last_notified_at",
        rusqlite::params![
            owner_id,
            state.last_notified_score.map(|s| s as i64),
            state.last_notified_level.map(|l| l.to_string()),
            state.last_notified_at.map(to_millis),
        ],
    )?;
    Ok(())
}

pub fn get_alert_state(conn: &Connection, owner_id: &str) -> Result<Option<AlertState>> {
    let state = conn
        .query_row(
            "SELECT last_score, last_level, last_notified_at FROM alert_state WHERE owner_id = ?1",
            [owner_id],
            |row| {
                let level: Option<String> = row.get(1)?;
                Ok(AlertState {
                    last_notified_score: row
                        .get::<_, Option<i64>>(0)?
                        .map(|s| s.clamp(0, 100) as u8),
                    last_notified_level: level.as_deref().and_then(RiskLevel::parse),
                    last_notified_at: row.get::<_, Option<i64>>(2)?.map(from_millis),
                })
            },
        )
        .optional()?;
    Ok(state)
}

pub fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    let count = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })?;
    Ok(count)
}

pub fn history_bounds(conn: &Connection) -> Result<(i64, i64)> {
    let bounds = conn.query_row(
        "SELECT COALESCE(MIN(captured_at), 0), COALESCE(MAX(captured_at), 0) FROM snapshot_history",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(bounds)
}
