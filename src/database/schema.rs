use anyhow::Result;
use rusqlite::Connection;

pub fn create_tables(conn: &Connection) -> Result<()> {
    // Confirmed migraine events (append-only, resolution attached later)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migraine_events (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            onset_at INTEGER NOT NULL,
            severity INTEGER NOT NULL,
            symptoms TEXT NOT NULL,
            snapshot BLOB,
            resolved_at INTEGER,
            duration_minutes INTEGER
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_migraine_events_owner_onset
         ON migraine_events(owner_id, onset_at)",
        [],
    )?;

    // Latest merged snapshot per owner
    conn.execute(
        "CREATE TABLE IF NOT EXISTS owner_snapshots (
            owner_id TEXT PRIMARY KEY,
            snapshot BLOB NOT NULL,
            fingerprint INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        [],
    )?;

    // Sampled long-term history (zstd-compressed bincode)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS snapshot_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id TEXT NOT NULL,
            source TEXT NOT NULL,
            captured_at INTEGER NOT NULL,
            payload BLOB NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_snapshot_history_owner_time
         ON snapshot_history(owner_id, captured_at)",
        [],
    )?;

    // Latest risk analysis per owner
    conn.execute(
        "CREATE TABLE IF NOT EXISTS risk_cache (
            owner_id TEXT PRIMARY KEY,
            analysis BLOB NOT NULL,
            computed_at INTEGER NOT NULL,
            ttl_secs INTEGER NOT NULL
        )",
        [],
    )?;

    // Alert gate state per owner
    conn.execute(
        "CREATE TABLE IF NOT EXISTS alert_state (
            owner_id TEXT PRIMARY KEY,
            last_score INTEGER,
            last_level TEXT,
            last_notified_at INTEGER
        )",
        [],
    )?;

    Ok(())
}
