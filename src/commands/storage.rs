use chrono::Utc;

use crate::database::Store;
use crate::models::StorageStats;

pub fn get_storage_stats(store: &Store) -> Result<StorageStats, String> {
    store.storage_stats().map_err(|e| e.to_string())
}

/// Delete history samples older than `retention_days`. Events are kept.
pub fn cleanup_old_data(store: &Store, retention_days: i64) -> Result<usize, String> {
    store
        .cleanup_history(retention_days, Utc::now())
        .map_err(|e| e.to_string())
}
