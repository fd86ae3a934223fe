use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageStats {
    pub total_size_bytes: i64,
    pub events_count: i64,
    pub history_samples_count: i64,
    pub owners_count: i64,
    pub oldest_sample: i64,
    pub newest_sample: i64,
}
