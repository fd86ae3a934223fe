use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;

use crate::database::Store;
use crate::models::{RiskAnalysis, RiskCacheEntry};

/// Latest completed risk analysis for one owner, valid for a fixed TTL.
///
/// Entries are mirrored to the store so a restarted session can reuse a
/// still-fresh analysis. Persistence failures are logged and the cache keeps
/// working in memory.
pub struct RiskCache {
    owner_id: String,
    ttl_secs: u64,
    entry: Option<RiskCacheEntry>,
    store: Arc<Store>,
}

impl RiskCache {
    pub fn new(owner_id: &str, ttl_secs: u64, store: Arc<Store>) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            ttl_secs,
            entry: None,
            store,
        }
    }

    /// Load the persisted entry, if any.
    pub fn restore(&mut self) {
        match self.store.load_risk_entry(&self.owner_id) {
            Ok(entry) => self.entry = entry,
            Err(e) => log::error!("[RiskCache] {}: failed to restore: {}", self.owner_id, e),
        }
    }

    pub fn entry(&self) -> Option<&RiskCacheEntry> {
        self.entry.as_ref()
    }

    pub fn get(&self, now: DateTime<Utc>) -> Option<&RiskAnalysis> {
        self.entry
            .as_ref()
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| &entry.analysis)
    }

    pub fn put(&mut self, analysis: RiskAnalysis, now: DateTime<Utc>) -> &RiskAnalysis {
        let entry = RiskCacheEntry {
            analysis,
            computed_at: now,
            ttl_secs: self.ttl_secs,
        };
        if let Err(e) = self.store.save_risk_entry(&self.owner_id, &entry) {
            log::error!("[RiskCache] {}: failed to persist entry: {}", self.owner_id, e);
        }
        &self.entry.insert(entry).analysis
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
        if let Err(e) = self.store.clear_risk_entry(&self.owner_id) {
            log::error!("[RiskCache] {}: failed to clear entry: {}", self.owner_id, e);
        }
    }

    /// Return the cached analysis while fresh, otherwise compute and store a
    /// new one. The flag is true on a cache hit.
    pub async fn get_or_compute<F, Fut>(
        &mut self,
        now: DateTime<Utc>,
        compute: F,
    ) -> (RiskAnalysis, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RiskAnalysis>,
    {
        if let Some(cached) = self.get(now) {
            return (cached.clone(), true);
        }
        let analysis = compute().await;
        (self.put(analysis, now).clone(), false)
    }
}
