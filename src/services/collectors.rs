use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::{EngineError, EngineResult};
use crate::models::{MetricSource, PartialSnapshot};

/// One acquisition channel. Implementations return only the fields their
/// source owns and report failures as errors instead of panicking.
#[async_trait]
pub trait Collector: Send + Sync {
    fn source(&self) -> MetricSource;

    async fn collect(&self) -> EngineResult<PartialSnapshot>;
}

/// Parse a source's reading JSON into the matching partial snapshot.
pub fn parse_reading(source: MetricSource, json: &str) -> EngineResult<PartialSnapshot> {
    let parsed = match source {
        MetricSource::Cardio => serde_json::from_str(json).map(PartialSnapshot::Cardio),
        MetricSource::Phone => serde_json::from_str(json).map(PartialSnapshot::Phone),
        MetricSource::Weather => serde_json::from_str(json).map(PartialSnapshot::Weather),
        MetricSource::Sleep => serde_json::from_str(json).map(PartialSnapshot::Sleep),
        MetricSource::Calendar => serde_json::from_str(json).map(PartialSnapshot::Calendar),
    };
    parsed.map_err(|e| EngineError::collection(source, format!("invalid reading: {}", e)))
}

/// Reads the latest reading a device bridge dropped at
/// `<feed_dir>/<source>.json`.
pub struct JsonFeedCollector {
    source: MetricSource,
    path: PathBuf,
}

impl JsonFeedCollector {
    pub fn new(feed_dir: &Path, source: MetricSource) -> Self {
        Self {
            source,
            path: feed_dir.join(format!("{}.json", source.as_str())),
        }
    }

    /// One collector per source, all reading from the same directory.
    pub fn all(feed_dir: &Path) -> Vec<Box<dyn Collector>> {
        MetricSource::ALL
            .iter()
            .map(|source| Box::new(Self::new(feed_dir, *source)) as Box<dyn Collector>)
            .collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Collector for JsonFeedCollector {
    fn source(&self) -> MetricSource {
        self.source
    }

    async fn collect(&self) -> EngineResult<PartialSnapshot> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            EngineError::collection(self.source, format!("{}: {}", self.path.display(), e))
        })?;
        parse_reading(self.source, &text)
    }
}
