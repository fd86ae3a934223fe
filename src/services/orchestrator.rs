//! Per-owner collection scheduler.
//!
//! Each collector runs on its own timer in its own task, so a blocked or
//! failing source never delays the others. Collectors only produce partial
//! snapshots; a single merge task owns the rolling snapshot, persists it and
//! publishes every update through a watch channel.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::collectors::Collector;
use crate::database::Store;
use crate::error::EngineError;
use crate::models::{CollectionSettings, HealthSnapshot, MetricSource, PartialSnapshot};

const MERGE_QUEUE_DEPTH: usize = 64;

/// A merged snapshot together with the source whose reading produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotUpdate {
    pub source: MetricSource,
    pub snapshot: HealthSnapshot,
    pub at: DateTime<Utc>,
    /// Increments with every published update.
    pub sequence: u64,
}

pub struct Orchestrator {
    owner_id: String,
    shutdown: watch::Sender<bool>,
    updates: watch::Receiver<Option<SnapshotUpdate>>,
    handles: Vec<JoinHandle<()>>,
}

impl Orchestrator {
    /// Spawn one task per collector plus the merge task. Every collector runs
    /// once immediately, then on its configured interval.
    pub fn start(
        owner_id: &str,
        collectors: Vec<Box<dyn Collector>>,
        settings: &CollectionSettings,
        store: Arc<Store>,
        initial: HealthSnapshot,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (partial_tx, partial_rx) = mpsc::channel(MERGE_QUEUE_DEPTH);
        let (update_tx, update_rx) = watch::channel(None);

        let mut handles = Vec::with_capacity(collectors.len() + 1);
        for collector in collectors {
            let source = collector.source();
            log::info!(
                "[Orchestrator] {}: starting {} collector every {:?}",
                owner_id,
                source,
                settings.interval_for(source)
            );
            handles.push(tokio::spawn(run_collector(
                owner_id.to_string(),
                collector,
                settings.interval_for(source),
                settings.collector_timeout(),
                partial_tx.clone(),
                shutdown_rx.clone(),
            )));
        }
        drop(partial_tx);

        let history_intervals = MetricSource::ALL
            .iter()
            .map(|s| (*s, settings.history_interval_for(*s)))
            .collect();
        handles.push(tokio::spawn(run_merger(
            owner_id.to_string(),
            store,
            initial,
            history_intervals,
            partial_rx,
            update_tx,
            shutdown_rx,
        )));

        Self {
            owner_id: owner_id.to_string(),
            shutdown: shutdown_tx,
            updates: update_rx,
            handles,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SnapshotUpdate>> {
        self.updates.clone()
    }

    pub fn latest(&self) -> Option<SnapshotUpdate> {
        self.updates.borrow().clone()
    }

    /// Cancel every task and wait for them to finish. Nothing is collected or
    /// merged once this returns.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for result in join_all(self.handles).await {
            if let Err(e) = result {
                log::error!("[Orchestrator] {}: task ended abnormally: {}", self.owner_id, e);
            }
        }
        log::info!("[Orchestrator] {}: stopped", self.owner_id);
    }
}

async fn run_collector(
    owner_id: String,
    collector: Box<dyn Collector>,
    period: Duration,
    timeout: Duration,
    partials: mpsc::Sender<PartialSnapshot>,
    mut shutdown: watch::Receiver<bool>,
) {
    let source = collector.source();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }
        if *shutdown.borrow() {
            break;
        }

        let outcome = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            outcome = tokio::time::timeout(timeout, collector.collect()) => outcome,
        };

        let error = match outcome {
            Ok(Ok(partial)) if partial.source() == source => {
                if partials.send(partial).await.is_err() {
                    break;
                }
                continue;
            }
            Ok(Ok(partial)) => EngineError::collection(
                source,
                format!("returned a {} reading", partial.source()),
            ),
            Ok(Err(e)) => e,
            Err(_) => EngineError::CollectorTimeout {
                channel: source,
                secs: timeout.as_secs(),
            },
        };
        log::warn!("[Orchestrator] {}: {} (keeping previous values)", owner_id, error);
    }
    log::debug!("[Orchestrator] {}: {} collector exited", owner_id, source);
}

async fn run_merger(
    owner_id: String,
    store: Arc<Store>,
    mut snapshot: HealthSnapshot,
    history_intervals: HashMap<MetricSource, Duration>,
    mut partials: mpsc::Receiver<PartialSnapshot>,
    updates: watch::Sender<Option<SnapshotUpdate>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut last_sampled: HashMap<MetricSource, Instant> = HashMap::new();
    let mut persisted = snapshot.fingerprint();
    let mut sequence = 0u64;

    loop {
        let partial = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            partial = partials.recv() => match partial {
                Some(partial) => partial,
                None => break,
            },
        };

        let source = partial.source();
        let now = Utc::now();
        if snapshot.merge(&partial, now) == 0 {
            log::debug!("[Orchestrator] {}: {} reading had no usable values", owner_id, source);
            continue;
        }

        let fingerprint = snapshot.fingerprint();
        if fingerprint != persisted {
            match store.save_snapshot(&owner_id, &snapshot, now) {
                Ok(()) => persisted = fingerprint,
                Err(e) => log::error!("[Orchestrator] {}: failed to persist snapshot: {}", owner_id, e),
            }
        }

        let interval = history_intervals.get(&source).copied().unwrap_or_default();
        let due = last_sampled
            .get(&source)
            .map_or(true, |at| at.elapsed() >= interval);
        if due {
            match store.append_history(&owner_id, source, now, &snapshot) {
                Ok(()) => {
                    last_sampled.insert(source, Instant::now());
                }
                Err(e) => log::error!("[Orchestrator] {}: failed to sample history: {}", owner_id, e),
            }
        }

        sequence += 1;
        updates.send_replace(Some(SnapshotUpdate {
            source,
            snapshot: snapshot.clone(),
            at: now,
            sequence,
        }));
    }
    log::debug!("[Orchestrator] {}: merge task exited", owner_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineResult;
    use crate::models::{CardioReading, WeatherReading};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        source: MetricSource,
        calls: Arc<AtomicUsize>,
        behaviour: Behaviour,
    }

    #[derive(Clone, Copy)]
    enum Behaviour {
        Healthy,
        Failing,
        Hanging,
    }

    #[async_trait]
    impl Collector for Counting {
        fn source(&self) -> MetricSource {
            self.source
        }

        async fn collect(&self) -> EngineResult<PartialSnapshot> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as f64;
            match (self.behaviour, self.source) {
                (Behaviour::Failing, source) => Err(EngineError::collection(source, "offline")),
                (Behaviour::Hanging, _) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(EngineError::collection(self.source, "unreachable"))
                }
                (Behaviour::Healthy, MetricSource::Weather) => {
                    Ok(PartialSnapshot::Weather(WeatherReading {
                        pressure: Some(1008.0),
                        ..Default::default()
                    }))
                }
                (Behaviour::Healthy, _) => Ok(PartialSnapshot::Cardio(CardioReading {
                    hrv: Some(50.0 + n),
                    heart_rate: Some(70.0),
                    stress_level: None,
                })),
            }
        }
    }

    fn counting(source: MetricSource, behaviour: Behaviour) -> (Box<dyn Collector>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let collector = Counting {
            source,
            calls: calls.clone(),
            behaviour,
        };
        (Box::new(collector), calls)
    }

    #[tokio::test(start_paused = true)]
    async fn each_source_keeps_its_own_cadence() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let (cardio, cardio_calls) = counting(MetricSource::Cardio, Behaviour::Healthy);
        let (weather, weather_calls) = counting(MetricSource::Weather, Behaviour::Healthy);

        let orchestrator = Orchestrator::start(
            "ana",
            vec![cardio, weather],
            &CollectionSettings::default(),
            store.clone(),
            HealthSnapshot::default(),
        );
        tokio::time::sleep(Duration::from_secs(12)).await;

        // immediate first run, then 5 s cadence
        assert_eq!(cardio_calls.load(Ordering::SeqCst), 3);
        assert_eq!(weather_calls.load(Ordering::SeqCst), 1);

        let latest = orchestrator.latest().unwrap();
        assert_eq!(latest.snapshot.hrv, Some(52.0));
        assert_eq!(latest.snapshot.pressure, Some(1008.0));
        orchestrator.stop().await;

        let persisted = store.load_snapshot("ana").unwrap().unwrap();
        assert_eq!(persisted.hrv, Some(52.0));
        assert_eq!(persisted.pressure, Some(1008.0));
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_runs_after_stop() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let (cardio, calls) = counting(MetricSource::Cardio, Behaviour::Healthy);
        let orchestrator = Orchestrator::start(
            "ana",
            vec![cardio],
            &CollectionSettings::default(),
            store,
            HealthSnapshot::default(),
        );
        tokio::time::sleep(Duration::from_secs(6)).await;
        let updates = orchestrator.subscribe();
        orchestrator.stop().await;

        let seen = calls.load(Ordering::SeqCst);
        let last = updates.borrow().as_ref().map(|u| u.sequence);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), seen);
        assert_eq!(updates.borrow().as_ref().map(|u| u.sequence), last);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_and_hanging_sources_do_not_block_others() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let (cardio, cardio_calls) = counting(MetricSource::Cardio, Behaviour::Healthy);
        let (weather, _) = counting(MetricSource::Weather, Behaviour::Hanging);
        let (sleep, sleep_calls) = counting(MetricSource::Sleep, Behaviour::Failing);

        let initial = HealthSnapshot {
            pressure: Some(1012.0),
            sleep_hours: Some(7.0),
            ..Default::default()
        };
        let orchestrator = Orchestrator::start(
            "ana",
            vec![cardio, weather, sleep],
            &CollectionSettings::default(),
            store,
            initial,
        );
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert_eq!(cardio_calls.load(Ordering::SeqCst), 7);
        assert_eq!(sleep_calls.load(Ordering::SeqCst), 1);
        let latest = orchestrator.latest().unwrap().snapshot;
        assert_eq!(latest.pressure, Some(1012.0));
        assert_eq!(latest.sleep_hours, Some(7.0));
        assert_eq!(latest.hrv, Some(56.0));
        orchestrator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn fast_channel_history_is_rate_limited() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let (cardio, _) = counting(MetricSource::Cardio, Behaviour::Healthy);
        let orchestrator = Orchestrator::start(
            "ana",
            vec![cardio],
            &CollectionSettings::default(),
            store.clone(),
            HealthSnapshot::default(),
        );
        // 25 cardio readings over two minutes, sampled once per minute
        tokio::time::sleep(Duration::from_secs(122)).await;
        orchestrator.stop().await;

        assert_eq!(store.storage_stats().unwrap().history_samples_count, 3);
    }
}
