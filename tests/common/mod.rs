#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use auraflow::models::{
    CardioReading, HealthSnapshot, MetricSource, Notification, PartialSnapshot, Settings,
};
use auraflow::services::{Collector, Notifier};
use auraflow::EngineResult;

/// Returns the same reading on every call and counts calls.
pub struct ScriptedCollector {
    partial: PartialSnapshot,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedCollector {
    pub fn boxed(partial: PartialSnapshot) -> (Box<dyn Collector>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let collector = Self {
            partial,
            calls: calls.clone(),
        };
        (Box::new(collector), calls)
    }
}

#[async_trait]
impl Collector for ScriptedCollector {
    fn source(&self) -> MetricSource {
        self.partial.source()
    }

    async fn collect(&self) -> EngineResult<PartialSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.partial.clone())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, Notification)>>,
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, owner_id: &str, notification: &Notification) -> EngineResult<()> {
        self.sent
            .lock()
            .unwrap()
            .push((owner_id.to_string(), notification.clone()));
        Ok(())
    }
}

pub fn stressed_cardio() -> PartialSnapshot {
    PartialSnapshot::Cardio(CardioReading {
        hrv: Some(38.0),
        heart_rate: Some(82.0),
        stress_level: Some(75.0),
    })
}

/// Slow-channel values already persisted from an earlier session.
pub fn persisted_background() -> HealthSnapshot {
    HealthSnapshot {
        sleep_hours: Some(5.0),
        sleep_quality: Some(55.0),
        pressure: Some(1005.0),
        screen_time_minutes: Some(400.0),
        ..Default::default()
    }
}

pub fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.ai.enabled = false;
    settings
}
