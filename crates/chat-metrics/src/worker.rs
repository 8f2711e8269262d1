use std::sync::Arc;

use log::{info, warn};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::analytics::ChatAnalytics;
use crate::bus::MetricsBus;
use crate::events::{MetricsEvent, SystemEvent};

/// Consumes events from the bus and folds them into a shared [`ChatAnalytics`].
#[derive(Clone, Default)]
pub struct AnalyticsWorker {
    analytics: Arc<RwLock<ChatAnalytics>>,
}

impl AnalyticsWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bus and a worker already draining it.
    pub fn start(capacity: usize) -> (MetricsBus, Self) {
        let (bus, rx) = MetricsBus::new(capacity);
        let worker = Self::new();
        worker.spawn(rx);
        (bus, worker)
    }

    /// Spawn the worker task. It exits once every bus clone is dropped.
    pub fn spawn(&self, mut receiver: mpsc::Receiver<MetricsEvent>) -> JoinHandle<()> {
        let analytics = Arc::clone(&self.analytics);
        tokio::spawn(async move {
            info!("AnalyticsWorker started");
            while let Some(event) = receiver.recv().await {
                if let MetricsEvent::System(SystemEvent::MetricsDropped { count, reason }) = &event {
                    warn!("Metrics dropped: {} events, reason: {}", count, reason);
                }
                analytics.write().await.apply(&event);
            }
            info!("AnalyticsWorker stopped");
        })
    }

    pub async fn snapshot(&self) -> ChatAnalytics {
        self.analytics.read().await.clone()
    }

    /// Replace the aggregate, e.g. after restoring a saved session.
    pub async fn replace(&self, analytics: ChatAnalytics) {
        *self.analytics.write().await = analytics;
    }

    pub async fn reset(&self) {
        self.replace(ChatAnalytics::default()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventMeta, SessionEvent};
    use tokio::time::{sleep, Duration};

    #[tokio::test]
    async fn worker_folds_events_into_snapshot() {
        let (bus, worker) = AnalyticsWorker::start(16);
        bus.emit(MetricsEvent::Session(SessionEvent::ModelChanged {
            meta: EventMeta::new(),
            model: "claude-3-haiku-20240307".to_string(),
        }));

        let mut seen = false;
        for _ in 0..50 {
            if worker.snapshot().await.model_changes == 1 {
                seen = true;
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert!(seen, "worker never applied the event");
    }

    #[tokio::test]
    async fn reported_drops_reach_the_aggregate() {
        let (bus, rx) = MetricsBus::new(1);
        let changed = |model: &str| {
            MetricsEvent::Session(SessionEvent::ModelChanged {
                meta: EventMeta::new(),
                model: model.to_string(),
            })
        };
        bus.emit(changed("a"));
        bus.emit(changed("b"));
        assert_eq!(bus.dropped_count(), 1);

        let worker = AnalyticsWorker::new();
        worker.spawn(rx);
        let mut reported = 0;
        for _ in 0..50 {
            reported = bus.report_drops("full");
            if reported > 0 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(reported, 1);

        let mut folded = false;
        for _ in 0..50 {
            if worker.snapshot().await.dropped_events == 1 {
                folded = true;
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert!(folded, "worker never applied the drop report");
    }

    #[tokio::test]
    async fn worker_stops_when_bus_dropped() {
        let (bus, rx) = MetricsBus::new(4);
        let worker = AnalyticsWorker::new();
        let handle = worker.spawn(rx);
        drop(bus);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker should stop")
            .expect("worker should not panic");
    }

    #[tokio::test]
    async fn replace_and_reset() {
        let worker = AnalyticsWorker::new();
        let seeded = ChatAnalytics {
            token_refreshes: 7,
            ..ChatAnalytics::default()
        };
        worker.replace(seeded).await;
        assert_eq!(worker.snapshot().await.token_refreshes, 7);
        worker.reset().await;
        assert_eq!(worker.snapshot().await, ChatAnalytics::default());
    }
}
