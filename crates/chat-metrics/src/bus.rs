use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::events::{MetricsEvent, SystemEvent};

/// Bounded, non-blocking event bus between the chat pipeline and analytics.
///
/// Emission never waits: when the channel is full or closed the event is
/// dropped and counted.
#[derive(Clone)]
pub struct MetricsBus {
    tx: mpsc::Sender<MetricsEvent>,
    dropped: Arc<AtomicU64>,
    reported: Arc<AtomicU64>,
}

impl MetricsBus {
    /// Returns the bus (for emitting events) and the receiver (for consuming events)
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<MetricsEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
                reported: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// A bus whose receiver is already gone. Every event is counted as
    /// dropped; useful where analytics is switched off.
    pub fn disconnected() -> Self {
        let (bus, rx) = Self::new(1);
        drop(rx);
        bus
    }

    pub fn emit(&self, event: MetricsEvent) {
        if let Err(err) = self.tx.try_send(event) {
            let count = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if let mpsc::error::TrySendError::Full(event) = err {
                log::debug!("Metrics channel full, dropped {} (total {})", event.name(), count);
            }
        }
    }

    /// Send a `MetricsDropped` event for drops not yet reported. Returns the
    /// count reported, 0 when there was nothing new or the channel is still
    /// full. The notification itself is never counted as a drop.
    pub fn report_drops(&self, reason: &str) -> u64 {
        let dropped = self.dropped.load(Ordering::Relaxed);
        let reported = self.reported.load(Ordering::Relaxed);
        if dropped <= reported {
            return 0;
        }
        // Claim the range so concurrent clones do not report it twice.
        if self
            .reported
            .compare_exchange(reported, dropped, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return 0;
        }

        let count = dropped - reported;
        let event = MetricsEvent::System(SystemEvent::MetricsDropped {
            count,
            reason: reason.to_string(),
        });
        match self.tx.try_send(event) {
            Ok(()) => count,
            Err(_) => {
                self.reported.fetch_sub(count, Ordering::Relaxed);
                0
            }
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Check if the channel is closed (receiver dropped)
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
