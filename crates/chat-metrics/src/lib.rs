pub mod analytics;
pub mod bus;
pub mod events;
pub mod worker;

pub use analytics::ChatAnalytics;
pub use bus::MetricsBus;
pub use events::{ChallengeClass, EventMeta, MetricsEvent, ProtocolEvent, SessionEvent, SystemEvent};
pub use worker::AnalyticsWorker;
