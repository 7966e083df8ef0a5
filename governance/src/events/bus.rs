//! Event bus for governance decisions
//!
//! Two delivery paths per publish:
//!
//! 1. Registered [`EventHandler`]s, called synchronously in registration
//!    order. A failing handler is logged and skipped; later handlers still
//!    run.
//! 2. A Tokio broadcast channel for async subscribers. Slow subscribers may
//!    lag and lose events.
//!
//! Delivery is best-effort and at-least-once per handler.

use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::types::GovernanceEvent;

/// Events buffered per subscriber before it starts lagging
const CHANNEL_CAPACITY: usize = 256;

/// Failures surfaced by handlers or the broadcast channel
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Handler {handler} failed: {message}")]
    HandlerFailed { handler: String, message: String },

    #[error("Channel closed")]
    ChannelClosed,
}

/// Handler result
pub type EventBusResult<T> = Result<T, EventBusError>;

/// Bus handle shared between the governor and its sweeps
pub type SharedEventBus = Arc<EventBus>;

/// Synchronous event callback.
pub trait EventHandler: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    fn handle(&self, event: &GovernanceEvent) -> EventBusResult<()>;
}

/// Delivery counts for one publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub handlers_ok: usize,
    pub handlers_failed: usize,
    pub receivers: usize,
}

/// Event bus with ordered handlers and broadcast subscribers
pub struct EventBus {
    /// Async fan-out to subscribers
    sender: broadcast::Sender<GovernanceEvent>,

    /// Handlers in registration order
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Wrap in an `Arc`
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Append a handler; it runs after every handler registered before it.
    pub fn register_handler(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        debug!(handler = handler.name(), position = handlers.len(), "Handler registered");
        handlers.push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Publish an event to all handlers and subscribers
    pub fn publish(&self, event: GovernanceEvent) -> PublishReport {
        let event_type = event.event_type();
        let mut report = PublishReport::default();

        let handlers: Vec<Arc<dyn EventHandler>> = self
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for handler in handlers {
            match handler.handle(&event) {
                Ok(()) => report.handlers_ok += 1,
                Err(e) => {
                    warn!(event_type, handler = handler.name(), error = %e, "Event handler failed");
                    report.handlers_failed += 1;
                }
            }
        }

        // No subscribers is not an error
        match self.sender.send(event) {
            Ok(count) => {
                debug!(event_type, receivers = count, "Event published");
                report.receivers = count;
            }
            Err(_) => {
                debug!(event_type, "Event published (no receivers)");
            }
        }
        report
    }

    /// New broadcast receiver; sees events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<GovernanceEvent> {
        self.sender.subscribe()
    }

    /// Live broadcast receivers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Narrows a subscription to one group, one alert, or a set of event types
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Filter by dedup group
    pub group_id: Option<String>,
    /// Filter by alert
    pub alert_id: Option<String>,
    /// Filter by event types
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Matches everything
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(mut self, group_id: &str) -> Self {
        self.group_id = Some(group_id.to_string());
        self
    }

    pub fn alert(mut self, alert_id: &str) -> Self {
        self.alert_id = Some(alert_id.to_string());
        self
    }

    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    /// Check if an event matches this filter. Scope filters reject events
    /// that carry no such scope.
    pub fn matches(&self, event: &GovernanceEvent) -> bool {
        if let Some(ref gid) = self.group_id {
            if event.group_id() != Some(gid.as_str()) {
                return false;
            }
        }
        if let Some(ref aid) = self.alert_id {
            if event.alert_id() != Some(aid.as_str()) {
                return false;
            }
        }
        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }
        true
    }
}

/// Receiver that drops events the filter rejects
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<GovernanceEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<GovernanceEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Wait for the next event the filter accepts
    pub async fn recv(&mut self) -> Result<GovernanceEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

impl EventBus {
    /// Subscribe, keeping only events that pass `filter`
    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;

    struct Recorder {
        name: String,
        seen: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl EventHandler for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        fn handle(&self, event: &GovernanceEvent) -> EventBusResult<()> {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, event.event_type()));
            if self.fail {
                Err(EventBusError::HandlerFailed {
                    handler: self.name.clone(),
                    message: "boom".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn unack(id: &str) -> GovernanceEvent {
        GovernanceEvent::AlertUnacknowledged {
            alert_id: id.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();
        let report = bus.publish(unack("a1"));
        assert_eq!(report.receivers, 1);
        let received = receiver.recv().await.unwrap();
        assert_eq!(received.event_type(), "alert_unacknowledged");
    }

    #[test]
    fn test_handlers_run_in_order_despite_failure() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for (name, fail) in [("first", false), ("second", true), ("third", false)] {
            bus.register_handler(Arc::new(Recorder {
                name: name.to_string(),
                seen: seen.clone(),
                fail,
            }));
        }

        let report = bus.publish(unack("a1"));
        assert_eq!(report.handlers_ok, 2);
        assert_eq!(report.handlers_failed, 1);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "first:alert_unacknowledged",
                "second:alert_unacknowledged",
                "third:alert_unacknowledged",
            ]
        );
    }

    #[test]
    fn test_event_filter() {
        let filter = EventFilter::new().alert("a1").types(vec!["alert_unacknowledged"]);
        assert!(filter.matches(&unack("a1")));
        assert!(!filter.matches(&unack("a2")));
        assert!(!EventFilter::new().group("g").matches(&unack("a1")));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let bus = EventBus::new().shared();
        let mut filtered = bus.subscribe_filtered(EventFilter::new().alert("target"));

        let publisher = bus.clone();
        tokio::spawn(async move {
            publisher.publish(unack("other"));
            publisher.publish(unack("target"));
        });

        let event = filtered.recv().await.unwrap();
        assert_eq!(event.alert_id(), Some("target"));
    }
}
