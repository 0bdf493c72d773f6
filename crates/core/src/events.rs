//! Process-wide publish/subscribe channel.
//!
//! Lifecycle transitions, countdown ticks and user-facing notices are
//! published here so the core never references a view layer. Delivery is
//! synchronous on the publishing thread and in subscription order; nothing is
//! persisted.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::types::{LifecycleState, LogoutReason};

/// Severity of a user-facing notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Danger,
}

/// Message the UI should surface to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, message)
    }

    pub fn danger(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Danger, message)
    }
}

/// How close the access token is to expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Urgency {
    Normal,
    Warning,
    Critical,
}

impl Urgency {
    #[must_use]
    pub const fn for_remaining(remaining_secs: i64) -> Self {
        if remaining_secs < 10 {
            Self::Critical
        } else if remaining_secs < 30 {
            Self::Warning
        } else {
            Self::Normal
        }
    }
}

/// One second of the access-token countdown
#[derive(Debug, Clone, PartialEq)]
pub struct CountdownTick {
    pub remaining_secs: i64,
    /// `remaining / total_at_arm_time`, clamped to `[0, 1]`
    pub progress: f64,
    pub urgency: Urgency,
}

impl CountdownTick {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(remaining_secs: i64, total_secs: i64) -> Self {
        let remaining_secs = remaining_secs.max(0);
        let progress = if total_secs <= 0 {
            0.0
        } else {
            (remaining_secs as f64 / total_secs as f64).clamp(0.0, 1.0)
        };
        Self {
            remaining_secs,
            progress,
            urgency: Urgency::for_remaining(remaining_secs),
        }
    }

    /// Human readable remaining time, e.g. `4m 05s`
    #[must_use]
    pub fn label(&self) -> String {
        format!(
            "{}m {:02}s",
            self.remaining_secs / 60,
            self.remaining_secs % 60
        )
    }
}

/// Event name used for subscription routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    StateChanged,
    Countdown,
    Refreshed,
    LoggedOut,
    Revoked,
    SessionsChanged,
    SessionsListed,
    Notice,
    NavigationReset,
}

/// Everything the session core publishes
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged {
        from: LifecycleState,
        to: LifecycleState,
    },
    Countdown(CountdownTick),
    /// New token set stored; dependents should re-poll
    Refreshed { exp: i64 },
    LoggedOut { reason: LogoutReason },
    /// The server revoked the session of `device_id`
    Revoked { device_id: String },
    /// Another device's session changed; the registry should re-poll
    SessionsChanged,
    SessionsListed { count: usize },
    Notice(Notice),
    /// The visible location should be reset, e.g. to `/`
    NavigationReset { location: String },
}

impl SessionEvent {
    #[must_use]
    pub const fn name(&self) -> EventName {
        match self {
            Self::StateChanged { .. } => EventName::StateChanged,
            Self::Countdown(_) => EventName::Countdown,
            Self::Refreshed { .. } => EventName::Refreshed,
            Self::LoggedOut { .. } => EventName::LoggedOut,
            Self::Revoked { .. } => EventName::Revoked,
            Self::SessionsChanged => EventName::SessionsChanged,
            Self::SessionsListed { .. } => EventName::SessionsListed,
            Self::Notice(_) => EventName::Notice,
            Self::NavigationReset { .. } => EventName::NavigationReset,
        }
    }
}

/// Identifies one subscription for later removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    by_name: HashMap<EventName, Vec<(SubscriptionId, Handler)>>,
    wildcard: Vec<(SubscriptionId, Handler)>,
}

impl Registry {
    fn allocate(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }
}

/// Cheaply clonable handle to a shared in-memory bus
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<RwLock<Registry>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events named `name`
    pub fn subscribe<F>(&self, name: EventName, handler: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let mut registry = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let id = registry.allocate();
        registry
            .by_name
            .entry(name)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Register `handler` for every event
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let mut registry = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let id = registry.allocate();
        registry.wildcard.push((id, Arc::new(handler)));
        id
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let before = registry.wildcard.len();
        registry.wildcard.retain(|(sub, _)| *sub != id);
        let mut removed = registry.wildcard.len() != before;
        for handlers in registry.by_name.values_mut() {
            let before = handlers.len();
            handlers.retain(|(sub, _)| *sub != id);
            removed |= handlers.len() != before;
        }
        removed
    }

    /// Deliver `event` to its subscribers and return how many were called.
    ///
    /// Handlers run after the registry lock is released, so they may publish
    /// or subscribe themselves.
    pub fn publish(&self, event: SessionEvent) -> usize {
        let handlers: Vec<Handler> = {
            let registry = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            registry
                .by_name
                .get(&event.name())
                .into_iter()
                .flatten()
                .chain(registry.wildcard.iter())
                .map(|(_, handler)| handler.clone())
                .collect()
        };

        for handler in &handlers {
            handler(&event);
        }
        handlers.len()
    }

    /// Publish a user-facing notice
    pub fn notify(&self, notice: Notice) -> usize {
        tracing::debug!(level = ?notice.level, message = %notice.message, "notice");
        self.publish(SessionEvent::Notice(notice))
    }

    #[must_use]
    pub fn subscriber_count(&self, name: EventName) -> usize {
        let registry = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        registry.by_name.get(&name).map_or(0, Vec::len) + registry.wildcard.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder(bus: &EventBus, name: EventName) -> Arc<Mutex<Vec<SessionEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(name, move |event| sink.lock().unwrap().push(event.clone()));
        seen
    }

    #[test]
    fn fans_out_to_every_subscriber_of_the_name() {
        let bus = EventBus::new();
        let first = recorder(&bus, EventName::Refreshed);
        let second = recorder(&bus, EventName::Refreshed);
        let other = recorder(&bus, EventName::LoggedOut);

        let delivered = bus.publish(SessionEvent::Refreshed { exp: 42 });

        assert_eq!(delivered, 2);
        assert_eq!(first.lock().unwrap().len(), 1);
        assert_eq!(second.lock().unwrap().len(), 1);
        assert!(other.lock().unwrap().is_empty());
    }

    #[test]
    fn wildcard_sees_everything_and_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(0));
        let counter = seen.clone();
        let id = bus.subscribe_all(move |_| *counter.lock().unwrap() += 1);

        bus.publish(SessionEvent::SessionsChanged);
        bus.notify(Notice::info("hello"));
        assert_eq!(*seen.lock().unwrap(), 2);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(SessionEvent::SessionsChanged);
        assert_eq!(*seen.lock().unwrap(), 2);
    }

    #[test]
    fn handlers_may_publish_reentrantly() {
        let bus = EventBus::new();
        let nested = bus.clone();
        bus.subscribe(EventName::Revoked, move |_| {
            nested.publish(SessionEvent::SessionsChanged);
        });
        let changed = recorder(&bus, EventName::SessionsChanged);

        bus.publish(SessionEvent::Revoked {
            device_id: "d1".into(),
        });

        assert_eq!(changed.lock().unwrap().len(), 1);
    }

    #[test]
    fn countdown_tick_progress_and_label() {
        let tick = CountdownTick::new(29, 35);
        assert_eq!(tick.label(), "0m 29s");
        assert!((tick.progress - 29.0 / 35.0).abs() < f64::EPSILON);
        assert_eq!(tick.urgency, Urgency::Warning);

        let clamped = CountdownTick::new(90, 60);
        assert!((clamped.progress - 1.0).abs() < f64::EPSILON);
        assert_eq!(clamped.label(), "1m 30s");
        assert_eq!(CountdownTick::new(5, 60).urgency, Urgency::Critical);
        assert_eq!(CountdownTick::new(-3, 60).remaining_secs, 0);
    }
}
