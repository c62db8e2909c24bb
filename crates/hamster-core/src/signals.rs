//! Synchronous publish/subscribe notifications.
//!
//! A [`Signal`] is one topic with an ordered list of handlers. Emitting calls
//! every handler in subscription order on the emitting thread, over a snapshot
//! of the list taken before the first call. Handlers may therefore subscribe,
//! unsubscribe, or call back into whatever emitted the signal without
//! deadlocking. A handler that returns an error or panics is logged and
//! skipped; later handlers still run.
//!
//! [`Hub`] bundles the four storage topics.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned by a failing handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

type Handler<T> = Arc<dyn Fn(&T) -> Result<(), HandlerError> + Send + Sync>;

/// Handle returned by a subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// One notification topic.
pub struct Signal<T: ?Sized> {
    name: &'static str,
    next_id: AtomicU64,
    handlers: Mutex<Vec<(SubscriptionId, Handler<T>)>>,
}

impl<T: ?Sized> Signal<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(1),
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Appends a handler. It runs after every handler subscribed before it.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&T) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));
        tracing::debug!(signal = self.name, ?id, "subscribed");
        id
    }

    /// Removes a handler. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    pub fn len(&self) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `payload` to every handler. Returns how many succeeded.
    pub fn emit(&self, payload: &T) -> usize {
        let snapshot: Vec<Handler<T>> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        let mut delivered = 0;
        for handler in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(payload))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(err)) => {
                    tracing::warn!(signal = self.name, error = %err, "notification handler failed");
                }
                Err(_) => {
                    tracing::warn!(signal = self.name, "notification handler panicked");
                }
            }
        }
        delivered
    }
}

impl<T: ?Sized> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.name)
            .field("handlers", &self.len())
            .finish()
    }
}

/// Storage notification topics. None of them carries a payload: observers
/// re-query the storage to learn what changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    TagsChanged,
    FactsChanged,
    ActivitiesChanged,
    /// A request for any attached presentation layer to show or hide itself.
    ToggleCalled,
}

impl Topic {
    pub const ALL: [Self; 4] = [
        Self::TagsChanged,
        Self::FactsChanged,
        Self::ActivitiesChanged,
        Self::ToggleCalled,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TagsChanged => "tags-changed",
            Self::FactsChanged => "facts-changed",
            Self::ActivitiesChanged => "activities-changed",
            Self::ToggleCalled => "toggle-called",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unknown topic name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown topic: {0}")]
pub struct UnknownTopic(pub String);

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|topic| topic.as_str() == s)
            .ok_or_else(|| UnknownTopic(s.to_string()))
    }
}

/// The four storage topics.
#[derive(Debug)]
pub struct Hub {
    tags_changed: Signal<()>,
    facts_changed: Signal<()>,
    activities_changed: Signal<()>,
    toggle_called: Signal<()>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub const fn new() -> Self {
        Self {
            tags_changed: Signal::new(Topic::TagsChanged.as_str()),
            facts_changed: Signal::new(Topic::FactsChanged.as_str()),
            activities_changed: Signal::new(Topic::ActivitiesChanged.as_str()),
            toggle_called: Signal::new(Topic::ToggleCalled.as_str()),
        }
    }

    pub const fn signal(&self, topic: Topic) -> &Signal<()> {
        match topic {
            Topic::TagsChanged => &self.tags_changed,
            Topic::FactsChanged => &self.facts_changed,
            Topic::ActivitiesChanged => &self.activities_changed,
            Topic::ToggleCalled => &self.toggle_called,
        }
    }

    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn() -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.signal(topic).subscribe(move |_: &()| handler())
    }

    pub fn unsubscribe(&self, topic: Topic, id: SubscriptionId) -> bool {
        self.signal(topic).unsubscribe(id)
    }

    pub fn publish(&self, topic: Topic) -> usize {
        tracing::debug!(%topic, "publishing");
        self.signal(topic).emit(&())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_delivers_in_subscription_order() {
        let signal: Signal<str> = Signal::new("test");
        let seen = Arc::new(Mutex::new(Vec::new()));
        for label in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            signal.subscribe(move |payload: &str| {
                seen.lock().unwrap().push(format!("{label}:{payload}"));
                Ok(())
            });
        }

        assert_eq!(signal.emit("ping"), 3);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first:ping", "second:ping", "third:ping"]
        );
    }

    #[test]
    fn test_failing_handler_does_not_stop_delivery() {
        let hub = Hub::new();
        let calls = Arc::new(AtomicUsize::new(0));
        hub.subscribe(Topic::FactsChanged, || Err("boom".into()));
        hub.subscribe(Topic::FactsChanged, || panic!("observer bug"));
        let counter = Arc::clone(&calls);
        hub.subscribe(Topic::FactsChanged, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(hub.publish(Topic::FactsChanged), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_topics_are_independent() {
        let hub = Hub::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        hub.subscribe(Topic::TagsChanged, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        hub.publish(Topic::FactsChanged);
        hub.publish(Topic::ToggleCalled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        hub.publish(Topic::TagsChanged);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let hub = Hub::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let id = hub.subscribe(Topic::ActivitiesChanged, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(hub.unsubscribe(Topic::ActivitiesChanged, id));
        assert!(!hub.unsubscribe(Topic::ActivitiesChanged, id));
        hub.publish(Topic::ActivitiesChanged);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handler_may_subscribe_during_delivery() {
        let hub = Arc::new(Hub::new());
        let inner_calls = Arc::new(AtomicUsize::new(0));
        let hub_ref = Arc::downgrade(&hub);
        let counter = Arc::clone(&inner_calls);
        hub.subscribe(Topic::FactsChanged, move || {
            if let Some(hub) = hub_ref.upgrade() {
                let counter = Arc::clone(&counter);
                hub.subscribe(Topic::FactsChanged, move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
            }
            Ok(())
        });

        // The handler added during the first delivery only sees the second.
        assert_eq!(hub.publish(Topic::FactsChanged), 1);
        assert_eq!(inner_calls.load(Ordering::SeqCst), 0);
        assert_eq!(hub.publish(Topic::FactsChanged), 2);
        assert_eq!(inner_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_topic_names_round_trip() {
        for topic in Topic::ALL {
            assert_eq!(topic.as_str().parse::<Topic>().unwrap(), topic);
        }
        assert!("files-changed".parse::<Topic>().is_err());
    }
}
