//! Typed publish/subscribe for session state.
//!
//! Listeners run synchronously on the session task, in subscription order.
//! `publish` iterates over a copy of the listener list, so a listener may
//! subscribe or unsubscribe (itself included) while it is being called.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use prism_core::{PlatformResult, PublishEvent};

use crate::log::ActionLogEntry;
use crate::track::TrackSnapshot;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;
type ListenerList<T> = Mutex<Vec<(u64, Listener<T>)>>;

pub struct Topic<T> {
    listeners: Arc<ListenerList<T>>,
    next_id: AtomicU64,
}

impl<T: 'static> Topic<T> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(listener)));
        let list: Weak<ListenerList<T>> = Arc::downgrade(&self.listeners);
        Subscription {
            remove: Mutex::new(Some(Box::new(move || {
                if let Some(list) = list.upgrade() {
                    list.lock().retain(|(lid, _)| *lid != id);
                }
            }))),
        }
    }

    pub fn publish(&self, value: &T) {
        let snapshot: Vec<Listener<T>> = self.listeners.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in snapshot {
            listener(value);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl<T: 'static> Default for Topic<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Returned by [`Topic::subscribe`]. Dropping it does not unsubscribe.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    remove: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    /// Idempotent; safe to call from inside a listener.
    pub fn unsubscribe(&self) {
        let remove = self.remove.lock().take();
        if let Some(remove) = remove {
            remove();
        }
    }

    pub fn is_active(&self) -> bool {
        self.remove.lock().is_some()
    }
}

/// Everything a session announces.
#[derive(Default)]
pub struct SessionObservers {
    /// A track changed state.
    pub tracks: Topic<TrackSnapshot>,
    /// A log entry was appended.
    pub log: Topic<ActionLogEntry>,
    /// Every track is terminal. Fires once per session.
    pub resolved: Topic<Vec<PlatformResult>>,
    /// An event was applied (ignored events are not announced).
    pub events: Topic<PublishEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn listeners_receive_in_subscription_order() {
        let topic = Topic::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let a = seen.clone();
        let _s1 = topic.subscribe(move |v| a.lock().push(("a", *v)));
        let b = seen.clone();
        let _s2 = topic.subscribe(move |v| b.lock().push(("b", *v)));

        topic.publish(&7);
        assert_eq!(*seen.lock(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let topic = Topic::<u32>::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub = topic.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        topic.publish(&1);
        sub.unsubscribe();
        sub.unsubscribe();
        topic.publish(&2);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!sub.is_active());
        assert_eq!(topic.listener_count(), 0);
    }

    #[test]
    fn listener_can_unsubscribe_itself_mid_publish() {
        let topic = Topic::<u32>::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let h = hits.clone();
        let s = slot.clone();
        let sub = topic.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = s.lock().as_ref() {
                sub.unsubscribe();
            }
        });
        *slot.lock() = Some(sub);

        let other_hits = Arc::new(AtomicUsize::new(0));
        let o = other_hits.clone();
        let _other = topic.subscribe(move |_| {
            o.fetch_add(1, Ordering::SeqCst);
        });

        topic.publish(&1);
        topic.publish(&2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(other_hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_after_topic_dropped_is_harmless() {
        let topic = Topic::<u32>::new();
        let sub = topic.subscribe(|_| {});
        drop(topic);
        sub.unsubscribe();
    }
}
