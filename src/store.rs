//! ValueStore - last-sent controller values with subscription support
//!
//! Keeps two indexes over the same values: one keyed by (channel, controller)
//! where the last writer wins across devices, and one keyed by
//! (device, channel, controller). Both are written under a single lock.

mod types;

pub use types::{ChannelMap, ControllerMap, ControllerValue, StoreSnapshot, ValueLookup, ValueQuery};

use parking_lot::{ReentrantMutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

/// Subscriber callback, invoked after every update
pub type SubscriberFn = Arc<dyn Fn(&ControllerValue) + Send + Sync>;

type SubscriberList = RwLock<Vec<(u64, SubscriberFn)>>;

/// Stores controller values and notifies subscribers on updates
#[derive(Clone, Default)]
pub struct ValueStore {
    values: Arc<RwLock<StoreSnapshot>>,
    subscribers: Arc<SubscriberList>,
    next_subscriber: Arc<AtomicU64>,
    /// Held from the write through notification, so listeners observe
    /// updates in write order. Reentrant so a listener may update.
    dispatch: Arc<ReentrantMutex<()>>,
}

/// Registration token returned by [`ValueStore::subscribe`]
///
/// Dropping the token keeps the callback registered.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    id: u64,
    subscribers: Weak<SubscriberList>,
}

impl Subscription {
    /// Remove the callback. A no-op when the store is already gone.
    pub fn unsubscribe(self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.write().retain(|(id, _)| *id != self.id);
        }
    }
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a value into both indexes, then notify subscribers
    pub fn update(&self, device_id: &str, channel: u8, controller: u8, value: u8) {
        let _dispatch = self.dispatch.lock();
        {
            let mut values = self.values.write();
            values
                .by_channel
                .entry(channel)
                .or_default()
                .insert(controller, value);
            values
                .by_device
                .entry(device_id.to_string())
                .or_default()
                .entry(channel)
                .or_default()
                .insert(controller, value);
        }

        trace!(device_id, channel, controller, value, "Controller value stored");

        let record = ControllerValue {
            device_id: device_id.to_string(),
            channel,
            controller,
            value,
        };

        // Snapshot the list so callbacks may subscribe or read the store
        let subscribers: Vec<SubscriberFn> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, f)| f.clone())
            .collect();
        for subscriber in subscribers {
            subscriber(&record);
        }
    }

    /// Dispatch a lookup by query shape
    pub fn get(&self, query: &ValueQuery) -> ValueLookup {
        match query {
            ValueQuery::All => ValueLookup::Snapshot(self.snapshot()),
            ValueQuery::Channel(channel) => ValueLookup::Channel(self.channel_values(*channel)),
            ValueQuery::Controller { channel, controller } => {
                ValueLookup::Value(self.value(*channel, *controller))
            }
            ValueQuery::Device { id, channel, controller } => {
                ValueLookup::Device(self.device_values(id, *channel, *controller))
            }
        }
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.values.read().clone()
    }

    /// All controller values on a channel, last writer wins across devices
    pub fn channel_values(&self, channel: u8) -> ControllerMap {
        self.values
            .read()
            .by_channel
            .get(&channel)
            .cloned()
            .unwrap_or_default()
    }

    pub fn value(&self, channel: u8, controller: u8) -> Option<u8> {
        self.values
            .read()
            .by_channel
            .get(&channel)
            .and_then(|controllers| controllers.get(&controller))
            .copied()
    }

    /// Records for one device, ordered by channel then controller
    pub fn device_values(
        &self,
        device_id: &str,
        channel: Option<u8>,
        controller: Option<u8>,
    ) -> Vec<ControllerValue> {
        let values = self.values.read();
        let Some(channels) = values.by_device.get(device_id) else {
            return Vec::new();
        };

        channels
            .iter()
            .filter(|(ch, _)| channel.map_or(true, |wanted| **ch == wanted))
            .flat_map(|(ch, controllers)| {
                controllers
                    .iter()
                    .filter(|(cc, _)| controller.map_or(true, |wanted| **cc == wanted))
                    .map(move |(cc, value)| ControllerValue {
                        device_id: device_id.to_string(),
                        channel: *ch,
                        controller: *cc,
                        value: *value,
                    })
            })
            .collect()
    }

    /// Register a callback for future updates
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ControllerValue) + Send + Sync + 'static,
    {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().push((id, Arc::new(listener)));
        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Number of tracked (device, channel, controller) triples
    pub fn len(&self) -> usize {
        self.values
            .read()
            .by_device
            .values()
            .flat_map(|channels| channels.values())
            .map(|controllers| controllers.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        *self.values.write() = StoreSnapshot::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_update_and_get() {
        let store = ValueStore::new();
        store.update("dev1", 1, 7, 100);

        assert_eq!(store.value(1, 7), Some(100));
        assert_eq!(
            store.get(&ValueQuery::Controller { channel: 1, controller: 7 }),
            ValueLookup::Value(Some(100))
        );

        let records = store.device_values("dev1", Some(1), None);
        assert_eq!(
            records,
            vec![ControllerValue {
                device_id: "dev1".to_string(),
                channel: 1,
                controller: 7,
                value: 100,
            }]
        );
    }

    #[test]
    fn test_last_writer_wins_across_devices() {
        let store = ValueStore::new();
        store.update("a", 0, 10, 1);
        store.update("b", 0, 10, 2);

        assert_eq!(store.value(0, 10), Some(2));
        assert_eq!(store.device_values("a", Some(0), Some(10))[0].value, 1);
        assert_eq!(store.device_values("b", Some(0), Some(10))[0].value, 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_update_is_idempotent() {
        let once = ValueStore::new();
        once.update("dev", 3, 20, 64);

        let twice = ValueStore::new();
        twice.update("dev", 3, 20, 64);
        twice.update("dev", 3, 20, 64);

        assert_eq!(once.snapshot(), twice.snapshot());
        assert_eq!(twice.len(), 1);
    }

    #[test]
    fn test_overwrite_keeps_no_history() {
        let store = ValueStore::new();
        store.update("dev", 3, 20, 1);
        store.update("dev", 3, 20, 127);

        assert_eq!(store.value(3, 20), Some(127));
        assert_eq!(store.device_values("dev", None, None).len(), 1);
    }

    #[test]
    fn test_channel_query() {
        let store = ValueStore::new();
        store.update("dev", 2, 1, 10);
        store.update("dev", 2, 5, 50);
        store.update("dev", 3, 1, 99);

        let channel = store.channel_values(2);
        assert_eq!(channel.len(), 2);
        assert_eq!(channel.get(&5), Some(&50));
        assert_eq!(store.get(&ValueQuery::Channel(2)), ValueLookup::Channel(channel));
    }

    #[test]
    fn test_device_filters() {
        let store = ValueStore::new();
        store.update("dev", 0, 1, 10);
        store.update("dev", 0, 2, 20);
        store.update("dev", 1, 1, 30);

        assert_eq!(store.device_values("dev", None, None).len(), 3);
        assert_eq!(store.device_values("dev", Some(0), None).len(), 2);
        assert_eq!(store.device_values("dev", None, Some(1)).len(), 2);

        let lookup = store.get(&ValueQuery::Device {
            id: "dev".to_string(),
            channel: Some(1),
            controller: Some(1),
        });
        assert_eq!(lookup.as_records().len(), 1);
        assert_eq!(lookup.as_records()[0].value, 30);
    }

    #[test]
    fn test_unknown_lookups_are_empty() {
        let store = ValueStore::new();
        assert_eq!(store.value(0, 0), None);
        assert!(store.channel_values(4).is_empty());
        assert!(store.device_values("missing", Some(1), Some(1)).is_empty());
        assert_eq!(store.get(&ValueQuery::All), ValueLookup::Snapshot(StoreSnapshot::default()));
        assert!(store.is_empty());
    }

    #[test]
    fn test_subscribe_fires_on_update() {
        let store = ValueStore::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let _subscription = store.subscribe(move |record| {
            assert_eq!(record.controller, 7);
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        store.update("dev", 1, 7, 100);
        store.update("dev", 1, 7, 100);

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let store = ValueStore::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let subscription = store.subscribe(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });
        store.update("dev", 0, 0, 1);
        subscription.unsubscribe();
        store.update("dev", 0, 0, 2);

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn test_subscriber_can_read_store() {
        let store = ValueStore::new();
        let reader = store.clone();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();

        let _subscription = store.subscribe(move |record| {
            let current = reader.value(record.channel, record.controller).unwrap_or(0);
            seen_clone.store(current as usize, Ordering::SeqCst);
        });
        store.update("dev", 0, 1, 42);

        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_notifications_follow_write_order_across_threads() {
        let store = ValueStore::new();
        let last_seen = Arc::new(parking_lot::Mutex::new(None));
        let last_clone = last_seen.clone();
        let _subscription = store.subscribe(move |record| {
            *last_clone.lock() = Some(record.value);
        });

        let writers: Vec<_> = (0..2u8)
            .map(|offset| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..500u32 {
                        store.update("dev", 0, 7, ((i as u8) % 64) * 2 + offset);
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(*last_seen.lock(), store.value(0, 7));
    }

    #[test]
    fn test_subscriber_can_update() {
        let store = ValueStore::new();
        let writer = store.clone();
        let _subscription = store.subscribe(move |record| {
            if record.controller == 1 {
                writer.update(&record.device_id, record.channel, 2, record.value);
            }
        });

        store.update("dev", 0, 1, 9);
        assert_eq!(store.value(0, 2), Some(9));
    }

    #[test]
    fn test_clear() {
        let store = ValueStore::new();
        store.update("dev", 0, 1, 1);
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.value(0, 1), None);
    }
}
