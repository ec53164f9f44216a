// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed in-process event bus.
//!
//! Listeners register for one concrete event type and are invoked
//! synchronously, in registration order, on the posting thread. A listener
//! that returns an error is logged and skipped; the remaining listeners
//! still run.

pub mod events;

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chatflow_core::ChatflowError;
use tracing::{debug, warn};
use uuid::Uuid;

pub use events::*;

/// Marker for values that can travel on the bus.
pub trait Event: Any + Send + Sync {}

impl<T: Any + Send + Sync> Event for T {}

/// Handle returned by [`EventBus::register`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

type ErasedListener = Arc<dyn Fn(&dyn Any) -> Result<(), ChatflowError> + Send + Sync>;

/// Synchronous publish/subscribe hub keyed by event type.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<HashMap<TypeId, Vec<(ListenerId, ErasedListener)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `listener` to events of type `E`.
    pub fn register<E, F>(&self, listener: F) -> ListenerId
    where
        E: Event,
        F: Fn(&E) -> Result<(), ChatflowError> + Send + Sync + 'static,
    {
        let id = ListenerId(Uuid::new_v4());
        let erased: ErasedListener = Arc::new(move |event: &dyn Any| {
            match event.downcast_ref::<E>() {
                Some(event) => listener(event),
                None => Ok(()),
            }
        });
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(TypeId::of::<E>())
            .or_default()
            .push((id, erased));
        debug!(event = type_name::<E>(), listener = %id, "listener registered");
        id
    }

    /// Remove a listener. Returns false when the id is unknown.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut map = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for list in map.values_mut() {
            if let Some(pos) = list.iter().position(|(lid, _)| *lid == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Deliver `event` to every listener of its type.
    ///
    /// The listener list is snapshotted first, so listeners may register or
    /// unregister others without deadlocking.
    pub fn post<E: Event>(&self, event: E) {
        let snapshot: Vec<(ListenerId, ErasedListener)> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<E>())
            .cloned()
            .unwrap_or_default();

        for (id, listener) in snapshot {
            if let Err(e) = listener(&event) {
                warn!(
                    event = type_name::<E>(),
                    listener = %id,
                    error = %e,
                    "event listener failed"
                );
            }
        }
    }

    /// Number of listeners subscribed to `E`.
    pub fn listener_count<E: Event>(&self) -> usize {
        self.listeners
            .read()
            .map(|m| m.get(&TypeId::of::<E>()).map_or(0, Vec::len))
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let total: usize = self
            .listeners
            .read()
            .map(|m| m.values().map(Vec::len).sum())
            .unwrap_or_default();
        f.debug_struct("EventBus")
            .field("listeners", &total)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    #[derive(Debug, Clone)]
    struct Ping(u32);

    #[derive(Debug, Clone)]
    struct Pong;

    #[test]
    fn listeners_run_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            bus.register::<Ping, _>(move |p| {
                seen.lock().unwrap().push(format!("{tag}:{}", p.0));
                Ok(())
            });
        }
        bus.post(Ping(7));
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first:7", "second:7", "third:7"]
        );
    }

    #[test]
    fn events_only_reach_their_own_type() {
        let bus = EventBus::new();
        let pings = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&pings);
        bus.register::<Ping, _>(move |_| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });
        bus.post(Pong);
        assert_eq!(*pings.lock().unwrap(), 0);
        bus.post(Ping(1));
        assert_eq!(*pings.lock().unwrap(), 1);
    }

    #[test]
    #[traced_test]
    fn failing_listener_does_not_stop_others() {
        let bus = EventBus::new();
        let reached = Arc::new(Mutex::new(false));
        bus.register::<Ping, _>(|_| Err(ChatflowError::Internal("listener broke".into())));
        let flag = Arc::clone(&reached);
        bus.register::<Ping, _>(move |_| {
            *flag.lock().unwrap() = true;
            Ok(())
        });

        bus.post(Ping(0));
        assert!(*reached.lock().unwrap());
        assert!(logs_contain("event listener failed"));
    }

    #[test]
    fn unregister_removes_listener() {
        let bus = EventBus::new();
        let id = bus.register::<Ping, _>(|_| Ok(()));
        assert_eq!(bus.listener_count::<Ping>(), 1);
        assert!(bus.unregister(id));
        assert_eq!(bus.listener_count::<Ping>(), 0);
        assert!(!bus.unregister(id));
    }

    #[test]
    fn lifecycle_events_are_postable() {
        let bus = EventBus::new();
        let names = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&names);
        bus.register::<PluginStarted, _>(move |e| {
            sink.lock().unwrap().push(e.name.clone());
            Ok(())
        });
        bus.post(ApplicationStarted);
        bus.post(PluginStarted {
            name: "weather".into(),
        });
        assert_eq!(*names.lock().unwrap(), vec!["weather".to_string()]);
    }
}
