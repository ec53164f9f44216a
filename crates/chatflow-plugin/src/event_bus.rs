// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-plugin view of the event bus that remembers its listeners.

use std::sync::{Arc, Mutex, PoisonError};

use chatflow_bus::{Event, EventBus, ListenerId};
use chatflow_core::ChatflowError;
use tracing::debug;

/// Wraps the shared [`EventBus`] so a plugin's listeners can be removed
/// together when it stops.
#[derive(Debug)]
pub struct PluginEventBus {
    bus: Arc<EventBus>,
    registered: Mutex<Vec<ListenerId>>,
}

impl PluginEventBus {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            registered: Mutex::new(Vec::new()),
        }
    }

    pub fn register<E, F>(&self, listener: F) -> ListenerId
    where
        E: Event,
        F: Fn(&E) -> Result<(), ChatflowError> + Send + Sync + 'static,
    {
        let id = self.bus.register::<E, F>(listener);
        self.registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(id);
        id
    }

    pub fn unregister(&self, id: ListenerId) -> bool {
        self.registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|l| *l != id);
        self.bus.unregister(id)
    }

    pub fn post<E: Event>(&self, event: E) {
        self.bus.post(event);
    }

    /// Remove every listener registered through this handle.
    pub fn unregister_all(&self) -> usize {
        let ids = std::mem::take(
            &mut *self
                .registered
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let removed = ids.into_iter().filter(|id| self.bus.unregister(*id)).count();
        debug!(removed, "plugin listeners unregistered");
        removed
    }

    pub fn listener_ids(&self) -> Vec<ListenerId> {
        self.registered
            .lock()
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }
}
