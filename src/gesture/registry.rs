//! Callback storage keyed by (key, gesture)

use super::{GestureEvent, GestureKind};
use crate::keyboard::LogicalKey;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Callback bound to one (key, gesture) pair
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Callback that sees every gesture
pub type Observer = Arc<dyn Fn(&GestureEvent) + Send + Sync>;

/// Handle returned by registration, used to cancel it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(u64);

#[derive(Debug, Clone, Copy)]
enum Slot {
    Gesture(LogicalKey, GestureKind),
    Observer,
}

/// Registered callbacks, in registration order per (key, gesture)
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: HashMap<(LogicalKey, GestureKind), Vec<(RegistrationId, Callback)>>,
    observers: Vec<(RegistrationId, Observer)>,
    index: HashMap<RegistrationId, Slot>,
    next_id: u64,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> RegistrationId {
        self.next_id += 1;
        RegistrationId(self.next_id)
    }

    pub fn register(
        &mut self,
        key: LogicalKey,
        gesture: GestureKind,
        callback: Callback,
    ) -> RegistrationId {
        let id = self.next_id();
        self.callbacks
            .entry((key, gesture))
            .or_default()
            .push((id, callback));
        self.index.insert(id, Slot::Gesture(key, gesture));
        id
    }

    pub fn subscribe(&mut self, observer: Observer) -> RegistrationId {
        let id = self.next_id();
        self.observers.push((id, observer));
        self.index.insert(id, Slot::Observer);
        id
    }

    /// Remove a registration. Returns false if it was already gone.
    pub fn cancel(&mut self, id: RegistrationId) -> bool {
        match self.index.remove(&id) {
            Some(Slot::Gesture(key, gesture)) => {
                if let Some(list) = self.callbacks.get_mut(&(key, gesture)) {
                    list.retain(|(rid, _)| *rid != id);
                    if list.is_empty() {
                        self.callbacks.remove(&(key, gesture));
                    }
                }
                true
            }
            Some(Slot::Observer) => {
                self.observers.retain(|(rid, _)| *rid != id);
                true
            }
            None => false,
        }
    }

    /// Snapshot of everything that should hear about `gesture` on `key`
    pub fn listeners(&self, key: &LogicalKey, gesture: GestureKind) -> Listeners {
        let callbacks = self
            .callbacks
            .get(&(*key, gesture))
            .map(|list| list.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();
        let observers = self.observers.iter().map(|(_, ob)| Arc::clone(ob)).collect();

        Listeners {
            callbacks,
            observers,
        }
    }

    /// Number of live registrations
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Callbacks copied out of the registry so they can run without its lock
pub struct Listeners {
    callbacks: Vec<Callback>,
    observers: Vec<Observer>,
}

impl Listeners {
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty() && self.observers.is_empty()
    }

    /// Run key callbacks, then observers. A panic in one does not stop the rest.
    pub fn invoke(&self, event: &GestureEvent) {
        for callback in &self.callbacks {
            if panic::catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                log::error!("callback for {} panicked", event);
            }
        }
        for observer in &self.observers {
            if panic::catch_unwind(AssertUnwindSafe(|| observer(event))).is_err() {
                log::error!("observer panicked on {}", event);
            }
        }
    }
}
