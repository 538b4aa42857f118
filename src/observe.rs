//! Typed callback registry with explicit teardown.
//!
//! DESIGN
//! ======
//! Used for both directions of change notification: the provider pushes
//! session changes to the store, and the store pushes snapshots to views.
//! `register` hands back a [`Subscription`]; dropping it (or calling
//! [`Subscription::unsubscribe`]) removes the callback. The registry only
//! holds callbacks, so a subscription outliving its registry is harmless.
//!
//! Callbacks run on the emitting task after the registry lock is released,
//! so a callback may register or unsubscribe without deadlocking.

#[cfg(test)]
#[path = "observe_test.rs"]
mod tests;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Slots<T> {
    next_id: u64,
    callbacks: Vec<(u64, Callback<T>)>,
}

/// Ordered set of callbacks receiving `&T`.
pub struct CallbackRegistry<T> {
    slots: Arc<Mutex<Slots<T>>>,
}

impl<T: 'static> CallbackRegistry<T> {
    #[must_use]
    pub fn new() -> Self {
        Self { slots: Arc::new(Mutex::new(Slots { next_id: 0, callbacks: Vec::new() })) }
    }

    /// Add a callback. It stays registered until the returned handle is
    /// dropped or unsubscribed.
    pub fn register<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            let id = slots.next_id;
            slots.next_id += 1;
            slots.callbacks.push((id, Arc::new(callback)));
            id
        };

        let weak: Weak<Mutex<Slots<T>>> = Arc::downgrade(&self.slots);
        Subscription::new(move || {
            if let Some(slots) = weak.upgrade() {
                let mut slots = slots.lock().unwrap_or_else(PoisonError::into_inner);
                slots.callbacks.retain(|(slot_id, _)| *slot_id != id);
            }
        })
    }

    /// Invoke every registered callback in registration order.
    pub fn emit(&self, value: &T) {
        let callbacks: Vec<Callback<T>> = {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.callbacks.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };
        for callback in callbacks {
            callback(value);
        }
    }

    /// Number of live callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .callbacks
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for CallbackRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for CallbackRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry").finish_non_exhaustive()
    }
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

/// Handle for a registered callback. Unregisters on drop.
#[must_use = "dropping a Subscription unregisters its callback immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self { cancel: Some(Box::new(cancel)) }
    }

    /// Remove the callback now.
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
