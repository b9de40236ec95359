#![forbid(unsafe_code)]

//! Listener registry with copy-on-write notification snapshots.
//!
//! [`ListenerRegistry`] holds the change callbacks attached to a store. Every
//! add or remove swaps in a fresh `Rc<Vec<_>>` instead of mutating the
//! collection in place, so a notification pass that started earlier keeps
//! iterating its own stable snapshot. A listener that unsubscribes itself (or
//! is removed by another listener) mid-pass still completes the current pass
//! but is never called again.
//!
//! [`Subscription`] is the RAII half of the contract: dropping it (or calling
//! [`cancel`](Subscription::cancel)) removes the listener before the next
//! pass; [`detach`](Subscription::detach) leaves the listener attached for
//! the registry's lifetime.
//!
//! # Invariants
//!
//! 1. Listeners are invoked in registration order.
//! 2. A pass invokes exactly the listeners present when the pass started,
//!    each exactly once (unless an earlier listener panics).
//! 3. Add/remove during a pass affects only subsequent passes.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// No-argument notification callback. Selector-bound subscribers close over
/// their own previous-selection state and equality function.
pub(crate) type NotifyFn = Rc<dyn Fn()>;

/// Registry-local listener identity, monotonically assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ListenerId(u64);

#[derive(Clone)]
struct ListenerEntry {
    id: ListenerId,
    notify: NotifyFn,
}

/// Ordered listener collection, safe to modify during notification.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    entries: RefCell<Rc<Vec<ListenerEntry>>>,
    next_id: Cell<u64>,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append a listener, returning its id. Registration order is
    /// notification order.
    pub(crate) fn add(&self, notify: NotifyFn) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);

        let mut slot = self.entries.borrow_mut();
        let mut next = Vec::with_capacity(slot.len() + 1);
        next.extend(slot.iter().cloned());
        next.push(ListenerEntry { id, notify });
        *slot = Rc::new(next);
        id
    }

    /// Remove a listener. Unknown ids are ignored (the subscription may
    /// outlive a registry rebuild).
    pub(crate) fn remove(&self, id: ListenerId) {
        let mut slot = self.entries.borrow_mut();
        if !slot.iter().any(|entry| entry.id == id) {
            return;
        }
        let next: Vec<ListenerEntry> =
            slot.iter().filter(|entry| entry.id != id).cloned().collect();
        *slot = Rc::new(next);
    }

    /// Run one notification pass over the listener set as of this call.
    ///
    /// A panicking listener unwinds out of the pass; listeners after it do
    /// not run (documented-permissive, callers needing isolation wrap their
    /// own subscriber).
    pub(crate) fn notify_all(&self) {
        let pass = Rc::clone(&self.entries.borrow());
        for entry in pass.iter() {
            (entry.notify)();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

/// RAII unsubscribe handle returned by every `subscribe` surface.
///
/// Dropping the handle removes the listener; hold it for as long as the
/// subscription should stay live.
#[must_use = "dropping a Subscription immediately unsubscribes"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Unsubscribe now instead of at drop time.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Leave the listener attached for the registry's lifetime.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
