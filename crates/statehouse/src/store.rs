#![forbid(unsafe_code)]

//! The state container: one owned value, versioned mutations, selective
//! change subscriptions.
//!
//! [`Store<T>`] is a cheaply-cloneable handle (`Rc<RefCell<..>>`, single-
//! threaded shared ownership) over a [`ValueCell`] plus a listener registry.
//! Every mutation goes through one of the entry points below, each atomic
//! from a listener's perspective:
//!
//! - [`set`](Store::set) — unconditional replace.
//! - [`update`](Store::update) / [`compute`](Store::compute) — reducer-driven
//!   replace; the reducer runs before anything is committed.
//! - [`try_update`](Store::try_update) / [`try_compute`](Store::try_compute)
//!   — `Result`-flavored variants with the same pre-commit discipline.
//! - [`batch`](Store::batch) — fold any number of reducer steps into one
//!   commit: one version bump, one notification pass.
//! - [`effect`](Store::effect) — side-channel invocation with a snapshot;
//!   no mutation, no notification.
//!
//! # Invariants
//!
//! 1. The version increments by exactly 1 per committed mutation; a batch
//!    counts as one mutation regardless of its step count.
//! 2. `set` is unconditional: replacing a value with an equal one still bumps
//!    the version and notifies (the version tracks replacement, not
//!    inequality).
//! 3. Listeners observe only the final post-mutation value, never an
//!    intermediate one, even across a batch.
//! 4. A panicking reducer/batch callback commits nothing: value and version
//!    are exactly as before the call.
//! 5. Selector subscriptions fire only when the selected value changes per
//!    the subscription's equality function; the remembered previous selection
//!    updates exactly when the equality function reports a difference.
//!
//! # Failure Modes
//!
//! - Reducer/callback panic: propagates to the caller, store untouched.
//! - Subscriber panic: unwinds out of the mutating call; listeners scheduled
//!   after the failing one in that pass do not run.
//! - Holding a [`Snapshot`] across a mutation of the same store panics
//!   (`RefCell` borrow discipline). Snapshots are short-lived read guards.
//! - A subscriber that synchronously mutates its own store re-enters
//!   notification; guard re-entrant flows with a flag at the call site.

use std::cell::{Ref, RefCell};
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use tracing::trace;

use crate::cell::ValueCell;
use crate::registry::{ListenerRegistry, Subscription};

/// Shared handle to a versioned state container.
///
/// Cloning the handle shares the same underlying cell and listener set.
pub struct Store<T> {
    inner: Rc<StoreInner<T>>,
}

pub(crate) struct StoreInner<T> {
    cell: RefCell<ValueCell<T>>,
    listeners: ListenerRegistry,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Default + 'static> Default for Store<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cell = self.inner.cell.borrow();
        f.debug_struct("Store")
            .field("value", cell.value())
            .field("version", &cell.version())
            .field("observers", &self.inner.listeners.len())
            .finish()
    }
}

/// Read guard over a store's current value. Dereferences to `T`.
///
/// No copy is made; the guard borrows the same underlying value. Keep it
/// short-lived: mutating the store while a snapshot is alive panics.
pub struct Snapshot<'a, T> {
    guard: Ref<'a, T>,
}

impl<T> Deref for Snapshot<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T: fmt::Debug> fmt::Debug for Snapshot<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Snapshot").field(&*self.guard).finish()
    }
}

/// Per-subscription options: immediate fire and a custom equality function.
///
/// The default equality is `PartialEq`; [`eq`](SubscribeOptions::eq) replaces
/// it (useful for epsilon comparisons or coarser dedup).
pub struct SubscribeOptions<R> {
    pub(crate) fire_immediately: bool,
    pub(crate) eq: Option<Rc<dyn Fn(&R, &R) -> bool>>,
}

impl<R> SubscribeOptions<R> {
    pub fn new() -> Self {
        Self {
            fire_immediately: false,
            eq: None,
        }
    }

    /// Invoke the subscriber once, synchronously, with the current selection
    /// before the subscribe call returns.
    pub fn fire_immediately(mut self, yes: bool) -> Self {
        self.fire_immediately = yes;
        self
    }

    /// Replace the equality function used for change dedup.
    pub fn eq(mut self, eq: impl Fn(&R, &R) -> bool + 'static) -> Self {
        self.eq = Some(Rc::new(eq));
        self
    }
}

impl<R> Default for SubscribeOptions<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for SubscribeOptions<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("fire_immediately", &self.fire_immediately)
            .field("custom_eq", &self.eq.is_some())
            .finish()
    }
}

impl<T: 'static> Store<T> {
    /// Create a store owning `value`, at version 0.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                cell: RefCell::new(ValueCell::new(value)),
                listeners: ListenerRegistry::new(),
            }),
        }
    }

    /// Run `f` against a read-only borrow of the current value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let cell = self.inner.cell.borrow();
        f(cell.value())
    }

    /// Read guard over the current value (no copy).
    #[must_use]
    pub fn snapshot(&self) -> Snapshot<'_, T> {
        Snapshot {
            guard: Ref::map(self.inner.cell.borrow(), ValueCell::value),
        }
    }

    /// Number of committed mutations since creation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.cell.borrow().version()
    }

    /// Number of attached listeners (diagnostics).
    #[must_use]
    pub fn observers(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Unconditionally replace the current value.
    ///
    /// Always bumps the version and runs one notification pass, even when
    /// `next` compares equal to the current value.
    pub fn set(&self, next: T) {
        self.commit(next);
    }

    /// Commit `next` as one mutation: replace, bump version, notify once.
    pub(crate) fn commit(&self, next: T) -> u64 {
        let version = self.inner.cell.borrow_mut().replace(next);
        trace!(version, "store committed");
        self.inner.listeners.notify_all();
        version
    }

    /// Subscribe with a selector and default options (`PartialEq` dedup, no
    /// immediate fire).
    ///
    /// `selector` projects the state; `subscriber` runs only when the
    /// projection changes between notification passes.
    pub fn subscribe<R, S, F>(&self, selector: S, subscriber: F) -> Subscription
    where
        R: PartialEq + 'static,
        S: Fn(&T) -> R + 'static,
        F: Fn(&R) + 'static,
    {
        self.subscribe_with(selector, subscriber, SubscribeOptions::default())
    }

    /// Subscribe with explicit [`SubscribeOptions`].
    pub fn subscribe_with<R, S, F>(
        &self,
        selector: S,
        subscriber: F,
        options: SubscribeOptions<R>,
    ) -> Subscription
    where
        R: PartialEq + 'static,
        S: Fn(&T) -> R + 'static,
        F: Fn(&R) + 'static,
    {
        let eq = options
            .eq
            .unwrap_or_else(|| Rc::new(|a: &R, b: &R| a == b));

        let initial = self.with(|value| selector(value));
        if options.fire_immediately {
            subscriber(&initial);
        }

        let prev = RefCell::new(initial);
        let weak = Rc::downgrade(&self.inner);
        self.add_listener(Rc::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let next = {
                let cell = inner.cell.borrow();
                selector(cell.value())
            };
            let changed = !eq(&prev.borrow(), &next);
            if changed {
                subscriber(&next);
                *prev.borrow_mut() = next;
            }
        }))
    }

    /// Whole-value subscription: identity selector, `PartialEq` dedup.
    ///
    /// This is the surface persistence adapters build on.
    pub fn watch(&self, subscriber: impl Fn(&T) + 'static) -> Subscription
    where
        T: Clone + PartialEq,
    {
        self.subscribe(T::clone, subscriber)
    }

    /// Attach a raw listener that fires on every notification pass, with no
    /// selector dedup. Used by composite views, which run their own
    /// equality pass.
    pub(crate) fn add_listener(&self, notify: Rc<dyn Fn()>) -> Subscription {
        let id = self.inner.listeners.add(notify);
        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.remove(id);
            }
        })
    }
}

impl<T: Clone + 'static> Store<T> {
    /// Clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Apply `reducer` to the current value and `payload`, committing the
    /// result as one mutation. Returns the new value.
    ///
    /// The reducer runs against a read-only borrow before any mutation is
    /// committed; if it panics, value and version are unchanged.
    pub fn update<P>(&self, reducer: impl FnOnce(&T, P) -> T, payload: P) -> T {
        let next = self.with(|current| reducer(current, payload));
        self.commit(next.clone());
        next
    }

    /// [`update`](Store::update) without a payload.
    pub fn compute(&self, f: impl FnOnce(&T) -> T) -> T {
        self.update(|current, ()| f(current), ())
    }

    /// Fallible [`update`](Store::update): an `Err` from the reducer
    /// propagates and nothing is committed or notified.
    pub fn try_update<P, E>(
        &self,
        reducer: impl FnOnce(&T, P) -> Result<T, E>,
        payload: P,
    ) -> Result<T, E> {
        let next = self.with(|current| reducer(current, payload))?;
        self.commit(next.clone());
        Ok(next)
    }

    /// Fallible [`compute`](Store::compute).
    pub fn try_compute<E>(&self, f: impl FnOnce(&T) -> Result<T, E>) -> Result<T, E> {
        self.try_update(|current, ()| f(current), ())
    }

    /// Fold any number of reducer steps into a single commit.
    ///
    /// The [`Batch`] accumulates into a locally-owned working value seeded
    /// from the current state; the store is untouched until the callback
    /// returns, then set exactly once: one version bump, one notification
    /// pass, regardless of step count (including zero). A panic inside the
    /// callback commits nothing.
    pub fn batch(&self, f: impl FnOnce(&mut Batch<T>)) {
        let mut batch = Batch {
            working: self.get(),
        };
        f(&mut batch);
        self.commit(batch.working);
    }

    /// Invoke `f` with a snapshot of the current value and `payload`.
    ///
    /// No version bump, no notification. The snapshot is a clone, so the
    /// effect body may itself call `set`/`update` on this store. The return
    /// value (e.g. a future) is handed back untouched; the store never
    /// awaits it.
    pub fn effect<P, R>(&self, f: impl FnOnce(&T, P) -> R, payload: P) -> R {
        let snapshot = self.get();
        f(&snapshot, payload)
    }
}

/// Accumulating mutation scope handed to [`Store::batch`] callbacks.
///
/// Every step folds into a working value owned by the scope; the store sees
/// nothing until the batch callback returns. Each [`apply`](Batch::apply)
/// call is independently generically typed — payload shapes need not agree
/// across a batch.
#[derive(Debug)]
pub struct Batch<T> {
    working: T,
}

impl<T> Batch<T> {
    /// Fold one reducer step into the working value.
    pub fn apply<P>(&mut self, reducer: impl FnOnce(&T, P) -> T, payload: P) -> &T {
        self.working = reducer(&self.working, payload);
        &self.working
    }

    /// [`apply`](Batch::apply) without a payload.
    pub fn compute(&mut self, f: impl FnOnce(&T) -> T) -> &T {
        self.working = f(&self.working);
        &self.working
    }

    /// Replace the working value outright.
    pub fn set(&mut self, next: T) -> &T {
        self.working = next;
        &self.working
    }

    /// Current working value.
    pub fn value(&self) -> &T {
        &self.working
    }
}
