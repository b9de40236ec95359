#![forbid(unsafe_code)]

//! Derived views: read-only selector projections with the store's subscribe
//! contract.
//!
//! A [`DerivedView`] pairs a store handle with a selector. Reads re-evaluate
//! the selector on every call — no caching, selectors are expected to be
//! cheap (memoization is deliberately out of scope for this facility).
//! Subscriptions delegate verbatim to the underlying store's selector
//! subscription, inheriting its equality dedup and `fire_immediately`
//! semantics, so consumers can treat derived and primary state uniformly.
//!
//! # Invariants
//!
//! 1. `read` never returns a stale projection.
//! 2. A derived view holds no independent truth: it is pure recomputation
//!    over its source and is never a second writable owner.
//! 3. `version` mirrors the source store.

use std::fmt;
use std::rc::Rc;

use crate::registry::Subscription;
use crate::store::{Store, SubscribeOptions};

impl<T: 'static> Store<T> {
    /// Project this store through `selector` as a read-only view.
    #[must_use]
    pub fn derive<R: 'static>(&self, selector: impl Fn(&T) -> R + 'static) -> DerivedView<T, R> {
        DerivedView {
            store: self.clone(),
            selector: Rc::new(selector),
        }
    }
}

/// Read-only projection of one store through a selector.
pub struct DerivedView<T, R> {
    store: Store<T>,
    selector: Rc<dyn Fn(&T) -> R>,
}

impl<T, R> Clone for DerivedView<T, R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            selector: Rc::clone(&self.selector),
        }
    }
}

impl<T: 'static, R: 'static> DerivedView<T, R> {
    /// Evaluate the selector against the current source state.
    #[must_use]
    pub fn read(&self) -> R {
        let selector = &self.selector;
        self.store.with(|value| selector(value))
    }

    /// Source store's version counter.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.store.version()
    }

    /// Compose a further projection, yielding a new derived view over the
    /// same source.
    #[must_use]
    pub fn map<U: 'static>(&self, f: impl Fn(&R) -> U + 'static) -> DerivedView<T, U> {
        let selector = Rc::clone(&self.selector);
        DerivedView {
            store: self.store.clone(),
            selector: Rc::new(move |value| f(&selector(value))),
        }
    }

    /// Subscribe with default options; delegates to the source store.
    pub fn subscribe(&self, subscriber: impl Fn(&R) + 'static) -> Subscription
    where
        R: PartialEq,
    {
        self.subscribe_with(subscriber, SubscribeOptions::default())
    }

    /// Subscribe with explicit options; delegates to the source store,
    /// inheriting its dedup and immediate-fire semantics verbatim.
    pub fn subscribe_with(
        &self,
        subscriber: impl Fn(&R) + 'static,
        options: SubscribeOptions<R>,
    ) -> Subscription
    where
        R: PartialEq,
    {
        let selector = Rc::clone(&self.selector);
        self.store
            .subscribe_with(move |value| selector(value), subscriber, options)
    }
}

impl<T, R> fmt::Debug for DerivedView<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedView").finish_non_exhaustive()
    }
}
