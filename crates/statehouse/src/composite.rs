#![forbid(unsafe_code)]

//! Composite view: several independent stores behind one read-only aggregate.
//!
//! [`CompositeView<K, T>`] fixes a key→store mapping at construction and
//! exposes an aggregate `Rc<BTreeMap<K, Rc<T>>>`. When member `k` changes,
//! only slot `k` is rebuilt; every other slot keeps its existing `Rc`, so
//! downstream reference-identity checks (`Rc::ptr_eq`) correctly report
//! "nothing relevant changed". Replacing the whole aggregate per change would
//! still pass value-equality tests but would defeat those optimizations —
//! the structural sharing is the contract, not an accident.
//!
//! Member listeners are attached lazily on the first subscriber and detached
//! on the last unsubscribe, so an unobserved composite leaks no
//! subscriptions. While dormant, [`read`](CompositeView::read) refreshes
//! stale slots by comparing member version counters, again replacing only
//! the slots whose member actually moved.
//!
//! # Invariants
//!
//! 1. Keys are fixed at construction; the aggregate always holds every key.
//! 2. A member change replaces exactly one slot; the rest are `Rc`-identical
//!    to their pre-change values.
//! 3. The aggregate `Rc` returned by `read` is stable between relevant
//!    changes.
//! 4. Composite subscribers are deduped by an equality pass over the whole
//!    aggregate; the default comparator is reference identity.
//! 5. Member stores carry composite listeners only while the composite has
//!    subscribers of its own.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::registry::{ListenerRegistry, Subscription};
use crate::store::{Store, SubscribeOptions};

/// The aggregate shape: reference-stable map of reference-stable slots.
pub type Aggregate<K, T> = Rc<BTreeMap<K, Rc<T>>>;

/// Read-only aggregate view over N same-typed stores with one subscription
/// surface.
pub struct CompositeView<K, T> {
    inner: Rc<CompositeInner<K, T>>,
}

struct CompositeInner<K, T> {
    members: BTreeMap<K, Store<T>>,
    /// Member version captured into the current aggregate, per key.
    seen: RefCell<BTreeMap<K, u64>>,
    aggregate: RefCell<Aggregate<K, T>>,
    listeners: ListenerRegistry,
    /// Member subscriptions, non-empty only while the composite is observed.
    member_subs: RefCell<Vec<Subscription>>,
}

impl<K, T> Clone for CompositeView<K, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K: Ord + Clone + 'static, T: Clone + 'static> CompositeView<K, T> {
    /// Build a composite over `members`. Keys are fixed from here on.
    pub fn new(members: impl IntoIterator<Item = (K, Store<T>)>) -> Self {
        let members: BTreeMap<K, Store<T>> = members.into_iter().collect();
        let aggregate: BTreeMap<K, Rc<T>> = members
            .iter()
            .map(|(k, store)| (k.clone(), Rc::new(store.get())))
            .collect();
        let seen: BTreeMap<K, u64> = members
            .iter()
            .map(|(k, store)| (k.clone(), store.version()))
            .collect();
        Self {
            inner: Rc::new(CompositeInner {
                members,
                seen: RefCell::new(seen),
                aggregate: RefCell::new(Rc::new(aggregate)),
                listeners: ListenerRegistry::new(),
                member_subs: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Current aggregate. Reference-stable until the next relevant change.
    #[must_use]
    pub fn read(&self) -> Aggregate<K, T> {
        if self.inner.listeners.is_empty() {
            // Dormant: nobody kept the aggregate fresh, so catch up on the
            // members whose version moved.
            Self::refresh_stale(&self.inner);
        }
        Rc::clone(&self.inner.aggregate.borrow())
    }

    /// Replace only the slots whose member version counter moved.
    fn refresh_stale(inner: &CompositeInner<K, T>) {
        let mut seen = inner.seen.borrow_mut();
        let mut fresh: Option<BTreeMap<K, Rc<T>>> = None;
        for (key, store) in &inner.members {
            let version = store.version();
            if seen.get(key) == Some(&version) {
                continue;
            }
            fresh
                .get_or_insert_with(|| inner.aggregate.borrow().as_ref().clone())
                .insert(key.clone(), Rc::new(store.get()));
            seen.insert(key.clone(), version);
        }
        if let Some(map) = fresh {
            *inner.aggregate.borrow_mut() = Rc::new(map);
        }
    }

    /// Subscribe to aggregate changes with default options (reference-
    /// identity dedup over the whole aggregate, no immediate fire).
    pub fn subscribe(&self, subscriber: impl Fn(&Aggregate<K, T>) + 'static) -> Subscription {
        self.subscribe_with(subscriber, SubscribeOptions::default())
    }

    /// Subscribe with explicit options. Note the default comparator here is
    /// `Rc::ptr_eq` over the aggregate, not `PartialEq`; pass a custom `eq`
    /// for value-based dedup.
    pub fn subscribe_with(
        &self,
        subscriber: impl Fn(&Aggregate<K, T>) + 'static,
        options: SubscribeOptions<Aggregate<K, T>>,
    ) -> Subscription {
        self.activate_if_dormant();

        let eq = options
            .eq
            .unwrap_or_else(|| Rc::new(|a: &Aggregate<K, T>, b: &Aggregate<K, T>| Rc::ptr_eq(a, b)));

        let current = Rc::clone(&self.inner.aggregate.borrow());
        if options.fire_immediately {
            subscriber(&current);
        }

        let prev = RefCell::new(current);
        let weak = Rc::downgrade(&self.inner);
        let id = self.inner.listeners.add(Rc::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let next = Rc::clone(&inner.aggregate.borrow());
            let changed = !eq(&prev.borrow(), &next);
            if changed {
                subscriber(&next);
                *prev.borrow_mut() = next;
            }
        }));

        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.remove(id);
                if inner.listeners.is_empty() {
                    // Last composite subscriber gone: detach from members.
                    inner.member_subs.borrow_mut().clear();
                }
            }
        })
    }

    /// First subscriber: refresh, then attach one listener per member.
    fn activate_if_dormant(&self) {
        if !self.inner.listeners.is_empty() {
            return;
        }
        Self::refresh_stale(&self.inner);

        let mut subs = self.inner.member_subs.borrow_mut();
        debug_assert!(subs.is_empty(), "dormant composite holds no member subs");
        for (key, store) in &self.inner.members {
            let key = key.clone();
            let weak = Rc::downgrade(&self.inner);
            subs.push(store.add_listener(Rc::new(move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let Some(member) = inner.members.get(&key) else {
                    return;
                };
                // Replace only this member's slot; the rest keep their Rc.
                let mut next = inner.aggregate.borrow().as_ref().clone();
                next.insert(key.clone(), Rc::new(member.get()));
                *inner.aggregate.borrow_mut() = Rc::new(next);
                inner.seen.borrow_mut().insert(key.clone(), member.version());
                inner.listeners.notify_all();
            })));
        }
    }

    /// The member store registered under `key`, if any.
    pub fn member(&self, key: &K) -> Option<&Store<T>> {
        self.inner.members.get(key)
    }

    /// Iterate the fixed key set.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.inner.members.keys()
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.members.is_empty()
    }

    /// Number of composite subscribers (diagnostics).
    #[must_use]
    pub fn observers(&self) -> usize {
        self.inner.listeners.len()
    }
}

impl<K: fmt::Debug, T> fmt::Debug for CompositeView<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeView")
            .field("keys", &self.inner.members.keys().collect::<Vec<_>>())
            .field("observers", &self.inner.listeners.len())
            .finish()
    }
}
