#![forbid(unsafe_code)]

//! Versioned reactive state containers with transactional mutation scopes.
//!
//! This crate provides a small in-process state layer built around a single
//! idea: one owned value per container, every change funneled through a
//! versioned commit that drives selective change notifications.
//!
//! - [`Store`]: the state container — read/snapshot, `set`/`update`/
//!   `compute`, atomic [`batch`](Store::batch) folding, side-channel
//!   [`effect`](Store::effect), and selector-based [`subscribe`](Store::subscribe)
//!   with equality dedup.
//! - [`Subscription`]: RAII guard that unsubscribes on drop.
//! - [`Transaction`] / [`Savepoint`]: staged mutation scopes with a single
//!   commit-or-rollback decision.
//! - [`CompositeView`]: several stores behind one structurally-shared
//!   aggregate with a unified subscription surface.
//! - [`DerivedView`]: read-only selector projections with the store's
//!   subscribe contract.
//! - [`Instrumented`] / [`Middleware`]: before/after observability hooks
//!   around the mutation entry points.
//!
//! # Architecture
//!
//! `Store<T>` uses `Rc<RefCell<..>>` for single-threaded shared ownership;
//! the model assumes one logical thread of control drives all container
//! interaction (an event-loop-style host). Listener registries swap in fresh
//! collections on every add/remove, so in-flight notification passes iterate
//! stable snapshots.
//!
//! # Invariants
//!
//! 1. The version counter increments exactly once per committed mutation;
//!    batches and transaction commits count as one mutation each.
//! 2. `set` is unconditional: equal values still bump the version and notify.
//! 3. Listeners observe only final post-mutation values, in registration
//!    order, using the listener set snapshotted at pass start.
//! 4. A panicking reducer or batch/transaction callback commits nothing.
//! 5. Dropping a [`Subscription`] removes the callback before the next
//!    notification pass; removal never affects the pass in flight.
//! 6. Composite aggregates replace only the changed member's slot; untouched
//!    slots stay reference-identical.
//!
//! # Example
//!
//! ```
//! use statehouse::Store;
//!
//! #[derive(Clone, PartialEq)]
//! struct Counter {
//!     count: i64,
//! }
//!
//! let store = Store::new(Counter { count: 0 });
//! let _sub = store.subscribe(
//!     |s: &Counter| s.count,
//!     |count| println!("count is now {count}"),
//! );
//!
//! store.batch(|b| {
//!     b.apply(|s, d: i64| Counter { count: s.count + d }, 1);
//!     b.apply(|s, d: i64| Counter { count: s.count + d }, 1);
//! }); // one notification: "count is now 2"
//!
//! let mut tx = store.begin_transaction();
//! tx.compute(|s| Counter { count: s.count * 10 });
//! tx.rollback(); // store untouched, nothing notified
//! assert_eq!(store.get().count, 2);
//! ```

pub mod cell;
pub mod composite;
pub mod derived;
pub mod middleware;
#[cfg(feature = "state-persistence")]
pub mod persist;
pub mod registry;
pub mod store;
pub mod transaction;

pub use cell::ValueCell;
pub use composite::{Aggregate, CompositeView};
pub use derived::DerivedView;
pub use middleware::{
    Instrumented, Middleware, MutationInfo, MutationKind, MutationOutcome, TraceMiddleware,
};
pub use registry::Subscription;
pub use store::{Batch, Snapshot, Store, SubscribeOptions};
pub use transaction::{Savepoint, Transaction};
