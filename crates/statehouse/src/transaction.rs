#![forbid(unsafe_code)]

//! Staged mutation scopes: all-or-nothing publication of multi-step work.
//!
//! A [`Transaction`] clones the store's value at creation (`baseline`) and
//! stages every `apply`/`compute`/`set` against its private `pending` copy.
//! The store is untouched until [`commit`](Transaction::commit), which
//! publishes the folded result as exactly one mutation (one version bump, one
//! notification pass). [`rollback`](Transaction::rollback) discards the
//! staged work; the store never notices the scope existed.
//!
//! `commit` and `rollback` consume the scope, so double-commit,
//! commit-after-rollback, and staging against a terminated scope are compile
//! errors rather than runtime misuse.
//!
//! [`Savepoint`] nests the same discipline inside a transaction: it stages
//! against the transaction's pending value, and its `commit` folds into the
//! parent without touching the store. The parent must still commit for
//! anything to be published.
//!
//! # Invariants
//!
//! 1. Staged work is invisible to the store and its listeners until commit.
//! 2. Commit is exactly one store mutation, regardless of staged step count.
//! 3. Rollback leaves the store's value, version, and listeners untouched.
//! 4. Nested scopes hold independent pending copies; each commits only into
//!    its own parent.

use tracing::trace;

use crate::store::Store;

impl<T: Clone + 'static> Store<T> {
    /// Open a staged mutation scope over this store.
    #[must_use]
    pub fn begin_transaction(&self) -> Transaction<T> {
        let baseline = self.get();
        Transaction {
            store: self.clone(),
            pending: baseline.clone(),
            baseline,
        }
    }
}

/// A staged view over a [`Store`]: tentative mutations, one decision.
///
/// Last-write-wins on commit: the store's value at commit time is replaced by
/// the scope's pending value even if the store moved after the scope opened.
#[derive(Debug)]
pub struct Transaction<T: Clone + 'static> {
    store: Store<T>,
    baseline: T,
    pending: T,
}

impl<T: Clone + 'static> Transaction<T> {
    /// Fold one reducer step into the pending value. The store is untouched.
    pub fn apply<P>(&mut self, reducer: impl FnOnce(&T, P) -> T, payload: P) -> &T {
        self.pending = reducer(&self.pending, payload);
        &self.pending
    }

    /// [`apply`](Transaction::apply) without a payload.
    pub fn compute(&mut self, f: impl FnOnce(&T) -> T) -> &T {
        self.pending = f(&self.pending);
        &self.pending
    }

    /// Replace the pending value outright.
    pub fn set(&mut self, next: T) -> &T {
        self.pending = next;
        &self.pending
    }

    /// Current pending value.
    pub fn read(&self) -> &T {
        &self.pending
    }

    /// The store's value as of scope creation.
    pub fn baseline(&self) -> &T {
        &self.baseline
    }

    /// Open a nested scope staging against this transaction's pending value.
    pub fn savepoint(&mut self) -> Savepoint<'_, T> {
        let pending = self.pending.clone();
        Savepoint {
            parent: self,
            pending,
        }
    }

    /// Publish the pending value as one store mutation and return it.
    pub fn commit(self) -> T {
        trace!("transaction committed");
        self.store.set(self.pending.clone());
        self.pending
    }

    /// Discard the staged work and return the baseline. The store is never
    /// touched and no notification occurs.
    pub fn rollback(self) -> T {
        trace!("transaction rolled back");
        self.baseline
    }
}

/// Nested staging scope over a [`Transaction`]'s pending value.
#[derive(Debug)]
pub struct Savepoint<'a, T: Clone + 'static> {
    parent: &'a mut Transaction<T>,
    pending: T,
}

impl<T: Clone + 'static> Savepoint<'_, T> {
    /// Fold one reducer step into the savepoint's pending value.
    pub fn apply<P>(&mut self, reducer: impl FnOnce(&T, P) -> T, payload: P) -> &T {
        self.pending = reducer(&self.pending, payload);
        &self.pending
    }

    /// [`apply`](Savepoint::apply) without a payload.
    pub fn compute(&mut self, f: impl FnOnce(&T) -> T) -> &T {
        self.pending = f(&self.pending);
        &self.pending
    }

    /// Replace the savepoint's pending value outright.
    pub fn set(&mut self, next: T) -> &T {
        self.pending = next;
        &self.pending
    }

    /// Current pending value of the savepoint.
    pub fn read(&self) -> &T {
        &self.pending
    }

    /// Fold the savepoint's pending value into the parent transaction.
    /// The store remains untouched.
    pub fn commit(self) {
        self.parent.pending = self.pending;
    }

    /// Discard the savepoint; the parent's pending value is unchanged.
    pub fn rollback(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    struct Account {
        balance: i64,
        entries: u32,
    }

    fn deposit(state: &Account, amount: i64) -> Account {
        Account {
            balance: state.balance + amount,
            entries: state.entries + 1,
        }
    }

    fn counted_store(initial: Account) -> (Store<Account>, Rc<Cell<u32>>, crate::Subscription) {
        let store = Store::new(initial);
        let fired = Rc::new(Cell::new(0));
        let f = Rc::clone(&fired);
        let sub = store.watch(move |_| f.set(f.get() + 1));
        (store, fired, sub)
    }

    #[test]
    fn staging_leaves_store_untouched() {
        let (store, fired, _sub) = counted_store(Account {
            balance: 100,
            entries: 0,
        });

        let mut tx = store.begin_transaction();
        tx.apply(deposit, 50);
        tx.apply(deposit, -30);
        assert_eq!(tx.read().balance, 120);

        assert_eq!(store.get().balance, 100);
        assert_eq!(store.version(), 0);
        assert_eq!(fired.get(), 0);
        drop(tx);
    }

    #[test]
    fn rollback_changes_nothing_and_notifies_nobody() {
        let (store, fired, _sub) = counted_store(Account {
            balance: 10,
            entries: 0,
        });

        let mut tx = store.begin_transaction();
        tx.apply(deposit, 1);
        tx.compute(|a| deposit(a, 2));
        tx.set(Account {
            balance: -1,
            entries: 99,
        });
        let baseline = tx.rollback();

        assert_eq!(baseline.balance, 10);
        assert_eq!(store.get().balance, 10);
        assert_eq!(store.version(), 0);
        assert_eq!(fired.get(), 0);
    }

    #[test]
    fn commit_publishes_folded_result_once() {
        let (store, fired, _sub) = counted_store(Account {
            balance: 0,
            entries: 0,
        });

        let mut tx = store.begin_transaction();
        for amount in [5, 10, 15] {
            tx.apply(deposit, amount);
        }
        let result = tx.commit();

        assert_eq!(result.balance, 30);
        assert_eq!(result.entries, 3);
        assert_eq!(store.get(), result);
        assert_eq!(store.version(), 1, "commit is one mutation");
        assert_eq!(fired.get(), 1, "commit is one notification pass");
    }

    #[test]
    fn baseline_is_snapshotted_at_begin() {
        let store = Store::new(1i64);
        let tx = store.begin_transaction();
        store.set(2);
        assert_eq!(*tx.baseline(), 1);
        assert_eq!(*tx.read(), 1, "pending seeded from baseline, not live store");
        drop(tx);
    }

    #[test]
    fn commit_is_last_write_wins() {
        let store = Store::new(1i64);
        let mut tx = store.begin_transaction();
        tx.compute(|v| v + 10);
        store.set(100);
        assert_eq!(tx.commit(), 11);
        assert_eq!(store.get(), 11);
        assert_eq!(store.version(), 2);
    }

    #[test]
    fn savepoint_commit_folds_into_parent_only() {
        let (store, fired, _sub) = counted_store(Account {
            balance: 0,
            entries: 0,
        });

        let mut tx = store.begin_transaction();
        tx.apply(deposit, 10);
        {
            let mut sp = tx.savepoint();
            sp.apply(deposit, 5);
            assert_eq!(sp.read().balance, 15);
            sp.commit();
        }
        assert_eq!(tx.read().balance, 15);
        assert_eq!(store.version(), 0, "savepoint commit never touches the store");
        assert_eq!(fired.get(), 0);

        tx.commit();
        assert_eq!(store.get().balance, 15);
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn savepoint_rollback_discards_only_its_own_work() {
        let store = Store::new(Account {
            balance: 0,
            entries: 0,
        });

        let mut tx = store.begin_transaction();
        tx.apply(deposit, 10);
        {
            let mut sp = tx.savepoint();
            sp.apply(deposit, 999);
            sp.set(Account {
                balance: -5,
                entries: 0,
            });
            sp.rollback();
        }
        assert_eq!(tx.read().balance, 10, "parent pending survives savepoint rollback");
        assert_eq!(tx.commit().balance, 10);
    }

    #[test]
    fn independent_scopes_do_not_share_pending() {
        let store = Store::new(0i64);
        let mut a = store.begin_transaction();
        let mut b = store.begin_transaction();
        a.compute(|v| v + 1);
        b.compute(|v| v + 2);
        assert_eq!(*a.read(), 1);
        assert_eq!(*b.read(), 2);

        a.commit();
        assert_eq!(store.get(), 1);
        assert_eq!(b.commit(), 2, "each scope publishes its own fold");
        assert_eq!(store.get(), 2);
    }
}
