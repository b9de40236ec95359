#![forbid(unsafe_code)]

//! Observability middleware around the mutation entry points.
//!
//! [`Instrumented`] wraps a [`Store`] and invokes a [`Middleware`] before and
//! after each mutation entry point, handing it the operation kind, version
//! counters, borrowed state snapshots, and elapsed wall time. The wrapper
//! preserves the wrapped entry point's exact return value and call/notify
//! order: listeners fire inside the wrapped call, between the `before` and
//! `after` hooks.
//!
//! Reducer payloads are not part of either context: hooks observe operation
//! kinds, version counters, and state snapshots only. Capturing arbitrary
//! payloads would force type erasure (`dyn Any`) onto every entry point, so a
//! middleware that needs payload detail logs it from the call site instead.
//!
//! [`TraceMiddleware`] is the stock implementation, logging contexts through
//! `tracing` at debug level.
//!
//! # Invariants
//!
//! 1. `before` runs prior to any state change; `after` runs once the
//!    mutation (and its notification pass) completed.
//! 2. The wrapper adds no mutations, notifications, or version bumps of its
//!    own.
//! 3. Hook panics propagate; the store's own pre-commit discipline still
//!    applies (a `before` panic means nothing was committed).

use std::fmt;
use std::time::Duration;

use tracing::debug;
use web_time::Instant;

use crate::store::{Batch, Store};

/// Which mutation entry point is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Set,
    Update,
    Compute,
    Batch,
    /// Side-channel invocation: no version bump, no notification.
    Effect,
}

/// Context handed to [`Middleware::before`].
#[derive(Debug)]
pub struct MutationInfo<'a, T> {
    pub kind: MutationKind,
    /// Version counter before the call.
    pub version: u64,
    /// State before the call.
    pub state: &'a T,
}

/// Context handed to [`Middleware::after`].
#[derive(Debug)]
pub struct MutationOutcome<'a, T> {
    pub kind: MutationKind,
    pub version_before: u64,
    /// Version counter after the call.
    pub version: u64,
    /// State after the call (and after its notification pass).
    pub state: &'a T,
    /// Wall time spent inside the wrapped entry point, notifications
    /// included.
    pub elapsed: Duration,
}

/// Before/after hooks around mutation entry points. Both default to no-ops.
pub trait Middleware<T> {
    fn before(&self, _info: &MutationInfo<'_, T>) {}
    fn after(&self, _outcome: &MutationOutcome<'_, T>) {}
}

/// Store wrapper that routes every mutation entry point through a
/// [`Middleware`].
///
/// Reads and subscriptions go through [`store`](Instrumented::store); only
/// mutations are intercepted.
pub struct Instrumented<T, M> {
    store: Store<T>,
    middleware: M,
}

impl<T: Clone + 'static, M: Middleware<T>> Instrumented<T, M> {
    pub fn new(store: Store<T>, middleware: M) -> Self {
        Self { store, middleware }
    }

    /// The wrapped store handle (reads, subscriptions, further wrapping).
    pub fn store(&self) -> &Store<T> {
        &self.store
    }

    /// Unwrap into the store handle and the middleware.
    pub fn into_inner(self) -> (Store<T>, M) {
        (self.store, self.middleware)
    }

    fn run<R>(&self, kind: MutationKind, op: impl FnOnce(&Store<T>) -> R) -> R {
        let version_before = self.store.version();
        {
            let snapshot = self.store.snapshot();
            self.middleware.before(&MutationInfo {
                kind,
                version: version_before,
                state: &snapshot,
            });
        }

        let started = Instant::now();
        let out = op(&self.store);
        let elapsed = started.elapsed();

        {
            let snapshot = self.store.snapshot();
            self.middleware.after(&MutationOutcome {
                kind,
                version_before,
                version: self.store.version(),
                state: &snapshot,
                elapsed,
            });
        }
        out
    }

    /// Instrumented [`Store::set`].
    pub fn set(&self, next: T) {
        self.run(MutationKind::Set, |store| store.set(next));
    }

    /// Instrumented [`Store::update`]; returns the wrapped call's value.
    pub fn update<P>(&self, reducer: impl FnOnce(&T, P) -> T, payload: P) -> T {
        self.run(MutationKind::Update, |store| store.update(reducer, payload))
    }

    /// Instrumented [`Store::compute`].
    pub fn compute(&self, f: impl FnOnce(&T) -> T) -> T {
        self.run(MutationKind::Compute, |store| store.compute(f))
    }

    /// Instrumented [`Store::batch`].
    pub fn batch(&self, f: impl FnOnce(&mut Batch<T>)) {
        self.run(MutationKind::Batch, |store| store.batch(f));
    }

    /// Instrumented [`Store::effect`]; version counters stay put.
    pub fn effect<P, R>(&self, f: impl FnOnce(&T, P) -> R, payload: P) -> R {
        self.run(MutationKind::Effect, |store| store.effect(f, payload))
    }
}

impl<T, M> fmt::Debug for Instrumented<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrumented").finish_non_exhaustive()
    }
}

/// Logs mutation contexts via `tracing` at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceMiddleware;

impl<T> Middleware<T> for TraceMiddleware {
    fn before(&self, info: &MutationInfo<'_, T>) {
        debug!(kind = ?info.kind, version = info.version, "mutation begin");
    }

    fn after(&self, outcome: &MutationOutcome<'_, T>) {
        debug!(
            kind = ?outcome.kind,
            version_before = outcome.version_before,
            version = outcome.version,
            elapsed_us = outcome.elapsed.as_micros() as u64,
            "mutation end"
        );
    }
}
