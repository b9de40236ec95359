#![forbid(unsafe_code)]

//! Versioned value cell: the single owned slot behind a [`Store`].
//!
//! `ValueCell<T>` pairs a value with a monotonically increasing version
//! counter. The counter is a cheap "did anything change" token: it moves by
//! exactly one per committed mutation, independent of how many listeners (if
//! any) observe the change.
//!
//! # Invariants
//!
//! 1. `version` starts at 0 and never decreases.
//! 2. `version` increments by exactly 1 per [`replace`](ValueCell::replace),
//!    and `replace` is the only way to change the value.
//! 3. The version changes if and only if the value was replaced.
//!
//! [`Store`]: crate::store::Store

/// A value plus its mutation counter.
///
/// Owned exclusively by a [`Store`](crate::store::Store) behind a `RefCell`;
/// external code only ever sees read-only views of the value.
#[derive(Debug, Clone)]
pub struct ValueCell<T> {
    value: T,
    version: u64,
}

impl<T> ValueCell<T> {
    /// Wrap `value` at version 0.
    pub const fn new(value: T) -> Self {
        Self { value, version: 0 }
    }

    /// Read-only view of the current value.
    #[inline]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Current mutation count.
    #[inline]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Replace the value, bumping the version by exactly one.
    ///
    /// Returns the new version.
    pub fn replace(&mut self, next: T) -> u64 {
        self.value = next;
        self.version += 1;
        self.version
    }

    /// Consume the cell, yielding the value.
    pub fn into_value(self) -> T {
        self.value
    }
}

impl<T: Default> Default for ValueCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
