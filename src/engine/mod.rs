//! This module provides the storage engine behind the server.
//! [`MemStore`] is the only implementation: a concurrent in-memory map where every key carries
//! its own expiration deadline. Nothing is persisted.
use std::time::Duration;

use rust_decimal::Decimal;

use crate::Result;

/// The direction of an accumulate operation
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Accumulate {
    /// add the delta to the stored value
    Increment,
    /// subtract the delta from the stored value
    Decrement,
}

/// A trait for the basic functionality of a key/value storage engine
///
/// Every operation is atomic with respect to other operations on the same key. No operation
/// spans more than one key.
pub trait RamEngine: Clone + Send + 'static {
    /// Gets the value associated with the given `key`
    ///
    /// Returns `None` if the given `key` does not exist or its entry has expired.
    fn get(&self, key: &str) -> Option<String>;

    /// sets a `key` and `value` that expire `ttl` from now
    ///
    /// Value and deadline are replaced together. Returns `true` if no entry existed for `key`,
    /// an expired entry that is still present counts as existing.
    fn set(&self, key: String, value: String, ttl: Duration) -> bool;

    /// Removes the given `key` (and associated value) from the store. Removing an absent key is
    /// not an error.
    fn remove(&self, key: &str);

    /// Adds `delta` to, or subtracts it from, the decimal stored at `key` and returns the result.
    ///
    /// An absent key is created holding `delta` with a one year time to live. An existing
    /// entry keeps its deadline.
    ///
    /// # Errors
    ///
    /// Returns `RamDbError::NotANumber` if the stored value is not a decimal and
    /// `RamDbError::Overflow` if the result is out of range. The entry is left untouched.
    fn accumulate(&self, key: &str, delta: Decimal, op: Accumulate) -> Result<Decimal>;

    /// Stores `value` at `key` only if no live entry is there.
    ///
    /// A missing or expired entry is replaced and `true` is returned. A live entry is left
    /// untouched, value and deadline alike, and `false` is returned.
    fn set_if_vacant(&self, key: String, value: String, ttl: Duration) -> bool;
}

mod memory;

pub use self::memory::MemStore;
