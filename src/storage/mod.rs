pub mod keys;
pub mod memory;
pub mod selector;

use crate::error::LedgerError;
use serde::{Deserialize, Serialize};

/// One key/value pair yielded by a state query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    pub key: String,
    pub value: Vec<u8>,
}

/// Pull cursor over the results of a predicate query.
///
/// Callers must either drain the cursor or `close` it before the enclosing
/// invocation returns. `next_entry` after `close` is an error.
pub trait StateCursor: Send {
    fn has_next(&self) -> bool;
    fn next_entry(&mut self) -> Result<StateEntry, LedgerError>;
    fn close(&mut self) -> Result<(), LedgerError>;
}

/// Key-value ledger the contracts read and write through.
///
/// The predicate language accepted by `query_state` is defined by the
/// implementation; the contracts pass it through untouched.
pub trait StateStore: Send + Sync {
    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError>;

    fn put_state(&self, key: &str, value: Vec<u8>) -> Result<(), LedgerError>;

    fn query_state(&self, query: &str) -> Result<Box<dyn StateCursor + '_>, LedgerError>;

    /// Writes `value` only if the current value equals `expected`
    /// (`None` meaning absent). Returns whether the write happened.
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: Vec<u8>,
    ) -> Result<bool, LedgerError>;
}

impl<S: StateStore + ?Sized> StateStore for std::sync::Arc<S> {
    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        (**self).get_state(key)
    }

    fn put_state(&self, key: &str, value: Vec<u8>) -> Result<(), LedgerError> {
        (**self).put_state(key, value)
    }

    fn query_state(&self, query: &str) -> Result<Box<dyn StateCursor + '_>, LedgerError> {
        (**self).query_state(query)
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: Vec<u8>,
    ) -> Result<bool, LedgerError> {
        (**self).compare_and_swap(key, expected, value)
    }
}
