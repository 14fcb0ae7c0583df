use crate::error::LedgerError;
use crate::storage::{StateCursor, StateEntry, StateStore};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::value::RawValue;
use tracing::{debug, warn};

/// Runs store-defined predicate queries and assembles their results.
///
/// The predicate string is handed to the store verbatim; its grammar is
/// whatever the store implements.
pub struct QueryEngine<'a, S: StateStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: StateStore + ?Sized> QueryEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Drains the store cursor in its iteration order. Any failure discards
    /// what was collected so far; the cursor is closed on every path.
    pub fn run_query(&self, query: &str) -> Result<Vec<StateEntry>, LedgerError> {
        debug!(query, "predicate query");
        let cursor = self.store.query_state(query).map_err(as_query_error)?;
        let mut cursor = CursorGuard::new(cursor);
        let mut entries = Vec::new();
        while cursor.has_next() {
            entries.push(cursor.next_entry().map_err(as_query_error)?);
        }
        cursor.close().map_err(as_query_error)?;
        debug!(results = entries.len(), "predicate query drained");
        Ok(entries)
    }

    /// `run_query` rendered as a JSON array of `{"Key": .., "Record": ..}`
    /// with each record embedded as stored.
    pub fn run_query_json(&self, query: &str) -> Result<Vec<u8>, LedgerError> {
        render_keyed_records(&self.run_query(query)?)
    }
}

#[derive(Serialize)]
struct KeyedRecord<'a> {
    #[serde(rename = "Key")]
    key: &'a str,
    #[serde(rename = "Record")]
    record: &'a RawValue,
}

pub fn render_keyed_records(entries: &[StateEntry]) -> Result<Vec<u8>, LedgerError> {
    let records = entries
        .iter()
        .map(|entry| {
            let record: &RawValue = serde_json::from_slice(&entry.value)
                .map_err(|e| LedgerError::decode(&entry.key, e))?;
            Ok(KeyedRecord {
                key: &entry.key,
                record,
            })
        })
        .collect::<Result<Vec<_>, LedgerError>>()?;
    serde_json::to_vec(&records).map_err(|e| LedgerError::Encode(e.to_string()))
}

pub fn decode_entries<R: DeserializeOwned>(
    entries: &[StateEntry],
) -> Result<Vec<(String, R)>, LedgerError> {
    entries
        .iter()
        .map(|entry| {
            serde_json::from_slice(&entry.value)
                .map(|record| (entry.key.clone(), record))
                .map_err(|e| LedgerError::decode(&entry.key, e))
        })
        .collect()
}

fn as_query_error(err: LedgerError) -> LedgerError {
    match err {
        LedgerError::Query(_) => err,
        other => LedgerError::Query(other.to_string()),
    }
}

/// Closes the wrapped cursor when dropped unless `close` already ran.
struct CursorGuard<'a> {
    cursor: Option<Box<dyn StateCursor + 'a>>,
}

impl<'a> CursorGuard<'a> {
    fn new(cursor: Box<dyn StateCursor + 'a>) -> Self {
        Self {
            cursor: Some(cursor),
        }
    }

    fn has_next(&self) -> bool {
        self.cursor.as_ref().is_some_and(|c| c.has_next())
    }

    fn next_entry(&mut self) -> Result<StateEntry, LedgerError> {
        match self.cursor.as_mut() {
            Some(cursor) => cursor.next_entry(),
            None => Err(LedgerError::Query("cursor is closed".into())),
        }
    }

    fn close(mut self) -> Result<(), LedgerError> {
        match self.cursor.take() {
            Some(mut cursor) => cursor.close(),
            None => Ok(()),
        }
    }
}

impl Drop for CursorGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            if let Err(err) = cursor.close() {
                warn!(error = %err, "failed to close query cursor");
            }
        }
    }
}
