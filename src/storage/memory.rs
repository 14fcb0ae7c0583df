use crate::error::LedgerError;
use crate::storage::selector::SelectorQuery;
use crate::storage::{StateCursor, StateEntry, StateStore};
use im::OrdMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::NamedTempFile;
use tracing::debug;

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreMetrics {
    pub reads: u64,
    pub writes: u64,
    pub queries: u64,
    pub cas_conflicts: u64,
}

/// On-disk form of a [`MemoryStateStore`]. Values are hex encoded so that
/// arbitrary bytes survive the JSON round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub format_version: u32,
    pub digest_hex: String,
    pub entries: BTreeMap<String, String>,
}

/// In-process state store. Queries run against a structural snapshot taken
/// when the query starts, so concurrent writes never show up mid-iteration.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: RwLock<OrdMap<String, Vec<u8>>>,
    reads: AtomicU64,
    writes: AtomicU64,
    queries: AtomicU64,
    cas_conflicts: AtomicU64,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn metrics(&self) -> StoreMetrics {
        StoreMetrics {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            cas_conflicts: self.cas_conflicts.load(Ordering::Relaxed),
        }
    }

    pub fn digest_hex(&self) -> String {
        digest_entries(self.entries.read().iter().map(|(k, v)| (k.as_str(), v.as_slice())))
    }

    pub fn to_snapshot(&self) -> StateSnapshot {
        let entries = self.entries.read().clone();
        StateSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            digest_hex: digest_entries(entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))),
            entries: entries
                .iter()
                .map(|(k, v)| (k.clone(), hex::encode(v)))
                .collect(),
        }
    }

    pub fn from_snapshot(snapshot: StateSnapshot) -> Result<Self, LedgerError> {
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(LedgerError::corrupt(
                "snapshot",
                format!("unsupported format version {}", snapshot.format_version),
            ));
        }
        let mut entries = OrdMap::new();
        for (key, value_hex) in snapshot.entries {
            let value = hex::decode(&value_hex).map_err(|e| LedgerError::corrupt(&key, e))?;
            entries.insert(key, value);
        }
        let actual = digest_entries(entries.iter().map(|(k, v)| (k.as_str(), v.as_slice())));
        if actual != snapshot.digest_hex {
            return Err(LedgerError::corrupt(
                "snapshot",
                format!(
                    "digest mismatch: expected {}, got {actual}",
                    snapshot.digest_hex
                ),
            ));
        }
        Ok(Self {
            entries: RwLock::new(entries),
            ..Self::default()
        })
    }

    /// Writes the store to `path` through a temp file in the same directory
    /// followed by a rename.
    pub fn save(&self, path: &Path) -> Result<(), LedgerError> {
        let bytes = serde_json::to_vec_pretty(&self.to_snapshot())
            .map_err(|e| LedgerError::Encode(e.to_string()))?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| LedgerError::Io(e.error))?;
        debug!(path = %path.display(), bytes = bytes.len(), "state snapshot saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        let bytes = std::fs::read(path)?;
        let snapshot: StateSnapshot = serde_json::from_slice(&bytes)
            .map_err(|e| LedgerError::corrupt(path.display().to_string(), e))?;
        Self::from_snapshot(snapshot)
    }

    /// Loads `path` if it exists, otherwise starts empty.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }
}

impl StateStore for MemoryStateStore {
    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.entries.read().get(key).cloned())
    }

    fn put_state(&self, key: &str, value: Vec<u8>) -> Result<(), LedgerError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn query_state(&self, query: &str) -> Result<Box<dyn StateCursor + '_>, LedgerError> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let query = SelectorQuery::parse(query)?;
        let snapshot = self.entries.read().clone();
        debug!(entries = snapshot.len(), "selector query over snapshot");
        Ok(Box::new(SnapshotCursor::new(snapshot, query)))
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: Vec<u8>,
    ) -> Result<bool, LedgerError> {
        let mut entries = self.entries.write();
        if entries.get(key).map(Vec::as_slice) != expected {
            self.cas_conflicts.fetch_add(1, Ordering::Relaxed);
            return Ok(false);
        }
        entries.insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }
}

struct SnapshotCursor {
    source: Box<dyn Iterator<Item = (String, Vec<u8>)> + Send>,
    query: SelectorQuery,
    to_skip: usize,
    remaining: Option<usize>,
    pending: Option<StateEntry>,
    closed: bool,
}

impl SnapshotCursor {
    fn new(snapshot: OrdMap<String, Vec<u8>>, query: SelectorQuery) -> Self {
        let mut cursor = Self {
            source: Box::new(snapshot.into_iter()),
            to_skip: query.skip,
            remaining: query.limit,
            query,
            pending: None,
            closed: false,
        };
        cursor.advance();
        cursor
    }

    fn advance(&mut self) {
        self.pending = None;
        if self.remaining == Some(0) {
            return;
        }
        for (key, value) in self.source.by_ref() {
            if !self.query.matches_bytes(&value) {
                continue;
            }
            if self.to_skip > 0 {
                self.to_skip -= 1;
                continue;
            }
            if let Some(remaining) = self.remaining.as_mut() {
                *remaining -= 1;
            }
            self.pending = Some(StateEntry { key, value });
            return;
        }
    }
}

impl StateCursor for SnapshotCursor {
    fn has_next(&self) -> bool {
        !self.closed && self.pending.is_some()
    }

    fn next_entry(&mut self) -> Result<StateEntry, LedgerError> {
        if self.closed {
            return Err(LedgerError::Query("cursor is closed".into()));
        }
        let entry = self
            .pending
            .take()
            .ok_or_else(|| LedgerError::Query("cursor is exhausted".into()))?;
        self.advance();
        Ok(entry)
    }

    fn close(&mut self) -> Result<(), LedgerError> {
        self.closed = true;
        self.pending = None;
        Ok(())
    }
}

fn digest_entries<'a>(entries: impl Iterator<Item = (&'a str, &'a [u8])>) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in entries {
        hasher.update((key.len() as u64).to_be_bytes());
        hasher.update(key.as_bytes());
        hasher.update((value.len() as u64).to_be_bytes());
        hasher.update(value);
    }
    hex::encode(hasher.finalize())
}
