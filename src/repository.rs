use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::storage::StateStore;
use crate::storage::keys::KeyCodec;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: u64,
    pub limit: u64,
}

impl PageRequest {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }
}

/// Positional record collection laid over a key-value store.
///
/// Record `i` of the seeded sequence is stored at `KeyCodec::record_key(i)`
/// and the cardinality at `KeyCodec::count_key()`.
pub struct RecordRepository<'a, S: StateStore + ?Sized> {
    store: &'a S,
    codec: &'a KeyCodec,
    check_page_bounds: bool,
    max_page_limit: Option<u64>,
}

impl<'a, S: StateStore + ?Sized> RecordRepository<'a, S> {
    pub fn new(store: &'a S, codec: &'a KeyCodec) -> Self {
        let defaults = LedgerConfig::default();
        Self {
            store,
            codec,
            check_page_bounds: defaults.check_page_bounds,
            max_page_limit: defaults.max_page_limit,
        }
    }

    pub fn from_config(store: &'a S, codec: &'a KeyCodec, config: &LedgerConfig) -> Self {
        Self::new(store, codec)
            .with_check_page_bounds(config.check_page_bounds)
            .with_page_cap(config.max_page_limit)
    }

    pub fn with_check_page_bounds(mut self, check_page_bounds: bool) -> Self {
        self.check_page_bounds = check_page_bounds;
        self
    }

    pub fn with_max_page_limit(self, max_page_limit: u64) -> Self {
        self.with_page_cap(Some(max_page_limit))
    }

    pub fn with_page_cap(mut self, max_page_limit: Option<u64>) -> Self {
        self.max_page_limit = max_page_limit;
        self
    }

    /// Writes the count followed by every record in input order. A failed
    /// write leaves earlier writes in place; rollback belongs to whatever
    /// transaction encloses the call.
    pub fn seed<R: Serialize>(&self, records: &[R]) -> Result<u64, LedgerError> {
        let count = records.len() as u64;
        self.store
            .put_state(self.codec.count_key(), count.to_string().into_bytes())?;
        for (index, record) in records.iter().enumerate() {
            let key = self.codec.record_key(index as u64);
            let bytes = serde_json::to_vec(record).map_err(|e| LedgerError::Encode(e.to_string()))?;
            self.store.put_state(&key, bytes)?;
            debug!(key = %key, "record written");
        }
        info!(count, count_key = self.codec.count_key(), "records seeded");
        Ok(count)
    }

    pub fn get<R: DeserializeOwned>(&self, index: u64) -> Result<R, LedgerError> {
        let key = self.codec.record_key(index);
        let bytes = self
            .store
            .get_state(&key)?
            .ok_or_else(|| LedgerError::not_found(&key))?;
        serde_json::from_slice(&bytes).map_err(|e| LedgerError::decode(&key, e))
    }

    /// Returns records `offset..offset+limit` in positional order, or an
    /// error if any of them cannot be read. Never returns a partial page.
    ///
    /// A page running past the seeded range is `NotFound` even when it also
    /// exceeds the page cap.
    pub fn paginate<R: DeserializeOwned>(&self, page: PageRequest) -> Result<Vec<R>, LedgerError> {
        if page.limit == 0 {
            return Ok(Vec::new());
        }
        let end = page.offset.checked_add(page.limit).ok_or_else(|| {
            LedgerError::InvalidArgument(format!(
                "offset {} + limit {} overflows",
                page.offset, page.limit
            ))
        })?;

        if self.check_page_bounds {
            let count = self.get_count()?;
            if end > count {
                return Err(LedgerError::not_found(
                    self.codec.record_key(page.offset.max(count)),
                ));
            }
        }
        if let Some(max) = self.max_page_limit {
            if page.limit > max {
                return Err(LedgerError::InvalidArgument(format!(
                    "limit {} exceeds the maximum page size of {max}",
                    page.limit
                )));
            }
        }

        let mut records = Vec::with_capacity(page.limit.min(1024) as usize);
        for index in page.offset..end {
            records.push(self.get(index)?);
        }
        debug!(offset = page.offset, limit = page.limit, "page read");
        Ok(records)
    }

    pub fn get_count(&self) -> Result<u64, LedgerError> {
        let key = self.codec.count_key();
        let bytes = self
            .store
            .get_state(key)?
            .ok_or_else(|| LedgerError::not_found(key))?;
        std::str::from_utf8(&bytes)
            .map_err(|e| LedgerError::decode(key, e))?
            .parse::<u64>()
            .map_err(|e| LedgerError::decode(key, e))
    }
}
