use crate::config::LedgerConfig;

/// Maps logical record positions and aggregate names onto state keys.
///
/// Record `n` lives at `prefix + decimal(n)` with no padding, so the key of a
/// seeded record never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCodec {
    record_prefix: String,
    count_key: String,
    tally_key: String,
    vote_log_key: String,
}

impl KeyCodec {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            record_prefix: config.record_prefix.clone(),
            count_key: config.count_key.clone(),
            tally_key: config.tally_key.clone(),
            vote_log_key: config.vote_log_key.clone(),
        }
    }

    pub fn record_key(&self, index: u64) -> String {
        format!("{}{index}", self.record_prefix)
    }

    /// Inverse of `record_key`. Rejects padded or signed indices so that
    /// every index has exactly one key.
    pub fn parse_record_key(&self, key: &str) -> Option<u64> {
        let digits = key.strip_prefix(self.record_prefix.as_str())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if digits.len() > 1 && digits.starts_with('0') {
            return None;
        }
        digits.parse().ok()
    }

    pub fn count_key(&self) -> &str {
        &self.count_key
    }

    pub fn tally_key(&self) -> &str {
        &self.tally_key
    }

    pub fn vote_log_key(&self) -> &str {
        &self.vote_log_key
    }
}

impl Default for KeyCodec {
    fn default() -> Self {
        Self::new(&LedgerConfig::default())
    }
}
