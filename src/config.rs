use crate::error::LedgerError;
use crate::storage::keys::KeyCodec;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Runtime configuration for the roster and ballot contracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub record_prefix: String,
    pub count_key: String,
    pub tally_key: String,
    pub vote_log_key: String,
    pub vote_event: String,
    /// Reject a page that runs past the stored record count before reading
    /// any record. When disabled the first missing record key surfaces the
    /// failure instead.
    pub check_page_bounds: bool,
    /// Optional cap on a single page. Unset means any page inside the
    /// seeded range is served.
    pub max_page_limit: Option<u64>,
    pub tally_cas_retries: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            record_prefix: "PLAYER".into(),
            count_key: "PLAYER_COUNT".into(),
            tally_key: "VoteCount".into(),
            vote_log_key: "Votes".into(),
            vote_event: "voteCasted".into(),
            check_page_bounds: true,
            max_page_limit: None,
            tally_cas_retries: 64,
        }
    }
}

impl LedgerConfig {
    /// Discover-on-read pagination: out-of-range pages fail on the first
    /// absent record key rather than against the stored count.
    pub fn compat() -> Self {
        Self {
            check_page_bounds: false,
            ..Self::default()
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, LedgerError> {
        let bytes = std::fs::read(path)?;
        let config: LedgerConfig =
            serde_json::from_slice(&bytes).map_err(|e| LedgerError::InvalidConfig {
                message: format!("{}: {e}", path.display()),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        let well_known = [
            ("count_key", &self.count_key),
            ("tally_key", &self.tally_key),
            ("vote_log_key", &self.vote_log_key),
        ];
        if self.record_prefix.is_empty() {
            return Err(invalid("record_prefix must not be empty"));
        }
        if self.vote_event.is_empty() {
            return Err(invalid("vote_event must not be empty"));
        }
        let codec = KeyCodec::new(self);
        for (idx, (name, key)) in well_known.iter().enumerate() {
            if key.is_empty() {
                return Err(invalid(format!("{name} must not be empty")));
            }
            if codec.parse_record_key(key).is_some() {
                return Err(invalid(format!(
                    "{name} '{key}' collides with record keys under prefix '{}'",
                    self.record_prefix
                )));
            }
            for (other_name, other) in &well_known[idx + 1..] {
                if key == other {
                    return Err(invalid(format!(
                        "{name} and {other_name} share the key '{key}'"
                    )));
                }
            }
        }
        if self.max_page_limit == Some(0) {
            return Err(invalid("max_page_limit must be at least 1"));
        }
        if self.tally_cas_retries == 0 {
            return Err(invalid("tally_cas_retries must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> LedgerError {
    LedgerError::InvalidConfig {
        message: message.into(),
    }
}
