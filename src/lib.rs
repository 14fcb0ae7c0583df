pub mod config;
pub mod error;
pub mod events;
pub mod query;
pub mod repository;
pub mod roster;
pub mod router;
pub mod storage;
pub mod tally;

pub use crate::config::LedgerConfig;
pub use crate::error::{LedgerError, LedgerErrorCode};
pub use crate::events::{EventBus, EventHook, LedgerEvent};
pub use crate::query::QueryEngine;
pub use crate::repository::{PageRequest, RecordRepository};
pub use crate::roster::{Player, default_roster};
pub use crate::router::{Contract, Operation, Response, Router};
pub use crate::storage::keys::KeyCodec;
pub use crate::storage::memory::MemoryStateStore;
pub use crate::storage::{StateCursor, StateEntry, StateStore};
pub use crate::tally::{TallyLedger, TallyMap, VoteEntry, default_ballot};
