use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::events::{EventBus, LedgerEvent};
use crate::storage::StateStore;
use crate::storage::keys::KeyCodec;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Club name to vote count. Serialized as a JSON object with sorted keys.
pub type TallyMap = BTreeMap<String, u64>;

pub const DEFAULT_CLUBS: &[&str] = &[
    "FC Barcelona",
    "Real Madrid",
    "Manchester United",
    "AC Milan",
    "Bayern Munich",
];

pub const DEFAULT_SEED_VOTES: u64 = 5;

pub fn default_ballot() -> TallyMap {
    DEFAULT_CLUBS
        .iter()
        .map(|club| (club.to_string(), DEFAULT_SEED_VOTES))
        .collect()
}

/// Attribution for one cast vote, kept in the vote log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteEntry {
    pub participant: String,
    pub time: String,
    pub category: String,
}

/// The single shared vote aggregate.
///
/// Every update is a read-modify-write closed by `compare_and_swap` on the
/// tally key, retried while another writer got there first. No increment is
/// lost as long as every writer goes through this type.
pub struct TallyLedger<'a, S: StateStore + ?Sized> {
    store: &'a S,
    codec: &'a KeyCodec,
    events: &'a EventBus,
    event_name: String,
    cas_retries: usize,
}

impl<'a, S: StateStore + ?Sized> TallyLedger<'a, S> {
    pub fn new(store: &'a S, codec: &'a KeyCodec, events: &'a EventBus) -> Self {
        let defaults = LedgerConfig::default();
        Self {
            store,
            codec,
            events,
            event_name: defaults.vote_event,
            cas_retries: defaults.tally_cas_retries,
        }
    }

    pub fn from_config(
        store: &'a S,
        codec: &'a KeyCodec,
        events: &'a EventBus,
        config: &LedgerConfig,
    ) -> Self {
        Self::new(store, codec, events)
            .with_event_name(config.vote_event.clone())
            .with_cas_retries(config.tally_cas_retries)
    }

    pub fn with_event_name(mut self, event_name: impl Into<String>) -> Self {
        self.event_name = event_name.into();
        self
    }

    pub fn with_cas_retries(mut self, cas_retries: usize) -> Self {
        self.cas_retries = cas_retries.max(1);
        self
    }

    /// Overwrites the tally and clears the vote log. Running it again resets
    /// every count.
    pub fn initialize(&self, seed: &TallyMap) -> Result<(), LedgerError> {
        let tally = encode(seed)?;
        self.store.put_state(self.codec.tally_key(), tally)?;
        self.store
            .put_state(self.codec.vote_log_key(), encode(&Vec::<VoteEntry>::new())?)?;
        info!(
            categories = seed.len(),
            tally_key = self.codec.tally_key(),
            "tally initialized"
        );
        Ok(())
    }

    /// Adds one vote for `category`, creating it at zero if absent, then
    /// emits the vote event. Returns the new count.
    pub fn increment(&self, category: &str) -> Result<u64, LedgerError> {
        let count = self.bump(category)?;
        self.announce(category);
        Ok(count)
    }

    /// One ballot: the optional log entry and the tally increment either both
    /// land or neither does. The event fires only once both are stored.
    pub fn cast(&self, category: &str, vote: Option<VoteEntry>) -> Result<u64, LedgerError> {
        let Some(vote) = vote else {
            return self.increment(category);
        };
        self.record_vote(vote.clone())?;
        match self.bump(category) {
            Ok(count) => {
                self.announce(category);
                Ok(count)
            }
            Err(err) => {
                if let Err(undo) = self.retract_vote(&vote) {
                    warn!(
                        participant = %vote.participant,
                        error = %undo,
                        "vote log entry left behind by failed tally update"
                    );
                }
                Err(err)
            }
        }
    }

    fn bump(&self, category: &str) -> Result<u64, LedgerError> {
        let key = self.codec.tally_key();
        let mut new_count = 0;
        self.update::<TallyMap, _>(key, |tally| {
            let count = tally.entry(category.to_string()).or_insert(0);
            *count = count
                .checked_add(1)
                .ok_or_else(|| LedgerError::corrupt(key, format!("count for '{category}' overflows")))?;
            new_count = *count;
            Ok(())
        })?;
        debug!(category, count = new_count, "vote counted");
        Ok(new_count)
    }

    fn announce(&self, category: &str) {
        self.events
            .emit(LedgerEvent::new(self.event_name.as_str(), category.as_bytes()));
    }

    /// Removes the most recent log entry equal to `vote`.
    fn retract_vote(&self, vote: &VoteEntry) -> Result<(), LedgerError> {
        self.update::<Vec<VoteEntry>, _>(self.codec.vote_log_key(), |log| {
            if let Some(pos) = log.iter().rposition(|entry| entry == vote) {
                log.remove(pos);
            }
            Ok(())
        })
    }

    /// Appends `vote` to the vote log. Returns the log length.
    pub fn record_vote(&self, vote: VoteEntry) -> Result<usize, LedgerError> {
        let key = self.codec.vote_log_key();
        let mut len = 0;
        self.update::<Vec<VoteEntry>, _>(key, |log| {
            log.push(vote.clone());
            len = log.len();
            Ok(())
        })?;
        Ok(len)
    }

    pub fn snapshot(&self) -> Result<TallyMap, LedgerError> {
        self.read(self.codec.tally_key())
    }

    pub fn votes(&self) -> Result<Vec<VoteEntry>, LedgerError> {
        self.read(self.codec.vote_log_key())
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<T, LedgerError> {
        let bytes = self
            .store
            .get_state(key)?
            .ok_or_else(|| LedgerError::not_found(key))?;
        serde_json::from_slice(&bytes).map_err(|e| LedgerError::corrupt(key, e))
    }

    fn update<T, F>(&self, key: &str, mut apply: F) -> Result<(), LedgerError>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(&mut T) -> Result<(), LedgerError>,
    {
        for attempt in 1..=self.cas_retries {
            let current = self
                .store
                .get_state(key)?
                .ok_or_else(|| LedgerError::not_found(key))?;
            let mut value: T =
                serde_json::from_slice(&current).map_err(|e| LedgerError::corrupt(key, e))?;
            apply(&mut value)?;
            if self
                .store
                .compare_and_swap(key, Some(&current), encode(&value)?)?
            {
                return Ok(());
            }
            debug!(key, attempt, "concurrent update, retrying");
        }
        warn!(key, attempts = self.cas_retries, "update gave up after repeated conflicts");
        Err(LedgerError::Conflict {
            key: key.to_string(),
            attempts: self.cas_retries,
        })
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, LedgerError> {
    serde_json::to_vec(value).map_err(|e| LedgerError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{TallyLedger, TallyMap, VoteEntry, default_ballot};
    use crate::error::LedgerError;
    use crate::events::{EventBus, EventHook, LedgerEvent};
    use crate::storage::keys::KeyCodec;
    use crate::storage::memory::MemoryStateStore;
    use crate::storage::{StateCursor, StateStore};
    use std::sync::Arc;

    struct RecordingHook {
        events: Arc<std::sync::Mutex<Vec<LedgerEvent>>>,
    }

    impl EventHook for RecordingHook {
        fn on_event(&self, event: &LedgerEvent) {
            self.events
                .lock()
                .expect("recording hook mutex poisoned")
                .push(event.clone());
        }
    }

    /// Memory store whose compare-and-swap always loses on one key.
    struct StuckKeyStore {
        inner: MemoryStateStore,
        stuck: &'static str,
    }

    impl StateStore for StuckKeyStore {
        fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
            self.inner.get_state(key)
        }

        fn put_state(&self, key: &str, value: Vec<u8>) -> Result<(), LedgerError> {
            self.inner.put_state(key, value)
        }

        fn query_state(&self, query: &str) -> Result<Box<dyn StateCursor + '_>, LedgerError> {
            self.inner.query_state(query)
        }

        fn compare_and_swap(
            &self,
            key: &str,
            expected: Option<&[u8]>,
            value: Vec<u8>,
        ) -> Result<bool, LedgerError> {
            if key == self.stuck {
                return Ok(false);
            }
            self.inner.compare_and_swap(key, expected, value)
        }
    }

    fn milan_vote(who: &str) -> VoteEntry {
        VoteEntry {
            participant: who.into(),
            time: "2019-03-01T10:00:00Z".into(),
            category: "AC Milan".into(),
        }
    }

    fn recording_bus() -> (EventBus, Arc<std::sync::Mutex<Vec<LedgerEvent>>>) {
        let bus = EventBus::new();
        let events = Arc::new(std::sync::Mutex::new(Vec::new()));
        bus.add_hook(Arc::new(RecordingHook {
            events: Arc::clone(&events),
        }));
        (bus, events)
    }

    fn seed(pairs: &[(&str, u64)]) -> TallyMap {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn increments_accumulate_per_category() {
        let store = MemoryStateStore::new();
        let codec = KeyCodec::default();
        let bus = EventBus::new();
        let tally = TallyLedger::new(&store, &codec, &bus);
        tally.initialize(&seed(&[("X", 5), ("Y", 5)])).expect("init");

        for expected in 6..=8 {
            assert_eq!(tally.increment("X").expect("increment"), expected);
        }
        assert_eq!(tally.snapshot().expect("snapshot"), seed(&[("X", 8), ("Y", 5)]));
    }

    #[test]
    fn unknown_category_starts_from_zero() {
        let store = MemoryStateStore::new();
        let codec = KeyCodec::default();
        let bus = EventBus::new();
        let tally = TallyLedger::new(&store, &codec, &bus);
        tally.initialize(&default_ballot()).expect("init");

        assert_eq!(tally.increment("Ajax").expect("increment"), 1);
        let snapshot = tally.snapshot().expect("snapshot");
        assert_eq!(snapshot.get("Ajax"), Some(&1));
        assert_eq!(snapshot.get("AC Milan"), Some(&5));
        assert_eq!(snapshot.len(), 6);
    }

    #[test]
    fn increment_emits_vote_event() {
        let store = MemoryStateStore::new();
        let codec = KeyCodec::default();
        let bus = EventBus::new();
        let events = Arc::new(std::sync::Mutex::new(Vec::new()));
        bus.add_hook(Arc::new(RecordingHook {
            events: Arc::clone(&events),
        }));
        let tally = TallyLedger::new(&store, &codec, &bus);
        tally.initialize(&default_ballot()).expect("init");
        tally.increment("Real Madrid").expect("increment");

        let seen = events.lock().expect("lock");
        assert_eq!(
            *seen,
            vec![LedgerEvent::new("voteCasted", "Real Madrid")]
        );
    }

    #[test]
    fn corrupt_tally_fails_without_emitting() {
        let store = MemoryStateStore::new();
        let codec = KeyCodec::default();
        let bus = EventBus::new();
        let events = Arc::new(std::sync::Mutex::new(Vec::new()));
        bus.add_hook(Arc::new(RecordingHook {
            events: Arc::clone(&events),
        }));
        let tally = TallyLedger::new(&store, &codec, &bus);
        store
            .put_state("VoteCount", br#"{"X":-1}"#.to_vec())
            .expect("put");

        assert!(matches!(
            tally.increment("X").expect_err("corrupt"),
            LedgerError::CorruptState { .. }
        ));
        assert!(matches!(
            tally.snapshot().expect_err("corrupt"),
            LedgerError::CorruptState { .. }
        ));
        assert!(events.lock().expect("lock").is_empty());
    }

    #[test]
    fn uninitialized_tally_is_not_found() {
        let store = MemoryStateStore::new();
        let codec = KeyCodec::default();
        let bus = EventBus::new();
        let tally = TallyLedger::new(&store, &codec, &bus);
        assert!(matches!(
            tally.increment("X").expect_err("absent"),
            LedgerError::NotFound { .. }
        ));
    }

    #[test]
    fn vote_log_appends_in_order_and_resets_on_initialize() {
        let store = MemoryStateStore::new();
        let codec = KeyCodec::default();
        let bus = EventBus::new();
        let tally = TallyLedger::new(&store, &codec, &bus);
        tally.initialize(&default_ballot()).expect("init");
        assert!(tally.votes().expect("votes").is_empty());

        let vote = |who: &str| VoteEntry {
            participant: who.into(),
            time: "2019-03-01T10:00:00Z".into(),
            category: "AC Milan".into(),
        };
        assert_eq!(tally.record_vote(vote("alice")).expect("record"), 1);
        assert_eq!(tally.record_vote(vote("bob")).expect("record"), 2);
        let log = tally.votes().expect("votes");
        assert_eq!(log[0].participant, "alice");
        assert_eq!(log[1].participant, "bob");

        tally.initialize(&default_ballot()).expect("reinit");
        assert!(tally.votes().expect("votes").is_empty());
    }

    #[test]
    fn attributed_vote_with_stuck_log_changes_nothing() {
        let store = StuckKeyStore {
            inner: MemoryStateStore::new(),
            stuck: "Votes",
        };
        let codec = KeyCodec::default();
        let (bus, events) = recording_bus();
        let tally = TallyLedger::new(&store, &codec, &bus).with_cas_retries(3);
        tally.initialize(&default_ballot()).expect("init");

        let err = tally
            .cast("AC Milan", Some(milan_vote("alice")))
            .expect_err("log conflict");
        assert!(matches!(err, LedgerError::Conflict { ref key, .. } if key == "Votes"));
        assert_eq!(tally.snapshot().expect("snapshot")["AC Milan"], 5);
        assert!(tally.votes().expect("votes").is_empty());
        assert!(events.lock().expect("lock").is_empty());
    }

    #[test]
    fn attributed_vote_with_stuck_tally_retracts_log_entry() {
        let store = StuckKeyStore {
            inner: MemoryStateStore::new(),
            stuck: "VoteCount",
        };
        let codec = KeyCodec::default();
        let (bus, events) = recording_bus();
        let tally = TallyLedger::new(&store, &codec, &bus).with_cas_retries(3);
        tally.initialize(&default_ballot()).expect("init");

        let err = tally
            .cast("AC Milan", Some(milan_vote("bob")))
            .expect_err("tally conflict");
        assert!(matches!(err, LedgerError::Conflict { ref key, .. } if key == "VoteCount"));
        assert!(tally.votes().expect("votes").is_empty());
        assert_eq!(tally.snapshot().expect("snapshot")["AC Milan"], 5);
        assert!(events.lock().expect("lock").is_empty());
    }

    #[test]
    fn attributed_vote_lands_in_both_and_emits_once() {
        let store = MemoryStateStore::new();
        let codec = KeyCodec::default();
        let (bus, events) = recording_bus();
        let tally = TallyLedger::new(&store, &codec, &bus);
        tally.initialize(&default_ballot()).expect("init");

        assert_eq!(tally.cast("AC Milan", Some(milan_vote("carol"))).expect("cast"), 6);
        assert_eq!(tally.votes().expect("votes"), vec![milan_vote("carol")]);
        assert_eq!(events.lock().expect("lock").len(), 1);
    }
}
