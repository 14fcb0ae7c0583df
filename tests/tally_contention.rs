use pitchledger::config::LedgerConfig;
use pitchledger::error::LedgerError;
use pitchledger::events::{EventHook, LedgerEvent};
use pitchledger::router::Router;
use pitchledger::storage::memory::MemoryStateStore;
use pitchledger::storage::{StateCursor, StateStore};
use pitchledger::tally::{DEFAULT_SEED_VOTES, TallyMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinSet;

struct CountingHook {
    seen: AtomicU64,
}

impl EventHook for CountingHook {
    fn on_event(&self, event: &LedgerEvent) {
        assert_eq!(event.name, "voteCasted");
        self.seen.fetch_add(1, Ordering::SeqCst);
    }
}

fn score(router: &Router<Arc<MemoryStateStore>>) -> TallyMap {
    let payload = router
        .try_invoke("getScore", &[])
        .expect("getScore")
        .expect("payload");
    serde_json::from_slice(&payload).expect("tally json")
}

/// Many writers hammering the same tally key: every vote lands exactly once.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_votes_are_never_lost() {
    let store = Arc::new(MemoryStateStore::new());
    let config = LedgerConfig {
        tally_cas_retries: 10_000,
        ..LedgerConfig::default()
    };
    let router = Arc::new(Router::ballot(Arc::clone(&store), config).expect("router"));
    let hook = Arc::new(CountingHook {
        seen: AtomicU64::new(0),
    });
    router.events().add_hook(hook.clone());
    router.try_invoke("initLedger", &[]).expect("init");

    let clubs = ["FC Barcelona", "Real Madrid", "Ajax"];
    let voters = 16;
    let votes_each = 25;

    let mut tasks = JoinSet::new();
    for voter in 0..voters {
        let router = Arc::clone(&router);
        let club = clubs[voter % clubs.len()].to_string();
        tasks.spawn_blocking(move || {
            for _ in 0..votes_each {
                router
                    .try_invoke("castVote", std::slice::from_ref(&club))
                    .expect("castVote");
            }
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.expect("voter task");
    }

    let tally = score(&router);
    let per_club = |club: &str| (0..voters).filter(|v| clubs[v % clubs.len()] == club).count() as u64;
    assert_eq!(
        tally["FC Barcelona"],
        DEFAULT_SEED_VOTES + per_club("FC Barcelona") * votes_each
    );
    assert_eq!(
        tally["Real Madrid"],
        DEFAULT_SEED_VOTES + per_club("Real Madrid") * votes_each
    );
    assert_eq!(tally["Ajax"], per_club("Ajax") * votes_each);
    assert_eq!(tally["AC Milan"], DEFAULT_SEED_VOTES);
    assert_eq!(
        hook.seen.load(Ordering::SeqCst),
        voters as u64 * votes_each
    );
}

/// Stock retry budget: a handful of concurrent voters must never exhaust it.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn default_retry_budget_absorbs_moderate_contention() {
    let router = Arc::new(
        Router::ballot(Arc::new(MemoryStateStore::new()), LedgerConfig::default())
            .expect("router"),
    );
    router.try_invoke("initLedger", &[]).expect("init");

    let voters = 4u64;
    let votes_each = 50u64;
    let mut tasks = JoinSet::new();
    for _ in 0..voters {
        let router = Arc::clone(&router);
        tasks.spawn_blocking(move || {
            let vote = vec!["Manchester United".to_string()];
            for _ in 0..votes_each {
                router.try_invoke("castVote", &vote).expect("castVote");
            }
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.expect("voter task");
    }

    assert_eq!(
        score(&router)["Manchester United"],
        DEFAULT_SEED_VOTES + voters * votes_each
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn attributed_votes_all_reach_the_log() {
    let store = Arc::new(MemoryStateStore::new());
    let config = LedgerConfig {
        tally_cas_retries: 10_000,
        ..LedgerConfig::default()
    };
    let router = Arc::new(Router::ballot(store, config).expect("router"));
    router.try_invoke("initLedger", &[]).expect("init");

    let mut tasks = JoinSet::new();
    for voter in 0..8 {
        let router = Arc::clone(&router);
        tasks.spawn_blocking(move || {
            let args = vec![
                "AC Milan".to_string(),
                format!("fan-{voter}"),
                "2019-03-01T10:00:00Z".to_string(),
            ];
            router.try_invoke("castVote", &args).expect("castVote");
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.expect("voter task");
    }

    let payload = router
        .try_invoke("getVotes", &[])
        .expect("getVotes")
        .expect("payload");
    let log: Vec<serde_json::Value> = serde_json::from_slice(&payload).expect("log json");
    assert_eq!(log.len(), 8);
    assert_eq!(score(&router)["AC Milan"], DEFAULT_SEED_VOTES + 8);
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

fn stuck_router(stuck: &'static str) -> Router<StuckKeyStore> {
    let config = LedgerConfig {
        tally_cas_retries: 3,
        ..LedgerConfig::default()
    };
    let store = StuckKeyStore {
        inner: MemoryStateStore::new(),
        stuck,
    };
    let router = Router::ballot(store, config).expect("router");
    router.try_invoke("initLedger", &[]).expect("init");
    router
}

#[test]
fn exhausted_retries_surface_as_conflict() {
    let router = stuck_router("VoteCount");
    let err = router
        .try_invoke("castVote", &["Real Madrid".to_string()])
        .expect_err("conflict");
    assert!(matches!(err, LedgerError::Conflict { attempts: 3, .. }));
}

#[test]
fn failed_attributed_vote_leaves_no_trace() {
    for stuck in ["Votes", "VoteCount"] {
        let router = stuck_router(stuck);
        let hook = Arc::new(CountingHook {
            seen: AtomicU64::new(0),
        });
        router.events().add_hook(hook.clone());

        let args = vec![
            "AC Milan".to_string(),
            "alice".to_string(),
            "2019-03-01T10:00:00Z".to_string(),
        ];
        let response = router.invoke("castVote", &args);
        assert!(!response.is_ok(), "stuck on {stuck}");
        assert_eq!(response.code, Some("conflict"));

        let payload = router
            .try_invoke("getScore", &[])
            .expect("getScore")
            .expect("payload");
        let tally: TallyMap = serde_json::from_slice(&payload).expect("tally json");
        assert_eq!(tally["AC Milan"], DEFAULT_SEED_VOTES, "stuck on {stuck}");

        let payload = router
            .try_invoke("getVotes", &[])
            .expect("getVotes")
            .expect("payload");
        assert_eq!(payload, b"[]".to_vec(), "stuck on {stuck}");
        assert_eq!(hook.seen.load(Ordering::SeqCst), 0, "stuck on {stuck}");
    }
}
