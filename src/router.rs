use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::events::EventBus;
use crate::query::QueryEngine;
use crate::repository::{PageRequest, RecordRepository};
use crate::roster::{Player, default_roster};
use crate::storage::StateStore;
use crate::storage::keys::KeyCodec;
use crate::tally::{TallyLedger, VoteEntry, default_ballot};
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

pub const STATUS_OK: i32 = 200;
pub const STATUS_ERROR: i32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Contract {
    /// Player registry: seeding, pagination, count and predicate queries.
    Roster,
    /// Club ballot: tally initialisation, scores and vote casting.
    Ballot,
}

impl Contract {
    pub fn as_str(self) -> &'static str {
        match self {
            Contract::Roster => "roster",
            Contract::Ballot => "ballot",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "roster" => Some(Contract::Roster),
            "ballot" => Some(Contract::Ballot),
            _ => None,
        }
    }

    pub fn functions(self) -> &'static [FunctionSpec] {
        match self {
            Contract::Roster => ROSTER_FUNCTIONS,
            Contract::Ballot => BALLOT_FUNCTIONS,
        }
    }

    pub fn lookup(self, name: &str) -> Option<&'static FunctionSpec> {
        self.functions().iter().find(|function| function.name == name)
    }
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    InitRoster,
    QueryAllPlayers,
    QueryPlayerCount,
    QueryPlayers,
    InitBallot,
    GetScore,
    CastVote,
    GetVotes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    OneOf(&'static [usize]),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => n == count,
            Arity::OneOf(options) => options.contains(&count),
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::OneOf(options) => {
                let parts: Vec<String> = options.iter().map(usize::to_string).collect();
                write!(f, "{}", parts.join(" or "))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub kind: FunctionKind,
    pub arity: Arity,
}

const ROSTER_FUNCTIONS: &[FunctionSpec] = &[
    FunctionSpec {
        name: "initLedger",
        kind: FunctionKind::InitRoster,
        arity: Arity::Exact(0),
    },
    FunctionSpec {
        name: "queryAllPlayers",
        kind: FunctionKind::QueryAllPlayers,
        arity: Arity::Exact(2),
    },
    FunctionSpec {
        name: "queryPlayerCount",
        kind: FunctionKind::QueryPlayerCount,
        arity: Arity::Exact(0),
    },
    FunctionSpec {
        name: "queryPlayers",
        kind: FunctionKind::QueryPlayers,
        arity: Arity::Exact(1),
    },
    // generic aliases
    FunctionSpec {
        name: "paginate",
        kind: FunctionKind::QueryAllPlayers,
        arity: Arity::Exact(2),
    },
    FunctionSpec {
        name: "query",
        kind: FunctionKind::QueryPlayers,
        arity: Arity::Exact(1),
    },
];

const BALLOT_FUNCTIONS: &[FunctionSpec] = &[
    FunctionSpec {
        name: "initLedger",
        kind: FunctionKind::InitBallot,
        arity: Arity::Exact(0),
    },
    FunctionSpec {
        name: "getScore",
        kind: FunctionKind::GetScore,
        arity: Arity::Exact(0),
    },
    // [category] or [category, participant, time]
    FunctionSpec {
        name: "castVote",
        kind: FunctionKind::CastVote,
        arity: Arity::OneOf(&[1, 3]),
    },
    FunctionSpec {
        name: "getVotes",
        kind: FunctionKind::GetVotes,
        arity: Arity::Exact(0),
    },
];

/// A validated call, ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    InitRoster,
    QueryAllPlayers(PageRequest),
    QueryPlayerCount,
    QueryPlayers { query: String },
    InitBallot,
    GetScore,
    CastVote {
        category: String,
        vote: Option<VoteEntry>,
    },
    GetVotes,
}

impl Operation {
    pub fn parse(contract: Contract, function: &str, args: &[String]) -> Result<Self, LedgerError> {
        let entry = contract
            .lookup(function)
            .ok_or_else(|| LedgerError::UnknownFunction {
                name: function.to_string(),
            })?;
        if !entry.arity.accepts(args.len()) {
            return Err(LedgerError::InvalidArgument(format!(
                "incorrect number of arguments for {function}: expecting {}, got {}",
                entry.arity,
                args.len()
            )));
        }

        Ok(match entry.kind {
            FunctionKind::InitRoster => Operation::InitRoster,
            FunctionKind::QueryAllPlayers => Operation::QueryAllPlayers(PageRequest::new(
                parse_u64("offset", &args[0])?,
                parse_u64("limit", &args[1])?,
            )),
            FunctionKind::QueryPlayerCount => Operation::QueryPlayerCount,
            FunctionKind::QueryPlayers => Operation::QueryPlayers {
                query: non_empty("query", &args[0])?.to_string(),
            },
            FunctionKind::InitBallot => Operation::InitBallot,
            FunctionKind::GetScore => Operation::GetScore,
            FunctionKind::CastVote => {
                let category = non_empty("category", &args[0])?.to_string();
                let vote = match args {
                    [_, participant, time] => Some(VoteEntry {
                        participant: non_empty("participant", participant)?.to_string(),
                        time: non_empty("time", time)?.to_string(),
                        category: category.clone(),
                    }),
                    _ => None,
                };
                Operation::CastVote { category, vote }
            }
            FunctionKind::GetVotes => Operation::GetVotes,
        })
    }
}

fn parse_u64(what: &str, value: &str) -> Result<u64, LedgerError> {
    value.parse::<u64>().map_err(|_| {
        LedgerError::InvalidArgument(format!(
            "{what} must be a non-negative integer, got '{value}'"
        ))
    })
}

fn non_empty<'v>(what: &str, value: &'v str) -> Result<&'v str, LedgerError> {
    if value.trim().is_empty() {
        return Err(LedgerError::InvalidArgument(format!("{what} must not be empty")));
    }
    Ok(value)
}

/// Outcome of one invocation: status 200 with an optional payload, or
/// status 500 with the error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: i32,
    pub message: String,
    pub code: Option<&'static str>,
    pub payload: Option<Vec<u8>>,
}

impl Response {
    pub fn success(payload: Option<Vec<u8>>) -> Self {
        Self {
            status: STATUS_OK,
            message: String::new(),
            code: None,
            payload,
        }
    }

    pub fn error(err: &LedgerError) -> Self {
        Self {
            status: STATUS_ERROR,
            message: err.to_string(),
            code: Some(err.code_str()),
            payload: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// Entry point for one contract over a state store.
pub struct Router<S: StateStore> {
    contract: Contract,
    store: S,
    config: LedgerConfig,
    codec: KeyCodec,
    events: EventBus,
}

impl<S: StateStore> Router<S> {
    pub fn new(contract: Contract, store: S, config: LedgerConfig) -> Result<Self, LedgerError> {
        config.validate()?;
        Ok(Self {
            contract,
            store,
            codec: KeyCodec::new(&config),
            config,
            events: EventBus::new(),
        })
    }

    pub fn roster(store: S, config: LedgerConfig) -> Result<Self, LedgerError> {
        Self::new(Contract::Roster, store, config)
    }

    pub fn ballot(store: S, config: LedgerConfig) -> Result<Self, LedgerError> {
        Self::new(Contract::Ballot, store, config)
    }

    /// Shares an existing bus, e.g. one listener across both contracts.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn contract(&self) -> Contract {
        self.contract
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Instantiation hook; state is seeded by `initLedger`, not here.
    pub fn init(&self) -> Response {
        Response::success(None)
    }

    pub fn invoke(&self, function: &str, args: &[String]) -> Response {
        match self.try_invoke(function, args) {
            Ok(payload) => Response::success(payload),
            Err(err) => Response::error(&err),
        }
    }

    pub fn try_invoke(&self, function: &str, args: &[String]) -> Result<Option<Vec<u8>>, LedgerError> {
        debug!(contract = %self.contract, function, args = args.len(), "invoke");
        let result = Operation::parse(self.contract, function, args).and_then(|op| self.execute(op));
        if let Err(err) = &result {
            warn!(
                contract = %self.contract,
                function,
                code = err.code_str(),
                error = %err,
                "invocation failed"
            );
        }
        result
    }

    pub fn execute(&self, op: Operation) -> Result<Option<Vec<u8>>, LedgerError> {
        match op {
            Operation::InitRoster => {
                self.records().seed(&default_roster())?;
                Ok(None)
            }
            Operation::QueryAllPlayers(page) => {
                let players: Vec<Player> = self.records().paginate(page)?;
                encode(&players).map(Some)
            }
            Operation::QueryPlayerCount => {
                let count = self.records().get_count()?;
                Ok(Some(count.to_string().into_bytes()))
            }
            Operation::QueryPlayers { query } => {
                QueryEngine::new(&self.store).run_query_json(&query).map(Some)
            }
            Operation::InitBallot => {
                self.tally().initialize(&default_ballot())?;
                Ok(None)
            }
            Operation::GetScore => encode(&self.tally().snapshot()?).map(Some),
            Operation::CastVote { category, vote } => {
                self.tally().cast(&category, vote)?;
                Ok(None)
            }
            Operation::GetVotes => encode(&self.tally().votes()?).map(Some),
        }
    }

    fn records(&self) -> RecordRepository<'_, S> {
        RecordRepository::from_config(&self.store, &self.codec, &self.config)
    }

    fn tally(&self) -> TallyLedger<'_, S> {
        TallyLedger::from_config(&self.store, &self.codec, &self.events, &self.config)
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, LedgerError> {
    serde_json::to_vec(value).map_err(|e| LedgerError::Encode(e.to_string()))
}
