use pitchledger::config::LedgerConfig;
use pitchledger::router::{Contract, Router};
use pitchledger::storage::memory::MemoryStateStore;
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn main() {
    init_tracing();
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<(), String> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        return Err("missing command".into());
    }
    match args[1].as_str() {
        "digest" => cmd_digest(&args[2..]),
        "roster" | "ballot" => cmd_invoke(&args[1..]),
        other => {
            print_usage();
            Err(format!("unknown top-level command: {other}"))
        }
    }
}

fn cmd_invoke(args: &[String]) -> Result<(), String> {
    let contract = Contract::parse(&args[0]).ok_or_else(|| format!("unknown contract: {}", args[0]))?;
    let (flags, rest) = split_flags(&args[1..]);
    let state = parse_flag_value(&flags, "--state").ok_or("--state is required")?;
    let config = match parse_flag_value(&flags, "--config") {
        Some(path) => LedgerConfig::from_file(Path::new(&path)).map_err(|e| format!("config: {e}"))?,
        None => LedgerConfig::default(),
    };
    let (function, call_args) = rest
        .split_first()
        .ok_or_else(|| format!("missing {contract} function"))?;

    let state_path = Path::new(&state);
    let store = MemoryStateStore::open(state_path).map_err(|e| format!("open state: {e}"))?;
    let router = Router::new(contract, store, config).map_err(|e| format!("config: {e}"))?;

    let response = router.invoke(function, call_args);
    if !response.is_ok() {
        return Err(response.message);
    }
    router
        .store()
        .save(state_path)
        .map_err(|e| format!("save state: {e}"))?;
    if let Some(payload) = response.payload {
        println!("{}", String::from_utf8_lossy(&payload));
    }
    Ok(())
}

fn cmd_digest(args: &[String]) -> Result<(), String> {
    let state = parse_flag_value(args, "--state").ok_or("--state is required")?;
    let store = MemoryStateStore::load(Path::new(&state)).map_err(|e| format!("load state: {e}"))?;
    println!("{}\t{}", store.digest_hex(), store.len());
    Ok(())
}

/// Splits leading `--flag value` pairs from the positional tail.
fn split_flags(args: &[String]) -> (Vec<String>, Vec<String>) {
    let mut idx = 0;
    while idx < args.len() && args[idx].starts_with("--") {
        idx += 2;
    }
    let idx = idx.min(args.len());
    (args[..idx].to_vec(), args[idx..].to_vec())
}

fn parse_flag_value(args: &[String], flag: &str) -> Option<String> {
    for idx in 0..args.len() {
        if args[idx] == flag {
            return args.get(idx + 1).cloned();
        }
    }
    None
}

fn print_usage() {
    eprintln!("usage:");
    eprintln!("  pitchledger roster --state <state.json> [--config <config.json>] <function> [args...]");
    eprintln!("  pitchledger ballot --state <state.json> [--config <config.json>] <function> [args...]");
    eprintln!("  pitchledger digest --state <state.json>");
    eprintln!();
    eprintln!("roster functions: initLedger, queryAllPlayers <offset> <limit>, queryPlayerCount, queryPlayers <query>");
    eprintln!("ballot functions: initLedger, getScore, castVote <club> [<participant> <time>], getVotes");
}
