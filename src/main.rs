use std::{
    fs,
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Parser, Subcommand};
use digid_ledger::{
    apply_calls,
    ledger::{format_units, parse_units, units::UnitsError},
    Address, Call, GenesisConfig, LedgerError, LedgerSnapshot, LedgerState, Receipt,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("{path}: invalid json: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
    #[error("{path}:{line}: invalid call: {source}")]
    Call {
        path: String,
        line: usize,
        source: serde_json::Error,
    },
    #[error("invalid amount: {0}")]
    Units(#[from] UnitsError),
    #[error(transparent)]
    Config(#[from] digid_ledger::config::ConfigError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// DIGID token ledger driver. State lives in a JSON snapshot file.
#[derive(Parser)]
#[command(name = "digid", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a fresh genesis snapshot.
    Genesis {
        #[arg(long)]
        out: PathBuf,
        /// JSON genesis config; flags below override it.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        owner: Option<Address>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        symbol: Option<String>,
        /// Cap in whole tokens, decimals allowed.
        #[arg(long)]
        max_supply: Option<String>,
    },
    /// Apply a JSON-lines file of calls in order and print one receipt per call.
    Apply {
        #[arg(long)]
        state: PathBuf,
        calls: PathBuf,
        /// Print receipts without writing the new state back.
        #[arg(long)]
        dry_run: bool,
    },
    /// Read values from a snapshot.
    Query {
        #[arg(long)]
        state: PathBuf,
        #[command(subcommand)]
        query: Query,
    },
    /// Check the snapshot root and supply invariants.
    Verify {
        #[arg(long)]
        state: PathBuf,
    },
}

#[derive(Subcommand)]
enum Query {
    Balance { address: Address },
    Allowance { owner: Address, spender: Address },
    Locked { address: Address },
    Supply,
    Info,
    Root,
}

/// One line of `apply` output: the receipt and the digest that identifies it.
#[derive(Serialize)]
struct ReceiptLine<'a> {
    #[serde(flatten)]
    receipt: &'a Receipt,
    #[serde(with = "hex::serde")]
    digest: [u8; 32],
}

impl<'a> From<&'a Receipt> for ReceiptLine<'a> {
    fn from(receipt: &'a Receipt) -> Self {
        Self {
            receipt,
            digest: receipt.digest(),
        }
    }
}

fn read_all(path: &Path) -> Result<Vec<u8>, CliError> {
    fs::read(path).map_err(|source| CliError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn write_all(path: &Path, bytes: &[u8]) -> Result<(), CliError> {
    let io_err = |source: std::io::Error| CliError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    // snapshot is replaced atomically
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}

fn load_state(path: &Path) -> Result<LedgerState, CliError> {
    let bytes = read_all(path)?;
    let snapshot: LedgerSnapshot = serde_json::from_slice(&bytes).map_err(|source| CliError::Json {
        path: path.display().to_string(),
        source,
    })?;
    Ok(LedgerState::from_snapshot(snapshot)?)
}

fn save_state(path: &Path, state: &LedgerState) -> Result<(), CliError> {
    let json = serde_json::to_vec_pretty(&state.snapshot()).map_err(|source| CliError::Json {
        path: path.display().to_string(),
        source,
    })?;
    write_all(path, &json)
}

fn read_calls(path: &Path) -> Result<Vec<Call>, CliError> {
    let file = fs::File::open(path).map_err(|source| CliError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut calls = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| CliError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let call = serde_json::from_str(&line).map_err(|source| CliError::Call {
            path: path.display().to_string(),
            line: idx + 1,
            source,
        })?;
        calls.push(call);
    }
    Ok(calls)
}

fn genesis_cmd(
    out: &Path,
    config: Option<&Path>,
    owner: Option<Address>,
    name: Option<String>,
    symbol: Option<String>,
    max_supply: Option<String>,
) -> Result<(), CliError> {
    let mut cfg = match config {
        Some(path) => GenesisConfig::load(path)?,
        None => GenesisConfig::default(),
    };
    if let Some(owner) = owner {
        cfg.owner = Some(owner);
    }
    if let Some(name) = name {
        cfg.name = name;
    }
    if let Some(symbol) = symbol {
        cfg.symbol = symbol;
    }
    if let Some(max_supply) = max_supply {
        cfg.max_supply = parse_units(&max_supply)?;
    }

    let state = cfg.build()?;
    save_state(out, &state)?;
    info!(path = %out.display(), owner = %state.owner(), "genesis written");
    println!(
        "Genesis → {} ({} {}, cap {})",
        out.display(),
        state.name(),
        state.symbol(),
        format_units(state.max_supply())
    );
    Ok(())
}

fn apply_cmd(state_path: &Path, calls_path: &Path, dry_run: bool) -> Result<(), CliError> {
    let mut state = load_state(state_path)?;
    let calls = read_calls(calls_path)?;
    let receipts = apply_calls(&mut state, &calls);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for receipt in &receipts {
        let line =
            serde_json::to_string(&ReceiptLine::from(receipt)).map_err(|source| CliError::Json {
                path: "<stdout>".into(),
                source,
            })?;
        writeln!(out, "{line}").map_err(|source| CliError::Io {
            path: "<stdout>".into(),
            source,
        })?;
    }

    let accepted = receipts.iter().filter(|r| r.outcome.is_accepted()).count();
    info!(
        accepted,
        rejected = receipts.len() - accepted,
        height = state.height(),
        "calls applied"
    );
    if !dry_run {
        save_state(state_path, &state)?;
    }
    Ok(())
}

fn query_cmd(state_path: &Path, query: Query) -> Result<(), CliError> {
    let state = load_state(state_path)?;
    match query {
        Query::Balance { address } => println!("{}", format_units(state.balance_of(&address))),
        Query::Allowance { owner, spender } => {
            println!("{}", format_units(state.allowance(&owner, &spender)))
        }
        Query::Locked { address } => println!("{}", state.is_locked(&address)),
        Query::Supply => {
            println!("total_supply: {}", format_units(state.total_supply()));
            println!("max_supply:   {}", format_units(state.max_supply()));
            println!("mintable:     {}", format_units(state.mintable()));
        }
        Query::Info => {
            println!("name:              {}", state.name());
            println!("symbol:            {}", state.symbol());
            println!("decimals:          {}", state.decimals());
            println!("owner:             {}", state.owner());
            println!("transfers_allowed: {}", state.is_transfer_allowed());
            println!("accounts:          {}", state.accounts().len());
            println!("height:            {}", state.height());
        }
        Query::Root => println!("{}", hex::encode(state.state_root())),
    }
    Ok(())
}

fn verify_cmd(state_path: &Path) -> Result<(), CliError> {
    let state = load_state(state_path)?;
    println!(
        "verify: OK (root {} at height {})",
        hex::encode(state.state_root()),
        state.height()
    );
    Ok(())
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Genesis {
            out,
            config,
            owner,
            name,
            symbol,
            max_supply,
        } => genesis_cmd(&out, config.as_deref(), owner, name, symbol, max_supply),
        Command::Apply {
            state,
            calls,
            dry_run,
        } => apply_cmd(&state, &calls, dry_run),
        Command::Query { state, query } => query_cmd(&state, query),
        Command::Verify { state } => verify_cmd(&state),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}
