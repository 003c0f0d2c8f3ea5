//! PPOS operator CLI
//!
//! Usage:
//!   ppos genesis --network devnet --alloc 0x1111...1111=1000000 --output genesis.json
//!   ppos simulate --genesis genesis.json --script script.json

mod script;

use alloy_primitives::Address;
use clap::{Args, Parser, Subcommand};
use eyre::WrapErr;
use ppos_genesis::{Allocation, GenesisBuilder, GenesisConfig, NetworkType};
use ppos_ledger::{constants::lat, LedgerHandle};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// PPOS staking ledger tools
#[derive(Debug, Parser)]
#[command(name = "ppos", version, about = "Operator tools for the PPOS staking ledger")]
struct Cli {
    /// Tool to run
    #[command(subcommand)]
    command: Command,
}

/// `ppos` subcommands
#[derive(Debug, Subcommand)]
enum Command {
    /// Write a genesis file for a network preset
    Genesis(GenesisArgs),
    /// Replay a script of calls and block ticks against a genesis ledger
    Simulate(SimulateArgs),
}

/// Arguments of `ppos genesis`
#[derive(Debug, Args)]
struct GenesisArgs {
    /// Network preset
    #[arg(long, default_value = "devnet")]
    network: NetworkType,

    /// Free balance as ADDRESS=LAT, repeatable
    #[arg(long = "alloc", value_parser = parse_allocation)]
    allocations: Vec<Allocation>,

    /// Embed the preset's economic parameters instead of leaving them implicit
    #[arg(long)]
    explicit_economics: bool,

    /// Output path; stdout when omitted
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
}

/// Arguments of `ppos simulate`
#[derive(Debug, Args)]
struct SimulateArgs {
    /// Genesis file; an empty devnet when omitted
    #[arg(long, short = 'g', env = "PPOS_GENESIS")]
    genesis: Option<PathBuf>,

    /// Script file: a JSON array of steps
    #[arg(long, short = 's')]
    script: PathBuf,
}

/// Parse an `ADDRESS=LAT` allocation
fn parse_allocation(value: &str) -> Result<Allocation, String> {
    let (address, amount) =
        value.split_once('=').ok_or_else(|| format!("expected ADDRESS=LAT, got {value}"))?;
    let address: Address = address.parse().map_err(|e| format!("invalid address {address}: {e}"))?;
    let amount: u64 = amount.parse().map_err(|e| format!("invalid amount {amount}: {e}"))?;
    Ok(Allocation::new(address, lat(amount), ""))
}

fn genesis(args: GenesisArgs) -> eyre::Result<()> {
    let mut config = GenesisConfig::new(args.network);
    config.allocations = args.allocations;
    if args.explicit_economics {
        config.economic = Some(config.economic());
    }
    config.validate()?;

    let builder = GenesisBuilder::new(config);
    match args.output {
        Some(path) => {
            builder
                .write_json(&path)
                .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            info!(target: "ppos::cli", path = %path.display(), network = ?args.network, "Genesis written");
        }
        None => println!("{}", builder.to_json()?),
    }
    Ok(())
}

async fn simulate(args: SimulateArgs) -> eyre::Result<()> {
    let builder = match &args.genesis {
        Some(path) => GenesisBuilder::from_file(path)
            .wrap_err_with(|| format!("failed to load {}", path.display()))?,
        None => GenesisBuilder::devnet(),
    };
    let handle = LedgerHandle::new(builder.build()?);
    let steps = script::load(&args.script)?;
    info!(target: "ppos::cli", steps = steps.len(), "Replaying script");

    for report in script::run(&handle, steps).await {
        println!("{}", serde_json::to_string(&report)?);
    }

    handle.read(|ledger| ledger.check_invariants()).await.map_err(|e| eyre::eyre!(e))?;
    let (height, epoch) = handle.read(|l| (l.block_number(), l.current_epoch())).await;
    info!(target: "ppos::cli", height, epoch, "Simulation finished");
    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Genesis(args) => genesis(args),
        Command::Simulate(args) => simulate(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_allocation() {
        let allocation =
            parse_allocation("0x1111111111111111111111111111111111111111=25").unwrap();
        assert_eq!(allocation.address, Address::repeat_byte(0x11));
        assert_eq!(allocation.balance, lat(25));

        assert!(parse_allocation("0x11").is_err());
        assert!(parse_allocation("nothex=1").is_err());
        assert!(parse_allocation("0x1111111111111111111111111111111111111111=-1").is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "ppos",
            "genesis",
            "--network",
            "testnet",
            "--alloc",
            "0x1111111111111111111111111111111111111111=5",
        ])
        .unwrap();
        let Command::Genesis(args) = cli.command else { panic!("expected genesis") };
        assert_eq!(args.network, NetworkType::Testnet);
        assert_eq!(args.allocations.len(), 1);
    }
}
