mod args;
mod audit_cli;

use crate::args::{Args, Command};
use clap::Parser;
use log::{info, warn};
use snafu::ErrorCompat;

fn main() {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    info!("args: {:?}", args);

    let res = match args.command {
        Command::Tally {
            config,
            reference,
            out,
        } => audit_cli::run_contest(config, reference, out),
        Command::VerifyChain { ballots } => audit_cli::run_verify_chain(ballots),
        Command::VerifyReceipt {
            ballots,
            ballot_hash,
            nonce,
            previous_chain_hash,
            chain_hash,
        } => audit_cli::run_verify_receipt(
            ballots,
            &ballot_hash,
            &nonce,
            &previous_chain_hash,
            &chain_hash,
        ),
        Command::Simulate {
            voters,
            candidates,
            seats,
            seed,
            threads,
            out,
        } => {
            let settings = audit_cli::simulate::SimulationSettings {
                voters,
                candidates,
                seats,
                seed: seed.unwrap_or_else(rand::random),
                threads,
            };
            audit_cli::simulate::run_simulation(&settings, out)
        }
    };

    if let Err(e) = res {
        warn!("Error occured {:?}", e);
        eprintln!("An error occured {}", e);
        if let Some(bt) = ErrorCompat::backtrace(&e) {
            eprintln!("trace: {}", bt);
        }
        std::process::exit(1);
    }
}
