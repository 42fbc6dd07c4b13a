mod config_reader;
mod io_export;
pub mod simulate;

use log::{debug, info, warn};

use ballot_ledger::*;
use snafu::{prelude::*, Snafu};

use std::path::{Path, PathBuf};

use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::audit_cli::config_reader::*;
use crate::audit_cli::io_export::*;

#[derive(Debug, Snafu)]
pub enum CliError {
    #[snafu(display("Error opening file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing file {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error serializing JSON"))]
    SerializingJson { source: serde_json::Error },
    #[snafu(display("No parent directory for {path}"))]
    MissingParentDir { path: String },

    #[snafu(display("The export is for election {found}, the configuration for {expected}"))]
    WrongElection {
        expected: ElectionId,
        found: ElectionId,
    },
    #[snafu(display("The chain is broken at entry {sequence}: {kind}"))]
    BrokenChain {
        sequence: u64,
        kind: ChainFaultKind,
    },
    #[snafu(display("Counting failed: {source}"))]
    Counting { source: TallyError },
    #[snafu(display("Ledger failure: {source}"))]
    Ledger { source: LedgerError },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type CliResult<T> = Result<T, CliError>;

impl From<ChainFault> for CliError {
    fn from(fault: ChainFault) -> CliError {
        CliError::BrokenChain {
            sequence: fault.sequence,
            kind: fault.kind,
        }
    }
}

fn decimal_js(d: &Decimal) -> JSValue {
    json!(d.normalize().to_string())
}

fn transfers_js(stats: &TransferStats) -> JSMap<String, JSValue> {
    let mut transfers: JSMap<String, JSValue> = JSMap::new();
    for (cid, amount) in stats.transfers.iter() {
        transfers.insert(cid.to_string(), decimal_js(amount));
    }
    if !stats.exhausted.is_zero() {
        transfers.insert("exhausted".to_string(), decimal_js(&stats.exhausted));
    }
    transfers
}

fn result_stats_to_json(rs: &TallyResult) -> Vec<JSValue> {
    let mut l: Vec<JSValue> = Vec::new();
    for round_stat in rs.rounds.iter() {
        let mut tally: JSMap<String, JSValue> = JSMap::new();
        for (cid, count) in round_stat.tally.iter() {
            tally.insert(cid.to_string(), decimal_js(count));
        }

        let mut tally_results: Vec<JSValue> = Vec::new();
        for cid in round_stat.elected.iter() {
            match round_stat.surpluses.iter().find(|s| s.candidate == *cid) {
                Some(surplus) => tally_results.push(json!({
                    "elected": cid,
                    "transferValue": decimal_js(&surplus.transfer_value),
                    "transfers": transfers_js(surplus)
                })),
                None => tally_results.push(json!({
                    "elected": cid,
                    "transfers": {}
                })),
            }
        }
        for skip in round_stat.skipped.iter() {
            tally_results.push(json!({
                "skipped": skip.candidate,
                "group": skip.group
            }));
        }
        if let Some(elim_stats) = &round_stat.eliminated {
            tally_results.push(json!({
                "eliminated": elim_stats.candidate,
                "transfers": transfers_js(elim_stats)
            }));
        }

        let js = json!({
            "round": round_stat.round,
            "quota": round_stat.quota,
            "activeBallots": round_stat.active_ballots,
            "tally": tally,
            "tallyResults": tally_results
        });
        l.push(js);
    }
    l
}

pub(crate) fn build_summary_js(
    config: &ContestConfig,
    export: &BallotsExport,
    rv: &TallyResult,
) -> JSValue {
    let c = OutputConfig {
        contest: config.output_settings.contest_name.clone(),
        date: config.output_settings.contest_date.clone(),
        office: config.output_settings.contest_office.clone(),
        election_id: export.election_id.to_string(),
        seats: rv.seats,
        chain_head: export.chain_head.to_string(),
        threshold: rv.quota.to_string(),
    };
    json!({
        "config": c,
        "validBallots": rv.valid_ballots,
        "elected": rv.elected,
        "results": result_stats_to_json(rv)
    })
}

/// Reads and checks the export referenced by a configuration.
pub(crate) fn load_checked_export(
    config_path: &str,
    config: &ContestConfig,
) -> CliResult<BallotsExport> {
    let root_p = Path::new(config_path)
        .parent()
        .context(MissingParentDirSnafu { path: config_path })?;
    let p: PathBuf = [root_p, Path::new(config.ballots_file.as_str())]
        .iter()
        .collect();
    let p2 = p.as_path().display().to_string();
    info!("Attempting to read ballots export {:?}", p2);
    let export = read_export(&p2)?;
    let expected = ElectionId::from(config.election_id.as_str());
    ensure!(
        export.election_id == expected,
        WrongElectionSnafu {
            expected,
            found: export.election_id.clone(),
        }
    );
    let head = export.verify()?;
    info!(
        "Chain of {} verified: {} ballots, head {}",
        export.election_id,
        export.ballots.len(),
        head
    );
    Ok(export)
}

/// Counts a checked export with the rules of the configuration.
pub(crate) fn count_export(
    config: &ContestConfig,
    export: &BallotsExport,
) -> CliResult<TallyResult> {
    let rules = config.tally_rules()?;
    let ballots = export.tally_ballots();
    debug!("count_export: {} ballots", ballots.len());
    ballot_ledger::run_tally(&ballots, &config.candidate_ids(), &rules).context(CountingSnafu)
}

pub fn run_contest(
    config_path: String,
    check_summary_path: Option<String>,
    out: Option<String>,
) -> CliResult<()> {
    let config = read_config(&config_path)?;
    info!("config: {:?}", config);

    let export = load_checked_export(&config_path, &config)?;
    let result = count_export(&config, &export)?;
    info!("elected: {:?}", result.elected);

    // Assemble the final json
    let result_js = build_summary_js(&config, &export, &result);
    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(SerializingJsonSnafu)?;

    let out_path = out.or_else(|| {
        config
            .output_settings
            .output_directory
            .as_ref()
            .map(|dir| format!("{}/summary.json", dir))
    });
    match out_path.as_deref() {
        Some("stdout") | None => println!("{}", pretty_js_stats),
        Some(path) => write_text(path, &pretty_js_stats)?,
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = check_summary_path {
        let summary_ref = read_summary(&summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(SerializingJsonSnafu)?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference string");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            whatever!("Difference detected between calculated summary and reference summary")
        }
    }

    Ok(())
}

pub fn run_verify_chain(ballots_path: String) -> CliResult<()> {
    let export = read_export(&ballots_path)?;
    let head = export.verify()?;
    println!(
        "chain of {} is intact: {} ballots, head {}",
        export.election_id,
        export.ballots.len(),
        head
    );
    Ok(())
}

/// Checks a receipt against an export. The status is printed; only malformed
/// input is an error.
pub fn run_verify_receipt(
    ballots_path: String,
    ballot_hash: &str,
    nonce: &str,
    previous_chain_hash: &str,
    chain_hash: &str,
) -> CliResult<()> {
    let receipt = parse_receipt(ballot_hash, nonce, previous_chain_hash, chain_hash)?;
    let export = read_export(&ballots_path)?;
    let status = check_receipt(&export, &receipt)?;
    println!("receipt {}: {}", receipt.chain_hash, status);
    Ok(())
}

pub(crate) fn parse_receipt(
    ballot_hash: &str,
    nonce: &str,
    previous_chain_hash: &str,
    chain_hash: &str,
) -> CliResult<Receipt> {
    let digest = |name: &str, s: &str| -> CliResult<HashDigest> {
        match HashDigest::parse(s) {
            Some(d) => Ok(d),
            None => whatever!("{} is not a SHA-256 hex digest: {:?}", name, s),
        }
    };
    let nonce = match Nonce::parse(nonce, MIN_NONCE_BYTES) {
        Some(n) => n,
        None => whatever!(
            "the nonce must be hex encoded and hold at least {} bytes",
            MIN_NONCE_BYTES
        ),
    };
    Ok(Receipt {
        ballot_hash: digest("ballot hash", ballot_hash)?,
        nonce,
        previous_chain_hash: digest("previous chain hash", previous_chain_hash)?,
        chain_hash: digest("chain hash", chain_hash)?,
    })
}

pub(crate) fn check_receipt(export: &BallotsExport, receipt: &Receipt) -> CliResult<ReceiptStatus> {
    let stored = match export.find(&receipt.chain_hash) {
        Some(b) => match b.to_entry() {
            Ok(entry) => Some(entry),
            Err(problem) => whatever!(
                "entry {} of the export is unreadable: {}",
                b.sequence,
                problem
            ),
        },
        None => None,
    };
    Ok(verify_receipt(&export.election_id, receipt, stored.as_ref()))
}
