// An election run end to end against an in-memory ledger, with every voter
// casting from one of several threads.

use crate::audit_cli::*;

use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::thread;

const ELECTION_ID: &str = "simulated-election";
const MEMBERS: &str = "members";

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SimulationSettings {
    pub voters: u32,
    pub candidates: u32,
    pub seats: u32,
    /// Seed of the generated rankings. Nonces are always fresh.
    pub seed: u64,
    pub threads: usize,
}

pub struct SimulationOutput {
    pub config: ContestConfig,
    pub export: BallotsExport,
    pub result: TallyResult,
    pub receipts: Vec<Receipt>,
}

fn candidate_name(i: u32) -> String {
    format!("candidate-{:02}", i + 1)
}

fn voter_name(i: usize) -> String {
    format!("voter-{:05}", i + 1)
}

/// One ranking per voter, drawn from the seed.
pub fn generate_rankings(settings: &SimulationSettings) -> Vec<Vec<CandidateId>> {
    let mut rng = StdRng::seed_from_u64(settings.seed);
    let names: Vec<CandidateId> = (0..settings.candidates)
        .map(|i| CandidateId::from(candidate_name(i)))
        .collect();
    (0..settings.voters)
        .map(|_| {
            let mut order = names.clone();
            order.shuffle(&mut rng);
            let len = rng.gen_range(1..=order.len());
            order.truncate(len);
            order
        })
        .collect()
}

fn check_settings(settings: &SimulationSettings) -> CliResult<()> {
    if settings.seats == 0 {
        whatever!("at least one seat is required");
    }
    if settings.candidates < settings.seats {
        whatever!(
            "{} candidates cannot fill {} seats",
            settings.candidates,
            settings.seats
        );
    }
    if settings.threads == 0 {
        whatever!("at least one thread is required");
    }
    Ok(())
}

fn cast_all(
    ledger: &Ledger,
    election: &ElectionId,
    rankings: &[Vec<CandidateId>],
    threads: usize,
) -> CliResult<Vec<Receipt>> {
    thread::scope(|s| -> CliResult<Vec<Receipt>> {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                s.spawn(move || -> Result<Vec<Receipt>, LedgerError> {
                    let mut mine: Vec<Receipt> = Vec::new();
                    for (i, ranking) in rankings.iter().enumerate().skip(t).step_by(threads) {
                        let voter = VoterId::from(voter_name(i));
                        mine.push(ledger.submit(election, &voter, ranking, Nonce::generate())?);
                    }
                    Ok(mine)
                })
            })
            .collect();
        let mut receipts: Vec<Receipt> = Vec::with_capacity(rankings.len());
        for h in handles {
            match h.join() {
                Ok(res) => receipts.append(&mut res.context(LedgerSnafu)?),
                Err(_) => whatever!("a voter thread panicked"),
            }
        }
        Ok(receipts)
    })
}

pub fn simulate(settings: &SimulationSettings) -> CliResult<SimulationOutput> {
    check_settings(settings)?;
    info!("simulate: {:?}", settings);
    let rankings = generate_rankings(settings);

    let now = Utc::now();
    let eid = ElectionId::from(ELECTION_ID);
    let mut directory = StaticDirectory::new();
    directory.add_group(MEMBERS);
    for i in 0..rankings.len() {
        directory.add_member(MEMBERS, &voter_name(i), now - Duration::days(30), None);
    }
    let candidates: Vec<Candidate> = (0..settings.candidates)
        .map(|i| {
            let name = candidate_name(i);
            Candidate::new(&name, &name)
        })
        .collect();
    directory.set_candidates(&eid, candidates.clone());

    let clock = Arc::new(ManualClock::new(now));
    let ledger = Ledger::new(
        Arc::new(MemStore::new()),
        Arc::new(directory),
        clock.clone(),
        LedgerSettings::DEFAULT,
    );
    let mut election = Election::new(
        ELECTION_ID,
        "Simulated election",
        now,
        now + Duration::hours(1),
        settings.seats,
        MEMBERS,
    );
    election.quorum_percent = 50;
    ledger.register(election, vec![]).context(LedgerSnafu)?;
    ledger.schedule(&eid).context(LedgerSnafu)?;

    let receipts = cast_all(&ledger, &eid, &rankings, settings.threads)?;
    let quorum = ledger.quorum_status(&eid).context(LedgerSnafu)?;
    info!(
        "simulate: {} of {} voters took part, quorum met: {}",
        quorum.participating_voter_count, quorum.eligible_voter_count, quorum.quorum_met
    );

    // Let the closing time pass and have the due election closed and counted.
    clock.advance(Duration::hours(1));
    let report = ledger.advance();
    debug!("simulate: {:?}", report);
    let result = ledger.close_and_tally(&eid).context(LedgerSnafu)?;
    let export = ledger.export_ballots(&eid).context(LedgerSnafu)?;
    export.verify()?;

    for r in receipts.iter() {
        let status = check_receipt(&export, r)?;
        if status != ReceiptStatus::Valid {
            whatever!("receipt {} is {}", r.chain_hash, status);
        }
    }

    let config = ContestConfig {
        output_settings: OutputSettings {
            contest_name: "Simulated election".to_string(),
            output_directory: None,
            contest_date: Some(now.format("%Y-%m-%d").to_string()),
            contest_office: None,
        },
        election_id: ELECTION_ID.to_string(),
        seats: settings.seats,
        candidates: candidates
            .iter()
            .map(|c| ContestCandidate {
                id: c.id.to_string(),
                username: Some(c.username.clone()),
                nominated_by: None,
            })
            .collect(),
        winner_groups: vec![],
        ballots_file: "ballots.json".to_string(),
        decimal_places: None,
    };

    // The offline count must agree with the ledger's.
    let recount = count_export(&config, &export)?;
    if recount != result {
        whatever!("the count of the export differs from the ledger's count");
    }

    Ok(SimulationOutput {
        config,
        export,
        result,
        receipts,
    })
}

pub fn run_simulation(settings: &SimulationSettings, out: Option<String>) -> CliResult<()> {
    let output = simulate(settings)?;
    info!("simulate: elected {:?}", output.result.elected);
    let summary = build_summary_js(&output.config, &output.export, &output.result);
    match out {
        Some(dir) => {
            let file = |name: &str| Path::new(dir.as_str()).join(name).display().to_string();
            write_export(&file("ballots.json"), &output.export)?;
            write_json(&file("contest.json"), &output.config)?;
            write_json(&file("summary.json"), &summary)?;
        }
        None => {
            let pretty = serde_json::to_string_pretty(&summary).context(SerializingJsonSnafu)?;
            println!("{}", pretty);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(seed: u64) -> SimulationSettings {
        SimulationSettings {
            voters: 60,
            candidates: 5,
            seats: 2,
            seed,
            threads: 4,
        }
    }

    #[test]
    fn rankings_follow_the_seed() {
        let a = generate_rankings(&settings(7));
        let b = generate_rankings(&settings(7));
        assert_eq!(a, b);
        assert_eq!(a.len(), 60);
        for r in a.iter() {
            assert!(!r.is_empty() && r.len() <= 5);
        }
    }

    #[test]
    fn concurrent_election_is_consistent() {
        let out = simulate(&settings(11)).unwrap();
        assert_eq!(out.export.ballots.len(), 60);
        assert_eq!(out.receipts.len(), 60);
        assert_eq!(out.result.elected.len(), 2);
        assert_eq!(out.result.valid_ballots, 60);

        // Same rankings, different arrival order and nonces: same winners.
        let again = simulate(&settings(11)).unwrap();
        assert_eq!(again.result, out.result);
        assert_ne!(again.export.chain_head, out.export.chain_head);
    }

    #[test]
    fn writes_files_that_tally_again() {
        let dir = std::env::temp_dir().join(format!("ballotctl-sim-{}", std::process::id()));
        let dir_s = dir.display().to_string();
        run_simulation(&settings(3), Some(dir_s.clone())).unwrap();
        let contest = dir.join("contest.json").display().to_string();
        let summary = dir.join("summary.json").display().to_string();
        run_contest(contest, Some(summary), Some("stdout".to_string())).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn rejects_impossible_settings() {
        let mut s = settings(1);
        s.seats = 6;
        assert!(simulate(&s).is_err());
        s.seats = 0;
        assert!(simulate(&s).is_err());
    }
}
