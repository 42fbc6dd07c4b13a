// Public ballots export: everything an outside auditor needs to recompute the
// chain and the count, and nothing that links a ballot to a voter.

use serde::{Deserialize, Serialize};

use crate::canonical::{canonicalize, decode, RankingProblem};
use crate::chain::{genesis_hash, verify_chain, ChainFault, ChainFaultKind, HashDigest, LedgerEntry};
use crate::config::TallyBallot;
use crate::election::{CandidateId, ElectionId};

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ExportedBallot {
    pub sequence: u64,
    pub ranking: Vec<CandidateId>,
    pub ballot_hash: HashDigest,
    pub previous_chain_hash: HashDigest,
    pub chain_hash: HashDigest,
}

impl ExportedBallot {
    pub fn from_entry(entry: &LedgerEntry) -> Result<ExportedBallot, RankingProblem> {
        Ok(ExportedBallot {
            sequence: entry.sequence,
            ranking: decode(&entry.ranking)?,
            ballot_hash: entry.ballot_hash.clone(),
            previous_chain_hash: entry.previous_chain_hash.clone(),
            chain_hash: entry.chain_hash.clone(),
        })
    }

    /// Rebuilds the ledger row, re-encoding the ranking.
    pub fn to_entry(&self) -> Result<LedgerEntry, RankingProblem> {
        Ok(LedgerEntry {
            sequence: self.sequence,
            previous_chain_hash: self.previous_chain_hash.clone(),
            ballot_hash: self.ballot_hash.clone(),
            chain_hash: self.chain_hash.clone(),
            ranking: canonicalize(&self.ranking)?,
        })
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct BallotsExport {
    pub election_id: ElectionId,
    pub genesis_hash: HashDigest,
    pub chain_head: HashDigest,
    pub ballots: Vec<ExportedBallot>,
}

impl BallotsExport {
    pub fn entries(&self) -> Result<Vec<LedgerEntry>, RankingProblem> {
        self.ballots.iter().map(|b| b.to_entry()).collect()
    }

    /// Checks the published genesis value, every link and the published head.
    pub fn verify(&self) -> Result<HashDigest, ChainFault> {
        let genesis = genesis_hash(&self.election_id);
        if genesis != self.genesis_hash {
            return Err(ChainFault {
                sequence: 0,
                kind: ChainFaultKind::BrokenLink,
            });
        }
        let entries = self.entries().map_err(|_| ChainFault {
            sequence: 0,
            kind: ChainFaultKind::HashMismatch,
        })?;
        let head = verify_chain(&genesis, &entries)?;
        if head != self.chain_head {
            return Err(ChainFault {
                sequence: entries.len() as u64,
                kind: ChainFaultKind::BrokenLink,
            });
        }
        Ok(head)
    }

    pub fn tally_ballots(&self) -> Vec<TallyBallot> {
        self.ballots
            .iter()
            .map(|b| TallyBallot {
                ranking: b.ranking.clone(),
            })
            .collect()
    }

    pub fn find(&self, chain_hash: &HashDigest) -> Option<&ExportedBallot> {
        self.ballots.iter().find(|b| b.chain_hash == *chain_hash)
    }
}
