use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::chain::{ballot_hash, chain_hash, HashDigest, LedgerEntry, Nonce};
use crate::election::ElectionId;

/// What a voter keeps after casting a ballot.
///
/// The nonce is the only secret in here: with it, the voter (and only the
/// voter) can show which ranking a ballot hash stands for.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub ballot_hash: HashDigest,
    pub nonce: Nonce,
    pub previous_chain_hash: HashDigest,
    pub chain_hash: HashDigest,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Valid,
    NotFound,
    /// The stored row does not match the receipt, or its link does not
    /// rehash. The ledger was altered after the receipt was issued.
    Tampered,
    /// The stored row is intact but the receipt's nonce does not reproduce
    /// its ballot hash from the stored ranking.
    NonceMismatch,
}

impl Display for ReceiptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReceiptStatus::Valid => "valid",
            ReceiptStatus::NotFound => "not found",
            ReceiptStatus::Tampered => "tampered",
            ReceiptStatus::NonceMismatch => "nonce mismatch",
        };
        write!(f, "{}", s)
    }
}

/// Checks a receipt against the entry stored under its chain hash.
///
/// `stored` is the result of looking up `receipt.chain_hash` in the chain of
/// `election_id`. The stored ranking is then rehashed with the receipt's
/// nonce. A mismatch there is `NonceMismatch`, not `Tampered`: a wrong nonce
/// and a rewritten ranking cannot be told apart, and the nonce is the only
/// part of the receipt that the public export does not carry.
pub fn verify_receipt(
    election_id: &ElectionId,
    receipt: &Receipt,
    stored: Option<&LedgerEntry>,
) -> ReceiptStatus {
    let entry = match stored {
        Some(e) => e,
        None => {
            debug!("verify_receipt: {} has no entry {}", election_id, receipt.chain_hash);
            return ReceiptStatus::NotFound;
        }
    };
    let problem = if entry.ballot_hash != receipt.ballot_hash {
        Some("stored ballot hash differs from the receipt")
    } else if entry.previous_chain_hash != receipt.previous_chain_hash {
        Some("stored previous chain hash differs from the receipt")
    } else if chain_hash(&entry.previous_chain_hash, &entry.ballot_hash) != entry.chain_hash {
        Some("stored link does not rehash to its chain hash")
    } else {
        None
    };
    match problem {
        Some(p) => {
            error!(
                "verify_receipt: TAMPERED entry {} (sequence {}) in {}: {}",
                entry.chain_hash, entry.sequence, election_id, p
            );
            ReceiptStatus::Tampered
        }
        None if ballot_hash(election_id, &entry.ranking, &receipt.nonce) != entry.ballot_hash => {
            warn!(
                "verify_receipt: nonce does not reproduce entry {} in {}",
                entry.chain_hash, election_id
            );
            ReceiptStatus::NonceMismatch
        }
        None => ReceiptStatus::Valid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::canonicalize;
    use crate::chain::genesis_hash;
    use crate::election::CandidateId;

    fn cast(eid: &ElectionId, names: &[&str]) -> (Receipt, LedgerEntry) {
        let ranking: Vec<CandidateId> = names.iter().map(|n| CandidateId::from(*n)).collect();
        let bytes = canonicalize(&ranking).unwrap();
        let nonce = Nonce::generate();
        let prev = genesis_hash(eid);
        let bh = ballot_hash(eid, &bytes, &nonce);
        let ch = chain_hash(&prev, &bh);
        let receipt = Receipt {
            ballot_hash: bh.clone(),
            nonce,
            previous_chain_hash: prev.clone(),
            chain_hash: ch.clone(),
        };
        let entry = LedgerEntry {
            sequence: 1,
            previous_chain_hash: prev,
            ballot_hash: bh,
            chain_hash: ch,
            ranking: bytes,
        };
        (receipt, entry)
    }

    #[test]
    fn valid_and_missing() {
        let eid = ElectionId::from("e");
        let (receipt, entry) = cast(&eid, &["a", "b"]);
        assert_eq!(verify_receipt(&eid, &receipt, Some(&entry)), ReceiptStatus::Valid);
        assert_eq!(verify_receipt(&eid, &receipt, None), ReceiptStatus::NotFound);
    }

    #[test]
    fn detects_rewritten_rows() {
        let eid = ElectionId::from("e");
        let (receipt, entry) = cast(&eid, &["a", "b"]);

        let mut swapped = entry.clone();
        swapped.ranking = canonicalize(&[CandidateId::from("b"), CandidateId::from("a")]).unwrap();
        assert_eq!(verify_receipt(&eid, &receipt, Some(&swapped)), ReceiptStatus::NonceMismatch);

        let mut relinked_head = entry.clone();
        relinked_head.chain_hash = HashDigest::parse(&"f".repeat(64)).unwrap();
        assert_eq!(verify_receipt(&eid, &receipt, Some(&relinked_head)), ReceiptStatus::Tampered);

        let (other, _) = cast(&eid, &["a", "b"]);
        let mut rehashed = entry.clone();
        rehashed.ballot_hash = other.ballot_hash;
        assert_eq!(verify_receipt(&eid, &receipt, Some(&rehashed)), ReceiptStatus::Tampered);

        let mut relinked = entry;
        relinked.previous_chain_hash = HashDigest::parse(&"0".repeat(64)).unwrap();
        assert_eq!(verify_receipt(&eid, &receipt, Some(&relinked)), ReceiptStatus::Tampered);
    }

    #[test]
    fn a_wrong_nonce_is_not_tampering() {
        let eid = ElectionId::from("e");
        let (mut receipt, entry) = cast(&eid, &["a"]);
        receipt.nonce = Nonce::generate();
        assert_eq!(verify_receipt(&eid, &receipt, Some(&entry)), ReceiptStatus::NonceMismatch);
    }
}
