use snafu::Snafu;
use std::time::Duration;

use crate::canonical::RankingProblem;
use crate::chain::{ChainFaultKind, HashDigest};
use crate::config::TallyError;
use crate::directory::DirectoryError;
use crate::election::{ElectionId, ElectionProblem, ElectionStatus};

/// Failures of the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    #[snafu(display("election {election} is not known to the store"))]
    NoSuchElection { election: ElectionId },
    #[snafu(display("election {election} already exists in the store"))]
    ElectionExists { election: ElectionId },
    #[snafu(display("an admission record already exists in election {election}"))]
    AdmissionExists { election: ElectionId },
    #[snafu(display("chain tail of {election} is {actual}, expected {expected}"))]
    TailMismatch {
        election: ElectionId,
        expected: HashDigest,
        actual: HashDigest,
    },
    #[snafu(display("a tally result is already stored for {election}"))]
    TallyExists { election: ElectionId },
    #[snafu(display("storage unavailable: {message}"))]
    Unavailable { message: String },
}

/// The family of a `LedgerError`.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ErrorClass {
    /// The submission was refused. Nothing was written.
    Admission,
    /// Stored data does not match what was committed.
    Integrity,
    Tally,
    Operational,
}

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LedgerError {
    #[snafu(display("election {election} is {status}, not open"))]
    ElectionNotOpen {
        election: ElectionId,
        status: ElectionStatus,
    },
    #[snafu(display("voter is not eligible in election {election}"))]
    NotEligible { election: ElectionId },
    #[snafu(display("invalid ranking: {problem}"))]
    InvalidRanking { problem: RankingProblem },
    #[snafu(display("nonce must hold at least {min_bytes} random bytes"))]
    InvalidNonce { min_bytes: usize },
    #[snafu(display("voter already cast a ballot in election {election}"))]
    AlreadyVoted { election: ElectionId },

    #[snafu(display("ledger entry {chain_hash} of election {election} was tampered with"))]
    Tampered {
        election: ElectionId,
        chain_hash: HashDigest,
    },
    #[snafu(display("chain of election {election} is broken at entry {sequence}: {fault}"))]
    ChainBroken {
        election: ElectionId,
        sequence: u64,
        fault: ChainFaultKind,
    },
    #[snafu(display("entry {sequence} of election {election} is unreadable: {problem}"))]
    CorruptEntry {
        election: ElectionId,
        sequence: u64,
        problem: RankingProblem,
    },

    #[snafu(display("election {election} cannot be tallied: {source}"))]
    TallyFailed {
        election: ElectionId,
        source: TallyError,
    },
    #[snafu(display("election {election} was already tallied"))]
    AlreadyTallied { election: ElectionId },
    #[snafu(display("election {election} is {status}, not closed"))]
    NotClosed {
        election: ElectionId,
        status: ElectionStatus,
    },

    #[snafu(display("unknown election {election}"))]
    UnknownElection { election: ElectionId },
    #[snafu(display("invalid election {election}: {problem}"))]
    InvalidElection {
        election: ElectionId,
        problem: ElectionProblem,
    },
    #[snafu(display("cannot {action} election {election} while it is {status}"))]
    InvalidTransition {
        election: ElectionId,
        status: ElectionStatus,
        action: &'static str,
    },
    #[snafu(display("new closing time for {election} must be later than the current one and in the future"))]
    InvalidClosingTime { election: ElectionId },
    #[snafu(display("timed out after {waited:?} waiting for election {election}"))]
    Timeout {
        election: ElectionId,
        waited: Duration,
    },
    #[snafu(display("storage failure: {source}"))]
    Storage { source: StoreError },
    #[snafu(display("directory failure: {source}"))]
    Directory { source: DirectoryError },
}

impl LedgerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            LedgerError::ElectionNotOpen { .. }
            | LedgerError::NotEligible { .. }
            | LedgerError::InvalidRanking { .. }
            | LedgerError::InvalidNonce { .. }
            | LedgerError::AlreadyVoted { .. } => ErrorClass::Admission,
            LedgerError::Tampered { .. }
            | LedgerError::ChainBroken { .. }
            | LedgerError::CorruptEntry { .. } => ErrorClass::Integrity,
            LedgerError::TallyFailed { .. }
            | LedgerError::AlreadyTallied { .. }
            | LedgerError::NotClosed { .. } => ErrorClass::Tally,
            LedgerError::UnknownElection { .. }
            | LedgerError::InvalidElection { .. }
            | LedgerError::InvalidTransition { .. }
            | LedgerError::InvalidClosingTime { .. }
            | LedgerError::Timeout { .. }
            | LedgerError::Storage { .. }
            | LedgerError::Directory { .. } => ErrorClass::Operational,
        }
    }

    /// True when the same request may succeed if sent again later.
    ///
    /// Rejections are final and are never retried by the ledger itself.
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Timeout { .. } => true,
            LedgerError::Storage { source } => matches!(source, StoreError::Unavailable { .. }),
            LedgerError::Directory { source } => {
                matches!(source, DirectoryError::Unavailable { .. })
            }
            _ => false,
        }
    }

    /// True when the group caps made the requested number of seats unfillable.
    pub fn is_unsatisfiable(&self) -> bool {
        matches!(
            self,
            LedgerError::TallyFailed {
                source: TallyError::Unsatisfiable { .. },
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let eid = ElectionId::from("e");
        let voted = LedgerError::AlreadyVoted { election: eid.clone() };
        assert_eq!(voted.class(), ErrorClass::Admission);
        assert!(!voted.is_retryable());

        let timeout = LedgerError::Timeout {
            election: eid.clone(),
            waited: Duration::from_millis(5),
        };
        assert_eq!(timeout.class(), ErrorClass::Operational);
        assert!(timeout.is_retryable());

        let down = LedgerError::Storage {
            source: StoreError::Unavailable { message: "disk".to_string() },
        };
        assert!(down.is_retryable());

        let unsat = LedgerError::TallyFailed {
            election: eid,
            source: TallyError::Unsatisfiable { elected: 1, seats: 2 },
        };
        assert_eq!(unsat.class(), ErrorClass::Tally);
        assert!(unsat.is_unsatisfiable());
    }
}
