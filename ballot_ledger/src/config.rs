// ********* Input data structures ***********

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use snafu::Snafu;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::chain::MIN_NONCE_BYTES;
use crate::election::{CandidateId, WinnerGroup};

/// One ballot as seen by the count. Every ballot carries a weight of one.
///
/// Choices that are not standing candidates, and repeated choices, are
/// ignored by the count.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct TallyBallot {
    pub ranking: Vec<CandidateId>,
}

// ******** Output data structures *********

/// The votes that left a candidate's pile in one round.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct TransferStats {
    pub candidate: CandidateId,
    /// Value at which the ballots moved: the surplus transfer value, or 1 for
    /// an exclusion.
    pub transfer_value: Decimal,
    /// For a surplus, the votes above quota; for an exclusion, the whole pile.
    pub amount: Decimal,
    pub ballots_moved: u64,
    pub transfers: BTreeMap<CandidateId, Decimal>,
    pub exhausted: Decimal,
}

/// A candidate that reached the election step but was passed over because a
/// winner group it belongs to was already full.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct GroupCapSkip {
    pub candidate: CandidateId,
    pub group: String,
}

/// Statistics for one round
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RoundStats {
    pub round: u32,
    pub quota: u64,
    /// Ballots not yet exhausted when the round started (the quota denominator).
    pub active_ballots: u64,
    /// Totals of the continuing candidates when the round started.
    pub tally: BTreeMap<CandidateId, Decimal>,
    pub elected: Vec<CandidateId>,
    /// True when the remaining candidates were elected without reaching quota.
    pub elected_outright: bool,
    pub skipped: Vec<GroupCapSkip>,
    pub surpluses: Vec<TransferStats>,
    pub eliminated: Option<TransferStats>,
    /// Cumulative exhausted vote value at the end of the round.
    pub exhausted: Decimal,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct TallyResult {
    pub seats: u32,
    /// Droop quota of the first round.
    pub quota: u64,
    pub valid_ballots: u64,
    /// Winners, in the order they were elected.
    pub elected: Vec<CandidateId>,
    pub rounds: Vec<RoundStats>,
}

/// Errors that prevent the count from completing successfully.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TallyError {
    #[snafu(display("at least one seat must be filled"))]
    NoSeats,
    #[snafu(display("{seats} seats cannot be filled by {candidates} candidates"))]
    TooManySeats { seats: u32, candidates: usize },
    #[snafu(display("candidate {candidate} is listed more than once"))]
    DuplicateCandidate { candidate: CandidateId },
    #[snafu(display("winner group {group} references unknown candidate {candidate}"))]
    UnknownGroupMember { group: String, candidate: CandidateId },
    #[snafu(display("winner group {group} allows {cap} seats but only {seats} are filled"))]
    GroupCapTooLarge { group: String, cap: u32, seats: u32 },
    #[snafu(display(
        "winner group caps leave {seats} seats unfillable: only {elected} candidates could be elected"
    ))]
    Unsatisfiable { elected: usize, seats: u32 },
    #[snafu(display("the count did not converge"))]
    NoConvergence,
}

// ********* Configuration **********

/// The rules of one count.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct TallyRules {
    pub seats: u32,
    pub groups: Vec<WinnerGroup>,
    /// Transfer values and transferred ballot weights are truncated to this
    /// many decimal places.
    pub decimal_places: u32,
}

impl TallyRules {
    pub const DEFAULT_DECIMAL_PLACES: u32 = 9;

    pub fn new(seats: u32) -> TallyRules {
        TallyRules {
            seats,
            groups: Vec::new(),
            decimal_places: TallyRules::DEFAULT_DECIMAL_PLACES,
        }
    }

    pub fn with_groups(seats: u32, groups: &[WinnerGroup]) -> TallyRules {
        TallyRules {
            groups: groups.to_vec(),
            ..TallyRules::new(seats)
        }
    }
}

/// Operational settings of a ledger.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct LedgerSettings {
    /// How long `submit` waits for the election's append slot before giving up.
    pub submit_timeout: Duration,
    pub min_nonce_bytes: usize,
    pub decimal_places: u32,
}

impl LedgerSettings {
    pub const DEFAULT: LedgerSettings = LedgerSettings {
        submit_timeout: Duration::from_secs(10),
        min_nonce_bytes: MIN_NONCE_BYTES,
        decimal_places: TallyRules::DEFAULT_DECIMAL_PLACES,
    };
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings::DEFAULT
    }
}
