// ********* Audit trail ***********

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chain::HashDigest;
use crate::config::RoundStats;
use crate::election::CandidateId;

/// Turnout of an election against its quorum.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct QuorumStatus {
    pub quorum_percent: u32,
    pub eligible_voter_count: u64,
    pub participating_voter_count: u64,
    /// `ceil(eligible * percent / 100)`, or 0 when no quorum applies.
    pub required_participating_voter_count: u64,
    pub quorum_met: bool,
}

impl QuorumStatus {
    pub fn compute(quorum_percent: u32, eligible: u64, participating: u64) -> QuorumStatus {
        let required = if quorum_percent > 0 && eligible > 0 {
            (eligible * quorum_percent as u64 + 99) / 100
        } else {
            0
        };
        QuorumStatus {
            quorum_percent,
            eligible_voter_count: eligible,
            participating_voter_count: participating,
            required_participating_voter_count: required,
            quorum_met: required > 0 && participating >= required,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEventKind {
    ElectionScheduled {
        candidates: Vec<CandidateId>,
    },
    /// Never public, and never carries the voter.
    BallotSubmitted {
        ballot_hash: HashDigest,
    },
    QuorumReached {
        status: QuorumStatus,
    },
    ElectionEndExtended {
        previous_closes_at: DateTime<Utc>,
        closes_at: DateTime<Utc>,
    },
    ElectionClosed {
        chain_head: HashDigest,
    },
    TallyRound {
        round: RoundStats,
    },
    TallyCompleted {
        quota: u64,
        elected: Vec<CandidateId>,
    },
    IntegrityAlarm {
        detail: String,
    },
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub at: DateTime<Utc>,
    pub public: bool,
    #[serde(flatten)]
    pub kind: AuditEventKind,
}

/// The audit events of one election, oldest first.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct AuditLog {
    events: Vec<AuditEvent>,
}

impl AuditLog {
    pub fn record(&mut self, at: DateTime<Utc>, public: bool, kind: AuditEventKind) {
        self.events.push(AuditEvent { at, public, kind });
    }

    pub fn events(&self, public_only: bool) -> Vec<AuditEvent> {
        self.events
            .iter()
            .filter(|e| e.public || !public_only)
            .cloned()
            .collect()
    }

    pub fn has_quorum_event(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e.kind, AuditEventKind::QuorumReached { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_rounds_up() {
        let s = QuorumStatus::compute(10, 25, 2);
        assert_eq!(s.required_participating_voter_count, 3);
        assert!(!s.quorum_met);
        assert!(QuorumStatus::compute(10, 25, 3).quorum_met);
        assert_eq!(QuorumStatus::compute(50, 4, 2).required_participating_voter_count, 2);
        // No quorum configured: never "met".
        let none = QuorumStatus::compute(0, 25, 25);
        assert_eq!(none.required_participating_voter_count, 0);
        assert!(!none.quorum_met);
    }

    #[test]
    fn public_filter() {
        let mut log = AuditLog::default();
        let now = Utc::now();
        log.record(
            now,
            false,
            AuditEventKind::BallotSubmitted {
                ballot_hash: HashDigest("ab".repeat(32)),
            },
        );
        log.record(
            now,
            true,
            AuditEventKind::ElectionClosed {
                chain_head: HashDigest("cd".repeat(32)),
            },
        );
        assert_eq!(log.events(false).len(), 2);
        let public = log.events(true);
        assert_eq!(public.len(), 1);
        let json = serde_json::to_value(&public[0]).unwrap();
        assert_eq!(json["event_type"], "election_closed");
        assert_eq!(json["chain_head"], "cd".repeat(32));
    }
}
