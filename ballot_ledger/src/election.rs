// ********* Election definitions ***********

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Display;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }
    };
}

string_id!(
    /// Identifier of an election.
    ElectionId
);

string_id!(
    /// Identifier of a candidate. Candidate ids are compared byte-wise, which
    /// is the last tie-break rule of the count.
    CandidateId
);

string_id!(
    /// Stable directory username of a voter.
    VoterId
);

/// The life cycle of an election.
///
/// `draft -> scheduled -> open -> closed -> tallied`. Opening and closing
/// happen when the clock passes the configured timestamps; closing may also be
/// requested by an organizer. `tallied` is terminal.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectionStatus {
    Draft,
    Scheduled,
    Open,
    Closed,
    Tallied,
}

impl Display for ElectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ElectionStatus::Draft => "draft",
            ElectionStatus::Scheduled => "scheduled",
            ElectionStatus::Open => "open",
            ElectionStatus::Closed => "closed",
            ElectionStatus::Tallied => "tallied",
        };
        write!(f, "{}", s)
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Election {
    pub id: ElectionId,
    pub title: String,
    pub description: String,
    pub url: String,
    pub opens_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
    pub seats: u32,
    /// Directory group whose members may vote. Resolved by the directory.
    pub eligible_group: String,
    /// Share of eligible voters (in percent) that must participate for the
    /// quorum to be met. Zero disables quorum tracking.
    pub quorum_percent: u32,
    pub status: ElectionStatus,
}

impl Election {
    /// A new election in `draft` state.
    pub fn new(
        id: &str,
        title: &str,
        opens_at: DateTime<Utc>,
        closes_at: DateTime<Utc>,
        seats: u32,
        eligible_group: &str,
    ) -> Election {
        Election {
            id: ElectionId::from(id),
            title: title.to_string(),
            description: String::new(),
            url: String::new(),
            opens_at,
            closes_at,
            seats,
            eligible_group: eligible_group.to_string(),
            quorum_percent: 0,
            status: ElectionStatus::Draft,
        }
    }

    /// The status of the election at the given instant, taking into account
    /// the transitions driven by the opening and closing timestamps.
    pub fn status_at(&self, now: DateTime<Utc>) -> ElectionStatus {
        match self.status {
            ElectionStatus::Scheduled | ElectionStatus::Open if now >= self.closes_at => {
                ElectionStatus::Closed
            }
            ElectionStatus::Scheduled | ElectionStatus::Open if now >= self.opens_at => {
                ElectionStatus::Open
            }
            ElectionStatus::Open => ElectionStatus::Scheduled,
            s => s,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    /// Directory username of the candidate.
    pub username: String,
    pub nominated_by: Option<String>,
}

impl Candidate {
    pub fn new(id: &str, username: &str) -> Candidate {
        Candidate {
            id: CandidateId::from(id),
            username: username.to_string(),
            nominated_by: None,
        }
    }
}

/// A named subset of candidates that may collectively fill at most
/// `max_elected` seats.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct WinnerGroup {
    pub name: String,
    pub max_elected: Option<u32>,
    pub candidates: BTreeSet<CandidateId>,
}

impl WinnerGroup {
    pub fn new(name: &str, max_elected: u32, candidates: &[&str]) -> WinnerGroup {
        WinnerGroup {
            name: name.to_string(),
            max_elected: Some(max_elected),
            candidates: candidates.iter().map(|c| CandidateId::from(*c)).collect(),
        }
    }

    pub fn contains(&self, cid: &CandidateId) -> bool {
        self.candidates.contains(cid)
    }
}

/// Reasons an election definition is rejected.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ElectionProblem {
    EmptyId,
    ClosesBeforeOpens,
    NoSeats,
    TooManySeats { seats: u32, candidates: usize },
    EmptyCandidateId,
    DuplicateCandidate(CandidateId),
    DuplicateGroup(String),
    UnknownGroupMember { group: String, candidate: CandidateId },
    GroupCapTooLarge { group: String, cap: u32, seats: u32 },
    QuorumOutOfRange(u32),
}

impl Display for ElectionProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElectionProblem::EmptyId => write!(f, "the election id is empty"),
            ElectionProblem::ClosesBeforeOpens => {
                write!(f, "the closing time must be strictly after the opening time")
            }
            ElectionProblem::NoSeats => write!(f, "at least one seat is required"),
            ElectionProblem::TooManySeats { seats, candidates } => write!(
                f,
                "{} seats cannot be filled by {} standing candidates",
                seats, candidates
            ),
            ElectionProblem::EmptyCandidateId => write!(f, "a candidate has an empty id"),
            ElectionProblem::DuplicateCandidate(cid) => {
                write!(f, "candidate {} is listed more than once", cid)
            }
            ElectionProblem::DuplicateGroup(name) => {
                write!(f, "winner group {} is defined more than once", name)
            }
            ElectionProblem::UnknownGroupMember { group, candidate } => write!(
                f,
                "winner group {} references unknown candidate {}",
                group, candidate
            ),
            ElectionProblem::GroupCapTooLarge { group, cap, seats } => write!(
                f,
                "winner group {} allows {} seats but the election only has {}",
                group, cap, seats
            ),
            ElectionProblem::QuorumOutOfRange(q) => {
                write!(f, "quorum of {}% is out of range", q)
            }
        }
    }
}

/// Everything the core needs to know about one election: its configuration,
/// the standing candidates and the winner groups.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ElectionDefinition {
    pub election: Election,
    pub candidates: Vec<Candidate>,
    pub groups: Vec<WinnerGroup>,
}

impl ElectionDefinition {
    pub fn candidate_ids(&self) -> Vec<CandidateId> {
        self.candidates.iter().map(|c| c.id.clone()).collect()
    }

    /// The winner groups a candidate belongs to.
    pub fn groups_of(&self, cid: &CandidateId) -> Vec<&WinnerGroup> {
        self.groups.iter().filter(|g| g.contains(cid)).collect()
    }

    /// Checks the invariants that must hold before the election leaves `draft`.
    pub fn validate(&self) -> Result<(), ElectionProblem> {
        let e = &self.election;
        if e.id.0.is_empty() {
            return Err(ElectionProblem::EmptyId);
        }
        if e.closes_at <= e.opens_at {
            return Err(ElectionProblem::ClosesBeforeOpens);
        }
        if e.seats == 0 {
            return Err(ElectionProblem::NoSeats);
        }
        if e.quorum_percent > 100 {
            return Err(ElectionProblem::QuorumOutOfRange(e.quorum_percent));
        }
        let mut seen: BTreeSet<&CandidateId> = BTreeSet::new();
        for c in self.candidates.iter() {
            if c.id.0.is_empty() {
                return Err(ElectionProblem::EmptyCandidateId);
            }
            if !seen.insert(&c.id) {
                return Err(ElectionProblem::DuplicateCandidate(c.id.clone()));
            }
        }
        if e.seats as usize > self.candidates.len() {
            return Err(ElectionProblem::TooManySeats {
                seats: e.seats,
                candidates: self.candidates.len(),
            });
        }
        let mut group_names: BTreeSet<&str> = BTreeSet::new();
        for g in self.groups.iter() {
            if !group_names.insert(g.name.as_str()) {
                return Err(ElectionProblem::DuplicateGroup(g.name.clone()));
            }
            if let Some(unknown) = g.candidates.iter().find(|cid| !seen.contains(cid)) {
                return Err(ElectionProblem::UnknownGroupMember {
                    group: g.name.clone(),
                    candidate: unknown.clone(),
                });
            }
            match g.max_elected {
                Some(cap) if cap > e.seats => {
                    return Err(ElectionProblem::GroupCapTooLarge {
                        group: g.name.clone(),
                        cap,
                        seats: e.seats,
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn definition(seats: u32) -> ElectionDefinition {
        let opens = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        ElectionDefinition {
            election: Election::new("board-2026", "Board", opens, opens + Duration::days(7), seats, "members"),
            candidates: vec![Candidate::new("alice", "alice"), Candidate::new("bob", "bob")],
            groups: vec![],
        }
    }

    #[test]
    fn status_follows_the_clock() {
        let mut def = definition(1);
        def.election.status = ElectionStatus::Scheduled;
        let e = &def.election;
        assert_eq!(e.status_at(e.opens_at - Duration::seconds(1)), ElectionStatus::Scheduled);
        assert_eq!(e.status_at(e.opens_at), ElectionStatus::Open);
        assert_eq!(e.status_at(e.closes_at), ElectionStatus::Closed);
        def.election.status = ElectionStatus::Tallied;
        assert_eq!(def.election.status_at(def.election.opens_at), ElectionStatus::Tallied);
    }

    #[test]
    fn rejects_more_seats_than_candidates() {
        assert_eq!(
            definition(3).validate(),
            Err(ElectionProblem::TooManySeats { seats: 3, candidates: 2 })
        );
        assert_eq!(definition(2).validate(), Ok(()));
    }

    #[test]
    fn rejects_inverted_window() {
        let mut def = definition(1);
        def.election.closes_at = def.election.opens_at;
        assert_eq!(def.validate(), Err(ElectionProblem::ClosesBeforeOpens));
    }

    #[test]
    fn rejects_group_caps_above_seats() {
        let mut def = definition(1);
        def.groups.push(WinnerGroup::new("staff", 2, &["alice", "bob"]));
        assert_eq!(
            def.validate(),
            Err(ElectionProblem::GroupCapTooLarge {
                group: "staff".to_string(),
                cap: 2,
                seats: 1
            })
        );
        def.groups[0] = WinnerGroup::new("staff", 1, &["alice", "carol"]);
        assert_eq!(
            def.validate(),
            Err(ElectionProblem::UnknownGroupMember {
                group: "staff".to_string(),
                candidate: CandidateId::from("carol")
            })
        );
    }
}
