use chrono::{DateTime, Utc};
use snafu::Snafu;
use std::collections::{BTreeMap, BTreeSet};

use crate::election::{Candidate, ElectionId, VoterId};

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DirectoryError {
    #[snafu(display("directory group {group} does not exist"))]
    UnknownGroup { group: String },
    #[snafu(display("no candidate list for election {election}"))]
    NoCandidates { election: ElectionId },
    #[snafu(display("directory unavailable: {message}"))]
    Unavailable { message: String },
}

/// The identity directory, as seen by the ledger. It is only ever read.
pub trait Directory: Send + Sync {
    /// The members of `group` as they were at `as_of`.
    fn members_of(
        &self,
        group: &str,
        as_of: DateTime<Utc>,
    ) -> Result<BTreeSet<VoterId>, DirectoryError>;

    /// The candidates standing in an election.
    fn candidates_of(&self, election: &ElectionId) -> Result<Vec<Candidate>, DirectoryError>;
}

#[derive(Eq, PartialEq, Debug, Clone)]
struct Membership {
    voter: VoterId,
    joined_at: DateTime<Utc>,
    left_at: Option<DateTime<Utc>>,
}

impl Membership {
    fn active_at(&self, t: DateTime<Utc>) -> bool {
        self.joined_at <= t && self.left_at.map_or(true, |left| t < left)
    }
}

/// An in-memory directory snapshot with membership history.
#[derive(Default, Debug, Clone)]
pub struct StaticDirectory {
    groups: BTreeMap<String, Vec<Membership>>,
    candidates: BTreeMap<ElectionId, Vec<Candidate>>,
}

impl StaticDirectory {
    pub fn new() -> StaticDirectory {
        StaticDirectory::default()
    }

    /// Declares a group, possibly without members.
    pub fn add_group(&mut self, group: &str) {
        self.groups.entry(group.to_string()).or_insert_with(Vec::new);
    }

    pub fn add_member(
        &mut self,
        group: &str,
        voter: &str,
        joined_at: DateTime<Utc>,
        left_at: Option<DateTime<Utc>>,
    ) {
        self.groups
            .entry(group.to_string())
            .or_insert_with(Vec::new)
            .push(Membership {
                voter: VoterId::from(voter),
                joined_at,
                left_at,
            });
    }

    pub fn set_candidates(&mut self, election: &ElectionId, candidates: Vec<Candidate>) {
        self.candidates.insert(election.clone(), candidates);
    }
}

impl Directory for StaticDirectory {
    fn members_of(
        &self,
        group: &str,
        as_of: DateTime<Utc>,
    ) -> Result<BTreeSet<VoterId>, DirectoryError> {
        let memberships = self.groups.get(group).ok_or_else(|| DirectoryError::UnknownGroup {
            group: group.to_string(),
        })?;
        Ok(memberships
            .iter()
            .filter(|m| m.active_at(as_of))
            .map(|m| m.voter.clone())
            .collect())
    }

    fn candidates_of(&self, election: &ElectionId) -> Result<Vec<Candidate>, DirectoryError> {
        self.candidates
            .get(election)
            .cloned()
            .ok_or_else(|| DirectoryError::NoCandidates {
                election: election.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn membership_is_evaluated_at_a_point_in_time() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut dir = StaticDirectory::new();
        dir.add_member("members", "early", t0 - Duration::days(30), None);
        dir.add_member("members", "late", t0 + Duration::days(1), None);
        dir.add_member("members", "gone", t0 - Duration::days(30), Some(t0 + Duration::days(2)));
        dir.add_member("members", "left", t0 - Duration::days(30), Some(t0));

        let at_t0 = dir.members_of("members", t0).unwrap();
        let names: Vec<&str> = at_t0.iter().map(|v| v.as_str()).collect();
        assert_eq!(names, vec!["early", "gone"]);

        let later = dir.members_of("members", t0 + Duration::days(3)).unwrap();
        let names: Vec<&str> = later.iter().map(|v| v.as_str()).collect();
        assert_eq!(names, vec!["early", "late"]);
    }

    #[test]
    fn unknown_group_is_an_error() {
        let dir = StaticDirectory::new();
        assert_eq!(
            dir.members_of("nobody", Utc::now()),
            Err(DirectoryError::UnknownGroup { group: "nobody".to_string() })
        );
    }
}
