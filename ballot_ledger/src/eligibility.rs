// Gatekeeping before a ballot reaches the ledger. Everything in here is
// read-only.

use chrono::{DateTime, Utc};
use log::debug;
use std::collections::HashSet;
use std::fmt::Display;

use crate::canonical::RankingProblem;
use crate::directory::{Directory, DirectoryError};
use crate::election::{CandidateId, Election, ElectionDefinition, ElectionStatus, VoterId};

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Ineligibility {
    ElectionNotOpen(ElectionStatus),
    /// Not a member of the eligible group when the election opened.
    NotAMember,
    DirectoryUnavailable(DirectoryError),
}

impl Display for Ineligibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ineligibility::ElectionNotOpen(s) => write!(f, "the election is {}", s),
            Ineligibility::NotAMember => {
                write!(f, "not a member of the eligible group at opening time")
            }
            Ineligibility::DirectoryUnavailable(e) => write!(f, "{}", e),
        }
    }
}

/// Decides whether `voter` may cast a ballot in `election` at `now`.
///
/// Membership is evaluated at the opening time of the election, so joining or
/// leaving the group while voting is underway changes nothing.
pub fn check(
    election: &Election,
    directory: &dyn Directory,
    voter: &VoterId,
    now: DateTime<Utc>,
) -> Result<(), Ineligibility> {
    let status = election.status_at(now);
    if status != ElectionStatus::Open {
        return Err(Ineligibility::ElectionNotOpen(status));
    }
    let members = directory
        .members_of(&election.eligible_group, election.opens_at)
        .map_err(Ineligibility::DirectoryUnavailable)?;
    if members.contains(voter) {
        Ok(())
    } else {
        debug!("check: voter not in group {}", election.eligible_group);
        Err(Ineligibility::NotAMember)
    }
}

/// Checks that a ranking only references standing candidates, at most once
/// each, and is not empty.
pub fn validate_ranking(
    definition: &ElectionDefinition,
    ranking: &[CandidateId],
) -> Result<(), RankingProblem> {
    if ranking.is_empty() {
        return Err(RankingProblem::Empty);
    }
    let standing: HashSet<&CandidateId> = definition.candidates.iter().map(|c| &c.id).collect();
    if ranking.len() > standing.len() {
        return Err(RankingProblem::TooLong {
            len: ranking.len(),
            max: standing.len(),
        });
    }
    let mut seen: HashSet<&CandidateId> = HashSet::new();
    for cid in ranking.iter() {
        if !standing.contains(cid) {
            return Err(RankingProblem::UnknownCandidate(cid.clone()));
        }
        if !seen.insert(cid) {
            return Err(RankingProblem::Duplicate(cid.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::StaticDirectory;
    use crate::election::{Candidate, ElectionStatus};
    use chrono::{Duration, TimeZone};

    fn setup() -> (ElectionDefinition, StaticDirectory) {
        let opens = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
        let mut election = Election::new("e1", "Council", opens, opens + Duration::days(2), 1, "voters");
        election.status = ElectionStatus::Scheduled;
        let def = ElectionDefinition {
            election,
            candidates: vec![Candidate::new("ann", "ann"), Candidate::new("ben", "ben")],
            groups: vec![],
        };
        let mut dir = StaticDirectory::new();
        dir.add_member("voters", "vera", opens - Duration::days(10), None);
        dir.add_member("voters", "newbie", opens + Duration::hours(1), None);
        dir.add_member("voters", "leaver", opens - Duration::days(10), Some(opens + Duration::hours(1)));
        (def, dir)
    }

    fn ids(names: &[&str]) -> Vec<CandidateId> {
        names.iter().map(|n| CandidateId::from(*n)).collect()
    }

    #[test]
    fn eligible_member_while_open() {
        let (def, dir) = setup();
        let during = def.election.opens_at + Duration::hours(2);
        assert_eq!(check(&def.election, &dir, &VoterId::from("vera"), during), Ok(()));
        // Left the group after opening: keeps the vote.
        assert_eq!(check(&def.election, &dir, &VoterId::from("leaver"), during), Ok(()));
    }

    #[test]
    fn late_joiner_is_not_eligible() {
        let (def, dir) = setup();
        let during = def.election.opens_at + Duration::hours(2);
        assert_eq!(
            check(&def.election, &dir, &VoterId::from("newbie"), during),
            Err(Ineligibility::NotAMember)
        );
    }

    #[test]
    fn closed_window_wins_over_membership() {
        let (def, dir) = setup();
        let before = def.election.opens_at - Duration::minutes(1);
        let after = def.election.closes_at;
        assert_eq!(
            check(&def.election, &dir, &VoterId::from("vera"), before),
            Err(Ineligibility::ElectionNotOpen(ElectionStatus::Scheduled))
        );
        assert_eq!(
            check(&def.election, &dir, &VoterId::from("vera"), after),
            Err(Ineligibility::ElectionNotOpen(ElectionStatus::Closed))
        );
    }

    #[test]
    fn ranking_validation() {
        let (def, _) = setup();
        assert_eq!(validate_ranking(&def, &ids(&["ben", "ann"])), Ok(()));
        assert_eq!(validate_ranking(&def, &[]), Err(RankingProblem::Empty));
        assert_eq!(
            validate_ranking(&def, &ids(&["ann", "zed"])),
            Err(RankingProblem::UnknownCandidate(CandidateId::from("zed")))
        );
        assert_eq!(
            validate_ranking(&def, &ids(&["ann", "ann"])),
            Err(RankingProblem::Duplicate(CandidateId::from("ann")))
        );
        assert_eq!(
            validate_ranking(&def, &ids(&["ann", "ben", "ann"])),
            Err(RankingProblem::TooLong { len: 3, max: 2 })
        );
    }
}
