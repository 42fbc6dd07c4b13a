pub use crate::config::*;
use crate::election::{CandidateId, WinnerGroup};

/// A builder for assembling a count by hand, outside of a ledger.
///
/// ```
/// pub use ballot_ledger::builder::Builder;
/// pub use ballot_ledger::TallyRules;
/// # use ballot_ledger::TallyError;
///
/// let mut builder = Builder::new(&TallyRules::new(1))?
///     .candidates(&["Anna".to_string(), "Bob".to_string()])?;
///
/// builder.add_ballot_simple(&["Anna".to_string(), "Bob".to_string()])?;
/// builder.add_ballot(&["Bob".to_string()], 2)?;
///
/// let result = builder.tally()?;
/// assert_eq!(result.elected[0].as_str(), "Bob");
/// # Ok::<(), TallyError>(())
/// ```
pub struct Builder {
    pub(crate) _rules: TallyRules,
    pub(crate) _candidates: Option<Vec<CandidateId>>,
    pub(crate) _ballots: Vec<TallyBallot>,
}

impl Builder {
    pub fn new(rules: &TallyRules) -> Result<Builder, TallyError> {
        if rules.seats == 0 {
            return Err(TallyError::NoSeats);
        }
        Ok(Builder {
            _rules: rules.clone(),
            _candidates: None,
            _ballots: Vec::new(),
        })
    }

    pub fn candidates(self, cands: &[String]) -> Result<Builder, TallyError> {
        Ok(Builder {
            _rules: self._rules,
            _candidates: Some(cands.iter().map(|c| CandidateId::from(c.as_str())).collect()),
            _ballots: Vec::new(),
        })
    }

    /// Caps the number of seats the given candidates may win together.
    pub fn group(mut self, name: &str, max_elected: u32, members: &[String]) -> Result<Builder, TallyError> {
        let members: Vec<&str> = members.iter().map(|m| m.as_str()).collect();
        self._rules.groups.push(WinnerGroup::new(name, max_elected, &members));
        Ok(self)
    }

    /// Adds one ballot.
    pub fn add_ballot_simple(&mut self, ranking: &[String]) -> Result<(), TallyError> {
        self.add_ballot(ranking, 1)
    }

    /// Adds `count` identical ballots.
    ///
    /// ranking: the choices made by the voter, in order. Names that are not
    /// candidates are ignored by the count.
    pub fn add_ballot(&mut self, ranking: &[String], count: u32) -> Result<(), TallyError> {
        let ballot = TallyBallot {
            ranking: ranking.iter().map(|c| CandidateId::from(c.as_str())).collect(),
        };
        for _ in 0..count {
            self._ballots.push(ballot.clone());
        }
        Ok(())
    }

    /// Runs the count. Without an explicit candidate list, every name that
    /// appears on a ballot stands.
    pub fn tally(&self) -> Result<TallyResult, TallyError> {
        let candidates: Vec<CandidateId> = match &self._candidates {
            Some(c) => c.clone(),
            None => {
                let mut c: Vec<CandidateId> = self
                    ._ballots
                    .iter()
                    .flat_map(|b| b.ranking.iter().cloned())
                    .collect();
                c.sort();
                c.dedup();
                c
            }
        };
        crate::run_tally(&self._ballots, &candidates, &self._rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn infers_candidates_from_ballots() {
        let mut b = Builder::new(&TallyRules::new(2)).unwrap();
        b.add_ballot(&names(&["x", "y"]), 3).unwrap();
        b.add_ballot(&names(&["z"]), 2).unwrap();
        b.add_ballot_simple(&names(&["y"])).unwrap();
        let res = b.tally().unwrap();
        assert_eq!(res.valid_ballots, 6);
        assert_eq!(res.elected.len(), 2);
        assert_eq!(res.elected[0], CandidateId::from("x"));
    }

    #[test]
    fn groups_are_forwarded() {
        let mut b = Builder::new(&TallyRules::new(2))
            .unwrap()
            .candidates(&names(&["x", "y", "z"]))
            .unwrap()
            .group("pair", 1, &names(&["x", "y"]))
            .unwrap();
        b.add_ballot(&names(&["x", "y"]), 5).unwrap();
        b.add_ballot(&names(&["y", "x"]), 5).unwrap();
        b.add_ballot(&names(&["z"]), 1).unwrap();
        let res = b.tally().unwrap();
        assert_eq!(res.elected, vec![CandidateId::from("x"), CandidateId::from("z")]);
    }

    #[test]
    fn rejects_zero_seats() {
        assert!(matches!(Builder::new(&TallyRules::new(0)), Err(TallyError::NoSeats)));
    }
}
