mod audit;
pub mod builder;
mod canonical;
mod chain;
mod clock;
mod config;
mod directory;
mod election;
mod eligibility;
mod error;
mod export;
mod ledger;
pub mod manual;
mod receipt;
pub mod quick_start;
mod store;

use log::{debug, info};
use rust_decimal::RoundingStrategy;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

pub use crate::audit::*;
pub use crate::canonical::{canonicalize, decode as decode_ranking, RankingProblem};
pub use crate::chain::*;
pub use crate::clock::*;
pub use crate::config::*;
pub use crate::directory::*;
pub use crate::election::*;
pub use crate::eligibility::{check as check_eligibility, validate_ranking, Ineligibility};
pub use crate::error::*;
pub use crate::export::*;
pub use crate::ledger::*;
pub use crate::receipt::*;
pub use crate::store::*;
pub use rust_decimal::Decimal;

// **** Private structures ****

type RoundId = u32;

// Position of a candidate in the sorted list of standing candidates. Since the
// list is sorted by id, comparing positions compares ids.
type Cid = usize;

const MAX_ROUNDS: usize = 10000;

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
enum CandidateStatus {
    Continuing,
    Elected,
    Excluded,
}

#[derive(Eq, PartialEq, Debug, Clone)]
struct BallotState {
    // Standing candidates only, first occurrence of each.
    prefs: Vec<Cid>,
    // Index in prefs of the candidate currently holding the ballot.
    pos: usize,
    weight: Decimal,
}

struct GroupInternal {
    name: String,
    cap: Option<u32>,
    members: BTreeSet<Cid>,
}

struct Count<'a> {
    names: &'a [CandidateId],
    groups: Vec<GroupInternal>,
    decimal_places: u32,
    status: Vec<CandidateStatus>,
    totals: Vec<Decimal>,
    // Cumulative value moved onto each candidate by transfers.
    transfers_received: Vec<Decimal>,
    piles: Vec<Vec<usize>>,
    ballots: Vec<BallotState>,
    exhausted_weight: Decimal,
    exhausted_ballots: u64,
    elected: Vec<Cid>,
}

impl<'a> Count<'a> {
    fn continuing(&self) -> Vec<Cid> {
        (0..self.names.len())
            .filter(|c| self.status[*c] == CandidateStatus::Continuing)
            .collect()
    }

    /// The first full group that `cid` belongs to, if any.
    fn blocking_group(&self, cid: Cid) -> Option<&str> {
        self.groups
            .iter()
            .filter(|g| g.members.contains(&cid))
            .find(|g| match g.cap {
                Some(cap) => {
                    let taken = self.elected.iter().filter(|e| g.members.contains(e)).count();
                    taken >= cap as usize
                }
                None => false,
            })
            .map(|g| g.name.as_str())
    }

    /// Order in which candidates get elected: highest total first, then less
    /// value received by transfer, then smaller id.
    fn election_order(&self, a: &Cid, b: &Cid) -> Ordering {
        self.totals[*b]
            .cmp(&self.totals[*a])
            .then(self.transfers_received[*a].cmp(&self.transfers_received[*b]))
            .then(a.cmp(b))
    }

    /// Order in which candidates get excluded: lowest total first, then less
    /// value received by transfer, then smaller id.
    fn exclusion_order(&self, a: &Cid, b: &Cid) -> Ordering {
        self.totals[*a]
            .cmp(&self.totals[*b])
            .then(self.transfers_received[*a].cmp(&self.transfers_received[*b]))
            .then(a.cmp(b))
    }

    fn truncate(&self, x: Decimal) -> Decimal {
        x.round_dp_with_strategy(self.decimal_places, RoundingStrategy::ToZero)
    }

    fn elect(&mut self, cid: Cid) {
        self.status[cid] = CandidateStatus::Elected;
        self.elected.push(cid);
    }

    /// Moves every ballot held by `from` to its next continuing preference.
    ///
    /// With a transfer value, each ballot moves at its current weight times
    /// that value; otherwise it moves at its current weight.
    fn move_pile(&mut self, from: Cid, transfer_value: Option<Decimal>) -> PileMove {
        let pile = std::mem::take(&mut self.piles[from]);
        let mut res = PileMove {
            ballots_moved: pile.len() as u64,
            transfers: BTreeMap::new(),
            exhausted: Decimal::ZERO,
        };
        for bidx in pile {
            let weight = match transfer_value {
                Some(tv) => self.truncate(self.ballots[bidx].weight * tv),
                None => self.ballots[bidx].weight,
            };
            let ballot = &self.ballots[bidx];
            let next = ballot
                .prefs
                .iter()
                .enumerate()
                .skip(ballot.pos + 1)
                .find(|(_, c)| self.status[**c] == CandidateStatus::Continuing)
                .map(|(pos, c)| (pos, *c));
            self.ballots[bidx].weight = weight;
            match next {
                Some((pos, to)) => {
                    self.ballots[bidx].pos = pos;
                    self.piles[to].push(bidx);
                    self.totals[to] += weight;
                    self.transfers_received[to] += weight;
                    *res.transfers.entry(to).or_insert(Decimal::ZERO) += weight;
                }
                None => {
                    self.exhausted_weight += weight;
                    self.exhausted_ballots += 1;
                    res.exhausted += weight;
                }
            }
        }
        res
    }

    fn transfer_stats(
        &self,
        cid: Cid,
        transfer_value: Decimal,
        amount: Decimal,
        m: PileMove,
    ) -> TransferStats {
        TransferStats {
            candidate: self.names[cid].clone(),
            transfer_value,
            amount,
            ballots_moved: m.ballots_moved,
            transfers: m
                .transfers
                .into_iter()
                .map(|(c, w)| (self.names[c].clone(), w))
                .collect(),
            exhausted: m.exhausted,
        }
    }
}

struct PileMove {
    ballots_moved: u64,
    transfers: BTreeMap<Cid, Decimal>,
    exhausted: Decimal,
}

fn droop_quota(active_ballots: u64, seats: u32) -> u64 {
    active_ballots / (seats as u64 + 1) + 1
}

fn checks(candidates: &[CandidateId], rules: &TallyRules) -> Result<Vec<CandidateId>, TallyError> {
    if rules.seats == 0 {
        return Err(TallyError::NoSeats);
    }
    let mut sorted: Vec<CandidateId> = candidates.to_vec();
    sorted.sort();
    if let Some(w) = sorted.windows(2).find(|w| w[0] == w[1]) {
        return Err(TallyError::DuplicateCandidate {
            candidate: w[0].clone(),
        });
    }
    if rules.seats as usize > sorted.len() {
        return Err(TallyError::TooManySeats {
            seats: rules.seats,
            candidates: sorted.len(),
        });
    }
    for g in rules.groups.iter() {
        if let Some(unknown) = g.candidates.iter().find(|c| sorted.binary_search(c).is_err()) {
            return Err(TallyError::UnknownGroupMember {
                group: g.name.clone(),
                candidate: unknown.clone(),
            });
        }
        match g.max_elected {
            Some(cap) if cap > rules.seats => {
                return Err(TallyError::GroupCapTooLarge {
                    group: g.name.clone(),
                    cap,
                    seats: rules.seats,
                });
            }
            _ => {}
        }
    }
    Ok(sorted)
}

/// Runs a multi-seat single transferable vote count.
///
/// Arguments:
/// * `ballots` the ballots to count. Ballots whose ranking holds no standing
/// candidate are not valid and do not count towards the quota.
/// * `candidates` the standing candidates
/// * `rules` the number of seats, the winner groups and the precision of
/// transfer values
///
/// The result only depends on the multiset of ballots, never on their order.
pub fn run_tally(
    ballots: &[TallyBallot],
    candidates: &[CandidateId],
    rules: &TallyRules,
) -> Result<TallyResult, TallyError> {
    info!(
        "run_tally: processing {} ballots, {} candidates, {} seats",
        ballots.len(),
        candidates.len(),
        rules.seats
    );
    let names = checks(candidates, rules)?;
    let n = names.len();

    let groups: Vec<GroupInternal> = rules
        .groups
        .iter()
        .map(|g| GroupInternal {
            name: g.name.clone(),
            cap: g.max_elected,
            members: g
                .candidates
                .iter()
                .filter_map(|c| names.binary_search(c).ok())
                .collect(),
        })
        .collect();

    let mut count = Count {
        names: &names,
        groups,
        decimal_places: rules.decimal_places,
        status: vec![CandidateStatus::Continuing; n],
        totals: vec![Decimal::ZERO; n],
        transfers_received: vec![Decimal::ZERO; n],
        piles: vec![Vec::new(); n],
        ballots: Vec::new(),
        exhausted_weight: Decimal::ZERO,
        exhausted_ballots: 0,
        elected: Vec::new(),
    };

    // The piles are filled in a canonical ballot order so that the order of the
    // input never shows in the result.
    let mut prefs_list: Vec<Vec<Cid>> = Vec::new();
    for b in ballots.iter() {
        let mut prefs: Vec<Cid> = Vec::new();
        for c in b.ranking.iter() {
            if let Ok(cid) = names.binary_search(c) {
                if !prefs.contains(&cid) {
                    prefs.push(cid);
                }
            }
        }
        if !prefs.is_empty() {
            prefs_list.push(prefs);
        }
    }
    prefs_list.sort();
    for prefs in prefs_list {
        let first = prefs[0];
        count.piles[first].push(count.ballots.len());
        count.totals[first] += Decimal::ONE;
        count.ballots.push(BallotState {
            prefs,
            pos: 0,
            weight: Decimal::ONE,
        });
    }
    let valid_ballots = count.ballots.len() as u64;
    let initial_quota = droop_quota(valid_ballots, rules.seats);
    let seats = rules.seats as usize;
    debug!(
        "run_tally: {} valid ballots, initial quota {}",
        valid_ballots, initial_quota
    );

    let mut rounds: Vec<RoundStats> = Vec::new();
    while count.elected.len() < seats {
        if rounds.len() >= MAX_ROUNDS {
            return Err(TallyError::NoConvergence);
        }
        let round_id: RoundId = rounds.len() as u32 + 1;
        let active_ballots = valid_ballots - count.exhausted_ballots;
        let quota = droop_quota(active_ballots, rules.seats);
        let quota_d = Decimal::from(quota);
        let continuing = count.continuing();
        let remaining = seats - count.elected.len();

        let mut rs = RoundStats {
            round: round_id,
            quota,
            active_ballots,
            tally: continuing
                .iter()
                .map(|c| (names[*c].clone(), count.totals[*c]))
                .collect(),
            elected: Vec::new(),
            elected_outright: false,
            skipped: Vec::new(),
            surpluses: Vec::new(),
            eliminated: None,
            exhausted: Decimal::ZERO,
        };
        debug!("run_tally: round {} quota {} tally {:?}", round_id, quota, rs.tally);

        let electable: Vec<Cid> = continuing
            .iter()
            .filter(|c| count.blocking_group(**c).is_none())
            .cloned()
            .collect();

        if electable.len() <= remaining {
            // Not enough candidates left to compete: everyone electable takes a seat.
            let mut order = electable;
            order.sort_by(|a, b| count.election_order(a, b));
            for c in order {
                if let Some(g) = count.blocking_group(c) {
                    rs.skipped.push(GroupCapSkip {
                        candidate: names[c].clone(),
                        group: g.to_string(),
                    });
                } else {
                    count.elect(c);
                    rs.elected.push(names[c].clone());
                }
            }
            rs.elected_outright = true;
            rs.exhausted = count.exhausted_weight;
            info!("run_tally: round {} elected outright {:?}", round_id, rs.elected);
            rounds.push(rs);
            if count.elected.len() < seats {
                return Err(TallyError::Unsatisfiable {
                    elected: count.elected.len(),
                    seats: rules.seats,
                });
            }
            break;
        }

        let mut reached: Vec<Cid> = continuing
            .iter()
            .filter(|c| count.totals[**c] >= quota_d)
            .cloned()
            .collect();
        reached.sort_by(|a, b| count.election_order(a, b));
        let mut newly_elected: Vec<Cid> = Vec::new();
        for c in reached {
            if count.elected.len() == seats {
                break;
            }
            if let Some(g) = count.blocking_group(c) {
                debug!("run_tally: {} skipped, group {} is full", names[c], g);
                rs.skipped.push(GroupCapSkip {
                    candidate: names[c].clone(),
                    group: g.to_string(),
                });
                continue;
            }
            count.elect(c);
            newly_elected.push(c);
            rs.elected.push(names[c].clone());
        }

        if !newly_elected.is_empty() {
            info!("run_tally: round {} elected {:?}", round_id, rs.elected);
            if count.elected.len() < seats {
                for c in newly_elected {
                    let total = count.totals[c];
                    let surplus = total - quota_d;
                    if surplus <= Decimal::ZERO {
                        continue;
                    }
                    let tv = count.truncate(surplus / total);
                    let m = count.move_pile(c, Some(tv));
                    count.totals[c] = quota_d;
                    let stats = count.transfer_stats(c, tv, surplus, m);
                    debug!("run_tally: surplus transfer {:?}", stats);
                    rs.surpluses.push(stats);
                }
            }
        } else {
            // Candidates held back by a full group can never be elected: they go first.
            let blocked: Vec<Cid> = continuing
                .iter()
                .filter(|c| count.blocking_group(**c).is_some())
                .cloned()
                .collect();
            let pool = if blocked.is_empty() { continuing } else { blocked };
            let loser = pool
                .iter()
                .min_by(|a, b| count.exclusion_order(a, b))
                .cloned()
                .ok_or(TallyError::NoConvergence)?;
            let amount = count.totals[loser];
            count.status[loser] = CandidateStatus::Excluded;
            let m = count.move_pile(loser, None);
            count.totals[loser] = Decimal::ZERO;
            let stats = count.transfer_stats(loser, Decimal::ONE, amount, m);
            info!("run_tally: round {} excluded {}", round_id, names[loser]);
            debug!("run_tally: exclusion transfer {:?}", stats);
            rs.eliminated = Some(stats);
        }
        rs.exhausted = count.exhausted_weight;
        rounds.push(rs);
    }

    let elected: Vec<CandidateId> = count.elected.iter().map(|c| names[*c].clone()).collect();
    info!("run_tally: elected {:?} after {} rounds", elected, rounds.len());
    Ok(TallyResult {
        seats: rules.seats,
        quota: initial_quota,
        valid_ballots,
        elected,
        rounds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn ids(names: &[&str]) -> Vec<CandidateId> {
        names.iter().map(|n| CandidateId::from(*n)).collect()
    }

    fn ballots(groups: &[(usize, &[&str])]) -> Vec<TallyBallot> {
        let mut res = Vec::new();
        for (count, ranking) in groups.iter() {
            for _ in 0..*count {
                res.push(TallyBallot { ranking: ids(ranking) });
            }
        }
        res
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn quota_election_and_exclusion() {
        init();
        let b = ballots(&[
            (3, &["A", "B"]),
            (2, &["B", "C"]),
            (2, &["C", "B"]),
            (2, &["D", "E"]),
            (1, &["E", "D"]),
        ]);
        let res = run_tally(&b, &ids(&["A", "B", "C", "D", "E"]), &TallyRules::new(3)).unwrap();
        assert_eq!(res.quota, 3);
        assert_eq!(res.valid_ballots, 10);
        assert_eq!(res.elected, ids(&["A", "D", "C"]));
        assert_eq!(res.rounds.len(), 5);

        let r1 = &res.rounds[0];
        assert_eq!(r1.elected, ids(&["A"]));
        // Exactly at quota: nothing to transfer.
        assert!(r1.surpluses.is_empty());

        let r2 = &res.rounds[1];
        let elim = r2.eliminated.as_ref().unwrap();
        assert_eq!(elim.candidate, CandidateId::from("E"));
        assert_eq!(elim.transfers.get(&CandidateId::from("D")), Some(&Decimal::ONE));

        // B and C tie on votes and transfers received: B has the smaller id.
        let r4 = &res.rounds[3];
        assert_eq!(r4.eliminated.as_ref().unwrap().candidate, CandidateId::from("B"));
        assert!(res.rounds[4].elected_outright);
    }

    #[test]
    fn surplus_moves_at_fractional_value() {
        init();
        let b = ballots(&[(5, &["A", "B"]), (1, &["B"]), (2, &["C"]), (2, &["D"])]);
        let res = run_tally(&b, &ids(&["A", "B", "C", "D"]), &TallyRules::new(3)).unwrap();
        assert_eq!(res.elected, ids(&["A", "B", "D"]));

        let surplus = &res.rounds[0].surpluses[0];
        assert_eq!(surplus.candidate, CandidateId::from("A"));
        assert_eq!(surplus.amount, dec("2"));
        assert_eq!(surplus.transfer_value, dec("0.4"));
        assert_eq!(surplus.ballots_moved, 5);
        assert_eq!(surplus.transfers.get(&CandidateId::from("B")), Some(&dec("2")));
        assert_eq!(res.rounds[1].tally.get(&CandidateId::from("B")), Some(&dec("3")));

        // C's ballots exhaust and leave the quota denominator.
        let r3 = &res.rounds[2];
        assert_eq!(r3.eliminated.as_ref().unwrap().exhausted, dec("2"));
        assert_eq!(res.rounds[3].active_ballots, 8);
        assert_eq!(res.rounds[3].quota, 3);
    }

    #[test]
    fn transfer_values_are_truncated() {
        init();
        // Quota 2, A holds 3: a surplus of 1 spread over three ballots.
        let b = ballots(&[(3, &["A", "B"]), (1, &["C"])]);
        let res = run_tally(&b, &ids(&["A", "B", "C"]), &TallyRules::new(2)).unwrap();
        let surplus = &res.rounds[0].surpluses[0];
        assert_eq!(res.rounds[0].quota, 2);
        assert_eq!(surplus.transfer_value, dec("0.333333333"));
        assert_eq!(surplus.transfers.get(&CandidateId::from("B")), Some(&dec("0.999999999")));

        let rules = TallyRules {
            decimal_places: 2,
            ..TallyRules::new(2)
        };
        let res = run_tally(&b, &ids(&["A", "B", "C"]), &rules).unwrap();
        assert_eq!(res.rounds[0].surpluses[0].transfer_value, dec("0.33"));
    }

    #[test]
    fn group_cap_skips_then_excludes() {
        init();
        let b = ballots(&[(4, &["A", "C"]), (4, &["B", "C"]), (1, &["C"]), (2, &["D"])]);
        let rules = TallyRules::with_groups(2, &[WinnerGroup::new("acme", 1, &["A", "B"])]);
        let res = run_tally(&b, &ids(&["A", "B", "C", "D"]), &rules).unwrap();
        assert_eq!(res.quota, 4);
        assert_eq!(res.elected, ids(&["A", "C"]));

        let r1 = &res.rounds[0];
        assert_eq!(r1.elected, ids(&["A"]));
        assert_eq!(
            r1.skipped,
            vec![GroupCapSkip {
                candidate: CandidateId::from("B"),
                group: "acme".to_string()
            }]
        );
        // B stays standing, then is excluded ahead of the weaker D.
        let r2 = &res.rounds[1];
        assert_eq!(r2.tally.get(&CandidateId::from("B")), Some(&dec("4")));
        assert_eq!(r2.eliminated.as_ref().unwrap().candidate, CandidateId::from("B"));
        assert_eq!(res.rounds[2].elected, ids(&["C"]));
    }

    #[test]
    fn caps_that_cannot_be_met() {
        init();
        let b = ballots(&[(1, &["A"]), (1, &["B"])]);
        let rules = TallyRules::with_groups(2, &[WinnerGroup::new("acme", 1, &["A", "B"])]);
        assert_eq!(
            run_tally(&b, &ids(&["A", "B"]), &rules),
            Err(TallyError::Unsatisfiable { elected: 1, seats: 2 })
        );
    }

    #[test]
    fn rejects_bad_rules() {
        let c = ids(&["A", "B"]);
        assert_eq!(run_tally(&[], &c, &TallyRules::new(0)), Err(TallyError::NoSeats));
        assert_eq!(
            run_tally(&[], &c, &TallyRules::new(3)),
            Err(TallyError::TooManySeats { seats: 3, candidates: 2 })
        );
        assert_eq!(
            run_tally(&[], &ids(&["A", "A"]), &TallyRules::new(1)),
            Err(TallyError::DuplicateCandidate { candidate: CandidateId::from("A") })
        );
        let rules = TallyRules::with_groups(1, &[WinnerGroup::new("g", 2, &["A"])]);
        assert_eq!(
            run_tally(&[], &c, &rules),
            Err(TallyError::GroupCapTooLarge { group: "g".to_string(), cap: 2, seats: 1 })
        );
    }

    #[test]
    fn no_ballots_still_fills_the_seats() {
        let res = run_tally(&[], &ids(&["A", "B"]), &TallyRules::new(1)).unwrap();
        assert_eq!(res.valid_ballots, 0);
        assert_eq!(res.elected, ids(&["B"]));
    }

    #[test]
    fn ignores_unknown_and_repeated_choices() {
        let b = ballots(&[(2, &["Z", "A", "A"]), (1, &["Z"]), (1, &["B"])]);
        let res = run_tally(&b, &ids(&["A", "B"]), &TallyRules::new(1)).unwrap();
        assert_eq!(res.valid_ballots, 3);
        assert_eq!(res.elected, ids(&["A"]));
    }

    #[test]
    fn exclusion_ties_compare_transferred_value() {
        init();
        // X receives 4 ballots at 0.25 and Y 2 ballots at 0.5: the same value.
        let b = ballots(&[
            (4, &["A", "X"]),
            (2, &["B", "Y"]),
            (4, &["B"]),
            (2, &["F"]),
            (2, &["G"]),
        ]);
        let res = run_tally(&b, &ids(&["A", "B", "F", "G", "X", "Y"]), &TallyRules::new(4)).unwrap();
        assert_eq!(res.quota, 3);

        let r1 = &res.rounds[0];
        assert_eq!(r1.elected, ids(&["B", "A"]));
        assert_eq!(r1.surpluses[0].transfers.get(&CandidateId::from("Y")), Some(&dec("1")));
        assert_eq!(r1.surpluses[1].transfers.get(&CandidateId::from("X")), Some(&dec("1")));

        let r2 = &res.rounds[1];
        assert_eq!(r2.tally.get(&CandidateId::from("X")), Some(&dec("1")));
        assert_eq!(r2.tally.get(&CandidateId::from("Y")), Some(&dec("1")));
        assert_eq!(
            r2.eliminated.as_ref().map(|e| e.candidate.clone()),
            Some(CandidateId::from("X"))
        );
        assert_eq!(res.elected, ids(&["B", "A", "F", "G"]));
    }

    #[test]
    fn result_does_not_depend_on_ballot_order() {
        init();
        let mut b = ballots(&[
            (7, &["A", "B", "C"]),
            (5, &["B", "A"]),
            (4, &["C", "D", "A"]),
            (3, &["D", "C"]),
            (2, &["E", "D", "B"]),
        ]);
        let c = ids(&["A", "B", "C", "D", "E"]);
        let rules = TallyRules::with_groups(2, &[WinnerGroup::new("g", 1, &["A", "B"])]);
        let first = run_tally(&b, &c, &rules).unwrap();
        b.reverse();
        let second = run_tally(&b, &c, &rules).unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
