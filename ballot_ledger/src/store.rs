// ********* Storage collaborator ***********

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::chain::{HashDigest, LedgerEntry};
use crate::config::TallyResult;
use crate::election::{ElectionId, VoterId};
use crate::error::StoreError;

/// The fact that a voter took part in an election. It never says how.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AdmissionRecord {
    pub election: ElectionId,
    pub voter: VoterId,
}

/// Durable storage for the chains, the admission records and the tally
/// results.
///
/// Implementations must make `append` atomic: either the admission record and
/// the entry are both stored, or neither is.
pub trait LedgerStore: Send + Sync {
    /// Creates the (empty) tables of an election.
    fn create_election(&self, election: &ElectionId) -> Result<(), StoreError>;

    /// The last entry of the chain, if any.
    fn tail(&self, election: &ElectionId) -> Result<Option<LedgerEntry>, StoreError>;

    /// Appends an entry together with its admission record.
    ///
    /// Fails with `TailMismatch` unless the current tail chain hash is
    /// `expected_tail` (`None` for an empty chain), and with `AdmissionExists`
    /// if the voter was already admitted.
    fn append(
        &self,
        election: &ElectionId,
        expected_tail: Option<&HashDigest>,
        admission: &AdmissionRecord,
        entry: LedgerEntry,
    ) -> Result<(), StoreError>;

    fn has_admission(&self, admission: &AdmissionRecord) -> Result<bool, StoreError>;

    fn admission_count(&self, election: &ElectionId) -> Result<u64, StoreError>;

    fn entry_by_chain_hash(
        &self,
        election: &ElectionId,
        chain_hash: &HashDigest,
    ) -> Result<Option<LedgerEntry>, StoreError>;

    /// The whole chain, in sequence order.
    fn entries(&self, election: &ElectionId) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Stores the tally result. Fails with `TallyExists` if one is present.
    fn store_tally(&self, election: &ElectionId, result: &TallyResult) -> Result<(), StoreError>;

    fn tally(&self, election: &ElectionId) -> Result<Option<TallyResult>, StoreError>;
}

#[derive(Default, Debug)]
struct ElectionTable {
    entries: Vec<LedgerEntry>,
    by_chain_hash: HashMap<HashDigest, usize>,
    admissions: BTreeSet<VoterId>,
    tally: Option<TallyResult>,
}

/// A store kept in memory. Each election has its own lock.
#[derive(Default, Debug)]
pub struct MemStore {
    tables: RwLock<BTreeMap<ElectionId, Arc<RwLock<ElectionTable>>>>,
    #[cfg(test)]
    unavailable: std::sync::atomic::AtomicBool,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl MemStore {
    pub fn new() -> MemStore {
        MemStore::default()
    }

    fn table(&self, election: &ElectionId) -> Result<Arc<RwLock<ElectionTable>>, StoreError> {
        self.check_available()?;
        read(&self.tables)
            .get(election)
            .cloned()
            .ok_or_else(|| StoreError::NoSuchElection {
                election: election.clone(),
            })
    }

    #[cfg(not(test))]
    fn check_available(&self) -> Result<(), StoreError> {
        Ok(())
    }

    #[cfg(test)]
    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                message: "store switched off".to_string(),
            });
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn set_unavailable(&self, unavailable: bool) {
        self.unavailable
            .store(unavailable, std::sync::atomic::Ordering::SeqCst);
    }

    /// Overwrites the ballot hash of a stored entry.
    #[cfg(test)]
    pub(crate) fn tamper_ballot_hash(&self, election: &ElectionId, sequence: u64, value: HashDigest) {
        let table = self.table(election).unwrap();
        let mut t = write(&table);
        t.entries[sequence as usize - 1].ballot_hash = value;
    }

    /// Overwrites the ranking bytes of a stored entry.
    #[cfg(test)]
    pub(crate) fn tamper_ranking(&self, election: &ElectionId, sequence: u64, value: Vec<u8>) {
        let table = self.table(election).unwrap();
        let mut t = write(&table);
        t.entries[sequence as usize - 1].ranking = value;
    }
}

impl LedgerStore for MemStore {
    fn create_election(&self, election: &ElectionId) -> Result<(), StoreError> {
        let mut tables = write(&self.tables);
        if tables.contains_key(election) {
            return Err(StoreError::ElectionExists {
                election: election.clone(),
            });
        }
        tables.insert(election.clone(), Arc::new(RwLock::new(ElectionTable::default())));
        Ok(())
    }

    fn tail(&self, election: &ElectionId) -> Result<Option<LedgerEntry>, StoreError> {
        let table = self.table(election)?;
        let t = read(&table);
        Ok(t.entries.last().cloned())
    }

    fn append(
        &self,
        election: &ElectionId,
        expected_tail: Option<&HashDigest>,
        admission: &AdmissionRecord,
        entry: LedgerEntry,
    ) -> Result<(), StoreError> {
        let table = self.table(election)?;
        let mut t = write(&table);
        if t.admissions.contains(&admission.voter) {
            return Err(StoreError::AdmissionExists {
                election: election.clone(),
            });
        }
        let actual = t.entries.last().map(|e| &e.chain_hash);
        if actual != expected_tail {
            return Err(StoreError::TailMismatch {
                election: election.clone(),
                expected: expected_tail
                    .cloned()
                    .unwrap_or_else(|| HashDigest(String::new())),
                actual: actual.cloned().unwrap_or_else(|| HashDigest(String::new())),
            });
        }
        let idx = t.entries.len();
        t.by_chain_hash.insert(entry.chain_hash.clone(), idx);
        t.admissions.insert(admission.voter.clone());
        debug!("append: {} entry {}", election, entry.sequence);
        t.entries.push(entry);
        Ok(())
    }

    fn has_admission(&self, admission: &AdmissionRecord) -> Result<bool, StoreError> {
        let table = self.table(&admission.election)?;
        let t = read(&table);
        Ok(t.admissions.contains(&admission.voter))
    }

    fn admission_count(&self, election: &ElectionId) -> Result<u64, StoreError> {
        let table = self.table(election)?;
        let t = read(&table);
        Ok(t.admissions.len() as u64)
    }

    fn entry_by_chain_hash(
        &self,
        election: &ElectionId,
        chain_hash: &HashDigest,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        let table = self.table(election)?;
        let t = read(&table);
        Ok(t.by_chain_hash.get(chain_hash).map(|idx| t.entries[*idx].clone()))
    }

    fn entries(&self, election: &ElectionId) -> Result<Vec<LedgerEntry>, StoreError> {
        let table = self.table(election)?;
        let t = read(&table);
        Ok(t.entries.clone())
    }

    fn store_tally(&self, election: &ElectionId, result: &TallyResult) -> Result<(), StoreError> {
        let table = self.table(election)?;
        let mut t = write(&table);
        if t.tally.is_some() {
            return Err(StoreError::TallyExists {
                election: election.clone(),
            });
        }
        t.tally = Some(result.clone());
        Ok(())
    }

    fn tally(&self, election: &ElectionId) -> Result<Option<TallyResult>, StoreError> {
        let table = self.table(election)?;
        let t = read(&table);
        Ok(t.tally.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ballot_hash, chain_hash, genesis_hash, Nonce};

    fn entry(eid: &ElectionId, prev: &HashDigest, sequence: u64) -> LedgerEntry {
        let ranking = vec![0, 0, 0, 1, 0, 0, 0, 1, b'x'];
        let bh = ballot_hash(eid, &ranking, &Nonce::generate());
        LedgerEntry {
            sequence,
            previous_chain_hash: prev.clone(),
            chain_hash: chain_hash(prev, &bh),
            ballot_hash: bh,
            ranking,
        }
    }

    fn admission(eid: &ElectionId, voter: &str) -> AdmissionRecord {
        AdmissionRecord {
            election: eid.clone(),
            voter: VoterId::from(voter),
        }
    }

    #[test]
    fn append_checks_tail_and_admission() {
        let store = MemStore::new();
        let eid = ElectionId::from("e");
        store.create_election(&eid).unwrap();
        let first = entry(&eid, &genesis_hash(&eid), 1);
        store.append(&eid, None, &admission(&eid, "v1"), first.clone()).unwrap();

        // Stale view of the tail.
        let second = entry(&eid, &genesis_hash(&eid), 2);
        assert!(matches!(
            store.append(&eid, None, &admission(&eid, "v2"), second),
            Err(StoreError::TailMismatch { .. })
        ));
        // Same voter again.
        let second = entry(&eid, &first.chain_hash, 2);
        assert_eq!(
            store.append(&eid, Some(&first.chain_hash), &admission(&eid, "v1"), second.clone()),
            Err(StoreError::AdmissionExists { election: eid.clone() })
        );
        // Nothing from the failed calls was kept.
        assert_eq!(store.entries(&eid).unwrap(), vec![first.clone()]);
        assert_eq!(store.admission_count(&eid).unwrap(), 1);
        assert!(!store.has_admission(&admission(&eid, "v2")).unwrap());

        store
            .append(&eid, Some(&first.chain_hash), &admission(&eid, "v2"), second.clone())
            .unwrap();
        assert_eq!(store.tail(&eid).unwrap(), Some(second.clone()));
        assert_eq!(
            store.entry_by_chain_hash(&eid, &second.chain_hash).unwrap(),
            Some(second)
        );
    }

    #[test]
    fn elections_are_separate() {
        let store = MemStore::new();
        let a = ElectionId::from("a");
        let b = ElectionId::from("b");
        store.create_election(&a).unwrap();
        store.create_election(&b).unwrap();
        assert_eq!(
            store.create_election(&a),
            Err(StoreError::ElectionExists { election: a.clone() })
        );
        store
            .append(&a, None, &admission(&a, "v"), entry(&a, &genesis_hash(&a), 1))
            .unwrap();
        assert_eq!(store.admission_count(&b).unwrap(), 0);
        assert!(store.tail(&b).unwrap().is_none());
        assert_eq!(
            store.tail(&ElectionId::from("c")),
            Err(StoreError::NoSuchElection { election: ElectionId::from("c") })
        );
    }

    #[test]
    fn tally_is_stored_once() {
        let store = MemStore::new();
        let eid = ElectionId::from("e");
        store.create_election(&eid).unwrap();
        let result = TallyResult {
            seats: 1,
            quota: 1,
            valid_ballots: 0,
            elected: vec![],
            rounds: vec![],
        };
        store.store_tally(&eid, &result).unwrap();
        assert_eq!(
            store.store_tally(&eid, &result),
            Err(StoreError::TallyExists { election: eid.clone() })
        );
        assert_eq!(store.tally(&eid).unwrap(), Some(result));
    }
}
