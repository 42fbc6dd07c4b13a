// ********* The ballot ledger service ***********

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use snafu::{ensure, ResultExt};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, TryLockError};
use std::time::{Duration, Instant};

use crate::audit::{AuditEvent, AuditEventKind, AuditLog, QuorumStatus};
use crate::canonical::{canonicalize, decode};
use crate::chain::{
    ballot_hash, chain_hash, genesis_hash, verify_chain, HashDigest, LedgerEntry, Nonce,
};
use crate::clock::Clock;
use crate::config::{LedgerSettings, TallyBallot, TallyResult, TallyRules};
use crate::directory::Directory;
use crate::election::{
    CandidateId, Election, ElectionDefinition, ElectionId, ElectionProblem, ElectionStatus,
    VoterId, WinnerGroup,
};
use crate::eligibility::{self, Ineligibility};
use crate::error::*;
use crate::export::{BallotsExport, ExportedBallot};
use crate::receipt::{verify_receipt, Receipt, ReceiptStatus};
use crate::store::{AdmissionRecord, LedgerStore};

// The position of the single writer in a chain.
#[derive(Debug)]
struct Cursor {
    // False until read from the store, and again after a failed append or a
    // panic while holding the lock.
    synced: bool,
    sequence: u64,
    head: HashDigest,
}

struct ElectionSlot {
    genesis: HashDigest,
    state: RwLock<ElectionDefinition>,
    cursor: Mutex<Cursor>,
    tally_gate: Mutex<()>,
    audit: Mutex<AuditLog>,
}

/// Outcome of one `Ledger::advance` pass.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub struct AdvanceReport {
    pub closed: usize,
    pub tallied: usize,
    pub failed: usize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn lock_cursor(m: &Mutex<Cursor>) -> MutexGuard<'_, Cursor> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            let mut g = poisoned.into_inner();
            g.synced = false;
            g
        }
    }
}

/// The ballot ledger: admission, the per-election hash chains and the count.
///
/// Any number of threads may share one ledger. Appends to one election are
/// serialized; different elections never wait on each other.
///
/// ```
/// use ballot_ledger::*;
/// use chrono::{Duration, Utc};
/// use std::sync::Arc;
///
/// let now = Utc::now();
/// let mut directory = StaticDirectory::new();
/// directory.add_member("members", "vera", now - Duration::days(1), None);
/// directory.set_candidates(
///     &ElectionId::from("board"),
///     vec![Candidate::new("ann", "ann"), Candidate::new("ben", "ben")],
/// );
/// let ledger = Ledger::new(
///     Arc::new(MemStore::new()),
///     Arc::new(directory),
///     Arc::new(SystemClock),
///     LedgerSettings::DEFAULT,
/// );
/// let election = Election::new("board", "Board", now, now + Duration::days(1), 1, "members");
/// ledger.register(election, vec![])?;
/// ledger.schedule(&ElectionId::from("board"))?;
///
/// let receipt = ledger.submit(
///     &ElectionId::from("board"),
///     &VoterId::from("vera"),
///     &[CandidateId::from("ben")],
///     Nonce::generate(),
/// )?;
/// assert_eq!(
///     ledger.verify_receipt(&ElectionId::from("board"), &receipt)?,
///     ReceiptStatus::Valid
/// );
/// let result = ledger.close_and_tally(&ElectionId::from("board"))?;
/// assert_eq!(result.elected, vec![CandidateId::from("ben")]);
/// # Ok::<(), LedgerError>(())
/// ```
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    directory: Arc<dyn Directory>,
    clock: Arc<dyn Clock>,
    settings: LedgerSettings,
    slots: RwLock<BTreeMap<ElectionId, Arc<ElectionSlot>>>,
}

impl Ledger {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        directory: Arc<dyn Directory>,
        clock: Arc<dyn Clock>,
        settings: LedgerSettings,
    ) -> Ledger {
        Ledger {
            store,
            directory,
            clock,
            settings,
            slots: RwLock::new(BTreeMap::new()),
        }
    }

    fn slot(&self, election: &ElectionId) -> Result<Arc<ElectionSlot>, LedgerError> {
        self.slots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(election)
            .cloned()
            .ok_or_else(|| LedgerError::UnknownElection {
                election: election.clone(),
            })
    }

    fn definition(&self, slot: &ElectionSlot) -> ElectionDefinition {
        slot.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, slot: &ElectionSlot, public: bool, kind: AuditEventKind) {
        lock(&slot.audit).record(self.clock.now(), public, kind);
    }

    // ******** Life cycle *********

    /// Adds an election in `draft` state. Candidates are taken from the
    /// directory when the election is scheduled.
    pub fn register(&self, election: Election, groups: Vec<WinnerGroup>) -> Result<(), LedgerError> {
        let id = election.id.clone();
        ensure!(
            election.status == ElectionStatus::Draft,
            InvalidTransitionSnafu {
                election: id.clone(),
                status: election.status,
                action: "register",
            }
        );
        ensure!(
            !id.as_str().is_empty(),
            InvalidElectionSnafu {
                election: id.clone(),
                problem: ElectionProblem::EmptyId,
            }
        );
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        self.store.create_election(&id).context(StorageSnafu)?;
        let genesis = genesis_hash(&id);
        let slot = ElectionSlot {
            genesis: genesis.clone(),
            state: RwLock::new(ElectionDefinition {
                election,
                candidates: Vec::new(),
                groups,
            }),
            cursor: Mutex::new(Cursor {
                synced: true,
                sequence: 0,
                head: genesis,
            }),
            tally_gate: Mutex::new(()),
            audit: Mutex::new(AuditLog::default()),
        };
        slots.insert(id.clone(), Arc::new(slot));
        info!("register: election {} registered", id);
        Ok(())
    }

    /// Snapshots the candidates from the directory and leaves `draft`.
    pub fn schedule(&self, election: &ElectionId) -> Result<(), LedgerError> {
        let slot = self.slot(election)?;
        let candidates = self
            .directory
            .candidates_of(election)
            .context(DirectorySnafu)?;
        let mut state = slot.state.write().unwrap_or_else(|e| e.into_inner());
        ensure!(
            state.election.status == ElectionStatus::Draft,
            InvalidTransitionSnafu {
                election: election.clone(),
                status: state.election.status,
                action: "schedule",
            }
        );
        let mut next = state.clone();
        next.candidates = candidates;
        next.election.status = ElectionStatus::Scheduled;
        next.validate().map_err(|problem| LedgerError::InvalidElection {
            election: election.clone(),
            problem,
        })?;
        let ids = next.candidate_ids();
        *state = next;
        drop(state);
        info!("schedule: election {} scheduled with {} candidates", election, ids.len());
        self.record(&slot, true, AuditEventKind::ElectionScheduled { candidates: ids });
        Ok(())
    }

    /// The status of the election at the current time.
    pub fn status(&self, election: &ElectionId) -> Result<ElectionStatus, LedgerError> {
        let slot = self.slot(election)?;
        let now = self.clock.now();
        let state = slot.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state.election.status_at(now))
    }

    pub fn election(&self, election: &ElectionId) -> Result<ElectionDefinition, LedgerError> {
        let slot = self.slot(election)?;
        Ok(self.definition(&slot))
    }

    /// Organizer close. Seals the chain: no ballot is accepted afterwards.
    pub fn close(&self, election: &ElectionId) -> Result<HashDigest, LedgerError> {
        let slot = self.slot(election)?;
        let now = self.clock.now();
        let (stored, effective) = {
            let state = slot.state.read().unwrap_or_else(|e| e.into_inner());
            (state.election.status, state.election.status_at(now))
        };
        let sealable = matches!(stored, ElectionStatus::Scheduled | ElectionStatus::Open)
            && matches!(effective, ElectionStatus::Open | ElectionStatus::Closed);
        ensure!(
            sealable,
            InvalidTransitionSnafu {
                election: election.clone(),
                status: effective,
                action: "close",
            }
        );
        self.seal(&slot, election)
    }

    // Takes the append cursor so that no submission can slip in after the
    // status flips. Returns the final chain head.
    fn seal(&self, slot: &ElectionSlot, election: &ElectionId) -> Result<HashDigest, LedgerError> {
        let mut cursor = lock_cursor(&slot.cursor);
        self.sync_cursor(slot, election, &mut cursor)?;
        let now = self.clock.now();
        {
            let mut state = slot.state.write().unwrap_or_else(|e| e.into_inner());
            if state.election.status == ElectionStatus::Closed
                || state.election.status == ElectionStatus::Tallied
            {
                return Ok(cursor.head.clone());
            }
            state.election.status = ElectionStatus::Closed;
            if now < state.election.closes_at {
                state.election.closes_at = now;
            }
        }
        info!(
            "close: election {} closed with {} ballots, chain head {}",
            election, cursor.sequence, cursor.head
        );
        self.record(
            slot,
            true,
            AuditEventKind::ElectionClosed {
                chain_head: cursor.head.clone(),
            },
        );
        Ok(cursor.head.clone())
    }

    /// Moves the closing time of an open election further out.
    pub fn extend_closing(
        &self,
        election: &ElectionId,
        closes_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let slot = self.slot(election)?;
        let now = self.clock.now();
        let mut state = slot.state.write().unwrap_or_else(|e| e.into_inner());
        let effective = state.election.status_at(now);
        ensure!(
            effective == ElectionStatus::Open,
            InvalidTransitionSnafu {
                election: election.clone(),
                status: effective,
                action: "extend",
            }
        );
        let previous = state.election.closes_at;
        ensure!(
            closes_at > previous && closes_at > now,
            InvalidClosingTimeSnafu {
                election: election.clone(),
            }
        );
        state.election.closes_at = closes_at;
        drop(state);
        info!("extend_closing: election {} now closes at {}", election, closes_at);
        self.record(
            &slot,
            true,
            AuditEventKind::ElectionEndExtended {
                previous_closes_at: previous,
                closes_at,
            },
        );
        Ok(())
    }

    /// Applies the transitions that are due: elections past their closing time
    /// are closed, and closed elections are tallied.
    pub fn advance(&self) -> AdvanceReport {
        let slots: Vec<(ElectionId, Arc<ElectionSlot>)> = self
            .slots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let now = self.clock.now();
        let mut report = AdvanceReport::default();
        for (id, slot) in slots.iter() {
            let (stored, effective) = {
                let state = slot.state.read().unwrap_or_else(|e| e.into_inner());
                (state.election.status, state.election.status_at(now))
            };
            if stored != effective && effective == ElectionStatus::Open {
                let mut state = slot.state.write().unwrap_or_else(|e| e.into_inner());
                if state.election.status == stored {
                    state.election.status = ElectionStatus::Open;
                    info!("advance: election {} is open", id);
                }
            }
            if matches!(stored, ElectionStatus::Scheduled | ElectionStatus::Open)
                && effective == ElectionStatus::Closed
            {
                match self.seal(slot, id) {
                    Ok(_) => report.closed += 1,
                    Err(e) => {
                        warn!("advance: failed to close {}: {}", id, e);
                        report.failed += 1;
                        continue;
                    }
                }
            }
            let closed = slot.state.read().unwrap_or_else(|e| e.into_inner()).election.status
                == ElectionStatus::Closed;
            if closed {
                match self.tally(id) {
                    Ok(_) => report.tallied += 1,
                    Err(LedgerError::AlreadyTallied { .. }) => {}
                    Err(e) => {
                        warn!("advance: failed to tally {}: {}", id, e);
                        report.failed += 1;
                    }
                }
            }
        }
        debug!("advance: {:?}", report);
        report
    }

    // ******** Submission *********

    /// Read-only eligibility check, as `submit` would do it.
    pub fn check_eligibility(&self, election: &ElectionId, voter: &VoterId) -> Result<(), LedgerError> {
        let slot = self.slot(election)?;
        let def = self.definition(&slot);
        self.check_voter(&def, voter)
    }

    fn check_voter(&self, def: &ElectionDefinition, voter: &VoterId) -> Result<(), LedgerError> {
        let election = &def.election.id;
        match eligibility::check(&def.election, self.directory.as_ref(), voter, self.clock.now()) {
            Ok(()) => Ok(()),
            Err(Ineligibility::ElectionNotOpen(status)) => Err(LedgerError::ElectionNotOpen {
                election: election.clone(),
                status,
            }),
            Err(Ineligibility::NotAMember) => Err(LedgerError::NotEligible {
                election: election.clone(),
            }),
            Err(Ineligibility::DirectoryUnavailable(source)) => {
                Err(LedgerError::Directory { source })
            }
        }
    }

    /// Casts a ballot. Waits at most the configured submit timeout for the
    /// election's append slot.
    pub fn submit(
        &self,
        election: &ElectionId,
        voter: &VoterId,
        ranking: &[CandidateId],
        nonce: Nonce,
    ) -> Result<Receipt, LedgerError> {
        self.submit_within(election, voter, ranking, nonce, self.settings.submit_timeout)
    }

    /// Casts a ballot, giving up with `Timeout` if the append slot cannot be
    /// taken within `timeout`. Nothing is written on any error.
    pub fn submit_within(
        &self,
        election: &ElectionId,
        voter: &VoterId,
        ranking: &[CandidateId],
        nonce: Nonce,
        timeout: Duration,
    ) -> Result<Receipt, LedgerError> {
        let res = self.submit_internal(election, voter, ranking, nonce, timeout);
        if let Err(e) = &res {
            warn!("submit: rejected in {}: {}", election, e);
        }
        res
    }

    fn submit_internal(
        &self,
        election: &ElectionId,
        voter: &VoterId,
        ranking: &[CandidateId],
        nonce: Nonce,
        timeout: Duration,
    ) -> Result<Receipt, LedgerError> {
        let started = Instant::now();
        let slot = self.slot(election)?;
        let def = self.definition(&slot);
        self.check_voter(&def, voter)?;
        eligibility::validate_ranking(&def, ranking)
            .map_err(|problem| LedgerError::InvalidRanking { problem })?;
        let canonical =
            canonicalize(ranking).map_err(|problem| LedgerError::InvalidRanking { problem })?;
        ensure!(
            nonce.byte_len() >= self.settings.min_nonce_bytes,
            InvalidNonceSnafu {
                min_bytes: self.settings.min_nonce_bytes,
            }
        );
        let admission = AdmissionRecord {
            election: election.clone(),
            voter: voter.clone(),
        };
        ensure!(
            !self.store.has_admission(&admission).context(StorageSnafu)?,
            AlreadyVotedSnafu {
                election: election.clone(),
            }
        );
        let bh = ballot_hash(election, &canonical, &nonce);

        let mut cursor = self.acquire_cursor(&slot, election, started, timeout)?;
        // The election may have been closed while we were waiting.
        {
            let state = slot.state.read().unwrap_or_else(|e| e.into_inner());
            let status = state.election.status_at(self.clock.now());
            ensure!(
                status == ElectionStatus::Open,
                ElectionNotOpenSnafu {
                    election: election.clone(),
                    status,
                }
            );
        }
        self.sync_cursor(&slot, election, &mut cursor)?;
        let previous = cursor.head.clone();
        let ch = chain_hash(&previous, &bh);
        let entry = LedgerEntry {
            sequence: cursor.sequence + 1,
            previous_chain_hash: previous.clone(),
            ballot_hash: bh.clone(),
            chain_hash: ch.clone(),
            ranking: canonical,
        };
        let expected_tail = if cursor.sequence == 0 {
            None
        } else {
            Some(&previous)
        };
        match self.store.append(election, expected_tail, &admission, entry) {
            Ok(()) => {}
            Err(StoreError::AdmissionExists { .. }) => {
                return Err(LedgerError::AlreadyVoted {
                    election: election.clone(),
                });
            }
            Err(source) => {
                cursor.synced = false;
                return Err(LedgerError::Storage { source });
            }
        }
        cursor.sequence += 1;
        cursor.head = ch.clone();
        info!("submit: election {} committed entry {}", election, cursor.sequence);
        self.record(
            &slot,
            false,
            AuditEventKind::BallotSubmitted {
                ballot_hash: bh.clone(),
            },
        );
        drop(cursor);

        self.check_quorum(&slot, &def.election);
        Ok(Receipt {
            ballot_hash: bh,
            nonce,
            previous_chain_hash: previous,
            chain_hash: ch,
        })
    }

    fn acquire_cursor<'a>(
        &self,
        slot: &'a ElectionSlot,
        election: &ElectionId,
        started: Instant,
        timeout: Duration,
    ) -> Result<MutexGuard<'a, Cursor>, LedgerError> {
        let deadline = started + timeout;
        loop {
            match slot.cursor.try_lock() {
                Ok(g) => return Ok(g),
                Err(TryLockError::Poisoned(poisoned)) => {
                    let mut g = poisoned.into_inner();
                    g.synced = false;
                    return Ok(g);
                }
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(LedgerError::Timeout {
                            election: election.clone(),
                            waited: started.elapsed(),
                        });
                    }
                    std::thread::sleep(Duration::from_micros(200));
                }
            }
        }
    }

    fn sync_cursor(
        &self,
        slot: &ElectionSlot,
        election: &ElectionId,
        cursor: &mut Cursor,
    ) -> Result<(), LedgerError> {
        if cursor.synced {
            return Ok(());
        }
        match self.store.tail(election).context(StorageSnafu)? {
            Some(tail) => {
                cursor.sequence = tail.sequence;
                cursor.head = tail.chain_hash;
            }
            None => {
                cursor.sequence = 0;
                cursor.head = slot.genesis.clone();
            }
        }
        cursor.synced = true;
        debug!("sync_cursor: {} at entry {}", election, cursor.sequence);
        Ok(())
    }

    fn check_quorum(&self, slot: &ElectionSlot, election: &Election) {
        if election.quorum_percent == 0 {
            return;
        }
        let mut audit = lock(&slot.audit);
        if audit.has_quorum_event() {
            return;
        }
        match self.compute_quorum(election) {
            Ok(status) if status.quorum_met => {
                info!(
                    "submit: election {} reached quorum ({} of {})",
                    election.id,
                    status.participating_voter_count,
                    status.eligible_voter_count
                );
                audit.record(self.clock.now(), true, AuditEventKind::QuorumReached { status });
            }
            Ok(_) => {}
            Err(e) => warn!("submit: quorum of {} not computed: {}", election.id, e),
        }
    }

    fn compute_quorum(&self, election: &Election) -> Result<QuorumStatus, LedgerError> {
        let eligible = self
            .directory
            .members_of(&election.eligible_group, election.opens_at)
            .context(DirectorySnafu)?
            .len() as u64;
        let participating = self.store.admission_count(&election.id).context(StorageSnafu)?;
        Ok(QuorumStatus::compute(election.quorum_percent, eligible, participating))
    }

    pub fn quorum_status(&self, election: &ElectionId) -> Result<QuorumStatus, LedgerError> {
        let slot = self.slot(election)?;
        let def = self.definition(&slot);
        self.compute_quorum(&def.election)
    }

    // ******** Verification and exports *********

    pub fn verify_receipt(
        &self,
        election: &ElectionId,
        receipt: &Receipt,
    ) -> Result<ReceiptStatus, LedgerError> {
        let slot = self.slot(election)?;
        let stored = self
            .store
            .entry_by_chain_hash(election, &receipt.chain_hash)
            .context(StorageSnafu)?;
        let status = verify_receipt(election, receipt, stored.as_ref());
        if status == ReceiptStatus::Tampered {
            self.record(
                &slot,
                false,
                AuditEventKind::IntegrityAlarm {
                    detail: format!("receipt for entry {} does not verify", receipt.chain_hash),
                },
            );
        }
        Ok(status)
    }

    /// Recomputes every link of the chain. Returns the head.
    pub fn audit_chain(&self, election: &ElectionId) -> Result<HashDigest, LedgerError> {
        let slot = self.slot(election)?;
        let entries = self.store.entries(election).context(StorageSnafu)?;
        match verify_chain(&slot.genesis, &entries) {
            Ok(head) => Ok(head),
            Err(fault) => {
                error!(
                    "audit_chain: chain of {} BROKEN at entry {}: {}",
                    election, fault.sequence, fault.kind
                );
                self.record(
                    &slot,
                    false,
                    AuditEventKind::IntegrityAlarm {
                        detail: format!("chain broken at entry {}: {}", fault.sequence, fault.kind),
                    },
                );
                Err(LedgerError::ChainBroken {
                    election: election.clone(),
                    sequence: fault.sequence,
                    fault: fault.kind,
                })
            }
        }
    }

    pub fn chain_head(&self, election: &ElectionId) -> Result<HashDigest, LedgerError> {
        let slot = self.slot(election)?;
        Ok(match self.store.tail(election).context(StorageSnafu)? {
            Some(tail) => tail.chain_hash,
            None => slot.genesis.clone(),
        })
    }

    /// The public ballots export. Only available once voting has ended.
    pub fn export_ballots(&self, election: &ElectionId) -> Result<BallotsExport, LedgerError> {
        let slot = self.slot(election)?;
        let status = self.definition(&slot).election.status;
        ensure!(
            matches!(status, ElectionStatus::Closed | ElectionStatus::Tallied),
            NotClosedSnafu {
                election: election.clone(),
                status,
            }
        );
        let entries = self.store.entries(election).context(StorageSnafu)?;
        let mut ballots: Vec<ExportedBallot> = Vec::with_capacity(entries.len());
        for e in entries.iter() {
            let b = ExportedBallot::from_entry(e).map_err(|problem| LedgerError::CorruptEntry {
                election: election.clone(),
                sequence: e.sequence,
                problem,
            })?;
            ballots.push(b);
        }
        let chain_head = entries
            .last()
            .map(|e| e.chain_hash.clone())
            .unwrap_or_else(|| slot.genesis.clone());
        Ok(BallotsExport {
            election_id: election.clone(),
            genesis_hash: slot.genesis.clone(),
            chain_head,
            ballots,
        })
    }

    pub fn audit_log(&self, election: &ElectionId, public_only: bool) -> Result<Vec<AuditEvent>, LedgerError> {
        let slot = self.slot(election)?;
        let events = lock(&slot.audit).events(public_only);
        Ok(events)
    }

    // ******** Tally *********

    /// Counts a closed election. Only the first call succeeds; later calls get
    /// `AlreadyTallied`.
    pub fn tally(&self, election: &ElectionId) -> Result<TallyResult, LedgerError> {
        let slot = self.slot(election)?;
        let _gate = lock(&slot.tally_gate);
        let def = self.definition(&slot);
        let status = def.election.status;
        ensure!(
            status != ElectionStatus::Tallied,
            AlreadyTalliedSnafu {
                election: election.clone(),
            }
        );
        ensure!(
            status == ElectionStatus::Closed,
            NotClosedSnafu {
                election: election.clone(),
                status,
            }
        );
        if self.store.tally(election).context(StorageSnafu)?.is_some() {
            return Err(LedgerError::AlreadyTallied {
                election: election.clone(),
            });
        }
        self.audit_chain(election)?;
        let entries = self.store.entries(election).context(StorageSnafu)?;
        let mut ballots: Vec<TallyBallot> = Vec::with_capacity(entries.len());
        for e in entries.iter() {
            let ranking = decode(&e.ranking).map_err(|problem| {
                error!("tally: entry {} of {} is unreadable", e.sequence, election);
                LedgerError::CorruptEntry {
                    election: election.clone(),
                    sequence: e.sequence,
                    problem,
                }
            })?;
            ballots.push(TallyBallot { ranking });
        }
        let rules = TallyRules {
            seats: def.election.seats,
            groups: def.groups.clone(),
            decimal_places: self.settings.decimal_places,
        };
        let result = crate::run_tally(&ballots, &def.candidate_ids(), &rules).context(
            TallyFailedSnafu {
                election: election.clone(),
            },
        )?;
        match self.store.store_tally(election, &result) {
            Ok(()) => {}
            Err(StoreError::TallyExists { .. }) => {
                return Err(LedgerError::AlreadyTallied {
                    election: election.clone(),
                });
            }
            Err(source) => return Err(LedgerError::Storage { source }),
        }
        slot.state.write().unwrap_or_else(|e| e.into_inner()).election.status = ElectionStatus::Tallied;
        {
            let now = self.clock.now();
            let mut audit = lock(&slot.audit);
            for r in result.rounds.iter() {
                audit.record(now, true, AuditEventKind::TallyRound { round: r.clone() });
            }
            audit.record(
                now,
                true,
                AuditEventKind::TallyCompleted {
                    quota: result.quota,
                    elected: result.elected.clone(),
                },
            );
        }
        info!(
            "tally: election {} tallied, elected {:?}",
            election, result.elected
        );
        Ok(result)
    }

    /// Closes the election if needed and counts it. Once counted, the stored
    /// result is returned.
    pub fn close_and_tally(&self, election: &ElectionId) -> Result<TallyResult, LedgerError> {
        let slot = self.slot(election)?;
        if let Some(result) = self.store.tally(election).context(StorageSnafu)? {
            return Ok(result);
        }
        let stored = self.definition(&slot).election.status;
        if matches!(stored, ElectionStatus::Scheduled | ElectionStatus::Open) {
            self.close(election)?;
        }
        match self.tally(election) {
            Err(LedgerError::AlreadyTallied { .. }) => self
                .store
                .tally(election)
                .context(StorageSnafu)?
                .ok_or_else(|| LedgerError::AlreadyTallied {
                    election: election.clone(),
                }),
            res => res,
        }
    }

    pub fn tally_result(&self, election: &ElectionId) -> Result<Option<TallyResult>, LedgerError> {
        self.slot(election)?;
        self.store.tally(election).context(StorageSnafu)
    }
}
