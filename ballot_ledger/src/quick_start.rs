/*!

# Quick start with `ballotctl`

This example runs an election end to end without any server: `ballotctl`
drives an in-memory ledger, lets a few hundred voters cast their ballots from
several threads at once, closes the election and counts it.

```bash
ballotctl simulate --voters 300 --candidates 5 --seats 2 --seed 42 --out sim
```

The rankings of the voters are drawn from the seed, so the same seed always
gives the same winners. The nonces are fresh for every run, so the ballot
hashes and the chain head change every time.

After running this command, the `sim` directory holds three files:
- `ballots.json` the public ballots export: every ranking with its ballot hash and chain links, and no voter names
- `contest.json` the configuration needed to count the export again
- `summary.json` the outcome of the count, round by round

**Auditing the export** Anybody holding the export can check that the chain is
complete and unaltered:

```bash
ballotctl verify-chain --ballots sim/ballots.json
```

```text
chain of simulated-election is intact: 300 ballots, head 5d0c...
```

**Recounting** The count can be redone from the export alone and compared with
the published summary. Any difference is printed line by line and the command
fails:

```bash
ballotctl tally --config sim/contest.json --reference sim/summary.json --out stdout
```

With `--verbose`, the log shows every round:

```text
[2026-10-18T09:55:59Z INFO  ballot_ledger] run_tally: processing 300 ballots, 5 candidates, 2 seats
[2026-10-18T09:55:59Z DEBUG ballot_ledger] run_tally: round 1 quota 101 tally {...}
```

**Checking a receipt** A voter who kept a receipt checks it against the export:

```bash
ballotctl verify-receipt --ballots sim/ballots.json \
    --ballot-hash .. --nonce .. --previous-chain-hash .. --chain-hash ..
```

The answer is `valid`, `not found`, `tampered` or `nonce mismatch`. See the
[manual](../manual/index.html#receipts) for what each of them means.

# Quick start with the library

The same flow, written against the crate:

```
use ballot_ledger::*;
use chrono::{Duration, Utc};
use std::sync::Arc;

let now = Utc::now();
let eid = ElectionId::from("committee");
let mut directory = StaticDirectory::new();
for v in ["ada", "bea", "cyd"] {
    directory.add_member("members", v, now - Duration::days(7), None);
}
directory.set_candidates(
    &eid,
    vec![Candidate::new("ann", "ann"), Candidate::new("ben", "ben")],
);
let clock = Arc::new(ManualClock::new(now));
let ledger = Ledger::new(
    Arc::new(MemStore::new()),
    Arc::new(directory),
    clock.clone(),
    LedgerSettings::DEFAULT,
);
ledger.register(
    Election::new("committee", "Committee", now, now + Duration::hours(2), 1, "members"),
    vec![],
)?;
ledger.schedule(&eid)?;

let ballots = [("ada", "ann"), ("bea", "ben"), ("cyd", "ben")];
for (voter, choice) in ballots {
    ledger.submit(&eid, &VoterId::from(voter), &[CandidateId::from(choice)], Nonce::generate())?;
}

clock.advance(Duration::hours(2));
let report = ledger.advance();
assert_eq!(report.tallied, 1);

let export = ledger.export_ballots(&eid)?;
assert_eq!(export.verify(), Ok(ledger.chain_head(&eid)?));
let result = ledger.tally_result(&eid)?.unwrap();
assert_eq!(result.elected, vec![CandidateId::from("ben")]);
# Ok::<(), LedgerError>(())
```

*/
