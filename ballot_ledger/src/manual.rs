/*!

This is the long-form manual for `ballot_ledger` and `ballotctl`.

## Life cycle of an election

An election goes through the following states:

* `draft` the definition may still change. Nothing can be cast.
* `scheduled` the candidate list has been taken from the directory and is frozen.
* `open` between `opens_at` and `closes_at`. Ballots are accepted.
* `closed` after `closes_at`, or when an organizer closes it early. The chain is sealed.
* `tallied` the result has been computed and stored. This state is final.

The opening and closing times drive the `scheduled -> open -> closed`
transitions. `Ledger::advance` closes every election that is due and runs its
count, and is meant to be called periodically. The closing time of an open
election may be pushed back with `Ledger::extend_closing`.

## Casting a ballot

A submission is accepted only when all of the following hold:
- the election is `open` at the time of the submission
- the voter was a member of the eligible group when the election opened
- the ranking is not empty, names only standing candidates, and names each of them once
- the nonce holds at least 16 random bytes
- the voter has not cast a ballot in this election yet

A rejected submission writes nothing. An accepted submission writes two
things in one step: an admission record, which says that the voter took part,
and a ledger entry, which holds the ballot. The two are never linked: the
ledger entry does not contain the voter, and the admission record does not
contain the ballot.

Submissions to one election are serialized. A submission that cannot get its
turn within the configured timeout (10 seconds by default) fails with a
`Timeout` error. Timeouts and storage outages may be retried, the other
errors are final.

## The chain

Every election has its own chain. All hashes are SHA-256, written in lowercase
hexadecimal. Strings are framed by their length as a 4-byte big-endian
integer, so that no two inputs share an encoding.

```text
genesis      = H("ballot-ledger genesis" || frame(election id))
ballot_hash  = H(frame(election id) || canonical ranking || nonce in hex)
chain_hash   = H(previous chain hash || ballot_hash)
```

The first entry links to the genesis value. Each entry has a sequence number,
starting at 1, with no gaps. The canonical ranking is the number of choices
as a 4-byte big-endian integer, followed by the candidate ids in order of
preference, each framed as above.

## Receipts

The voter receives a receipt holding the ballot hash, the nonce, the previous
chain hash and the chain hash. The nonce is the only secret: with it, the
voter can show which ranking the ballot hash stands for. Nobody else can.

Checking a receipt gives one of four answers:
* `valid` the entry exists, its hashes agree with the receipt, and the stored ranking rehashes to the ballot hash.
* `not found` no entry carries this chain hash.
* `tampered` an entry carries this chain hash but its ballot hash or previous chain hash differs from the receipt, or its link does not rehash. This is also written to the audit log.
* `nonce mismatch` the entry agrees with the receipt, but the stored ranking rehashed with the receipt's nonce does not give the ballot hash. Either the nonce is wrong or the ranking was rewritten; the two cannot be told apart, so no alarm is raised. A rewritten ranking that also changes the ballot hash breaks the chain and is caught by the chain audit.

## Counting rules

Once an election is closed, the ballots are counted with the single
transferable vote. Each ballot starts with a weight of 1 and sits on the pile
of the first standing candidate it ranks.

Each round:
1. The quota is computed from the ballots that are not exhausted:
   `floor(active ballots / (seats + 1)) + 1` (Droop quota).
2. Every continuing candidate at or above the quota is elected, from the
   highest total down. If a winner group the candidate belongs to is already
   full, the candidate is skipped and stays in the count.
3. The surplus of each newly elected candidate moves to the next continuing
   choice of each ballot on the pile, at the value
   `surplus / total`, truncated (not rounded) to 9 decimal places.
4. If nobody was elected in the round, one candidate is excluded and the
   whole pile moves on at its current value. A candidate that can no longer
   be elected because of a group cap goes first. Otherwise, it is the
   candidate with the lowest total.

Once the continuing candidates who can still be elected are not more than the
seats left, they are all elected. If group caps leave seats that no one can
fill, the count fails with `Unsatisfiable`.

A ballot with no further continuing choice is exhausted. It does not count
towards the quota of later rounds.

### Ties

Ties are broken the same way every time, without any randomness:
* when electing: highest total first, then the candidate that received fewer
  transferred votes, then the smaller candidate id
* when excluding: lowest total first, then the candidate that received fewer
  transferred votes, then the smaller candidate id

"Transferred votes" are the value a candidate received from surpluses and
exclusions, as opposed to first preferences. It is a value, not a number of
ballots: 4 ballots moved at 0.25 and 2 ballots moved at 0.5 both count as 1.

Since the ballots are put in a fixed order before counting, the result does
not depend on the order in which they were cast.

## `ballotctl`

`ballotctl` audits the public ballots export of a closed election. It never
needs access to the ledger itself.

### `tally`

```bash
ballotctl tally --config contest.json --reference expected_summary.json --out stdout
```

Reads the export named in the configuration, checks every link of the chain
from the genesis value to the published head, runs the count and writes the
summary in JSON. When a reference summary is given, the two are compared and
the differences are printed.

### `verify-chain`

```bash
ballotctl verify-chain --ballots ballots.json
```

### `verify-receipt`

```bash
ballotctl verify-receipt --ballots ballots.json --ballot-hash .. --nonce .. \
    --previous-chain-hash .. --chain-hash ..
```

### `simulate`

```bash
ballotctl simulate --voters 200 --candidates 5 --seats 2 --seed 42 --out sim
```

Runs an in-memory election in which every voter casts a ballot from its own
thread, then closes it and writes `ballots.json`, `contest.json` and
`summary.json` to the output directory. The files can be fed back to
`ballotctl tally`.

## Configuration

`ballotctl tally` is configured with a JSON file:

```json
{
  "outputSettings": {
    "contestName": "Board election 2026",
    "outputDirectory": "output"
  },
  "electionId": "board-2026",
  "seats": 3,
  "candidates": [
    { "id": "ann", "username": "ann" },
    { "id": "ben", "username": "ben" },
    { "id": "cas", "username": "cas" },
    { "id": "dee", "username": "dee" }
  ],
  "winnerGroups": [
    { "name": "officers", "maxElected": 1, "candidates": ["ann", "ben"] }
  ],
  "ballotsFile": "ballots.json",
  "decimalPlaces": 9
}
```

Notes:
- `ballotsFile` is relative to the configuration file
- `winnerGroups` and `decimalPlaces` are optional
- the summary is written to `<outputDirectory>/summary.json` unless `--out` is given

*/
