// ********* Hash chain primitives ***********

use log::debug;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::election::ElectionId;

/// Minimum number of random bytes in a nonce (128 bits).
pub const MIN_NONCE_BYTES: usize = 16;

const GENESIS_DOMAIN: &[u8] = b"ballot-ledger genesis";

/// A SHA-256 digest, as 64 lowercase hexadecimal characters.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashDigest(pub String);

impl HashDigest {
    fn of(bytes: &[u8]) -> HashDigest {
        HashDigest(sha256::digest(bytes))
    }

    /// Parses a digest received from a client.
    pub fn parse(s: &str) -> Option<HashDigest> {
        let s = s.trim().to_ascii_lowercase();
        if s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit()) {
            Some(HashDigest(s))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for HashDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The voter-held secret mixed into the ballot hash, hex encoded.
///
/// Deserializing goes through `parse`: the value is lowercased and must be
/// non-empty hex. The minimum length is left to the ledger's settings.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Nonce(String);

impl Nonce {
    /// A fresh nonce of `MIN_NONCE_BYTES` random bytes.
    pub fn generate() -> Nonce {
        let mut bytes = [0u8; MIN_NONCE_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Nonce(hex::encode(bytes))
    }

    /// Builds a nonce from hex. Returns `None` for invalid hex or fewer than
    /// `min_bytes` bytes.
    pub fn parse(s: &str, min_bytes: usize) -> Option<Nonce> {
        let s = s.trim().to_ascii_lowercase();
        match hex::decode(&s) {
            Ok(bytes) if bytes.len() >= min_bytes => Some(Nonce(s)),
            _ => None,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.0.len() / 2
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for Nonce {
    type Error = String;

    fn try_from(s: String) -> Result<Nonce, String> {
        Nonce::parse(&s, 1).ok_or_else(|| format!("nonce is not a hex string: {:?}", s))
    }
}

impl From<Nonce> for String {
    fn from(n: Nonce) -> String {
        n.0
    }
}

impl Display for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One committed ballot row of an election's chain.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Position in the chain, starting at 1.
    pub sequence: u64,
    pub previous_chain_hash: HashDigest,
    pub ballot_hash: HashDigest,
    pub chain_hash: HashDigest,
    /// Canonical ranking bytes (see `canonical`).
    pub ranking: Vec<u8>,
}

/// The fixed value an election's chain starts from.
pub fn genesis_hash(election_id: &ElectionId) -> HashDigest {
    let mut buf: Vec<u8> = GENESIS_DOMAIN.to_vec();
    push_framed(&mut buf, election_id.as_str().as_bytes());
    HashDigest::of(&buf)
}

/// `H(election_id ∥ canonical ranking ∥ nonce)`.
///
/// The election id is length-prefixed and the canonical ranking is
/// self-delimiting, so the nonce is whatever remains.
pub fn ballot_hash(election_id: &ElectionId, canonical_ranking: &[u8], nonce: &Nonce) -> HashDigest {
    let mut buf: Vec<u8> = Vec::with_capacity(canonical_ranking.len() + 64);
    push_framed(&mut buf, election_id.as_str().as_bytes());
    buf.extend_from_slice(canonical_ranking);
    buf.extend_from_slice(nonce.as_str().as_bytes());
    HashDigest::of(&buf)
}

/// `H(previous chain hash ∥ ballot hash)`. Both inputs are fixed-width hex.
pub fn chain_hash(previous: &HashDigest, ballot: &HashDigest) -> HashDigest {
    let mut buf: Vec<u8> = Vec::with_capacity(128);
    buf.extend_from_slice(previous.as_str().as_bytes());
    buf.extend_from_slice(ballot.as_str().as_bytes());
    HashDigest::of(&buf)
}

fn push_framed(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ChainFaultKind {
    /// Sequence numbers are not dense and increasing.
    SequenceGap,
    /// The entry does not point at the previous entry's chain hash.
    BrokenLink,
    /// The stored chain hash is not `H(previous ∥ ballot)`.
    HashMismatch,
}

impl Display for ChainFaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChainFaultKind::SequenceGap => "sequence gap",
            ChainFaultKind::BrokenLink => "previous chain hash does not match",
            ChainFaultKind::HashMismatch => "chain hash does not recompute",
        };
        write!(f, "{}", s)
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ChainFault {
    pub sequence: u64,
    pub kind: ChainFaultKind,
}

/// Recomputes every link of a chain starting at `genesis`.
///
/// Returns the chain head (the genesis value for an empty chain).
pub fn verify_chain(genesis: &HashDigest, entries: &[LedgerEntry]) -> Result<HashDigest, ChainFault> {
    let mut head = genesis.clone();
    for (idx, e) in entries.iter().enumerate() {
        let expected_seq = idx as u64 + 1;
        if e.sequence != expected_seq {
            return Err(ChainFault {
                sequence: e.sequence,
                kind: ChainFaultKind::SequenceGap,
            });
        }
        if e.previous_chain_hash != head {
            return Err(ChainFault {
                sequence: e.sequence,
                kind: ChainFaultKind::BrokenLink,
            });
        }
        if chain_hash(&e.previous_chain_hash, &e.ballot_hash) != e.chain_hash {
            return Err(ChainFault {
                sequence: e.sequence,
                kind: ChainFaultKind::HashMismatch,
            });
        }
        head = e.chain_hash.clone();
    }
    debug!("verify_chain: {} entries, head {}", entries.len(), head);
    Ok(head)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_chain(eid: &ElectionId, n: usize) -> Vec<LedgerEntry> {
        let mut prev = genesis_hash(eid);
        let mut res = Vec::new();
        for i in 0..n {
            let ranking = vec![0, 0, 0, 1, 0, 0, 0, 1, b'a' + i as u8];
            let nonce = Nonce::generate();
            let bh = ballot_hash(eid, &ranking, &nonce);
            let ch = chain_hash(&prev, &bh);
            res.push(LedgerEntry {
                sequence: i as u64 + 1,
                previous_chain_hash: prev.clone(),
                ballot_hash: bh,
                chain_hash: ch.clone(),
                ranking,
            });
            prev = ch;
        }
        res
    }

    #[test]
    fn genesis_is_fixed_per_election() {
        let a = ElectionId::from("a");
        assert_eq!(genesis_hash(&a), genesis_hash(&a));
        assert_ne!(genesis_hash(&a), genesis_hash(&ElectionId::from("b")));
        assert_eq!(genesis_hash(&a).as_str().len(), 64);
    }

    #[test]
    fn ballot_hash_depends_on_every_input() {
        let eid = ElectionId::from("e");
        let nonce = Nonce::parse("00112233445566778899aabbccddeeff", MIN_NONCE_BYTES).unwrap();
        let other = Nonce::parse("00112233445566778899aabbccddeefe", MIN_NONCE_BYTES).unwrap();
        let h = ballot_hash(&eid, b"xyz", &nonce);
        assert_eq!(h, ballot_hash(&eid, b"xyz", &nonce));
        assert_ne!(h, ballot_hash(&eid, b"xyz", &other));
        assert_ne!(h, ballot_hash(&eid, b"xzy", &nonce));
        assert_ne!(h, ballot_hash(&ElectionId::from("f"), b"xyz", &nonce));
    }

    #[test]
    fn nonce_parsing() {
        assert!(Nonce::parse("abcd", MIN_NONCE_BYTES).is_none());
        assert!(Nonce::parse("not hex at all, definitely not!!", MIN_NONCE_BYTES).is_none());
        let n = Nonce::generate();
        assert_eq!(n.byte_len(), MIN_NONCE_BYTES);
        assert_eq!(Nonce::parse(n.as_str(), MIN_NONCE_BYTES), Some(n));
    }

    #[test]
    fn nonces_from_json_are_parsed() {
        let upper: Nonce = serde_json::from_str("\"00112233445566778899AABBCCDDEEFF\"").unwrap();
        let lower = Nonce::parse("00112233445566778899aabbccddeeff", MIN_NONCE_BYTES).unwrap();
        assert_eq!(upper, lower);
        let eid = ElectionId::from("e");
        assert_eq!(ballot_hash(&eid, b"xyz", &upper), ballot_hash(&eid, b"xyz", &lower));
        assert_eq!(
            serde_json::to_string(&upper).unwrap(),
            "\"00112233445566778899aabbccddeeff\""
        );

        assert!(serde_json::from_str::<Nonce>("\"zz112233445566778899aabbccddeeff\"").is_err());
        assert!(serde_json::from_str::<Nonce>("\"\"").is_err());
        assert!(serde_json::from_str::<Nonce>("\"abc\"").is_err());
    }

    #[test]
    fn verifies_a_well_formed_chain() {
        let eid = ElectionId::from("e");
        let chain = build_chain(&eid, 5);
        let head = verify_chain(&genesis_hash(&eid), &chain).unwrap();
        assert_eq!(head, chain[4].chain_hash);
        for i in 1..chain.len() {
            assert_eq!(chain[i].previous_chain_hash, chain[i - 1].chain_hash);
            assert_eq!(
                chain_hash(&chain[i].previous_chain_hash, &chain[i].ballot_hash),
                chain[i].chain_hash
            );
        }
        assert_eq!(verify_chain(&genesis_hash(&eid), &[]), Ok(genesis_hash(&eid)));
    }

    #[test]
    fn detects_tampering() {
        let eid = ElectionId::from("e");
        let genesis = genesis_hash(&eid);

        let mut chain = build_chain(&eid, 4);
        chain[2].ballot_hash = chain[1].ballot_hash.clone();
        assert_eq!(
            verify_chain(&genesis, &chain),
            Err(ChainFault { sequence: 3, kind: ChainFaultKind::HashMismatch })
        );

        let mut chain = build_chain(&eid, 4);
        chain.remove(1);
        assert_eq!(
            verify_chain(&genesis, &chain),
            Err(ChainFault { sequence: 3, kind: ChainFaultKind::SequenceGap })
        );

        let chain = build_chain(&eid, 2);
        assert_eq!(
            verify_chain(&genesis_hash(&ElectionId::from("other")), &chain),
            Err(ChainFault { sequence: 1, kind: ChainFaultKind::BrokenLink })
        );
    }
}
