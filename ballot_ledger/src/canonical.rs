// Canonical byte encoding of a ranking.
//
// Layout: big-endian u32 number of choices, then for every choice (in ranking
// order) a big-endian u32 byte length followed by the UTF-8 bytes of the
// candidate id. Every field is length-prefixed, so two distinct rankings never
// share an encoding.

use std::collections::HashSet;
use std::fmt::Display;

use crate::election::CandidateId;

/// Why a ranking cannot be accepted.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum RankingProblem {
    Empty,
    Duplicate(CandidateId),
    UnknownCandidate(CandidateId),
    TooLong { len: usize, max: usize },
    /// Stored bytes that are not a canonical ranking.
    Undecodable,
}

impl Display for RankingProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RankingProblem::Empty => write!(f, "the ranking is empty"),
            RankingProblem::Duplicate(cid) => {
                write!(f, "candidate {} is ranked more than once", cid)
            }
            RankingProblem::UnknownCandidate(cid) => {
                write!(f, "{} is not a standing candidate", cid)
            }
            RankingProblem::TooLong { len, max } => {
                write!(f, "{} choices ranked but only {} candidates stand", len, max)
            }
            RankingProblem::Undecodable => write!(f, "the ranking bytes are malformed"),
        }
    }
}

/// Encodes a ranking into its canonical bytes.
///
/// The order of the ranking is preserved. Empty rankings and rankings that
/// mention a candidate twice are rejected.
pub fn canonicalize(ranking: &[CandidateId]) -> Result<Vec<u8>, RankingProblem> {
    if ranking.is_empty() {
        return Err(RankingProblem::Empty);
    }
    let mut seen: HashSet<&CandidateId> = HashSet::new();
    let mut out: Vec<u8> = Vec::with_capacity(4 + ranking.len() * 12);
    out.extend_from_slice(&(ranking.len() as u32).to_be_bytes());
    for cid in ranking.iter() {
        if !seen.insert(cid) {
            return Err(RankingProblem::Duplicate(cid.clone()));
        }
        let bytes = cid.as_str().as_bytes();
        out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        out.extend_from_slice(bytes);
    }
    Ok(out)
}

/// Decodes canonical bytes back into the ranking.
pub fn decode(bytes: &[u8]) -> Result<Vec<CandidateId>, RankingProblem> {
    let (count, mut rest) = read_u32(bytes)?;
    let mut res: Vec<CandidateId> = Vec::new();
    for _ in 0..count {
        let (len, tail) = read_u32(rest)?;
        let len = len as usize;
        if tail.len() < len {
            return Err(RankingProblem::Undecodable);
        }
        let name = std::str::from_utf8(&tail[..len]).map_err(|_| RankingProblem::Undecodable)?;
        res.push(CandidateId::from(name));
        rest = &tail[len..];
    }
    if !rest.is_empty() {
        return Err(RankingProblem::Undecodable);
    }
    // Only canonical encodings are accepted: re-encoding must be the identity.
    match canonicalize(&res) {
        Ok(again) if again == bytes => Ok(res),
        _ => Err(RankingProblem::Undecodable),
    }
}

fn read_u32(bytes: &[u8]) -> Result<(u32, &[u8]), RankingProblem> {
    if bytes.len() < 4 {
        return Err(RankingProblem::Undecodable);
    }
    let mut head = [0u8; 4];
    head.copy_from_slice(&bytes[..4]);
    Ok((u32::from_be_bytes(head), &bytes[4..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<CandidateId> {
        names.iter().map(|n| CandidateId::from(*n)).collect()
    }

    #[test]
    fn keeps_ranking_order() {
        let ab = canonicalize(&ids(&["a", "b"])).unwrap();
        let ba = canonicalize(&ids(&["b", "a"])).unwrap();
        assert_ne!(ab, ba);
        assert_eq!(ab, vec![0, 0, 0, 2, 0, 0, 0, 1, b'a', 0, 0, 0, 1, b'b']);
    }

    #[test]
    fn concatenation_is_not_ambiguous() {
        let x = canonicalize(&ids(&["ab", "c"])).unwrap();
        let y = canonicalize(&ids(&["a", "bc"])).unwrap();
        let z = canonicalize(&ids(&["abc"])).unwrap();
        assert_ne!(x, y);
        assert_ne!(x, z);
        assert_ne!(y, z);
    }

    #[test]
    fn rejects_malformed_rankings() {
        assert_eq!(canonicalize(&[]), Err(RankingProblem::Empty));
        assert_eq!(
            canonicalize(&ids(&["a", "b", "a"])),
            Err(RankingProblem::Duplicate(CandidateId::from("a")))
        );
    }

    #[test]
    fn decode_inverts_canonicalize() {
        let ranking = ids(&["dave", "ángel", "carol"]);
        let bytes = canonicalize(&ranking).unwrap();
        assert_eq!(decode(&bytes), Ok(ranking));
    }

    #[test]
    fn decode_rejects_garbage() {
        let mut bytes = canonicalize(&ids(&["a", "b"])).unwrap();
        bytes.push(0);
        assert_eq!(decode(&bytes), Err(RankingProblem::Undecodable));
        assert_eq!(decode(&[0, 0, 0, 1, 0, 0, 0, 5, b'a']), Err(RankingProblem::Undecodable));
        assert_eq!(decode(&[0, 0]), Err(RankingProblem::Undecodable));
        // A zero-length ranking is not canonical.
        assert_eq!(decode(&[0, 0, 0, 0]), Err(RankingProblem::Undecodable));
    }
}
