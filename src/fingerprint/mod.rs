//! Fingerprint engine — SimHash64 + content-addressed patch identity
//!
//! Two complementary fingerprints over a normalized diff:
//!
//! 1. **SimHash64** — a 64-bit locality-sensitive hash over overlapping
//!    token shingles. Small, localized edits move few bits, so Hamming
//!    distance approximates content dissimilarity. This is the basis for
//!    fuzzy candidate lookup.
//!
//! 2. **PatchId** — a SHA-256 digest of the tagged add/remove line stream
//!    alone. Context lines, hunk offsets, file paths, and commit metadata
//!    never enter the digest, so cherry-picks and rebases keep their
//!    identity while any content-line change breaks it.

use blake2::digest::consts::U8;
use blake2::{Blake2b, Digest as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha256;
use std::collections::HashSet;
use std::fmt;

use crate::diff::DiffUnit;
use crate::normalize::NormalizedDiff;

/// 64-bit shingle hash, matching the persisted fingerprint scheme.
type ShingleHasher = Blake2b<U8>;

/// 64-bit locality-sensitive fingerprint of a normalized diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimHash64(pub u64);

impl fmt::Display for SimHash64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Content-addressed identity of a diff's add/remove stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatchId([u8; 32]);

impl fmt::Display for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Serialize for PatchId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for PatchId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("patch id must be 32 bytes"))?;
        Ok(PatchId(arr))
    }
}

/// Enumerate overlapping token shingles of the given width.
///
/// Streams shorter than the width fall back to single-token shingles so
/// tiny diffs still fingerprint.
fn shingles<'a>(tokens: &[&'a str], width: usize) -> Vec<String> {
    if tokens.is_empty() {
        return Vec::new();
    }
    if tokens.len() < width {
        return tokens.iter().map(|t| t.to_string()).collect();
    }
    tokens.windows(width).map(|w| w.join(" ")).collect()
}

fn hash_shingle(shingle: &str) -> u64 {
    let mut hasher = ShingleHasher::new();
    hasher.update(shingle.as_bytes());
    u64::from_be_bytes(hasher.finalize().into())
}

/// Compute the 64-bit SimHash of a normalized diff.
pub fn simhash64(diff: &NormalizedDiff, shingle_width: usize) -> SimHash64 {
    let tokens = diff.texts();
    let mut weights = [0i64; 64];
    for shingle in shingles(&tokens, shingle_width) {
        let h = hash_shingle(&shingle);
        for (bit, weight) in weights.iter_mut().enumerate() {
            if h & (1 << bit) != 0 {
                *weight += 1;
            } else {
                *weight -= 1;
            }
        }
    }
    let mut fingerprint = 0u64;
    for (bit, weight) in weights.iter().enumerate() {
        if *weight > 0 {
            fingerprint |= 1 << bit;
        }
    }
    SimHash64(fingerprint)
}

/// The shingle-hash set of a normalized diff, for set-similarity scoring.
pub fn shingle_set(diff: &NormalizedDiff, shingle_width: usize) -> HashSet<u64> {
    let tokens = diff.texts();
    shingles(&tokens, shingle_width)
        .iter()
        .map(|s| hash_shingle(s))
        .collect()
}

/// Bitwise Hamming distance between two fingerprints, in `[0, 64]`.
pub fn hamming(a: SimHash64, b: SimHash64) -> u32 {
    (a.0 ^ b.0).count_ones()
}

/// Compute the content-addressed identity of a unit set.
///
/// Only the removed/added line text enters the digest, each line tagged
/// by direction. Returns `None` when the set carries no changed lines.
pub fn patch_id(units: &[DiffUnit]) -> Option<PatchId> {
    let mut hasher = Sha256::new();
    let mut any = false;
    for unit in units {
        for line in &unit.removed {
            hasher.update(b"-");
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
            any = true;
        }
        for line in &unit.added {
            hasher.update(b"+");
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
            any = true;
        }
    }
    if !any {
        return None;
    }
    Some(PatchId(hasher.finalize().into()))
}
