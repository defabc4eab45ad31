//! Layer 1 — candidate generation from local data only
//!
//! Produces a ranked, deduplicated list of plausible source matches
//! without touching the network. An exact patch-id hit is certainty and
//! supersedes fuzzy lookup for its unit; everything else goes through
//! simhash nearest-neighbor search. One aggregate query over the whole
//! PR catches content that upstream distributed across files differently.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use super::triage::is_infrastructure;
use crate::config::ProvenaConfig;
use crate::diff::DiffUnit;
use crate::fingerprint::{patch_id, simhash64};
use crate::normalize::{normalize_unit, normalize_units};
use crate::store::{FingerprintRecord, FingerprintStore, SourceId};

/// How a candidate was surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchKind {
    /// Content-identical patch stream
    ExactPatch,
    /// Within the simhash Hamming bound
    FuzzySimhash,
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExactPatch => write!(f, "exact-patch"),
            Self::FuzzySimhash => write!(f, "fuzzy-simhash"),
        }
    }
}

/// A plausible source match awaiting Layer 2 confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub record: FingerprintRecord,
    /// Hamming distance that surfaced the record (0 for exact hits)
    pub distance: u32,
    pub kind: MatchKind,
}

impl MatchCandidate {
    /// Exactness first, then proximity.
    fn beats(&self, other: &MatchCandidate) -> bool {
        match (self.kind, other.kind) {
            (MatchKind::ExactPatch, MatchKind::FuzzySimhash) => true,
            (MatchKind::FuzzySimhash, MatchKind::ExactPatch) => false,
            _ => self.distance < other.distance,
        }
    }
}

/// Generate ranked candidates for a unit set.
///
/// Infrastructure units are excluded up front; a PR touching only
/// infrastructure paths produces no candidates. An empty result is a
/// valid, common outcome.
pub fn generate(
    units: &[DiffUnit],
    store: &FingerprintStore,
    config: &ProvenaConfig,
) -> Vec<MatchCandidate> {
    let units: Vec<DiffUnit> = units
        .iter()
        .filter(|u| !is_infrastructure(&u.path, config))
        .cloned()
        .collect();
    if units.is_empty() {
        return Vec::new();
    }

    let mut best: HashMap<SourceId, MatchCandidate> = HashMap::new();
    let consider = |candidate: MatchCandidate, best: &mut HashMap<SourceId, MatchCandidate>| {
        let id = candidate.record.source_id.clone();
        match best.get(&id) {
            Some(existing) if !candidate.beats(existing) => {}
            _ => {
                best.insert(id, candidate);
            }
        }
    };

    // Whole-change identity: a full cherry-pick matches the stored
    // patch id of the upstream change in one shot.
    if let Some(id) = patch_id(&units) {
        if let Some(record) = store.lookup_exact(&id) {
            consider(
                MatchCandidate {
                    record: record.clone(),
                    distance: 0,
                    kind: MatchKind::ExactPatch,
                },
                &mut best,
            );
        }
    }

    for unit in &units {
        if let Some(id) = patch_id(std::slice::from_ref(unit)) {
            if let Some(record) = store.lookup_exact(&id) {
                consider(
                    MatchCandidate {
                        record: record.clone(),
                        distance: 0,
                        kind: MatchKind::ExactPatch,
                    },
                    &mut best,
                );
                continue;
            }
        }

        let normalized = normalize_unit(unit, config);
        if normalized.is_empty() {
            continue;
        }
        let simhash = simhash64(&normalized, config.shingle_width);
        let paths: BTreeSet<String> = [unit.path.clone()].into();
        for (record, distance) in store.lookup_fuzzy(simhash, &paths, config.max_distance) {
            consider(
                MatchCandidate {
                    record: record.clone(),
                    distance,
                    kind: MatchKind::FuzzySimhash,
                },
                &mut best,
            );
        }
    }

    // Aggregate pass: the whole PR considered together.
    let combined = normalize_units(&units, config);
    if !combined.is_empty() {
        let simhash = simhash64(&combined, config.shingle_width);
        let paths: BTreeSet<String> = units.iter().map(|u| u.path.clone()).collect();
        for (record, distance) in store.lookup_fuzzy(simhash, &paths, config.max_distance) {
            consider(
                MatchCandidate {
                    record: record.clone(),
                    distance,
                    kind: MatchKind::FuzzySimhash,
                },
                &mut best,
            );
        }
    }

    let mut candidates: Vec<MatchCandidate> = best.into_values().collect();
    candidates.sort_by(|a, b| {
        a.distance
            .cmp(&b.distance)
            .then_with(|| match (a.kind, b.kind) {
                (MatchKind::ExactPatch, MatchKind::FuzzySimhash) => std::cmp::Ordering::Less,
                (MatchKind::FuzzySimhash, MatchKind::ExactPatch) => std::cmp::Ordering::Greater,
                _ => std::cmp::Ordering::Equal,
            })
            .then_with(|| a.record.source_id.cmp(&b.record.source_id))
    });
    tracing::debug!(candidates = candidates.len(), "layer 1 complete");
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FingerprintDatabase, Partition, SCHEMA_VERSION};
    use chrono::Utc;

    fn config() -> ProvenaConfig {
        ProvenaConfig {
            infrastructure_patterns: vec!["deps/".into()],
            ..ProvenaConfig::for_fork("redis/redis", ("Redis", "Valkey"), Some(("RM_", "VM_")))
        }
    }

    fn empty_store() -> FingerprintStore {
        FingerprintStore::from_database(FingerprintDatabase {
            schema_version: SCHEMA_VERSION,
            repo: "redis/redis".into(),
            generated_at: Utc::now(),
            commits: vec![],
            prs: vec![],
        })
        .unwrap()
    }

    fn unit(path: &str, added: &[&str]) -> DiffUnit {
        let mut u = DiffUnit::new(path);
        u.added = added.iter().map(|l| l.to_string()).collect();
        u
    }

    fn record_for(source_id: SourceId, units: &[DiffUnit], config: &ProvenaConfig) -> FingerprintRecord {
        FingerprintRecord {
            source_id,
            simhash: simhash64(&normalize_units(units, config), config.shingle_width),
            patch_id: patch_id(units),
            file_paths: units.iter().map(|u| u.path.clone()).collect(),
            created_at: Utc::now(),
        }
    }

    const BODY: &[&str] = &[
        "void expireGenericCommand(client *c, long long basetime, int unit) {",
        "    robj *key = c->argv[1], *param = c->argv[2];",
        "    long long when;",
        "    if (getLongLongFromObjectOrReply(c, param, &when, NULL) != C_OK) return;",
        "    when *= 1000;",
        "    when += basetime;",
        "}",
    ];

    #[test]
    fn identical_unit_yields_exact_patch() {
        let config = config();
        let pr_unit = unit("src/expire.c", BODY);
        let mut store = empty_store();
        store.append(
            Partition::Commits,
            record_for(
                SourceId::Commit("abc123".into()),
                std::slice::from_ref(&pr_unit),
                &config,
            ),
        );

        let candidates = generate(std::slice::from_ref(&pr_unit), &store, &config);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].kind, MatchKind::ExactPatch);
        assert_eq!(candidates[0].distance, 0);
    }

    #[test]
    fn rebranded_copy_yields_fuzzy_candidate() {
        let config = config();
        // Upstream spells it Redis; raw bytes differ from the PR, so the
        // patch ids differ, but both sides normalize to the same stream.
        let source_lines: Vec<String> = BODY
            .iter()
            .map(|l| l.replace("expireGenericCommand", "redisExpireGeneric"))
            .collect();
        let mut source_unit = unit("src/expire.c", &[]);
        source_unit.added = source_lines;
        let mut store = empty_store();
        store.append(
            Partition::Prs,
            record_for(SourceId::Pr(3080), std::slice::from_ref(&source_unit), &config),
        );

        let pr_lines: Vec<String> = BODY
            .iter()
            .map(|l| l.replace("expireGenericCommand", "valkeyExpireGeneric"))
            .collect();
        let mut pr_unit = unit("src/expire.c", &[]);
        pr_unit.added = pr_lines;

        let candidates = generate(std::slice::from_ref(&pr_unit), &store, &config);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].kind, MatchKind::FuzzySimhash);
        assert_eq!(candidates[0].distance, 0);
    }

    #[test]
    fn candidates_deduplicate_by_source_id() {
        let config = config();
        let pr_unit = unit("src/expire.c", BODY);
        let mut store = empty_store();
        // Same source reachable through both the unit query and the
        // aggregate query; only the best hit must survive.
        store.append(
            Partition::Commits,
            record_for(
                SourceId::Commit("abc123".into()),
                std::slice::from_ref(&pr_unit),
                &config,
            ),
        );

        let candidates = generate(std::slice::from_ref(&pr_unit), &store, &config);
        let ids: Vec<_> = candidates.iter().map(|c| &c.record.source_id).collect();
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(ids.len(), unique.len());
    }

    #[test]
    fn aggregate_query_catches_redistributed_content() {
        let config = config();
        // Upstream landed everything in one file.
        let source_unit = unit("src/expire.c", BODY);
        let mut record = record_for(
            SourceId::Commit("whole".into()),
            std::slice::from_ref(&source_unit),
            &config,
        );
        record.patch_id = None; // force the simhash path
        let mut store = empty_store();
        store.append(Partition::Commits, record);

        // The PR splits the same content across two files.
        let first = unit("src/expire.c", &BODY[..3]);
        let second = unit("src/expire-util.c", &BODY[3..]);
        let units = vec![first.clone(), second];

        let per_unit_hit = {
            let normalized = normalize_unit(&first, &config);
            let sh = simhash64(&normalized, config.shingle_width);
            store
                .lookup_fuzzy(sh, &BTreeSet::new(), config.max_distance)
                .len()
        };
        assert_eq!(per_unit_hit, 0, "half the content should not match alone");

        let candidates = generate(&units, &store, &config);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].distance, 0);
    }

    #[test]
    fn infrastructure_only_pr_has_no_candidates() {
        let config = config();
        let pr_unit = unit("deps/lua/src/lapi.c", BODY);
        let mut store = empty_store();
        store.append(
            Partition::Commits,
            record_for(
                SourceId::Commit("abc123".into()),
                std::slice::from_ref(&pr_unit),
                &config,
            ),
        );
        assert!(generate(std::slice::from_ref(&pr_unit), &store, &config).is_empty());
    }

    #[test]
    fn empty_store_is_a_valid_no_match() {
        let config = config();
        let pr_unit = unit("src/expire.c", BODY);
        assert!(generate(std::slice::from_ref(&pr_unit), &empty_store(), &config).is_empty());
    }
}
