//! Fingerprint store — persisted index of upstream change fingerprints
//!
//! The store is an in-memory view over the fingerprint database built by
//! the bootstrap/refresh collaborators: one partition of source commits
//! since the fork cutoff, one of source PRs. During a check it is strictly
//! read-only; `append` exists for the refresh job and mutates memory only —
//! persistence is the collaborator's responsibility.
//!
//! The persisted form is versioned gzip-compressed JSON. An unknown
//! schema version, an undecodable payload, or records that disagree with
//! their partition all fail the load with `CorruptDatabase`.

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::io::Read;

use crate::fingerprint::{hamming, PatchId, SimHash64};
use crate::{ProvenaError, ProvenaResult};

/// Current persisted schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Identity of an upstream change, unique within its partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SourceId {
    Commit(String),
    Pr(u64),
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Commit(sha) => write!(f, "commit {sha}"),
            Self::Pr(number) => write!(f, "PR #{number}"),
        }
    }
}

/// Database partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Commits,
    Prs,
}

/// One upstream change's fingerprints. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub source_id: SourceId,
    pub simhash: SimHash64,
    pub patch_id: Option<PatchId>,
    #[serde(default)]
    pub file_paths: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

/// The persisted database shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintDatabase {
    pub schema_version: u32,
    pub repo: String,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub commits: Vec<FingerprintRecord>,
    #[serde(default)]
    pub prs: Vec<FingerprintRecord>,
}

/// In-memory index over the fingerprint database.
pub struct FingerprintStore {
    commits: Vec<FingerprintRecord>,
    prs: Vec<FingerprintRecord>,
    by_patch_id: HashMap<PatchId, (Partition, usize)>,
}

impl FingerprintStore {
    /// Load from the persisted gzip+JSON form.
    pub fn load<R: Read>(reader: R) -> ProvenaResult<Self> {
        let mut decoder = GzDecoder::new(reader);
        let mut raw = String::new();
        decoder
            .read_to_string(&mut raw)
            .map_err(|e| ProvenaError::CorruptDatabase(format!("gzip decode failed: {e}")))?;
        let db: FingerprintDatabase = serde_json::from_str(&raw)
            .map_err(|e| ProvenaError::CorruptDatabase(format!("JSON decode failed: {e}")))?;
        Self::from_database(db)
    }

    /// Build the index from an already-decoded database, verifying
    /// partition integrity.
    pub fn from_database(db: FingerprintDatabase) -> ProvenaResult<Self> {
        if db.schema_version != SCHEMA_VERSION {
            return Err(ProvenaError::CorruptDatabase(format!(
                "unknown schema version {} (expected {})",
                db.schema_version, SCHEMA_VERSION
            )));
        }
        for record in &db.commits {
            if !matches!(record.source_id, SourceId::Commit(_)) {
                return Err(ProvenaError::CorruptDatabase(format!(
                    "{} stored in the commit partition",
                    record.source_id
                )));
            }
        }
        for record in &db.prs {
            if !matches!(record.source_id, SourceId::Pr(_)) {
                return Err(ProvenaError::CorruptDatabase(format!(
                    "{} stored in the PR partition",
                    record.source_id
                )));
            }
        }
        for partition in [&db.commits, &db.prs] {
            let mut seen = std::collections::HashSet::new();
            for record in partition {
                if !seen.insert(&record.source_id) {
                    return Err(ProvenaError::CorruptDatabase(format!(
                        "duplicate {} in partition",
                        record.source_id
                    )));
                }
            }
        }

        let mut store = Self {
            commits: db.commits,
            prs: db.prs,
            by_patch_id: HashMap::new(),
        };
        store.rebuild_patch_index();
        tracing::debug!(
            commits = store.commits.len(),
            prs = store.prs.len(),
            "fingerprint store loaded"
        );
        Ok(store)
    }

    /// An empty store (useful before the first bootstrap run).
    pub fn empty() -> Self {
        Self {
            commits: Vec::new(),
            prs: Vec::new(),
            by_patch_id: HashMap::new(),
        }
    }

    fn rebuild_patch_index(&mut self) {
        self.by_patch_id.clear();
        for (idx, record) in self.commits.iter().enumerate() {
            if let Some(id) = record.patch_id {
                self.by_patch_id.insert(id, (Partition::Commits, idx));
            }
        }
        for (idx, record) in self.prs.iter().enumerate() {
            if let Some(id) = record.patch_id {
                self.by_patch_id.insert(id, (Partition::Prs, idx));
            }
        }
    }

    fn partition(&self, partition: Partition) -> &[FingerprintRecord] {
        match partition {
            Partition::Commits => &self.commits,
            Partition::Prs => &self.prs,
        }
    }

    /// Exact content-identity lookup.
    pub fn lookup_exact(&self, patch_id: &PatchId) -> Option<&FingerprintRecord> {
        let (partition, idx) = *self.by_patch_id.get(patch_id)?;
        self.partition(partition).get(idx)
    }

    /// Nearest-neighbor lookup: every record within `max_distance`,
    /// ranked by ascending Hamming distance.
    ///
    /// File-path overlap is a secondary ranking hint only — a moved or
    /// renamed file must never hide a true content match, so paths never
    /// filter the result set.
    pub fn lookup_fuzzy(
        &self,
        simhash: SimHash64,
        file_paths: &BTreeSet<String>,
        max_distance: u32,
    ) -> Vec<(&FingerprintRecord, u32)> {
        let mut hits: Vec<(&FingerprintRecord, u32)> = self
            .commits
            .par_iter()
            .chain(self.prs.par_iter())
            .filter_map(|record| {
                let distance = hamming(simhash, record.simhash);
                (distance <= max_distance).then_some((record, distance))
            })
            .collect();

        let overlap = |record: &FingerprintRecord| {
            record
                .file_paths
                .iter()
                .filter(|p| file_paths.contains(*p))
                .count()
        };
        hits.sort_by(|a, b| {
            a.1.cmp(&b.1)
                .then_with(|| overlap(b.0).cmp(&overlap(a.0)))
                .then_with(|| a.0.source_id.cmp(&b.0.source_id))
        });
        hits
    }

    /// In-memory upsert for the refresh collaborator. Replaces the record
    /// with the same source id, otherwise appends.
    pub fn append(&mut self, partition: Partition, record: FingerprintRecord) {
        let list = match partition {
            Partition::Commits => &mut self.commits,
            Partition::Prs => &mut self.prs,
        };
        match list.iter().position(|r| r.source_id == record.source_id) {
            Some(pos) => {
                if let Some(old) = list[pos].patch_id {
                    self.by_patch_id.remove(&old);
                }
                if let Some(new) = record.patch_id {
                    self.by_patch_id.insert(new, (partition, pos));
                }
                list[pos] = record;
            }
            None => {
                if let Some(new) = record.patch_id {
                    self.by_patch_id.insert(new, (partition, list.len()));
                }
                list.push(record);
            }
        }
    }

    pub fn record_count(&self) -> usize {
        self.commits.len() + self.prs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }
}
