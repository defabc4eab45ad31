//! End-to-end pipeline tests — persisted store → engine → report

use async_trait::async_trait;
use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use provena::diff::split_unified_diff;
use provena::fetch::{DiffFetcher, FetchError};
use provena::fingerprint::{patch_id, simhash64};
use provena::normalize::normalize_units;
use provena::store::{
    FingerprintDatabase, FingerprintRecord, FingerprintStore, SourceId, SCHEMA_VERSION,
};
use provena::{MatchKind, ProvenaConfig, ProvenaEngine, ProvenaError};

struct SourceFetcher(HashMap<SourceId, String>);

#[async_trait]
impl DiffFetcher for SourceFetcher {
    async fn fetch(&self, id: &SourceId) -> Result<String, FetchError> {
        self.0.get(id).cloned().ok_or(FetchError::NotFound)
    }
}

const LISTPACK_FUNC: &[&str] = &[
    "unsigned char *lpSeekPrev(unsigned char *lp, unsigned char *p) {",
    "    unsigned long backlen = lpDecodeBacklen(p - 1);",
    "    if (p - backlen - 1 < lp + LP_HDR_SIZE) return NULL;",
    "    serverAssert(lpValidateIntegrity(lp, backlen, 0));",
    "    return p - backlen - lpEncodeBacklenBytes(backlen);",
    "}",
];

const DICT_FUNC: &[&str] = &[
    "static long rehashStep(dict *d, long steps) {",
    "    long moved = 0;",
    "    while (steps-- && d->rehashidx != -1) {",
    "        moved += dictRehash(d, 1);",
    "    }",
    "    return moved;",
    "}",
];

fn unified_diff(path: &str, lines: &[&str]) -> String {
    let mut out = format!("diff --git a/{path} b/{path}\n--- a/{path}\n+++ b/{path}\n");
    for line in lines {
        out.push_str(&format!("+{line}\n"));
    }
    out
}

fn record_for(id: SourceId, diff: &str, config: &ProvenaConfig) -> FingerprintRecord {
    let units = split_unified_diff(diff);
    FingerprintRecord {
        source_id: id,
        simhash: simhash64(&normalize_units(&units, config), config.shingle_width),
        patch_id: patch_id(&units),
        file_paths: units.iter().map(|u| u.path.clone()).collect(),
        created_at: Utc::now(),
    }
}

fn persist(db: &FingerprintDatabase) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(serde_json::to_string(db).unwrap().as_bytes())
        .unwrap();
    encoder.finish().unwrap()
}

fn fork_config() -> ProvenaConfig {
    ProvenaConfig::for_fork("redis/redis", ("Redis", "Valkey"), Some(("RM_", "VM_")))
}

#[tokio::test]
async fn persisted_store_drives_an_exact_match() {
    let config = fork_config();
    let source_diff = unified_diff("src/listpack.c", LISTPACK_FUNC);
    let commit = SourceId::Commit("9fa1e2b".into());

    let db = FingerprintDatabase {
        schema_version: SCHEMA_VERSION,
        repo: "redis/redis".into(),
        generated_at: Utc::now(),
        commits: vec![record_for(commit.clone(), &source_diff, &config)],
        prs: vec![record_for(
            SourceId::Pr(3055),
            &unified_diff("src/dict.c", DICT_FUNC),
            &config,
        )],
    };
    let store = FingerprintStore::load(persist(&db).as_slice()).unwrap();
    let fetcher = Arc::new(SourceFetcher([(commit, source_diff.clone())].into()));

    let engine = ProvenaEngine::new(config).unwrap();
    let report = engine.check_diff_text(&source_diff, &store, fetcher).await;

    assert!(report.matched);
    let top = &report.evidence[0];
    assert_eq!(top.candidate.kind, MatchKind::ExactPatch);
    assert_eq!(top.candidate.distance, 0);
    assert_eq!(top.jaccard, 1.0);
    assert_eq!(top.subset_coverage, 1.0);
}

#[tokio::test]
async fn partial_copy_matches_through_subset_coverage() {
    let config = fork_config();
    let source_diff = unified_diff("src/listpack.c", LISTPACK_FUNC);
    let source_id = SourceId::Pr(3102);

    let db = FingerprintDatabase {
        schema_version: SCHEMA_VERSION,
        repo: "redis/redis".into(),
        generated_at: Utc::now(),
        commits: vec![],
        prs: vec![record_for(source_id.clone(), &source_diff, &config)],
    };
    let store = FingerprintStore::load(persist(&db).as_slice()).unwrap();
    let fetcher = Arc::new(SourceFetcher([(source_id, source_diff.clone())].into()));

    // Half the PR is the lifted upstream file, half is original work.
    let mut pr_diff = source_diff.clone();
    pr_diff.push_str(&unified_diff("src/dict.c", DICT_FUNC));

    let engine = ProvenaEngine::new(config.clone()).unwrap();
    let report = engine.check_diff_text(&pr_diff, &store, fetcher).await;

    assert!(report.matched);
    let top = &report.evidence[0];
    assert!(top.jaccard < config.jaccard_threshold);
    assert!(top.subset_coverage >= config.jaccard_threshold);
    assert!(top.accepted);
}

#[tokio::test]
async fn unknown_grammar_still_checks_at_reduced_precision() {
    let config = fork_config();
    let source_diff = unified_diff(
        "src/commands.def",
        &[
            "MAKE_CMD(\"getrange\" \"Returns a substring of the string\" \"O(N)\")",
            "MAKE_ARG(\"key\" ARG_TYPE_KEY 0)",
            "MAKE_ARG(\"start\" ARG_TYPE_INTEGER -1)",
            "MAKE_ARG(\"end\" ARG_TYPE_INTEGER -1)",
            "MAKE_CMD_TAIL(\"getrange\" GETRANGE_ARITY)",
            "MAKE_CMD_FLAGS(\"readonly\" \"fast\")",
        ],
    );
    let id = SourceId::Commit("def456".into());
    let db = FingerprintDatabase {
        schema_version: SCHEMA_VERSION,
        repo: "redis/redis".into(),
        generated_at: Utc::now(),
        commits: vec![record_for(id.clone(), &source_diff, &config)],
        prs: vec![],
    };
    let store = FingerprintStore::load(persist(&db).as_slice()).unwrap();
    let fetcher = Arc::new(SourceFetcher([(id, source_diff.clone())].into()));

    let engine = ProvenaEngine::new(config).unwrap();
    let report = engine.check_diff_text(&source_diff, &store, fetcher).await;
    // Whitespace-only normalization still catches the verbatim copy.
    assert!(report.matched);
}

#[test]
fn corrupt_database_file_aborts_the_check() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fingerprints.json.gz");

    let db = FingerprintDatabase {
        schema_version: SCHEMA_VERSION + 7,
        repo: "redis/redis".into(),
        generated_at: Utc::now(),
        commits: vec![],
        prs: vec![],
    };
    std::fs::write(&path, persist(&db)).unwrap();

    let file = std::fs::File::open(&path).unwrap();
    assert!(matches!(
        FingerprintStore::load(file),
        Err(ProvenaError::CorruptDatabase(_))
    ));
}
